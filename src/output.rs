use std::fs;
use std::io::Write;

use camino::Utf8Path;
use serde::Serialize;
use tempfile::Builder;
use tracing::info;

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::TallyError;
use crate::report::Report;

pub struct JsonOutput;

impl JsonOutput {
    /// Writes `[[taxonomy_id, organism_name, count, ratio], ...]` to `path`.
    pub fn write_report(path: &Utf8Path, report: &Report) -> Result<(), TallyError> {
        Self::write_json_atomic(path, &report.groups)
    }

    /// The target only appears once the whole document is on disk; an earlier
    /// failure leaves any previous file untouched.
    fn write_json_atomic<T: Serialize + ?Sized>(
        path: &Utf8Path,
        value: &T,
    ) -> Result<(), TallyError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| TallyError::Filesystem(err.to_string()))?;

        let json =
            serde_json::to_vec(value).map_err(|err| TallyError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".orgtally-report")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| TallyError::Filesystem(err.to_string()))?;
        temp.write_all(&json)
            .map_err(|err| TallyError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| TallyError::Filesystem(format!("persist {path}: {err}")))?;
        Ok(())
    }
}

/// Forwards pipeline progress to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}
