use std::collections::HashSet;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use tracing::{debug, info};

use crate::domain::Identifier;
use crate::error::TallyError;
use crate::extract::read_identifiers;
use crate::ncbi::TaxonomyClient;
use crate::output::JsonOutput;
use crate::report::{Report, aggregate};
use crate::store::LookupCache;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Skip NCBI entirely and rely on what is already cached.
    pub offline: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub distinct: usize,
    pub cached: usize,
    pub fetched: usize,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub enrich: EnrichSummary,
    pub report: Report,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: LookupCache, N: TaxonomyClient> {
    cache: C,
    ncbi: N,
}

impl<C: LookupCache, N: TaxonomyClient> App<C, N> {
    pub fn new(cache: C, ncbi: N) -> Self {
        Self { cache, ncbi }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Extract, enrich, aggregate and write the report. Nothing is written to
    /// `output` unless every stage succeeds.
    pub fn run(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, TallyError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Extract; reading {input}"),
            elapsed: None,
        });
        let ids = read_identifiers(input)?;
        sink.event(ProgressEvent {
            message: format!("phase=Extract; {} rows", ids.len()),
            elapsed: Some(started.elapsed()),
        });

        let enrich = if options.offline {
            sink.event(ProgressEvent {
                message: "phase=Enrich; offline, skipping NCBI".to_string(),
                elapsed: None,
            });
            EnrichSummary::default()
        } else {
            self.enrich(&ids, sink)?
        };

        let report = self.report(&ids, sink)?;
        JsonOutput::write_report(output, &report)?;
        sink.event(ProgressEvent {
            message: format!("phase=Write; {} groups -> {output}", report.groups.len()),
            elapsed: Some(started.elapsed()),
        });

        Ok(RunResult { enrich, report })
    }

    /// Fetches every distinct identifier the cache does not know yet, in first-seen
    /// order. The first failure aborts; records stored before it stay cached.
    pub fn enrich(
        &self,
        ids: &[Identifier],
        sink: &dyn ProgressSink,
    ) -> Result<EnrichSummary, TallyError> {
        let started = Instant::now();
        let mut seen = HashSet::new();
        let mut summary = EnrichSummary::default();

        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            summary.distinct += 1;
            if self.cache.exists(id)? {
                debug!(id = %id, "cache hit");
                summary.cached += 1;
                continue;
            }
            let record = self.ncbi.fetch_record(id)?;
            info!(
                id = %id,
                taxonomy = %record.taxonomy_id,
                organism = %record.organism_name,
                "fetched from NCBI"
            );
            self.cache.put(&record)?;
            summary.fetched += 1;
        }

        sink.event(ProgressEvent {
            message: format!(
                "phase=Enrich; {} distinct ids, {} cached, {} fetched",
                summary.distinct, summary.cached, summary.fetched
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(summary)
    }

    pub fn report(
        &self,
        ids: &[Identifier],
        sink: &dyn ProgressSink,
    ) -> Result<Report, TallyError> {
        sink.event(ProgressEvent {
            message: "phase=Aggregate; counting by taxonomy".to_string(),
            elapsed: None,
        });
        aggregate(&self.cache, ids)
    }
}
