use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use orgtally::app::{App, RunOptions, RunResult};
use orgtally::config::ConfigLoader;
use orgtally::error::TallyError;
use orgtally::ncbi::EfetchHttpClient;
use orgtally::output::LogSink;
use orgtally::store::SqliteCache;

#[derive(Parser)]
#[command(name = "orgtally")]
#[command(about = "Count organisms in BLAST tabular output via NCBI taxonomy")]
#[command(version, author)]
struct Cli {
    /// BLAST outfmt 6 file (plain or .gz)
    input: Utf8PathBuf,

    /// JSON config file (defaults to ./orgtally.json when present)
    #[arg(long)]
    config: Option<String>,

    /// Report path, overrides the configured output_path
    #[arg(long)]
    output: Option<Utf8PathBuf>,

    /// Do not query NCBI; every id must already be cached
    #[arg(long)]
    offline: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<TallyError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &TallyError) -> u8 {
    match error {
        TallyError::IdentifierNotFound(_) | TallyError::TaxonomyNotFound(_) => 2,
        TallyError::NcbiHttp(_)
        | TallyError::NcbiStatus { .. }
        | TallyError::MalformedResponse { .. }
        | TallyError::MissingField { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let output = cli.output.unwrap_or_else(|| config.output_path.clone());

    let cache = SqliteCache::from_config(&config);
    cache.ensure_table()?;
    let records = cache.len()?;
    tracing::info!(cache = %cache.path(), records, "opened cache");

    let ncbi = EfetchHttpClient::new(&config)?;
    let app = App::new(cache, ncbi);
    let options = RunOptions {
        offline: cli.offline,
    };
    let result = app.run(&cli.input, &output, options, &LogSink)?;

    print_summary(&result, &output);
    Ok(())
}

fn print_summary(result: &RunResult, output: &Utf8Path) {
    let green = "\x1b[32m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}orgtally summary{reset}");
    println!(
        "{green}reads: {}  taxa: {}  fetched: {}  cached: {}{reset}",
        result.report.total,
        result.report.groups.len(),
        result.enrich.fetched,
        result.enrich.cached
    );
    for group in &result.report.groups {
        println!(
            "  {:>8}  {:>6.2}%  {} ({})",
            group.count,
            group.ratio * 100.0,
            group.organism_name,
            group.taxonomy_id
        );
    }
    println!("{cyan}report: {output}{reset}");
}
