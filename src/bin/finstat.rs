use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use finstat_mirror::app::{App, FetchOptions};
use finstat_mirror::config::ConfigLoader;
use finstat_mirror::error::FinstatError;
use finstat_mirror::hub::HubHttpClient;
use finstat_mirror::manifest::{Manifest, MANIFEST_FILE};
use finstat_mirror::output::{JsonOutput, LogSink};
use finstat_mirror::query::Analyzer;
use finstat_mirror::store::CacheStore;

#[derive(Parser)]
#[command(name = "finstat")]
#[command(about = "Mirror yearly financial-statement parquet extracts and query them")]
#[command(version, author)]
struct Cli {
    /// Path to finstat.json (defaults to the working directory).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Override the cache directory.
    #[arg(long, global = true)]
    cache_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download the dataset's parquet files and write the manifest")]
    Fetch(FetchArgs),
    #[command(about = "Run the aggregation queries over the cached files")]
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// Ignore cached bytes and download everything again.
    #[arg(long)]
    force: bool,

    /// Where to write the manifest.
    #[arg(long, default_value = MANIFEST_FILE)]
    manifest: String,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Manifest produced by `finstat fetch`.
    #[arg(long, default_value = MANIFEST_FILE)]
    manifest: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<FinstatError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FinstatError) -> u8 {
    match error {
        FinstatError::ConfigRead(_)
        | FinstatError::ConfigParse(_)
        | FinstatError::ManifestNotFound(_)
        | FinstatError::ManifestParse { .. }
        | FinstatError::NoUsableFiles => 2,
        FinstatError::HubHttp(_)
        | FinstatError::HubStatus { .. }
        | FinstatError::EmptyListing { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;

    let cache_dir = cli
        .cache_dir
        .map(Utf8PathBuf::from)
        .or_else(|| config.cache_dir.clone());
    let store = match cache_dir {
        Some(root) => CacheStore::new_with_root(root),
        None => CacheStore::new().into_diagnostic()?,
    };

    match cli.command {
        Commands::Fetch(args) => {
            let hub = HubHttpClient::new().into_diagnostic()?;
            let app = App::new(store, hub, config);
            let options = FetchOptions {
                force: args.force,
                manifest_path: Utf8PathBuf::from(args.manifest),
            };
            let manifest = app.fetch(&options, &LogSink).into_diagnostic()?;
            JsonOutput::print_manifest(&manifest).into_diagnostic()?;
            Ok(())
        }
        Commands::Analyze(args) => {
            let manifest =
                Manifest::load(Utf8PathBuf::from(args.manifest).as_path()).into_diagnostic()?;
            let analyzer = Analyzer::new(config);
            let report = analyzer.analyze(&manifest).into_diagnostic()?;
            print_report_summary(&report);
            JsonOutput::print_report(&report).into_diagnostic()?;
            Ok(())
        }
    }
}

fn print_report_summary(report: &finstat_mirror::query::AnalyzeReport) {
    println!(
        "company lookup: {} rows (sql {:.2} ms, lazy {:.2} ms, agree: {})",
        report.company.sql.value.len(),
        report.company.sql.elapsed_ms,
        report.company.lazy.elapsed_ms,
        report.company.agree,
    );
    for row in &report.company.sql.value {
        match (row.year, row.line_1700) {
            (Some(year), Some(value)) => println!("  {year}: {value:.2}"),
            (Some(year), None) => println!("  {year}: -"),
            (None, value) => println!("  ?: {value:?}"),
        }
    }
    println!(
        "regional revenue: sql {:?} ({:.2} ms), lazy {:?} ({:.2} ms), agree: {}",
        report.revenue.sql.value,
        report.revenue.sql.elapsed_ms,
        report.revenue.lazy.value,
        report.revenue.lazy.elapsed_ms,
        report.revenue.agree,
    );
}
