//! watchsheet CLI: export a Robinhood watchlist to a Google Sheets worksheet.
//!
//! Commands:
//! - `run`: one export (login, fetch, merge, publish, logout)
//! - `init-config`: write a default `watchsheet.toml`
//!
//! Exit codes: 0 success (publish failures are reported, not fatal),
//! 2 configuration, 3 authentication, 4 empty watchlist, 5 empty result,
//! 1 anything else.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use watchsheet_core::data::{FixtureProvider, MarketDataProvider, RobinhoodClient, SessionProvider};
use watchsheet_runner::{
    run_job, Config, CsvPublisher, GoogleSheetsPublisher, PublishStatus, RunReport,
    SheetPublisher, SheetsAuth,
};

const EXIT_CONFIG: i32 = 2;

#[derive(Parser)]
#[command(
    name = "watchsheet",
    version,
    about = "Export a Robinhood watchlist with prices and market caps to Google Sheets"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one export.
    Run {
        /// Path to the TOML config file. A missing file means defaults.
        #[arg(long, default_value = "watchsheet.toml")]
        config: PathBuf,

        /// Watchlist name (overrides [watchlist].name).
        #[arg(long)]
        watchlist: Option<String>,

        /// Destination worksheet title (overrides [sheet].worksheet).
        #[arg(long)]
        worksheet: Option<String>,

        /// Symbols per fundamentals request (overrides [batch].chunk_size).
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Also write the table to this CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write the JSON run report to this file.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Skip the Google Sheets publish.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Serve provider data from a JSON fixture instead of Robinhood.
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// Write a default config file.
    InitConfig {
        /// Destination path.
        #[arg(long, default_value = "watchsheet.toml")]
        output: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

struct RunArgs {
    config: PathBuf,
    watchlist: Option<String>,
    worksheet: Option<String>,
    chunk_size: Option<usize>,
    csv: Option<PathBuf>,
    report: Option<PathBuf>,
    dry_run: bool,
    fixture: Option<PathBuf>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            watchlist,
            worksheet,
            chunk_size,
            csv,
            report,
            dry_run,
            fixture,
        } => run_export(RunArgs {
            config,
            watchlist,
            worksheet,
            chunk_size,
            csv,
            report,
            dry_run,
            fixture,
        }),
        Commands::InitConfig { output, force } => run_init_config(&output, force),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "watchsheet=info,watchsheet_core=info,watchsheet_runner=info",
        1 => "watchsheet=debug,watchsheet_core=debug,watchsheet_runner=debug",
        _ => "watchsheet=trace,watchsheet_core=trace,watchsheet_runner=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .init();
}

fn run_init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }
    let toml = Config::default().to_toml()?;
    std::fs::write(output, toml)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote default configuration to {}", output.display());
    Ok(())
}

/// Load the config file, then environment, then command-line overrides.
fn load_config(args: &RunArgs) -> Result<Config> {
    let mut config = Config::load(&args.config)?;
    config.apply_env();

    if let Some(name) = &args.watchlist {
        config.watchlist.name = name.clone();
    }
    if let Some(worksheet) = &args.worksheet {
        config.sheet.worksheet = worksheet.clone();
    }
    if let Some(size) = args.chunk_size {
        config.batch.chunk_size = size;
    }
    if let Some(csv) = &args.csv {
        config.output.csv_path = Some(csv.clone());
    }
    if let Some(report) = &args.report {
        config.output.report_path = Some(report.clone());
    }
    if args.fixture.is_some() {
        // The fixture accepts any login.
        config.provider.username.get_or_insert_with(|| "fixture".into());
        config.provider.password.get_or_insert_with(|| "fixture".into());
    }

    config.validate()?;
    Ok(config)
}

fn sheets_auth(config: &Config) -> Result<SheetsAuth> {
    if let Some(token) = std::env::var(&config.sheet.access_token_env)
        .ok()
        .filter(|t| !t.trim().is_empty())
    {
        return Ok(SheetsAuth::AccessToken(token));
    }
    match &config.sheet.credentials_path {
        Some(path) => SheetsAuth::from_credentials_file(path)
            .with_context(|| format!("failed to load Google credentials from {}", path.display())),
        None => bail!(
            "no Google credentials: set {} or sheet.credentials_path",
            config.sheet.access_token_env
        ),
    }
}

fn build_publishers(config: &Config, dry_run: bool) -> Result<Vec<Box<dyn SheetPublisher>>> {
    let mut publishers: Vec<Box<dyn SheetPublisher>> = Vec::new();

    match (&config.sheet.url, dry_run) {
        (_, true) => info!("dry run: skipping Google Sheets publish"),
        (None, false) => warn!("no sheet URL configured; skipping Google Sheets publish"),
        (Some(url), false) => {
            let publisher = GoogleSheetsPublisher::new(url, &config.sheet.worksheet, sheets_auth(config)?)?
                .with_api_base(&config.sheet.api_base)?;
            publishers.push(Box::new(publisher));
        }
    }

    if let Some(path) = &config.output.csv_path {
        publishers.push(Box::new(CsvPublisher::new(path)));
    }
    Ok(publishers)
}

fn run_export(args: RunArgs) -> Result<()> {
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            std::process::exit(EXIT_CONFIG);
        }
    };
    let publishers = match build_publishers(&config, args.dry_run) {
        Ok(publishers) => publishers,
        Err(e) => {
            eprintln!("Publisher setup failed: {e:#}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    match &args.fixture {
        Some(path) => {
            let provider = FixtureProvider::from_file(path)?;
            execute(&provider, &config, &publishers)
        }
        None => {
            let provider = RobinhoodClient::new(&config.provider.base_url, config.provider.timeout())?;
            execute(&provider, &config, &publishers)
        }
    }
}

fn execute<P>(provider: &P, config: &Config, publishers: &[Box<dyn SheetPublisher>]) -> Result<()>
where
    P: SessionProvider + MarketDataProvider,
{
    let publishers: Vec<&dyn SheetPublisher> = publishers.iter().map(|p| p.as_ref()).collect();

    let report = match run_job(provider, provider, &publishers, config) {
        Ok(report) => report,
        Err(e) => {
            error!("run failed: {e}");
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    };

    if let Some(path) = &config.output.report_path {
        report.write_json(path)?;
        info!("run report written to {}", path.display());
    }
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("Watchlist:    {} ({} symbols)", report.watchlist, report.watchlist_size);
    println!("Prices found: {}/{}", report.prices_found, report.watchlist_size);
    println!("Batches:      {} ({} failed)", report.chunks.len(), report.failed_chunks());
    println!("Rows:         {}", report.rows);
    println!("Fingerprint:  {}", report.fingerprint);
    for outcome in &report.publish {
        match &outcome.status {
            PublishStatus::Published(receipt) => println!(
                "Published:    {} -> {}{}",
                outcome.publisher,
                receipt.destination,
                if receipt.created { " (created)" } else { "" }
            ),
            PublishStatus::Failed { error } => {
                eprintln!("Publish failed: {} -> {}", outcome.publisher, error)
            }
        }
    }
}
