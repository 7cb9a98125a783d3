//! LedgerScope - transaction export analysis reports
//!
//! A CLI tool that loads a payments, refunds, customers, sales or ledger
//! CSV export, runs every analysis registered for that domain and writes a
//! single Markdown or JSON report.
//!
//! Exit codes:
//!   0 - Success (individual analyses may still have failed)
//!   1 - Runtime error (config, input, write failure, etc.)

mod analysis;
mod cli;
mod config;
mod dataset;
mod domains;
mod error;
mod models;
mod report;
mod runner;

use analysis::DispatchOptions;
use anyhow::{Context, Result};
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use dataset::Input;
use domains::Domain;
use indicatif::{ProgressBar, ProgressStyle};
use runner::{RunOptions, DEFAULT_TITLE};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    if args.list {
        print_registries();
        return Ok(());
    }

    // Initialize logging
    init_logging(&args);

    info!("LedgerScope v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default ledgerscope.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Add a [reports.<name>] entry per CSV export you want analyzed.");
    Ok(())
}

/// Handle --list: print every domain's columns and analyses in report order.
fn print_registries() {
    for domain in Domain::ALL {
        let registry = domain.registry();
        let columns: Vec<String> = domain
            .schema()
            .columns
            .iter()
            .map(|c| {
                if c.required {
                    c.name.to_string()
                } else {
                    format!("{} (optional)", c.name)
                }
            })
            .collect();
        println!("📚 {} ({} analyses)", domain, registry.len());
        println!("   Columns: {}", columns.join(", "));
        for analysis in registry.iter() {
            println!("   - {:<36} {}", analysis.id, analysis.title);
        }
        println!();
    }
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// One report to produce.
struct Job {
    name: String,
    domain: Domain,
    csv: PathBuf,
    title: String,
    output: PathBuf,
}

/// Resolve the jobs, then generate each report in turn.
async fn run(args: Args) -> Result<()> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let jobs = collect_jobs(&args, &config)?;
    if jobs.is_empty() {
        println!(
            "ℹ️  Nothing to do. Add [reports.<name>] entries to {} or use --module.",
            DEFAULT_CONFIG_FILE
        );
        return Ok(());
    }

    let options = RunOptions {
        format: config.general.format,
        presentation: config.report.clone(),
        dispatch: DispatchOptions {
            concurrency: config.general.concurrency.max(1),
            timeout: config
                .general
                .analysis_timeout_seconds
                .map(Duration::from_secs),
            progress: None,
        },
    };

    let mut written = Vec::with_capacity(jobs.len());
    for job in &jobs {
        println!("\n📊 Generating '{}' ({} report)", job.title, job.domain);
        println!("   Input: {}", job.csv.display());

        let pb = create_progress_bar(job.domain, args.quiet);
        let job_options = RunOptions {
            dispatch: DispatchOptions {
                progress: pb.clone(),
                ..options.dispatch.clone()
            },
            ..options.clone()
        };

        let result = runner::run_report(
            job.domain,
            Input::csv(&job.csv),
            &job.title,
            &job.output,
            &job_options,
        )
        .await;

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        let path = result.with_context(|| format!("Report '{}' failed", job.name))?;
        println!("   ✅ Saved to: {}", path.display());
        written.push(path);
    }

    println!(
        "\n✅ Done! {} report(s) written in {:.1}s",
        written.len(),
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Turn the ad-hoc flags or the selected config entries into jobs.
fn collect_jobs(args: &Args, config: &Config) -> Result<Vec<Job>> {
    if let (Some(module), Some(csv), Some(output)) = (&args.module, &args.csv, &args.output) {
        let domain: Domain = module.parse()?;
        return Ok(vec![Job {
            name: domain.to_string(),
            domain,
            csv: csv.clone(),
            title: args
                .title
                .clone()
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            output: output.clone(),
        }]);
    }

    config
        .selected_reports(&args.reports)?
        .into_iter()
        .map(|(name, entry)| {
            let domain: Domain = entry
                .module
                .parse()
                .with_context(|| format!("Invalid module for report '{}'", name))?;
            Ok::<_, anyhow::Error>(Job {
                name: name.to_string(),
                domain,
                csv: entry.csv.clone(),
                title: entry.title_or(name).to_string(),
                output: entry.output.clone(),
            })
        })
        .collect()
}

/// Progress bar over the domain's analyses, hidden in quiet mode.
fn create_progress_bar(domain: Domain, quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let pb = ProgressBar::new(domain.registry().len() as u64);
    match ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} analyses")
    {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => warn!("Invalid progress template: {}", e),
    }
    Some(pb)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) if args.is_ad_hoc() => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
        Err(e) => Err(e),
    }
}
