//! gymcrawl CLI
//!
//! Local entry point for config validation and offline record fusion.
//! Crawling itself requires source adapters wired in by the host
//! application; see the library documentation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gymcrawl::{
    error::{AppError, Result},
    models::{CrawlConfig, GymRecord},
    pipeline::DataFusionEngine,
};

/// gymcrawl - multi-source gym data crawl engine
#[derive(Parser, Debug)]
#[command(name = "gymcrawl", version, about = "Multi-source gym data crawl engine")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a crawl configuration file
    Validate {
        /// Path to the TOML config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },

    /// Merge a JSON array of gym records and report quality
    Fuse {
        /// Path to a JSON file containing an array of records
        input: PathBuf,

        /// Write fused records to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Drop fused records below this confidence
        #[arg(long, default_value_t = 0.0)]
        min_confidence: f64,
    },

    /// Print the built-in default configuration as TOML
    Defaults,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Validate { config } => {
            log::info!("Validating configuration at {}", config.display());
            let config = CrawlConfig::load(&config)?;
            let report = config.validate();

            if report.is_valid {
                log::info!("Config OK");
                log::info!(
                    "  batch size {} (bounds {}..={}), {} sources enabled",
                    config.batch.initial_size,
                    config.batch.min_size,
                    config.batch.max_size,
                    config.sources.enabled.len()
                );
            } else {
                for error in &report.errors {
                    log::error!("  {}", error);
                }
                return Err(AppError::validation(format!(
                    "{} validation error(s)",
                    report.errors.len()
                )));
            }
        }

        Command::Fuse {
            input,
            output,
            min_confidence,
        } => {
            let content = std::fs::read_to_string(&input)?;
            let records: Vec<GymRecord> = serde_json::from_str(&content)?;
            log::info!("Loaded {} records from {}", records.len(), input.display());

            let engine = DataFusionEngine::new(min_confidence);
            let fused = engine.merge_records(records);
            let fused = engine.filter_by_confidence(fused);
            log::info!("Fused into {} canonical records", fused.len());

            let buckets = engine.classify_by_quality(&fused);
            log::info!(
                "Quality: {} high / {} medium / {} low",
                buckets.high.len(),
                buckets.medium.len(),
                buckets.low.len()
            );

            let mut sources: Vec<_> = engine.source_statistics(&fused).into_iter().collect();
            sources.sort_by(|a, b| a.0.cmp(&b.0));
            for (source, stats) in sources {
                log::info!(
                    "  {}: {} records, avg confidence {:.2}",
                    source,
                    stats.count,
                    stats.avg_confidence
                );
            }

            let json = serde_json::to_string_pretty(&fused)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    log::info!("Fused records written to {}", path.display());
                }
                None => println!("{json}"),
            }
        }

        Command::Defaults => {
            let toml = toml::to_string_pretty(&CrawlConfig::default())?;
            println!("{toml}");
        }
    }

    Ok(())
}
