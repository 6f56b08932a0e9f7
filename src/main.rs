//! Metadata Resolver CLI
//!
//! Looks up movie and TV metadata through a chain of sources, retrying with
//! AI generated keywords when every source misses.

use clap::Parser;
use metadata_resolver::cli::{
    args::{Cli, Commands},
    commands::{
        merge,
        search::{self, SearchCommand},
    },
};
use metadata_resolver::models::config::{self, Config};
use metadata_resolver::models::media::MediaType;
use metadata_resolver::preflight;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    let config = match cli.config {
        Some(ref path) => config::load_config_from(path)?,
        None => {
            let config = config::load_config();
            config.validate()?;
            config
        }
    };

    // Run the appropriate command
    match cli.command {
        Commands::Search {
            query,
            tv,
            year,
            language,
            page,
            source,
            no_ai,
            format,
        } => {
            // Run preflight checks unless skipped
            if !cli.skip_preflight {
                run_preflight_checks(&config).await?;
            }

            let command = SearchCommand {
                query,
                media_type: if tv { MediaType::Tv } else { MediaType::Movie },
                year,
                language,
                page,
                source,
                use_ai: !no_ai,
                format,
            };
            search::execute_search(&config, command).await?;
        }

        Commands::Merge { file, format } => {
            merge::execute_merge(&config, &file, &format)?;
        }

        Commands::Preflight => {
            run_preflight_checks(&config).await?;
        }
    }

    Ok(())
}

/// Initialize the logging system.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("metadata_resolver=debug")
    } else {
        EnvFilter::new("metadata_resolver=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Run preflight checks and exit if any fail.
async fn run_preflight_checks(config: &Config) -> anyhow::Result<()> {
    use colored::Colorize;

    println!("{}", "Running preflight checks...".bold());
    println!();

    let results = preflight::run_preflight_checks(config).await;
    preflight::print_results(&results);

    println!();

    if !preflight::all_passed(&results) {
        anyhow::bail!("Preflight checks failed. Fix the issues above and try again.");
    }

    Ok(())
}
