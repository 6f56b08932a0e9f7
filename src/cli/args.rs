//! Command line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::providers::MetadataSource;

/// Metadata Resolver - Find movie and TV metadata across multiple sources
#[derive(Parser, Debug)]
#[command(name = "metadata-resolver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip preflight checks
    #[arg(long, global = true)]
    pub skip_preflight: bool,

    /// Config file (default: <config dir>/metadata_resolver/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search metadata through the fallback chain
    Search {
        /// Title to search for
        #[arg(value_name = "QUERY")]
        query: String,

        /// Search TV shows instead of movies
        #[arg(long)]
        tv: bool,

        /// Release year filter
        #[arg(short = 'y', long)]
        year: Option<i32>,

        /// Preferred response language (e.g. zh-TW, en-US)
        #[arg(short = 'l', long)]
        language: Option<String>,

        /// Result page
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Query only this source (tmdb, douban, wikipedia)
        #[arg(short = 's', long)]
        source: Option<MetadataSource>,

        /// Disable AI keyword retries
        #[arg(long)]
        no_ai: bool,

        /// Output format: table, json
        #[arg(short = 'f', long, default_value = "table")]
        format: String,
    },

    /// Merge partial results from a JSON file
    Merge {
        /// JSON array of per-source results
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output format: table, json
        #[arg(short = 'f', long, default_value = "table")]
        format: String,
    },

    /// Check that configured services are reachable
    Preflight,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from([
            "metadata-resolver",
            "search",
            "駭客任務",
            "--year",
            "1999",
            "--source",
            "tmdb",
            "--no-ai",
        ]);

        match cli.command {
            Commands::Search {
                query,
                year,
                source,
                no_ai,
                tv,
                page,
                ..
            } => {
                assert_eq!(query, "駭客任務");
                assert_eq!(year, Some(1999));
                assert_eq!(source, Some(MetadataSource::Tmdb));
                assert!(no_ai);
                assert!(!tv);
                assert_eq!(page, 1);
            }
            other => panic!("Expected Search, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_merge_with_global_flags() {
        let cli = Cli::parse_from(["metadata-resolver", "merge", "results.json", "-v", "-f", "json"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Merge { file, format } => {
                assert_eq!(file, PathBuf::from("results.json"));
                assert_eq!(format, "json");
            }
            other => panic!("Expected Merge, got {:?}", other),
        }
    }
}
