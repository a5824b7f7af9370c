//! CLI Commands Module
//!
//! Command definitions for the snow draw CLI.

pub mod batch;
pub mod participant;

use clap::{Parser, Subcommand};

/// Snow lottery draw CLI
#[derive(Parser, Debug)]
#[command(name = "snow")]
#[command(author = "Rainbow City Foundation")]
#[command(version)]
#[command(about = "Snow lottery draw and eligibility engine")]
#[command(long_about = "A command-line tool for running lottery draws.\n\n\
    Use this tool to configure draw batches, register and enroll participants, \
    draw winners and verify winning codes against a local store.")]
pub struct Cli {
    /// Data directory (env: SNOW_DRAW_DATA_DIR)
    #[arg(short, long, env = "SNOW_DRAW_DATA_DIR", default_value = "./snow_draw_data")]
    pub data_dir: String,

    /// Cross-batch winner policy, overrides SNOW_DRAW_WINNER_POLICY
    #[arg(long, value_enum)]
    pub winner_policy: Option<PolicyArg>,

    /// Output format (json, table, plain)
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Table format (human-readable)
    Table,
    /// Plain text
    Plain,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Table
    }
}

/// Winner policy options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PolicyArg {
    /// Winners of one batch cannot win another
    Exclude,
    /// Batches are independent
    Allow,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage draw batches
    #[command(subcommand)]
    Batch(batch::BatchCommands),

    /// Manage participants
    #[command(subcommand)]
    Participant(participant::ParticipantCommands),

    /// Draw winners for a batch
    Draw {
        /// Batch ID
        #[arg(short, long)]
        batch: String,

        /// Number of winners to draw
        #[arg(short, long, default_value = "1")]
        count: u32,

        /// Idempotency key for retried requests
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Verify a winning code
    Verify {
        /// Participant mobile
        #[arg(short, long)]
        mobile: String,

        /// Batch ID
        #[arg(short, long)]
        batch: String,

        /// Submitted code
        #[arg(short, long)]
        code: String,
    },

    /// List winners of a batch
    Winners {
        /// Batch ID
        #[arg(short, long)]
        batch: String,

        /// Mask personal data for public announcement
        #[arg(long)]
        public: bool,

        /// Mobile of the viewer whose own row stays unmasked
        #[arg(long, requires = "public")]
        viewer: Option<String>,
    },

    /// Export success records of a batch
    Records {
        /// Batch ID
        #[arg(short, long)]
        batch: String,
    },

    /// Show store statistics
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_help() {
        let result = Cli::try_parse_from(["snow", "--help"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Table);
    }

    #[test]
    fn test_parse_draw() {
        let cli = Cli::try_parse_from([
            "snow", "--data-dir", "/tmp/draws", "draw", "--batch", "1", "--count", "5", "--key", "k1",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, "/tmp/draws");
        match cli.command {
            Commands::Draw { batch, count, key } => {
                assert_eq!(batch, "1");
                assert_eq!(count, 5);
                assert_eq!(key.as_deref(), Some("k1"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_policy() {
        let cli = Cli::try_parse_from(["snow", "--winner-policy", "allow", "stats"]).unwrap();
        assert_eq!(cli.winner_policy, Some(PolicyArg::Allow));
    }

    #[test]
    fn test_parse_winners_viewer_requires_public() {
        let cli = Cli::try_parse_from(["snow", "winners", "--batch", "1", "--public", "--viewer", "18107290804"])
            .unwrap();
        match cli.command {
            Commands::Winners { public, viewer, .. } => {
                assert!(public);
                assert_eq!(viewer.as_deref(), Some("18107290804"));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["snow", "winners", "--batch", "1", "--viewer", "18107290804"]).is_err());
    }
}
