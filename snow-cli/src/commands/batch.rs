//! Batch Commands
//!
//! Commands for configuring and inspecting draw batches.

use clap::Subcommand;

/// Batch subcommands
#[derive(Subcommand, Debug)]
pub enum BatchCommands {
    /// Create a draw batch
    Create {
        /// Batch ID (positive integer)
        #[arg(short, long)]
        batch: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Total winners the batch may ever have
        #[arg(short, long)]
        quota: u32,

        /// Order window start (RFC 3339 or "YYYY-MM-DD HH:MM:SS", UTC)
        #[arg(long)]
        order_begin: String,

        /// Order window end, exclusive
        #[arg(long)]
        order_end: String,

        /// Scheduled draw time
        #[arg(long)]
        draw_at: String,

        /// Prize tier as NAME:COUNT, repeatable, first tier goes to the earliest winners
        #[arg(short, long = "prize")]
        prizes: Vec<String>,

        /// Free-form remarks
        #[arg(short, long, default_value = "")]
        remarks: String,
    },

    /// Change the configuration of an existing batch
    Update {
        /// Batch ID
        #[arg(short, long)]
        batch: String,

        /// New display name
        #[arg(short, long)]
        name: Option<String>,

        /// New quota, not below the winners already drawn
        #[arg(short, long)]
        quota: Option<u32>,

        /// New order window start
        #[arg(long)]
        order_begin: Option<String>,

        /// New order window end, exclusive
        #[arg(long)]
        order_end: Option<String>,

        /// New scheduled draw time
        #[arg(long)]
        draw_at: Option<String>,

        /// Replacement prize tiers as NAME:COUNT, repeatable
        #[arg(short, long = "prize")]
        prizes: Vec<String>,

        /// New remarks
        #[arg(short, long)]
        remarks: Option<String>,
    },

    /// Show a batch summary
    Show {
        /// Batch ID
        #[arg(short, long)]
        batch: String,
    },

    /// List all batches
    List,
}

impl BatchCommands {
    /// Get a description of the batch operation
    pub fn description(&self) -> &'static str {
        match self {
            BatchCommands::Create { .. } => "batch creation",
            BatchCommands::Update { .. } => "batch update",
            BatchCommands::Show { .. } => "batch lookup",
            BatchCommands::List => "batch listing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_parse_create_with_prizes() {
        let cli = Cli::try_parse_from([
            "snow",
            "batch",
            "create",
            "--batch",
            "3",
            "--name",
            "Winter",
            "--quota",
            "5",
            "--order-begin",
            "2024-12-01 00:00:00",
            "--order-end",
            "2024-12-08 00:00:00",
            "--draw-at",
            "2024-12-09T12:00:00Z",
            "--prize",
            "Gold:1",
            "--prize",
            "Silver:4",
        ])
        .unwrap();

        match cli.command {
            Commands::Batch(cmd @ BatchCommands::Create { .. }) => {
                assert_eq!(cmd.description(), "batch creation");
                if let BatchCommands::Create { prizes, quota, .. } = cmd {
                    assert_eq!(prizes, vec!["Gold:1", "Silver:4"]);
                    assert_eq!(quota, 5);
                }
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_update_leaves_unset_fields_empty() {
        let cli = Cli::try_parse_from(["snow", "batch", "update", "--batch", "3", "--quota", "8", "--remarks", "extended"])
            .unwrap();

        match cli.command {
            Commands::Batch(cmd @ BatchCommands::Update { .. }) => {
                assert_eq!(cmd.description(), "batch update");
                if let BatchCommands::Update {
                    batch,
                    name,
                    quota,
                    order_end,
                    prizes,
                    remarks,
                    ..
                } = cmd
                {
                    assert_eq!(batch, "3");
                    assert_eq!(quota, Some(8));
                    assert_eq!(remarks.as_deref(), Some("extended"));
                    assert!(name.is_none() && order_end.is_none() && prizes.is_empty());
                }
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
