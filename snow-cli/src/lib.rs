//! Snow CLI - Command Line Interface
//!
//! This crate provides a command-line interface for operating the snow
//! lottery draw engine against a local sled store.
//!
//! # Usage
//!
//! ```text
//! snow [OPTIONS] <COMMAND>
//!
//! Commands:
//!   batch        Manage draw batches
//!   participant  Manage participants
//!   draw         Draw winners for a batch
//!   verify       Verify a winning code
//!   winners      List winners of a batch
//!   records      Export success records of a batch
//!   stats        Show store statistics
//!
//! Options:
//!   -d, --data-dir <DIR>          Data directory [env: SNOW_DRAW_DATA_DIR]
//!       --winner-policy <POLICY>  Cross-batch winner policy (exclude, allow)
//!   -f, --format <FORMAT>         Output format (json, table, plain) [default: table]
//!   -v, --verbose                 Enable verbose output
//! ```
//!
//! # Examples
//!
//! ## Configure a batch
//! ```text
//! snow batch create --batch 1 --name "Winter" --quota 3 \
//!   --order-begin 2024-12-01 --order-end 2024-12-08 --draw-at 2024-12-09 \
//!   --prize "Gold:1" --prize "Silver:2"
//! snow batch update --batch 1 --quota 5 --prize "Gold:1" --prize "Silver:4"
//! ```
//!
//! ## Register, grant and enroll
//! ```text
//! snow participant register --nickname Snow --mobile 18107290804
//! snow participant grant --mobile 18107290804 --batch 1 --order-number SO20241201 \
//!   --ordered-at "2024-12-02 10:00:00"
//! snow participant enroll --mobile 18107290804 --batch 1
//! ```
//!
//! ## Draw and verify
//! ```text
//! snow draw --batch 1 --count 3 --key winter-main
//! snow verify --mobile 18107290804 --batch 1 --code Ab3x
//! snow winners --batch 1 --public --viewer 18107290804
//! ```

pub mod commands;
pub mod error;
pub mod handler;
pub mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use error::{CliError, CliResult};

/// Snow CLI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
