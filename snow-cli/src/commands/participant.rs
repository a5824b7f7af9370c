//! Participant Commands
//!
//! Commands for registering participants and managing their batch state.

use clap::Subcommand;

/// Participant subcommands
#[derive(Subcommand, Debug)]
pub enum ParticipantCommands {
    /// Register a participant
    Register {
        /// Display name
        #[arg(short, long)]
        nickname: String,

        /// Mobile number (unique)
        #[arg(short, long)]
        mobile: String,
    },

    /// Show a participant by mobile
    Show {
        /// Mobile number
        #[arg(short, long)]
        mobile: String,
    },

    /// Update profile and shipping address
    Update {
        /// Mobile number identifying the participant
        #[arg(short, long)]
        mobile: String,

        /// New display name
        #[arg(long)]
        nickname: Option<String>,

        /// New mobile number
        #[arg(long)]
        new_mobile: Option<String>,

        /// Receiver name
        #[arg(long)]
        receiver_name: Option<String>,

        /// Receiver phone
        #[arg(long)]
        receiver_phone: Option<String>,

        /// Province
        #[arg(long)]
        province: Option<String>,

        /// City
        #[arg(long)]
        city: Option<String>,

        /// County
        #[arg(long)]
        county: Option<String>,

        /// Street address
        #[arg(long)]
        detailed: Option<String>,
    },

    /// Grant eligibility for a batch
    Grant {
        /// Mobile number
        #[arg(short, long)]
        mobile: String,

        /// Batch ID
        #[arg(short, long)]
        batch: String,

        /// Qualifying order number
        #[arg(short, long)]
        order_number: Option<String>,

        /// Qualifying order time (RFC 3339 or "YYYY-MM-DD HH:MM:SS", UTC)
        #[arg(long)]
        ordered_at: Option<String>,
    },

    /// Revoke eligibility for a batch
    Revoke {
        /// Mobile number
        #[arg(short, long)]
        mobile: String,

        /// Batch ID
        #[arg(short, long)]
        batch: String,
    },

    /// Enroll into a batch draw pool
    Enroll {
        /// Mobile number
        #[arg(short, long)]
        mobile: String,

        /// Batch ID
        #[arg(short, long)]
        batch: String,
    },

    /// List all participants
    List,
}

impl ParticipantCommands {
    /// Get a description of the participant operation
    pub fn description(&self) -> &'static str {
        match self {
            ParticipantCommands::Register { .. } => "registration",
            ParticipantCommands::Show { .. } => "participant lookup",
            ParticipantCommands::Update { .. } => "profile update",
            ParticipantCommands::Grant { .. } => "eligibility grant",
            ParticipantCommands::Revoke { .. } => "eligibility revocation",
            ParticipantCommands::Enroll { .. } => "enrollment",
            ParticipantCommands::List => "participant listing",
        }
    }
}
