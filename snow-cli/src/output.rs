//! Output Formatting
//!
//! Utilities for formatting CLI output in various formats.

use crate::commands::OutputFormat;
use chrono::{DateTime, Utc};
use serde::Serialize;
use snow_draw::{
    BatchSummary, DrawOutcome, Participant, PublicWinner, StorageStats, SuccessRecord, VerificationOutcome,
    WinnerView,
};

/// Format and print data based on output format
pub fn print_output<T: Serialize>(data: &T, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(data),
        OutputFormat::Table | OutputFormat::Plain => {
            // For generic types, fall back to JSON
            print_json(data)
        }
    }
}

/// Print as JSON
fn print_json<T: Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error formatting JSON: {}", e),
    }
}

fn time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

/// Print a participant
pub fn print_participant(participant: &Participant, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(participant),
        OutputFormat::Plain => println!("{}", participant.id),
        OutputFormat::Table => {
            println!("Participant {}", participant.id);
            print_separator();
            print_row("Nickname:", &participant.profile.nickname);
            print_row("Mobile:", &participant.profile.mobile);
            print_row("Registered:", &time(&participant.registered_at));
            print_row("Version:", &participant.version.to_string());

            let address = &participant.profile.address;
            if !address.is_empty() {
                print_row(
                    "Address:",
                    &format!(
                        "{} {} {} {} {} {}",
                        address.receiver_name,
                        address.receiver_phone,
                        address.province,
                        address.city,
                        address.county,
                        address.detailed
                    ),
                );
            }

            let won = participant.won_batches();
            if !won.is_empty() {
                let batches: Vec<String> = won.iter().map(|b| b.to_string()).collect();
                print_row("Won batches:", &batches.join(", "));
            }
        }
    }
}

/// Print a participant list
pub fn print_participants(participants: &[Participant], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&participants),
        OutputFormat::Plain => {
            for p in participants {
                println!("{}\t{}", p.id, p.profile.mobile);
            }
        }
        OutputFormat::Table => {
            println!("{:<10} {:<16} {}", "ID", "MOBILE", "NICKNAME");
            for p in participants {
                println!("{:<10} {:<16} {}", p.id, p.profile.mobile, p.profile.nickname);
            }
            println!();
            println!("{} participants", participants.len());
        }
    }
}

/// Print a batch summary
pub fn print_batch(summary: &BatchSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Plain => println!("{}\t{:?}", summary.batch_id, summary.status),
        OutputFormat::Table => {
            println!("Batch {}: {}", summary.batch_id, summary.name);
            print_separator();
            print_row("Status:", &format!("{:?}", summary.status));
            print_row("Quota:", &summary.quota.to_string());
            print_row("Winners:", &summary.winners.to_string());
            print_row("Remaining:", &summary.remaining_quota.to_string());
            print_row("Enrolled:", &summary.enrolled.to_string());
            print_row("Draws:", &summary.draws.to_string());
            print_row("Order window:", &format!("{} .. {}", time(&summary.order_begin), time(&summary.order_end)));
            print_row("Draw at:", &time(&summary.draw_at));
        }
    }
}

/// Print a batch list
pub fn print_batches(summaries: &[BatchSummary], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&summaries),
        OutputFormat::Table | OutputFormat::Plain => {
            println!("{:<8} {:<10} {:>6} {:>8} {:>9}  {}", "BATCH", "STATUS", "QUOTA", "WINNERS", "ENROLLED", "NAME");
            for s in summaries {
                println!(
                    "{:<8} {:<10} {:>6} {:>8} {:>9}  {}",
                    s.batch_id,
                    format!("{:?}", s.status),
                    s.quota,
                    s.winners,
                    s.enrolled,
                    s.name
                );
            }
        }
    }
}

/// Print a draw outcome
pub fn print_draw_outcome(outcome: &DrawOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(outcome),
        OutputFormat::Plain => {
            for w in &outcome.selected {
                println!("{}\t{}", w.participant_id, w.draw_code);
            }
        }
        OutputFormat::Table => {
            println!("Draw Result: batch {}", outcome.batch_id);
            print_separator();
            print_row("Status:", &format!("{:?}", outcome.status));
            print_row("Requested:", &outcome.requested.to_string());
            print_row("Selected:", &outcome.selected.len().to_string());
            print_row("Fulfilled:", if outcome.fulfilled { "yes" } else { "no" });
            print_row("Eligible pool:", &outcome.eligible_pool.to_string());
            print_row("Remaining quota:", &outcome.remaining_quota.to_string());

            if !outcome.selected.is_empty() {
                println!();
                println!("{:<10} {:<10} {}", "ID", "CODE", "PRIZE");
                for w in &outcome.selected {
                    println!("{:<10} {:<10} {}", w.participant_id, w.draw_code, or_dash(w.prize.as_deref()));
                }
            }
        }
    }
}

/// Print a verification outcome
pub fn print_verification(outcome: &VerificationOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(outcome),
        OutputFormat::Plain => println!("{}", outcome.matched),
        OutputFormat::Table => {
            println!("Verification Result");
            print_separator();
            print_row("Participant:", &outcome.participant_id.to_string());
            print_row("Batch:", &outcome.batch_id.to_string());
            print_row("Status:", &format!("{:?}", outcome.status));
            print_row("Matched:", if outcome.matched { "yes" } else { "no" });
            if let Some(at) = &outcome.verified_at {
                print_row("Verified at:", &time(at));
            }
        }
    }
}

/// Print the full winner list
pub fn print_winners(winners: &[WinnerView], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&winners),
        OutputFormat::Plain => {
            for w in winners {
                println!("{}\t{}\t{}", w.participant_id, w.mobile, w.draw_code);
            }
        }
        OutputFormat::Table => {
            println!(
                "{:<10} {:<14} {:<16} {:<8} {:<12} {}",
                "ID", "MOBILE", "NICKNAME", "CODE", "PRIZE", "VERIFIED"
            );
            for w in winners {
                println!(
                    "{:<10} {:<14} {:<16} {:<8} {:<12} {}",
                    w.participant_id,
                    w.mobile,
                    w.nickname,
                    w.draw_code,
                    or_dash(w.prize.as_deref()),
                    if w.verified { "yes" } else { "no" }
                );
            }
        }
    }
}

/// Print the masked winner list
pub fn print_public_winners(winners: &[PublicWinner], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&winners),
        OutputFormat::Table | OutputFormat::Plain => {
            for w in winners {
                println!(
                    "{:<16} {:<14} {:<12} {}{}",
                    w.nickname,
                    w.mobile,
                    or_dash(w.order_number.as_deref()),
                    or_dash(w.prize.as_deref()),
                    if w.is_viewer { "  (you)" } else { "" }
                );
            }
        }
    }
}

/// Print success records
pub fn print_records(records: &[SuccessRecord], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&records),
        OutputFormat::Table | OutputFormat::Plain => {
            println!(
                "{:<10} {:<14} {:<9} {:<9} {:<4} {:<9} {}",
                "ID", "MOBILE", "ELIGIBLE", "ENROLLED", "WON", "VERIFIED", "CODE"
            );
            for r in records {
                println!(
                    "{:<10} {:<14} {:<9} {:<9} {:<4} {:<9} {}",
                    r.participant_id,
                    r.mobile,
                    r.eligible,
                    r.participated,
                    r.won,
                    r.verified,
                    or_dash(r.draw_code.as_deref())
                );
            }
        }
    }
}

/// Print storage statistics
pub fn print_stats(stats: &StorageStats, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "total_participants": stats.total_participants,
                "total_batches": stats.total_batches,
                "total_winners": stats.total_winners,
                "total_success_records": stats.total_success_records,
            })
        ),
        OutputFormat::Table | OutputFormat::Plain => {
            println!("Store Statistics");
            println!("================");
            println!("Participants:     {}", stats.total_participants);
            println!("Batches:          {}", stats.total_batches);
            println!("Winners:          {}", stats.total_winners);
            println!("Success records:  {}", stats.total_success_records);
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{}", message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("{}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("Warning: {}", message);
}

/// Print a key-value row
pub fn print_row(key: &str, value: &str) {
    println!("{:<20} {}", key, value);
}

/// Print a separator line
pub fn print_separator() {
    println!("{}", "-".repeat(40));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash(None), "-");
        assert_eq!(or_dash(Some("Gold")), "Gold");
    }

    #[test]
    fn test_time_format() {
        let at = DateTime::parse_from_rfc3339("2024-12-01T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(time(&at), "2024-12-01 08:30:00");
    }
}
