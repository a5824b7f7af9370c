//! Command Handlers
//!
//! Handler functions for CLI commands.

use crate::commands::{
    batch::BatchCommands, participant::ParticipantCommands, Cli, Commands, OutputFormat, PolicyArg,
};
use crate::error::{CliError, CliResult};
use crate::output;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use snow_draw::{
    Address, BatchConfig, BatchId, BatchUpdate, DrawRequest, DrawService, DrawStorage, EligibilityGrant, EngineConfig,
    PrizeTier, Profile, ProfileUpdate, SledStorage, StorageBackend, WinnerPolicy,
};
use tracing::debug;

pub type Service = DrawService<SledStorage>;

/// Run the CLI with parsed arguments
pub async fn run(cli: Cli) -> CliResult<()> {
    let service = open_service(&cli)?;
    let result = dispatch(&service, cli.command, cli.format).await;
    service.storage().flush()?;
    result
}

/// Execute one command against an opened service
pub async fn dispatch(service: &Service, command: Commands, format: OutputFormat) -> CliResult<()> {
    match command {
        Commands::Batch(cmd) => handle_batch(service, cmd, format).await,
        Commands::Participant(cmd) => handle_participant(service, cmd, format).await,
        Commands::Draw { batch, count, key } => handle_draw(service, &batch, count, key, format).await,
        Commands::Verify { mobile, batch, code } => handle_verify(service, &mobile, &batch, &code, format).await,
        Commands::Winners { batch, public, viewer } => {
            handle_winners(service, &batch, public, viewer.as_deref(), format).await
        }
        Commands::Records { batch } => handle_records(service, &batch, format).await,
        Commands::Stats => handle_stats(service, format).await,
    }
}

/// Build the engine configuration from the environment and CLI overrides
fn engine_config(cli: &Cli) -> CliResult<EngineConfig> {
    let data_dir = cli.data_dir.trim();
    if data_dir.is_empty() {
        return Err(CliError::config("data directory must not be empty"));
    }

    let mut config = EngineConfig::from_env();
    config.storage.backend = StorageBackend::Sled;
    config.storage.data_dir = data_dir.to_string();
    if let Some(policy) = cli.winner_policy {
        config.winner_policy = match policy {
            PolicyArg::Exclude => WinnerPolicy::ExcludePriorWinners,
            PolicyArg::Allow => WinnerPolicy::AllowRepeatWinners,
        };
    }
    Ok(config)
}

/// Open the sled-backed service named by the CLI flags
pub fn open_service(cli: &Cli) -> CliResult<Service> {
    let config = engine_config(cli)?;
    debug!(data_dir = %config.storage.data_dir, policy = ?config.winner_policy, "Opening store");
    Ok(DrawService::open(config)?)
}

/// Handle batch commands
async fn handle_batch(service: &Service, cmd: BatchCommands, format: OutputFormat) -> CliResult<()> {
    debug!("Running {}", cmd.description());

    match cmd {
        BatchCommands::Create {
            batch,
            name,
            quota,
            order_begin,
            order_end,
            draw_at,
            prizes,
            remarks,
        } => {
            let config = BatchConfig {
                batch_id: BatchId::parse(&batch)?,
                name,
                prizes: prizes.iter().map(|p| parse_prize(p)).collect::<CliResult<Vec<_>>>()?,
                quota,
                order_begin: parse_time(&order_begin)?,
                order_end: parse_time(&order_end)?,
                draw_at: parse_time(&draw_at)?,
                remarks,
            };

            let created = service.engine().create_batch(config).await?;
            if format != OutputFormat::Json {
                output::print_success(&format!("Batch {} created", created.batch_id));
            }
            let summary = service.queries().batch_summary(created.batch_id).await?;
            output::print_batch(&summary, format);
        }
        BatchCommands::Update {
            batch,
            name,
            quota,
            order_begin,
            order_end,
            draw_at,
            prizes,
            remarks,
        } => {
            let update = BatchUpdate {
                name,
                prizes: if prizes.is_empty() {
                    None
                } else {
                    Some(prizes.iter().map(|p| parse_prize(p)).collect::<CliResult<Vec<_>>>()?)
                },
                quota,
                order_begin: order_begin.as_deref().map(parse_time).transpose()?,
                order_end: order_end.as_deref().map(parse_time).transpose()?,
                draw_at: draw_at.as_deref().map(parse_time).transpose()?,
                remarks,
            };
            if update.is_empty() {
                return Err(CliError::invalid_arg("batch update needs at least one field to change"));
            }

            let updated = service.engine().update_batch(BatchId::parse(&batch)?, update).await?;
            if format != OutputFormat::Json {
                output::print_success(&format!("Batch {} updated", updated.batch_id));
            }
            let summary = service.queries().batch_summary(updated.batch_id).await?;
            output::print_batch(&summary, format);
        }
        BatchCommands::Show { batch } => {
            let summary = service.queries().batch_summary(BatchId::parse(&batch)?).await?;
            output::print_batch(&summary, format);
        }
        BatchCommands::List => {
            let summaries = service.queries().batch_summaries().await?;
            if summaries.is_empty() && format != OutputFormat::Json {
                output::print_info("No batches configured");
                return Ok(());
            }
            output::print_batches(&summaries, format);
        }
    }

    Ok(())
}

/// Handle participant commands
async fn handle_participant(service: &Service, cmd: ParticipantCommands, format: OutputFormat) -> CliResult<()> {
    debug!("Running {}", cmd.description());
    let registry = service.registry();

    match cmd {
        ParticipantCommands::Register { nickname, mobile } => {
            let participant = registry.create(Profile::new(nickname, mobile)).await?;
            output::print_participant(&participant, format);
        }
        ParticipantCommands::Show { mobile } => {
            let participant = registry
                .find_by_mobile(&mobile)
                .await?
                .ok_or_else(|| CliError::not_found(format!("participant with mobile {}", mobile)))?;
            output::print_participant(&participant, format);
        }
        ParticipantCommands::Update {
            mobile,
            nickname,
            new_mobile,
            receiver_name,
            receiver_phone,
            province,
            city,
            county,
            detailed,
        } => {
            let participant = registry.get_by_mobile(&mobile).await?;
            let fields = [receiver_name, receiver_phone, province, city, county, detailed];
            let address = if fields.iter().any(Option::is_some) {
                Some(merge_address(&participant.profile.address, fields))
            } else {
                None
            };

            let update = ProfileUpdate {
                nickname,
                mobile: new_mobile,
                address,
            };
            let updated = registry.update_profile(participant.id, update).await?;
            output::print_participant(&updated, format);
        }
        ParticipantCommands::Grant {
            mobile,
            batch,
            order_number,
            ordered_at,
        } => {
            let participant = registry.get_by_mobile(&mobile).await?;
            let batch_id = BatchId::parse(&batch)?;
            let grant = EligibilityGrant {
                order_number,
                ordered_at: ordered_at.as_deref().map(parse_time).transpose()?,
            };
            registry.grant_eligibility(participant.id, batch_id, grant).await?;
            output::print_success(&format!("Participant {} is eligible for batch {}", participant.id, batch_id));
        }
        ParticipantCommands::Revoke { mobile, batch } => {
            let participant = registry.get_by_mobile(&mobile).await?;
            let batch_id = BatchId::parse(&batch)?;
            registry.revoke_eligibility(participant.id, batch_id).await?;
            output::print_success(&format!("Eligibility of participant {} for batch {} revoked", participant.id, batch_id));
        }
        ParticipantCommands::Enroll { mobile, batch } => {
            let participant = registry.get_by_mobile(&mobile).await?;
            let batch_id = BatchId::parse(&batch)?;
            let outcome = registry.enroll(participant.id, batch_id).await?;
            match format {
                OutputFormat::Json => output::print_output(&outcome, format),
                _ if outcome.newly_enrolled => {
                    output::print_success(&format!("Participant {} enrolled in batch {}", participant.id, batch_id))
                }
                _ => output::print_warning(&format!(
                    "Participant {} was already enrolled in batch {}",
                    participant.id, batch_id
                )),
            }
        }
        ParticipantCommands::List => {
            let participants = registry.list().await?;
            output::print_participants(&participants, format);
        }
    }

    Ok(())
}

/// Handle a draw
async fn handle_draw(
    service: &Service,
    batch: &str,
    count: u32,
    key: Option<String>,
    format: OutputFormat,
) -> CliResult<()> {
    let mut request = DrawRequest::new(BatchId::parse(batch)?, count);
    if let Some(key) = key {
        request = request.with_key(key);
    }

    let outcome = service.draw(request).await?;
    output::print_draw_outcome(&outcome, format);
    Ok(())
}

/// Handle code verification
async fn handle_verify(service: &Service, mobile: &str, batch: &str, code: &str, format: OutputFormat) -> CliResult<()> {
    let outcome = service.verify(mobile, BatchId::parse(batch)?, code).await?;
    output::print_verification(&outcome, format);
    Ok(())
}

/// Handle winner listing
async fn handle_winners(
    service: &Service,
    batch: &str,
    public: bool,
    viewer: Option<&str>,
    format: OutputFormat,
) -> CliResult<()> {
    let batch_id = BatchId::parse(batch)?;
    if public {
        let viewer = match viewer {
            Some(mobile) => Some(service.registry().get_by_mobile(mobile).await?.id),
            None => None,
        };
        let winners = service.queries().public_winners_for(batch_id, viewer).await?;
        output::print_public_winners(&winners, format);
    } else {
        let winners = service.queries().winners(batch_id).await?;
        output::print_winners(&winners, format);
    }
    Ok(())
}

/// Handle success record export
async fn handle_records(service: &Service, batch: &str, format: OutputFormat) -> CliResult<()> {
    let records = service.queries().success_records(BatchId::parse(batch)?).await?;
    output::print_records(&records, format);
    Ok(())
}

/// Handle store statistics
async fn handle_stats(service: &Service, format: OutputFormat) -> CliResult<()> {
    let stats = service.storage().get_stats().await?;
    output::print_stats(&stats, format);
    Ok(())
}

/// Parse a `NAME:COUNT` prize tier
fn parse_prize(raw: &str) -> CliResult<PrizeTier> {
    let (name, count) = raw
        .rsplit_once(':')
        .ok_or_else(|| CliError::invalid_arg(format!("prize must be NAME:COUNT, got '{}'", raw)))?;
    let count: u32 = count
        .trim()
        .parse()
        .map_err(|_| CliError::invalid_arg(format!("invalid prize count in '{}'", raw)))?;
    Ok(PrizeTier::new(name.trim(), count))
}

/// Parse an RFC 3339 timestamp, or a naive UTC date or datetime
fn parse_time(raw: &str) -> CliResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Some(naive) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    Err(CliError::invalid_arg(format!("unrecognized time '{}'", raw)))
}

fn merge_address(current: &Address, fields: [Option<String>; 6]) -> Address {
    let [receiver_name, receiver_phone, province, city, county, detailed] = fields;
    Address {
        receiver_name: receiver_name.unwrap_or_else(|| current.receiver_name.clone()),
        receiver_phone: receiver_phone.unwrap_or_else(|| current.receiver_phone.clone()),
        province: province.unwrap_or_else(|| current.province.clone()),
        city: city.unwrap_or_else(|| current.city.clone()),
        county: county.unwrap_or_else(|| current.county.clone()),
        detailed: detailed.unwrap_or_else(|| current.detailed.clone()),
    }
}
