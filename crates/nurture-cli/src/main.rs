//! Campaign processing driver
//!
//! Runs one orchestrator operation per invocation — a processing pass or a
//! bulk enroll — against stores seeded from a JSON dataset, and prints the
//! structured result as JSON. Cadence is the caller's business: point cron
//! (or an operator) at this binary.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Arg, ArgAction, Command};
use nurture_core::transport::registry::{CredentialWriter, TransportResolver};
use nurture_core::{
    CredentialService, CredentialVault, InMemoryStore, OutreachConfig, SecretBag,
    SendOrchestrator, TransportRegistry,
};
use nurture_types::{Campaign, CampaignId, CampaignStep, Lead, LeadId, UserId};
use serde::Deserialize;
use std::sync::Arc;

/// Seed data loaded into the in-memory stores at startup
#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default)]
    campaigns: Vec<Campaign>,
    #[serde(default)]
    steps: Vec<CampaignStep>,
    #[serde(default)]
    leads: Vec<Lead>,
    #[serde(default)]
    credentials: Vec<PlainCredential>,
}

/// Plaintext credential from the dataset; encrypted into the store on load
#[derive(Debug, Deserialize)]
struct PlainCredential {
    user_id: i64,
    provider: String,
    secrets: SecretBag,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with INFO as default if RUST_LOG not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("nurture")
        .version("1.0.0")
        .about("Drip-campaign outreach processor")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("./outreach.json"),
        )
        .arg(
            Arg::new("data")
                .long("data")
                .value_name("FILE")
                .help("Dataset file with campaigns, steps, leads and credentials"),
        )
        .arg(
            Arg::new("campaign-id")
                .long("campaign-id")
                .value_name("ID")
                .help("Campaign to process"),
        )
        .arg(
            Arg::new("user-id")
                .long("user-id")
                .value_name("ID")
                .help("Acting user (campaign owner)"),
        )
        .arg(
            Arg::new("enroll")
                .long("enroll")
                .value_name("LEAD_IDS")
                .help("Enroll the comma-separated lead ids instead of processing"),
        )
        .arg(
            Arg::new("at")
                .long("at")
                .value_name("RFC3339")
                .help("Process as of this instant instead of now"),
        )
        .arg(
            Arg::new("generate-key")
                .long("generate-key")
                .help("Print a fresh vault key and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("generate-key") {
        println!("{}", nurture_core::generate_key());
        return Ok(());
    }

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = OutreachConfig::from_file(config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;
    log::info!("Loaded configuration from {}", config_path);

    let store = Arc::new(InMemoryStore::new());
    let vault = CredentialVault::from_base64(&config.security.encryption_key)?;
    let credentials = Arc::new(CredentialService::new(vault, store.clone()));

    let data_path = match matches.get_one::<String>("data") {
        Some(path) => path,
        None => bail!("--data is required (JSON dataset to operate on)"),
    };
    load_dataset(data_path, &store, &credentials).await?;

    let writer: Arc<dyn CredentialWriter> = credentials.clone();
    let resolver: Arc<dyn TransportResolver> = Arc::new(TransportRegistry::new(
        config.providers.clone(),
        config.send.clone(),
        &config.google,
        writer,
    ));

    let orchestrator = SendOrchestrator::new(
        store.clone(),
        store.clone(),
        credentials,
        resolver,
        config.send.clone(),
    );

    let campaign_id = CampaignId::new(parse_id(&matches, "campaign-id")?);
    let user_id = UserId::new(parse_id(&matches, "user-id")?);

    if let Some(lead_list) = matches.get_one::<String>("enroll") {
        let lead_ids: Vec<LeadId> = lead_list
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<i64>()
                    .map(LeadId::new)
                    .with_context(|| format!("invalid lead id '{}'", part))
            })
            .collect::<anyhow::Result<_>>()?;

        let outcome = orchestrator.enroll(campaign_id, user_id, &lead_ids).await?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let summary = match matches.get_one::<String>("at") {
        Some(timestamp) => {
            let at: DateTime<Utc> = timestamp
                .parse()
                .with_context(|| format!("invalid --at timestamp '{}'", timestamp))?;
            orchestrator
                .process_campaign_at(campaign_id, user_id, at)
                .await?
        }
        None => orchestrator.process_campaign(campaign_id, user_id).await?,
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn parse_id(matches: &clap::ArgMatches, name: &str) -> anyhow::Result<i64> {
    matches
        .get_one::<String>(name)
        .with_context(|| format!("--{} is required", name))?
        .parse::<i64>()
        .with_context(|| format!("--{} must be an integer", name))
}

async fn load_dataset(
    path: &str,
    store: &Arc<InMemoryStore>,
    credentials: &Arc<CredentialService>,
) -> anyhow::Result<()> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading dataset {}", path))?;
    let dataset: Dataset =
        serde_json::from_str(&content).with_context(|| format!("parsing dataset {}", path))?;

    let (campaigns, steps, leads) = (
        dataset.campaigns.len(),
        dataset.steps.len(),
        dataset.leads.len(),
    );

    for campaign in dataset.campaigns {
        store.insert_campaign(campaign).await;
    }
    for step in dataset.steps {
        store.insert_step(step).await?;
    }
    for lead in dataset.leads {
        store.insert_lead(lead).await;
    }
    for credential in dataset.credentials {
        credentials
            .save_secrets(
                UserId::new(credential.user_id),
                &credential.provider,
                &credential.secrets,
            )
            .await?;
    }

    log::info!(
        "Loaded dataset from {}: {} campaigns, {} steps, {} leads",
        path,
        campaigns,
        steps,
        leads
    );
    Ok(())
}
