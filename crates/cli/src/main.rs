//! `bridge` — transform HL7 v2 messages into consent-filtered FHIR R4
//! resources from the command line.
//!
//! Consent records are supplied as a JSON array; the audit trail is held in
//! memory and can be printed alongside the outcome with `--audit`.

use anyhow::Context;
use bridge_core::{
    BridgeConfig, ConsentRecord, InMemoryAuditSink, InMemoryConsentStore, Orchestrator,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bridge")]
#[command(about = "HL7 v2 to FHIR R4 transformation bridge")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform a message file and print the outcome as JSON
    Transform {
        /// Path to the raw HL7 v2 message
        message: PathBuf,
        /// Sender identifier for the ingestion boundary
        #[arg(long, default_value = "cli")]
        sender: String,
        /// Receiver identifier; consent decisions are scoped to it
        #[arg(long, default_value = "cli")]
        receiver: String,
        /// Path to a JSON array of consent records
        #[arg(long)]
        consents: Option<PathBuf>,
        /// Deadline for the whole transformation, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Also print the audit trail
        #[arg(long)]
        audit: bool,
    },
    /// Validate a message file without transforming it
    Validate {
        /// Path to the raw HL7 v2 message
        message: PathBuf,
    },
}

fn load_consents(path: Option<&Path>) -> anyhow::Result<Vec<ConsentRecord>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading consent file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("parsing consent records from {}", path.display()))
}

fn read_message(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("reading message file {}", path.display()))
}

fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Transform {
            message,
            sender,
            receiver,
            consents,
            timeout_ms,
            audit,
        } => {
            let raw = read_message(&message)?;
            let records = load_consents(consents.as_deref())?;
            let config = BridgeConfig::from_env()?;

            let sink = Arc::new(InMemoryAuditSink::new());
            let orchestrator = Orchestrator::new(
                config,
                Arc::new(InMemoryConsentStore::with_records(records)),
                sink.clone(),
            );

            let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
            let outcome =
                orchestrator.transform_with_deadline(&raw, &sender, &receiver, deadline)?;

            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if audit {
                println!("{}", serde_json::to_string_pretty(&sink.snapshot())?);
            }
            Ok(if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Validate { message } => {
            let raw = read_message(&message)?;
            let outcome = match hl7::ParsedMessage::parse(&raw) {
                Ok(parsed) => bridge_core::validation::validate(&parsed),
                Err(err) => {
                    bridge_core::ValidationOutcome::fatal("PARSE_ERROR", err.to_string())
                }
            };
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(if outcome.is_valid() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
