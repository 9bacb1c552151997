//! `assessor`: command-line front end for the clinical assessment
//! orchestrator.
//!
//! Usage:
//!   assessor evaluate --request request.json
//!   assessor batch --requests requests.json
//!   assessor card --card-url http://localhost:9009/
//!   assessor check-fhir
//!   assessor catalog
//!   assessor demo
//!
//! `--config` (settings TOML) and `--catalog` (task catalog TOML) apply to
//! every subcommand. Set RUST_LOG=debug for per-transition logging.

mod demo;
mod report;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use assessor_a2a::{assessor_card, assessor_descriptor, A2aAgentClient};
use assessor_config::{Settings, TaskCatalog};
use assessor_contracts::{
    error::{AssessorError, AssessorResult},
    task::TaskRequest,
};
use assessor_core::{AssessmentService, TaskOrchestrator};
use assessor_fhir::FhirDataClient;
use assessor_verify::ScoringEngine;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Evaluate A2A agents on clinical tasks backed by a FHIR server.
#[derive(Parser)]
#[command(name = "assessor", version, about)]
struct Cli {
    /// Settings file. Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Task catalog file.
    #[arg(long, global = true, default_value = "config/catalog.toml")]
    catalog: PathBuf,

    /// Address this orchestrator advertises in its own agent card.
    #[arg(long, global = true, env = "CARD_URL", default_value = "http://localhost:9009/")]
    card_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one task request (a JSON file) and print its outcome.
    Evaluate {
        #[arg(long)]
        request: PathBuf,
        /// Print the outcome as JSON instead of a summary line.
        #[arg(long)]
        json: bool,
    },
    /// Run a JSON array of task requests concurrently and summarize.
    Batch {
        #[arg(long)]
        requests: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print this orchestrator's agent card.
    Card,
    /// Probe the FHIR server until it answers or retries run out.
    CheckFhir,
    /// List the task families in the catalog.
    Catalog,
    /// Offline run against in-memory collaborators.
    Demo,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Evaluate { request, json } => evaluate(&cli, request, *json).await,
        Command::Batch { requests, json } => batch(&cli, requests, *json).await,
        Command::Card => card(&cli),
        Command::CheckFhir => check_fhir(&cli).await,
        Command::Catalog => catalog(&cli),
        Command::Demo => demo::run().await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

// ── Subcommands ───────────────────────────────────────────────────────────────

async fn evaluate(cli: &Cli, path: &Path, json: bool) -> AssessorResult<()> {
    let request: TaskRequest = read_json(path)?;
    let service = build_service(cli).await?;
    let outcome = service.evaluate(request).await?;
    if json {
        print_json(&outcome)
    } else {
        report::print_outcome(&outcome);
        Ok(())
    }
}

async fn batch(cli: &Cli, path: &Path, json: bool) -> AssessorResult<()> {
    let requests: Vec<TaskRequest> = read_json(path)?;
    let service = build_service(cli).await?;
    let summary = service.evaluate_batch(requests).await;
    if json {
        print_json(&summary)
    } else {
        report::print_summary(&summary);
        Ok(())
    }
}

fn card(cli: &Cli) -> AssessorResult<()> {
    print_json(&assessor_card(&cli.card_url))
}

async fn check_fhir(cli: &Cli) -> AssessorResult<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    let fhir = fhir_client(&settings)?;
    let ready = fhir
        .wait_until_ready(
            settings.fhir.ready_retries,
            Duration::from_millis(settings.fhir.ready_interval_ms),
        )
        .await;
    if ready {
        println!("FHIR server at {} is up.", fhir.base_url());
        Ok(())
    } else {
        Err(AssessorError::DataUnavailable {
            reason: format!("FHIR server at {} did not answer", fhir.base_url()),
            transient: true,
        })
    }
}

fn catalog(cli: &Cli) -> AssessorResult<()> {
    let catalog = TaskCatalog::from_file(&cli.catalog)?;
    let engine = ScoringEngine::new();
    catalog.check_rules(|rule| engine.has_rule(rule))?;
    report::print_catalog(&catalog);
    Ok(())
}

// ── Wiring ────────────────────────────────────────────────────────────────────

fn fhir_client(settings: &Settings) -> AssessorResult<FhirDataClient> {
    FhirDataClient::new(
        settings.fhir.base_url.clone(),
        Duration::from_millis(settings.fhir.request_timeout_ms),
    )
}

/// Settings, catalog and the HTTP collaborators, assembled into a service.
async fn build_service(cli: &Cli) -> AssessorResult<AssessmentService> {
    let settings = Settings::load(cli.config.as_deref())?;
    let catalog = TaskCatalog::from_file(&cli.catalog)?;
    let engine = ScoringEngine::new();
    catalog.check_rules(|rule| engine.has_rule(rule))?;

    let fhir = fhir_client(&settings)?;
    if !settings.fhir.skip_ready_check {
        let ready = fhir
            .wait_until_ready(
                settings.fhir.ready_retries,
                Duration::from_millis(settings.fhir.ready_interval_ms),
            )
            .await;
        if !ready {
            warn!("proceeding without a confirmed FHIR server; context retrieval may fail");
        }
    }

    let agent = A2aAgentClient::new(Duration::from_millis(settings.agent.discovery_timeout_ms))?;
    let orchestrator = TaskOrchestrator::new(
        Arc::new(fhir),
        Arc::new(catalog),
        Arc::new(agent),
        Arc::new(engine),
        settings.orchestrator_config(),
    );
    Ok(AssessmentService::new(orchestrator, assessor_descriptor(&cli.card_url)))
}

// ── JSON helpers ──────────────────────────────────────────────────────────────

fn read_json<T: DeserializeOwned>(path: &Path) -> AssessorResult<T> {
    let contents = std::fs::read_to_string(path).map_err(|e| AssessorError::ConfigError {
        reason: format!("failed to read '{}': {}", path.display(), e),
    })?;
    serde_json::from_str(&contents).map_err(|e| AssessorError::ConfigError {
        reason: format!("'{}' is not a valid task request document: {}", path.display(), e),
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> AssessorResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| AssessorError::ConfigError {
        reason: format!("failed to render JSON: {e}"),
    })?;
    println!("{text}");
    Ok(())
}
