//! Offline demo: the real orchestrator, catalog and scoring engine wired to
//! in-memory data and scripted agents, so every outcome path can be shown
//! without a FHIR server or a live agent.

use std::{sync::Arc, time::Duration};

use assessor_a2a::assessor_descriptor;
use assessor_config::TaskCatalog;
use assessor_contracts::{error::AssessorResult, task::TaskRequest};
use assessor_core::{
    fakes::{FakeAgentClient, FakeDataClient, ScriptedAgent},
    orchestrator::OrchestratorConfig,
    retry::RetryPolicy,
    AssessmentService, TaskOrchestrator,
};
use assessor_fhir::fixtures;
use assessor_verify::ScoringEngine;

use crate::report;

const SAMPLE_CATALOG: &str = include_str!("../../config/catalog.toml");

struct Scenario {
    title: &'static str,
    request: TaskRequest,
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            title: "Patient search, correct MRN",
            request: TaskRequest::new("task1_1", "http://purple.local")
                .with_record("Patient", "S6534835"),
        },
        Scenario {
            title: "Magnesium level within 1% tolerance",
            request: TaskRequest::new("task4_1", "http://purple-labs.local")
                .with_record("Patient", "S2874099")
                .with_record("Observation", "obs-mg-0042"),
        },
        Scenario {
            title: "Problem list, partial credit",
            request: TaskRequest::new("task6_1", "http://purple-problems.local")
                .with_record("Patient", "S2874099"),
        },
        Scenario {
            title: "Agent too slow to answer",
            request: TaskRequest::new("task2_1", "http://slow.local")
                .with_record("Patient", "S2874099"),
        },
        Scenario {
            title: "Agent lacks required operations",
            request: TaskRequest::new("task1_1", "http://legacy.local")
                .with_record("Patient", "S6534835"),
        },
        Scenario {
            title: "Family with no reference solution",
            request: TaskRequest::new("task99_1", "http://purple.local"),
        },
    ]
}

fn build_service() -> AssessorResult<AssessmentService> {
    let data = fixtures::sample_records()
        .into_iter()
        .fold(FakeDataClient::new(), |client, record| {
            client.with_record(&record.resource_type, &record.id, record.body)
        });

    let agents = FakeAgentClient::new()
        .with_agent("http://purple.local", ScriptedAgent::answering("S6534835"))
        .with_agent("http://purple-labs.local", ScriptedAgent::answering("2.31"))
        .with_agent(
            "http://purple-problems.local",
            ScriptedAgent::answering(r#"["I10", "E11.9"]"#),
        )
        .with_agent(
            "http://slow.local",
            ScriptedAgent::answering("59").delayed(Duration::from_secs(5)),
        )
        .with_agent(
            "http://legacy.local",
            ScriptedAgent::answering("S6534835").with_operations(&["message/send"]),
        );

    let catalog = TaskCatalog::from_toml_str(SAMPLE_CATALOG)?;
    let engine = ScoringEngine::new();
    catalog.check_rules(|rule| engine.has_rule(rule))?;

    let config = OrchestratorConfig {
        task_deadline: Duration::from_secs(10),
        response_timeout: Duration::from_secs(1),
        retry: RetryPolicy {
            base_delay: Duration::from_millis(20),
            ..RetryPolicy::default()
        },
        ..OrchestratorConfig::default()
    };

    let orchestrator = TaskOrchestrator::new(
        Arc::new(data),
        Arc::new(catalog),
        Arc::new(agents),
        Arc::new(engine),
        config,
    );
    Ok(AssessmentService::new(
        orchestrator,
        assessor_descriptor("http://localhost:9009/"),
    ))
}

pub async fn run() -> AssessorResult<()> {
    print_banner();
    let service = build_service()?;

    for (n, scenario) in scenarios().into_iter().enumerate() {
        println!("=== {}. {} ===", n + 1, scenario.title);
        println!(
            "  family {} -> {}",
            scenario.request.task_family, scenario.request.agent_endpoint
        );
        let outcome = service.evaluate(scenario.request).await?;
        report::print_outcome(&outcome);
        println!();
    }

    println!("=== Batch run of all scenarios ===");
    let requests = scenarios().into_iter().map(|s| s.request).collect();
    let summary = service.evaluate_batch(requests).await;
    report::print_summary(&summary);
    Ok(())
}

fn print_banner() {
    println!();
    println!("Clinical Assessment Orchestrator, offline demo");
    println!("==============================================");
    println!();
    println!("Per task:");
    println!("  [1] fetch the declared FHIR records (in-memory here)");
    println!("  [2] formulate the instruction from the catalog prompt");
    println!("  [3] discover the agent and check its declared operations");
    println!("  [4] dispatch under a response deadline");
    println!("  [5] score the answer with the family's rule");
    println!();
}
