//! Human-readable output.

use assessor_config::TaskCatalog;
use assessor_contracts::{
    task::TaskOutcome,
    verdict::{family_name, BatchSummary},
};

pub fn print_outcome(outcome: &TaskOutcome) {
    match outcome {
        TaskOutcome::Verdict(verdict) => {
            let mark = if verdict.passed { "PASS" } else { "FAIL" };
            println!("  [{mark}] task {}  score {:.3}", verdict.task_id, verdict.score);
            println!("         {}", verdict.rationale);
        }
        TaskOutcome::Failure {
            task_id,
            kind,
            message,
        } => {
            println!("  [FAILED] task {task_id}  {kind}");
            println!("         {message}");
        }
    }
}

pub fn print_summary(summary: &BatchSummary) {
    println!("Total Score: {}", summary.score_summary);
    if summary.failed.is_empty() {
        println!();
        println!("All tasks passed!");
        return;
    }
    println!();
    println!("Failed Tasks ({}):", summary.failed.len());
    for failure in &summary.failed {
        println!(
            "- {} ({}, score {:.3}): {}",
            failure.family, failure.family_name, failure.score, failure.feedback
        );
    }
}

pub fn print_catalog(catalog: &TaskCatalog) {
    println!("{} task families", catalog.len());
    println!();
    for entry in catalog.entries() {
        let name = entry.display_name();
        let kind = family_name(&entry.id);
        if name == kind {
            println!("  {:<10} {:<24} rule={}", entry.id, name, entry.rule);
        } else {
            println!("  {:<10} {:<24} rule={}  ({kind})", entry.id, name, entry.rule);
        }
        if let Some(prompt) = &entry.prompt {
            println!("             {}", truncate(prompt, 72));
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}
