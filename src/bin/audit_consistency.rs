use std::process::ExitCode;

use anyhow::Context;
use skill_tracker::config::{TrackerConfig, load_environment};
use skill_tracker::telemetry::init_tracing;
use skill_tracker::tracker::Tracker;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    load_environment().context("Failed to load environment files")?;

    let config = TrackerConfig::from_env().context("Invalid tracker configuration")?;
    let tracker = Tracker::connect_read_only(config)
        .await
        .context("Failed to open tracker database")?;

    let report = tracker.audit_consistency().await?;
    let counts = &report.counts;

    println!("Categories");
    println!("    categories table:   {}", counts.categories);
    println!("    option registry:    {}", counts.registry_categories);
    println!("    technologies table: {}", counts.technology_categories);
    println!("    sessions:           {}", counts.session_categories);
    println!("Technologies");
    println!("    technologies table: {}", counts.technologies);
    println!("    option registry:    {}", counts.registry_technologies);
    println!("    sessions:           {}", counts.session_technologies);

    if report.is_consistent() {
        println!("All projections are consistent ✓");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Found {} inconsistencies:", report.issues.len());
    for (i, issue) in report.issues.iter().enumerate() {
        println!("{:>4}. {}", i + 1, issue);
    }
    Ok(ExitCode::FAILURE)
}
