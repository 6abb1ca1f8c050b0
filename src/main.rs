use anyhow::Context;
use skill_tracker::config::{TrackerConfig, load_environment};
use skill_tracker::telemetry::init_tracing;
use skill_tracker::tracker::Tracker;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    load_environment().context("Failed to load environment files")?;

    let config = TrackerConfig::from_env().context("Invalid tracker configuration")?;
    let seed = config.seed_blueprint;

    let tracker = Tracker::connect(config)
        .await
        .context("Failed to open tracker database")?;

    if seed {
        tracker
            .seed_blueprint()
            .await
            .context("Failed to seed planning blueprint")?;
    }

    let report = tracker.audit_consistency().await?;
    if !report.is_consistent() {
        warn!(
            issues = report.issues.len(),
            "Taxonomy is inconsistent, run repair_consistency to fix the registry"
        );
    }

    let metrics = tracker.get_dashboard_metrics().await?;
    info!(
        total_sessions = metrics.total_sessions,
        total_hours = metrics.total_hours,
        technologies = metrics.tech_count,
        categories = metrics.category_count,
        overall_progress = metrics.overall_progress,
        "Dashboard"
    );

    for tech in tracker.get_tech_stack_with_usage().await? {
        info!(
            technology = %tech.name,
            category = %tech.category,
            logged_hours = tech.logged_hours,
            goal_hours = tech.goal_hours,
            progress_pct = %format!("{:.1}", tech.progress_pct),
            "Progress"
        );
    }

    Ok(())
}
