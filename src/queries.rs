use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use crate::cache::{CacheKey, QueryCache};
use crate::db;
use crate::error::AppError;
use crate::models::{
    Breakdown, CategoryAnalytics, CategoryUsage, DashboardMetrics, DbTechStackUsage, Session,
    TechStackUsage, TechnologyAnalytics, progress_pct,
};
use crate::resolver;
use crate::taxonomy::TaxonomyField;

/// Label used for sessions that did not name a work item.
pub const GENERAL_PRACTICE: &str = "General Practice";

/// Expensive aggregate reads, each memoized under its own cache key.
#[derive(Clone)]
pub struct CachedQueries {
    pool: Pool<Sqlite>,
    cache: Arc<QueryCache>,
    dashboard_ttl: Duration,
    query_ttl: Duration,
}

impl CachedQueries {
    pub fn new(
        pool: Pool<Sqlite>,
        cache: Arc<QueryCache>,
        dashboard_ttl: Duration,
        query_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            cache,
            dashboard_ttl,
            query_ttl,
        }
    }

    /// Every technology with its logged hours, session count and progress towards its goal.
    #[instrument(skip(self))]
    pub async fn tech_stack_with_usage(&self) -> Result<Vec<TechStackUsage>, AppError> {
        self.cache
            .get_or_compute(CacheKey::TechStackWithUsage, self.query_ttl, || async {
                info!("Computing tech stack usage");
                let rows = sqlx::query_as::<_, DbTechStackUsage>(
                    "SELECT t.id, t.name, t.category, t.goal_hours, t.date_added,
                            CAST(COALESCE(SUM(s.hours_spent), 0) AS REAL) AS logged_hours,
                            COUNT(s.id) AS session_count
                     FROM technologies t
                     LEFT JOIN sessions s ON s.technology = t.name
                     GROUP BY t.id
                     ORDER BY t.category, t.name",
                )
                .fetch_all(&self.pool)
                .await?;

                Ok(rows.into_iter().map(TechStackUsage::from).collect())
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn dashboard_metrics(&self) -> Result<DashboardMetrics, AppError> {
        self.cache
            .get_or_compute(CacheKey::DashboardMetrics, self.dashboard_ttl, || async {
                info!("Computing dashboard metrics");
                let (total_sessions, total_hours, tech_count, category_count, total_goal_hours) =
                    sqlx::query_as::<_, (i64, f64, i64, i64, f64)>(
                        "SELECT
                            (SELECT COUNT(*) FROM sessions),
                            (SELECT CAST(COALESCE(SUM(hours_spent), 0) AS REAL) FROM sessions),
                            (SELECT COUNT(*) FROM technologies),
                            (SELECT COUNT(*) FROM categories),
                            (SELECT CAST(COALESCE(SUM(goal_hours), 0) AS REAL) FROM technologies)",
                    )
                    .fetch_one(&self.pool)
                    .await?;

                let overall_progress =
                    (progress_pct(total_hours, total_goal_hours) * 10.0).round() / 10.0;

                Ok(DashboardMetrics {
                    total_sessions,
                    total_hours,
                    tech_count,
                    category_count,
                    total_goal_hours,
                    overall_progress,
                })
            })
            .await
    }

    /// Every known value per field, keyed by the field's stored name.
    #[instrument(skip(self))]
    pub async fn all_option_values(&self) -> Result<BTreeMap<String, Vec<String>>, AppError> {
        self.cache
            .get_or_compute(CacheKey::AllOptionValues, self.query_ttl, || async {
                let mut values = BTreeMap::new();
                for field in TaxonomyField::ALL {
                    let options = resolver::resolve_all_options(&self.pool, field).await?;
                    values.insert(field.as_str().to_string(), options);
                }
                Ok(values)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn technology_session_counts(&self) -> Result<BTreeMap<String, i64>, AppError> {
        self.cache
            .get_or_compute(CacheKey::TechnologySessionCounts, self.query_ttl, || async {
                let rows = sqlx::query_as::<_, (String, i64)>(
                    "SELECT technology, COUNT(*) FROM sessions GROUP BY technology",
                )
                .fetch_all(&self.pool)
                .await?;

                Ok(rows.into_iter().collect())
            })
            .await
    }

    /// Technology and session counts for every category, including unused ones.
    #[instrument(skip(self))]
    pub async fn category_usage(&self) -> Result<BTreeMap<String, CategoryUsage>, AppError> {
        self.cache
            .get_or_compute(CacheKey::CategoryUsage, self.query_ttl, || async {
                let rows = sqlx::query_as::<_, (String, i64, i64)>(
                    "SELECT c.category_name,
                        (SELECT COUNT(*) FROM technologies t WHERE t.category = c.category_name),
                        (SELECT COUNT(*) FROM sessions s WHERE s.category_name = c.category_name)
                     FROM categories c
                     ORDER BY c.category_name",
                )
                .fetch_all(&self.pool)
                .await?;

                Ok(rows
                    .into_iter()
                    .map(|(name, tech_count, session_count)| {
                        (
                            name,
                            CategoryUsage {
                                tech_count,
                                session_count,
                            },
                        )
                    })
                    .collect())
            })
            .await
    }

    /// Hours per category with a per-technology breakdown, largest first.
    #[instrument(skip(self))]
    pub async fn category_analytics(&self) -> Result<Vec<CategoryAnalytics>, AppError> {
        self.cache
            .get_or_compute(CacheKey::CategoryAnalytics, self.query_ttl, || async {
                let rows = sqlx::query_as::<_, (String, String, f64, i64)>(
                    "SELECT category_name, technology,
                            CAST(SUM(hours_spent) AS REAL), COUNT(*)
                     FROM sessions
                     GROUP BY category_name, technology",
                )
                .fetch_all(&self.pool)
                .await?;

                let mut grouped: BTreeMap<String, Vec<Breakdown>> = BTreeMap::new();
                for (category, technology, hours, sessions) in rows {
                    grouped.entry(category).or_default().push(Breakdown {
                        name: technology,
                        hours,
                        sessions,
                    });
                }

                let mut analytics: Vec<CategoryAnalytics> = grouped
                    .into_iter()
                    .map(|(category, mut technologies)| {
                        sort_breakdowns(&mut technologies);
                        CategoryAnalytics {
                            category,
                            total_hours: technologies.iter().map(|b| b.hours).sum(),
                            total_sessions: technologies.iter().map(|b| b.sessions).sum(),
                            technologies,
                        }
                    })
                    .collect();
                analytics.sort_by(|a, b| b.total_hours.total_cmp(&a.total_hours));

                Ok(analytics)
            })
            .await
    }

    /// Hours per technology with a per-work-item breakdown, largest first.
    #[instrument(skip(self))]
    pub async fn technology_analytics(&self) -> Result<Vec<TechnologyAnalytics>, AppError> {
        self.cache
            .get_or_compute(CacheKey::TechnologyAnalytics, self.query_ttl, || async {
                let rows = sqlx::query_as::<_, (String, String, String, f64, i64)>(
                    "SELECT s.technology, COALESCE(t.category, s.category_name), s.work_item,
                            CAST(SUM(s.hours_spent) AS REAL), COUNT(*)
                     FROM sessions s
                     LEFT JOIN technologies t ON t.name = s.technology
                     GROUP BY s.technology, s.work_item",
                )
                .fetch_all(&self.pool)
                .await?;

                let mut grouped: BTreeMap<String, (String, BTreeMap<String, Breakdown>)> =
                    BTreeMap::new();
                for (technology, category, work_item, hours, sessions) in rows {
                    let name = match work_item.trim() {
                        "" => GENERAL_PRACTICE.to_string(),
                        other => other.to_string(),
                    };
                    let (_, items) = grouped
                        .entry(technology)
                        .or_insert_with(|| (category, BTreeMap::new()));
                    let item = items.entry(name.clone()).or_insert(Breakdown {
                        name,
                        hours: 0.0,
                        sessions: 0,
                    });
                    item.hours += hours;
                    item.sessions += sessions;
                }

                let mut analytics: Vec<TechnologyAnalytics> = grouped
                    .into_iter()
                    .map(|(technology, (category, items))| {
                        let mut work_items: Vec<Breakdown> = items.into_values().collect();
                        sort_breakdowns(&mut work_items);
                        TechnologyAnalytics {
                            technology,
                            category,
                            total_hours: work_items.iter().map(|b| b.hours).sum(),
                            total_sessions: work_items.iter().map(|b| b.sessions).sum(),
                            work_items,
                        }
                    })
                    .collect();
                analytics.sort_by(|a, b| b.total_hours.total_cmp(&a.total_hours));

                Ok(analytics)
            })
            .await
    }

    /// Most recent sessions first.
    #[instrument(skip(self))]
    pub async fn sessions(&self, limit: i64, offset: i64) -> Result<Vec<Session>, AppError> {
        self.cache
            .get_or_compute(CacheKey::Sessions { limit, offset }, self.query_ttl, || {
                db::list_sessions(&self.pool, limit, offset)
            })
            .await
    }
}

fn sort_breakdowns(breakdowns: &mut [Breakdown]) {
    breakdowns.sort_by(|a, b| {
        b.hours
            .total_cmp(&a.hours)
            .then_with(|| a.name.cmp(&b.name))
    });
}
