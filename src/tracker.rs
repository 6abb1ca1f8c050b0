use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::audit::{self, AuditReport};
use crate::bootstrap::{self, BootstrapSummary};
use crate::cache::QueryCache;
use crate::config::TrackerConfig;
use crate::database::{CURRENT_SCHEMA, migrate_database_declaratively};
use crate::db;
use crate::error::AppError;
use crate::models::{
    Category, CategoryAnalytics, CategoryUsage, DashboardMetrics, Session, TechStackUsage,
    Technology, TechnologyAnalytics,
};
use crate::queries::CachedQueries;
use crate::resolver::{self, Resolution};
use crate::sync::Synchronizer;
use crate::taxonomy::TaxonomyField;

/// Handle over one tracker database: writes go through [`Tracker::sync`], reads are
/// exposed directly.
#[derive(Clone)]
pub struct Tracker {
    pool: Pool<Sqlite>,
    cache: Arc<QueryCache>,
    config: Arc<TrackerConfig>,
    sync: Synchronizer,
    queries: CachedQueries,
}

impl Tracker {
    /// Opens (creating if needed) the configured database and migrates it to the current
    /// schema.
    #[instrument(skip(config), fields(database_url = %config.database_url))]
    pub async fn connect(config: TrackerConfig) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        migrate_database_declaratively(&pool, CURRENT_SCHEMA, false).await?;
        info!("Connected to tracker database");

        Ok(Self::from_pool(pool, config))
    }

    /// Opens an existing database read-only, without migrating it. Used by tools that
    /// must not change what they inspect.
    #[instrument(skip(config), fields(database_url = %config.database_url))]
    pub async fn connect_read_only(config: TrackerConfig) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .read_only(true)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        info!("Opened tracker database read-only");
        Ok(Self::from_pool(pool, config))
    }

    /// Wraps an already migrated pool.
    pub fn from_pool(pool: Pool<Sqlite>, config: TrackerConfig) -> Self {
        let cache = Arc::new(QueryCache::new());
        let config = Arc::new(config);
        let sync = Synchronizer::new(pool.clone(), cache.clone(), config.clone());
        let queries = CachedQueries::new(
            pool.clone(),
            cache.clone(),
            config.dashboard_ttl,
            config.query_ttl,
        );

        Self {
            pool,
            cache,
            config,
            sync,
            queries,
        }
    }

    pub fn sync(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn queries(&self) -> &CachedQueries {
        &self.queries
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn resolve_options(
        &self,
        field: TaxonomyField,
        parent_value: Option<&str>,
    ) -> Result<Resolution, AppError> {
        resolver::resolve_options(&self.pool, field, parent_value).await
    }

    pub async fn resolve_all_options(&self, field: TaxonomyField) -> Result<Vec<String>, AppError> {
        resolver::resolve_all_options(&self.pool, field).await
    }

    /// Seeded categories first, then custom ones, each alphabetical.
    pub async fn get_all_categories(&self) -> Result<Vec<Category>, AppError> {
        db::list_categories(&self.pool).await
    }

    pub async fn get_custom_categories(&self) -> Result<Vec<String>, AppError> {
        db::list_custom_category_names(&self.pool).await
    }

    pub async fn get_all_tech_stack(&self) -> Result<Vec<Technology>, AppError> {
        db::list_technologies(&self.pool).await
    }

    pub async fn get_tech_stack_with_usage(&self) -> Result<Vec<TechStackUsage>, AppError> {
        self.queries.tech_stack_with_usage().await
    }

    pub async fn get_dashboard_metrics(&self) -> Result<DashboardMetrics, AppError> {
        self.queries.dashboard_metrics().await
    }

    pub async fn get_all_option_values(&self) -> Result<BTreeMap<String, Vec<String>>, AppError> {
        self.queries.all_option_values().await
    }

    pub async fn get_technology_session_counts(&self) -> Result<BTreeMap<String, i64>, AppError> {
        self.queries.technology_session_counts().await
    }

    pub async fn get_category_usage(&self) -> Result<BTreeMap<String, CategoryUsage>, AppError> {
        self.queries.category_usage().await
    }

    pub async fn get_category_analytics(&self) -> Result<Vec<CategoryAnalytics>, AppError> {
        self.queries.category_analytics().await
    }

    pub async fn get_technology_analytics(&self) -> Result<Vec<TechnologyAnalytics>, AppError> {
        self.queries.technology_analytics().await
    }

    pub async fn get_sessions(&self, limit: i64, offset: i64) -> Result<Vec<Session>, AppError> {
        self.queries.sessions(limit, offset).await
    }

    pub async fn get_session(&self, id: i64) -> Result<Session, AppError> {
        db::get_session(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))
    }

    pub async fn audit_consistency(&self) -> Result<AuditReport, AppError> {
        audit::audit_consistency(&self.pool, &self.config.deleted_prefix).await
    }

    pub async fn seed_blueprint(&self) -> Result<BootstrapSummary, AppError> {
        bootstrap::seed_blueprint(&self.sync).await
    }
}
