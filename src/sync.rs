//! The only write path for taxonomy values.
//!
//! A category or technology is stored three times over: its canonical row, its entry in
//! the option registry, and as copied strings on every session that used it. Each
//! operation here runs in a single transaction that writes the canonical row first and
//! then fans out to dependents, and ends by clearing the query cache.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::{Pool, Sqlite, SqliteConnection, Transaction};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, instrument, warn};

use crate::cache::QueryCache;
use crate::config::TrackerConfig;
use crate::db;
use crate::error::AppError;
use crate::models::{NewSession, TechnologyUpdate};
use crate::taxonomy::{TaxonomyField, normalize_value};

/// Rows touched by a successful operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    /// Id of the row created by the operation, if any.
    pub id: Option<i64>,
    pub categories: u64,
    pub technologies: u64,
    pub sessions: u64,
    pub options: u64,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.categories == 0 && self.technologies == 0 && self.sessions == 0 && self.options == 0
    }
}

/// Structured result of every write. Storage failures are the only thing reported
/// through `Err`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Applied { message: String, changes: ChangeSet },
    AlreadyExists { message: String },
    NotFound { message: String },
    /// Dependent sessions exist; retry with the forced variant to proceed.
    RequiresConfirmation { message: String, dependents: i64 },
    NoOp { message: String },
    Invalid { message: String },
}

impl SyncOutcome {
    fn applied(message: String, changes: ChangeSet) -> Self {
        SyncOutcome::Applied { message, changes }
    }

    fn invalid(message: impl Into<String>) -> Self {
        SyncOutcome::Invalid {
            message: message.into(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, SyncOutcome::Applied { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            SyncOutcome::Applied { message, .. }
            | SyncOutcome::AlreadyExists { message }
            | SyncOutcome::NotFound { message }
            | SyncOutcome::RequiresConfirmation { message, .. }
            | SyncOutcome::NoOp { message }
            | SyncOutcome::Invalid { message } => message,
        }
    }

    pub fn changes(&self) -> Option<&ChangeSet> {
        match self {
            SyncOutcome::Applied { changes, .. } => Some(changes),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.changes().and_then(|c| c.id)
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[derive(Clone)]
pub struct Synchronizer {
    pool: Pool<Sqlite>,
    cache: Arc<QueryCache>,
    config: Arc<TrackerConfig>,
    // SQLite allows one writer; a deferred transaction that loses the race to upgrade
    // its lock fails with SQLITE_BUSY instead of waiting, so writers queue here.
    write_gate: Arc<Mutex<()>>,
}

impl Synchronizer {
    pub fn new(pool: Pool<Sqlite>, cache: Arc<QueryCache>, config: Arc<TrackerConfig>) -> Self {
        Self {
            pool,
            cache,
            config,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Waits for the write gate and opens the operation's transaction. The guard must
    /// outlive the transaction.
    async fn begin(&self) -> Result<(MutexGuard<'_, ()>, Transaction<'static, Sqlite>), AppError> {
        let gate = self.write_gate.lock().await;
        let tx = self.pool.begin().await?;
        Ok((gate, tx))
    }

    async fn commit(
        &self,
        tx: Transaction<'static, Sqlite>,
        outcome: SyncOutcome,
    ) -> Result<SyncOutcome, AppError> {
        tx.commit().await?;
        self.cache.invalidate_all();
        info!(message = %outcome.message(), "Sync applied");
        Ok(outcome)
    }

    async fn abandon(
        &self,
        tx: Transaction<'static, Sqlite>,
        outcome: SyncOutcome,
    ) -> Result<SyncOutcome, AppError> {
        tx.rollback().await?;
        warn!(message = %outcome.message(), "Sync refused");
        Ok(outcome)
    }

    // ==================== categories ====================

    #[instrument(skip(self))]
    pub async fn add_category(&self, name: &str, is_custom: bool) -> Result<SyncOutcome, AppError> {
        self.add_category_inner(name, is_custom)
            .await
            .inspect_err(|e| e.log_and_record("add_category"))
    }

    async fn add_category_inner(&self, name: &str, is_custom: bool) -> Result<SyncOutcome, AppError> {
        let Some(name) = normalize_value(Some(name)) else {
            return Ok(SyncOutcome::invalid("Category name is required"));
        };

        let (_gate, mut tx) = self.begin().await?;
        let exists = SyncOutcome::AlreadyExists {
            message: format!("{} already exists", name),
        };

        if db::category_exists(&mut *tx, name).await? {
            // A retry after an interrupted add completes the registry half
            if db::insert_option_value(&mut *tx, TaxonomyField::Category, name, None).await? {
                warn!(category = %name, "Restored missing registry entry for existing category");
                tx.commit().await?;
                self.cache.invalidate_all();
                return Ok(exists);
            }
            return self.abandon(tx, exists).await;
        }

        // A registry entry without a row is a duplicate too; repair_consistency drops it
        if db::option_value_exists(&mut *tx, TaxonomyField::Category, name, None).await? {
            let outcome = SyncOutcome::AlreadyExists {
                message: format!(
                    "{} already exists in the option registry without a category row",
                    name
                ),
            };
            return self.abandon(tx, outcome).await;
        }

        if !db::insert_category(&mut *tx, name, is_custom, today()).await? {
            return self.abandon(tx, exists).await;
        }
        db::insert_option_value(&mut *tx, TaxonomyField::Category, name, None).await?;

        let changes = ChangeSet {
            categories: 1,
            options: 1,
            ..Default::default()
        };
        self.commit(
            tx,
            SyncOutcome::applied(format!("Added {} successfully", name), changes),
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn rename_category(
        &self,
        old_name: &str,
        new_name: &str,
    ) -> Result<SyncOutcome, AppError> {
        self.rename_category_inner(old_name, new_name)
            .await
            .inspect_err(|e| e.log_and_record("rename_category"))
    }

    async fn rename_category_inner(
        &self,
        old_name: &str,
        new_name: &str,
    ) -> Result<SyncOutcome, AppError> {
        let (Some(old_name), Some(new_name)) =
            (normalize_value(Some(old_name)), normalize_value(Some(new_name)))
        else {
            return Ok(SyncOutcome::invalid("Both category names are required"));
        };

        if old_name == new_name {
            return Ok(SyncOutcome::NoOp {
                message: format!("{} is already named {}", old_name, new_name),
            });
        }

        let (_gate, mut tx) = self.begin().await?;

        if !db::category_exists(&mut *tx, old_name).await? {
            let outcome = SyncOutcome::NotFound {
                message: format!("Category {} not found", old_name),
            };
            return self.abandon(tx, outcome).await;
        }

        if db::category_exists(&mut *tx, new_name).await? {
            let outcome = SyncOutcome::AlreadyExists {
                message: format!("Category {} already exists", new_name),
            };
            return self.abandon(tx, outcome).await;
        }

        // Canonical row first, dependents after
        let categories = db::rename_category_row(&mut *tx, old_name, new_name).await?;

        let mut options =
            db::delete_option_values(&mut *tx, TaxonomyField::Category, old_name, None).await?;
        if db::insert_option_value(&mut *tx, TaxonomyField::Category, new_name, None).await? {
            options += 1;
        }

        let mut changes = move_category_dependents(&mut tx, old_name, new_name).await?;
        changes.categories = categories;
        changes.options += options;

        info!(
            technologies = changes.technologies,
            sessions = changes.sessions,
            "Category renamed across all tables"
        );
        self.commit(
            tx,
            SyncOutcome::applied(format!("Renamed to {} successfully", new_name), changes),
        )
        .await
    }

    /// Deletes `name` after moving its technologies and sessions to `fallback`, or to the
    /// configured uncategorized label when no fallback is given.
    #[instrument(skip(self))]
    pub async fn delete_category(
        &self,
        name: &str,
        fallback: Option<&str>,
    ) -> Result<SyncOutcome, AppError> {
        self.delete_category_inner(name, fallback)
            .await
            .inspect_err(|e| e.log_and_record("delete_category"))
    }

    async fn delete_category_inner(
        &self,
        name: &str,
        fallback: Option<&str>,
    ) -> Result<SyncOutcome, AppError> {
        let Some(name) = normalize_value(Some(name)) else {
            return Ok(SyncOutcome::invalid("Category name is required"));
        };
        let fallback = normalize_value(fallback)
            .unwrap_or(self.config.uncategorized_label.as_str())
            .to_string();

        if name == fallback {
            return Ok(SyncOutcome::NoOp {
                message: format!("{} is the fallback category and cannot absorb itself", name),
            });
        }

        let (_gate, mut tx) = self.begin().await?;

        if !db::category_exists(&mut *tx, name).await? {
            let outcome = SyncOutcome::NotFound {
                message: format!("Category {} not found", name),
            };
            return self.abandon(tx, outcome).await;
        }

        let mut created = 0;
        if !db::category_exists(&mut *tx, &fallback).await? {
            db::insert_category(&mut *tx, &fallback, false, today()).await?;
            info!(fallback = %fallback, "Created fallback category");
            created = 1;
        }
        let registered =
            db::insert_option_value(&mut *tx, TaxonomyField::Category, &fallback, None).await?;

        let mut changes = fold_category_into(&mut tx, name, &fallback).await?;
        changes.categories += created;
        changes.options += u64::from(registered);

        let message = format!(
            "Deleted {}. Migrated {} technologies and {} sessions to {}",
            name, changes.technologies, changes.sessions, fallback
        );
        self.commit(tx, SyncOutcome::applied(message, changes)).await
    }

    #[instrument(skip(self))]
    pub async fn merge_categories(
        &self,
        source: &str,
        target: &str,
    ) -> Result<SyncOutcome, AppError> {
        self.merge_categories_inner(source, target)
            .await
            .inspect_err(|e| e.log_and_record("merge_categories"))
    }

    async fn merge_categories_inner(
        &self,
        source: &str,
        target: &str,
    ) -> Result<SyncOutcome, AppError> {
        let (Some(source), Some(target)) =
            (normalize_value(Some(source)), normalize_value(Some(target)))
        else {
            return Ok(SyncOutcome::invalid("Both categories are required"));
        };

        if source == target {
            return Ok(SyncOutcome::NoOp {
                message: format!("Cannot merge {} into itself", source),
            });
        }

        let (_gate, mut tx) = self.begin().await?;

        for category in [source, target] {
            if !db::category_exists(&mut *tx, category).await? {
                let outcome = SyncOutcome::NotFound {
                    message: format!("Category {} not found", category),
                };
                return self.abandon(tx, outcome).await;
            }
        }

        let changes = fold_category_into(&mut tx, source, target).await?;
        let message = format!(
            "Merged {} into {}. Moved {} technologies and {} sessions",
            source, target, changes.technologies, changes.sessions
        );
        self.commit(tx, SyncOutcome::applied(message, changes)).await
    }

    // ==================== technologies ====================

    #[instrument(skip(self))]
    pub async fn add_technology(
        &self,
        name: &str,
        category: &str,
        goal_hours: f64,
        date_added: NaiveDate,
    ) -> Result<SyncOutcome, AppError> {
        self.add_technology_inner(name, category, goal_hours, date_added)
            .await
            .inspect_err(|e| e.log_and_record("add_technology"))
    }

    async fn add_technology_inner(
        &self,
        name: &str,
        category: &str,
        goal_hours: f64,
        date_added: NaiveDate,
    ) -> Result<SyncOutcome, AppError> {
        let (Some(name), Some(category)) =
            (normalize_value(Some(name)), normalize_value(Some(category)))
        else {
            return Ok(SyncOutcome::invalid("Technology name and category are required"));
        };

        if !goal_hours.is_finite() || goal_hours < 0.0 {
            return Ok(SyncOutcome::invalid("Goal hours must be zero or more"));
        }

        let (_gate, mut tx) = self.begin().await?;

        // The one place a child is refused for a missing parent
        if !db::category_exists(&mut *tx, category).await? {
            let outcome = SyncOutcome::NotFound {
                message: format!("Category {} does not exist", category),
            };
            return self.abandon(tx, outcome).await;
        }

        let Some(id) = db::insert_technology(&mut *tx, name, category, goal_hours, date_added).await?
        else {
            let outcome = SyncOutcome::AlreadyExists {
                message: format!("{} already exists", name),
            };
            return self.abandon(tx, outcome).await;
        };

        let registered =
            db::insert_option_value(&mut *tx, TaxonomyField::Technology, name, Some(category))
                .await?;

        let changes = ChangeSet {
            id: Some(id),
            technologies: 1,
            options: u64::from(registered),
            ..Default::default()
        };
        self.commit(
            tx,
            SyncOutcome::applied(format!("Added {} successfully", name), changes),
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn update_technology(
        &self,
        id: i64,
        update: TechnologyUpdate,
    ) -> Result<SyncOutcome, AppError> {
        self.update_technology_inner(id, update)
            .await
            .inspect_err(|e| e.log_and_record("update_technology"))
    }

    async fn update_technology_inner(
        &self,
        id: i64,
        update: TechnologyUpdate,
    ) -> Result<SyncOutcome, AppError> {
        let (_gate, mut tx) = self.begin().await?;

        let Some(current) = db::get_technology(&mut *tx, id).await? else {
            let outcome = SyncOutcome::NotFound {
                message: "Technology not found".to_string(),
            };
            return self.abandon(tx, outcome).await;
        };

        let new_name = normalize_value(update.name.as_deref())
            .unwrap_or(current.name.as_str())
            .to_string();
        let new_category = normalize_value(update.category.as_deref())
            .unwrap_or(current.category.as_str())
            .to_string();
        let goal_hours = update.goal_hours.unwrap_or(current.goal_hours);

        if !goal_hours.is_finite() || goal_hours < 0.0 {
            return self
                .abandon(tx, SyncOutcome::invalid("Goal hours must be zero or more"))
                .await;
        }

        let renamed = new_name != current.name;
        let moved = new_category != current.category;

        if !renamed && !moved && goal_hours == current.goal_hours {
            let outcome = SyncOutcome::NoOp {
                message: format!("{} is unchanged", current.name),
            };
            return self.abandon(tx, outcome).await;
        }

        if moved && !db::category_exists(&mut *tx, &new_category).await? {
            let outcome = SyncOutcome::NotFound {
                message: format!("Category {} does not exist", new_category),
            };
            return self.abandon(tx, outcome).await;
        }

        if renamed && db::get_technology_by_name(&mut *tx, &new_name).await?.is_some() {
            let outcome = SyncOutcome::AlreadyExists {
                message: format!("{} already exists", new_name),
            };
            return self.abandon(tx, outcome).await;
        }

        let technologies =
            db::update_technology_row(&mut *tx, id, &new_name, &new_category, goal_hours).await?;

        let mut changes = ChangeSet {
            technologies,
            ..Default::default()
        };

        if renamed || moved {
            changes.options += db::delete_option_values(
                &mut *tx,
                TaxonomyField::Technology,
                &current.name,
                None,
            )
            .await?;
            if db::insert_option_value(
                &mut *tx,
                TaxonomyField::Technology,
                &new_name,
                Some(&new_category),
            )
            .await?
            {
                changes.options += 1;
            }
        }

        if renamed {
            changes.sessions = db::rewrite_session_values(
                &mut *tx,
                TaxonomyField::Technology,
                &current.name,
                &new_name,
                None,
            )
            .await?;
            changes.options += db::reparent_option_values(
                &mut tx,
                TaxonomyField::WorkItem,
                &current.name,
                &new_name,
            )
            .await?;
            info!(
                old = %current.name,
                new = %new_name,
                sessions = changes.sessions,
                "Technology renamed across all tables"
            );
        }

        self.commit(
            tx,
            SyncOutcome::applied(format!("Updated {} successfully", new_name), changes),
        )
        .await
    }

    /// Refuses when sessions still reference the technology.
    #[instrument(skip(self))]
    pub async fn delete_technology(&self, id: i64) -> Result<SyncOutcome, AppError> {
        self.remove_technology(id, false)
            .await
            .inspect_err(|e| e.log_and_record("delete_technology"))
    }

    /// Deletes regardless of dependents, marking their sessions with the deletion sentinel.
    #[instrument(skip(self))]
    pub async fn force_delete_technology(&self, id: i64) -> Result<SyncOutcome, AppError> {
        self.remove_technology(id, true)
            .await
            .inspect_err(|e| e.log_and_record("force_delete_technology"))
    }

    async fn remove_technology(&self, id: i64, force: bool) -> Result<SyncOutcome, AppError> {
        let (_gate, mut tx) = self.begin().await?;

        let Some(technology) = db::get_technology(&mut *tx, id).await? else {
            let outcome = SyncOutcome::NotFound {
                message: "Technology not found".to_string(),
            };
            return self.abandon(tx, outcome).await;
        };
        let name = technology.name.as_str();

        let dependents =
            db::count_sessions_with(&mut *tx, TaxonomyField::Technology, name).await?;

        if dependents > 0 && !force {
            let outcome = SyncOutcome::RequiresConfirmation {
                message: format!(
                    "Cannot delete: {} is used in {} session(s)",
                    name, dependents
                ),
                dependents,
            };
            return self.abandon(tx, outcome).await;
        }

        let mut changes = ChangeSet::default();

        if dependents > 0 {
            let marker = self.config.deleted_marker(name);
            changes.sessions = db::rewrite_session_values(
                &mut *tx,
                TaxonomyField::Technology,
                name,
                &marker,
                None,
            )
            .await?;
        }

        changes.technologies = db::delete_technology_row(&mut *tx, id).await?;
        changes.options =
            db::delete_option_values(&mut *tx, TaxonomyField::Technology, name, None).await?;
        changes.options +=
            db::delete_option_values_under_parent(&mut *tx, TaxonomyField::WorkItem, name).await?;

        let message = if dependents > 0 {
            format!("Force deleted {} and updated sessions", name)
        } else {
            format!("Deleted {} successfully", name)
        };
        self.commit(tx, SyncOutcome::applied(message, changes)).await
    }

    // ==================== registry-only values ====================

    #[instrument(skip(self))]
    pub async fn add_dropdown_value(
        &self,
        field: TaxonomyField,
        value: &str,
        parent_value: Option<&str>,
    ) -> Result<SyncOutcome, AppError> {
        self.add_dropdown_value_inner(field, value, parent_value)
            .await
            .inspect_err(|e| e.log_and_record("add_dropdown_value"))
    }

    async fn add_dropdown_value_inner(
        &self,
        field: TaxonomyField,
        value: &str,
        parent_value: Option<&str>,
    ) -> Result<SyncOutcome, AppError> {
        if !field.is_registry_only() {
            return Ok(SyncOutcome::invalid(format!(
                "{} values are managed through their own operations",
                field.label()
            )));
        }
        let Some(value) = normalize_value(Some(value)) else {
            return Ok(SyncOutcome::invalid(format!("{} is required", field.label())));
        };
        let parent_value = normalize_value(parent_value);

        let (_gate, mut tx) = self.begin().await?;

        if !db::insert_option_value(&mut *tx, field, value, parent_value).await? {
            let outcome = SyncOutcome::AlreadyExists {
                message: format!("{} already exists", value),
            };
            return self.abandon(tx, outcome).await;
        }

        let changes = ChangeSet {
            options: 1,
            ..Default::default()
        };
        self.commit(
            tx,
            SyncOutcome::applied(format!("Added {} successfully", value), changes),
        )
        .await
    }

    /// Removes registry entries only. Sessions keep their copies, so the value stays
    /// resolvable through history.
    #[instrument(skip(self))]
    pub async fn delete_dropdown_value(
        &self,
        field: TaxonomyField,
        value: &str,
        parent_value: Option<&str>,
    ) -> Result<SyncOutcome, AppError> {
        self.delete_dropdown_value_inner(field, value, parent_value)
            .await
            .inspect_err(|e| e.log_and_record("delete_dropdown_value"))
    }

    async fn delete_dropdown_value_inner(
        &self,
        field: TaxonomyField,
        value: &str,
        parent_value: Option<&str>,
    ) -> Result<SyncOutcome, AppError> {
        if !field.is_registry_only() {
            return Ok(SyncOutcome::invalid(format!(
                "{} values are managed through their own operations",
                field.label()
            )));
        }
        let Some(value) = normalize_value(Some(value)) else {
            return Ok(SyncOutcome::invalid(format!("{} is required", field.label())));
        };
        let parent_value = normalize_value(parent_value);

        let (_gate, mut tx) = self.begin().await?;

        let options = db::delete_option_values(&mut *tx, field, value, parent_value).await?;
        if options == 0 {
            let outcome = SyncOutcome::NotFound {
                message: format!("{} not found", value),
            };
            return self.abandon(tx, outcome).await;
        }

        let changes = ChangeSet {
            options,
            ..Default::default()
        };
        self.commit(
            tx,
            SyncOutcome::applied(format!("Deleted {} successfully", value), changes),
        )
        .await
    }

    /// Renames a work item or skill topic in the registry and on every session. With a
    /// parent the rename only applies under that parent.
    #[instrument(skip(self))]
    pub async fn rename_dropdown_value(
        &self,
        field: TaxonomyField,
        old_value: &str,
        new_value: &str,
        parent_value: Option<&str>,
    ) -> Result<SyncOutcome, AppError> {
        self.rename_dropdown_value_inner(field, old_value, new_value, parent_value)
            .await
            .inspect_err(|e| e.log_and_record("rename_dropdown_value"))
    }

    async fn rename_dropdown_value_inner(
        &self,
        field: TaxonomyField,
        old_value: &str,
        new_value: &str,
        parent_value: Option<&str>,
    ) -> Result<SyncOutcome, AppError> {
        if !field.is_registry_only() {
            return Ok(SyncOutcome::invalid(format!(
                "{} values are managed through their own operations",
                field.label()
            )));
        }
        let (Some(old_value), Some(new_value)) =
            (normalize_value(Some(old_value)), normalize_value(Some(new_value)))
        else {
            return Ok(SyncOutcome::invalid("Both values are required"));
        };
        let parent_value = normalize_value(parent_value);

        if old_value == new_value {
            return Ok(SyncOutcome::NoOp {
                message: format!("{} is already named {}", old_value, new_value),
            });
        }

        let (_gate, mut tx) = self.begin().await?;

        let mut changes = ChangeSet {
            options: db::rename_option_values(&mut tx, field, old_value, new_value, parent_value)
                .await?,
            ..Default::default()
        };

        let scope = field.parent().zip(parent_value);
        changes.sessions =
            db::rewrite_session_values(&mut *tx, field, old_value, new_value, scope).await?;

        // Skill topics hang off the work item name regardless of technology
        if field == TaxonomyField::WorkItem && parent_value.is_none() {
            changes.options += db::reparent_option_values(
                &mut tx,
                TaxonomyField::SkillTopic,
                old_value,
                new_value,
            )
            .await?;
        }

        if changes.is_empty() {
            let outcome = SyncOutcome::NotFound {
                message: format!("{} not found", old_value),
            };
            return self.abandon(tx, outcome).await;
        }

        self.commit(
            tx,
            SyncOutcome::applied(format!("Renamed to {} successfully", new_value), changes),
        )
        .await
    }

    // ==================== sessions ====================

    /// Sessions may introduce work items and skill topics inline, but their category and
    /// technology must already exist. A deletion sentinel is accepted only when sessions
    /// already carry it.
    async fn unknown_session_taxonomy(
        &self,
        conn: &mut SqliteConnection,
        session: &NewSession,
    ) -> Result<Option<SyncOutcome>, AppError> {
        if !db::category_exists(&mut *conn, &session.category_name).await? {
            return Ok(Some(SyncOutcome::NotFound {
                message: format!("Category {} does not exist", session.category_name),
            }));
        }

        if self.config.is_deleted_marker(&session.technology) {
            // Only markers already written by a forced delete can be reused
            let recorded =
                db::count_sessions_with(&mut *conn, TaxonomyField::Technology, &session.technology)
                    .await?;
            if recorded == 0 {
                return Ok(Some(SyncOutcome::NotFound {
                    message: format!("No deleted technology is recorded as {}", session.technology),
                }));
            }
        } else if db::get_technology_by_name(&mut *conn, &session.technology)
            .await?
            .is_none()
        {
            return Ok(Some(SyncOutcome::NotFound {
                message: format!("Technology {} does not exist", session.technology),
            }));
        }

        Ok(None)
    }

    #[instrument(skip(self, session))]
    pub async fn add_session(&self, session: NewSession) -> Result<SyncOutcome, AppError> {
        let session = session.normalized();
        if let Err(e) = session.check() {
            return Ok(SyncOutcome::invalid(e.to_string()));
        }

        self.add_session_inner(&session)
            .await
            .inspect_err(|e| e.log_and_record("add_session"))
    }

    async fn add_session_inner(&self, session: &NewSession) -> Result<SyncOutcome, AppError> {
        let (_gate, mut tx) = self.begin().await?;

        if let Some(refusal) = self.unknown_session_taxonomy(&mut tx, session).await? {
            return self.abandon(tx, refusal).await;
        }

        let id = db::insert_session(&mut *tx, session).await?;

        let changes = ChangeSet {
            id: Some(id),
            sessions: 1,
            ..Default::default()
        };
        self.commit(
            tx,
            SyncOutcome::applied(format!("Added session {}", id), changes),
        )
        .await
    }

    #[instrument(skip(self, session))]
    pub async fn update_session(
        &self,
        id: i64,
        session: NewSession,
    ) -> Result<SyncOutcome, AppError> {
        let session = session.normalized();
        if let Err(e) = session.check() {
            return Ok(SyncOutcome::invalid(e.to_string()));
        }

        self.update_session_inner(id, &session)
            .await
            .inspect_err(|e| e.log_and_record("update_session"))
    }

    async fn update_session_inner(
        &self,
        id: i64,
        session: &NewSession,
    ) -> Result<SyncOutcome, AppError> {
        let (_gate, mut tx) = self.begin().await?;

        if let Some(refusal) = self.unknown_session_taxonomy(&mut tx, session).await? {
            return self.abandon(tx, refusal).await;
        }

        let sessions = db::update_session_row(&mut *tx, id, session).await?;
        if sessions == 0 {
            let outcome = SyncOutcome::NotFound {
                message: format!("Session {} not found", id),
            };
            return self.abandon(tx, outcome).await;
        }

        let changes = ChangeSet {
            id: Some(id),
            sessions,
            ..Default::default()
        };
        self.commit(
            tx,
            SyncOutcome::applied(format!("Updated session {}", id), changes),
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_session(&self, id: i64) -> Result<SyncOutcome, AppError> {
        self.delete_session_inner(id)
            .await
            .inspect_err(|e| e.log_and_record("delete_session"))
    }

    async fn delete_session_inner(&self, id: i64) -> Result<SyncOutcome, AppError> {
        let (_gate, mut tx) = self.begin().await?;

        let sessions = db::delete_session_row(&mut *tx, id).await?;
        if sessions == 0 {
            let outcome = SyncOutcome::NotFound {
                message: format!("Session {} not found", id),
            };
            return self.abandon(tx, outcome).await;
        }

        let changes = ChangeSet {
            id: Some(id),
            sessions,
            ..Default::default()
        };
        self.commit(
            tx,
            SyncOutcome::applied(format!("Deleted session {}", id), changes),
        )
        .await
    }

    // ==================== repair ====================

    /// Brings the option registry back in line with the canonical tables. Idempotent: a
    /// second run reports `NoOp`.
    #[instrument(skip(self))]
    pub async fn repair_consistency(&self) -> Result<SyncOutcome, AppError> {
        self.repair_consistency_inner()
            .await
            .inspect_err(|e| e.log_and_record("repair_consistency"))
    }

    async fn repair_consistency_inner(&self) -> Result<SyncOutcome, AppError> {
        let (_gate, mut tx) = self.begin().await?;

        let categories = db::insert_missing_technology_categories(&mut *tx, today()).await?;
        let options = db::insert_missing_category_options(&mut *tx).await?
            + db::delete_orphan_category_options(&mut *tx).await?
            + db::insert_missing_technology_options(&mut *tx).await?
            + db::delete_orphan_technology_options(&mut *tx).await?;

        if categories == 0 && options == 0 {
            let outcome = SyncOutcome::NoOp {
                message: "Taxonomy is already consistent".to_string(),
            };
            return self.abandon(tx, outcome).await;
        }

        let changes = ChangeSet {
            categories,
            options,
            ..Default::default()
        };
        let message = format!(
            "Repaired {} categories and {} registry entries",
            categories, options
        );
        self.commit(tx, SyncOutcome::applied(message, changes)).await
    }
}

/// Points every technology, technology registry entry and session at `to` instead of
/// `from`.
async fn move_category_dependents(
    conn: &mut SqliteConnection,
    from: &str,
    to: &str,
) -> Result<ChangeSet, AppError> {
    let technologies = db::reassign_technologies_category(&mut *conn, from, to).await?;
    let options = db::reparent_option_values(conn, TaxonomyField::Technology, from, to).await?;
    let sessions =
        db::rewrite_session_values(&mut *conn, TaxonomyField::Category, from, to, None).await?;

    Ok(ChangeSet {
        technologies,
        sessions,
        options,
        ..Default::default()
    })
}

/// Shared cascade of delete and merge: dependents move to `target` before `source` and its
/// registry entry are removed.
async fn fold_category_into(
    conn: &mut SqliteConnection,
    source: &str,
    target: &str,
) -> Result<ChangeSet, AppError> {
    let mut changes = move_category_dependents(&mut *conn, source, target).await?;

    changes.categories += db::delete_category_row(&mut *conn, source).await?;
    changes.options +=
        db::delete_option_values(&mut *conn, TaxonomyField::Category, source, None).await?;

    info!(
        source = %source,
        target = %target,
        technologies = changes.technologies,
        sessions = changes.sessions,
        "Category folded into another"
    );
    Ok(changes)
}
