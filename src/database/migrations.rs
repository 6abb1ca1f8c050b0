use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Executor, Pool, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, instrument, warn};

use crate::error::AppError;

static COMMENTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"--[^\n]*(\n|$)").expect("comment pattern is valid"));
static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));
static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" *([(),]) *").expect("punctuation pattern is valid"));
static QUOTED_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(\w+)""#).expect("identifier pattern is valid"));

/// Canonical form of a `CREATE` statement so that cosmetic differences between the live
/// and target schema do not count as changes.
pub fn normalize_sql(sql: &str) -> String {
    let sql = COMMENTS.replace_all(sql, "");
    let sql = WHITESPACE.replace_all(&sql, " ");
    let sql = PUNCTUATION.replace_all(&sql, "$1");
    let sql = QUOTED_IDENTIFIER.replace_all(&sql, "$1");
    sql.trim().to_string()
}

/// What it takes to move the live database onto the target schema.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SchemaPlan {
    pub new_tables: Vec<String>,
    pub rebuilt_tables: Vec<String>,
    pub removed_tables: Vec<String>,
    /// Columns a rebuild would lose, per table.
    pub removed_columns: BTreeMap<String, Vec<String>>,
    pub new_indices: Vec<String>,
    pub changed_indices: Vec<String>,
    pub removed_indices: Vec<String>,
    pub user_version: Option<i64>,
}

impl SchemaPlan {
    pub fn is_empty(&self) -> bool {
        self.new_tables.is_empty()
            && self.rebuilt_tables.is_empty()
            && self.removed_tables.is_empty()
            && self.new_indices.is_empty()
            && self.changed_indices.is_empty()
            && self.removed_indices.is_empty()
            && self.user_version.is_none()
    }

    /// Human readable list of every change that would lose data or structure.
    pub fn destructive_changes(&self) -> Vec<String> {
        let mut changes: Vec<String> = self
            .removed_tables
            .iter()
            .map(|t| format!("drop table {}", t))
            .collect();
        for (table, columns) in &self.removed_columns {
            for column in columns {
                changes.push(format!("drop column {}.{}", table, column));
            }
        }
        changes.extend(self.removed_indices.iter().map(|i| format!("drop index {}", i)));
        changes
    }
}

async fn catalog(
    executor: impl Executor<'_, Database = Sqlite>,
    kind: &str,
) -> Result<BTreeMap<String, String>, AppError> {
    let rows = sqlx::query(
        "SELECT name, sql FROM sqlite_master
         WHERE type = ? AND sql IS NOT NULL AND name NOT LIKE 'sqlite_%'",
    )
    .bind(kind)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>(0), row.get::<String, _>(1)))
        .collect())
}

async fn column_names(
    executor: impl Executor<'_, Database = Sqlite>,
    table: &str,
) -> Result<BTreeSet<String>, AppError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(executor)
        .await?;

    Ok(rows.into_iter().map(|row| row.get::<String, _>(1)).collect())
}

async fn user_version(executor: impl Executor<'_, Database = Sqlite>) -> Result<i64, AppError> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(executor)
        .await?;
    Ok(version)
}

fn changed(
    live: &BTreeMap<String, String>,
    target: &BTreeMap<String, String>,
) -> (Vec<String>, Vec<String>, Vec<String>) {
    let added = target
        .keys()
        .filter(|name| !live.contains_key(*name))
        .cloned()
        .collect();
    let removed = live
        .keys()
        .filter(|name| !target.contains_key(*name))
        .cloned()
        .collect();
    let modified = target
        .iter()
        .filter(|(name, sql)| {
            live.get(*name)
                .is_some_and(|current| normalize_sql(current) != normalize_sql(sql))
        })
        .map(|(name, _)| name.clone())
        .collect();
    (added, removed, modified)
}

#[instrument(skip_all)]
async fn plan(conn: &mut SqliteConnection, pristine: &SqlitePool) -> Result<SchemaPlan, AppError> {
    let live_tables = catalog(&mut *conn, "table").await?;
    let target_tables = catalog(pristine, "table").await?;
    let (new_tables, removed_tables, rebuilt_tables) = changed(&live_tables, &target_tables);

    let mut removed_columns = BTreeMap::new();
    for table in &rebuilt_tables {
        let live = column_names(&mut *conn, table).await?;
        let target = column_names(pristine, table).await?;
        let lost: Vec<String> = live.difference(&target).cloned().collect();
        if !lost.is_empty() {
            removed_columns.insert(table.clone(), lost);
        }
    }

    let live_indices = catalog(&mut *conn, "index").await?;
    let target_indices = catalog(pristine, "index").await?;
    let (new_indices, removed_indices, changed_indices) = changed(&live_indices, &target_indices);

    let target_version = user_version(pristine).await?;
    let live_version = user_version(&mut *conn).await?;

    Ok(SchemaPlan {
        new_tables,
        rebuilt_tables,
        removed_tables,
        removed_columns,
        new_indices,
        changed_indices,
        removed_indices,
        user_version: (target_version != live_version).then_some(target_version),
    })
}

async fn pristine_pool(target_schema: &str) -> Result<SqlitePool, AppError> {
    let pristine = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    if !target_schema.trim().is_empty() {
        sqlx::raw_sql(target_schema)
            .execute(&pristine)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to build target schema: {}", e)))?;
    }
    Ok(pristine)
}

async fn apply(
    conn: &mut SqliteConnection,
    description: &str,
    sql: &str,
) -> Result<(), AppError> {
    info!("Schema change: {}\n{}", description, sql);
    sqlx::query(sql).execute(&mut *conn).await?;
    Ok(())
}

/// Copies a table's surviving columns into a fresh table built from the target definition.
async fn rebuild_table(
    conn: &mut SqliteConnection,
    pristine: &SqlitePool,
    table: &str,
    target_sql: &str,
) -> Result<(), AppError> {
    let staging = format!("{}_rebuild", table);
    let staging_sql = target_sql.replacen(
        &format!("CREATE TABLE {}", table),
        &format!("CREATE TABLE {}", staging),
        1,
    );
    apply(conn, &format!("stage {}", table), &staging_sql).await?;

    let live = column_names(&mut *conn, table).await?;
    let target = column_names(pristine, table).await?;
    let shared: Vec<&str> = live.intersection(&target).map(String::as_str).collect();
    if !shared.is_empty() {
        let columns = shared.join(", ");
        apply(
            conn,
            &format!("copy rows of {}", table),
            &format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                staging, columns, columns, table
            ),
        )
        .await?;
    }

    apply(conn, &format!("drop old {}", table), &format!("DROP TABLE {}", table)).await?;
    apply(
        conn,
        &format!("swap in {}", table),
        &format!("ALTER TABLE {} RENAME TO {}", staging, table),
    )
    .await
}

/// Computes the changes needed to reach `target_schema` without applying them.
#[instrument(skip(pool, target_schema))]
pub async fn plan_migration(
    pool: &Pool<Sqlite>,
    target_schema: &str,
) -> Result<SchemaPlan, AppError> {
    let pristine = pristine_pool(target_schema).await?;
    let mut conn = pool.acquire().await?;
    plan(&mut conn, &pristine).await
}

/// Brings the database at `pool` in line with `target_schema` inside one transaction.
///
/// The target is materialised in a scratch in-memory database and diffed against
/// `sqlite_master`. Tables whose definition changed are rebuilt with their shared columns
/// copied over. Anything that would drop a table, column or index is refused unless
/// `allow_deletions` is set. Returns whether anything changed.
#[instrument(skip(pool, target_schema))]
pub async fn migrate_database_declaratively(
    pool: &Pool<Sqlite>,
    target_schema: &str,
    allow_deletions: bool,
) -> Result<bool, AppError> {
    info!("Starting declarative database migration");
    let pristine = pristine_pool(target_schema).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("PRAGMA defer_foreign_keys = TRUE")
        .execute(&mut *tx)
        .await?;

    let plan = plan(&mut tx, &pristine).await?;
    if plan.is_empty() {
        tx.commit().await?;
        info!("No schema changes needed");
        return Ok(false);
    }

    let destructive = plan.destructive_changes();
    if !destructive.is_empty() && !allow_deletions {
        tx.rollback().await?;
        warn!(changes = ?destructive, "Refusing destructive migration");
        return Err(AppError::Internal(format!(
            "Migration requires destructive changes {:?}, but allow_deletions=false",
            destructive
        )));
    }

    let target_tables = catalog(&pristine, "table").await?;
    let target_indices = catalog(&pristine, "index").await?;

    for table in &plan.new_tables {
        if let Some(sql) = target_tables.get(table) {
            apply(&mut tx, &format!("create table {}", table), sql).await?;
        }
    }

    for table in &plan.rebuilt_tables {
        if let Some(sql) = target_tables.get(table) {
            rebuild_table(&mut tx, &pristine, table, sql).await?;
        }
    }

    for table in &plan.removed_tables {
        apply(&mut tx, &format!("drop table {}", table), &format!("DROP TABLE {}", table))
            .await?;
    }

    // Rebuilding a table drops its indices along with it
    let live_indices = catalog(&mut *tx, "index").await?;
    for index in live_indices.keys().filter(|i| !target_indices.contains_key(*i)) {
        apply(&mut tx, &format!("drop index {}", index), &format!("DROP INDEX {}", index))
            .await?;
    }
    for (index, sql) in &target_indices {
        match live_indices.get(index) {
            Some(current) if normalize_sql(current) == normalize_sql(sql) => {}
            Some(_) => {
                apply(
                    &mut tx,
                    &format!("drop changed index {}", index),
                    &format!("DROP INDEX {}", index),
                )
                .await?;
                apply(&mut tx, &format!("recreate index {}", index), sql).await?;
            }
            None => apply(&mut tx, &format!("create index {}", index), sql).await?,
        }
    }

    if let Some(version) = plan.user_version {
        apply(
            &mut tx,
            "set user_version",
            &format!("PRAGMA user_version = {}", version),
        )
        .await?;
    }

    tx.commit().await?;
    info!(
        new_tables = plan.new_tables.len(),
        rebuilt_tables = plan.rebuilt_tables.len(),
        "Migration completed"
    );
    Ok(true)
}
