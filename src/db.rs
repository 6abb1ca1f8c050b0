use chrono::NaiveDate;
use sqlx::{Executor, Sqlite};
use tracing::{debug, info, instrument};

use crate::error::AppError;
use crate::models::{
    Category, DbCategory, DbOptionValue, DbSession, DbTechnology, NewSession, OptionValue,
    Session, Technology,
};
use crate::taxonomy::TaxonomyField;

/// Maps a unique constraint violation onto `Ok(None)` so callers get a duplicate signal
/// instead of a storage error.
fn unless_duplicate<T>(result: Result<T, sqlx::Error>) -> Result<Option<T>, AppError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ==================== categories ====================

#[instrument(skip(executor))]
pub async fn insert_category(
    executor: impl Executor<'_, Database = Sqlite>,
    name: &str,
    is_custom: bool,
    date_added: NaiveDate,
) -> Result<bool, AppError> {
    info!("Inserting category");
    let res = sqlx::query(
        "INSERT INTO categories (category_name, is_custom, date_added) VALUES (?, ?, ?)",
    )
    .bind(name)
    .bind(is_custom)
    .bind(date_added)
    .execute(executor)
    .await;

    let inserted = unless_duplicate(res)?.is_some();
    if !inserted {
        debug!("Category already exists");
    }
    Ok(inserted)
}

#[instrument(skip(executor))]
pub async fn category_exists(
    executor: impl Executor<'_, Database = Sqlite>,
    name: &str,
) -> Result<bool, AppError> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT id FROM categories WHERE category_name = ?")
            .bind(name)
            .fetch_optional(executor)
            .await?;

    Ok(found.is_some())
}

#[instrument(skip(executor))]
pub async fn list_categories(
    executor: impl Executor<'_, Database = Sqlite>,
) -> Result<Vec<Category>, AppError> {
    info!("Listing categories");
    let rows = sqlx::query_as::<_, DbCategory>(
        "SELECT id, category_name, is_custom, date_added FROM categories
         ORDER BY is_custom, category_name",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Category::from).collect())
}

#[instrument(skip(executor))]
pub async fn list_category_names(
    executor: impl Executor<'_, Database = Sqlite>,
) -> Result<Vec<String>, AppError> {
    let names =
        sqlx::query_scalar::<_, String>("SELECT category_name FROM categories ORDER BY category_name")
            .fetch_all(executor)
            .await?;

    Ok(names)
}

#[instrument(skip(executor))]
pub async fn list_custom_category_names(
    executor: impl Executor<'_, Database = Sqlite>,
) -> Result<Vec<String>, AppError> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT category_name FROM categories WHERE is_custom = 1 ORDER BY category_name",
    )
    .fetch_all(executor)
    .await?;

    Ok(names)
}

#[instrument(skip(executor))]
pub async fn rename_category_row(
    executor: impl Executor<'_, Database = Sqlite>,
    old_name: &str,
    new_name: &str,
) -> Result<u64, AppError> {
    info!("Renaming category row");
    let res = sqlx::query("UPDATE categories SET category_name = ? WHERE category_name = ?")
        .bind(new_name)
        .bind(old_name)
        .execute(executor)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn delete_category_row(
    executor: impl Executor<'_, Database = Sqlite>,
    name: &str,
) -> Result<u64, AppError> {
    info!("Deleting category row");
    let res = sqlx::query("DELETE FROM categories WHERE category_name = ?")
        .bind(name)
        .execute(executor)
        .await?;

    Ok(res.rows_affected())
}

// ==================== technologies ====================

const TECHNOLOGY_COLUMNS: &str = "id, name, category, goal_hours, date_added";

/// Returns the new id, or `None` when the name is already taken.
#[instrument(skip(executor))]
pub async fn insert_technology(
    executor: impl Executor<'_, Database = Sqlite>,
    name: &str,
    category: &str,
    goal_hours: f64,
    date_added: NaiveDate,
) -> Result<Option<i64>, AppError> {
    info!("Inserting technology");
    let res = sqlx::query(
        "INSERT INTO technologies (name, category, goal_hours, date_added) VALUES (?, ?, ?, ?)",
    )
    .bind(name)
    .bind(category)
    .bind(goal_hours)
    .bind(date_added)
    .execute(executor)
    .await;

    let id = unless_duplicate(res)?.map(|r| r.last_insert_rowid());
    if id.is_none() {
        debug!("Technology already exists");
    }
    Ok(id)
}

#[instrument(skip(executor))]
pub async fn get_technology(
    executor: impl Executor<'_, Database = Sqlite>,
    id: i64,
) -> Result<Option<Technology>, AppError> {
    let row = sqlx::query_as::<_, DbTechnology>(&format!(
        "SELECT {} FROM technologies WHERE id = ?",
        TECHNOLOGY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Technology::from))
}

#[instrument(skip(executor))]
pub async fn get_technology_by_name(
    executor: impl Executor<'_, Database = Sqlite>,
    name: &str,
) -> Result<Option<Technology>, AppError> {
    let row = sqlx::query_as::<_, DbTechnology>(&format!(
        "SELECT {} FROM technologies WHERE name = ?",
        TECHNOLOGY_COLUMNS
    ))
    .bind(name)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Technology::from))
}

#[instrument(skip(executor))]
pub async fn list_technologies(
    executor: impl Executor<'_, Database = Sqlite>,
) -> Result<Vec<Technology>, AppError> {
    info!("Listing technologies");
    let rows = sqlx::query_as::<_, DbTechnology>(&format!(
        "SELECT {} FROM technologies ORDER BY category, name",
        TECHNOLOGY_COLUMNS
    ))
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Technology::from).collect())
}

#[instrument(skip(executor))]
pub async fn list_technology_names(
    executor: impl Executor<'_, Database = Sqlite>,
    category: Option<&str>,
) -> Result<Vec<String>, AppError> {
    let names = match category {
        Some(category) => {
            sqlx::query_scalar::<_, String>(
                "SELECT name FROM technologies WHERE category = ? ORDER BY name",
            )
            .bind(category)
            .fetch_all(executor)
            .await?
        }
        None => {
            sqlx::query_scalar::<_, String>("SELECT name FROM technologies ORDER BY name")
                .fetch_all(executor)
                .await?
        }
    };

    Ok(names)
}

#[instrument(skip(executor))]
pub async fn update_technology_row(
    executor: impl Executor<'_, Database = Sqlite>,
    id: i64,
    name: &str,
    category: &str,
    goal_hours: f64,
) -> Result<u64, AppError> {
    info!("Updating technology row");
    let res = sqlx::query(
        "UPDATE technologies SET name = ?, category = ?, goal_hours = ? WHERE id = ?",
    )
    .bind(name)
    .bind(category)
    .bind(goal_hours)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn reassign_technologies_category(
    executor: impl Executor<'_, Database = Sqlite>,
    old_category: &str,
    new_category: &str,
) -> Result<u64, AppError> {
    info!("Reassigning technologies to another category");
    let res = sqlx::query("UPDATE technologies SET category = ? WHERE category = ?")
        .bind(new_category)
        .bind(old_category)
        .execute(executor)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn delete_technology_row(
    executor: impl Executor<'_, Database = Sqlite>,
    id: i64,
) -> Result<u64, AppError> {
    info!("Deleting technology row");
    let res = sqlx::query("DELETE FROM technologies WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;

    Ok(res.rows_affected())
}

// ==================== option values ====================

/// Inserts a registry entry. A missing parent is stored as empty strings so the
/// unique constraint also covers root-level values.
#[instrument(skip(executor))]
pub async fn insert_option_value(
    executor: impl Executor<'_, Database = Sqlite>,
    field: TaxonomyField,
    value: &str,
    parent_value: Option<&str>,
) -> Result<bool, AppError> {
    let (parent_field, parent_value) = parent_columns(field, parent_value);
    let res = sqlx::query(
        "INSERT INTO option_values (field_name, field_value, parent_field, parent_value)
         VALUES (?, ?, ?, ?)",
    )
    .bind(field.as_str())
    .bind(value)
    .bind(parent_field)
    .bind(parent_value)
    .execute(executor)
    .await;

    let inserted = unless_duplicate(res)?.is_some();
    if inserted {
        info!("Added option value");
    }
    Ok(inserted)
}

fn parent_columns(field: TaxonomyField, parent_value: Option<&str>) -> (&'static str, &str) {
    match (field.parent(), parent_value) {
        (Some(parent), Some(value)) => (parent.as_str(), value),
        _ => ("", ""),
    }
}

#[instrument(skip(executor))]
pub async fn option_value_exists(
    executor: impl Executor<'_, Database = Sqlite>,
    field: TaxonomyField,
    value: &str,
    parent_value: Option<&str>,
) -> Result<bool, AppError> {
    let (parent_field, parent_value) = parent_columns(field, parent_value);
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM option_values
         WHERE field_name = ? AND field_value = ? AND parent_field = ? AND parent_value = ?",
    )
    .bind(field.as_str())
    .bind(value)
    .bind(parent_field)
    .bind(parent_value)
    .fetch_optional(executor)
    .await?;

    Ok(found.is_some())
}

/// Deletes registry entries for `value`. With `parent_value` only the entry under that
/// parent goes, otherwise every entry of that value regardless of parent.
#[instrument(skip(executor))]
pub async fn delete_option_values(
    executor: impl Executor<'_, Database = Sqlite>,
    field: TaxonomyField,
    value: &str,
    parent_value: Option<&str>,
) -> Result<u64, AppError> {
    info!("Deleting option values");
    let res = match parent_value {
        Some(parent_value) => {
            sqlx::query(
                "DELETE FROM option_values
                 WHERE field_name = ? AND field_value = ? AND parent_value = ?",
            )
            .bind(field.as_str())
            .bind(value)
            .bind(parent_value)
            .execute(executor)
            .await?
        }
        None => {
            sqlx::query("DELETE FROM option_values WHERE field_name = ? AND field_value = ?")
                .bind(field.as_str())
                .bind(value)
                .execute(executor)
                .await?
        }
    };

    Ok(res.rows_affected())
}

/// Drops every registry entry of `field` hanging under `parent_value`.
#[instrument(skip(executor))]
pub async fn delete_option_values_under_parent(
    executor: impl Executor<'_, Database = Sqlite>,
    field: TaxonomyField,
    parent_value: &str,
) -> Result<u64, AppError> {
    let Some(parent) = field.parent() else {
        return Ok(0);
    };

    let res = sqlx::query(
        "DELETE FROM option_values WHERE field_name = ? AND parent_field = ? AND parent_value = ?",
    )
    .bind(field.as_str())
    .bind(parent.as_str())
    .bind(parent_value)
    .execute(executor)
    .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn list_option_values(
    executor: impl Executor<'_, Database = Sqlite>,
    field: TaxonomyField,
    parent_value: Option<&str>,
) -> Result<Vec<String>, AppError> {
    let values = match parent_value {
        Some(parent_value) => {
            sqlx::query_scalar::<_, String>(
                "SELECT DISTINCT field_value FROM option_values
                 WHERE field_name = ? AND parent_value = ?
                 ORDER BY field_value",
            )
            .bind(field.as_str())
            .bind(parent_value)
            .fetch_all(executor)
            .await?
        }
        None => {
            sqlx::query_scalar::<_, String>(
                "SELECT DISTINCT field_value FROM option_values
                 WHERE field_name = ?
                 ORDER BY field_value",
            )
            .bind(field.as_str())
            .fetch_all(executor)
            .await?
        }
    };

    Ok(values)
}

#[instrument(skip(executor))]
pub async fn list_all_option_rows(
    executor: impl Executor<'_, Database = Sqlite>,
) -> Result<Vec<OptionValue>, AppError> {
    let rows = sqlx::query_as::<_, DbOptionValue>(
        "SELECT id, field_name, field_value, parent_field, parent_value FROM option_values
         ORDER BY field_name, parent_value, field_value",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(OptionValue::from).collect())
}

/// Renames registry entries, folding into an existing entry when the new tuple is
/// already present. Needs two statements, hence the connection.
#[instrument(skip(conn))]
pub async fn rename_option_values(
    conn: &mut sqlx::SqliteConnection,
    field: TaxonomyField,
    old_value: &str,
    new_value: &str,
    parent_value: Option<&str>,
) -> Result<u64, AppError> {
    info!("Renaming option values");
    let scope = if parent_value.is_some() {
        " AND parent_value = ?"
    } else {
        ""
    };

    let update_sql = format!(
        "UPDATE OR IGNORE option_values SET field_value = ?
         WHERE field_name = ? AND field_value = ?{}",
        scope
    );
    let mut update = sqlx::query(&update_sql)
        .bind(new_value)
        .bind(field.as_str())
        .bind(old_value);
    if let Some(parent_value) = parent_value {
        update = update.bind(parent_value);
    }
    let renamed = update.execute(&mut *conn).await?.rows_affected();

    let leftover_sql = format!(
        "DELETE FROM option_values WHERE field_name = ? AND field_value = ?{}",
        scope
    );
    let mut leftover = sqlx::query(&leftover_sql)
        .bind(field.as_str())
        .bind(old_value);
    if let Some(parent_value) = parent_value {
        leftover = leftover.bind(parent_value);
    }
    let folded = leftover.execute(&mut *conn).await?.rows_affected();

    Ok(renamed + folded)
}

/// Moves every registry entry of `field` from one parent value to another.
#[instrument(skip(conn))]
pub async fn reparent_option_values(
    conn: &mut sqlx::SqliteConnection,
    field: TaxonomyField,
    old_parent: &str,
    new_parent: &str,
) -> Result<u64, AppError> {
    let Some(parent) = field.parent() else {
        return Ok(0);
    };
    info!("Re-parenting option values");

    let moved = sqlx::query(
        "UPDATE OR IGNORE option_values SET parent_value = ?
         WHERE field_name = ? AND parent_field = ? AND parent_value = ?",
    )
    .bind(new_parent)
    .bind(field.as_str())
    .bind(parent.as_str())
    .bind(old_parent)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let folded = sqlx::query(
        "DELETE FROM option_values WHERE field_name = ? AND parent_field = ? AND parent_value = ?",
    )
    .bind(field.as_str())
    .bind(parent.as_str())
    .bind(old_parent)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(moved + folded)
}

// ==================== sessions ====================

const SESSION_COLUMNS: &str = "id, session_date, session_type, category_name, technology,
    work_item, skill_topic, category_source, difficulty, status, hours_spent, tags, notes,
    created_at, updated_at";

#[instrument(skip(executor, session), fields(technology = %session.technology))]
pub async fn insert_session(
    executor: impl Executor<'_, Database = Sqlite>,
    session: &NewSession,
) -> Result<i64, AppError> {
    info!("Inserting session");
    let res = sqlx::query(
        "INSERT INTO sessions (
            session_date, session_type, category_name, technology, work_item, skill_topic,
            category_source, difficulty, status, hours_spent, tags, notes
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(session.session_date)
    .bind(session.session_type.as_str())
    .bind(&session.category_name)
    .bind(&session.technology)
    .bind(&session.work_item)
    .bind(&session.skill_topic)
    .bind(&session.category_source)
    .bind(&session.difficulty)
    .bind(&session.status)
    .bind(session.hours_spent)
    .bind(&session.tags)
    .bind(&session.notes)
    .execute(executor)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(executor))]
pub async fn get_session(
    executor: impl Executor<'_, Database = Sqlite>,
    id: i64,
) -> Result<Option<Session>, AppError> {
    let row = sqlx::query_as::<_, DbSession>(&format!(
        "SELECT {} FROM sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Session::from))
}

#[instrument(skip(executor))]
pub async fn list_sessions(
    executor: impl Executor<'_, Database = Sqlite>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Session>, AppError> {
    info!("Listing sessions");
    let rows = sqlx::query_as::<_, DbSession>(&format!(
        "SELECT {} FROM sessions
         ORDER BY session_date DESC, created_at DESC, id DESC
         LIMIT ? OFFSET ?",
        SESSION_COLUMNS
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Session::from).collect())
}

#[instrument(skip(executor, session))]
pub async fn update_session_row(
    executor: impl Executor<'_, Database = Sqlite>,
    id: i64,
    session: &NewSession,
) -> Result<u64, AppError> {
    info!("Updating session row");
    let res = sqlx::query(
        "UPDATE sessions SET
            session_date = ?, session_type = ?, category_name = ?, technology = ?,
            work_item = ?, skill_topic = ?, category_source = ?, difficulty = ?, status = ?,
            hours_spent = ?, tags = ?, notes = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(session.session_date)
    .bind(session.session_type.as_str())
    .bind(&session.category_name)
    .bind(&session.technology)
    .bind(&session.work_item)
    .bind(&session.skill_topic)
    .bind(&session.category_source)
    .bind(&session.difficulty)
    .bind(&session.status)
    .bind(session.hours_spent)
    .bind(&session.tags)
    .bind(&session.notes)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn delete_session_row(
    executor: impl Executor<'_, Database = Sqlite>,
    id: i64,
) -> Result<u64, AppError> {
    info!("Deleting session row");
    let res = sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn count_sessions_with(
    executor: impl Executor<'_, Database = Sqlite>,
    field: TaxonomyField,
    value: &str,
) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM sessions WHERE {} = ?",
        field.session_column()
    ))
    .bind(value)
    .fetch_one(executor)
    .await?;

    Ok(count)
}

/// Rewrites the copied taxonomy value on every matching session. `scope` restricts the
/// rewrite to sessions whose parent column holds the given value.
#[instrument(skip(executor))]
pub async fn rewrite_session_values(
    executor: impl Executor<'_, Database = Sqlite>,
    field: TaxonomyField,
    old_value: &str,
    new_value: &str,
    scope: Option<(TaxonomyField, &str)>,
) -> Result<u64, AppError> {
    info!("Rewriting session values");
    let column = field.session_column();
    let res = match scope {
        Some((parent, parent_value)) => {
            sqlx::query(&format!(
                "UPDATE sessions SET {column} = ?, updated_at = CURRENT_TIMESTAMP
                 WHERE {column} = ? AND {} = ?",
                parent.session_column()
            ))
            .bind(new_value)
            .bind(old_value)
            .bind(parent_value)
            .execute(executor)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "UPDATE sessions SET {column} = ?, updated_at = CURRENT_TIMESTAMP
                 WHERE {column} = ?"
            ))
            .bind(new_value)
            .bind(old_value)
            .execute(executor)
            .await?
        }
    };

    Ok(res.rows_affected())
}

/// Distinct non-empty values sessions have recorded for `field`, optionally only where
/// the parent column matches.
#[instrument(skip(executor))]
pub async fn distinct_session_values(
    executor: impl Executor<'_, Database = Sqlite>,
    field: TaxonomyField,
    parent_value: Option<&str>,
) -> Result<Vec<String>, AppError> {
    let column = field.session_column();
    let values = match (field.parent(), parent_value) {
        (Some(parent), Some(parent_value)) => {
            sqlx::query_scalar::<_, String>(&format!(
                "SELECT DISTINCT {column} FROM sessions
                 WHERE {} = ? AND {column} IS NOT NULL AND {column} != ''
                 ORDER BY {column}",
                parent.session_column()
            ))
            .bind(parent_value)
            .fetch_all(executor)
            .await?
        }
        _ => {
            sqlx::query_scalar::<_, String>(&format!(
                "SELECT DISTINCT {column} FROM sessions
                 WHERE {column} IS NOT NULL AND {column} != ''
                 ORDER BY {column}"
            ))
            .fetch_all(executor)
            .await?
        }
    };

    Ok(values)
}

// ==================== repair primitives ====================

/// Creates a category row for every technology category that has none.
#[instrument(skip(executor))]
pub async fn insert_missing_technology_categories(
    executor: impl Executor<'_, Database = Sqlite>,
    date_added: NaiveDate,
) -> Result<u64, AppError> {
    let res = sqlx::query(
        "INSERT OR IGNORE INTO categories (category_name, is_custom, date_added)
         SELECT DISTINCT t.category, 1, ? FROM technologies t
         WHERE t.category NOT IN (SELECT category_name FROM categories)",
    )
    .bind(date_added)
    .execute(executor)
    .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn insert_missing_category_options(
    executor: impl Executor<'_, Database = Sqlite>,
) -> Result<u64, AppError> {
    let res = sqlx::query(
        "INSERT OR IGNORE INTO option_values (field_name, field_value, parent_field, parent_value)
         SELECT 'category_name', category_name, '', '' FROM categories",
    )
    .execute(executor)
    .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn delete_orphan_category_options(
    executor: impl Executor<'_, Database = Sqlite>,
) -> Result<u64, AppError> {
    let res = sqlx::query(
        "DELETE FROM option_values
         WHERE field_name = 'category_name'
           AND (parent_field != '' OR field_value NOT IN (SELECT category_name FROM categories))",
    )
    .execute(executor)
    .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn insert_missing_technology_options(
    executor: impl Executor<'_, Database = Sqlite>,
) -> Result<u64, AppError> {
    let res = sqlx::query(
        "INSERT OR IGNORE INTO option_values (field_name, field_value, parent_field, parent_value)
         SELECT 'technology', name, 'category_name', category FROM technologies",
    )
    .execute(executor)
    .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(executor))]
pub async fn delete_orphan_technology_options(
    executor: impl Executor<'_, Database = Sqlite>,
) -> Result<u64, AppError> {
    let res = sqlx::query(
        "DELETE FROM option_values
         WHERE field_name = 'technology'
           AND NOT EXISTS (
               SELECT 1 FROM technologies t
               WHERE t.name = option_values.field_value
                 AND option_values.parent_field = 'category_name'
                 AND t.category = option_values.parent_value
           )",
    )
    .execute(executor)
    .await?;

    Ok(res.rows_affected())
}
