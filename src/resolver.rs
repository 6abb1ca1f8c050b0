//! Cascading option resolution.
//!
//! Child options for a parent selection are derived on every call from the canonical
//! tables, the option registry and the history of logged sessions. Nothing is
//! accumulated in memory, so a value typed inline on a session is selectable for the
//! next session under the same parent without a separate registration step.

use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::collections::BTreeSet;
use tracing::{info, instrument};

use crate::db;
use crate::error::AppError;
use crate::taxonomy::{Storage, TaxonomyField, normalize_value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Resolution {
    Options(Vec<String>),
    /// The field is filtered by its parent and no parent was selected.
    ParentRequired(TaxonomyField),
}

impl Resolution {
    pub fn values(&self) -> &[String] {
        match self {
            Resolution::Options(values) => values,
            Resolution::ParentRequired(_) => &[],
        }
    }

    pub fn into_values(self) -> Vec<String> {
        match self {
            Resolution::Options(values) => values,
            Resolution::ParentRequired(_) => Vec::new(),
        }
    }

    pub fn requires_parent(&self) -> bool {
        matches!(self, Resolution::ParentRequired(_))
    }
}

/// Unions any number of value sources into one trimmed, de-duplicated, sorted list.
pub fn merge_sources<I, S>(sources: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: IntoIterator<Item = String>,
{
    sources
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Valid values for `field` under `parent_value`.
///
/// A blank parent counts as no parent. Fields that hang under a parent answer
/// `ParentRequired` instead of an unfiltered list; use [`resolve_all_options`] for that.
#[instrument(skip(pool))]
pub async fn resolve_options(
    pool: &Pool<Sqlite>,
    field: TaxonomyField,
    parent_value: Option<&str>,
) -> Result<Resolution, AppError> {
    info!("Resolving options");
    let parent_value = normalize_value(parent_value);

    let values = match (field.storage(), parent_value) {
        (Storage::CategoryTable, _) => db::list_category_names(pool).await?,
        (_, None) => {
            let parent = field.parent().unwrap_or(field);
            return Ok(Resolution::ParentRequired(parent));
        }
        (Storage::TechnologyTable, Some(category)) => {
            db::list_technology_names(pool, Some(category)).await?
        }
        (Storage::Registry, Some(parent)) => {
            let declared = db::list_option_values(pool, field, Some(parent)).await?;
            let observed = db::distinct_session_values(pool, field, Some(parent)).await?;
            merge_sources([declared, observed])
        }
    };

    Ok(Resolution::Options(merge_sources([values])))
}

/// Every known value for `field`, ignoring parents. This is the explicit root-level
/// listing mode.
#[instrument(skip(pool))]
pub async fn resolve_all_options(
    pool: &Pool<Sqlite>,
    field: TaxonomyField,
) -> Result<Vec<String>, AppError> {
    info!("Resolving all options");
    let values = match field.storage() {
        Storage::CategoryTable => db::list_category_names(pool).await?,
        Storage::TechnologyTable => db::list_technology_names(pool, None).await?,
        Storage::Registry => {
            let declared = db::list_option_values(pool, field, None).await?;
            let observed = db::distinct_session_values(pool, field, None).await?;
            merge_sources([declared, observed])
        }
    };

    Ok(merge_sources([values]))
}
