//! Cross-projection consistency audit.
//!
//! Categories and technologies live in their canonical tables, in the option registry and
//! as copies on sessions. The audit compares those sets and lists every disagreement;
//! `Synchronizer::repair_consistency` fixes the registry side of them.

use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, instrument, warn};

use crate::config::is_deleted_marker;
use crate::db;
use crate::error::AppError;
use crate::models::{OptionValue, Technology};
use crate::taxonomy::TaxonomyField;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditIssue {
    CategoryMissingFromRegistry { category: String },
    RegistryCategoryWithoutRow { category: String },
    TechnologyWithUnknownCategory { technology: String, category: String },
    SessionWithUnknownCategory { category: String },
    TechnologyMissingFromRegistry { technology: String, category: String },
    RegistryTechnologyWithoutRow { technology: String, parent: Option<String> },
    SessionWithUnknownTechnology { technology: String },
}

impl fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditIssue::CategoryMissingFromRegistry { category } => {
                write!(f, "Category '{}' has no registry entry", category)
            }
            AuditIssue::RegistryCategoryWithoutRow { category } => {
                write!(f, "Registry category '{}' has no category row", category)
            }
            AuditIssue::TechnologyWithUnknownCategory {
                technology,
                category,
            } => write!(
                f,
                "Technology '{}' references unknown category '{}'",
                technology, category
            ),
            AuditIssue::SessionWithUnknownCategory { category } => {
                write!(f, "Sessions reference unknown category '{}'", category)
            }
            AuditIssue::TechnologyMissingFromRegistry {
                technology,
                category,
            } => write!(
                f,
                "Technology '{}' has no registry entry under '{}'",
                technology, category
            ),
            AuditIssue::RegistryTechnologyWithoutRow { technology, parent } => write!(
                f,
                "Registry technology '{}' under '{}' has no technology row",
                technology,
                parent.as_deref().unwrap_or("")
            ),
            AuditIssue::SessionWithUnknownTechnology { technology } => {
                write!(f, "Sessions reference unknown technology '{}'", technology)
            }
        }
    }
}

/// How many distinct values each projection holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectionCounts {
    pub categories: usize,
    pub registry_categories: usize,
    pub technology_categories: usize,
    pub session_categories: usize,
    pub technologies: usize,
    pub registry_technologies: usize,
    pub session_technologies: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub counts: ProjectionCounts,
    pub issues: Vec<AuditIssue>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Everything the audit looks at, loaded up front.
pub struct Snapshot {
    pub categories: Vec<String>,
    pub technologies: Vec<Technology>,
    pub options: Vec<OptionValue>,
    pub session_categories: Vec<String>,
    pub session_technologies: Vec<String>,
}

impl Snapshot {
    #[instrument(skip(pool))]
    pub async fn load(pool: &Pool<Sqlite>) -> Result<Self, AppError> {
        Ok(Self {
            categories: db::list_category_names(pool).await?,
            technologies: db::list_technologies(pool).await?,
            options: db::list_all_option_rows(pool).await?,
            session_categories: db::distinct_session_values(pool, TaxonomyField::Category, None)
                .await?,
            session_technologies: db::distinct_session_values(
                pool,
                TaxonomyField::Technology,
                None,
            )
            .await?,
        })
    }
}

/// Compares the projections in `snapshot`. Session technologies shaped like
/// `"<deleted_prefix> <name>"` belong to force-deleted technologies and are not reported.
pub fn audit_snapshot(snapshot: &Snapshot, deleted_prefix: &str) -> AuditReport {
    let mut issues = BTreeSet::new();

    let categories: BTreeSet<&str> = snapshot.categories.iter().map(String::as_str).collect();

    let category_field = TaxonomyField::Category.as_str();
    let technology_field = TaxonomyField::Technology.as_str();

    let mut registry_categories = BTreeSet::new();
    let mut registry_technologies = BTreeSet::new();
    for option in &snapshot.options {
        if option.field_name == category_field {
            if option.parent_field.is_none() && categories.contains(option.field_value.as_str()) {
                registry_categories.insert(option.field_value.as_str());
            } else {
                issues.insert(AuditIssue::RegistryCategoryWithoutRow {
                    category: option.field_value.clone(),
                });
            }
        } else if option.field_name == technology_field {
            registry_technologies.insert((
                option.field_value.as_str(),
                option.parent_field.as_deref(),
                option.parent_value.as_deref(),
            ));
        }
    }

    for category in &categories {
        if !registry_categories.contains(category) {
            issues.insert(AuditIssue::CategoryMissingFromRegistry {
                category: category.to_string(),
            });
        }
    }

    let mut technology_categories = BTreeSet::new();
    let mut technologies = BTreeSet::new();
    let mut expected_registry = BTreeSet::new();
    for technology in &snapshot.technologies {
        technologies.insert(technology.name.as_str());
        technology_categories.insert(technology.category.as_str());

        if !categories.contains(technology.category.as_str()) {
            issues.insert(AuditIssue::TechnologyWithUnknownCategory {
                technology: technology.name.clone(),
                category: technology.category.clone(),
            });
        }

        let entry = (
            technology.name.as_str(),
            Some(category_field),
            Some(technology.category.as_str()),
        );
        if !registry_technologies.contains(&entry) {
            issues.insert(AuditIssue::TechnologyMissingFromRegistry {
                technology: technology.name.clone(),
                category: technology.category.clone(),
            });
        }
        expected_registry.insert(entry);
    }

    for entry in registry_technologies.difference(&expected_registry) {
        issues.insert(AuditIssue::RegistryTechnologyWithoutRow {
            technology: entry.0.to_string(),
            parent: entry.2.map(str::to_string),
        });
    }

    for category in &snapshot.session_categories {
        if !categories.contains(category.as_str()) {
            issues.insert(AuditIssue::SessionWithUnknownCategory {
                category: category.clone(),
            });
        }
    }

    for technology in &snapshot.session_technologies {
        if !is_deleted_marker(deleted_prefix, technology)
            && !technologies.contains(technology.as_str())
        {
            issues.insert(AuditIssue::SessionWithUnknownTechnology {
                technology: technology.clone(),
            });
        }
    }

    let registry_category_values: BTreeSet<&str> = snapshot
        .options
        .iter()
        .filter(|o| o.field_name == category_field)
        .map(|o| o.field_value.as_str())
        .collect();
    let registry_technology_values: BTreeSet<&str> =
        registry_technologies.iter().map(|entry| entry.0).collect();

    AuditReport {
        counts: ProjectionCounts {
            categories: categories.len(),
            registry_categories: registry_category_values.len(),
            technology_categories: technology_categories.len(),
            session_categories: snapshot.session_categories.len(),
            technologies: technologies.len(),
            registry_technologies: registry_technology_values.len(),
            session_technologies: snapshot.session_technologies.len(),
        },
        issues: issues.into_iter().collect(),
    }
}

#[instrument(skip(pool))]
pub async fn audit_consistency(
    pool: &Pool<Sqlite>,
    deleted_prefix: &str,
) -> Result<AuditReport, AppError> {
    info!("Auditing taxonomy consistency");
    let snapshot = Snapshot::load(pool).await?;
    let report = audit_snapshot(&snapshot, deleted_prefix);

    if report.is_consistent() {
        info!("Taxonomy is consistent across all tables");
    } else {
        for issue in &report.issues {
            warn!(issue = %issue, "Consistency issue");
        }
    }

    Ok(report)
}
