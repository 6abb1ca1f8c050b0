use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AppError;

/// One level of the Category → Technology → WorkItem → SkillTopic hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyField {
    Category,
    Technology,
    WorkItem,
    SkillTopic,
}

/// Where the authoritative list of values for a level lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// `categories` table, keyed by `category_name`.
    CategoryTable,
    /// `technologies` table, keyed by `name`, parented by `category`.
    TechnologyTable,
    /// Only the `option_values` registry plus whatever sessions have recorded.
    Registry,
}

impl TaxonomyField {
    pub const ALL: [TaxonomyField; 4] = [
        TaxonomyField::Category,
        TaxonomyField::Technology,
        TaxonomyField::WorkItem,
        TaxonomyField::SkillTopic,
    ];

    /// Name used for `option_values.field_name` and `parent_field`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomyField::Category => "category_name",
            TaxonomyField::Technology => "technology",
            TaxonomyField::WorkItem => "work_item",
            TaxonomyField::SkillTopic => "skill_topic",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, AppError> {
        match s.trim() {
            "category_name" | "category" => Ok(TaxonomyField::Category),
            "technology" => Ok(TaxonomyField::Technology),
            "work_item" => Ok(TaxonomyField::WorkItem),
            "skill_topic" => Ok(TaxonomyField::SkillTopic),
            other => Err(AppError::Validation(format!(
                "Unknown taxonomy field '{}'",
                other
            ))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaxonomyField::Category => "Category",
            TaxonomyField::Technology => "Technology",
            TaxonomyField::WorkItem => "Work Item",
            TaxonomyField::SkillTopic => "Skill / Topic",
        }
    }

    pub fn parent(&self) -> Option<TaxonomyField> {
        match self {
            TaxonomyField::Category => None,
            TaxonomyField::Technology => Some(TaxonomyField::Category),
            TaxonomyField::WorkItem => Some(TaxonomyField::Technology),
            TaxonomyField::SkillTopic => Some(TaxonomyField::WorkItem),
        }
    }

    pub fn child(&self) -> Option<TaxonomyField> {
        match self {
            TaxonomyField::Category => Some(TaxonomyField::Technology),
            TaxonomyField::Technology => Some(TaxonomyField::WorkItem),
            TaxonomyField::WorkItem => Some(TaxonomyField::SkillTopic),
            TaxonomyField::SkillTopic => None,
        }
    }

    /// Column of the `sessions` table holding a copy of this level's value.
    pub fn session_column(&self) -> &'static str {
        match self {
            TaxonomyField::Category => "category_name",
            TaxonomyField::Technology => "technology",
            TaxonomyField::WorkItem => "work_item",
            TaxonomyField::SkillTopic => "skill_topic",
        }
    }

    pub fn storage(&self) -> Storage {
        match self {
            TaxonomyField::Category => Storage::CategoryTable,
            TaxonomyField::Technology => Storage::TechnologyTable,
            TaxonomyField::WorkItem | TaxonomyField::SkillTopic => Storage::Registry,
        }
    }

    pub fn is_registry_only(&self) -> bool {
        self.storage() == Storage::Registry
    }
}

impl fmt::Display for TaxonomyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trims a user supplied value, mapping blank input to `None`.
pub fn normalize_value(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_links_are_symmetric() {
        for field in TaxonomyField::ALL {
            if let Some(parent) = field.parent() {
                assert_eq!(parent.child(), Some(field));
            }
        }
        assert_eq!(TaxonomyField::Category.parent(), None);
        assert_eq!(TaxonomyField::SkillTopic.child(), None);
    }

    #[test]
    fn field_names_round_trip() {
        for field in TaxonomyField::ALL {
            assert_eq!(TaxonomyField::from_str(field.as_str()).unwrap(), field);
        }
        assert_eq!(
            TaxonomyField::from_str("category").unwrap(),
            TaxonomyField::Category
        );
        assert!(TaxonomyField::from_str("difficulty").is_err());
    }

    #[test]
    fn only_leaf_levels_are_registry_backed() {
        assert!(!TaxonomyField::Category.is_registry_only());
        assert!(!TaxonomyField::Technology.is_registry_only());
        assert!(TaxonomyField::WorkItem.is_registry_only());
        assert!(TaxonomyField::SkillTopic.is_registry_only());
    }

    #[test]
    fn blank_values_normalize_to_none() {
        assert_eq!(normalize_value(None), None);
        assert_eq!(normalize_value(Some("   ")), None);
        assert_eq!(normalize_value(Some(" Rust ")), Some("Rust"));
    }
}
