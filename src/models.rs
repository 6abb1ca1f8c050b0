use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::error::AppError;

pub const DIFFICULTY_LEVELS: [&str; 4] = ["Beginner", "Intermediate", "Advanced", "Expert"];
pub const SESSION_STATUSES: [&str; 4] = ["Planned", "In Progress", "Completed", "Blocked"];
pub const MAX_SESSION_HOURS: f64 = 12.0;
pub const DEFAULT_GOAL_HOURS: f64 = 50.0;

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub is_custom: bool,
    pub date_added: NaiveDate,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCategory {
    pub id: Option<i64>,
    pub category_name: Option<String>,
    pub is_custom: Option<bool>,
    pub date_added: Option<NaiveDate>,
}

impl From<DbCategory> for Category {
    fn from(db: DbCategory) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.category_name.unwrap_or_default(),
            is_custom: db.is_custom.unwrap_or_default(),
            date_added: db.date_added.unwrap_or_else(|| Utc::now().date_naive()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technology {
    pub id: i64,
    pub name: String,
    pub category: String, // Soft reference to categories.category_name
    pub goal_hours: f64,
    pub date_added: NaiveDate,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTechnology {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub goal_hours: Option<f64>,
    pub date_added: Option<NaiveDate>,
}

impl From<DbTechnology> for Technology {
    fn from(db: DbTechnology) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            category: db.category.unwrap_or_default(),
            goal_hours: db.goal_hours.unwrap_or(DEFAULT_GOAL_HOURS),
            date_added: db.date_added.unwrap_or_else(|| Utc::now().date_naive()),
        }
    }
}

/// Partial update applied by `Synchronizer::update_technology`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnologyUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub goal_hours: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    Studying,
    Practice,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Studying => "Studying",
            SessionType::Practice => "Practice",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, AppError> {
        match s {
            "Studying" => Ok(SessionType::Studying),
            "Practice" => Ok(SessionType::Practice),
            other => Err(AppError::Validation(format!(
                "Unknown session type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub session_date: NaiveDate,
    pub session_type: SessionType,
    pub category_name: String,
    pub technology: String,
    pub work_item: String,
    pub skill_topic: String,
    pub category_source: String,
    pub difficulty: Option<String>,
    pub status: Option<String>,
    pub hours_spent: f64,
    pub tags: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbSession {
    pub id: Option<i64>,
    pub session_date: Option<NaiveDate>,
    pub session_type: Option<String>,
    pub category_name: Option<String>,
    pub technology: Option<String>,
    pub work_item: Option<String>,
    pub skill_topic: Option<String>,
    pub category_source: Option<String>,
    pub difficulty: Option<String>,
    pub status: Option<String>,
    pub hours_spent: Option<f64>,
    pub tags: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbSession> for Session {
    fn from(db: DbSession) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            session_date: db.session_date.unwrap_or_else(|| Utc::now().date_naive()),
            session_type: db
                .session_type
                .as_deref()
                .and_then(|s| SessionType::from_str(s).ok())
                .unwrap_or(SessionType::Studying),
            category_name: db.category_name.unwrap_or_default(),
            technology: db.technology.unwrap_or_default(),
            work_item: db.work_item.unwrap_or_default(),
            skill_topic: db.skill_topic.unwrap_or_default(),
            category_source: db.category_source.unwrap_or_default(),
            difficulty: db.difficulty,
            status: db.status,
            hours_spent: db.hours_spent.unwrap_or_default(),
            tags: db.tags.unwrap_or_default(),
            notes: db.notes.unwrap_or_default(),
            created_at: to_utc(db.created_at),
            updated_at: to_utc(db.updated_at),
        }
    }
}

/// A session as submitted by the logging form, before it has an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewSession {
    pub session_date: NaiveDate,
    pub session_type: SessionType,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category_name: String,
    #[validate(length(min = 1, message = "Technology is required"))]
    pub technology: String,
    pub work_item: String,
    pub skill_topic: String,
    pub category_source: String,
    pub difficulty: Option<String>,
    pub status: Option<String>,
    #[validate(range(min = 0.0, max = 12.0, message = "Hours must be between 0 and 12"))]
    pub hours_spent: f64,
    pub tags: String,
    pub notes: String,
}

impl NewSession {
    pub fn new(
        session_date: NaiveDate,
        session_type: SessionType,
        category_name: &str,
        technology: &str,
        hours_spent: f64,
    ) -> Self {
        Self {
            session_date,
            session_type,
            category_name: category_name.to_string(),
            technology: technology.to_string(),
            work_item: String::new(),
            skill_topic: String::new(),
            category_source: String::new(),
            difficulty: None,
            status: None,
            hours_spent,
            tags: String::new(),
            notes: String::new(),
        }
    }

    pub fn work_item(mut self, work_item: &str) -> Self {
        self.work_item = work_item.to_string();
        self
    }

    pub fn skill_topic(mut self, skill_topic: &str) -> Self {
        self.skill_topic = skill_topic.to_string();
        self
    }

    pub fn difficulty(mut self, difficulty: &str) -> Self {
        self.difficulty = Some(difficulty.to_string());
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    /// Trims every taxonomy value so stored copies compare equal to registry entries.
    pub fn normalized(mut self) -> Self {
        for value in [
            &mut self.category_name,
            &mut self.technology,
            &mut self.work_item,
            &mut self.skill_topic,
            &mut self.category_source,
        ] {
            *value = value.trim().to_string();
        }
        self.difficulty = self.difficulty.filter(|d| !d.trim().is_empty());
        self.status = self.status.filter(|s| !s.trim().is_empty());
        self
    }

    /// Field validation plus the vocabulary checks the derive cannot express.
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;

        if !self.hours_spent.is_finite() {
            return Err(AppError::Validation("Hours must be a number".to_string()));
        }

        if let Some(difficulty) = &self.difficulty {
            if !DIFFICULTY_LEVELS.contains(&difficulty.as_str()) {
                return Err(AppError::Validation(format!(
                    "Unknown difficulty '{}'",
                    difficulty
                )));
            }
        }

        if let Some(status) = &self.status {
            if !SESSION_STATUSES.contains(&status.as_str()) {
                return Err(AppError::Validation(format!(
                    "Unknown status '{}'",
                    status
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValue {
    pub id: i64,
    pub field_name: String,
    pub field_value: String,
    pub parent_field: Option<String>,
    pub parent_value: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbOptionValue {
    pub id: Option<i64>,
    pub field_name: Option<String>,
    pub field_value: Option<String>,
    pub parent_field: Option<String>,
    pub parent_value: Option<String>,
}

impl From<DbOptionValue> for OptionValue {
    fn from(db: DbOptionValue) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            field_name: db.field_name.unwrap_or_default(),
            field_value: db.field_value.unwrap_or_default(),
            // Root-level entries are stored with empty parent strings
            parent_field: db.parent_field.filter(|p| !p.is_empty()),
            parent_value: db.parent_value.filter(|p| !p.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechStackUsage {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub goal_hours: f64,
    pub date_added: NaiveDate,
    pub logged_hours: f64,
    pub session_count: i64,
    pub progress_pct: f64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTechStackUsage {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub goal_hours: Option<f64>,
    pub date_added: Option<NaiveDate>,
    pub logged_hours: Option<f64>,
    pub session_count: Option<i64>,
}

impl From<DbTechStackUsage> for TechStackUsage {
    fn from(db: DbTechStackUsage) -> Self {
        let goal_hours = db.goal_hours.unwrap_or(DEFAULT_GOAL_HOURS);
        let logged_hours = db.logged_hours.unwrap_or_default();
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            category: db.category.unwrap_or_default(),
            goal_hours,
            date_added: db.date_added.unwrap_or_else(|| Utc::now().date_naive()),
            logged_hours,
            session_count: db.session_count.unwrap_or_default(),
            progress_pct: progress_pct(logged_hours, goal_hours),
        }
    }
}

pub fn progress_pct(logged_hours: f64, goal_hours: f64) -> f64 {
    if goal_hours > 0.0 {
        logged_hours / goal_hours * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total_sessions: i64,
    pub total_hours: f64,
    pub tech_count: i64,
    pub category_count: i64,
    pub total_goal_hours: f64,
    /// Total hours against the summed goals, rounded to one decimal.
    pub overall_progress: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUsage {
    pub tech_count: i64,
    pub session_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub name: String,
    pub hours: f64,
    pub sessions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAnalytics {
    pub category: String,
    pub total_hours: f64,
    pub total_sessions: i64,
    pub technologies: Vec<Breakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyAnalytics {
    pub technology: String,
    pub category: String,
    pub total_hours: f64,
    pub total_sessions: i64,
    pub work_items: Vec<Breakdown>,
}
