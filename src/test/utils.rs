#[cfg(test)]
pub mod test_db {
    use crate::config::TrackerConfig;
    use crate::database::{CURRENT_SCHEMA, migrate_database_declaratively};
    use crate::db;
    use crate::error::AppError;
    use crate::models::{NewSession, SessionType};
    use crate::taxonomy::TaxonomyField;
    use crate::tracker::Tracker;
    use chrono::NaiveDate;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).expect("valid test date")
    }

    /// A studying session on March `d` with no work item or topic.
    pub fn session(d: u32, category: &str, technology: &str, hours: f64) -> NewSession {
        NewSession::new(day(d), SessionType::Studying, category, technology, hours)
    }

    pub async fn memory_pool() -> Result<Pool<Sqlite>, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .is_test(true)
                .parse_filters("debug")
                .try_init();
        });

        // One connection: every handle sees the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        migrate_database_declaratively(&pool, CURRENT_SCHEMA, false).await?;
        Ok(pool)
    }

    struct TestTechnology {
        name: String,
        category: String,
        goal_hours: f64,
    }

    struct TestOption {
        field: TaxonomyField,
        value: String,
        parent: Option<String>,
    }

    /// Seeds rows straight through the store. `category` and `technology` write both the
    /// canonical row and its registry entry; the `raw_*` methods write one projection only,
    /// for setting up inconsistent databases.
    #[derive(Default)]
    pub struct TestDbBuilder {
        categories: Vec<(String, bool)>,
        raw_categories: Vec<String>,
        technologies: Vec<TestTechnology>,
        raw_technologies: Vec<TestTechnology>,
        options: Vec<TestOption>,
        sessions: Vec<NewSession>,
        config: TrackerConfig,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn category(mut self, name: &str) -> Self {
            self.categories.push((name.to_string(), true));
            self
        }

        pub fn builtin_category(mut self, name: &str) -> Self {
            self.categories.push((name.to_string(), false));
            self
        }

        pub fn technology(mut self, name: &str, category: &str, goal_hours: f64) -> Self {
            self.technologies.push(TestTechnology {
                name: name.to_string(),
                category: category.to_string(),
                goal_hours,
            });
            self
        }

        pub fn session(mut self, session: NewSession) -> Self {
            self.sessions.push(session);
            self
        }

        pub fn option(mut self, field: TaxonomyField, value: &str, parent: Option<&str>) -> Self {
            self.options.push(TestOption {
                field,
                value: value.to_string(),
                parent: parent.map(String::from),
            });
            self
        }

        /// Category row without a registry entry.
        pub fn raw_category(mut self, name: &str) -> Self {
            self.raw_categories.push(name.to_string());
            self
        }

        /// Technology row without a registry entry.
        pub fn raw_technology(mut self, name: &str, category: &str, goal_hours: f64) -> Self {
            self.raw_technologies.push(TestTechnology {
                name: name.to_string(),
                category: category.to_string(),
                goal_hours,
            });
            self
        }

        pub fn config(mut self, config: TrackerConfig) -> Self {
            self.config = config;
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            let pool = memory_pool().await?;
            let mut technology_ids = HashMap::new();

            for (name, is_custom) in &self.categories {
                db::insert_category(&pool, name, *is_custom, day(1)).await?;
                db::insert_option_value(&pool, TaxonomyField::Category, name, None).await?;
            }

            for name in &self.raw_categories {
                db::insert_category(&pool, name, true, day(1)).await?;
            }

            for tech in &self.technologies {
                if let Some(id) =
                    db::insert_technology(&pool, &tech.name, &tech.category, tech.goal_hours, day(1))
                        .await?
                {
                    technology_ids.insert(tech.name.clone(), id);
                }
                db::insert_option_value(
                    &pool,
                    TaxonomyField::Technology,
                    &tech.name,
                    Some(&tech.category),
                )
                .await?;
            }

            for tech in &self.raw_technologies {
                if let Some(id) =
                    db::insert_technology(&pool, &tech.name, &tech.category, tech.goal_hours, day(1))
                        .await?
                {
                    technology_ids.insert(tech.name.clone(), id);
                }
            }

            for option in &self.options {
                db::insert_option_value(&pool, option.field, &option.value, option.parent.as_deref())
                    .await?;
            }

            let mut session_ids = Vec::new();
            for session in &self.sessions {
                session_ids.push(db::insert_session(&pool, session).await?);
            }

            let tracker = Tracker::from_pool(pool.clone(), self.config);

            Ok(TestDb {
                pool,
                tracker,
                technology_ids,
                session_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub tracker: Tracker,
        pub technology_ids: HashMap<String, i64>,
        pub session_ids: Vec<i64>,
    }

    impl TestDb {
        pub fn technology_id(&self, name: &str) -> i64 {
            self.technology_ids[name]
        }

        pub async fn count(&self, sql: &str) -> i64 {
            sqlx::query_scalar::<_, i64>(sql)
                .fetch_one(&self.pool)
                .await
                .expect("count query")
        }

        pub async fn session_values(&self, field: TaxonomyField) -> Vec<String> {
            sqlx::query_scalar::<_, String>(&format!(
                "SELECT {column} FROM sessions ORDER BY id",
                column = field.session_column()
            ))
            .fetch_all(&self.pool)
            .await
            .expect("session values")
        }

        pub async fn technology_category(&self, name: &str) -> Option<String> {
            db::get_technology_by_name(&self.pool, name)
                .await
                .expect("technology lookup")
                .map(|t| t.category)
        }
    }
}
