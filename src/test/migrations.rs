#[cfg(test)]
mod tests {
    use crate::database::{
        CURRENT_SCHEMA, migrate_database_declaratively, normalize_sql, plan_migration,
    };
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Row, SqlitePool};

    const LEGACY_CATEGORIES: &str = r#"
        CREATE TABLE categories (
            id INTEGER PRIMARY KEY,
            category_name TEXT NOT NULL UNIQUE
        );
    "#;

    const CATEGORIES_WITH_FLAG: &str = r#"
        CREATE TABLE categories (
            id INTEGER PRIMARY KEY,
            category_name TEXT NOT NULL UNIQUE,
            is_custom BOOLEAN NOT NULL DEFAULT TRUE
        );
    "#;

    const REFORMATTED_CATEGORIES: &str = r#"
        -- same table, different layout
        CREATE TABLE "categories"(id INTEGER PRIMARY KEY,   category_name TEXT NOT NULL UNIQUE);
    "#;

    const LEGACY_SESSIONS: &str = r#"
        CREATE TABLE sessions (
            id INTEGER PRIMARY KEY,
            technology TEXT NOT NULL,
            duration_minutes INTEGER
        );
    "#;

    const SESSIONS_WITHOUT_DURATION: &str = r#"
        CREATE TABLE sessions (
            id INTEGER PRIMARY KEY,
            technology TEXT NOT NULL
        );
    "#;

    const TECHNOLOGIES_WITH_PLANS: &str = r#"
        CREATE TABLE technologies (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL
        );

        CREATE TABLE study_plans (
            id INTEGER PRIMARY KEY,
            technology TEXT NOT NULL
        );

        CREATE INDEX idx_technologies_category ON technologies (category);
    "#;

    const TECHNOLOGIES_ONLY: &str = r#"
        CREATE TABLE technologies (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL
        );
    "#;

    const TECHNOLOGIES_WIDER_INDEX: &str = r#"
        CREATE TABLE technologies (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL
        );

        CREATE TABLE study_plans (
            id INTEGER PRIMARY KEY,
            technology TEXT NOT NULL
        );

        CREATE INDEX idx_technologies_category ON technologies (category, name);
    "#;

    async fn create_test_db() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database")
    }

    async fn get_names(pool: &SqlitePool, kind: &str) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master
             WHERE type = ? AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .bind(kind)
        .fetch_all(pool)
        .await
        .expect("Failed to fetch schema names")
    }

    async fn get_columns(pool: &SqlitePool, table: &str) -> Vec<String> {
        sqlx::query(&format!("PRAGMA table_info({})", table))
            .fetch_all(pool)
            .await
            .expect("Failed to fetch columns")
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect()
    }

    #[tokio::test]
    async fn test_current_schema_applies_once() {
        let pool = create_test_db().await;

        let result = migrate_database_declaratively(&pool, CURRENT_SCHEMA, false).await;
        assert!(result.unwrap(), "Fresh database should report changes");

        assert_eq!(
            get_names(&pool, "table").await,
            vec!["categories", "option_values", "sessions", "technologies"]
        );
        assert_eq!(get_names(&pool, "index").await.len(), 5);

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, 1);

        // Re-running should be no-op
        let result = migrate_database_declaratively(&pool, CURRENT_SCHEMA, false).await;
        assert!(!result.unwrap(), "Re-running same migration should be no-op");
        assert!(plan_migration(&pool, CURRENT_SCHEMA).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_to_empty_no_changes() {
        let pool = create_test_db().await;

        let result = migrate_database_declaratively(&pool, "", false).await;
        assert!(!result.unwrap(), "Empty to empty should report no changes");
        assert!(get_names(&pool, "table").await.is_empty());
    }

    #[tokio::test]
    async fn test_cosmetic_differences_are_ignored() {
        let pool = create_test_db().await;
        sqlx::raw_sql(LEGACY_CATEGORIES).execute(&pool).await.unwrap();

        let plan = plan_migration(&pool, REFORMATTED_CATEGORIES).await.unwrap();
        assert!(plan.is_empty(), "{:?}", plan);
    }

    #[tokio::test]
    async fn test_added_column_preserves_rows() {
        let pool = create_test_db().await;
        sqlx::raw_sql(LEGACY_CATEGORIES).execute(&pool).await.unwrap();
        sqlx::query("INSERT INTO categories (category_name) VALUES (?)")
            .bind("Backend")
            .execute(&pool)
            .await
            .unwrap();

        let plan = plan_migration(&pool, CATEGORIES_WITH_FLAG).await.unwrap();
        assert_eq!(plan.rebuilt_tables, vec!["categories"]);
        assert!(plan.destructive_changes().is_empty());

        let result = migrate_database_declaratively(&pool, CATEGORIES_WITH_FLAG, false).await;
        assert!(result.unwrap(), "Adding a column should report changes");

        let row = sqlx::query("SELECT id, category_name, is_custom FROM categories")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("id"), 1);
        assert_eq!(row.get::<String, _>("category_name"), "Backend");
        assert!(row.get::<bool, _>("is_custom"));

        // Unique constraint survives the rebuild
        let duplicate = sqlx::query("INSERT INTO categories (category_name) VALUES ('Backend')")
            .execute(&pool)
            .await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_column_deletion_requires_permission() {
        let pool = create_test_db().await;
        sqlx::raw_sql(LEGACY_SESSIONS).execute(&pool).await.unwrap();
        sqlx::query("INSERT INTO sessions (technology, duration_minutes) VALUES ('Rust', 90)")
            .execute(&pool)
            .await
            .unwrap();

        let plan = plan_migration(&pool, SESSIONS_WITHOUT_DURATION).await.unwrap();
        assert_eq!(
            plan.destructive_changes(),
            vec!["drop column sessions.duration_minutes"]
        );

        let result = migrate_database_declaratively(&pool, SESSIONS_WITHOUT_DURATION, false).await;
        let error_msg = result.unwrap_err().to_string();
        assert!(
            error_msg.contains("duration_minutes"),
            "Error should mention the column being removed"
        );
        assert!(error_msg.contains("allow_deletions=false"));
        assert!(
            get_columns(&pool, "sessions")
                .await
                .contains(&"duration_minutes".to_string()),
            "Original column should still exist"
        );

        let result = migrate_database_declaratively(&pool, SESSIONS_WITHOUT_DURATION, true).await;
        assert!(result.unwrap(), "Should report changes made");
        assert_eq!(get_columns(&pool, "sessions").await, vec!["id", "technology"]);

        let technology: String = sqlx::query_scalar("SELECT technology FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(technology, "Rust");
    }

    #[tokio::test]
    async fn test_table_and_index_deletion_forbidden() {
        let pool = create_test_db().await;
        sqlx::raw_sql(TECHNOLOGIES_WITH_PLANS)
            .execute(&pool)
            .await
            .unwrap();

        let result = migrate_database_declaratively(&pool, TECHNOLOGIES_ONLY, false).await;
        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("drop table study_plans"));
        assert!(error_msg.contains("drop index idx_technologies_category"));

        assert_eq!(
            get_names(&pool, "table").await,
            vec!["study_plans", "technologies"]
        );
        assert_eq!(
            get_names(&pool, "index").await,
            vec!["idx_technologies_category"]
        );

        let result = migrate_database_declaratively(&pool, TECHNOLOGIES_ONLY, true).await;
        assert!(result.unwrap());
        assert_eq!(get_names(&pool, "table").await, vec!["technologies"]);
        assert!(get_names(&pool, "index").await.is_empty());
    }

    #[tokio::test]
    async fn test_changed_index_is_recreated() {
        let pool = create_test_db().await;
        sqlx::raw_sql(TECHNOLOGIES_WITH_PLANS)
            .execute(&pool)
            .await
            .unwrap();

        let plan = plan_migration(&pool, TECHNOLOGIES_WIDER_INDEX).await.unwrap();
        assert_eq!(plan.changed_indices, vec!["idx_technologies_category"]);
        assert!(plan.destructive_changes().is_empty());

        let result = migrate_database_declaratively(&pool, TECHNOLOGIES_WIDER_INDEX, false).await;
        assert!(result.unwrap());

        let sql: String = sqlx::query_scalar(
            "SELECT sql FROM sqlite_master WHERE name = 'idx_technologies_category'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(normalize_sql(&sql).ends_with("(category,name)"));
    }

    #[tokio::test]
    async fn test_invalid_target_schema_is_rejected() {
        let pool = create_test_db().await;

        let result = migrate_database_declaratively(&pool, "CREATE TABLE (", false).await;
        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("Failed to build target schema"));
    }

    #[test]
    fn test_normalize_sql_function() {
        assert_eq!(
            normalize_sql("CREATE TABLE test( -- comment\n  id INTEGER )"),
            "CREATE TABLE test(id INTEGER)"
        );

        assert_eq!(
            normalize_sql("CREATE TABLE \"quoted\" (id INTEGER , name TEXT)"),
            "CREATE TABLE quoted(id INTEGER,name TEXT)"
        );
    }
}
