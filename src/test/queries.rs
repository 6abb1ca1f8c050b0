#[cfg(test)]
mod tests {
    use crate::cache::CacheKey;
    use crate::models::TechnologyUpdate;
    use crate::queries::GENERAL_PRACTICE;
    use crate::test::utils::test_db::{TestDbBuilder, session};

    #[tokio::test]
    async fn test_postgresql_progress_scenario() {
        let db = TestDbBuilder::new().build().await.unwrap();
        let sync = db.tracker.sync();

        assert!(sync.add_category("Backend", true).await.unwrap().is_applied());
        assert!(
            sync.add_technology("PostgreSQL", "Backend", 40.0, crate::test::utils::test_db::day(1))
                .await
                .unwrap()
                .is_applied()
        );
        assert!(
            sync.add_session(session(2, "Backend", "PostgreSQL", 5.0))
                .await
                .unwrap()
                .is_applied()
        );

        let usage = db.tracker.get_tech_stack_with_usage().await.unwrap();
        assert_eq!(usage.len(), 1);
        let postgres = &usage[0];
        assert_eq!(postgres.name, "PostgreSQL");
        assert_eq!(postgres.logged_hours, 5.0);
        assert_eq!(postgres.session_count, 1);
        assert_eq!(postgres.progress_pct, 12.5);
    }

    #[tokio::test]
    async fn test_unused_technology_has_zero_usage() {
        let db = TestDbBuilder::new()
            .category("Backend")
            .technology("Go", "Backend", 50.0)
            .technology("Unplanned", "Backend", 0.0)
            .build()
            .await
            .unwrap();

        let usage = db.tracker.get_tech_stack_with_usage().await.unwrap();
        assert_eq!(usage.len(), 2);
        for tech in usage {
            assert_eq!(tech.logged_hours, 0.0);
            assert_eq!(tech.session_count, 0);
            assert_eq!(tech.progress_pct, 0.0);
        }
    }

    #[tokio::test]
    async fn test_dashboard_reflects_every_write() {
        let db = TestDbBuilder::new()
            .category("Backend")
            .technology("Rust", "Backend", 100.0)
            .session(session(2, "Backend", "Rust", 2.0))
            .build()
            .await
            .unwrap();

        let before = db.tracker.get_dashboard_metrics().await.unwrap();
        assert_eq!(before.total_sessions, 1);
        assert_eq!(before.total_hours, 2.0);
        assert_eq!(before.overall_progress, 2.0);
        assert!(db.tracker.cache().contains(&CacheKey::DashboardMetrics));

        db.tracker
            .sync()
            .add_session(session(3, "Backend", "Rust", 3.0))
            .await
            .unwrap();
        assert!(!db.tracker.cache().contains(&CacheKey::DashboardMetrics));

        let after = db.tracker.get_dashboard_metrics().await.unwrap();
        assert_eq!(after.total_sessions, 2);
        assert_eq!(after.total_hours, 5.0);
        assert_eq!(after.overall_progress, 5.0);

        db.tracker
            .sync()
            .update_technology(
                db.technology_id("Rust"),
                TechnologyUpdate {
                    goal_hours: Some(30.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let regoaled = db.tracker.get_dashboard_metrics().await.unwrap();
        assert_eq!(regoaled.total_goal_hours, 30.0);
        assert_eq!(regoaled.overall_progress, 16.7);
    }

    #[tokio::test]
    async fn test_refused_write_keeps_cache() {
        let db = TestDbBuilder::new().category("Backend").build().await.unwrap();

        db.tracker.get_dashboard_metrics().await.unwrap();
        db.tracker.sync().add_category("Backend", true).await.unwrap();

        assert!(db.tracker.cache().contains(&CacheKey::DashboardMetrics));
    }

    #[tokio::test]
    async fn test_category_usage_and_session_counts() {
        let db = TestDbBuilder::new()
            .category("Backend")
            .category("Web")
            .category("Unused")
            .technology("Rust", "Backend", 100.0)
            .technology("Go", "Backend", 50.0)
            .technology("React", "Web", 80.0)
            .session(session(2, "Backend", "Rust", 1.0))
            .session(session(3, "Backend", "Rust", 1.0))
            .session(session(4, "Web", "React", 1.0))
            .build()
            .await
            .unwrap();

        let usage = db.tracker.get_category_usage().await.unwrap();
        assert_eq!(usage["Backend"].tech_count, 2);
        assert_eq!(usage["Backend"].session_count, 2);
        assert_eq!(usage["Web"].tech_count, 1);
        assert_eq!(usage["Unused"].session_count, 0);

        let counts = db.tracker.get_technology_session_counts().await.unwrap();
        assert_eq!(counts.get("Rust"), Some(&2));
        assert_eq!(counts.get("React"), Some(&1));
        assert_eq!(counts.get("Go"), None);
    }

    #[tokio::test]
    async fn test_analytics_breakdowns() {
        let db = TestDbBuilder::new()
            .category("Backend")
            .category("Web")
            .technology("Rust", "Backend", 100.0)
            .technology("Go", "Backend", 50.0)
            .technology("React", "Web", 80.0)
            .session(session(2, "Backend", "Rust", 3.0).work_item("CLI"))
            .session(session(3, "Backend", "Rust", 1.0))
            .session(session(4, "Backend", "Go", 0.5))
            .session(session(5, "Web", "React", 2.0))
            .build()
            .await
            .unwrap();

        let categories = db.tracker.get_category_analytics().await.unwrap();
        assert_eq!(categories[0].category, "Backend");
        assert_eq!(categories[0].total_hours, 4.5);
        assert_eq!(categories[0].total_sessions, 3);
        assert_eq!(categories[0].technologies[0].name, "Rust");
        assert_eq!(categories[1].category, "Web");

        let technologies = db.tracker.get_technology_analytics().await.unwrap();
        let rust = technologies
            .iter()
            .find(|t| t.technology == "Rust")
            .unwrap();
        assert_eq!(rust.category, "Backend");
        assert_eq!(rust.total_hours, 4.0);
        let names: Vec<&str> = rust.work_items.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["CLI", GENERAL_PRACTICE]);
    }

    #[tokio::test]
    async fn test_all_option_values_and_paged_sessions() {
        let db = TestDbBuilder::new()
            .category("Backend")
            .technology("Rust", "Backend", 100.0)
            .session(session(2, "Backend", "Rust", 1.0).work_item("CLI"))
            .session(session(3, "Backend", "Rust", 1.0).work_item("Async"))
            .session(session(4, "Backend", "Rust", 1.0))
            .build()
            .await
            .unwrap();

        let options = db.tracker.get_all_option_values().await.unwrap();
        assert_eq!(options["category_name"], vec!["Backend"]);
        assert_eq!(options["technology"], vec!["Rust"]);
        assert_eq!(options["work_item"], vec!["Async", "CLI"]);
        assert!(options["skill_topic"].is_empty());

        let first_page = db.tracker.get_sessions(2, 0).await.unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].session_date, crate::test::utils::test_db::day(4));

        let second_page = db.tracker.get_sessions(2, 2).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].work_item, "CLI");
    }
}
