#[cfg(test)]
mod tests {
    use crate::bootstrap::{BlueprintCategory, PLANNING_BLUEPRINT, seed};
    use crate::db;
    use crate::taxonomy::TaxonomyField;
    use crate::test::utils::test_db::TestDbBuilder;

    #[test]
    fn test_goal_is_midpoint_of_range() {
        let postgres = PLANNING_BLUEPRINT[0]
            .tools
            .iter()
            .find(|t| t.name == "PostgreSQL")
            .unwrap();
        assert_eq!(postgres.goal_hours(), 45.0);
    }

    #[tokio::test]
    async fn test_seed_blueprint_is_idempotent() {
        let db = TestDbBuilder::new().build().await.unwrap();

        let planned: usize = PLANNING_BLUEPRINT.iter().map(|c| c.tools.len()).sum();
        assert_eq!(planned, 38);

        let first = db.tracker.seed_blueprint().await.unwrap();
        assert_eq!(first.categories_added, 7);
        assert_eq!(first.categories_skipped, 0);
        assert_eq!(first.technologies_added, 37);
        // PostgreSQL is planned twice
        assert_eq!(first.technologies_skipped, 1);

        let second = db.tracker.seed_blueprint().await.unwrap();
        assert_eq!(second.categories_added, 0);
        assert_eq!(second.categories_skipped, 7);
        assert_eq!(second.technologies_added, 0);
        assert_eq!(second.technologies_skipped, 38);

        assert_eq!(db.count("SELECT COUNT(*) FROM technologies").await, 37);
        assert!(db.tracker.get_custom_categories().await.unwrap().is_empty());

        let postgres = db::get_technology_by_name(&db.pool, "PostgreSQL")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(postgres.category, "Core Full-Stack Development");
        assert_eq!(postgres.goal_hours, 45.0);

        let report = db.tracker.audit_consistency().await.unwrap();
        assert!(report.is_consistent(), "{:?}", report.issues);
    }

    #[tokio::test]
    async fn test_seed_keeps_user_data() {
        let db = TestDbBuilder::new()
            .category("Reliability & Security")
            .technology("pytest (testing)", "Reliability & Security", 10.0)
            .build()
            .await
            .unwrap();

        let blueprint = &PLANNING_BLUEPRINT[4..5];
        let summary = seed(db.tracker.sync(), blueprint).await.unwrap();
        assert_eq!(summary.categories_skipped, 1);
        assert_eq!(summary.technologies_added, 1);
        assert_eq!(summary.technologies_skipped, 1);

        let pytest = db::get_technology_by_name(&db.pool, "pytest (testing)")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pytest.goal_hours, 10.0);

        let techs = db
            .tracker
            .resolve_options(TaxonomyField::Technology, Some("Reliability & Security"))
            .await
            .unwrap();
        assert_eq!(
            techs.values(),
            ["OAuth 2.0 + Web App Security", "pytest (testing)"]
        );
    }

    #[tokio::test]
    async fn test_empty_blueprint_seeds_nothing() {
        let db = TestDbBuilder::new().build().await.unwrap();
        let blueprint: &[BlueprintCategory] = &[];

        let summary = seed(db.tracker.sync(), blueprint).await.unwrap();
        assert_eq!(summary, Default::default());
    }
}
