#[cfg(test)]
mod tests {
    use crate::config::{DEFAULT_DATABASE_URL, Profile, TrackerConfig, is_deleted_marker};
    use crate::error::AppError;
    use serial_test::serial;
    use std::time::Duration;

    const VARS: [&str; 7] = [
        "DATABASE_URL",
        "TRACKER_MAX_CONNECTIONS",
        "TRACKER_DASHBOARD_TTL_SECS",
        "TRACKER_QUERY_TTL_SECS",
        "TRACKER_UNCATEGORIZED_LABEL",
        "TRACKER_DELETED_PREFIX",
        "TRACKER_SEED_BLUEPRINT",
    ];

    fn with_env<R>(overrides: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let vars: Vec<(&str, Option<&str>)> = VARS
            .iter()
            .map(|name| {
                let value = overrides
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| *value);
                (*name, value)
            })
            .collect();
        temp_env::with_vars(vars, f)
    }

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        let config = with_env(&[], TrackerConfig::from_env).unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.dashboard_ttl, Duration::from_secs(30));
        assert_eq!(config.query_ttl, Duration::from_secs(60));
        assert!(config.seed_blueprint);
    }

    #[test]
    #[serial]
    fn test_overrides_are_trimmed_and_parsed() {
        let config = with_env(
            &[
                ("DATABASE_URL", "sqlite::memory:"),
                ("TRACKER_MAX_CONNECTIONS", " 2 "),
                ("TRACKER_DASHBOARD_TTL_SECS", "0"),
                ("TRACKER_UNCATEGORIZED_LABEL", "Misc"),
                ("TRACKER_DELETED_PREFIX", "[Removed]"),
                ("TRACKER_SEED_BLUEPRINT", "off"),
            ],
            TrackerConfig::from_env,
        )
        .unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.dashboard_ttl, Duration::ZERO);
        assert_eq!(config.query_ttl, Duration::from_secs(60));
        assert_eq!(config.uncategorized_label, "Misc");
        assert!(!config.seed_blueprint);
        assert_eq!(config.deleted_marker("Go"), "[Removed] Go");
    }

    #[test]
    #[serial]
    fn test_blank_values_fall_back_to_defaults() {
        let config = with_env(
            &[("TRACKER_UNCATEGORIZED_LABEL", "   "), ("DATABASE_URL", "")],
            TrackerConfig::from_env,
        )
        .unwrap();
        assert_eq!(config.uncategorized_label, "Uncategorized");
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
    }

    #[test]
    #[serial]
    fn test_invalid_values_are_config_errors() {
        for overrides in [
            [("TRACKER_QUERY_TTL_SECS", "soon")],
            [("TRACKER_MAX_CONNECTIONS", "-1")],
            [("TRACKER_MAX_CONNECTIONS", "0")],
            [("TRACKER_SEED_BLUEPRINT", "maybe")],
        ] {
            let result = with_env(&overrides, TrackerConfig::from_env);
            assert!(
                matches!(result, Err(AppError::Config(_))),
                "{:?} should be rejected",
                overrides
            );
        }
    }

    #[test]
    #[serial]
    fn test_profile_selects_env_files() {
        let profile = temp_env::with_var("TRACKER_PROFILE", None::<&str>, Profile::from_env);
        assert_eq!(profile, Profile::Development);
        assert_eq!(profile.env_files()[1], "config/dev.env");

        let profile = temp_env::with_var("TRACKER_PROFILE", Some("production"), Profile::from_env);
        assert_eq!(profile, Profile::Production);
        assert_eq!(
            profile.env_files(),
            ["config/common.env", "config/prod.env", ".secrets.env"]
        );
    }

    #[test]
    fn test_deleted_marker_shape() {
        assert!(is_deleted_marker("[Deleted]", "[Deleted] Go"));
        assert!(is_deleted_marker("[Deleted]", "[Deleted] Node.js 20"));
        assert!(!is_deleted_marker("[Deleted]", "[Deleted]Ghost"));
        assert!(!is_deleted_marker("[Deleted]", "[Deleted]"));
        assert!(!is_deleted_marker("[Deleted]", "[Deleted]   "));
        assert!(!is_deleted_marker("[Deleted]", "Go"));

        let config = TrackerConfig::default();
        assert!(config.is_deleted_marker(&config.deleted_marker("Go")));
    }
}
