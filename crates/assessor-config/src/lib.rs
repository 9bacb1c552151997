//! # assessor-config
//!
//! File-backed configuration for the assessment orchestrator.
//!
//! - [`TaskCatalog`] loads task families (instruction text, expected answer,
//!   scoring rule) from TOML and implements
//!   [`ReferenceSolutionProvider`](assessor_core::traits::ReferenceSolutionProvider).
//! - [`Settings`] holds timeouts, retry parameters and repository addresses,
//!   read from TOML with environment overrides on top.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use assessor_config::{Settings, TaskCatalog};
//!
//! let settings = Settings::load(Some(Path::new("config/assessor.toml")))?;
//! let catalog = TaskCatalog::from_file(Path::new("config/catalog.toml"))?;
//! let config = settings.orchestrator_config();
//! ```

pub mod catalog;
pub mod settings;

pub use catalog::{CatalogConfig, FamilyEntry, TaskCatalog};
pub use settings::Settings;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use serde_json::json;

    use assessor_contracts::{
        capability::Capability,
        error::{AssessorError, FailureKind},
    };
    use assessor_core::traits::ReferenceSolutionProvider;

    use crate::{settings::DEFAULT_FHIR_BASE_URL, Settings, TaskCatalog};

    const CATALOG: &str = r#"
        [[families]]
        id = "task1_1"
        prompt = "What's the MRN of the patient with name Peter Stafford and DOB of 1932-12-29?"
        expected = "S6534835"
        rule = "exact-match"

        [[families]]
        id = "task4_1"
        name = "Magnesium"
        expected = 2.3
        rule = "tolerance-numeric"
        params = { relative = 0.01 }
        pass_threshold = 0.5
    "#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    // ── Catalog ───────────────────────────────────────────────────────────────

    #[test]
    fn catalog_resolves_solutions_in_declaration_order() {
        let catalog = TaskCatalog::from_toml_str(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);

        let ids: Vec<&str> = catalog.entries().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["task1_1", "task4_1"]);

        let mg = catalog.lookup("task4_1").unwrap();
        assert_eq!(mg.rule, "tolerance-numeric");
        assert_eq!(mg.expected, json!(2.3));
        assert_eq!(mg.params, json!({ "relative": 0.01 }));
        assert_eq!(mg.pass_threshold, 0.5);

        // Defaults: no params, full-credit threshold.
        let mrn = catalog.lookup("task1_1").unwrap();
        assert!(mrn.params.is_null());
        assert_eq!(mrn.pass_threshold, 1.0);
    }

    #[test]
    fn catalog_display_names() {
        let catalog = TaskCatalog::from_toml_str(CATALOG).unwrap();
        assert_eq!(catalog.get("task1_1").unwrap().display_name(), "Patient Search");
        assert_eq!(catalog.get("task4_1").unwrap().display_name(), "Magnesium");
    }

    #[test]
    fn unknown_family_is_solution_missing() {
        let catalog = TaskCatalog::from_toml_str(CATALOG).unwrap();
        let err = catalog.lookup("task99_1").unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::SolutionMissing));
    }

    #[test]
    fn prompt_comes_from_catalog_when_declared() {
        let catalog = TaskCatalog::from_toml_str(CATALOG).unwrap();
        assert!(catalog.prompt_for("task1_1").unwrap().contains("Peter Stafford"));
        assert_eq!(catalog.prompt_for("task4_1"), None);
    }

    #[test]
    fn duplicate_family_is_rejected() {
        let toml = r#"
            [[families]]
            id = "task1_1"
            expected = "a"
            rule = "exact-match"

            [[families]]
            id = "task1_1"
            expected = "b"
            rule = "exact-match"
        "#;
        let err = TaskCatalog::from_toml_str(toml).unwrap_err();
        match err {
            AssessorError::ConfigError { reason } => {
                assert!(reason.contains("more than once"), "reason: {reason}")
            }
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let toml = r#"
            [[families]]
            id = "task2_1"
            expected = 60
            rule = "tolerance-numeric"
            pass_threshold = 1.5
        "#;
        assert!(matches!(
            TaskCatalog::from_toml_str(toml),
            Err(AssessorError::ConfigError { .. })
        ));
    }

    #[test]
    fn malformed_catalog_is_a_config_error() {
        let err = TaskCatalog::from_toml_str("[[families]]\nid = 3").unwrap_err();
        assert!(err.to_string().contains("failed to parse catalog TOML"));
    }

    #[test]
    fn unregistered_rule_is_reported() {
        let catalog = TaskCatalog::from_toml_str(CATALOG).unwrap();
        assert!(catalog.check_rules(|_| true).is_ok());

        let err = catalog.check_rules(|rule| rule == "exact-match").unwrap_err();
        assert!(err.to_string().contains("task4_1"), "got: {err}");
    }

    #[test]
    fn empty_catalog_is_valid() {
        let catalog = TaskCatalog::from_toml_str("").unwrap();
        assert!(catalog.is_empty());
    }

    // ── Settings ──────────────────────────────────────────────────────────────

    #[test]
    fn empty_settings_file_uses_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.fhir.base_url, DEFAULT_FHIR_BASE_URL);
        assert_eq!(settings.retry.max_attempts, 3);

        let config = settings.orchestrator_config();
        assert_eq!(config.task_deadline, Duration::from_secs(300));
        assert_eq!(config.response_timeout, Duration::from_secs(240));
        assert_eq!(config.interaction_limit, 8);
        assert!(config
            .required_operations
            .has(&Capability::new("message/send")));
        assert_eq!(config.fhir_callback_url.as_deref(), Some(DEFAULT_FHIR_BASE_URL));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [task]
            deadline_ms = 5000

            [retry]
            base_delay_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(settings.task.deadline_ms, 5000);
        assert_eq!(settings.task.interaction_limit, 8);
        assert_eq!(settings.retry_policy().base_delay, Duration::from_millis(50));
        assert_eq!(settings.retry_policy().max_attempts, 3);
    }

    #[test]
    fn environment_overrides_file_values() {
        let settings = Settings::from_toml_str(
            r#"
            [fhir]
            base_url = "http://file-host:8080/fhir"

            [task]
            deadline_ms = 5000
            "#,
        )
        .unwrap()
        .with_env(env(&[
            ("FHIR_BASE_URL", "http://env-host:9090/fhir"),
            ("FHIR_CALLBACK_HOST", "fhir-server"),
            ("ASSESSOR_TASK_DEADLINE_MS", "7000"),
            ("SKIP_FHIR_CHECK", "1"),
        ]))
        .unwrap();

        assert_eq!(settings.fhir.base_url, "http://env-host:9090/fhir");
        assert_eq!(settings.fhir_callback_url(), "http://fhir-server:8080/fhir");
        assert_eq!(settings.task.deadline_ms, 7000);
        assert!(settings.fhir.skip_ready_check);
    }

    #[test]
    fn server_url_variable_gains_fhir_suffix() {
        let settings = Settings::default()
            .with_env(env(&[("FHIR_SERVER_URL", "http://fhir:8080/")]))
            .unwrap();
        assert_eq!(settings.fhir.base_url, "http://fhir:8080/fhir");
    }

    #[test]
    fn unparsable_environment_value_is_a_config_error() {
        let err = Settings::default()
            .with_env(env(&[("ASSESSOR_RESPONSE_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("ASSESSOR_RESPONSE_TIMEOUT_MS"));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = Settings::from_toml_str("[retry]\nmax_attempts = 0").unwrap_err();
        assert!(matches!(err, AssessorError::ConfigError { .. }));
    }

    #[test]
    fn non_finite_multiplier_is_rejected() {
        for raw in ["inf", "nan", "0.5"] {
            let err = Settings::from_toml_str(&format!("[retry]\nmultiplier = {raw}")).unwrap_err();
            assert!(err.to_string().contains("retry.multiplier"), "{raw}: {err}");
        }
    }

    #[test]
    fn long_retry_budget_keeps_delays_capped() {
        let settings =
            Settings::from_toml_str("[retry]\nmax_attempts = 100\nmultiplier = 1e300").unwrap();
        let policy = settings.retry_policy();
        assert_eq!(policy.next_delay(100), Duration::from_millis(settings.retry.max_delay_ms));
    }
}
