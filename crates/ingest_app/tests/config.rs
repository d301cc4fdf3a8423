use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use ingest_app::config::{
    AppConfig, ConfigError, TelegramTarget, DEFAULT_MAX_OFFSET, SOCRATA_TOKEN_VAR,
    TELEGRAM_CHAT_VAR, TELEGRAM_TOKEN_VAR,
};
use ingest_core::NotificationEvent;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn defaults_apply_without_a_file() {
    let config = AppConfig::load(None).unwrap();

    assert_eq!(config.socrata.base_url, "https://data.cityofnewyork.us/resource/");
    assert_eq!(config.socrata.page_limit, 10_000);
    assert_eq!(config.socrata.start_offset, 0);
    assert_eq!(config.socrata.max_offset, DEFAULT_MAX_OFFSET);
    assert_eq!(config.telegram.api_base, "https://api.telegram.org");
    assert_eq!(config.display_options().parse_mode, "HTML");
}

#[test]
fn ron_file_overrides_selected_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ingest.ron");
    fs::write(
        &path,
        r#"(
            pipeline_name: "nyc_weekly",
            socrata: (page_limit: 500, application_token: Some("from-file")),
            telegram: (chat_id: Some("-1001"), disable_notification: false),
            window: (start_date: Some("2024-07-01"), span_days: 7),
        )"#,
    )
    .unwrap();

    let config = AppConfig::load(Some(&path)).unwrap();

    assert_eq!(config.pipeline_name, "nyc_weekly");
    assert_eq!(config.app_name, "Open Data Projects");
    assert_eq!(config.socrata.page_limit, 500);
    assert_eq!(config.socrata.max_offset, DEFAULT_MAX_OFFSET);
    assert_eq!(config.socrata_token().unwrap(), "from-file");
    assert!(!config.display_options().disable_notification);

    let window = config
        .date_window(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap())
        .unwrap();
    assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
    assert_eq!(window.stop, NaiveDate::from_ymd_opt(2024, 7, 8).unwrap());
}

#[test]
fn unreadable_and_malformed_files_are_errors() {
    let dir = TempDir::new().unwrap();
    let missing = AppConfig::load(Some(Path::new("/definitely/not/here.ron"))).unwrap_err();
    assert!(matches!(missing, ConfigError::Read { .. }));

    let path = dir.path().join("bad.ron");
    fs::write(&path, "(socrata: [").unwrap();
    let bad = AppConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(bad, ConfigError::Parse { .. }));
}

#[test]
fn environment_supplies_secrets_and_blank_values_are_ignored() {
    let mut config = AppConfig::default();
    config.socrata.application_token = Some("from-file".to_string());

    config.apply_env(env(&[
        (SOCRATA_TOKEN_VAR, "  "),
        (TELEGRAM_TOKEN_VAR, "123:abc"),
        (TELEGRAM_CHAT_VAR, "42"),
    ]));

    assert_eq!(config.socrata_token().unwrap(), "from-file");
    assert_eq!(
        config.telegram_target().unwrap(),
        TelegramTarget {
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
        }
    );
}

#[test]
fn missing_telegram_fields_are_reported_together_in_order() {
    let config = AppConfig::default();

    match config.telegram_target().unwrap_err() {
        ConfigError::Missing { spec_name, fields } => {
            assert_eq!(spec_name, "telegram");
            assert_eq!(fields, vec!["bot_token", "chat_id"]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn missing_socrata_token_maps_to_config_missing_event() {
    let err = AppConfig::default().socrata_token().unwrap_err();

    assert_eq!(
        err.to_event(),
        Some(NotificationEvent::ConfigMissing {
            spec_name: "socrata".to_string(),
            missing_fields: vec!["application_token".to_string()],
        })
    );
}

#[test]
fn invalid_window_date_is_rejected_without_an_event() {
    let mut config = AppConfig::default();
    config.window.stop_date = Some("08/09/2024".to_string());

    let err = config
        .date_window(NaiveDate::from_ymd_opt(2024, 8, 9).unwrap())
        .unwrap_err();

    assert!(matches!(err, ConfigError::InvalidDate { field: "window.stop_date", .. }));
    assert_eq!(err.to_event(), None);
}

#[test]
fn example_config_matches_the_defaults() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("ingest.example.ron");
    assert_eq!(AppConfig::load(Some(&path)).unwrap(), AppConfig::default());
}
