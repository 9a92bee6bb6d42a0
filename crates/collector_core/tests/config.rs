use std::time::Duration;

use collector_core::{ConfigError, EmptyPagePolicy, PageIndex, RunConfig};

#[test]
fn zero_pages_fail_fast() {
    let config = RunConfig::with_total_pages(0);
    assert_eq!(config.validate(), Err(ConfigError::NoPages));
    assert_eq!(config.planned_pages(), Err(ConfigError::NoPages));
}

#[test]
fn zero_attempts_and_intervals_are_rejected() {
    let config = RunConfig {
        max_attempts_per_page: 0,
        ..RunConfig::default()
    };
    assert_eq!(config.validate(), Err(ConfigError::NoAttempts));

    let config = RunConfig {
        checkpoint_interval: 0,
        ..RunConfig::default()
    };
    assert_eq!(config.validate(), Err(ConfigError::ZeroCheckpointInterval));

    let config = RunConfig {
        concurrency: 0,
        ..RunConfig::default()
    };
    assert_eq!(config.validate(), Err(ConfigError::ZeroConcurrency));
}

#[test]
fn resume_from_a_later_start_page() {
    let config = RunConfig {
        total_pages: 37,
        start_page: 16,
        ..RunConfig::default()
    };
    let pages = config.planned_pages().unwrap();
    assert_eq!(pages.len(), 22);
    assert_eq!(pages.first().copied(), PageIndex::new(16));
    assert_eq!(pages.last().copied(), PageIndex::new(37));

    let config = RunConfig {
        total_pages: 3,
        start_page: 4,
        ..RunConfig::default()
    };
    assert_eq!(
        config.validate(),
        Err(ConfigError::StartPageOutOfRange { start: 4, total: 3 })
    );
}

#[test]
fn explicit_page_list_is_sorted_and_checked() {
    let config = RunConfig {
        only_pages: Some(vec![9, 2, 5]),
        ..RunConfig::default()
    };
    let pages: Vec<u32> = config
        .planned_pages()
        .unwrap()
        .into_iter()
        .map(PageIndex::get)
        .collect();
    assert_eq!(pages, vec![2, 5, 9]);

    let config = RunConfig {
        only_pages: Some(vec![2, 2]),
        ..RunConfig::default()
    };
    assert_eq!(config.validate(), Err(ConfigError::DuplicatePage(2)));

    let config = RunConfig {
        only_pages: Some(vec![0]),
        ..RunConfig::default()
    };
    assert_eq!(config.validate(), Err(ConfigError::ZeroPageIndex));

    let config = RunConfig {
        total_pages: 10,
        only_pages: Some(vec![3, 50]),
        ..RunConfig::default()
    };
    assert_eq!(
        config.validate(),
        Err(ConfigError::PageOutOfRange { page: 50, total: 10 })
    );
    assert!(config.planned_pages().is_err());
}

#[test]
fn durations_serialize_as_seconds_and_missing_fields_default() {
    let config: RunConfig = serde_json::from_str(
        r#"{"total_pages": 4, "retry_delay": 0.5, "run_timeout": 90, "empty_page_policy": "retry_then_fail"}"#,
    )
    .unwrap();
    assert_eq!(config.total_pages, 4);
    assert_eq!(config.retry_delay, Duration::from_millis(500));
    assert_eq!(config.run_timeout, Some(Duration::from_secs(90)));
    assert_eq!(config.empty_page_policy, EmptyPagePolicy::RetryThenFail);
    assert_eq!(config.inter_page_delay, Duration::from_secs(2));

    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["retry_delay"], serde_json::json!(0.5));
}
