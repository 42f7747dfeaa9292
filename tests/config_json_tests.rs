use telemetry_dash::core::CollectionKind;
use telemetry_dash::reconcile::{EditReconciler, RowPairing, default_editable_columns};
use telemetry_dash::store::MemoryStore;
use telemetry_dash::{DashError, Dashboard, DashboardConfig};

#[test]
fn default_config_is_valid() {
    let config = DashboardConfig::default();

    config.validate().expect("default config");
    assert_eq!(config.key_column, "start_at");
    assert_eq!(config.row_pairing, RowPairing::ByKey);
    assert_eq!(config.time_window.mark_target_count, 12);
    assert_eq!(
        config.editable_columns.get(&CollectionKind::Chargings),
        Some(&vec!["price".to_owned()])
    );
}

#[test]
fn config_json_round_trip() {
    let config = DashboardConfig::default()
        .with_mark_target_count(6)
        .with_row_pairing(RowPairing::ByPosition)
        .with_editable_columns(CollectionKind::Trips, &["comment"])
        .with_default_charging_price(0.5);

    let json = config.to_json_pretty().expect("serialize");
    let restored = DashboardConfig::from_json_str(&json).expect("parse");

    assert_eq!(restored, config);
}

#[test]
fn partial_json_fills_defaults() {
    let config = DashboardConfig::from_json_str(
        r#"{ "row_pairing": "by_position", "default_charging_price": 0.3 }"#,
    )
    .expect("parse");

    assert_eq!(config.row_pairing, RowPairing::ByPosition);
    assert_eq!(config.default_charging_price, Some(0.3));
    assert_eq!(config.key_column, "start_at");
    assert!(config.derive_altitude_diff);
}

#[test]
fn invalid_configs_are_rejected() {
    let cases = [
        r#"{ "key_column": "  " }"#,
        r#"{ "default_charging_price": -1.0 }"#,
        r#"{ "editable_columns": { "chargings": ["start_at"] } }"#,
        r#"{ "time_window": { "mark_target_count": 0, "min_step_millis": 1.0 } }"#,
        r#"{ "time_window": { "mark_target_count": 1000000000 } }"#,
        r#"{ "row_pairing": "sideways" }"#,
    ];

    for input in cases {
        let err = DashboardConfig::from_json_str(input).expect_err(input);
        assert!(matches!(err, DashError::InvalidConfig(_)), "{input}");
    }
}

#[test]
fn dashboard_refuses_invalid_config() {
    let config = DashboardConfig::default()
        .with_editable_columns(CollectionKind::Chargings, &["price", "start_at"]);

    let result = Dashboard::new(MemoryStore::new(), config);
    assert!(matches!(result, Err(DashError::InvalidConfig(_))));
}

#[test]
fn nested_tuning_accepts_partial_objects() {
    let config = DashboardConfig::from_json_str(r#"{ "time_window": { "mark_target_count": 6 } }"#)
        .expect("parse");

    assert_eq!(config.time_window.mark_target_count, 6);
    assert_eq!(config.time_window.min_step_millis, 1.0);
}

#[test]
fn dashboard_and_reconciler_share_editable_defaults() {
    let config = DashboardConfig::default();

    assert_eq!(config.editable_columns, default_editable_columns());
    assert!(EditReconciler::default().is_editable(CollectionKind::Chargings, "price"));
}
