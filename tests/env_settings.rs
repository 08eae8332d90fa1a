use method_metrics::MetricsSettings;

const VARS: [(&str, &str); 3] = [
    ("METHOD_METRICS_PREFIX", "svc"),
    ("METHOD_METRICS_ENABLED", "false"),
    ("METHOD_METRICS_PERCENTILES", "0.5,invalid,0.95"),
];

// Only test in this binary, so nothing else reads the environment meanwhile
#[test]
fn environment_overrides_defaults() {
    for (name, value) in VARS {
        std::env::set_var(name, value);
    }

    let loaded = MetricsSettings::load();

    for (name, _) in VARS {
        std::env::remove_var(name);
    }

    let settings = loaded.unwrap();
    assert!(!settings.enabled);
    assert_eq!(settings.prefix, "svc");
    assert!(settings.histogram);
    assert_eq!(settings.percentiles, vec![0.5, 0.95, 0.99]);

    let settings = MetricsSettings::load().unwrap();
    assert_eq!(settings, MetricsSettings::default());
}
