use pricefeed_types::{AppConfig, ConfigError, ProxySetting, SourceConfig, SourceName};

#[test]
fn minimal_yaml_round_trip() {
    let yaml = r#"
environment: development
sources:
  binance:
    enabled: true
    rps: 100
    ttl_ms: 10000
  kraken:
    enabled: true
    refetch: true
"#;
    let cfg: AppConfig = serde_yaml::from_str(yaml).unwrap();
    let sources = cfg.resolve_sources().unwrap();
    let binance = &sources[&SourceName::Binance];
    assert!(binance.enabled);
    assert_eq!(binance.rps, Some(100.0));
    assert_eq!(binance.ttl_ms, 10_000);
    assert!(sources[&SourceName::Kraken].refetch);
    assert_eq!(cfg.request_timeout(), std::time::Duration::from_secs(10));
}

#[test]
fn unknown_source_is_a_startup_error() {
    let yaml = r#"
sources:
  binanec:
    enabled: true
"#;
    let cfg: AppConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(
        cfg.resolve_sources(),
        Err(ConfigError::UnknownSource {
            name: "binanec".to_owned()
        })
    );
}

#[test]
fn out_of_range_fields_are_rejected() {
    let mut cfg = SourceConfig {
        ttl_ms: 500,
        ..SourceConfig::default()
    };
    assert!(matches!(
        cfg.validate(SourceName::Binance),
        Err(ConfigError::InvalidField { field: "ttl_ms", .. })
    ));

    cfg.ttl_ms = 10_000;
    cfg.max_retries = 11;
    assert!(matches!(
        cfg.validate(SourceName::Binance),
        Err(ConfigError::InvalidField {
            field: "max_retries",
            ..
        })
    ));
}

#[test]
fn use_proxy_accepts_bool_or_url() {
    let from_bool: SourceConfig = serde_yaml::from_str("use_proxy: true").unwrap();
    assert_eq!(from_bool.use_proxy, ProxySetting::Env(true));
    assert!(from_bool.use_proxy.is_enabled());

    let from_url: SourceConfig =
        serde_yaml::from_str("use_proxy: http://proxy.internal:8080").unwrap();
    assert_eq!(
        from_url.use_proxy,
        ProxySetting::Url("http://proxy.internal:8080".to_owned())
    );

    let off = SourceConfig::default();
    assert!(!off.use_proxy.is_enabled());
}

#[test]
fn stream_options_default_sensibly() {
    let cfg: SourceConfig = serde_yaml::from_str("stream: {}").unwrap();
    let stream = cfg.stream.unwrap();
    assert!(stream.auto_reconnect);
    assert_eq!(stream.reconnect_interval_ms, 5_000);
    assert_eq!(stream.max_reconnect_attempts, 10);
    assert!(stream.batch_size.is_none());
}
