//! 配置解析测试

use flare_discovery_consul::discovery::config::{
    ACL_TOKEN_KEY, CHECK_PASS_INTERVAL_KEY, QUERY_TAG_KEY, TAGS_KEY, WATCH_TIMEOUT_KEY,
};
use flare_discovery_consul::{Config, ConsulDiscoveryConfig, DiscoveryError, RegistryUrl};
use std::time::Duration;

fn is_config_error(err: &DiscoveryError) -> bool {
    matches!(err, DiscoveryError::Config(_))
}

#[test]
fn parse_registry_url() {
    let url = RegistryUrl::parse(
        "consul://127.0.0.1:8500?consul-check-pass-interval=8000&acl-token=secret",
    )
    .unwrap();
    assert_eq!(url.protocol, "consul");
    assert_eq!(url.location, "127.0.0.1:8500");
    assert_eq!(url.param(CHECK_PASS_INTERVAL_KEY, ""), "8000");
    assert_eq!(url.param(ACL_TOKEN_KEY, ""), "secret");
    assert_eq!(url.param("missing", "fallback"), "fallback");
}

#[test]
fn parse_rejects_garbage() {
    let err = RegistryUrl::parse("not a url").unwrap_err();
    assert!(is_config_error(&err));
}

#[test]
fn defaults_apply() {
    let url = RegistryUrl::new("consul", "127.0.0.1:8500");
    let config = ConsulDiscoveryConfig::from_url(&url, None).unwrap();

    assert_eq!(config.address, "127.0.0.1:8500");
    assert_eq!(config.acl_token, None);
    assert_eq!(config.check_pass_interval, Duration::from_millis(16_000));
    assert_eq!(config.heartbeat_period(), Duration::from_secs(2));
    assert_eq!(config.watch_timeout, Duration::from_secs(60));
    assert_eq!(config.query_tag, None);
    assert!(config.tags.is_empty());
}

#[test]
fn remote_address_takes_precedence() {
    let url = RegistryUrl::new("consul", "127.0.0.1:8500").with_param("address", "10.0.0.2:8500");
    let config = ConsulDiscoveryConfig::from_url(&url, Some("10.0.0.9:8500")).unwrap();
    assert_eq!(config.address, "10.0.0.9:8500");

    let config = ConsulDiscoveryConfig::from_url(&url, None).unwrap();
    assert_eq!(config.address, "10.0.0.2:8500");
}

#[test]
fn missing_address_is_config_error() {
    let url = RegistryUrl::new("consul", "");
    let err = ConsulDiscoveryConfig::from_url(&url, Some("")).unwrap_err();
    assert!(is_config_error(&err));
}

#[test]
fn non_integer_interval_is_config_error() {
    let url = RegistryUrl::new("consul", "127.0.0.1:8500").with_param(CHECK_PASS_INTERVAL_KEY, "16s");
    let err = ConsulDiscoveryConfig::from_url(&url, None).unwrap_err();
    assert!(is_config_error(&err), "{err}");

    let url = RegistryUrl::new("consul", "127.0.0.1:8500").with_param(WATCH_TIMEOUT_KEY, "soon");
    assert!(ConsulDiscoveryConfig::from_url(&url, None).is_err());
}

#[test]
fn interval_below_one_second_is_config_error() {
    let url = RegistryUrl::new("consul", "127.0.0.1:8500").with_param(CHECK_PASS_INTERVAL_KEY, "999");
    let err = ConsulDiscoveryConfig::from_url(&url, None).unwrap_err();
    assert!(is_config_error(&err));

    let url = RegistryUrl::new("consul", "127.0.0.1:8500").with_param(CHECK_PASS_INTERVAL_KEY, "1000");
    let config = ConsulDiscoveryConfig::from_url(&url, None).unwrap();
    assert_eq!(config.heartbeat_period(), Duration::from_millis(125));
}

#[test]
fn optional_params() {
    let url = RegistryUrl::new("consul", "127.0.0.1:8500")
        .with_param(ACL_TOKEN_KEY, "token-1")
        .with_param(QUERY_TAG_KEY, "blue")
        .with_param(TAGS_KEY, "dubbo, blue,,v2 ")
        .with_param(WATCH_TIMEOUT_KEY, "1500");
    let config = ConsulDiscoveryConfig::from_url(&url, None).unwrap();

    assert_eq!(config.acl_token.as_deref(), Some("token-1"));
    assert_eq!(config.query_tag.as_deref(), Some("blue"));
    assert_eq!(config.tags, vec!["dubbo", "blue", "v2"]);
    assert_eq!(config.watch_timeout, Duration::from_millis(1500));
}

#[test]
fn app_config_from_toml() {
    let config = Config::from_toml_str(
        r#"
        [service_discovery.default]
        remote_ref = "consul-local"

        [remotes.consul-local]
        address = "127.0.0.1:8500"
        params = { "consul-check-pass-interval" = "8000", "tags" = "dubbo" }
        "#,
    )
    .unwrap();

    let sdc = &config.service_discovery["default"];
    assert_eq!(sdc.protocol, "consul");
    assert_eq!(sdc.remote_ref, "consul-local");

    let url = config.remotes["consul-local"].registry_url();
    assert_eq!(url.protocol, "consul");
    assert_eq!(url.location, "127.0.0.1:8500");

    let consul = ConsulDiscoveryConfig::from_url(&url, None).unwrap();
    assert_eq!(consul.check_pass_interval, Duration::from_secs(8));
    assert_eq!(consul.tags, vec!["dubbo"]);
}

#[test]
fn app_config_rejects_invalid_toml() {
    let err = Config::from_toml_str("[remotes.x]\nparams = 3").unwrap_err();
    assert!(is_config_error(&err));

    let err = Config::load_from_file("/definitely/not/here.toml").unwrap_err();
    assert!(is_config_error(&err));
}
