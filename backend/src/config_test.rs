use super::*;

// =============================================================================
// from_env: env manipulation requires unsafe in edition 2024. Every test that
// touches the environment holds the crate-wide env lock.
// =============================================================================

const VARS: &[&str] = &[
    "BACKEND_URL",
    "BACKEND_ANON_KEY",
    "OAUTH_PROVIDER",
    "OAUTH_REDIRECT_TO",
    "BOOKMARKS_TABLE",
    "BACKEND_SCHEMA",
    "BACKEND_REQUEST_TIMEOUT_SECS",
    "BACKEND_CONNECT_TIMEOUT_SECS",
    "REALTIME_HEARTBEAT_SECS",
];

fn clear_env() {
    for var in VARS {
        unsafe { std::env::remove_var(var) };
    }
}

fn set(key: &str, value: &str) {
    unsafe { std::env::set_var(key, value) };
}

#[test]
fn from_env_requires_url() {
    let _guard = crate::test_env_lock();
    clear_env();
    set("BACKEND_ANON_KEY", "anon");
    let err = BackendConfig::from_env().expect_err("missing url");
    assert!(matches!(err, BackendError::MissingConfig { ref var } if var == "BACKEND_URL"));
    clear_env();
}

#[test]
fn from_env_requires_anon_key() {
    let _guard = crate::test_env_lock();
    clear_env();
    set("BACKEND_URL", "https://proj.example.co");
    let err = BackendConfig::from_env().expect_err("missing key");
    assert!(matches!(err, BackendError::MissingConfig { ref var } if var == "BACKEND_ANON_KEY"));
    clear_env();
}

#[test]
fn from_env_treats_blank_as_missing() {
    let _guard = crate::test_env_lock();
    clear_env();
    set("BACKEND_URL", "   ");
    set("BACKEND_ANON_KEY", "anon");
    assert!(BackendConfig::from_env().is_err());
    clear_env();
}

#[test]
fn from_env_applies_defaults() {
    let _guard = crate::test_env_lock();
    clear_env();
    set("BACKEND_URL", "https://proj.example.co/");
    set("BACKEND_ANON_KEY", "anon");
    let config = BackendConfig::from_env().expect("config");
    assert_eq!(config.url, "https://proj.example.co");
    assert_eq!(config.oauth_provider, DEFAULT_OAUTH_PROVIDER);
    assert_eq!(config.table, DEFAULT_BOOKMARKS_TABLE);
    assert_eq!(config.schema, DEFAULT_SCHEMA);
    assert!(config.redirect_to.is_none());
    assert_eq!(config.timeouts.request_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    assert_eq!(config.timeouts.connect_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
    assert_eq!(config.heartbeat_secs, DEFAULT_HEARTBEAT_SECS);
    clear_env();
}

#[test]
fn from_env_reads_overrides() {
    let _guard = crate::test_env_lock();
    clear_env();
    set("BACKEND_URL", "http://localhost:54321");
    set("BACKEND_ANON_KEY", "anon");
    set("OAUTH_PROVIDER", "github");
    set("OAUTH_REDIRECT_TO", "http://localhost:3000/dashboard");
    set("BOOKMARKS_TABLE", "marks");
    set("BACKEND_SCHEMA", "app");
    set("BACKEND_REQUEST_TIMEOUT_SECS", "5");
    set("REALTIME_HEARTBEAT_SECS", "not-a-number");
    let config = BackendConfig::from_env().expect("config");
    assert_eq!(config.oauth_provider, "github");
    assert_eq!(config.redirect_to.as_deref(), Some("http://localhost:3000/dashboard"));
    assert_eq!(config.table, "marks");
    assert_eq!(config.schema, "app");
    assert_eq!(config.timeouts.request_secs, 5);
    assert_eq!(config.heartbeat_secs, DEFAULT_HEARTBEAT_SECS);
    clear_env();
}

#[test]
fn from_parts_rejects_non_http_url() {
    let err = BackendConfig::from_parts("ftp://x", "anon").expect_err("scheme");
    assert!(matches!(err, BackendError::ConfigParse(_)));
}

// =============================================================================
// Derived URLs
// =============================================================================

#[test]
fn auth_url_joins_path() {
    let config = BackendConfig::new("https://proj.example.co", "anon");
    assert_eq!(config.auth_url("user"), "https://proj.example.co/auth/v1/user");
    assert_eq!(config.auth_url("/logout"), "https://proj.example.co/auth/v1/logout");
}

#[test]
fn rest_url_names_table() {
    let config = BackendConfig::new("https://proj.example.co/", "anon");
    assert_eq!(config.rest_url("bookmarks"), "https://proj.example.co/rest/v1/bookmarks");
}

#[test]
fn realtime_url_switches_scheme() {
    let secure = BackendConfig::new("https://proj.example.co", "anon");
    assert_eq!(
        secure.realtime_url().expect("url"),
        "wss://proj.example.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
    );

    let local = BackendConfig::new("http://127.0.0.1:54321", "k");
    assert_eq!(local.realtime_url().expect("url"), "ws://127.0.0.1:54321/realtime/v1/websocket?apikey=k&vsn=1.0.0");
}

#[test]
fn realtime_url_encodes_anon_key() {
    let config = BackendConfig::new("https://proj.example.co", "a&vsn=9 b+c");
    let url = config.realtime_url().expect("url");
    assert_eq!(url, "wss://proj.example.co/realtime/v1/websocket?apikey=a%26vsn%3D9+b%2Bc&vsn=1.0.0");

    let parsed = reqwest::Url::parse(&url).expect("parse");
    let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    assert_eq!(
        pairs,
        vec![("apikey".to_owned(), "a&vsn=9 b+c".to_owned()), ("vsn".to_owned(), "1.0.0".to_owned())]
    );
}
