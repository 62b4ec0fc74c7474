use anilist_mcp::config::{AppConfig, CacheBackend};
use serial_test::serial;
use std::env;
use std::fs;

const ARGS: [&str; 1] = ["anilist-mcp"];

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        for key in [
            "CONFIG_FILE",
            "PORT",
            "HOST",
            "CACHE_BACKEND",
            "REDIS_URL",
            "ANILIST_CLIENT_ID",
            "ANILIST_CLIENT_SECRET",
            "ANILIST_REDIRECT_URI",
            "LOG_JSON",
            "ANILIST_MCP_SERVER__PORT",
            "ANILIST_MCP_SERVER__CORS_ORIGINS",
            "ANILIST_MCP_ANILIST__RETRY__MAX_ATTEMPTS",
        ] {
            env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args(ARGS).expect("defaults should load");

    assert_eq!(config.server.port, 8000);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.cors_origins, ["*"]);
    assert_eq!(config.anilist.api_url, "https://graphql.anilist.co");
    assert_eq!(config.anilist.retry.max_attempts, 3);
    assert_eq!(config.anilist.rate_limit_requests, 90);
    assert_eq!(config.cache.backend, CacheBackend::Memory);
    assert_eq!(config.oauth.redirect_uri, "http://localhost:8000/auth/callback");
    assert!(!config.logging.json);
}

#[test]
#[serial]
fn test_prefixed_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("ANILIST_MCP_SERVER__PORT", "9090");
        env::set_var("ANILIST_MCP_ANILIST__RETRY__MAX_ATTEMPTS", "5");
        env::set_var("ANILIST_MCP_SERVER__CORS_ORIGINS", "https://a.example,https://b.example");
    }

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load config");
    clear_env_vars();

    assert_eq!(config.server.port, 9090);
    assert_eq!(config.anilist.retry.max_attempts, 5);
    assert_eq!(config.server.cors_origins, ["https://a.example", "https://b.example"]);
}

#[test]
#[serial]
fn test_cli_flag_beats_env() {
    clear_env_vars();
    unsafe {
        env::set_var("ANILIST_MCP_SERVER__PORT", "9090");
        env::set_var("ANILIST_CLIENT_ID", "from-env");
    }

    let config = AppConfig::load_from_args(["anilist-mcp", "--port", "7000"])
        .expect("Failed to load config");
    clear_env_vars();

    assert_eq!(config.server.port, 7000);
    assert_eq!(config.oauth.client_id, "from-env");
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("anilist.yaml");
    fs::write(
        &file_path,
        r"
server:
  port: 7070
cache:
  backend: redis
",
    )
    .expect("Failed to write temp config");

    unsafe {
        env::set_var("CONFIG_FILE", &file_path);
    }

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load config from file");
    clear_env_vars();

    assert_eq!(config.server.port, 7070);
    assert_eq!(config.cache.backend, CacheBackend::Redis);
    // Untouched keys keep their defaults.
    assert_eq!(config.server.host, "0.0.0.0");
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_env_vars();

    let result = AppConfig::load_from_args(["anilist-mcp", "--config", "/nonexistent/anilist.yaml"]);
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_cwd_config_fallback() {
    clear_env_vars();

    let cwd_path = "config.yaml";
    fs::write(cwd_path, "server:\n  port: 6060\n").expect("Failed to write ./config.yaml");

    let config = AppConfig::load_from_args(ARGS);
    fs::remove_file(cwd_path).unwrap();

    assert_eq!(config.expect("Failed to load config").server.port, 6060);
}
