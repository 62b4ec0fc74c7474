use std::path::Path;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::anilist::{RateBudget, RetryPolicy};
use crate::auth::OAuthSettings;

const ENV_PREFIX: &str = "ANILIST_MCP";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Interface to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Cache backend: memory or redis
    #[arg(long, env = "CACHE_BACKEND")]
    pub cache_backend: Option<String>,

    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// AniList OAuth client id
    #[arg(long, env = "ANILIST_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "ANILIST_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    #[arg(long, env = "ANILIST_REDIRECT_URI")]
    pub redirect_uri: Option<String>,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub anilist: AnilistConfig,
    pub oauth: OAuthConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnilistConfig {
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub rate_limit_low_water: u32,
    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub redis_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub json: bool,
}

impl AnilistConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn rate_budget(&self) -> RateBudget {
        RateBudget::new(
            self.rate_limit_requests,
            Duration::from_secs(self.rate_limit_window_secs),
            self.rate_limit_low_water,
        )
    }
}

impl OAuthConfig {
    pub fn settings(&self) -> OAuthSettings {
        OAuthSettings {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
            authorize_url: self.authorize_url.clone(),
            token_url: self.token_url.clone(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Priority: CLI flag > flag env var > `ANILIST_MCP_*` env > config file > defaults.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.cors_origins", vec!["*"])?
            .set_default("anilist.api_url", "https://graphql.anilist.co")?
            .set_default("anilist.request_timeout_secs", 30)?
            .set_default("anilist.rate_limit_low_water", 5)?
            .set_default("anilist.rate_limit_requests", 90)?
            .set_default("anilist.rate_limit_window_secs", 60)?
            .set_default("anilist.retry.max_attempts", 3)?
            .set_default("anilist.retry.initial_backoff_ms", 4000)?
            .set_default("anilist.retry.max_backoff_ms", 10_000)?
            .set_default("oauth.client_id", "")?
            .set_default("oauth.client_secret", "")?
            .set_default("oauth.redirect_uri", "http://localhost:8000/auth/callback")?
            .set_default("oauth.authorize_url", "https://anilist.co/api/v2/oauth/authorize")?
            .set_default("oauth.token_url", "https://anilist.co/api/v2/oauth/token")?
            .set_default("cache.backend", "memory")?
            .set_default("cache.redis_url", "redis://localhost:6379/0")?
            .set_default("logging.json", false)?;

        // An explicit file must exist; the working-directory fallback is optional.
        if let Some(path) = cli.config.as_deref() {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
        }

        // E.g. ANILIST_MCP_SERVER__PORT=9000, ANILIST_MCP_SERVER__CORS_ORIGINS=a,b
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .try_parsing(true),
        );

        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(backend) = cli.cache_backend {
            builder = builder.set_override("cache.backend", backend.to_lowercase())?;
        }
        if let Some(url) = cli.redis_url {
            builder = builder.set_override("cache.redis_url", url)?;
        }
        if let Some(id) = cli.client_id {
            builder = builder.set_override("oauth.client_id", id)?;
        }
        if let Some(secret) = cli.client_secret {
            builder = builder.set_override("oauth.client_secret", secret)?;
        }
        if let Some(uri) = cli.redirect_uri {
            builder = builder.set_override("oauth.redirect_uri", uri)?;
        }
        if let Some(json) = cli.log_json {
            builder = builder.set_override("logging.json", json)?;
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        Config::builder()
            .add_source(config::File::from_str(
                r"
server: { host: 127.0.0.1, port: 1, cors_origins: [] }
anilist:
  api_url: http://localhost
  request_timeout_secs: 5
  rate_limit_low_water: 2
  rate_limit_requests: 30
  rate_limit_window_secs: 10
  retry: { max_attempts: 0, initial_backoff_ms: 100, max_backoff_ms: 400 }
oauth: { client_id: a, client_secret: b, redirect_uri: c, authorize_url: d, token_url: e }
cache: { backend: redis, redis_url: redis://x }
logging: { json: true }
",
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_derived_policies() {
        let cfg = config();
        let retry = cfg.anilist.retry_policy();
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.initial_backoff, Duration::from_millis(100));
        assert_eq!(retry.max_backoff, Duration::from_millis(400));

        let budget = cfg.anilist.rate_budget();
        assert_eq!(budget.remaining(), 30);
        assert_eq!(budget.reset_window(), Duration::from_secs(10));

        assert_eq!(cfg.cache.backend, CacheBackend::Redis);
        assert_eq!(cfg.oauth.settings().token_url, "e");
    }
}
