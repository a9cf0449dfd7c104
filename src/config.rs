//! Environment-driven configuration.
//!
//! Loaded once at startup via `AppConfig::from_env()`. Missing required
//! values fail fast rather than falling back to a guessed default.

use secrecy::SecretString;
use std::time::Duration;

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_var(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_var(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct SubstrateConfig {
    pub base_url: String,
    pub user_token: Option<SecretString>,
    pub service_secret: Option<SecretString>,
    pub timeout: Duration,
}

impl SubstrateConfig {
    fn from_env() -> Self {
        Self {
            base_url: env_or("SUBSTRATE_API_URL", "http://localhost:10000"),
            user_token: None,
            service_secret: env_var("SUBSTRATE_SERVICE_SECRET").map(SecretString::from),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub half_open_max_requests: u32,
}

impl CircuitBreakerConfig {
    fn from_env() -> Self {
        Self {
            failure_threshold: env_parse_or("CB_FAILURE_THRESHOLD", 5),
            cooldown: Duration::from_secs(env_parse_or("CB_COOLDOWN_SECONDS", 60)),
            half_open_max_requests: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: SecretString,
    pub pool_size: usize,
}

impl DatabaseConfig {
    fn from_env() -> anyhow::Result<Self> {
        let url = env_var("SUPABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("SUPABASE_URL is required"))?;
        Ok(Self {
            url: SecretString::from(url),
            pool_size: env_parse_or("DB_POOL_SIZE", 16),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
}

impl AuthConfig {
    fn from_env() -> anyhow::Result<Self> {
        let secret = env_var("SUPABASE_JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("SUPABASE_JWT_SECRET is required"))?;
        Ok(Self {
            jwt_secret: SecretString::from(secret),
        })
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
}

impl LlmConfig {
    fn from_env() -> Self {
        Self {
            base_url: env_or("LLM_PROVIDER_URL", "https://api.llm-provider.internal"),
            api_key: env_var("LLM_PROVIDER_API_KEY").map(SecretString::from),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub substrate: SubstrateConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub http_port: u16,
    pub trial_cap: u32,
    /// Same-process loopback URL, used by the project scaffolder's
    /// recipe-trigger tool to queue work on itself.
    pub work_platform_url: String,
    pub tool_loop_max_iterations: u32,
}

impl AppConfig {
    /// Load configuration from the process environment. Reads a `.env`
    /// file first if present via `dotenvy`.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            substrate: SubstrateConfig::from_env(),
            circuit_breaker: CircuitBreakerConfig::from_env(),
            database: DatabaseConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            llm: LlmConfig::from_env(),
            http_port: env_parse_or("PORT", 8080),
            trial_cap: env_parse_or("TRIAL_CAP", 10),
            work_platform_url: env_or("WORK_PLATFORM_URL", "http://localhost:8080"),
            tool_loop_max_iterations: env_parse_or("TOOL_LOOP_MAX_ITERATIONS", 10),
        })
    }
}
