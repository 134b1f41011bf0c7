//! Transport configuration: where the analysis service lives, how long to wait for it, how to
//! retry it and how many connections to hold open.
//!
//! A [`TransportConfig`] is validated once when it is built and is immutable afterwards. Share it
//! with `Arc`; there is no global instance.
//!
//! ```rust
//! use analysis_relay::{RetrySettings, TransportConfig};
//! use std::time::Duration;
//!
//! let config = TransportConfig::builder("http://analysis.internal:5000")
//!     .read_timeout(Duration::from_secs(20))
//!     .retry(RetrySettings { max_attempts: 5, ..RetrySettings::default() })
//!     .build()
//!     .unwrap();
//! assert_eq!(config.endpoint("/health"), "http://analysis.internal:5000/health");
//! ```
//!
//! Environment loading reads the `ANALYSIS_SERVICE_*` variables; see [`TransportConfig::from_env`].

use crate::jitter::Jitter;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(60_000);
pub const DEFAULT_USER_AGENT: &str = concat!("analysis-relay/", env!("CARGO_PKG_VERSION"));

/// Prefix shared by every environment variable read by [`TransportConfig::from_env`].
pub const ENV_PREFIX: &str = "ANALYSIS_SERVICE_";

const MIN_TIMEOUT: Duration = Duration::from_millis(1000);
const MIN_RETRY_DELAY: Duration = Duration::from_millis(100);
const MIN_RETRY_MAX_DELAY: Duration = Duration::from_millis(1000);
const MIN_POOL_TOTAL: usize = 10;
const MIN_POOL_PER_ROUTE: usize = 5;

/// Retry-with-backoff settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrySettings {
    /// Total attempts, including the first.
    pub max_attempts: usize,
    /// Wait after the first failed attempt.
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: Jitter,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(30_000),
            jitter: Jitter::None,
        }
    }
}

/// Connection-pool limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_total: usize,
    pub max_per_route: usize,
    /// Age after which the pool's client generation is retired.
    pub time_to_live: Duration,
    /// Idle keep-alive connections are closed after this long.
    pub idle_timeout: Duration,
    /// Longest wait for a lease before the attempt fails with pool exhaustion.
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_total: 200,
            max_per_route: 20,
            time_to_live: Duration::from_secs(30 * 60),
            idle_timeout: Duration::from_secs(5 * 60),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// One rejected configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// One or more fields are out of range. Lists every violation, not just the first.
    #[error("invalid transport configuration: {}", join_violations(.0))]
    Invalid(Vec<ConfigViolation>),

    #[error("environment variable {var} has unparseable value `{value}`")]
    Unparseable { var: String, value: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

fn join_violations(violations: &[ConfigViolation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl ConfigError {
    /// Fields named by an `Invalid` error.
    pub fn fields(&self) -> Vec<&'static str> {
        match self {
            ConfigError::Invalid(violations) => violations.iter().map(|v| v.field).collect(),
            _ => Vec::new(),
        }
    }
}

/// Validated, immutable transport configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    base_url: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    retry: RetrySettings,
    pool: PoolSettings,
    call_deadline: Option<Duration>,
    user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            retry: RetrySettings::default(),
            pool: PoolSettings::default(),
            call_deadline: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl TransportConfig {
    pub fn builder(base_url: impl Into<String>) -> TransportConfigBuilder {
        TransportConfigBuilder {
            config: TransportConfig { base_url: base_url.into(), ..TransportConfig::default() },
        }
    }

    /// Load from the process environment. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup. `lookup` receives full variable names such as
    /// `ANALYSIS_SERVICE_BASE_URL`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = TransportConfig::default();
        let mut builder =
            TransportConfig::builder(env.raw("BASE_URL").unwrap_or(defaults.base_url));

        if let Some(ms) = env.parse::<u64>("CONNECT_TIMEOUT_MS")? {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = env.parse::<u64>("READ_TIMEOUT_MS")? {
            builder = builder.read_timeout(Duration::from_millis(ms));
        }

        let mut retry = RetrySettings::default();
        if let Some(n) = env.parse("RETRY_MAX_ATTEMPTS")? {
            retry.max_attempts = n;
        }
        if let Some(ms) = env.parse::<u64>("RETRY_DELAY_MS")? {
            retry.initial_delay = Duration::from_millis(ms);
        }
        if let Some(m) = env.parse("RETRY_MULTIPLIER")? {
            retry.multiplier = m;
        }
        if let Some(ms) = env.parse::<u64>("RETRY_MAX_DELAY_MS")? {
            retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(jitter) = env.parse("RETRY_JITTER")? {
            retry.jitter = jitter;
        }

        let mut pool = PoolSettings::default();
        if let Some(n) = env.parse("POOL_MAX_TOTAL")? {
            pool.max_total = n;
        }
        if let Some(n) = env.parse("POOL_MAX_PER_ROUTE")? {
            pool.max_per_route = n;
        }
        if let Some(secs) = env.parse::<u64>("POOL_TTL_SECS")? {
            pool.time_to_live = Duration::from_secs(secs);
        }
        if let Some(secs) = env.parse::<u64>("POOL_IDLE_TIMEOUT_SECS")? {
            pool.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env.parse::<u64>("POOL_ACQUIRE_TIMEOUT_MS")? {
            pool.acquire_timeout = Duration::from_millis(ms);
        }

        builder = builder.retry(retry).pool(pool);
        if let Some(ms) = env.parse::<u64>("CALL_DEADLINE_MS")? {
            builder = builder.call_deadline(Duration::from_millis(ms));
        }
        builder.build()
    }

    /// Check every field and report all violations at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut violations = Vec::new();
        let mut reject = |field: &'static str, message: String| {
            violations.push(ConfigViolation { field, message });
        };

        let url = self.base_url.trim();
        if url.is_empty() {
            reject("baseUrl", "must not be empty".into());
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            reject("baseUrl", format!("must be an http or https URL (got `{url}`)"));
        } else if reqwest::Url::parse(url).is_err() {
            reject("baseUrl", format!("is not a valid URL (got `{url}`)"));
        }

        if self.connect_timeout < MIN_TIMEOUT {
            reject("connectTimeout", at_least_ms(MIN_TIMEOUT, self.connect_timeout));
        }
        if self.read_timeout < MIN_TIMEOUT {
            reject("readTimeout", at_least_ms(MIN_TIMEOUT, self.read_timeout));
        }

        let retry = &self.retry;
        if retry.max_attempts < 1 {
            reject("retry.maxAttempts", "must be at least 1 (got 0)".into());
        }
        if retry.initial_delay < MIN_RETRY_DELAY {
            reject("retry.delay", at_least_ms(MIN_RETRY_DELAY, retry.initial_delay));
        }
        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            reject("retry.multiplier", format!("must be at least 1.0 (got {})", retry.multiplier));
        }
        if retry.max_delay < MIN_RETRY_MAX_DELAY {
            reject("retry.maxDelay", at_least_ms(MIN_RETRY_MAX_DELAY, retry.max_delay));
        } else if retry.max_delay < retry.initial_delay {
            reject(
                "retry.maxDelay",
                format!(
                    "must not be below retry.delay ({}ms < {}ms)",
                    retry.max_delay.as_millis(),
                    retry.initial_delay.as_millis()
                ),
            );
        }

        let pool = &self.pool;
        if pool.max_total < MIN_POOL_TOTAL {
            reject("pool.maxTotal", format!("must be at least {MIN_POOL_TOTAL} (got {})", pool.max_total));
        }
        if pool.max_per_route < MIN_POOL_PER_ROUTE {
            reject(
                "pool.defaultMaxPerRoute",
                format!("must be at least {MIN_POOL_PER_ROUTE} (got {})", pool.max_per_route),
            );
        }
        if pool.time_to_live.is_zero() {
            reject("pool.timeToLive", "must be greater than zero".into());
        }
        if pool.idle_timeout.is_zero() {
            reject("pool.idleTimeout", "must be greater than zero".into());
        }
        if pool.acquire_timeout.is_zero() {
            reject("pool.acquireTimeout", "must be greater than zero".into());
        }

        if matches!(self.call_deadline, Some(d) if d.is_zero()) {
            reject("callDeadline", "must be greater than zero when set".into());
        }
        if self.user_agent.trim().is_empty() {
            reject("userAgent", "must not be empty".into());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(violations))
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn retry(&self) -> &RetrySettings {
        &self.retry
    }

    pub fn pool(&self) -> &PoolSettings {
        &self.pool
    }

    pub fn call_deadline(&self) -> Option<Duration> {
        self.call_deadline
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Full URL for a remote path such as `/api/stock/analyze`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Pool route key, `scheme://host:port`, of the base URL.
    pub fn route(&self) -> String {
        match reqwest::Url::parse(&self.base_url) {
            Ok(url) => {
                let host = url.host_str().unwrap_or_default();
                match url.port_or_known_default() {
                    Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                    None => format!("{}://{}", url.scheme(), host),
                }
            }
            Err(_) => self.base_url.clone(),
        }
    }
}

fn at_least_ms(min: Duration, got: Duration) -> String {
    format!("must be at least {}ms (got {}ms)", min.as_millis(), got.as_millis())
}

/// Builder for [`TransportConfig`]; `build` validates.
#[derive(Debug, Clone)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn pool(mut self, pool: PoolSettings) -> Self {
        self.config.pool = pool;
        self
    }

    /// Bound each logical call, every attempt and backoff included.
    pub fn call_deadline(mut self, deadline: Duration) -> Self {
        self.config.call_deadline = Some(deadline);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<TransportConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, suffix: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{suffix}"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, suffix: &str) -> Result<Option<T>, ConfigError> {
        match self.raw(suffix) {
            None => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|_| ConfigError::Unparseable {
                var: format!("{ENV_PREFIX}{suffix}"),
                value,
            }),
        }
    }
}
