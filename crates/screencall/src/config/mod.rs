use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub provider: ProviderConfig,
    pub analyzer: AnalyzerConfig,
    pub interviews: InterviewConfig,
    pub reconciliation: ReconciliationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let provider = ProviderConfig {
            base_url: text("CALL_PROVIDER_BASE_URL", "http://127.0.0.1:4010"),
            api_key: text("CALL_PROVIDER_API_KEY", ""),
            request_timeout: Duration::from_secs(number("CALL_PROVIDER_TIMEOUT_SECS", 15)?),
        };

        let analyzer = AnalyzerConfig {
            base_url: text("ANALYZER_BASE_URL", "https://api.openai.com/v1"),
            api_key: text("ANALYZER_API_KEY", ""),
            model: text("ANALYZER_MODEL", "gpt-4o-mini"),
            request_timeout: Duration::from_secs(number("ANALYZER_TIMEOUT_SECS", 30)?),
        };

        let interviews = InterviewConfig {
            validity: positive_hours("INTERVIEW_VALIDITY_HOURS", 168)?,
            eager_provisioning: flag("INTERVIEW_EAGER_PROVISIONING", true),
            webhook_secret: env::var("WEBHOOK_SECRET")
                .ok()
                .filter(|secret| !secret.trim().is_empty()),
        };

        let concurrency: usize = number("RECONCILE_CONCURRENCY", 4)?;
        if concurrency == 0 {
            return Err(ConfigError::OutOfRange {
                variable: "RECONCILE_CONCURRENCY",
            });
        }
        let poll_secs: u64 = number("RECONCILE_POLL_INTERVAL_SECS", 30)?;
        if poll_secs == 0 {
            return Err(ConfigError::OutOfRange {
                variable: "RECONCILE_POLL_INTERVAL_SECS",
            });
        }
        let sweep_minutes: u64 = number("RECONCILE_SWEEP_INTERVAL_MINUTES", 120)?;
        let sweep_secs = sweep_minutes
            .checked_mul(60)
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::OutOfRange {
                variable: "RECONCILE_SWEEP_INTERVAL_MINUTES",
            })?;

        let reconciliation = ReconciliationConfig {
            poll_interval: Duration::from_secs(poll_secs),
            staleness: positive_minutes("RECONCILE_STALENESS_MINUTES", 15)?,
            expiry_ceiling: positive_minutes("RECONCILE_EXPIRY_MINUTES", 60)?,
            hard_ceiling: positive_hours("RECONCILE_HARD_CEILING_HOURS", 24)?,
            failure_threshold: number("RECONCILE_FAILURE_THRESHOLD", 3)?,
            sweep_interval: Duration::from_secs(sweep_secs),
            sweep_after: positive_minutes("RECONCILE_SWEEP_AFTER_MINUTES", 180)?,
            concurrency,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            provider,
            analyzer,
            interviews,
            reconciliation,
        })
    }
}

fn text(variable: &str, default: &str) -> String {
    env::var(variable).unwrap_or_else(|_| default.to_string())
}

fn number<T: FromStr>(variable: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(variable) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { variable }),
        _ => Ok(default),
    }
}

fn positive_minutes(
    variable: &'static str,
    default: i64,
) -> Result<chrono::Duration, ConfigError> {
    let minutes: i64 = number(variable, default)?;
    Some(minutes)
        .filter(|minutes| *minutes > 0)
        .and_then(chrono::Duration::try_minutes)
        .ok_or(ConfigError::OutOfRange { variable })
}

fn positive_hours(variable: &'static str, default: i64) -> Result<chrono::Duration, ConfigError> {
    let hours: i64 = number(variable, default)?;
    Some(hours)
        .filter(|hours| *hours > 0)
        .and_then(chrono::Duration::try_hours)
        .ok_or(ConfigError::OutOfRange { variable })
}

fn flag(variable: &str, default: bool) -> bool {
    match env::var(variable) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Call provider endpoint and credentials.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

/// Transcript analyzer endpoint, credentials and model.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct InterviewConfig {
    pub validity: chrono::Duration,
    pub eager_provisioning: bool,
    pub webhook_secret: Option<String>,
}

/// Poll cadence and the timeout tiers applied to in-flight interviews.
#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub poll_interval: Duration,
    pub staleness: chrono::Duration,
    pub expiry_ceiling: chrono::Duration,
    pub hard_ceiling: chrono::Duration,
    pub failure_threshold: u32,
    pub sweep_interval: Duration,
    pub sweep_after: chrono::Duration,
    pub concurrency: usize,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str },
    OutOfRange { variable: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a whole number")
            }
            ConfigError::OutOfRange { variable } => {
                write!(f, "{variable} must be greater than zero and within range")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::OutOfRange { .. } => None,
        }
    }
}
