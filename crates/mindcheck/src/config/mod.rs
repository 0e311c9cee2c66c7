use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::assessments::{
    EngineSettings, GuidanceConfig, UnmappedLabelPolicy, MAX_ATTACHED_RESOURCES,
};

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
    pub engine: EngineConfig,
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

        let engine = EngineConfig::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            engine,
        })
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

/// Knobs for result assembly and severity classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub resource_lookup_timeout: Duration,
    pub resource_limit: usize,
    pub unmapped_severity: UnmappedLabelPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resource_lookup_timeout: Duration::from_millis(2_000),
            resource_limit: MAX_ATTACHED_RESOURCES,
            unmapped_severity: UnmappedLabelPolicy::Reject,
        }
    }
}

impl EngineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let resource_lookup_timeout = match env::var("APP_RESOURCE_TIMEOUT_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|millis| *millis > 0)
                .map(Duration::from_millis)
                .ok_or(ConfigError::InvalidResourceTimeout(raw))?,
            Err(_) => defaults.resource_lookup_timeout,
        };

        let resource_limit = match env::var("APP_RESOURCE_LIMIT") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|limit| (1..=MAX_ATTACHED_RESOURCES).contains(limit))
                .ok_or(ConfigError::InvalidResourceLimit(raw))?,
            Err(_) => defaults.resource_limit,
        };

        let unmapped_severity = match env::var("APP_UNMAPPED_SEVERITY") {
            Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "reject" | "error" => UnmappedLabelPolicy::Reject,
                "fallback" | "minimal" => UnmappedLabelPolicy::FallbackToMinimal,
                _ => return Err(ConfigError::InvalidSeverityPolicy(raw)),
            },
            Err(_) => defaults.unmapped_severity,
        };

        Ok(Self {
            resource_lookup_timeout,
            resource_limit,
            unmapped_severity,
        })
    }

    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            resource_lookup_timeout: self.resource_lookup_timeout,
            resource_limit: self.resource_limit.min(MAX_ATTACHED_RESOURCES),
        }
    }

    pub fn guidance(&self) -> GuidanceConfig {
        GuidanceConfig {
            unmapped: self.unmapped_severity,
            ..GuidanceConfig::default()
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidResourceTimeout(String),
    InvalidResourceLimit(String),
    InvalidSeverityPolicy(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidResourceTimeout(value) => write!(
                f,
                "APP_RESOURCE_TIMEOUT_MS must be a positive number of milliseconds, got '{value}'"
            ),
            ConfigError::InvalidResourceLimit(value) => write!(
                f,
                "APP_RESOURCE_LIMIT must be between 1 and {MAX_ATTACHED_RESOURCES}, got '{value}'"
            ),
            ConfigError::InvalidSeverityPolicy(value) => write!(
                f,
                "APP_UNMAPPED_SEVERITY must be 'reject' or 'fallback', got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
