//! Environment-driven settings for the API process
//!
//! Loaded once at process start into an immutable [`Settings`] and passed
//! explicitly to every component. Nothing re-reads the environment later.

use super::ConfigError;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// Default HTTP port of the API process
pub const DEFAULT_API_PORT: u16 = 8000;

/// Default PostgreSQL port
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Deployment mode selector (`MODE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Dev,
    Test,
    Prod,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEV" => Ok(Mode::Dev),
            "TEST" => Ok(Mode::Test),
            "PROD" => Ok(Mode::Prod),
            _ => Err(ConfigError::Invalid {
                key: "MODE",
                reason: format!("unknown mode '{}', expected DEV, TEST or PROD", s),
            }),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Dev => "DEV",
            Mode::Test => "TEST",
            Mode::Prod => "PROD",
        };
        f.write_str(name)
    }
}

/// Logging verbosity (`LOG_LEVEL`)
///
/// Accepts the numeric levels of the service's historical configuration
/// (10 debug, 20 info, 30 warning, 40 error, 50 critical) or level names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevel(pub Level);

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.trim().to_uppercase().as_str() {
            "0" | "5" | "TRACE" => Level::TRACE,
            "10" | "DEBUG" => Level::DEBUG,
            "20" | "INFO" => Level::INFO,
            "30" | "WARN" | "WARNING" => Level::WARN,
            // tracing has no level above ERROR
            "40" | "50" | "ERROR" | "CRITICAL" => Level::ERROR,
            _ => {
                return Err(ConfigError::Invalid {
                    key: "LOG_LEVEL",
                    reason: format!("unknown log level '{}'", s),
                })
            }
        };
        Ok(LogLevel(level))
    }
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub mode: Mode,
    pub debug: bool,
    pub cron_jobs_enable: bool,
    pub host: String,
    pub port: u16,
}

impl AppSettings {
    /// Socket address the HTTP server binds to
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid {
                key: "HOST",
                reason: format!("'{}' is not a valid bind address: {}", self.host, e),
            })
    }
}

/// Database connection parameters
#[derive(Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db: String,
    pub schema: String,
}

// Password never reaches the logs.
impl fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("db", &self.db)
            .field("schema", &self.schema)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: LogLevel,
    pub json: bool,
}

impl LogSettings {
    /// Logging settings alone; the supervisor has no database variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::load(&Env(&lookup))
    }

    fn load<F: Fn(&str) -> Option<String>>(env: &Env<'_, F>) -> Result<Self, ConfigError> {
        Ok(LogSettings {
            level: env.parse_or("LOG_LEVEL", LogLevel(Level::DEBUG))?,
            json: env.flag("LOG_JSON", false)?,
        })
    }
}

/// Immutable process configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub postgres: PostgresSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary lookup function
    ///
    /// Tests use this with a map instead of mutating the process environment,
    /// which races under parallel test execution.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let app = AppSettings {
            mode: env.parse_or("MODE", Mode::Dev)?,
            debug: env.flag("DEBUG", true)?,
            cron_jobs_enable: env.flag("CRON_JOBS_ENABLE", false)?,
            host: env.string_or("HOST", "0.0.0.0"),
            port: env.parse_or("PORT", DEFAULT_API_PORT)?,
        };

        let postgres = PostgresSettings {
            host: env.string_or("POSTGRES_HOST", "localhost"),
            port: env.parse_or("POSTGRES_PORT", DEFAULT_POSTGRES_PORT)?,
            user: env.required("POSTGRES_USER")?,
            password: env.required("POSTGRES_PASSWORD")?,
            db: env.required("POSTGRES_DB")?,
            schema: env.string_or("POSTGRES_SCHEMA", "public"),
        };
        validate_identifier("POSTGRES_SCHEMA", &postgres.schema)?;

        let log = LogSettings::load(&env)?;

        Ok(Settings { app, postgres, log })
    }
}

/// Schema names are interpolated into SQL by the cleanup job, so only plain
/// identifiers are accepted.
fn validate_identifier(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let valid = !value.is_empty()
        && value.len() <= 63
        && value
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            reason: format!("'{}' is not a plain SQL identifier", value),
        })
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => match v.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    key,
                    reason: format!("'{}' is not a boolean", v),
                }),
            },
        }
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }),
        }
    }
}
