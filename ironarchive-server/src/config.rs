use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

use crate::mask::mask_connection_string;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_EMAIL_STORAGE_PATH: &str = "./data/emails";
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MEILISEARCH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_DB_MAX_CONNS: u32 = 25;
const DEFAULT_DB_MIN_CONNS: u32 = 5;
const DEFAULT_DB_MAX_CONN_LIFETIME: Duration = Duration::from_secs(60 * 60);
const DEFAULT_DB_MAX_CONN_IDLE_TIME: Duration = Duration::from_secs(30 * 60);
const DEFAULT_DB_HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(60);

/// Process configuration. The five connection settings are required; every
/// other variable is optional and read through an accessor that applies its
/// default.
#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "DATABASE_URL")]
    pub database_url: ConnectionString,

    #[envconfig(from = "REDIS_URL")]
    pub redis_url: ConnectionString,

    #[envconfig(from = "MEILISEARCH_URL")]
    pub meilisearch_url: ConnectionString,

    #[envconfig(from = "MEILI_MASTER_KEY")]
    pub meili_master_key: Secret,

    #[envconfig(from = "JWT_SECRET")]
    pub jwt_secret: Secret,

    #[envconfig(from = "SERVER_HOST")]
    server_host: Option<Setting<String>>,

    #[envconfig(from = "SERVER_PORT")]
    server_port: Option<Setting<u16>>,

    #[envconfig(from = "LOG_LEVEL")]
    log_level: Option<Setting<String>>,

    #[envconfig(from = "LOG_FORMAT")]
    log_format: Option<Setting<LogFormat>>,

    #[envconfig(from = "EMAIL_STORAGE_PATH")]
    email_storage_path: Option<Setting<PathBuf>>,

    #[envconfig(nested = true)]
    pub pool: PoolConfig,

    #[envconfig(from = "PROBE_TIMEOUT")]
    probe_timeout: Option<Setting<EnvDuration>>,

    #[envconfig(from = "MEILISEARCH_TIMEOUT")]
    meilisearch_timeout: Option<Setting<EnvDuration>>,

    #[envconfig(from = "SHUTDOWN_TIMEOUT")]
    shutdown_timeout: Option<Setting<EnvDuration>>,
}

impl Config {
    /// Reads the process environment, topped up with the entries of a `.env`
    /// file in the working directory when there is one. Variables already set
    /// in the environment win over the file.
    pub fn load() -> Result<Self, envconfig::Error> {
        let dotenv = dotenvy::dotenv_iter()
            .into_iter()
            .flatten()
            .filter_map(Result::ok);
        let env = std::env::vars_os().filter_map(|(key, value)| {
            Some((key.into_string().ok()?, value.into_string().ok()?))
        });

        Self::init_from_hashmap(&overlay(dotenv, env))
    }

    pub fn host(&self) -> String {
        or_default(&self.server_host, DEFAULT_HOST.to_owned())
    }

    pub fn port(&self) -> u16 {
        or_default(&self.server_port, DEFAULT_PORT)
    }

    /// Produce a host:port address, as announced once all services are ready.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }

    pub fn log_level(&self) -> String {
        or_default(&self.log_level, DEFAULT_LOG_LEVEL.to_owned())
    }

    pub fn log_format(&self) -> LogFormat {
        or_default(&self.log_format, LogFormat::Json)
    }

    pub fn email_storage_path(&self) -> PathBuf {
        or_default(
            &self.email_storage_path,
            PathBuf::from(DEFAULT_EMAIL_STORAGE_PATH),
        )
    }

    /// Probe deadline for the database and the cache.
    pub fn probe_timeout(&self) -> Duration {
        or_default(&self.probe_timeout, EnvDuration(DEFAULT_PROBE_TIMEOUT)).0
    }

    pub fn meilisearch_timeout(&self) -> Duration {
        or_default(
            &self.meilisearch_timeout,
            EnvDuration(DEFAULT_MEILISEARCH_TIMEOUT),
        )
        .0
    }

    pub fn shutdown_timeout(&self) -> Duration {
        or_default(&self.shutdown_timeout, EnvDuration(DEFAULT_SHUTDOWN_TIMEOUT)).0
    }
}

/// Postgres pool variables as found in the environment.
#[derive(Envconfig, Clone, Debug)]
pub struct PoolConfig {
    #[envconfig(from = "DB_MAX_CONNS")]
    max_connections: Option<Setting<u32>>,

    #[envconfig(from = "DB_MIN_CONNS")]
    min_connections: Option<Setting<u32>>,

    #[envconfig(from = "DB_MAX_CONN_LIFETIME")]
    max_lifetime: Option<Setting<EnvDuration>>,

    #[envconfig(from = "DB_MAX_CONN_IDLE_TIME")]
    idle_timeout: Option<Setting<EnvDuration>>,

    #[envconfig(from = "DB_HEALTH_CHECK_PERIOD")]
    health_check_period: Option<Setting<EnvDuration>>,
}

impl PoolConfig {
    pub fn settings(&self) -> PoolSettings {
        let duration = |setting: &Option<Setting<EnvDuration>>, default: Duration| {
            or_default(setting, EnvDuration(default)).0
        };

        PoolSettings {
            max_connections: or_default(&self.max_connections, DEFAULT_DB_MAX_CONNS),
            min_connections: or_default(&self.min_connections, DEFAULT_DB_MIN_CONNS),
            max_lifetime: duration(&self.max_lifetime, DEFAULT_DB_MAX_CONN_LIFETIME),
            idle_timeout: duration(&self.idle_timeout, DEFAULT_DB_MAX_CONN_IDLE_TIME),
            health_check_period: duration(
                &self.health_check_period,
                DEFAULT_DB_HEALTH_CHECK_PERIOD,
            ),
        }
    }
}

/// Tuning knobs of the postgres connection pool, applied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    pub health_check_period: Duration,
}

/// Value of an optional variable. An empty or unparseable value reads the same
/// as an unset one, leaving the accessor to apply its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting<T>(Option<T>);

impl<T: FromStr> FromStr for Setting<T> {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Setting(None));
        }
        Ok(Setting(s.parse().ok()))
    }
}

/// `base` entries, replaced by any `overrides` with the same key.
fn overlay(
    base: impl IntoIterator<Item = (String, String)>,
    overrides: impl IntoIterator<Item = (String, String)>,
) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = base.into_iter().collect();
    vars.extend(overrides);
    vars
}

fn or_default<T: Clone>(setting: &Option<Setting<T>>, default: T) -> T {
    setting
        .as_ref()
        .and_then(|setting| setting.0.clone())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    /// Anything but "json" selects the human readable output.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(LogFormat::Json),
            _ => Ok(LogFormat::Pretty),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl fmt::Display for StringIsEmptyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value must not be empty")
    }
}

/// A required connection string. Its `Debug` output is masked, so the config can
/// be logged as a whole.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString(String);

impl ConnectionString {
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn masked(&self) -> String {
        mask_connection_string(&self.0)
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionString")
            .field(&self.masked())
            .finish()
    }
}

impl FromStr for ConnectionString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(ConnectionString(s.to_owned()))
        }
    }
}

/// A required secret that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl FromStr for Secret {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(Secret(s.to_owned()))
        }
    }
}

/// A duration written the Go way: `300ms`, `5s`, `1m30s`, `1.5h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvDuration(pub Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvDurationError(String);

impl fmt::Display for ParseEnvDurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid duration {:?}", self.0)
    }
}

impl FromStr for EnvDuration {
    type Err = ParseEnvDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseEnvDurationError(s.to_owned());

        let input = s.strip_prefix('+').unwrap_or(s);
        if input == "0" {
            return Ok(EnvDuration(Duration::ZERO));
        }
        if input.is_empty() {
            return Err(invalid());
        }

        let mut total_nanos: u128 = 0;
        let mut rest = input;
        while !rest.is_empty() {
            let number_len = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .ok_or_else(invalid)?;
            let (number, tail) = rest.split_at(number_len);
            let unit_len = tail
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(tail.len());
            let (unit, tail) = tail.split_at(unit_len);

            let unit_nanos = unit_nanos(unit).ok_or_else(invalid)?;
            total_nanos = total_nanos
                .checked_add(component_nanos(number, unit_nanos).ok_or_else(invalid)?)
                .ok_or_else(invalid)?;
            rest = tail;
        }

        let secs = u64::try_from(total_nanos / 1_000_000_000).map_err(|_| invalid())?;
        let nanos = u32::try_from(total_nanos % 1_000_000_000).map_err(|_| invalid())?;
        Ok(EnvDuration(Duration::new(secs, nanos)))
    }
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{b5}s" | "\u{3bc}s" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(60 * 60 * 1_000_000_000),
        _ => None,
    }
}

/// `12.5` of a unit, in nanoseconds. Fraction digits beyond nanosecond precision are dropped.
fn component_nanos(number: &str, unit_nanos: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().ok()?
    };
    let mut nanos = whole.checked_mul(unit_nanos)?;

    let fraction = &fraction[..fraction.len().min(18)];
    if !fraction.is_empty() {
        let digits: u128 = fraction.parse().ok()?;
        let scale = 10u128.pow(u32::try_from(fraction.len()).ok()?);
        nanos = nanos.checked_add(digits.checked_mul(unit_nanos)? / scale)?;
    }

    Some(nanos)
}
