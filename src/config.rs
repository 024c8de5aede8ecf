use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub scanner: ScannerConfig,
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Shared-secret API auth and connection-URI encryption. Neither has a
/// usable default; `Config::validate` refuses to start without them.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    pub api_key: String,
    pub encryption_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub scan_interval_seconds: u64,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub lineage_refresh_seconds: u64,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub rediscovery_interval_seconds: u64,
    pub table_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

/// Absent `api_key` means fallback-only for both the Architect and the
/// Investigator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "aegis")]
#[command(version, about = "Aegis - Data Quality Monitoring for Analytical Warehouses")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Database path (overrides config file)
    #[arg(long, value_name = "PATH")]
    pub db_path: Option<String>,

    /// Logging level (overrides config file, e.g., "info,aegis=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Scan cadence in seconds (overrides config file)
    #[arg(long, value_name = "SECONDS")]
    pub scan_interval_seconds: Option<String>,
}

impl Config {
    /// Loading order (lowest to highest priority): defaults, config file,
    /// environment variables, command-line arguments.
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Supported environment variables:
    /// - `AEGIS_API_KEY`, `AEGIS_DB_PATH`, `AEGIS_ENCRYPTION_KEY`, `AEGIS_LOG_LEVEL`
    /// - `AEGIS_SCAN_INTERVAL_SECONDS`, `AEGIS_LINEAGE_REFRESH_SECONDS`, `AEGIS_REDISCOVERY_INTERVAL_SECONDS`
    /// - `OPENAI_API_KEY` (optional; absent means fallback-only)
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("AEGIS_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("AEGIS_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
        if let Ok(path) = std::env::var("AEGIS_DB_PATH") {
            self.database.path = path;
        }
        if let Ok(api_key) = std::env::var("AEGIS_API_KEY") {
            self.security.api_key = api_key;
        }
        if let Ok(key) = std::env::var("AEGIS_ENCRYPTION_KEY") {
            self.security.encryption_key = key;
        }
        if let Ok(level) = std::env::var("AEGIS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(interval) = std::env::var("AEGIS_SCAN_INTERVAL_SECONDS") {
            match parse_duration_to_secs(&interval) {
                Ok(v) => self.scanner.scan_interval_seconds = v,
                Err(e) => tracing::warn!("invalid AEGIS_SCAN_INTERVAL_SECONDS '{interval}': {e}"),
            }
        }
        if let Ok(interval) = std::env::var("AEGIS_LINEAGE_REFRESH_SECONDS") {
            match parse_duration_to_secs(&interval) {
                Ok(v) => self.scanner.lineage_refresh_seconds = v,
                Err(e) => tracing::warn!("invalid AEGIS_LINEAGE_REFRESH_SECONDS '{interval}': {e}"),
            }
        }
        if let Ok(interval) = std::env::var("AEGIS_REDISCOVERY_INTERVAL_SECONDS") {
            match parse_duration_to_secs(&interval) {
                Ok(v) => self.scanner.rediscovery_interval_seconds = v,
                Err(e) => tracing::warn!("invalid AEGIS_REDISCOVERY_INTERVAL_SECONDS '{interval}': {e}"),
            }
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
    }

    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.server_port {
            self.server.port = port;
        }
        if let Some(path) = &args.db_path {
            self.database.path = path.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(interval) = &args.scan_interval_seconds {
            match parse_duration_to_secs(interval) {
                Ok(v) => self.scanner.scan_interval_seconds = v,
                Err(e) => tracing::warn!("invalid --scan-interval-seconds '{interval}': {e}"),
            }
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("server port cannot be 0");
        }
        if self.database.path.is_empty() {
            anyhow::bail!("database path cannot be empty");
        }
        if self.security.api_key.is_empty() {
            anyhow::bail!("AEGIS_API_KEY must be set");
        }
        if self.security.encryption_key.is_empty() {
            anyhow::bail!("AEGIS_ENCRYPTION_KEY must be set");
        }
        if self.scanner.scan_interval_seconds == 0 {
            anyhow::bail!("scanner.scan_interval_seconds must be > 0");
        }
        if self.scanner.lineage_refresh_seconds == 0 {
            anyhow::bail!("scanner.lineage_refresh_seconds must be > 0");
        }
        if self.scanner.rediscovery_interval_seconds == 0 {
            anyhow::bail!("scanner.rediscovery_interval_seconds must be > 0");
        }
        if self.scanner.table_concurrency == 0 {
            anyhow::bail!("scanner.table_concurrency must be > 0");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths = ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];
        possible_paths.iter().find(|p| Path::new(p).exists()).map(|p| p.to_string())
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "sqlite://data/aegis.db".to_string() }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval_seconds: 300,
            lineage_refresh_seconds: 3600,
            rediscovery_interval_seconds: 86400,
            table_concurrency: 4,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,aegis=debug".to_string() }
    }
}

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }
    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        "d" | "day" | "days" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unsupported unit: {unit}")),
    }
}

fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_human_friendly_durations() {
        assert_eq!(parse_duration_to_secs("300").unwrap(), 300);
        assert_eq!(parse_duration_to_secs("5m").unwrap(), 300);
        assert_eq!(parse_duration_to_secs("1h").unwrap(), 3600);
        assert_eq!(parse_duration_to_secs("1d").unwrap(), 86400);
    }

    #[test]
    fn rejects_unsupported_unit() {
        assert!(parse_duration_to_secs("5x").is_err());
    }

    #[test]
    fn defaults_match_spec() {
        let scanner = ScannerConfig::default();
        assert_eq!(scanner.scan_interval_seconds, 300);
        assert_eq!(scanner.lineage_refresh_seconds, 3600);
        assert_eq!(scanner.rediscovery_interval_seconds, 86400);
    }

    #[test]
    fn validation_requires_api_key_and_encryption_key() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }
}
