use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "mailbrief.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub store: StoreConfig,
    pub timing: TimingConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub bot_token: SecretString,
    pub application_id: String,
    pub recipient_user_id: String,
    pub api_base_url: String,
    pub gateway_url: String,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub url: String,
    pub api_key: SecretString,
    pub timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingConfig {
    pub notification_delay_secs: u64,
    pub pagination_idle_secs: u64,
    pub channel_error_backoff_secs: u64,
    pub fault_backoff_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub discord_bot_token: Option<String>,
    pub discord_application_id: Option<String>,
    pub discord_recipient_user_id: Option<String>,
    pub store_url: Option<String>,
    pub store_api_key: Option<String>,
    pub notification_delay_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            discord: DiscordConfig {
                bot_token: String::new().into(),
                application_id: String::new(),
                recipient_user_id: String::new(),
                api_base_url: "https://discord.com/api/v10".to_string(),
                gateway_url: "wss://gateway.discord.gg/?v=10&encoding=json".to_string(),
            },
            store: StoreConfig { url: String::new(), api_key: String::new().into(), timeout_secs: 15 },
            timing: TimingConfig::default(),
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), health_check_port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            notification_delay_secs: 60,
            pagination_idle_secs: 120,
            channel_error_backoff_secs: 1,
            fault_backoff_secs: 5,
        }
    }
}

impl TimingConfig {
    pub fn notification_delay(&self) -> Duration {
        Duration::from_secs(self.notification_delay_secs)
    }

    pub fn pagination_idle(&self) -> Duration {
        Duration::from_secs(self.pagination_idle_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            channel_error_backoff: Duration::from_secs(self.channel_error_backoff_secs),
            fault_backoff: Duration::from_secs(self.fault_backoff_secs),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(discord) = patch.discord {
            if let Some(bot_token) = discord.bot_token {
                self.discord.bot_token = secret_value(bot_token);
            }
            if let Some(application_id) = discord.application_id {
                self.discord.application_id = application_id;
            }
            if let Some(recipient_user_id) = discord.recipient_user_id {
                self.discord.recipient_user_id = recipient_user_id;
            }
            if let Some(api_base_url) = discord.api_base_url {
                self.discord.api_base_url = api_base_url;
            }
            if let Some(gateway_url) = discord.gateway_url {
                self.discord.gateway_url = gateway_url;
            }
        }

        if let Some(store) = patch.store {
            if let Some(url) = store.url {
                self.store.url = url;
            }
            if let Some(api_key) = store.api_key {
                self.store.api_key = secret_value(api_key);
            }
            if let Some(timeout_secs) = store.timeout_secs {
                self.store.timeout_secs = timeout_secs;
            }
        }

        if let Some(timing) = patch.timing {
            if let Some(value) = timing.notification_delay_secs {
                self.timing.notification_delay_secs = value;
            }
            if let Some(value) = timing.pagination_idle_secs {
                self.timing.pagination_idle_secs = value;
            }
            if let Some(value) = timing.channel_error_backoff_secs {
                self.timing.channel_error_backoff_secs = value;
            }
            if let Some(value) = timing.fault_backoff_secs {
                self.timing.fault_backoff_secs = value;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env_or_legacy("MAILBRIEF_DISCORD_BOT_TOKEN", "DISCORD_TOKEN") {
            self.discord.bot_token = secret_value(value);
        }
        if let Some(value) =
            read_env_or_legacy("MAILBRIEF_DISCORD_APPLICATION_ID", "DISCORD_CLIENT_ID")
        {
            self.discord.application_id = value;
        }
        if let Some(value) =
            read_env_or_legacy("MAILBRIEF_DISCORD_RECIPIENT_USER_ID", "DISCORD_USER_ID")
        {
            self.discord.recipient_user_id = value;
        }
        if let Some(value) = read_env("MAILBRIEF_DISCORD_API_BASE_URL") {
            self.discord.api_base_url = value;
        }
        if let Some(value) = read_env("MAILBRIEF_DISCORD_GATEWAY_URL") {
            self.discord.gateway_url = value;
        }

        if let Some(value) = read_env_or_legacy("MAILBRIEF_STORE_URL", "SUPABASE_URL") {
            self.store.url = value;
        }
        if let Some(value) = read_env_or_legacy("MAILBRIEF_STORE_API_KEY", "SUPABASE_KEY") {
            self.store.api_key = secret_value(value);
        }
        if let Some(value) = read_env("MAILBRIEF_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_u64("MAILBRIEF_STORE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MAILBRIEF_TIMING_NOTIFICATION_DELAY_SECS") {
            self.timing.notification_delay_secs =
                parse_u64("MAILBRIEF_TIMING_NOTIFICATION_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("MAILBRIEF_TIMING_PAGINATION_IDLE_SECS") {
            self.timing.pagination_idle_secs =
                parse_u64("MAILBRIEF_TIMING_PAGINATION_IDLE_SECS", &value)?;
        }
        if let Some(value) = read_env("MAILBRIEF_TIMING_CHANNEL_ERROR_BACKOFF_SECS") {
            self.timing.channel_error_backoff_secs =
                parse_u64("MAILBRIEF_TIMING_CHANNEL_ERROR_BACKOFF_SECS", &value)?;
        }
        if let Some(value) = read_env("MAILBRIEF_TIMING_FAULT_BACKOFF_SECS") {
            self.timing.fault_backoff_secs =
                parse_u64("MAILBRIEF_TIMING_FAULT_BACKOFF_SECS", &value)?;
        }

        if let Some(value) = read_env("MAILBRIEF_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MAILBRIEF_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("MAILBRIEF_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level =
            read_env("MAILBRIEF_LOGGING_LEVEL").or_else(|| read_env("MAILBRIEF_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MAILBRIEF_LOGGING_FORMAT").or_else(|| read_env("MAILBRIEF_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.discord_bot_token {
            self.discord.bot_token = secret_value(bot_token);
        }
        if let Some(application_id) = overrides.discord_application_id {
            self.discord.application_id = application_id;
        }
        if let Some(recipient_user_id) = overrides.discord_recipient_user_id {
            self.discord.recipient_user_id = recipient_user_id;
        }
        if let Some(store_url) = overrides.store_url {
            self.store.url = store_url;
        }
        if let Some(store_api_key) = overrides.store_api_key {
            self.store.api_key = secret_value(store_api_key);
        }
        if let Some(delay) = overrides.notification_delay_secs {
            self.timing.notification_delay_secs = delay;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_discord(&self.discord)?;
        validate_store(&self.store)?;
        validate_timing(&self.timing)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_snowflake(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit())
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_discord(discord: &DiscordConfig) -> Result<(), ConfigError> {
    if discord.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "discord.bot_token is required. Get it from https://discord.com/developers/applications > Your App > Bot > Token".to_string(),
        ));
    }

    let application_id = discord.application_id.trim();
    if application_id.is_empty() {
        return Err(ConfigError::Validation(
            "discord.application_id is required. Copy it from the app's General Information page"
                .to_string(),
        ));
    }
    if !is_snowflake(application_id) {
        return Err(ConfigError::Validation(format!(
            "discord.application_id must be a numeric snowflake, got `{application_id}`"
        )));
    }

    let recipient = discord.recipient_user_id.trim();
    if recipient.is_empty() {
        return Err(ConfigError::Validation(
            "discord.recipient_user_id is required. Enable developer mode and use Copy User ID"
                .to_string(),
        ));
    }
    if !is_snowflake(recipient) {
        return Err(ConfigError::Validation(format!(
            "discord.recipient_user_id must be a numeric snowflake, got `{recipient}`"
        )));
    }

    if !is_http_url(&discord.api_base_url) {
        return Err(ConfigError::Validation(
            "discord.api_base_url must start with http:// or https://".to_string(),
        ));
    }
    if !discord.gateway_url.starts_with("ws://") && !discord.gateway_url.starts_with("wss://") {
        return Err(ConfigError::Validation(
            "discord.gateway_url must start with ws:// or wss://".to_string(),
        ));
    }

    Ok(())
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    let url = store.url.trim();
    if url.is_empty() {
        return Err(ConfigError::Validation(
            "store.url is required (the project URL, e.g. https://<ref>.supabase.co)".to_string(),
        ));
    }
    if !is_http_url(url) {
        return Err(ConfigError::Validation(
            "store.url must start with http:// or https://".to_string(),
        ));
    }

    if store.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation("store.api_key is required".to_string()));
    }

    if store.timeout_secs == 0 || store.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "store.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_timing(timing: &TimingConfig) -> Result<(), ConfigError> {
    if timing.pagination_idle_secs == 0 {
        return Err(ConfigError::Validation(
            "timing.pagination_idle_secs must be greater than zero".to_string(),
        ));
    }
    if timing.channel_error_backoff_secs == 0 {
        return Err(ConfigError::Validation(
            "timing.channel_error_backoff_secs must be greater than zero".to_string(),
        ));
    }
    if timing.fault_backoff_secs == 0 {
        return Err(ConfigError::Validation(
            "timing.fault_backoff_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_env_or_legacy(key: &str, legacy: &str) -> Option<String> {
    read_env(key).or_else(|| read_env(legacy))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    discord: Option<DiscordPatch>,
    store: Option<StorePatch>,
    timing: Option<TimingPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordPatch {
    bot_token: Option<String>,
    application_id: Option<String>,
    recipient_user_id: Option<String>,
    api_base_url: Option<String>,
    gateway_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TimingPatch {
    notification_delay_secs: Option<u64>,
    pagination_idle_secs: Option<u64>,
    channel_error_backoff_secs: Option<u64>,
    fault_backoff_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const REQUIRED_VARS: [(&str, &str); 5] = [
        ("MAILBRIEF_DISCORD_BOT_TOKEN", "bot-token-from-env"),
        ("MAILBRIEF_DISCORD_APPLICATION_ID", "1100000000000000001"),
        ("MAILBRIEF_DISCORD_RECIPIENT_USER_ID", "1200000000000000002"),
        ("MAILBRIEF_STORE_URL", "https://project.supabase.co"),
        ("MAILBRIEF_STORE_API_KEY", "store-key-from-env"),
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn set_required() {
        for (key, value) in REQUIRED_VARS {
            env::set_var(key, value);
        }
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn clear_required() {
        for (key, _) in REQUIRED_VARS {
            env::remove_var(key);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_MAILBRIEF_TOKEN", "bot-token-from-interpolation");
        env::set_var("TEST_MAILBRIEF_STORE_KEY", "store-key-from-interpolation");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("mailbrief.toml");
            fs::write(
                &path,
                r#"
[discord]
bot_token = "${TEST_MAILBRIEF_TOKEN}"
application_id = "1100000000000000001"
recipient_user_id = "1200000000000000002"

[store]
url = "https://project.supabase.co"
api_key = "${TEST_MAILBRIEF_STORE_KEY}"

[timing]
notification_delay_secs = 30
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.discord.bot_token.expose_secret() == "bot-token-from-interpolation",
                "bot token should be interpolated from environment",
            )?;
            ensure(
                config.store.api_key.expose_secret() == "store-key-from-interpolation",
                "store key should be interpolated from environment",
            )?;
            ensure(
                config.timing.notification_delay() == Duration::from_secs(30),
                "file timing should replace the default debounce",
            )?;
            ensure(
                config.timing.pagination_idle() == Duration::from_secs(120),
                "unspecified timing keeps its default",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_MAILBRIEF_TOKEN", "TEST_MAILBRIEF_STORE_KEY"]);
        result
    }

    #[test]
    fn legacy_env_names_are_accepted() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let legacy = [
            ("DISCORD_TOKEN", "legacy-token"),
            ("DISCORD_CLIENT_ID", "1100000000000000009"),
            ("DISCORD_USER_ID", "1200000000000000009"),
            ("SUPABASE_URL", "https://legacy.supabase.co"),
            ("SUPABASE_KEY", "legacy-key"),
        ];
        for (key, value) in legacy {
            env::set_var(key, value);
        }
        env::set_var("MAILBRIEF_STORE_URL", "https://preferred.supabase.co");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.discord.bot_token.expose_secret() == "legacy-token", "legacy token")?;
            ensure(config.discord.application_id == "1100000000000000009", "legacy client id")?;
            ensure(config.discord.recipient_user_id == "1200000000000000009", "legacy user id")?;
            ensure(
                config.store.url == "https://preferred.supabase.co",
                "prefixed variable wins over the legacy name",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "DISCORD_TOKEN",
            "DISCORD_CLIENT_ID",
            "DISCORD_USER_ID",
            "SUPABASE_URL",
            "SUPABASE_KEY",
            "MAILBRIEF_STORE_URL",
        ]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("MAILBRIEF_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("mailbrief.toml");
            fs::write(
                &path,
                r#"
[discord]
bot_token = "bot-token-from-file"

[store]
url = "https://from-file.supabase.co"

[logging]
level = "warn"
format = "pretty"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    store_url: Some("https://from-override.supabase.co".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.store.url == "https://from-override.supabase.co",
                "override store url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "env log format should win over file",
            )?;
            ensure(
                config.discord.bot_token.expose_secret() == "bot-token-from-env",
                "env bot token should win over file and defaults",
            )?;
            Ok(())
        })();

        clear_required();
        clear_vars(&["MAILBRIEF_LOG_FORMAT"]);
        result
    }

    #[test]
    fn missing_recipient_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::remove_var("MAILBRIEF_DISCORD_RECIPIENT_USER_ID");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("discord.recipient_user_id")
            );
            ensure(has_message, "validation failure should mention discord.recipient_user_id")
        })();

        clear_required();
        result
    }

    #[test]
    fn non_numeric_timing_env_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("MAILBRIEF_TIMING_FAULT_BACKOFF_SECS", "soon");

        let result = (|| -> Result<(), String> {
            let rejected = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::InvalidEnvOverride { ref key, .. })
                    if key == "MAILBRIEF_TIMING_FAULT_BACKOFF_SECS"
            );
            ensure(rejected, "unparseable backoff should be reported with its key")
        })();

        clear_required();
        clear_vars(&["MAILBRIEF_TIMING_FAULT_BACKOFF_SECS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("bot-token-from-env"), "debug output should not contain bot token")?;
            ensure(!debug.contains("store-key-from-env"), "debug output should not contain store key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            let policy = config.timing.retry_policy();
            ensure(policy.channel_error_backoff == Duration::from_secs(1), "default short backoff")?;
            ensure(policy.fault_backoff == Duration::from_secs(5), "default fault backoff")?;
            Ok(())
        })();

        clear_required();
        result
    }
}
