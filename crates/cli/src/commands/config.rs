use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use mailbrief_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => render(&config),
        Err(error) => format!("config validation failed: {error}"),
    }
}

/// Lists every effective value with where it came from. Secrets are redacted.
pub fn render(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields = vec![
        field(
            "discord.bot_token",
            &["MAILBRIEF_DISCORD_BOT_TOKEN", "DISCORD_TOKEN"],
            redact_token(config.discord.bot_token.expose_secret()),
        ),
        field(
            "discord.application_id",
            &["MAILBRIEF_DISCORD_APPLICATION_ID", "DISCORD_CLIENT_ID"],
            config.discord.application_id.clone(),
        ),
        field(
            "discord.recipient_user_id",
            &["MAILBRIEF_DISCORD_RECIPIENT_USER_ID", "DISCORD_USER_ID"],
            config.discord.recipient_user_id.clone(),
        ),
        field(
            "discord.api_base_url",
            &["MAILBRIEF_DISCORD_API_BASE_URL"],
            config.discord.api_base_url.clone(),
        ),
        field(
            "discord.gateway_url",
            &["MAILBRIEF_DISCORD_GATEWAY_URL"],
            config.discord.gateway_url.clone(),
        ),
        field("store.url", &["MAILBRIEF_STORE_URL", "SUPABASE_URL"], config.store.url.clone()),
        field(
            "store.api_key",
            &["MAILBRIEF_STORE_API_KEY", "SUPABASE_KEY"],
            redact_secret(config.store.api_key.expose_secret()),
        ),
        field(
            "store.timeout_secs",
            &["MAILBRIEF_STORE_TIMEOUT_SECS"],
            config.store.timeout_secs.to_string(),
        ),
        field(
            "timing.notification_delay_secs",
            &["MAILBRIEF_TIMING_NOTIFICATION_DELAY_SECS"],
            config.timing.notification_delay_secs.to_string(),
        ),
        field(
            "timing.pagination_idle_secs",
            &["MAILBRIEF_TIMING_PAGINATION_IDLE_SECS"],
            config.timing.pagination_idle_secs.to_string(),
        ),
        field(
            "timing.channel_error_backoff_secs",
            &["MAILBRIEF_TIMING_CHANNEL_ERROR_BACKOFF_SECS"],
            config.timing.channel_error_backoff_secs.to_string(),
        ),
        field(
            "timing.fault_backoff_secs",
            &["MAILBRIEF_TIMING_FAULT_BACKOFF_SECS"],
            config.timing.fault_backoff_secs.to_string(),
        ),
        field(
            "server.bind_address",
            &["MAILBRIEF_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        field(
            "server.health_check_port",
            &["MAILBRIEF_SERVER_HEALTH_CHECK_PORT"],
            config.server.health_check_port.to_string(),
        ),
        field(
            "logging.level",
            &["MAILBRIEF_LOGGING_LEVEL", "MAILBRIEF_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        field(
            "logging.format",
            &["MAILBRIEF_LOGGING_FORMAT", "MAILBRIEF_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

struct ConfigField {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

fn field(key: &'static str, env_keys: &'static [&'static str], value: String) -> ConfigField {
    ConfigField { key, env_keys, value }
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from(DEFAULT_CONFIG_FILE);
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config").join(DEFAULT_CONFIG_FILE);
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

/// The first listed variable is the current name, later ones are legacy
/// fallbacks that config loading still honors.
fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Bot tokens lead with the encoded bot id, which is not secret.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('.') {
        return format!("{prefix}.***");
    }

    "<redacted>".to_string()
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
