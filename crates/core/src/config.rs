use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub channel: ChannelConfig,
    pub llm: LlmConfig,
    pub email: EmailConfig,
    pub shortener: ShortenerConfig,
    pub dispatch: DispatchConfig,
    pub intake: IntakeConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// WhatsApp Cloud-style channel credentials.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub access_token: SecretString,
    pub phone_number_id: String,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub from_address: String,
    pub from_name: String,
    pub reply_to: Option<String>,
    /// Tried in order; first successful provider wins.
    pub providers: Vec<EmailProviderConfig>,
}

/// Per-provider credentials; each variant carries only what that provider
/// needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmailProviderConfig {
    Sendgrid { api_key: String },
    Mailgun { api_key: String, domain: String },
    Postmark { server_token: String },
}

impl EmailProviderConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sendgrid { .. } => "sendgrid",
            Self::Mailgun { .. } => "mailgun",
            Self::Postmark { .. } => "postmark",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShortenerConfig {
    /// URLs at or below this length skip shortening entirely.
    pub threshold_chars: usize,
    pub timeout_secs: u64,
    /// Tried in order; first success wins.
    pub providers: Vec<ShortenerKind>,
    /// Base URL for the long notification links handed to the shortener.
    pub portal_base_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortenerKind {
    TinyUrl,
    IsGd,
    CleanUri,
}

impl ShortenerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TinyUrl => "tinyurl",
            Self::IsGd => "is_gd",
            Self::CleanUri => "cleanuri",
        }
    }
}

impl std::str::FromStr for ShortenerKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tinyurl" => Ok(Self::TinyUrl),
            "is_gd" | "isgd" => Ok(Self::IsGd),
            "cleanuri" => Ok(Self::CleanUri),
            other => Err(ConfigError::Validation(format!(
                "unsupported shortener provider `{other}` (expected tinyurl|is_gd|cleanuri)"
            ))),
        }
    }
}

/// Fan-out policy values. Defaults mirror the production policy: retry
/// ceiling 3, batches of 50, 500 ms between batches.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub batch_size: usize,
    pub max_attempts: u32,
    pub inter_batch_delay_ms: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct IntakeConfig {
    pub session_ttl_minutes: i64,
    pub rate_limit_max_attempts: u32,
    pub rate_limit_window_secs: i64,
    pub duplicate_window_minutes: i64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub channel_access_token: Option<String>,
    pub channel_phone_number_id: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub email_from_address: Option<String>,
    pub portal_base_url: Option<String>,
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
            database: DatabaseConfig {
                url: "sqlite://mudey.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            channel: ChannelConfig {
                access_token: String::new().into(),
                phone_number_id: String::new(),
                api_base_url: "https://graph.facebook.com/v19.0".to_string(),
            },
            llm: LlmConfig {
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                temperature: 0.2,
            },
            email: EmailConfig {
                from_address: "leads@mudey.com.br".to_string(),
                from_name: "Mudey".to_string(),
                reply_to: None,
                providers: Vec::new(),
            },
            shortener: ShortenerConfig {
                threshold_chars: 96,
                timeout_secs: 10,
                providers: vec![ShortenerKind::TinyUrl, ShortenerKind::IsGd, ShortenerKind::CleanUri],
                portal_base_url: "https://app.mudey.com.br".to_string(),
            },
            dispatch: DispatchConfig {
                batch_size: 50,
                max_attempts: 3,
                inter_batch_delay_ms: 500,
                sweep_interval_secs: 60,
            },
            intake: IntakeConfig {
                session_ttl_minutes: 30,
                rate_limit_max_attempts: 20,
                rate_limit_window_secs: 60,
                duplicate_window_minutes: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("mudey.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(channel) = patch.channel {
            if let Some(access_token_value) = channel.access_token {
                self.channel.access_token = secret_value(access_token_value);
            }
            if let Some(phone_number_id) = channel.phone_number_id {
                self.channel.phone_number_id = phone_number_id;
            }
            if let Some(api_base_url) = channel.api_base_url {
                self.channel.api_base_url = api_base_url;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
        }

        if let Some(email) = patch.email {
            if let Some(from_address) = email.from_address {
                self.email.from_address = from_address;
            }
            if let Some(from_name) = email.from_name {
                self.email.from_name = from_name;
            }
            if let Some(reply_to) = email.reply_to {
                self.email.reply_to = Some(reply_to);
            }
            if let Some(providers) = email.providers {
                self.email.providers = providers;
            }
        }

        if let Some(shortener) = patch.shortener {
            if let Some(threshold_chars) = shortener.threshold_chars {
                self.shortener.threshold_chars = threshold_chars;
            }
            if let Some(timeout_secs) = shortener.timeout_secs {
                self.shortener.timeout_secs = timeout_secs;
            }
            if let Some(providers) = shortener.providers {
                self.shortener.providers = providers;
            }
            if let Some(portal_base_url) = shortener.portal_base_url {
                self.shortener.portal_base_url = portal_base_url;
            }
        }

        if let Some(dispatch) = patch.dispatch {
            if let Some(batch_size) = dispatch.batch_size {
                self.dispatch.batch_size = batch_size;
            }
            if let Some(max_attempts) = dispatch.max_attempts {
                self.dispatch.max_attempts = max_attempts;
            }
            if let Some(inter_batch_delay_ms) = dispatch.inter_batch_delay_ms {
                self.dispatch.inter_batch_delay_ms = inter_batch_delay_ms;
            }
            if let Some(sweep_interval_secs) = dispatch.sweep_interval_secs {
                self.dispatch.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(intake) = patch.intake {
            if let Some(session_ttl_minutes) = intake.session_ttl_minutes {
                self.intake.session_ttl_minutes = session_ttl_minutes;
            }
            if let Some(rate_limit_max_attempts) = intake.rate_limit_max_attempts {
                self.intake.rate_limit_max_attempts = rate_limit_max_attempts;
            }
            if let Some(rate_limit_window_secs) = intake.rate_limit_window_secs {
                self.intake.rate_limit_window_secs = rate_limit_window_secs;
            }
            if let Some(duplicate_window_minutes) = intake.duplicate_window_minutes {
                self.intake.duplicate_window_minutes = duplicate_window_minutes;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("MUDEY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("MUDEY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("MUDEY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("MUDEY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("MUDEY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MUDEY_CHANNEL_ACCESS_TOKEN") {
            self.channel.access_token = secret_value(value);
        }
        if let Some(value) = read_env("MUDEY_CHANNEL_PHONE_NUMBER_ID") {
            self.channel.phone_number_id = value;
        }
        if let Some(value) = read_env("MUDEY_CHANNEL_API_BASE_URL") {
            self.channel.api_base_url = value;
        }

        if let Some(value) = read_env("MUDEY_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("MUDEY_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("MUDEY_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("MUDEY_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("MUDEY_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MUDEY_EMAIL_FROM_ADDRESS") {
            self.email.from_address = value;
        }
        if let Some(value) = read_env("MUDEY_EMAIL_FROM_NAME") {
            self.email.from_name = value;
        }
        if let Some(value) = read_env("MUDEY_EMAIL_REPLY_TO") {
            self.email.reply_to = Some(value);
        }

        if let Some(value) = read_env("MUDEY_PORTAL_BASE_URL") {
            self.shortener.portal_base_url = value;
        }

        if let Some(value) = read_env("MUDEY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MUDEY_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("MUDEY_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("MUDEY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("MUDEY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("MUDEY_LOGGING_LEVEL").or_else(|| read_env("MUDEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("MUDEY_LOGGING_FORMAT").or_else(|| read_env("MUDEY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(access_token) = overrides.channel_access_token {
            self.channel.access_token = secret_value(access_token);
        }
        if let Some(phone_number_id) = overrides.channel_phone_number_id {
            self.channel.phone_number_id = phone_number_id;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(from_address) = overrides.email_from_address {
            self.email.from_address = from_address;
        }
        if let Some(portal_base_url) = overrides.portal_base_url {
            self.shortener.portal_base_url = portal_base_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_email(&self.email)?;
        validate_shortener(&self.shortener)?;
        validate_dispatch(&self.dispatch)?;
        validate_intake(&self.intake)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("mudey.toml"), PathBuf::from("config/mudey.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }
    if llm.timeout_secs == 0 || llm.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=120".to_string(),
        ));
    }
    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }
    Ok(())
}

fn validate_email(email: &EmailConfig) -> Result<(), ConfigError> {
    if !email.from_address.contains('@') {
        return Err(ConfigError::Validation(
            "email.from_address must be a valid address".to_string(),
        ));
    }
    for provider in &email.providers {
        match provider {
            EmailProviderConfig::Sendgrid { api_key } if api_key.trim().is_empty() => {
                return Err(ConfigError::Validation(
                    "email provider `sendgrid` requires api_key".to_string(),
                ));
            }
            EmailProviderConfig::Mailgun { api_key, domain }
                if api_key.trim().is_empty() || domain.trim().is_empty() =>
            {
                return Err(ConfigError::Validation(
                    "email provider `mailgun` requires api_key and domain".to_string(),
                ));
            }
            EmailProviderConfig::Postmark { server_token } if server_token.trim().is_empty() => {
                return Err(ConfigError::Validation(
                    "email provider `postmark` requires server_token".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_shortener(shortener: &ShortenerConfig) -> Result<(), ConfigError> {
    if shortener.threshold_chars == 0 {
        return Err(ConfigError::Validation(
            "shortener.threshold_chars must be greater than zero".to_string(),
        ));
    }
    if shortener.timeout_secs == 0 || shortener.timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "shortener.timeout_secs must be in range 1..=60".to_string(),
        ));
    }
    if shortener.providers.is_empty() {
        return Err(ConfigError::Validation(
            "shortener.providers must list at least one provider".to_string(),
        ));
    }
    if shortener.portal_base_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "shortener.portal_base_url must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_dispatch(dispatch: &DispatchConfig) -> Result<(), ConfigError> {
    if dispatch.batch_size == 0 {
        return Err(ConfigError::Validation(
            "dispatch.batch_size must be greater than zero".to_string(),
        ));
    }
    if dispatch.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "dispatch.max_attempts must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_intake(intake: &IntakeConfig) -> Result<(), ConfigError> {
    if intake.session_ttl_minutes <= 0 {
        return Err(ConfigError::Validation(
            "intake.session_ttl_minutes must be positive".to_string(),
        ));
    }
    if intake.rate_limit_window_secs <= 0 || intake.duplicate_window_minutes <= 0 {
        return Err(ConfigError::Validation(
            "intake guard windows must be positive".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    logging.level.parse::<LogLevelProbe>().map(|_| ()).map_err(|_| {
        ConfigError::Validation(format!(
            "unsupported logging.level `{}` (expected trace|debug|info|warn|error)",
            logging.level
        ))
    })
}

struct LogLevelProbe;

impl std::str::FromStr for LogLevelProbe {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(Self),
            _ => Err(()),
        }
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    channel: Option<ChannelPatch>,
    llm: Option<LlmPatch>,
    email: Option<EmailPatch>,
    shortener: Option<ShortenerPatch>,
    dispatch: Option<DispatchPatch>,
    intake: Option<IntakePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelPatch {
    access_token: Option<String>,
    phone_number_id: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailPatch {
    from_address: Option<String>,
    from_name: Option<String>,
    reply_to: Option<String>,
    providers: Option<Vec<EmailProviderConfig>>,
}

#[derive(Debug, Default, Deserialize)]
struct ShortenerPatch {
    threshold_chars: Option<usize>,
    timeout_secs: Option<u64>,
    providers: Option<Vec<ShortenerKind>>,
    portal_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DispatchPatch {
    batch_size: Option<usize>,
    max_attempts: Option<u32>,
    inter_batch_delay_ms: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct IntakePatch {
    session_ttl_minutes: Option<i64>,
    rate_limit_max_attempts: Option<u32>,
    rate_limit_window_secs: Option<i64>,
    duplicate_window_minutes: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{
        AppConfig, ConfigOverrides, EmailProviderConfig, LoadOptions, LogFormat, ShortenerKind,
    };

    #[test]
    fn defaults_pass_validation() {
        AppConfig::default().validate().expect("default config should validate");
    }

    #[test]
    fn defaults_carry_the_production_policy_values() {
        let config = AppConfig::default();
        assert_eq!(config.dispatch.batch_size, 50);
        assert_eq!(config.dispatch.max_attempts, 3);
        assert_eq!(config.dispatch.inter_batch_delay_ms, 500);
        assert_eq!(config.shortener.timeout_secs, 10);
        assert_eq!(
            config.shortener.providers,
            vec![ShortenerKind::TinyUrl, ShortenerKind::IsGd, ShortenerKind::CleanUri]
        );
    }

    #[test]
    fn toml_patch_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp config");
        writeln!(
            file,
            r#"
[database]
url = "sqlite::memory:"

[dispatch]
batch_size = 10
inter_batch_delay_ms = 50

[logging]
level = "debug"
format = "json"

[[email.providers]]
kind = "mailgun"
api_key = "key-test"
domain = "mg.example.com"
"#
        )
        .expect("write temp config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("load config");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.dispatch.batch_size, 10);
        assert_eq!(config.dispatch.inter_batch_delay_ms, 50);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.email.providers,
            vec![EmailProviderConfig::Mailgun {
                api_key: "key-test".to_string(),
                domain: "mg.example.com".to_string(),
            }]
        );
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("definitely-not-here.toml".into()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn programmatic_overrides_win() {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_model: Some("llama3.1".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("load config");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.llm.model, "llama3.1");
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = AppConfig::default();
        config.dispatch.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.llm.temperature = 3.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.shortener.providers.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.url = "postgres://nope".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_mailgun_domain_is_rejected() {
        let mut config = AppConfig::default();
        config.email.providers = vec![EmailProviderConfig::Mailgun {
            api_key: "key".to_string(),
            domain: "  ".to_string(),
        }];
        assert!(config.validate().is_err());
    }
}
