use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_EMBED_COLOR: u32 = 0x5865F2;
pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["helpdesk.toml", "config/helpdesk.toml"];
const MAX_DELAY_SECS: u64 = 300;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub branding: BrandingConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub token: SecretString,
    pub staff_role_id: String,
    pub log_channel_id: String,
    pub ticket_category_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrandingConfig {
    pub embed_color: u32,
    pub thumbnail_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    pub data_path: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingConfig {
    pub ticket_close_delay_secs: u64,
    pub notice_ttl_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
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
    pub discord_token: Option<String>,
    pub data_path: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
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
                token: String::new().into(),
                staff_role_id: String::new(),
                log_channel_id: String::new(),
                ticket_category_id: String::new(),
            },
            branding: BrandingConfig { embed_color: DEFAULT_EMBED_COLOR, thumbnail_url: None },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3000,
                static_dir: PathBuf::from("public"),
            },
            storage: StorageConfig { data_path: PathBuf::from("data/store.json") },
            timing: TimingConfig { ticket_close_delay_secs: 5, notice_ttl_secs: 5 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
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

/// Accepts `#RRGGBB`, `0xRRGGBB` or a plain decimal value.
pub fn parse_embed_color(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    let parsed = if let Some(hex) = trimmed.strip_prefix('#') {
        (hex.len() == 6).then(|| u32::from_str_radix(hex, 16).ok()).flatten()
    } else if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        trimmed.parse::<u32>().ok()
    };
    parsed.filter(|value| *value <= 0xFF_FF_FF)
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(discord) = patch.discord {
            if let Some(token) = discord.token {
                self.discord.token = token.into();
            }
            if let Some(staff_role_id) = discord.staff_role_id {
                self.discord.staff_role_id = staff_role_id.into_string();
            }
            if let Some(log_channel_id) = discord.log_channel_id {
                self.discord.log_channel_id = log_channel_id.into_string();
            }
            if let Some(ticket_category_id) = discord.ticket_category_id {
                self.discord.ticket_category_id = ticket_category_id.into_string();
            }
        }

        if let Some(branding) = patch.branding {
            if let Some(embed_color) = branding.embed_color {
                let raw = embed_color.into_string();
                self.branding.embed_color = parse_embed_color(&raw).ok_or_else(|| {
                    ConfigError::Validation(format!(
                        "branding.embed_color `{raw}` must be #RRGGBB, 0xRRGGBB or a decimal color"
                    ))
                })?;
            }
            if let Some(thumbnail_url) = branding.thumbnail_url {
                self.branding.thumbnail_url = Some(thumbnail_url);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(static_dir) = server.static_dir {
                self.server.static_dir = static_dir;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(data_path) = storage.data_path {
                self.storage.data_path = data_path;
            }
        }

        if let Some(timing) = patch.timing {
            if let Some(delay) = timing.ticket_close_delay_secs {
                self.timing.ticket_close_delay_secs = delay;
            }
            if let Some(ttl) = timing.notice_ttl_secs {
                self.timing.notice_ttl_secs = ttl;
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

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HELPDESK_DISCORD_TOKEN") {
            self.discord.token = value.into();
        }
        if let Some(value) = read_env("HELPDESK_DISCORD_STAFF_ROLE_ID") {
            self.discord.staff_role_id = value;
        }
        if let Some(value) = read_env("HELPDESK_DISCORD_LOG_CHANNEL_ID") {
            self.discord.log_channel_id = value;
        }
        if let Some(value) = read_env("HELPDESK_DISCORD_TICKET_CATEGORY_ID") {
            self.discord.ticket_category_id = value;
        }

        if let Some(value) = read_env("HELPDESK_BRANDING_EMBED_COLOR") {
            self.branding.embed_color = parse_embed_color(&value).ok_or_else(|| {
                ConfigError::InvalidEnvOverride {
                    key: "HELPDESK_BRANDING_EMBED_COLOR".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("HELPDESK_BRANDING_THUMBNAIL_URL") {
            self.branding.thumbnail_url = Some(value);
        }

        if let Some(value) = read_env("HELPDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PORT") {
            self.server.port = parse_u16("PORT", &value)?;
        }
        if let Some(value) = read_env("HELPDESK_SERVER_PORT") {
            self.server.port = parse_u16("HELPDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("HELPDESK_SERVER_STATIC_DIR") {
            self.server.static_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("HELPDESK_STORAGE_DATA_PATH") {
            self.storage.data_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("HELPDESK_TIMING_TICKET_CLOSE_DELAY_SECS") {
            self.timing.ticket_close_delay_secs =
                parse_u64("HELPDESK_TIMING_TICKET_CLOSE_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("HELPDESK_TIMING_NOTICE_TTL_SECS") {
            self.timing.notice_ttl_secs = parse_u64("HELPDESK_TIMING_NOTICE_TTL_SECS", &value)?;
        }

        let log_level =
            read_env("HELPDESK_LOGGING_LEVEL").or_else(|| read_env("HELPDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HELPDESK_LOGGING_FORMAT").or_else(|| read_env("HELPDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(token) = overrides.discord_token {
            self.discord.token = token.into();
        }
        if let Some(data_path) = overrides.data_path {
            self.storage.data_path = data_path;
        }
        if let Some(static_dir) = overrides.static_dir {
            self.server.static_dir = static_dir;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_discord(&self.discord)?;
        validate_branding(&self.branding)?;
        validate_server(&self.server)?;
        validate_storage(&self.storage)?;
        validate_timing(&self.timing)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn validate_discord(discord: &DiscordConfig) -> Result<(), ConfigError> {
    let token = discord.token.expose_secret();
    if token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "discord.token is required. Copy it from the Developer Portal > Your App > Bot > Token"
                .to_string(),
        ));
    }
    if token.chars().any(char::is_whitespace) {
        let hint = if token.starts_with("Bot ") {
            " (hint: drop the `Bot ` prefix, it is added automatically)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "discord.token must not contain whitespace{hint}"
        )));
    }

    validate_snowflake("discord.staff_role_id", &discord.staff_role_id)?;
    validate_snowflake("discord.log_channel_id", &discord.log_channel_id)?;
    validate_snowflake("discord.ticket_category_id", &discord.ticket_category_id)?;
    Ok(())
}

fn validate_snowflake(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "{field} is required. Enable Developer Mode in the client and use Copy ID"
        )));
    }
    if !value.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ConfigError::Validation(format!(
            "{field} must be a numeric id, got `{value}` (hint: copy the id, not the name or mention)"
        )));
    }
    Ok(())
}

fn validate_branding(branding: &BrandingConfig) -> Result<(), ConfigError> {
    if let Some(url) = &branding.thumbnail_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "branding.thumbnail_url must start with http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }
    if server.static_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("server.static_dir must not be empty".to_string()));
    }
    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.data_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("storage.data_path must not be empty".to_string()));
    }
    Ok(())
}

fn validate_timing(timing: &TimingConfig) -> Result<(), ConfigError> {
    if timing.ticket_close_delay_secs == 0 || timing.ticket_close_delay_secs > MAX_DELAY_SECS {
        return Err(ConfigError::Validation(format!(
            "timing.ticket_close_delay_secs must be in range 1..={MAX_DELAY_SECS}"
        )));
    }
    if timing.notice_ttl_secs == 0 || timing.notice_ttl_secs > MAX_DELAY_SECS {
        return Err(ConfigError::Validation(format!(
            "timing.notice_ttl_secs must be in range 1..={MAX_DELAY_SECS}"
        )));
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
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

/// Ids and colors may be written either as TOML strings or bare integers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Text(String),
    Number(u64),
}

impl StringOrNumber {
    fn into_string(self) -> String {
        match self {
            Self::Text(value) => value,
            Self::Number(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    discord: Option<DiscordPatch>,
    branding: Option<BrandingPatch>,
    server: Option<ServerPatch>,
    storage: Option<StoragePatch>,
    timing: Option<TimingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordPatch {
    token: Option<String>,
    staff_role_id: Option<StringOrNumber>,
    log_channel_id: Option<StringOrNumber>,
    ticket_category_id: Option<StringOrNumber>,
}

#[derive(Debug, Default, Deserialize)]
struct BrandingPatch {
    embed_color: Option<StringOrNumber>,
    thumbnail_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    data_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct TimingPatch {
    ticket_close_delay_secs: Option<u64>,
    notice_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
