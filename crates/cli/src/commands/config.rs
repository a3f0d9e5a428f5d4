use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use helpdesk_core::config::{resolve_config_path, AppConfig};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{load_config, CommandResult, EXIT_OK};

struct ConfigField<'a> {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: &'a str,
}

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    CommandResult { exit_code: EXIT_OK, output: render(&config) }
}

pub fn render(config: &AppConfig) -> String {
    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let token = redact_token(config.discord.token.expose_secret());
    let embed_color = format!("#{:06X}", config.branding.embed_color);
    let port = config.server.port.to_string();
    let static_dir = config.server.static_dir.display().to_string();
    let data_path = config.storage.data_path.display().to_string();
    let close_delay = config.timing.ticket_close_delay_secs.to_string();
    let notice_ttl = config.timing.notice_ttl_secs.to_string();
    let log_format = format!("{:?}", config.logging.format);

    let fields = [
        ConfigField {
            key_path: "discord.token",
            env_keys: &["HELPDESK_DISCORD_TOKEN"],
            value: &token,
        },
        ConfigField {
            key_path: "discord.staff_role_id",
            env_keys: &["HELPDESK_DISCORD_STAFF_ROLE_ID"],
            value: &config.discord.staff_role_id,
        },
        ConfigField {
            key_path: "discord.log_channel_id",
            env_keys: &["HELPDESK_DISCORD_LOG_CHANNEL_ID"],
            value: &config.discord.log_channel_id,
        },
        ConfigField {
            key_path: "discord.ticket_category_id",
            env_keys: &["HELPDESK_DISCORD_TICKET_CATEGORY_ID"],
            value: &config.discord.ticket_category_id,
        },
        ConfigField {
            key_path: "branding.embed_color",
            env_keys: &["HELPDESK_BRANDING_EMBED_COLOR"],
            value: &embed_color,
        },
        ConfigField {
            key_path: "branding.thumbnail_url",
            env_keys: &["HELPDESK_BRANDING_THUMBNAIL_URL"],
            value: config.branding.thumbnail_url.as_deref().unwrap_or("<unset>"),
        },
        ConfigField {
            key_path: "server.bind_address",
            env_keys: &["HELPDESK_SERVER_BIND_ADDRESS"],
            value: &config.server.bind_address,
        },
        ConfigField {
            key_path: "server.port",
            env_keys: &["HELPDESK_SERVER_PORT", "PORT"],
            value: &port,
        },
        ConfigField {
            key_path: "server.static_dir",
            env_keys: &["HELPDESK_SERVER_STATIC_DIR"],
            value: &static_dir,
        },
        ConfigField {
            key_path: "storage.data_path",
            env_keys: &["HELPDESK_STORAGE_DATA_PATH"],
            value: &data_path,
        },
        ConfigField {
            key_path: "timing.ticket_close_delay_secs",
            env_keys: &["HELPDESK_TIMING_TICKET_CLOSE_DELAY_SECS"],
            value: &close_delay,
        },
        ConfigField {
            key_path: "timing.notice_ttl_secs",
            env_keys: &["HELPDESK_TIMING_NOTICE_TTL_SECS"],
            value: &notice_ttl,
        },
        ConfigField {
            key_path: "logging.level",
            env_keys: &["HELPDESK_LOGGING_LEVEL", "HELPDESK_LOG_LEVEL"],
            value: &config.logging.level,
        },
        ConfigField {
            key_path: "logging.format",
            env_keys: &["HELPDESK_LOGGING_FORMAT", "HELPDESK_LOG_FORMAT"],
            value: &log_format,
        },
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in &fields {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, field.value, source));
    }
    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

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
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("config file"));
            return format!("file ({})", file_path.display());
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

/// Bot tokens start with a base64 user id segment; only that part is shown.
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

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_token};

    #[test]
    fn tokens_never_render_their_secret_segments() {
        assert_eq!(redact_token("MTIz.abc.def"), "MTIz.***");
        assert_eq!(redact_token("opaque"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_config_documents() {
        let doc: Value = "[server]\nport = 8080\n".parse().expect("toml");
        assert!(contains_path(&doc, "server.port"));
        assert!(!contains_path(&doc, "server.static_dir"));
        assert!(!contains_path(&doc, "discord.token"));
    }
}
