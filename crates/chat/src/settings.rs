use std::time::Duration;

use helpdesk_core::config::AppConfig;

use crate::components::Branding;

/// The slice of [`AppConfig`] the chat handlers read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotSettings {
    pub staff_role_id: String,
    pub log_channel_id: String,
    pub ticket_category_id: String,
    pub branding: Branding,
    pub ticket_close_delay: Duration,
    pub notice_ttl: Duration,
}

impl BotSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            staff_role_id: config.discord.staff_role_id.clone(),
            log_channel_id: config.discord.log_channel_id.clone(),
            ticket_category_id: config.discord.ticket_category_id.clone(),
            branding: Branding {
                color: config.branding.embed_color,
                thumbnail_url: config.branding.thumbnail_url.clone(),
            },
            ticket_close_delay: Duration::from_secs(config.timing.ticket_close_delay_secs),
            notice_ttl: Duration::from_secs(config.timing.notice_ttl_secs),
        }
    }

    pub fn is_staff(&self, role_ids: &[String]) -> bool {
        role_ids.iter().any(|role_id| role_id == &self.staff_role_id)
    }
}

#[cfg(test)]
pub(crate) fn test_settings() -> BotSettings {
    BotSettings {
        staff_role_id: "500".to_owned(),
        log_channel_id: "600".to_owned(),
        ticket_category_id: "700".to_owned(),
        branding: Branding { color: 0x5865F2, thumbnail_url: None },
        ticket_close_delay: Duration::from_secs(5),
        notice_ttl: Duration::from_secs(5),
    }
}
