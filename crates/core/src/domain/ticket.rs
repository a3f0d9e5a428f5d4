use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const TOPIC_OWNER_PREFIX: &str = "UserID:";
const MAX_CHANNEL_NAME_CHARS: usize = 90;
/// A `Creating` reservation older than this is assumed abandoned.
pub const RESERVATION_TIMEOUT_SECS: i64 = 120;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    GeneralSupport,
    PurchaseIssue,
    BugReport,
    OtherQuestion,
}

impl TicketCategory {
    pub const ALL: [Self; 4] =
        [Self::GeneralSupport, Self::PurchaseIssue, Self::BugReport, Self::OtherQuestion];

    pub fn key(self) -> &'static str {
        match self {
            Self::GeneralSupport => "general_support",
            Self::PurchaseIssue => "purchase_issue",
            Self::BugReport => "bug_report",
            Self::OtherQuestion => "other_question",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::GeneralSupport => "General Support",
            Self::PurchaseIssue => "Purchase/Order Issue",
            Self::BugReport => "Bug/Technical Issue",
            Self::OtherQuestion => "Other Question",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::GeneralSupport => "Questions about the server or how things work",
            Self::PurchaseIssue => "Problems with a payment, order or delivery",
            Self::BugReport => "Something is broken or behaving strangely",
            Self::OtherQuestion => "Anything that does not fit the other categories",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::GeneralSupport => "💬",
            Self::PurchaseIssue => "🛒",
            Self::BugReport => "🐞",
            Self::OtherQuestion => "❓",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let normalized = key.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|category| category.key() == normalized)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Creating,
    Open,
    Closing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRecord {
    pub owner_id: String,
    pub owner_name: String,
    pub category: TicketCategory,
    pub status: TicketStatus,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TicketRecord {
    pub fn reserve(
        owner_id: impl Into<String>,
        owner_name: impl Into<String>,
        category: TicketCategory,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            owner_name: owner_name.into(),
            category,
            status: TicketStatus::Creating,
            channel_id: None,
            created_at,
        }
    }

    pub fn is_stale_reservation(&self, now: DateTime<Utc>) -> bool {
        self.status == TicketStatus::Creating
            && now - self.created_at > Duration::seconds(RESERVATION_TIMEOUT_SECS)
    }
}

pub fn ticket_topic(owner_id: &str, category: TicketCategory) -> String {
    format!("{TOPIC_OWNER_PREFIX}{owner_id} | Type: {}", category.label())
}

/// Recovers the owner id written by [`ticket_topic`].
pub fn owner_from_topic(topic: &str) -> Option<&str> {
    let start = topic.find(TOPIC_OWNER_PREFIX)? + TOPIC_OWNER_PREFIX.len();
    let rest = topic[start..].trim_start();
    let end = rest.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(rest.len());
    let owner = &rest[..end];
    (!owner.is_empty()).then_some(owner)
}

pub fn ticket_channel_name(username: &str) -> String {
    let mut slug = String::with_capacity(username.len());
    for ch in username.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "user" } else { slug };

    let mut name = format!("ticket-{slug}");
    name.truncate(MAX_CHANNEL_NAME_CHARS);
    name
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{
        owner_from_topic, ticket_channel_name, ticket_topic, TicketCategory, TicketRecord,
        TicketStatus,
    };

    #[test]
    fn only_old_creating_reservations_are_stale() {
        let now = Utc::now();
        let fresh = TicketRecord::reserve("1", "a", TicketCategory::BugReport, now);
        assert!(!fresh.is_stale_reservation(now + Duration::seconds(30)));
        assert!(fresh.is_stale_reservation(now + Duration::seconds(600)));

        let open = TicketRecord { status: TicketStatus::Open, ..fresh };
        assert!(!open.is_stale_reservation(now + Duration::seconds(600)));
    }

    #[test]
    fn topic_round_trips_owner_id() {
        let topic = ticket_topic("123456789012345678", TicketCategory::BugReport);
        assert_eq!(topic, "UserID:123456789012345678 | Type: Bug/Technical Issue");
        assert_eq!(owner_from_topic(&topic), Some("123456789012345678"));
    }

    #[test]
    fn owner_parse_does_not_match_id_prefixes() {
        let topic = ticket_topic("1234", TicketCategory::GeneralSupport);
        assert_ne!(owner_from_topic(&topic), Some("123"));
    }

    #[test]
    fn owner_parse_rejects_topics_without_marker() {
        assert_eq!(owner_from_topic("General chat"), None);
        assert_eq!(owner_from_topic("UserID: | Type: Other"), None);
        assert_eq!(owner_from_topic("Support ticket UserID: 42"), Some("42"));
    }

    #[test]
    fn categories_resolve_from_menu_keys() {
        for category in TicketCategory::ALL {
            assert_eq!(TicketCategory::from_key(category.key()), Some(category));
        }
        assert_eq!(TicketCategory::from_key("PURCHASE_ISSUE"), Some(TicketCategory::PurchaseIssue));
        assert_eq!(TicketCategory::from_key("refund"), None);
    }

    #[test]
    fn channel_names_are_slugged() {
        assert_eq!(ticket_channel_name("Alice Smith"), "ticket-alice-smith");
        assert_eq!(ticket_channel_name("__Bob__"), "ticket-bob");
        assert_eq!(ticket_channel_name("✨✨"), "ticket-user");
        assert!(ticket_channel_name(&"a".repeat(200)).len() <= 90);
    }
}
