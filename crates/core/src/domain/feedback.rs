use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
pub const MAX_COMMENT_CHARS: usize = 1000;

/// Star rating attached to a feedback submission, always within `1..=5`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub fn new(value: u8) -> Result<Self, DomainError> {
        if (MIN_RATING..=MAX_RATING).contains(&value) {
            Ok(Self(value))
        } else {
            Err(DomainError::InvalidRating(value.to_string()))
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        let value =
            trimmed.parse::<u8>().map_err(|_| DomainError::InvalidRating(trimmed.to_owned()))?;
        Self::new(value)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn stars(self) -> String {
        format!("{}{}", "★".repeat(self.0 as usize), "☆".repeat((MAX_RATING - self.0) as usize))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientPlatform {
    Mobile,
    Desktop,
    Web,
    Unknown,
}

impl ClientPlatform {
    pub fn label(self) -> &'static str {
        match self {
            Self::Mobile => "Mobile",
            Self::Desktop => "Desktop",
            Self::Web => "Web",
            Self::Unknown => "Unknown",
        }
    }
}

/// Validated modal input, ready to be turned into a [`FeedbackRecord`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedbackDraft {
    pub rating: Rating,
    pub comment: Option<String>,
}

impl FeedbackDraft {
    pub fn from_form(rating: &str, comment: Option<&str>) -> Result<Self, DomainError> {
        let rating = Rating::parse(rating)?;
        let comment = match comment.map(str::trim).filter(|text| !text.is_empty()) {
            Some(text) if text.chars().count() > MAX_COMMENT_CHARS => {
                return Err(DomainError::CommentTooLong { max: MAX_COMMENT_CHARS });
            }
            Some(text) => Some(text.to_owned()),
            None => None,
        };

        Ok(Self { rating, comment })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    /// Empty for records written before ids existed until the store backfills them.
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub rating: Rating,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub platform: Option<ClientPlatform>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl FeedbackRecord {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        draft: FeedbackDraft,
        platform: Option<ClientPlatform>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_record_id(),
            user_id: user_id.into(),
            username: username.into(),
            rating: draft.rating,
            comment: draft.comment,
            platform,
            created_at,
            message_id: None,
            channel_id: None,
        }
    }

    pub fn is_linked_to(&self, message_id: &str) -> bool {
        self.message_id.as_deref() == Some(message_id)
    }

    /// Assigns a fresh id when the record has none. Returns whether it did.
    pub fn ensure_id(&mut self) -> bool {
        if !self.id.is_empty() {
            return false;
        }
        self.id = generate_record_id();
        true
    }
}

fn generate_record_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ClientPlatform, FeedbackDraft, FeedbackRecord, Rating, MAX_COMMENT_CHARS};
    use crate::errors::DomainError;

    #[test]
    fn rating_accepts_only_one_through_five() {
        for value in 1..=5 {
            assert_eq!(Rating::new(value).expect("valid rating").value(), value);
        }
        assert!(matches!(Rating::new(0), Err(DomainError::InvalidRating(_))));
        assert!(matches!(Rating::new(6), Err(DomainError::InvalidRating(_))));
    }

    #[test]
    fn rating_parse_rejects_non_numeric_input() {
        assert_eq!(Rating::parse(" 4 ").expect("trimmed rating").value(), 4);
        assert!(matches!(
            Rating::parse("great"),
            Err(DomainError::InvalidRating(ref raw)) if raw == "great"
        ));
        assert!(Rating::parse("").is_err());
        assert!(Rating::parse("-1").is_err());
        assert!(Rating::parse("4.5").is_err());
    }

    #[test]
    fn stars_render_filled_and_empty_slots() {
        assert_eq!(Rating::new(3).expect("rating").stars(), "★★★☆☆");
    }

    #[test]
    fn draft_drops_blank_comments_and_caps_length() {
        let draft = FeedbackDraft::from_form("5", Some("   ")).expect("draft");
        assert_eq!(draft.comment, None);

        let draft = FeedbackDraft::from_form("2", Some(" slow replies ")).expect("draft");
        assert_eq!(draft.comment.as_deref(), Some("slow replies"));

        let long = "x".repeat(MAX_COMMENT_CHARS + 1);
        assert!(matches!(
            FeedbackDraft::from_form("2", Some(&long)),
            Err(DomainError::CommentTooLong { .. })
        ));
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let draft = FeedbackDraft::from_form("4", Some("great")).expect("draft");
        let record =
            FeedbackRecord::new("42", "alice", draft, Some(ClientPlatform::Desktop), Utc::now());
        let json = serde_json::to_value(&record).expect("serialize record");

        assert_eq!(json["userId"], "42");
        assert_eq!(json["rating"], 4);
        assert_eq!(json["platform"], "Desktop");
        assert!(json["messageId"].is_null());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn legacy_record_without_id_is_assigned_one_once() {
        let json = r#"{
            "userId": "7",
            "username": "bob",
            "rating": 2,
            "createdAt": "2025-01-01T00:00:00Z",
            "messageId": "900"
        }"#;
        let mut record: FeedbackRecord = serde_json::from_str(json).expect("legacy record");
        assert!(record.id.is_empty());
        assert!(record.is_linked_to("900"));
        assert_eq!(record.comment, None);

        assert!(record.ensure_id());
        let assigned = record.id.clone();
        assert!(!assigned.is_empty());
        assert!(!record.ensure_id());
        assert_eq!(record.id, assigned);
    }
}
