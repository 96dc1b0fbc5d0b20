//! On-disk record types for the interaction store.
//!
//! Field names and the timestamp format match existing account data, so
//! files written by earlier tooling load unchanged. Keys this crate does not
//! know about are kept in `extra` and written back untouched.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timestamp format used in every store file.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Serde adapter for optional timestamps in [`TIMESTAMP_FORMAT`].
pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    /// Parse a stored timestamp; fractional seconds are optional.
    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok()
    }

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) => parse(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{s}'"))),
        }
    }

    /// Same format for non-optional fields.
    pub mod required {
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        use super::{parse, TIMESTAMP_FORMAT};

        pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = String::deserialize(deserializer)?;
            parse(&raw)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
        }
    }
}

// ============================================================================
// Following status
// ============================================================================

/// Relationship between the operator and a stored user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowingStatus {
    #[default]
    None,
    Followed,
    /// Follow request sent to a private account
    Requested,
    Unfollowed,
    Scraped,
    /// No record exists. Returned by lookups, never stored.
    NotInList,
}

impl FollowingStatus {
    /// Status implied by the flags of a single interaction.
    ///
    /// Precedence is followed > unfollowed > scraped > none. A follow on a
    /// private account resolves to `Requested`.
    #[must_use]
    pub fn from_flags(followed: bool, unfollowed: bool, scraped: bool, is_private: bool) -> Self {
        if followed {
            if is_private {
                Self::Requested
            } else {
                Self::Followed
            }
        } else if unfollowed {
            Self::Unfollowed
        } else if scraped {
            Self::Scraped
        } else {
            Self::None
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Followed => "followed",
            Self::Requested => "requested",
            Self::Unfollowed => "unfollowed",
            Self::Scraped => "scraped",
            Self::NotInList => "not_in_list",
        }
    }
}

impl std::fmt::Display for FollowingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Interaction record
// ============================================================================

/// Everything ever done to one user, accumulated across sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    #[serde(default)]
    pub liked: u32,
    #[serde(default)]
    pub watched: u32,
    #[serde(default)]
    pub commented: u32,
    #[serde(default)]
    pub followed: bool,
    #[serde(default)]
    pub unfollowed: bool,
    #[serde(default)]
    pub scraped: bool,
    #[serde(default)]
    pub pm_sent: bool,
    #[serde(default)]
    pub welcomed: bool,
    #[serde(default = "default_exists")]
    pub exists: bool,
    #[serde(default)]
    pub following_status: FollowingStatus,
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub last_interaction: Option<NaiveDateTime>,
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub last_check: Option<NaiveDateTime>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    /// Keys written by other tools, preserved on rewrite.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_exists() -> bool {
    true
}

impl InteractionRecord {
    /// True if any interaction flag or count is set.
    #[must_use]
    pub fn has_interaction(&self) -> bool {
        self.liked > 0
            || self.watched > 0
            || self.commented > 0
            || self.followed
            || self.unfollowed
            || self.scraped
            || self.pm_sent
            || self.welcomed
    }
}

// ============================================================================
// Filter history
// ============================================================================

/// Why a profile was skipped, as reported by the job that evaluated it.
///
/// Stored as an upper-case name such as `PRIVATE_ACCOUNT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipReason(String);

impl SkipReason {
    #[must_use]
    pub fn new(reason: impl AsRef<str>) -> Self {
        Self(reason.as_ref().trim().to_uppercase().replace([' ', '-'], "_"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How `record_filter` treats the stored skip reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipUpdate {
    /// The profile passed the filter; store a null reason
    Clear,
    /// Keep whatever reason was stored before
    Preserve,
    /// The profile was skipped for this reason
    Set(SkipReason),
}

impl SkipUpdate {
    /// Read a reason as job drivers report it: absent or null clears, an
    /// empty string preserves and anything else sets.
    #[must_use]
    pub fn from_reason(reason: Option<&str>) -> Self {
        match reason {
            None => Self::Clear,
            Some(r) if r.trim().is_empty() => Self::Preserve,
            Some(r) => Self::Set(SkipReason::new(r)),
        }
    }
}

/// Label of the follow button shown on a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FollowButtonText {
    Follow,
    FollowBack,
    Following,
    Requested,
    Unblock,
    None,
}

/// Profile data captured when a user was evaluated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    #[serde(default)]
    pub followers: Option<u64>,
    #[serde(default)]
    pub followings: Option<u64>,
    #[serde(default)]
    pub posts: Option<u64>,
    #[serde(default)]
    pub is_private: Option<bool>,
    #[serde(default)]
    pub is_business: bool,
    #[serde(default)]
    pub is_restricted: bool,
    #[serde(default)]
    pub has_biography: bool,
    #[serde(default)]
    pub has_link_in_bio: bool,
    #[serde(default)]
    pub follow_button_text: Option<FollowButtonText>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of `history_filters_users.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRecord {
    #[serde(flatten)]
    pub profile: ProfileSnapshot,
    #[serde(default)]
    pub skip_reason: Option<SkipReason>,
    #[serde(default, with = "timestamp", rename = "datetime")]
    pub checked_at: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_following_status_precedence() {
        assert_eq!(
            FollowingStatus::from_flags(true, true, true, false),
            FollowingStatus::Followed
        );
        assert_eq!(
            FollowingStatus::from_flags(true, true, false, true),
            FollowingStatus::Requested
        );
        assert_eq!(
            FollowingStatus::from_flags(false, true, true, false),
            FollowingStatus::Unfollowed
        );
        assert_eq!(
            FollowingStatus::from_flags(false, false, true, false),
            FollowingStatus::Scraped
        );
        assert_eq!(
            FollowingStatus::from_flags(false, false, false, true),
            FollowingStatus::None
        );
    }

    #[test]
    fn test_skip_update_from_reason() {
        assert_eq!(SkipUpdate::from_reason(None), SkipUpdate::Clear);
        assert_eq!(SkipUpdate::from_reason(Some("")), SkipUpdate::Preserve);
        assert_eq!(
            SkipUpdate::from_reason(Some("private account")),
            SkipUpdate::Set(SkipReason::new("PRIVATE_ACCOUNT"))
        );
    }

    #[test]
    fn test_following_status_serializes_lowercase() {
        let json = serde_json::to_string(&FollowingStatus::Requested).expect("serialize");
        assert_eq!(json, "\"requested\"");
    }

    #[test]
    fn test_record_parses_existing_data_and_keeps_unknown_keys() {
        let raw = r#"{
            "exists": true,
            "last_interaction": "2024-03-01 14:22:05.123456",
            "session_id": "abc",
            "job_name": "blogger-followers",
            "target": "somebody",
            "liked": 2,
            "watched": 0,
            "commented": 0,
            "followed": true,
            "unfollowed": false,
            "scraped": false,
            "pm_sent": false,
            "following_status": "followed",
            "custom_note": "vip"
        }"#;
        let record: InteractionRecord = serde_json::from_str(raw).expect("parse record");
        assert_eq!(record.liked, 2);
        assert_eq!(record.following_status, FollowingStatus::Followed);
        assert_eq!(
            record.last_interaction,
            timestamp::parse("2024-03-01 14:22:05.123456")
        );

        let out = serde_json::to_value(&record).expect("serialize");
        assert_eq!(out["custom_note"], "vip");
        assert_eq!(out["last_interaction"], "2024-03-01 14:22:05.123456");
    }

    #[test]
    fn test_timestamp_without_fraction_parses() {
        assert!(timestamp::parse("2024-03-01 14:22:05").is_some());
        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn test_has_interaction() {
        assert!(!InteractionRecord::default().has_interaction());
        let record = InteractionRecord {
            watched: 1,
            ..InteractionRecord::default()
        };
        assert!(record.has_interaction());
    }

    #[test]
    fn test_skip_reason_normalized() {
        assert_eq!(SkipReason::new("private account").as_str(), "PRIVATE_ACCOUNT");
        let json = serde_json::to_string(&SkipReason::new("blacklisted")).expect("serialize");
        assert_eq!(json, "\"BLACKLISTED\"");
    }

    #[test]
    fn test_filter_record_uses_datetime_key() {
        let raw = r#"{
            "followers": 120,
            "followings": 80,
            "posts": 3,
            "is_private": false,
            "is_restricted": false,
            "follow_button_text": "FOLLOW",
            "skip_reason": null,
            "datetime": "2024-03-01 10:00:00.000001"
        }"#;
        let record: FilterRecord = serde_json::from_str(raw).expect("parse filter record");
        assert_eq!(record.profile.followers, Some(120));
        assert_eq!(
            record.profile.follow_button_text,
            Some(FollowButtonText::Follow)
        );
        assert!(record.skip_reason.is_none());
        assert!(record.checked_at.is_some());
    }
}
