use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Distinguishes an absent PATCH field (leave unchanged) from an explicit
/// null (clear the column).
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

pub type Id = Uuid;

/// Character budget shared by entry and comment bodies. Counted in
/// characters, not bytes (most content is Japanese).
pub const MAX_CONTENT_CHARS: usize = 280;

/// Closed set of emotion tags an entry may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    // negative
    Fear,
    Sadness,
    Anger,
    Disgust,
    Indifference,
    Guilt,
    Loneliness,
    Shame,
    // positive
    Joy,
    Gratitude,
    Achievement,
    Happiness,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Fear => "fear",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Disgust => "disgust",
            Emotion::Indifference => "indifference",
            Emotion::Guilt => "guilt",
            Emotion::Loneliness => "loneliness",
            Emotion::Shame => "shame",
            Emotion::Joy => "joy",
            Emotion::Gratitude => "gratitude",
            Emotion::Achievement => "achievement",
            Emotion::Happiness => "happiness",
        }
    }
}

impl std::str::FromStr for Emotion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "fear" => Emotion::Fear,
            "sadness" => Emotion::Sadness,
            "anger" => Emotion::Anger,
            "disgust" => Emotion::Disgust,
            "indifference" => Emotion::Indifference,
            "guilt" => Emotion::Guilt,
            "loneliness" => Emotion::Loneliness,
            "shame" => Emotion::Shame,
            "joy" => Emotion::Joy,
            "gratitude" => Emotion::Gratitude,
            "achievement" => Emotion::Achievement,
            "happiness" => Emotion::Happiness,
            _ => return Err(()),
        })
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiaryEntry {
    pub id: Id,
    pub user_id: Option<String>,
    pub nickname: Option<String>, // null → rendered as anonymous
    pub content: String,
    pub emotion: Option<Emotion>,
    pub created_at: Option<DateTime<Utc>>, // set once at creation
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewDiaryEntry {
    pub user_id: Option<String>,
    pub nickname: Option<String>,
    pub content: String,
    pub emotion: Option<Emotion>,
    pub is_public: bool,
}

/// Partial update; only present fields are merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateDiaryEntry {
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub nickname: Option<Option<String>>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Option<Emotion>>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Comment {
    pub id: Id,
    pub diary_id: Id,
    pub user_id: Option<String>,
    pub nickname: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub diary_id: Id,
    pub user_id: Option<String>,
    pub nickname: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    pub id: String, // identity subject, e.g. "google:1234" or "admin:<email>"
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfile {
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emotion_round_trips_through_lowercase_names() {
        for tag in [
            "fear",
            "sadness",
            "anger",
            "disgust",
            "indifference",
            "guilt",
            "loneliness",
            "shame",
            "joy",
            "gratitude",
            "achievement",
            "happiness",
        ] {
            let e: Emotion = tag.parse().unwrap();
            assert_eq!(e.as_str(), tag);
            assert_eq!(serde_json::to_value(e).unwrap(), tag);
        }
        assert!("excited".parse::<Emotion>().is_err());
    }

    #[test]
    fn patch_payload_distinguishes_absent_from_null() {
        let upd: UpdateDiaryEntry = serde_json::from_str(r#"{"content":"X"}"#).unwrap();
        assert!(upd.nickname.is_none());
        assert_eq!(upd.content.as_deref(), Some("X"));

        let upd: UpdateDiaryEntry = serde_json::from_str(r#"{"nickname":null}"#).unwrap();
        assert_eq!(upd.nickname, Some(None));

        let upd: UpdateDiaryEntry = serde_json::from_str(r#"{"nickname":"太郎"}"#).unwrap();
        assert_eq!(upd.nickname, Some(Some("太郎".to_string())));
    }
}
