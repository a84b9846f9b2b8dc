use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned when a string does not name a variant of one of the closed vocabularies below.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownValue {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// Closed emotion vocabulary a confession can be tagged with.
    Emotion, "emotion" {
        Joy => "joy",
        Sadness => "sadness",
        Anger => "anger",
        Fear => "fear",
        Surprise => "surprise",
        Disgust => "disgust",
        Neutral => "neutral",
        Love => "love",
        Regret => "regret",
        Hope => "hope",
        Anxiety => "anxiety",
        Excitement => "excitement",
        Relief => "relief",
    }
}

string_enum! {
    /// What a confession reveals to other readers. Stored, not enforced.
    AnonymityLevel, "anonymity level" {
        Full => "full",
        Location => "location",
        Username => "username",
    }
}

string_enum! {
    ContentType, "content type" {
        Text => "text",
        Audio => "audio",
    }
}

string_enum! {
    ReactionType, "reaction type" {
        Empathy => "empathy",
        Support => "support",
        Relate => "relate",
    }
}

string_enum! {
    Role, "role" {
        User => "user",
        Admin => "admin",
    }
}

impl Default for AnonymityLevel {
    fn default() -> Self {
        Self::Full
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self::Text
    }
}

/// A WGS84 point. Only constructed through [`GeoPoint::new`], which enforces bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    /// Returns `None` unless `|longitude| <= 180` and `|latitude| <= 90`.
    pub fn new(longitude: f64, latitude: f64) -> Option<Self> {
        let valid = longitude.is_finite()
            && latitude.is_finite()
            && (-180.0..=180.0).contains(&longitude)
            && (-90.0..=90.0).contains(&latitude);
        valid.then_some(Self { longitude, latitude })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reactions {
    pub empathy: u64,
    pub support: u64,
    pub relate: u64,
}

impl Reactions {
    pub fn get(&self, reaction: ReactionType) -> u64 {
        match reaction {
            ReactionType::Empathy => self.empathy,
            ReactionType::Support => self.support,
            ReactionType::Relate => self.relate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confession {
    pub id: Uuid,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_content: Option<String>,
    pub content_type: ContentType,
    pub emotions: Vec<Emotion>,
    pub anonymity_level: AnonymityLevel,
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    pub tags: Vec<String>,
    pub reactions: Reactions,
    pub author: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}
