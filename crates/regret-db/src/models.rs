//! Row types map directly to SQLite rows; write models carry validated input
//! into the store. API-facing types live in regret-types.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regret_types::models::{
    AnonymityLevel, Confession, ContentType, Emotion, GeoPoint, Reactions, Role, User,
};
use uuid::Uuid;

use crate::parse_timestamp;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
    pub last_login: Option<String>,
}

impl UserRow {
    pub fn into_model(self) -> Result<User> {
        Ok(User {
            id: self.id.parse().with_context(|| format!("corrupt user id '{}'", self.id))?,
            role: self.role.parse::<Role>()?,
            created_at: parse_timestamp(&self.created_at)?,
            last_login: self.last_login.as_deref().map(parse_timestamp).transpose()?,
            username: self.username,
            email: self.email,
        })
    }
}

pub struct ConfessionRow {
    pub id: String,
    pub content: String,
    pub audio_content: Option<String>,
    pub content_type: String,
    pub emotions: String,
    pub anonymity_level: String,
    pub is_public: bool,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub tags: String,
    pub empathy: i64,
    pub support: i64,
    pub relate: i64,
    pub author_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ConfessionRow {
    pub fn into_model(self) -> Result<Confession> {
        let id: Uuid = self
            .id
            .parse()
            .with_context(|| format!("corrupt confession id '{}'", self.id))?;

        let location = match (self.longitude, self.latitude) {
            (Some(lon), Some(lat)) => GeoPoint::new(lon, lat),
            _ => None,
        };

        Ok(Confession {
            id,
            content: self.content,
            audio_content: self.audio_content,
            content_type: self.content_type.parse::<ContentType>()?,
            emotions: serde_json::from_str::<Vec<Emotion>>(&self.emotions)
                .with_context(|| format!("corrupt emotions on confession {}", id))?,
            anonymity_level: self.anonymity_level.parse::<AnonymityLevel>()?,
            is_public: self.is_public,
            location,
            tags: serde_json::from_str(&self.tags)
                .with_context(|| format!("corrupt tags on confession {}", id))?,
            reactions: Reactions {
                empathy: self.empathy.max(0) as u64,
                support: self.support.max(0) as u64,
                relate: self.relate.max(0) as u64,
            },
            author: self
                .author_id
                .as_deref()
                .map(str::parse)
                .transpose()
                .with_context(|| format!("corrupt author on confession {}", id))?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// A validated submission. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConfession {
    pub content: String,
    pub audio_content: Option<String>,
    pub content_type: ContentType,
    pub emotions: Vec<Emotion>,
    pub anonymity_level: AnonymityLevel,
    pub is_public: bool,
    pub location: Option<GeoPoint>,
    pub tags: Vec<String>,
    pub author: Option<Uuid>,
}

/// Validated edit. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfessionPatch {
    pub content: Option<String>,
    pub emotions: Option<Vec<Emotion>>,
    pub anonymity_level: Option<AnonymityLevel>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
}

impl ConfessionPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub(crate) fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Paginated listing of public confessions.
#[derive(Debug, Clone)]
pub struct ListQuery {
    /// 1-based
    pub page: u32,
    pub limit: u32,
    pub sort_by: SortField,
    pub order: SortOrder,
    /// Match confessions tagged with any of these
    pub emotions: Vec<Emotion>,
    pub since: Option<DateTime<Utc>>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            sort_by: SortField::default(),
            order: SortOrder::default(),
            emotions: Vec::new(),
            since: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfessionPageRows {
    pub total: u64,
    pub total_pages: u64,
    pub page: u32,
    pub confessions: Vec<Confession>,
}
