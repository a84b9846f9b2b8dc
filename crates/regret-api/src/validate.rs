//! Boundary checks for confession submissions and edits. Every check runs and
//! every failure is reported, so a client can fix all fields in one round trip.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use uuid::Uuid;

use regret_db::models::{ConfessionPatch, NewConfession};
use regret_types::api::{CreateConfessionRequest, LocationInput, UpdateConfessionRequest};
use regret_types::models::{AnonymityLevel, ContentType, Emotion, GeoPoint};

use crate::error::{ValidationCode, ValidationErrors};

/// Measured in characters after escaping.
pub const MAX_CONTENT_CHARS: usize = 1000;
pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_CHARS: usize = 50;

pub fn validate_submission(
    raw: CreateConfessionRequest,
    author: Option<Uuid>,
) -> Result<NewConfession, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let content_type = match raw.content_type.as_deref() {
        None => ContentType::default(),
        Some(value) => value.trim().to_lowercase().parse().unwrap_or_else(|e| {
            errors.push("contentType", ValidationCode::InvalidContentType, format!("{}", e));
            ContentType::default()
        }),
    };

    let (content, audio_content) = match content_type {
        ContentType::Text => {
            let content = check_content(raw.content.as_deref().unwrap_or(""), &mut errors);
            // Audio payloads only travel with audio confessions
            (content, None)
        }
        ContentType::Audio => {
            let audio = raw.audio_content.unwrap_or_default();
            if audio.trim().is_empty() {
                errors.push(
                    "audioContent",
                    ValidationCode::MissingContent,
                    "Audio confessions need audioContent",
                );
            } else if B64.decode(audio.trim()).is_err() {
                errors.push("audioContent", ValidationCode::InvalidAudio, "Invalid base64 audio content");
            }
            (String::new(), Some(audio.trim().to_string()))
        }
    };

    let emotions = parse_emotions(&raw.emotions, &mut errors);
    let anonymity_level = parse_anonymity(raw.anonymity_level.as_deref(), &mut errors)
        .unwrap_or_default();
    let tags = normalize_tags(&raw.tags, &mut errors);

    errors.finish(NewConfession {
        content,
        audio_content,
        content_type,
        emotions,
        anonymity_level,
        is_public: raw.is_public.unwrap_or(true),
        location: raw.location.as_ref().and_then(accept_location),
        tags,
        author,
    })
}

/// Same per-field rules as a submission; absent fields stay untouched.
pub fn validate_patch(raw: UpdateConfessionRequest) -> Result<ConfessionPatch, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let content = raw.content.as_deref().map(|c| check_content(c, &mut errors));
    let emotions = raw.emotions.as_deref().map(|e| parse_emotions(e, &mut errors));
    let anonymity_level = parse_anonymity(raw.anonymity_level.as_deref(), &mut errors);
    let tags = raw.tags.as_deref().map(|t| normalize_tags(t, &mut errors));

    errors.finish(ConfessionPatch {
        content,
        emotions,
        anonymity_level,
        tags,
        is_public: raw.is_public,
    })
}

/// Escapes the characters that could open markup or break out of an attribute.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            '`' => out.push_str("&#x60;"),
            other => out.push(other),
        }
    }
    out
}

fn check_content(raw: &str, errors: &mut ValidationErrors) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        errors.push("content", ValidationCode::MissingContent, "Confession content is required");
        return String::new();
    }

    let escaped = escape_html(trimmed);
    if escaped.chars().count() > MAX_CONTENT_CHARS {
        errors.push(
            "content",
            ValidationCode::ContentTooLong,
            format!("Confession must be at most {} characters", MAX_CONTENT_CHARS),
        );
    }
    escaped
}

fn parse_emotions(raw: &[String], errors: &mut ValidationErrors) -> Vec<Emotion> {
    let mut emotions = Vec::new();
    for value in raw {
        match value.trim().to_lowercase().parse::<Emotion>() {
            Ok(emotion) if !emotions.contains(&emotion) => emotions.push(emotion),
            Ok(_) => {}
            Err(_) => errors.push(
                "emotions",
                ValidationCode::InvalidEmotion,
                format!("Unknown emotion '{}'", value),
            ),
        }
    }
    emotions
}

fn parse_anonymity(raw: Option<&str>, errors: &mut ValidationErrors) -> Option<AnonymityLevel> {
    let value = raw?;
    match value.trim().to_lowercase().parse() {
        Ok(level) => Some(level),
        Err(_) => {
            errors.push(
                "anonymityLevel",
                ValidationCode::InvalidAnonymityLevel,
                format!("Unknown anonymity level '{}'", value),
            );
            None
        }
    }
}

fn normalize_tags(raw: &[String], errors: &mut ValidationErrors) -> Vec<String> {
    let tags: Vec<String> = raw
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    if tags.len() > MAX_TAGS {
        errors.push(
            "tags",
            ValidationCode::TooManyTags,
            format!("At most {} tags are allowed", MAX_TAGS),
        );
    }
    for tag in tags.iter().filter(|t| t.chars().count() > MAX_TAG_CHARS) {
        errors.push(
            "tags",
            ValidationCode::TagTooLong,
            format!("Tag '{}' is longer than {} characters", tag, MAX_TAG_CHARS),
        );
    }
    tags
}

/// Kept whole or dropped whole, never rejected.
fn accept_location(input: &LocationInput) -> Option<GeoPoint> {
    GeoPoint::new(input.longitude?, input.latitude?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> CreateConfessionRequest {
        CreateConfessionRequest {
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn minimal_text_submission_gets_defaults() {
        let new = validate_submission(text("  I regret this  "), None).unwrap();
        assert_eq!(new.content, "I regret this");
        assert_eq!(new.content_type, ContentType::Text);
        assert_eq!(new.anonymity_level, AnonymityLevel::Full);
        assert!(new.is_public);
        assert!(new.emotions.is_empty());
        assert!(new.location.is_none());
        assert!(new.author.is_none());
    }

    #[test]
    fn content_is_escaped() {
        let new = validate_submission(text("<b>\"hi\" & 'bye'</b>"), None).unwrap();
        assert_eq!(
            new.content,
            "&lt;b&gt;&quot;hi&quot; &amp; &#x27;bye&#x27;&lt;&#x2F;b&gt;"
        );
    }

    #[test]
    fn length_limit_applies_after_escaping() {
        assert!(validate_submission(text(&"a".repeat(MAX_CONTENT_CHARS)), None).is_ok());

        let errors = validate_submission(text(&"a".repeat(MAX_CONTENT_CHARS + 1)), None).unwrap_err();
        assert!(errors.has(ValidationCode::ContentTooLong));

        // 200 ampersands escape to 1000 characters; one more tips it over
        assert!(validate_submission(text(&"&".repeat(200)), None).is_ok());
        let errors = validate_submission(text(&"&".repeat(201)), None).unwrap_err();
        assert!(errors.has(ValidationCode::ContentTooLong));
    }

    #[test]
    fn multibyte_content_counts_characters() {
        assert!(validate_submission(text(&"é".repeat(MAX_CONTENT_CHARS)), None).is_ok());
    }

    #[test]
    fn blank_text_is_missing() {
        let errors = validate_submission(text("   \n\t"), None).unwrap_err();
        assert!(errors.has(ValidationCode::MissingContent));

        let errors = validate_submission(CreateConfessionRequest::default(), None).unwrap_err();
        assert!(errors.has(ValidationCode::MissingContent));
    }

    #[test]
    fn vocabulary_values_ignore_case_and_padding() {
        let raw = CreateConfessionRequest {
            content: Some("shouted".into()),
            emotions: vec![" Regret ".into()],
            anonymity_level: Some(" Full".into()),
            content_type: Some("TEXT ".into()),
            ..Default::default()
        };
        let new = validate_submission(raw, None).unwrap();
        assert_eq!(new.emotions, vec![Emotion::Regret]);
        assert_eq!(new.anonymity_level, AnonymityLevel::Full);
        assert_eq!(new.content_type, ContentType::Text);

        let patch = validate_patch(UpdateConfessionRequest {
            anonymity_level: Some("USERNAME".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(patch.anonymity_level, Some(AnonymityLevel::Username));
    }

    #[test]
    fn every_failure_is_reported() {
        let raw = CreateConfessionRequest {
            content: Some("x".repeat(1001)),
            emotions: vec!["regret".into(), "ennui".into()],
            anonymity_level: Some("partial".into()),
            content_type: Some("video".into()),
            ..Default::default()
        };
        let errors = validate_submission(raw, None).unwrap_err();
        assert!(errors.has(ValidationCode::ContentTooLong));
        assert!(errors.has(ValidationCode::InvalidEmotion));
        assert!(errors.has(ValidationCode::InvalidAnonymityLevel));
        assert!(errors.has(ValidationCode::InvalidContentType));
        assert!(errors.fields().iter().any(|e| e.message.contains("ennui")));
    }

    #[test]
    fn emotions_are_normalized_and_deduplicated() {
        let raw = CreateConfessionRequest {
            emotions: vec!["Regret".into(), "hope".into(), " regret ".into()],
            ..text("ok")
        };
        let new = validate_submission(raw, None).unwrap();
        assert_eq!(new.emotions, vec![Emotion::Regret, Emotion::Hope]);
    }

    #[test]
    fn out_of_range_location_is_dropped_not_rejected() {
        let at = |longitude, latitude| CreateConfessionRequest {
            location: Some(LocationInput {
                longitude: Some(longitude),
                latitude: Some(latitude),
            }),
            ..text("somewhere")
        };

        let kept = validate_submission(at(-73.9857, 40.7484), None).unwrap();
        assert_eq!(kept.location, GeoPoint::new(-73.9857, 40.7484));

        for (lon, lat) in [(181.0, 0.0), (0.0, -90.5), (f64::NAN, 0.0), (0.0, f64::INFINITY)] {
            let new = validate_submission(at(lon, lat), None).unwrap();
            assert!(new.location.is_none(), "({}, {}) should be dropped", lon, lat);
        }

        let half = CreateConfessionRequest {
            location: Some(LocationInput {
                longitude: Some(10.0),
                latitude: None,
            }),
            ..text("half")
        };
        assert!(validate_submission(half, None).unwrap().location.is_none());
    }

    #[test]
    fn audio_requires_valid_base64_and_drops_text() {
        let audio = |payload: Option<&str>| CreateConfessionRequest {
            content: Some("ignored".into()),
            content_type: Some("audio".into()),
            audio_content: payload.map(str::to_string),
            ..Default::default()
        };

        let new = validate_submission(audio(Some("UklGRg==")), None).unwrap();
        assert_eq!(new.content_type, ContentType::Audio);
        assert_eq!(new.content, "");
        assert_eq!(new.audio_content.as_deref(), Some("UklGRg=="));

        let errors = validate_submission(audio(Some("not base64!!")), None).unwrap_err();
        assert!(errors.has(ValidationCode::InvalidAudio));

        let errors = validate_submission(audio(None), None).unwrap_err();
        assert!(errors.has(ValidationCode::MissingContent));
    }

    #[test]
    fn text_submission_discards_audio_payload() {
        let raw = CreateConfessionRequest {
            audio_content: Some("UklGRg==".into()),
            ..text("words")
        };
        assert!(validate_submission(raw, None).unwrap().audio_content.is_none());
    }

    #[test]
    fn tags_are_trimmed_lowercased_and_bounded() {
        let raw = CreateConfessionRequest {
            tags: vec![" Work ".into(), "".into(), "   ".into(), "FAMILY".into()],
            ..text("tagged")
        };
        assert_eq!(validate_submission(raw, None).unwrap().tags, vec!["work", "family"]);

        let many = CreateConfessionRequest {
            tags: (0..=MAX_TAGS).map(|i| format!("t{}", i)).collect(),
            ..text("tagged")
        };
        assert!(validate_submission(many, None).unwrap_err().has(ValidationCode::TooManyTags));

        let long = CreateConfessionRequest {
            tags: vec!["x".repeat(MAX_TAG_CHARS + 1)],
            ..text("tagged")
        };
        assert!(validate_submission(long, None).unwrap_err().has(ValidationCode::TagTooLong));
    }

    #[test]
    fn author_is_carried_through() {
        let author = Uuid::new_v4();
        let new = validate_submission(text("mine"), Some(author)).unwrap();
        assert_eq!(new.author, Some(author));
    }

    #[test]
    fn patch_validates_only_present_fields() {
        let patch = validate_patch(UpdateConfessionRequest {
            is_public: Some(false),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(patch.is_public, Some(false));
        assert!(patch.content.is_none());
        assert!(patch.emotions.is_none());

        let patch = validate_patch(UpdateConfessionRequest {
            content: Some(" <edited> ".into()),
            emotions: Some(vec!["relief".into()]),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(patch.content.as_deref(), Some("&lt;edited&gt;"));
        assert_eq!(patch.emotions, Some(vec![Emotion::Relief]));

        assert!(validate_patch(UpdateConfessionRequest::default()).unwrap().is_empty());
    }

    #[test]
    fn patch_rejects_bad_values() {
        let errors = validate_patch(UpdateConfessionRequest {
            content: Some("  ".into()),
            emotions: Some(vec!["boredom".into()]),
            anonymity_level: Some("none".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(errors.has(ValidationCode::MissingContent));
        assert!(errors.has(ValidationCode::InvalidEmotion));
        assert!(errors.has(ValidationCode::InvalidAnonymityLevel));
    }
}
