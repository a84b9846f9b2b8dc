//! Integration tests for the confession store: CRUD, listing, nearby search and
//! reaction counters against an in-memory SQLite database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use regret_db::Database;
use regret_db::geo::haversine_meters;
use regret_db::models::{ConfessionPatch, ListQuery, NewConfession, SortOrder};
use regret_types::models::{AnonymityLevel, ContentType, Emotion, GeoPoint, ReactionType, Role};
use uuid::Uuid;

fn db() -> Database {
    Database::open_in_memory().expect("in-memory database")
}

fn text(content: &str) -> NewConfession {
    NewConfession {
        content: content.to_string(),
        audio_content: None,
        content_type: ContentType::Text,
        emotions: vec![],
        anonymity_level: AnonymityLevel::Full,
        is_public: true,
        location: None,
        tags: vec![],
        author: None,
    }
}

fn at(content: &str, lon: f64, lat: f64) -> NewConfession {
    NewConfession {
        location: GeoPoint::new(lon, lat),
        ..text(content)
    }
}

#[test]
fn insert_then_get_returns_input_plus_server_fields() {
    let db = db();
    let new = NewConfession {
        emotions: vec![Emotion::Regret, Emotion::Hope],
        anonymity_level: AnonymityLevel::Location,
        tags: vec!["work".into()],
        location: GeoPoint::new(-73.9857, 40.7484),
        ..text("I regret this")
    };

    let created = db.insert_confession(&new).unwrap();
    let fetched = db.get_confession(created.id).unwrap().expect("stored");

    assert_eq!(fetched, created);
    assert_eq!(fetched.content, new.content);
    assert_eq!(fetched.emotions, new.emotions);
    assert_eq!(fetched.anonymity_level, new.anonymity_level);
    assert_eq!(fetched.tags, new.tags);
    assert_eq!(fetched.location, new.location);
    assert_eq!(fetched.reactions.empathy, 0);
    assert_eq!(fetched.created_at, fetched.updated_at);
}

#[test]
fn get_unknown_id_is_none() {
    assert!(db().get_confession(Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn list_excludes_private_and_paginates() {
    let db = db();
    for i in 0..5 {
        db.insert_confession(&text(&format!("public {i}"))).unwrap();
    }
    db.insert_confession(&NewConfession {
        is_public: false,
        ..text("secret")
    })
    .unwrap();

    let page1 = db
        .list_confessions(&ListQuery {
            page: 1,
            limit: 2,
            ..ListQuery::default()
        })
        .unwrap();
    assert_eq!(page1.total, 5);
    assert_eq!(page1.total_pages, 3);
    assert_eq!(page1.confessions.len(), 2);
    // Newest first by default
    assert_eq!(page1.confessions[0].content, "public 4");

    let page3 = db
        .list_confessions(&ListQuery {
            page: 3,
            limit: 2,
            ..ListQuery::default()
        })
        .unwrap();
    assert_eq!(page3.confessions.len(), 1);
    assert_eq!(page3.confessions[0].content, "public 0");

    let ascending = db
        .list_confessions(&ListQuery {
            order: SortOrder::Asc,
            ..ListQuery::default()
        })
        .unwrap();
    assert_eq!(ascending.confessions[0].content, "public 0");
    assert!(ascending.confessions.iter().all(|c| c.is_public));
}

#[test]
fn list_filters_by_any_emotion() {
    let db = db();
    db.insert_confession(&NewConfession {
        emotions: vec![Emotion::Joy],
        ..text("joyful")
    })
    .unwrap();
    db.insert_confession(&NewConfession {
        emotions: vec![Emotion::Fear, Emotion::Anxiety],
        ..text("anxious")
    })
    .unwrap();
    db.insert_confession(&text("plain")).unwrap();

    let page = db
        .list_confessions(&ListQuery {
            emotions: vec![Emotion::Anxiety, Emotion::Relief],
            ..ListQuery::default()
        })
        .unwrap();

    assert_eq!(page.total, 1);
    assert_eq!(page.confessions[0].content, "anxious");
}

#[test]
fn empty_listing_still_reports_one_page() {
    let page = db().list_confessions(&ListQuery::default()).unwrap();
    assert_eq!(page.total, 0);
    assert_eq!(page.total_pages, 1);
    assert!(page.confessions.is_empty());
}

#[test]
fn recent_public_respects_window() {
    let db = db();
    db.insert_confession(&text("now")).unwrap();
    db.insert_confession(&NewConfession {
        is_public: false,
        ..text("hidden")
    })
    .unwrap();

    let recent = db.recent_public(Utc::now() - Duration::hours(24)).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].content, "now");

    let future = db.recent_public(Utc::now() + Duration::minutes(1)).unwrap();
    assert!(future.is_empty());
}

#[test]
fn nearby_never_exceeds_max_distance() {
    let db = db();
    let center = GeoPoint::new(-0.1276, 51.5072).unwrap(); // London

    db.insert_confession(&at("trafalgar", -0.1281, 51.5080)).unwrap();
    db.insert_confession(&at("greenwich", -0.0098, 51.4769)).unwrap();
    db.insert_confession(&at("paris", 2.3522, 48.8566)).unwrap();
    db.insert_confession(&text("nowhere")).unwrap();
    db.insert_confession(&NewConfession {
        is_public: false,
        ..at("private", -0.1276, 51.5072)
    })
    .unwrap();

    let hits = db.nearby_confessions(center, 10_000.0, 50).unwrap();
    let names: Vec<&str> = hits.iter().map(|(c, _)| c.content.as_str()).collect();
    assert_eq!(names, vec!["trafalgar", "greenwich"]);

    for (confession, distance) in &hits {
        assert!(confession.is_public);
        let actual = haversine_meters(center, confession.location.unwrap());
        assert!(actual <= 10_000.0);
        assert!((actual - distance).abs() < 1e-6);
    }

    let wide = db.nearby_confessions(center, 400_000.0, 50).unwrap();
    assert_eq!(wide.len(), 3);
    assert_eq!(wide[2].0.content, "paris");

    let limited = db.nearby_confessions(center, 400_000.0, 1).unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].0.content, "trafalgar");
}

#[test]
fn nearby_across_antimeridian() {
    let db = db();
    db.insert_confession(&at("east", 179.95, 0.0)).unwrap();
    db.insert_confession(&at("west", -179.95, 0.0)).unwrap();

    let center = GeoPoint::new(180.0, 0.0).unwrap();
    let hits = db.nearby_confessions(center, 20_000.0, 50).unwrap();
    assert_eq!(hits.len(), 2);
}

#[test]
fn update_applies_only_given_fields() {
    let db = db();
    let created = db
        .insert_confession(&NewConfession {
            emotions: vec![Emotion::Sadness],
            ..text("before")
        })
        .unwrap();

    let patch = ConfessionPatch {
        content: Some("after".into()),
        is_public: Some(false),
        ..ConfessionPatch::default()
    };
    let updated = db.update_confession(created.id, &patch).unwrap().unwrap();

    assert_eq!(updated.content, "after");
    assert!(!updated.is_public);
    assert_eq!(updated.emotions, vec![Emotion::Sadness]);
    assert!(updated.updated_at >= created.updated_at);
    assert_eq!(updated.created_at, created.created_at);

    assert!(db.update_confession(Uuid::new_v4(), &patch).unwrap().is_none());
}

#[test]
fn delete_removes_row() {
    let db = db();
    let created = db.insert_confession(&text("gone soon")).unwrap();

    assert!(db.delete_confession(created.id).unwrap());
    assert!(!db.delete_confession(created.id).unwrap());
    assert!(db.get_confession(created.id).unwrap().is_none());
}

#[test]
fn increment_reaction_on_missing_confession_is_none() {
    let db = db();
    assert!(db.increment_reaction(Uuid::new_v4(), ReactionType::Support).unwrap().is_none());
}

#[test]
fn concurrent_reactions_are_never_lost() {
    let db = Arc::new(db());
    let id = db.insert_confession(&text("hug me")).unwrap().id;
    let callers = 32;

    std::thread::scope(|scope| {
        for _ in 0..callers {
            let db = db.clone();
            scope.spawn(move || {
                db.increment_reaction(id, ReactionType::Empathy).unwrap().unwrap();
            });
        }
    });

    let reactions = db.get_confession(id).unwrap().unwrap().reactions;
    assert_eq!(reactions.empathy, callers);
    assert_eq!(reactions.support, 0);
    assert_eq!(reactions.relate, 0);
}

#[test]
fn count_since_counts_private_too() {
    let db = db();
    db.insert_confession(&text("a")).unwrap();
    db.insert_confession(&NewConfession {
        is_public: false,
        ..text("b")
    })
    .unwrap();

    assert_eq!(db.count_since(Utc::now() - Duration::minutes(60)).unwrap(), 2);
    assert_eq!(db.count_since(Utc::now() + Duration::minutes(1)).unwrap(), 0);
}

#[test]
fn users_round_trip_and_author_link() {
    let db = db();
    let id = Uuid::new_v4();
    assert!(
        db.create_user(id, "quietfox", "fox@example.com", "$argon2id$stub", Role::User)
            .unwrap()
    );

    let row = db.get_user_by_email("fox@example.com").unwrap().unwrap();
    let user = row.into_model().unwrap();
    assert_eq!(user.id, id);
    assert_eq!(user.role, Role::User);
    assert!(user.last_login.is_none());

    db.touch_last_login(id, Utc::now()).unwrap();
    let user = db.get_user_by_id(id).unwrap().unwrap().into_model().unwrap();
    assert!(user.last_login.is_some());

    let owned = db
        .insert_confession(&NewConfession {
            author: Some(id),
            ..text("mine")
        })
        .unwrap();
    assert_eq!(owned.author, Some(id));
}

#[test]
fn duplicate_email_is_reported_not_raised() {
    let db = db();
    assert!(
        db.create_user(Uuid::new_v4(), "first", "same@example.com", "$argon2id$a", Role::User)
            .unwrap()
    );
    assert!(
        !db.create_user(Uuid::new_v4(), "second", "same@example.com", "$argon2id$b", Role::User)
            .unwrap()
    );
}

#[test]
fn password_and_role_updates() {
    let db = db();
    let id = Uuid::new_v4();
    db.create_user(id, "warden", "warden@example.com", "$argon2id$old", Role::Admin)
        .unwrap();

    assert!(db.set_user_password(id, "$argon2id$new").unwrap());
    assert!(db.set_user_role(id, Role::User).unwrap());

    let row = db.get_user_by_id(id).unwrap().unwrap();
    assert_eq!(row.password, "$argon2id$new");
    assert_eq!(row.into_model().unwrap().role, Role::User);

    assert!(!db.set_user_password(Uuid::new_v4(), "$argon2id$x").unwrap());
    assert!(!db.set_user_role(Uuid::new_v4(), Role::Admin).unwrap());
}
