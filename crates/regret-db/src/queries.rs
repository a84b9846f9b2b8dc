use crate::geo::{BoundingBox, haversine_meters};
use crate::models::{
    ConfessionPageRows, ConfessionPatch, ConfessionRow, ListQuery, NewConfession, UserRow,
};
use crate::{Database, format_timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use regret_types::models::{Confession, GeoPoint, ReactionType, Reactions, Role};
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params_from_iter};
use uuid::Uuid;

const CONFESSION_COLUMNS: &str = "id, content, audio_content, content_type, emotions, anonymity_level, \
     is_public, longitude, latitude, tags, empathy, support, relate, author_id, created_at, updated_at";

const USER_COLUMNS: &str = "id, username, email, password, role, created_at, last_login";

impl Database {
    // -- Users --

    /// Returns `false` when the email is already taken.
    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, email, password, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    username,
                    email,
                    password_hash,
                    role.as_str(),
                    format_timestamp(Utc::now()),
                ],
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_login = ?1 WHERE id = ?2",
                rusqlite::params![format_timestamp(at), id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn set_user_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password = ?1 WHERE id = ?2",
                rusqlite::params![password_hash, id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Roles are granted out of band; there is no endpoint for this.
    pub fn set_user_role(&self, id: Uuid, role: Role) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                rusqlite::params![role.as_str(), id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Confessions --

    /// Persist a validated submission, assigning id and timestamps.
    pub fn insert_confession(&self, new: &NewConfession) -> Result<Confession> {
        let id = Uuid::new_v4();
        let now = format_timestamp(Utc::now());

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO confessions (id, content, audio_content, content_type, emotions, anonymity_level,
                    is_public, longitude, latitude, tags, author_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
                rusqlite::params![
                    id.to_string(),
                    new.content,
                    new.audio_content,
                    new.content_type.as_str(),
                    serde_json::to_string(&new.emotions)?,
                    new.anonymity_level.as_str(),
                    new.is_public,
                    new.location.map(|p| p.longitude),
                    new.location.map(|p| p.latitude),
                    serde_json::to_string(&new.tags)?,
                    new.author.map(|a| a.to_string()),
                    now,
                ],
            )?;

            query_confession(conn, &id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("confession {} vanished after insert", id))
        })
    }

    pub fn get_confession(&self, id: Uuid) -> Result<Option<Confession>> {
        self.with_conn(|conn| query_confession(conn, &id.to_string()))
    }

    pub fn list_confessions(&self, query: &ListQuery) -> Result<ConfessionPageRows> {
        let limit = query.limit.clamp(1, 100);
        let page = query.page.max(1);

        let mut clauses = vec!["is_public = 1".to_string()];
        let mut params: Vec<Value> = Vec::new();

        if let Some(since) = query.since {
            params.push(Value::Text(format_timestamp(since)));
            clauses.push(format!("created_at >= ?{}", params.len()));
        }

        if !query.emotions.is_empty() {
            let mut placeholders = Vec::with_capacity(query.emotions.len());
            for emotion in &query.emotions {
                params.push(Value::Text(emotion.as_str().to_string()));
                placeholders.push(format!("?{}", params.len()));
            }
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(confessions.emotions) WHERE json_each.value IN ({}))",
                placeholders.join(", ")
            ));
        }

        let filter = clauses.join(" AND ");

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM confessions WHERE {}", filter),
                params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let order = query.order.keyword();
            let sql = format!(
                "SELECT {} FROM confessions WHERE {} ORDER BY {} {}, rowid {} LIMIT ?{} OFFSET ?{}",
                CONFESSION_COLUMNS,
                filter,
                query.sort_by.column(),
                order,
                order,
                params.len() + 1,
                params.len() + 2,
            );

            let mut paged = params.clone();
            paged.push(Value::Integer(limit as i64));
            paged.push(Value::Integer((page as i64 - 1) * limit as i64));

            let mut stmt = conn.prepare(&sql)?;
            let confessions = collect_confessions(stmt.query_map(params_from_iter(paged.iter()), map_confession)?)?;

            let total = total.max(0) as u64;
            Ok(ConfessionPageRows {
                total,
                total_pages: total.div_ceil(limit as u64).max(1),
                page,
                confessions,
            })
        })
    }

    /// Public confessions created at or after `since`, newest first.
    pub fn recent_public(&self, since: DateTime<Utc>) -> Result<Vec<Confession>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM confessions
                 WHERE is_public = 1 AND created_at >= ?1
                 ORDER BY created_at DESC, rowid DESC",
                CONFESSION_COLUMNS
            ))?;
            let confessions = collect_confessions(stmt.query_map([format_timestamp(since)], map_confession)?)?;
            Ok(confessions)
        })
    }

    /// Public confessions within `max_distance_m` of `center`, closest first.
    pub fn nearby_confessions(
        &self,
        center: GeoPoint,
        max_distance_m: f64,
        limit: u32,
    ) -> Result<Vec<(Confession, f64)>> {
        let bbox = BoundingBox::around(center, max_distance_m);

        let candidates = self.with_conn(|conn| {
            let mut sql = format!(
                "SELECT {} FROM confessions
                 WHERE is_public = 1 AND latitude IS NOT NULL
                   AND latitude BETWEEN ?1 AND ?2",
                CONFESSION_COLUMNS
            );
            let mut params = vec![Value::Real(bbox.lat.0), Value::Real(bbox.lat.1)];
            if let Some((min_lon, max_lon)) = bbox.lon {
                sql.push_str(" AND longitude BETWEEN ?3 AND ?4");
                params.push(Value::Real(min_lon));
                params.push(Value::Real(max_lon));
            }

            let mut stmt = conn.prepare(&sql)?;
            let confessions = collect_confessions(stmt.query_map(params_from_iter(params.iter()), map_confession)?)?;
            Ok(confessions)
        })?;

        let mut hits: Vec<(Confession, f64)> = candidates
            .into_iter()
            .filter_map(|c| {
                let distance = haversine_meters(center, c.location?);
                (distance <= max_distance_m).then_some((c, distance))
            })
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(limit as usize);
        Ok(hits)
    }

    /// Apply a patch. Returns `None` if the confession does not exist.
    pub fn update_confession(&self, id: Uuid, patch: &ConfessionPatch) -> Result<Option<Confession>> {
        let mut sets = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(content) = &patch.content {
            params.push(Value::Text(content.clone()));
            sets.push(format!("content = ?{}", params.len()));
        }
        if let Some(emotions) = &patch.emotions {
            params.push(Value::Text(serde_json::to_string(emotions)?));
            sets.push(format!("emotions = ?{}", params.len()));
        }
        if let Some(level) = patch.anonymity_level {
            params.push(Value::Text(level.as_str().to_string()));
            sets.push(format!("anonymity_level = ?{}", params.len()));
        }
        if let Some(tags) = &patch.tags {
            params.push(Value::Text(serde_json::to_string(tags)?));
            sets.push(format!("tags = ?{}", params.len()));
        }
        if let Some(is_public) = patch.is_public {
            params.push(Value::Integer(is_public as i64));
            sets.push(format!("is_public = ?{}", params.len()));
        }

        params.push(Value::Text(format_timestamp(Utc::now())));
        sets.push(format!("updated_at = ?{}", params.len()));

        params.push(Value::Text(id.to_string()));
        let sql = format!(
            "UPDATE confessions SET {} WHERE id = ?{}",
            sets.join(", "),
            params.len()
        );

        self.with_conn(|conn| {
            let changed = conn.execute(&sql, params_from_iter(params.iter()))?;
            if changed == 0 {
                return Ok(None);
            }
            query_confession(conn, &id.to_string())
        })
    }

    /// Returns false if nothing was deleted.
    pub fn delete_confession(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM confessions WHERE id = ?1", [id.to_string()])?;
            Ok(deleted > 0)
        })
    }

    /// Atomically bump one reaction counter. Returns `None` if the confession does not exist.
    pub fn increment_reaction(&self, id: Uuid, reaction: ReactionType) -> Result<Option<Reactions>> {
        let sql = match reaction {
            ReactionType::Empathy => {
                "UPDATE confessions SET empathy = empathy + 1 WHERE id = ?1 RETURNING empathy, support, relate"
            }
            ReactionType::Support => {
                "UPDATE confessions SET support = support + 1 WHERE id = ?1 RETURNING empathy, support, relate"
            }
            ReactionType::Relate => {
                "UPDATE confessions SET relate = relate + 1 WHERE id = ?1 RETURNING empathy, support, relate"
            }
        };

        self.with_conn(|conn| {
            conn.query_row(sql, [id.to_string()], |row| {
                Ok(Reactions {
                    empathy: row.get::<_, i64>(0)?.max(0) as u64,
                    support: row.get::<_, i64>(1)?.max(0) as u64,
                    relate: row.get::<_, i64>(2)?.max(0) as u64,
                })
            })
            .optional()
        })
    }

    /// Confessions (public or not) created at or after `since`.
    pub fn count_since(&self, since: DateTime<Utc>) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM confessions WHERE created_at >= ?1",
                [format_timestamp(since)],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
    }

    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE {} = ?1",
        USER_COLUMNS, column
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                role: row.get(4)?,
                created_at: row.get(5)?,
                last_login: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_confession(conn: &Connection, id: &str) -> Result<Option<Confession>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM confessions WHERE id = ?1",
        CONFESSION_COLUMNS
    ))?;

    let row = stmt.query_row([id], map_confession).optional()?;
    row.map(ConfessionRow::into_model).transpose()
}

fn map_confession(row: &Row<'_>) -> rusqlite::Result<ConfessionRow> {
    Ok(ConfessionRow {
        id: row.get(0)?,
        content: row.get(1)?,
        audio_content: row.get(2)?,
        content_type: row.get(3)?,
        emotions: row.get(4)?,
        anonymity_level: row.get(5)?,
        is_public: row.get(6)?,
        longitude: row.get(7)?,
        latitude: row.get(8)?,
        tags: row.get(9)?,
        empathy: row.get(10)?,
        support: row.get(11)?,
        relate: row.get(12)?,
        author_id: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn collect_confessions<I>(rows: I) -> Result<Vec<Confession>>
where
    I: Iterator<Item = rusqlite::Result<ConfessionRow>>,
{
    rows.map(|row| row.map_err(anyhow::Error::from).and_then(ConfessionRow::into_model))
        .collect()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
