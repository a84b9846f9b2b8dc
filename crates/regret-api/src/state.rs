use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tracing::{debug, error};
use uuid::Uuid;

use regret_db::Database;
use regret_gateway::dispatcher::Dispatcher;
use regret_gateway::feed::{ConfessionFeed, SubmitRejection};
use regret_geo::GeoResolver;
use regret_types::api::CreateConfessionRequest;
use regret_types::models::Confession;

use crate::error::ApiError;
use crate::rate_limit::RateLimiter;
use crate::validate::validate_submission;

/// How far back the connect-time snapshot reaches.
const SNAPSHOT_WINDOW_HOURS: i64 = 24;

/// Everything a handler needs. Built once in `main` and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub limiter: RateLimiter,
    pub geo: Arc<GeoResolver>,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(db: Database, geo: GeoResolver, limiter: RateLimiter, jwt_secret: &str) -> Self {
        Self {
            db: Arc::new(db),
            dispatcher: Dispatcher::new(),
            limiter,
            geo: Arc::new(geo),
            jwt_secret: jwt_secret.into(),
        }
    }

    /// Run blocking DB work off the async runtime.
    pub async fn with_db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Persistence(anyhow::anyhow!("blocking task failed: {}", e))
            })?
    }

    /// The single write path shared by REST and the socket:
    /// validate, rate limit, store, then fan out.
    pub async fn submit_confession(
        &self,
        raw: CreateConfessionRequest,
        author: Option<Uuid>,
    ) -> Result<Confession, ApiError> {
        let new = validate_submission(raw, author)?;

        let limiter = self.limiter;
        let confession = self
            .with_db(move |db| {
                limiter.check(db)?;
                Ok(db.insert_confession(&new)?)
            })
            .await?;

        // A failed broadcast never fails the create
        let viewers = self.dispatcher.broadcast_confession(&confession);
        debug!("Confession {} created, queued for {} viewers", confession.id, viewers);

        Ok(confession)
    }
}

impl ConfessionFeed for AppState {
    async fn snapshot(&self) -> anyhow::Result<Vec<Confession>> {
        let db = self.db.clone();
        let since = Utc::now() - TimeDelta::hours(SNAPSHOT_WINDOW_HOURS);
        tokio::task::spawn_blocking(move || db.recent_public(since)).await?
    }

    async fn submit(&self, req: CreateConfessionRequest) -> Result<Confession, SubmitRejection> {
        self.submit_confession(req, None).await.map_err(SubmitRejection::from)
    }
}
