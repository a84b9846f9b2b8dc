pub mod auth;
pub mod confessions;
pub mod error;
pub mod health;
pub mod locate;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod validate;

pub use error::ApiError;
pub use rate_limit::RateLimiter;
pub use routes::router;
pub use state::AppState;
