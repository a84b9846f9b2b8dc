use axum::{
    Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use regret_gateway::connection;

use crate::middleware::{optional_auth, require_auth};
use crate::state::AppState;
use crate::{auth, confessions, health, locate};

/// Audio confessions arrive base64-encoded inside the JSON body.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// The full HTTP + socket surface.
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    let confession_routes = Router::new()
        .route(
            "/api/confessions",
            post(confessions::create_confession).get(confessions::list_confessions),
        )
        .route("/api/confessions/nearby", get(confessions::nearby_confessions))
        .route(
            "/api/confessions/{id}",
            get(confessions::get_confession)
                .put(confessions::update_confession)
                .delete(confessions::delete_confession),
        )
        .route("/api/confessions/{id}/react", post(confessions::react_to_confession))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_auth));

    let account_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/updatepassword", put(auth::update_password))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let public_routes = Router::new()
        .route("/", get(health::index))
        .route("/api/health", get(health::health))
        .route("/api/locate", get(locate::locate))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/socket", get(ws_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(confession_routes)
        .merge(account_routes)
        .fallback(health::not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, state))
}
