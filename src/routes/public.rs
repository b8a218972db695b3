use crate::{AppState, handlers::auth};
use axum::{Router, routing::post};

/// Public Router Module
///
/// Endpoints reachable without a bearer token: the two halves of the session flow.
/// Everything else under `/api/v1` sits behind the authentication layer.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // POST /auth/login
        // Username or email plus password; answers with access and refresh tokens.
        .route("/auth/login", post(auth::login))
        // POST /auth/refresh
        // Trades a refresh token for a new access token.
        .route("/auth/refresh", post(auth::refresh))
}
