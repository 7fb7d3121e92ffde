use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without an `X-User-Id` header.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /users
        // Account sign-up. Always creates a `user` role.
        .route("/users", post(handlers::create_user))
        // POST /auth/login
        // Returns the user record; its `_id` is the identity for later calls.
        .route("/auth/login", post(handlers::login))
        // GET /restaurants?sort=name|address&order=asc|desc&page&limit
        .route("/restaurants", get(handlers::list_restaurants))
        .route("/restaurants/{id}", get(handlers::get_restaurant))
        // GET /menus?restaurant_id&sort=price|category&order=asc|desc&page&limit
        .route("/menus", get(handlers::list_menus))
        .route("/menus/{id}", get(handlers::get_menu))
}
