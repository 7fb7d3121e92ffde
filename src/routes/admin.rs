use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// Routes restricted to the `admin` role. `create_router` wraps this router in
/// the admin gate, which authenticates the caller first (401) and then checks
/// the role (403).
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /users
        // Lists every account, passwords stripped.
        .route("/users", get(handlers::list_users))
        // POST /restaurants
        .route("/restaurants", post(handlers::create_restaurant))
        // PUT/DELETE /restaurants/{id}
        // PUT merges the body verbatim, without a field allow-list.
        .route(
            "/restaurants/{id}",
            put(handlers::update_restaurant).delete(handlers::delete_restaurant),
        )
        // POST /menus
        .route("/menus", post(handlers::create_menu))
        // PUT/DELETE /menus/{id}
        .route(
            "/menus/{id}",
            put(handlers::update_menu).delete(handlers::delete_menu),
        )
}
