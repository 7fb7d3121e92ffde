use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Self-or-Admin Router Module
///
/// Per-user routes. `create_router` layers the ownership gate over this
/// router, so handlers here only run for the user named by `{id}` or for an
/// admin.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PUT/DELETE /users/{id}
        // Only admins may change a role through PUT; the handler drops the
        // field for everyone else.
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
}
