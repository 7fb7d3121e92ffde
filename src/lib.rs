use axum::{
    Router,
    extract::{FromRef, Path, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use std::collections::HashMap;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod pagination;
pub mod repository;

// Routing segregated by access level (Public, Self-or-Admin, Admin).
pub mod routes;
use auth::AuthUser;
use error::AppError;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use auth::{HeaderIdentityResolver, IdentityState};
pub use config::AppConfig;
pub use memory::MemoryRepository;
pub use repository::{MongoRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document aggregated from the `#[utoipa::path]` handlers and the
/// `ToSchema` models, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_user, handlers::login, handlers::list_users, handlers::get_user,
        handlers::update_user, handlers::delete_user,
        handlers::list_restaurants, handlers::get_restaurant, handlers::create_restaurant,
        handlers::update_restaurant, handlers::delete_restaurant,
        handlers::list_menus, handlers::get_menu, handlers::create_menu,
        handlers::update_menu, handlers::delete_menu
    ),
    components(
        schemas(
            models::Role, models::UserProfile, models::CreateUserRequest,
            models::UpdateUserRequest, models::LoginRequest, models::LoginResponse,
            models::Acknowledgement, models::NewRestaurant, models::NewMenuItem,
            pagination::Page, error::ErrorBody,
        )
    ),
    tags(
        (name = "food-express", description = "FoodExpress restaurants & menus API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container of application services. Storage and identity
/// resolution are injected here rather than held in globals.
#[derive(Clone)]
pub struct AppState {
    /// Storage layer: users, restaurants and menus.
    pub repo: RepositoryState,
    /// Identity layer: turns a request into an `AuthUser`.
    pub identity: IdentityState,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

impl AppState {
    /// State with the header-trusting identity resolver over `repo`.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        let identity: IdentityState = std::sync::Arc::new(HeaderIdentityResolver::new(repo.clone()));
        Self {
            repo,
            identity,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// admin_middleware
///
/// Gate for the admin router. Resolving `AuthUser` rejects unknown callers
/// with 401 before the role check can answer 403.
async fn admin_middleware(
    user: AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    auth::require_admin(&user)?;
    Ok(next.run(request).await)
}

/// owner_middleware
///
/// Gate for `/users/{id}`: the caller must be that user or an admin.
async fn owner_middleware(
    user: AuthUser,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    auth::self_or_admin(&user, &params, "id")?;
    Ok(next.run(request).await)
}

/// create_router
///
/// Assembles the routing structure, applies the gates and the observability
/// layers, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                owner_middleware,
            )),
        )
        .merge(
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer`: method, uri and the `x-request-id` assigned above,
/// so every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
