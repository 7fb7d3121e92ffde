use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use food_express::{
    AppState, MemoryRepository,
    auth::AuthUser,
    config::AppConfig,
    handlers,
    models::{
        CreateUserRequest, LoginRequest, NewMenuItem, NewRestaurant, NewUser, Role,
        UpdateUserRequest, User, UserProfile,
    },
    pagination::ListParams,
    repository::{Repository, RepositoryState},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::test;

// --- TEST UTILITIES ---

// Creates an AppState over the given in-memory repository.
fn create_test_state(repo: Arc<MemoryRepository>) -> AppState {
    AppState::new(repo as RepositoryState, AppConfig::default())
}

async fn seed_user(repo: &MemoryRepository, email: &str, role: Role) -> User {
    repo.insert_user(NewUser {
        email: email.to_string(),
        username: "tester".to_string(),
        password: "pw".to_string(),
        role,
        created_at: Utc::now(),
    })
    .await
    .unwrap()
}

fn caller(user: &User) -> AuthUser {
    AuthUser {
        id: user.id.clone(),
        role: user.role,
        email: user.email.clone(),
        username: user.username.clone(),
    }
}

async fn body_json(response: impl IntoResponse) -> Value {
    let (_parts, body) = response.into_response().into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn no_params() -> Query<ListParams> {
    Query(ListParams::default())
}

// --- USER HANDLERS ---

#[test]
async fn test_create_user_lowercases_email() {
    let repo = Arc::new(MemoryRepository::new());
    let state = create_test_state(repo.clone());

    let result = handlers::create_user(
        State(state),
        Ok(Json(CreateUserRequest {
            email: Some("Nina@Example.COM".into()),
            username: Some("nina".into()),
            password: Some("pw".into()),
        })),
    )
    .await;

    let (status, Json(profile)) = result.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(profile.email, "nina@example.com");
    assert_eq!(profile.role, Role::User);
    assert!(profile.created_at.is_none());

    let stored = repo.find_user_by_email("nina@example.com").await.unwrap();
    assert_eq!(stored.unwrap().password, "pw");
}

#[test]
async fn test_create_user_storage_failure_is_bad_request() {
    let state = create_test_state(Arc::new(MemoryRepository::new_failing()));

    let result = handlers::create_user(
        State(state),
        Ok(Json(CreateUserRequest {
            email: Some("x@example.com".into()),
            username: None,
            password: Some("pw".into()),
        })),
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.to_string(), "Memory Storage Error: Simulation requested");
}

#[test]
async fn test_login_is_case_insensitive_on_email() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "olga@example.com", Role::User).await;
    let state = create_test_state(repo);

    let Json(response) = handlers::login(
        State(state),
        Ok(Json(LoginRequest {
            email: Some("OLGA@example.com".into()),
            password: Some("pw".into()),
        })),
    )
    .await
    .unwrap();

    assert_eq!(response.user.id, user.id);
    assert!(response.user.created_at.is_none());
}

#[test]
async fn test_login_wrong_password() {
    let repo = Arc::new(MemoryRepository::new());
    seed_user(&repo, "olga@example.com", Role::User).await;
    let state = create_test_state(repo);

    let err = handlers::login(
        State(state),
        Ok(Json(LoginRequest {
            email: Some("olga@example.com".into()),
            password: Some("PW".into()),
        })),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(err.to_string(), "Invalid credentials");
}

#[test]
async fn test_update_user_ignores_empty_email() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "paul@example.com", Role::User).await;
    let state = create_test_state(repo);

    let Json(profile) = handlers::update_user(
        caller(&user),
        State(state),
        Path(user.id.clone()),
        Ok(Json(UpdateUserRequest {
            email: Some(json!("")),
            password: Some("new".into()),
            ..UpdateUserRequest::default()
        })),
    )
    .await
    .unwrap();

    assert_eq!(profile.email, "paul@example.com");
}

#[test]
async fn test_update_user_role_ignored_for_regular_users() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "sid@example.com", Role::User).await;
    let state = create_test_state(repo);

    let Json(profile) = handlers::update_user(
        caller(&user),
        State(state),
        Path(user.id.clone()),
        Ok(Json(UpdateUserRequest {
            username: Some(json!("sid2")),
            role: Some(json!("admin")),
            ..UpdateUserRequest::default()
        })),
    )
    .await
    .unwrap();

    assert_eq!(profile.username, "sid2");
    assert_eq!(profile.role, Role::User);
}

#[test]
async fn test_update_user_admin_unknown_role_is_bad_request() {
    let repo = Arc::new(MemoryRepository::new());
    let admin = seed_user(&repo, "root@example.com", Role::Admin).await;
    let user = seed_user(&repo, "tom@example.com", Role::User).await;
    let state = create_test_state(repo);

    let err = handlers::update_user(
        caller(&admin),
        State(state),
        Path(user.id),
        Ok(Json(UpdateUserRequest {
            role: Some(json!("superuser")),
            ..UpdateUserRequest::default()
        })),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.to_string(), "role must be user or admin");
}

#[test]
async fn test_update_user_coerces_scalars_to_text() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "uri@example.com", Role::User).await;
    let state = create_test_state(repo.clone());

    let Json(profile) = handlers::update_user(
        caller(&user),
        State(state),
        Path(user.id.clone()),
        Ok(Json(UpdateUserRequest {
            username: Some(json!(42)),
            password: Some(json!(9876)),
            ..UpdateUserRequest::default()
        })),
    )
    .await
    .unwrap();

    assert_eq!(profile.username, "42");
    let stored = repo.find_user(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.password, "9876");
}

#[test]
async fn test_update_user_with_no_changes_returns_current() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "quinn@example.com", Role::User).await;
    let state = create_test_state(repo);

    let Json(profile) = handlers::update_user(
        caller(&user),
        State(state),
        Path(user.id.clone()),
        Ok(Json(UpdateUserRequest::default())),
    )
    .await
    .unwrap();

    assert_eq!(profile, UserProfile::from(user));
}

#[test]
async fn test_update_missing_user_is_not_found() {
    let repo = Arc::new(MemoryRepository::new());
    let admin = seed_user(&repo, "root@example.com", Role::Admin).await;
    let state = create_test_state(repo);

    let err = handlers::update_user(
        caller(&admin),
        State(state),
        Path("507f1f77bcf86cd799439011".into()),
        Ok(Json(UpdateUserRequest {
            username: Some("ghost".into()),
            ..UpdateUserRequest::default()
        })),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[test]
async fn test_delete_user_twice() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "rita@example.com", Role::User).await;
    let state = create_test_state(repo);

    let first = handlers::delete_user(State(state.clone()), Path(user.id.clone())).await;
    assert_eq!(body_json(first.unwrap()).await, json!({ "ok": true }));

    let second = handlers::delete_user(State(state), Path(user.id)).await;
    assert_eq!(second.unwrap_err().status(), StatusCode::NOT_FOUND);
}

#[test]
async fn test_list_users_storage_failure_is_internal() {
    let state = create_test_state(Arc::new(MemoryRepository::new_failing()));

    let err = handlers::list_users(State(state)).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(err).await;
    assert_eq!(body["error"], "Memory Storage Error: Simulation requested");
}

// --- RESTAURANT & MENU HANDLERS ---

#[test]
async fn test_create_restaurant_requires_name_and_address() {
    let state = create_test_state(Arc::new(MemoryRepository::new()));

    let err = handlers::create_restaurant(
        State(state),
        Ok(Json(NewRestaurant {
            name: Some("Nameless".into()),
            address: Some(json!("")),
            ..NewRestaurant::default()
        })),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.to_string(), "name & address required");
}

#[test]
async fn test_create_menu_stores_whole_price_as_integer() {
    let state = create_test_state(Arc::new(MemoryRepository::new()));

    let (status, Json(record)) = handlers::create_menu(
        State(state),
        Ok(Json(NewMenuItem {
            restaurant_id: Some("r1".into()),
            name: Some("Rice".into()),
            price: Some(json!("7")),
            ..NewMenuItem::default()
        })),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["price"], json!(7));
    assert!(record["price"].is_i64());
}

#[test]
async fn test_create_menu_null_price_counts_as_missing() {
    let state = create_test_state(Arc::new(MemoryRepository::new()));

    let payload: NewMenuItem =
        serde_json::from_value(json!({ "restaurant_id": "r1", "name": "Rice", "price": null }))
            .unwrap();
    let err = handlers::create_menu(State(state), Ok(Json(payload)))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "restaurant_id, name, price required");
}

#[test]
async fn test_list_restaurants_envelope() {
    let state = create_test_state(Arc::new(MemoryRepository::new()));
    for name in ["b", "a"] {
        handlers::create_restaurant(
            State(state.clone()),
            Ok(Json(NewRestaurant {
                name: Some(name.into()),
                address: Some("addr".into()),
                ..NewRestaurant::default()
            })),
        )
        .await
        .unwrap();
    }

    let Json(page) = handlers::list_restaurants(State(state), no_params())
        .await
        .unwrap();

    assert_eq!(page.page, 1);
    assert_eq!(page.total, 2);
    assert_eq!(page.total_pages, 1);
    assert_eq!(page.items[0]["name"], "a");
}

#[test]
async fn test_update_restaurant_rejects_id_overwrite() {
    let state = create_test_state(Arc::new(MemoryRepository::new()));
    let (_, Json(created)) = handlers::create_restaurant(
        State(state.clone()),
        Ok(Json(NewRestaurant {
            name: Some("Locked".into()),
            address: Some("addr".into()),
            ..NewRestaurant::default()
        })),
    )
    .await
    .unwrap();
    let id = created["_id"].as_str().unwrap().to_string();

    let mut changes = serde_json::Map::new();
    changes.insert("_id".into(), json!("507f1f77bcf86cd799439011"));
    let err = handlers::update_restaurant(State(state), Path(id), Ok(Json(changes)))
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
async fn test_get_menu_not_found() {
    let state = create_test_state(Arc::new(MemoryRepository::new()));

    let err = handlers::get_menu(State(state), Path("nope".into()))
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(err).await, json!({ "error": "Not found" }));
}
