use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, ErrorBody},
    models::{
        Acknowledgement, CreateUserRequest, LoginRequest, LoginResponse, MenuItemError,
        NewMenuItem, NewRestaurant, NewUser, Record, Resource, Role, UpdateUserRequest,
        UserChanges, UserProfile, is_truthy, text_or_empty, value_to_text,
    },
    pagination::{ListParams, Page, Pagination, Sort},
    repository::{RecordQuery, RepositoryError},
};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;
use serde_json::Value;

const EMAIL_TAKEN: &str = "Email already used";

/// Sort fields accepted by GET /restaurants. The first one is the default.
pub const RESTAURANT_SORT_FIELDS: [&str; 2] = ["name", "address"];
/// Sort fields accepted by GET /menus. The first one is the default.
pub const MENU_SORT_FIELDS: [&str; 2] = ["price", "category"];

/// Unwraps a JSON body. A request sent without a JSON content type reads as
/// an empty object; a body that does not parse is still a 400.
fn json_body<T: Default>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(rejection.into()),
    }
}

// --- Users ---

/// create_user
///
/// [Public Route] Signs up a new account. The email is lowercased so that the
/// unique index makes it case-insensitive; the password is stored verbatim and
/// the role is always `user`.
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = UserProfile),
        (status = 400, description = "Missing field or email already used", body = ErrorBody)
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    let payload = json_body(payload)?;
    let email = text_or_empty(payload.email.as_ref()).to_lowercase();
    let password = text_or_empty(payload.password.as_ref());
    if email.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest("email & password required".into()));
    }

    // Storage failures on sign-up are reported as client errors.
    let as_bad_request = |e: RepositoryError| match e {
        RepositoryError::DuplicateKey(_) => AppError::BadRequest(EMAIL_TAKEN.into()),
        RepositoryError::Storage(msg) => AppError::BadRequest(msg),
    };

    if state
        .repo
        .find_user_by_email(&email)
        .await
        .map_err(as_bad_request)?
        .is_some()
    {
        return Err(AppError::BadRequest(EMAIL_TAKEN.into()));
    }

    let user = state
        .repo
        .insert_user(NewUser {
            email,
            username: text_or_empty(payload.username.as_ref()),
            password,
            role: Role::User,
            created_at: Utc::now(),
        })
        .await
        .map_err(as_bad_request)?;

    tracing::info!(user_id = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(UserProfile::summary(&user))))
}

/// login
///
/// [Public Route] Looks the user up by (lowercased) email and compares the
/// password verbatim. Unknown email and wrong password are indistinguishable.
/// No token is issued; the returned `_id` is what clients send as `X-User-Id`.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let payload = json_body(payload)?;
    let email = text_or_empty(payload.email.as_ref()).to_lowercase();
    let password = text_or_empty(payload.password.as_ref());

    let user = state
        .repo
        .find_user_by_email(&email)
        .await?
        .filter(|user| user.password == password)
        .ok_or(AppError::InvalidCredentials)?;

    Ok(Json(LoginResponse {
        user: UserProfile::summary(&user),
    }))
}

/// list_users
///
/// [Admin Route] Every user, without passwords.
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All users", body = [UserProfile]),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody)
    )
)]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserProfile>>, AppError> {
    let users = state.repo.list_users().await?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

/// get_user
///
/// [Self-or-Admin Route] A single user, without the password.
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = UserProfile),
        (status = 403, description = "Not self or admin", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, AppError> {
    match state.repo.find_user(&id).await? {
        Some(user) => Ok(Json(UserProfile::from(user))),
        None => Err(AppError::NotFound),
    }
}

/// update_user
///
/// [Self-or-Admin Route] Merges the allow-listed fields: a non-empty email
/// (lowercased), username, password and, for admin callers only, role. A
/// role sent by anyone else is ignored.
#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 400, description = "Email already used or unknown role", body = ErrorBody),
        (status = 403, description = "Not self or admin", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn update_user(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserProfile>, AppError> {
    let payload = json_body(payload)?;
    let role = payload
        .role
        .filter(|role| caller.is_admin() && is_truthy(role))
        .map(|role| {
            Role::from_value(&role)
                .ok_or_else(|| AppError::BadRequest("role must be user or admin".into()))
        })
        .transpose()?;

    let changes = UserChanges {
        email: payload
            .email
            .filter(is_truthy)
            .map(|email| value_to_text(&email).to_lowercase()),
        username: payload.username.map(|username| value_to_text(&username)),
        password: payload.password.map(|password| value_to_text(&password)),
        role,
    };

    let updated = state
        .repo
        .update_user(&id, changes)
        .await
        .map_err(|e| match e {
            RepositoryError::DuplicateKey(_) => AppError::BadRequest(EMAIL_TAKEN.into()),
            other => other.into(),
        })?;

    match updated {
        Some(user) => Ok(Json(UserProfile::from(user))),
        None => Err(AppError::NotFound),
    }
}

/// delete_user
///
/// [Self-or-Admin Route] Removes the account.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Deleted", body = Acknowledgement),
        (status = 403, description = "Not self or admin", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Acknowledgement>, AppError> {
    if state.repo.delete_user(&id).await? {
        tracing::info!(user_id = %id, "user deleted");
        Ok(Json(Acknowledgement::ok()))
    } else {
        Err(AppError::NotFound)
    }
}

// --- Shared record plumbing ---

async fn list_records(
    state: &AppState,
    resource: Resource,
    filter: Record,
    sort: Sort,
    pagination: Pagination,
) -> Result<Page, AppError> {
    let total = state.repo.count_records(resource, &filter).await?;
    let query = RecordQuery {
        filter,
        sort,
        skip: pagination.skip,
        limit: pagination.limit,
    };
    let items = state.repo.find_records(resource, &query).await?;
    Ok(Page::new(&pagination, total, items))
}

async fn get_record(state: &AppState, resource: Resource, id: &str) -> Result<Record, AppError> {
    state
        .repo
        .find_record(resource, id)
        .await?
        .ok_or(AppError::NotFound)
}

async fn merge_record(
    state: &AppState,
    resource: Resource,
    id: &str,
    changes: Record,
) -> Result<Record, AppError> {
    state
        .repo
        .merge_record(resource, id, changes)
        .await?
        .ok_or(AppError::NotFound)
}

async fn delete_record(
    state: &AppState,
    resource: Resource,
    id: &str,
) -> Result<Acknowledgement, AppError> {
    if state.repo.delete_record(resource, id).await? {
        tracing::info!(collection = resource.collection(), id = %id, "record deleted");
        Ok(Acknowledgement::ok())
    } else {
        Err(AppError::NotFound)
    }
}

// --- Restaurants ---

/// list_restaurants
///
/// [Public Route] Paginated listing sorted by `name` (default) or `address`.
#[utoipa::path(
    get,
    path = "/restaurants",
    params(ListParams),
    responses((status = 200, description = "Page of restaurants", body = Page))
)]
pub async fn list_restaurants(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page>, AppError> {
    let pagination = Pagination::from_params(params.page.as_deref(), params.limit.as_deref());
    let sort = Sort::from_params(
        params.sort.as_deref(),
        &RESTAURANT_SORT_FIELDS,
        RESTAURANT_SORT_FIELDS[0],
        params.order.as_deref(),
    );
    let page = list_records(&state, Resource::Restaurants, Record::new(), sort, pagination).await?;
    Ok(Json(page))
}

/// get_restaurant
///
/// [Public Route] A single restaurant document.
#[utoipa::path(
    get,
    path = "/restaurants/{id}",
    params(("id" = String, Path, description = "Restaurant ID")),
    responses(
        (status = 200, description = "Found"),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_restaurant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Record>, AppError> {
    Ok(Json(get_record(&state, Resource::Restaurants, &id).await?))
}

/// create_restaurant
///
/// [Admin Route] `name` and `address` are required; `phone` and
/// `opening_hours` default to empty strings.
#[utoipa::path(
    post,
    path = "/restaurants",
    request_body = NewRestaurant,
    responses(
        (status = 201, description = "Created"),
        (status = 400, description = "Missing field", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody)
    )
)]
pub async fn create_restaurant(
    State(state): State<AppState>,
    payload: Result<Json<NewRestaurant>, JsonRejection>,
) -> Result<(StatusCode, Json<Record>), AppError> {
    let payload = json_body(payload)?;
    let fields = payload
        .into_record()
        .ok_or_else(|| AppError::BadRequest("name & address required".into()))?;

    let created = state
        .repo
        .insert_record(Resource::Restaurants, fields, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// update_restaurant
///
/// [Admin Route] Merges the whole JSON body into the document. There is no
/// field allow-list: any field, known or not, is writable.
#[utoipa::path(
    put,
    path = "/restaurants/{id}",
    params(("id" = String, Path, description = "Restaurant ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Updated"),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn update_restaurant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Record>, JsonRejection>,
) -> Result<Json<Record>, AppError> {
    let changes = json_body(payload)?;
    Ok(Json(merge_record(&state, Resource::Restaurants, &id, changes).await?))
}

/// delete_restaurant
///
/// [Admin Route] Menu items pointing at the restaurant are left in place.
#[utoipa::path(
    delete,
    path = "/restaurants/{id}",
    params(("id" = String, Path, description = "Restaurant ID")),
    responses(
        (status = 200, description = "Deleted", body = Acknowledgement),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn delete_restaurant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Acknowledgement>, AppError> {
    Ok(Json(delete_record(&state, Resource::Restaurants, &id).await?))
}

// --- Menus ---

/// list_menus
///
/// [Public Route] Paginated listing sorted by `price` (default) or
/// `category`, optionally restricted to one `restaurant_id`.
#[utoipa::path(
    get,
    path = "/menus",
    params(ListParams),
    responses((status = 200, description = "Page of menu items", body = Page))
)]
pub async fn list_menus(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page>, AppError> {
    let pagination = Pagination::from_params(params.page.as_deref(), params.limit.as_deref());
    let sort = Sort::from_params(
        params.sort.as_deref(),
        &MENU_SORT_FIELDS,
        MENU_SORT_FIELDS[0],
        params.order.as_deref(),
    );

    let mut filter = Record::new();
    if let Some(restaurant_id) = params.restaurant_id.filter(|id| !id.is_empty()) {
        filter.insert("restaurant_id".into(), Value::String(restaurant_id));
    }

    let page = list_records(&state, Resource::Menus, filter, sort, pagination).await?;
    Ok(Json(page))
}

/// get_menu
///
/// [Public Route] A single menu item document.
#[utoipa::path(
    get,
    path = "/menus/{id}",
    params(("id" = String, Path, description = "Menu item ID")),
    responses(
        (status = 200, description = "Found"),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_menu(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Record>, AppError> {
    Ok(Json(get_record(&state, Resource::Menus, &id).await?))
}

/// create_menu
///
/// [Admin Route] `restaurant_id`, `name` and `price` are required. The
/// restaurant reference is stored as given and not checked.
#[utoipa::path(
    post,
    path = "/menus",
    request_body = NewMenuItem,
    responses(
        (status = 201, description = "Created"),
        (status = 400, description = "Missing field or bad price", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody)
    )
)]
pub async fn create_menu(
    State(state): State<AppState>,
    payload: Result<Json<NewMenuItem>, JsonRejection>,
) -> Result<(StatusCode, Json<Record>), AppError> {
    let payload = json_body(payload)?;
    let fields = payload.into_record().map_err(|e| match e {
        MenuItemError::MissingField => {
            AppError::BadRequest("restaurant_id, name, price required".into())
        }
        MenuItemError::InvalidPrice => AppError::BadRequest("price must be a number".into()),
    })?;

    let created = state
        .repo
        .insert_record(Resource::Menus, fields, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// update_menu
///
/// [Admin Route] Merges the whole JSON body into the document, with no field
/// allow-list.
#[utoipa::path(
    put,
    path = "/menus/{id}",
    params(("id" = String, Path, description = "Menu item ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Updated"),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn update_menu(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Record>, JsonRejection>,
) -> Result<Json<Record>, AppError> {
    let changes = json_body(payload)?;
    Ok(Json(merge_record(&state, Resource::Menus, &id, changes).await?))
}

/// delete_menu
///
/// [Admin Route]
#[utoipa::path(
    delete,
    path = "/menus/{id}",
    params(("id" = String, Path, description = "Menu item ID")),
    responses(
        (status = 200, description = "Deleted", body = Acknowledgement),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn delete_menu(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Acknowledgement>, AppError> {
    Ok(Json(delete_record(&state, Resource::Menus, &id).await?))
}
