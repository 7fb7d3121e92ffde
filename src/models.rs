use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use ts_rs::TS;
use utoipa::ToSchema;

/// A schemaless stored document, as returned to clients. Restaurants and menu
/// items are kept in this shape because updates may write arbitrary fields.
pub type Record = Map<String, Value>;

/// Renders a timestamp the way stored documents expose it: RFC 3339, UTC,
/// millisecond precision (`2024-05-01T12:00:00.000Z`).
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// --- Users ---

/// Role
///
/// RBAC field stored on every user. New accounts are always `user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Strict form for client input: only the two wire names are accepted.
    pub fn from_value(raw: &Value) -> Option<Self> {
        match raw.as_str()? {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Anything other than `admin` is treated as a regular user.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// User
///
/// A stored account. The password is kept verbatim and never leaves the
/// service; responses go through `UserProfile`.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: Role,
    pub created_at: Option<DateTime<Utc>>,
}

/// NewUser
///
/// Insert payload for the users collection. The id is generated by storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// UserChanges
///
/// Allow-listed user fields an update may set. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.role.is_none()
    }
}

/// UserProfile
///
/// Password-free view of a user. `createdAt` is omitted from the create and
/// login responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: Role,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none", default)]
    #[ts(optional)]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// The short form: `{_id, email, username, role}`.
    pub fn summary(user: &User) -> Self {
        Self {
            created_at: None,
            ..Self::from(user.clone())
        }
    }
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// CreateUserRequest
///
/// Public sign-up payload (POST /users). Fields accept any JSON scalar and are
/// read as text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct CreateUserRequest {
    #[schema(value_type = Option<String>)]
    #[ts(type = "string | null")]
    pub email: Option<Value>,
    #[schema(value_type = Option<String>)]
    #[ts(type = "string | null")]
    pub username: Option<Value>,
    #[schema(value_type = Option<String>)]
    #[ts(type = "string | null")]
    pub password: Option<Value>,
}

/// UpdateUserRequest
///
/// Partial update (PUT /users/{id}). `role` is only looked at for admins, so
/// anything a regular user sends there is ignored rather than rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[schema(value_type = Option<String>)]
    #[ts(type = "string | null")]
    pub email: Option<Value>,
    #[schema(value_type = Option<String>)]
    #[ts(type = "string | null")]
    pub username: Option<Value>,
    #[schema(value_type = Option<String>)]
    #[ts(type = "string | null")]
    pub password: Option<Value>,
    #[schema(value_type = Option<Role>)]
    #[ts(as = "Option<Role>")]
    pub role: Option<Value>,
}

/// LoginRequest
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct LoginRequest {
    #[schema(value_type = Option<String>)]
    #[ts(type = "string | null")]
    pub email: Option<Value>,
    #[schema(value_type = Option<String>)]
    #[ts(type = "string | null")]
    pub password: Option<Value>,
}

/// LoginResponse
///
/// No token is issued: clients reuse `user._id` as their `X-User-Id` header.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct LoginResponse {
    pub user: UserProfile,
}

/// Acknowledgement
///
/// Body of a successful delete: `{"ok": true}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct Acknowledgement {
    pub ok: bool,
}

impl Acknowledgement {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

// --- Restaurants & Menus ---

/// Resource
///
/// The schemaless collections exposed through the generic record operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Restaurants,
    Menus,
}

impl Resource {
    pub fn collection(self) -> &'static str {
        match self {
            Resource::Restaurants => "restaurants",
            Resource::Menus => "menus",
        }
    }
}

/// NewRestaurant
///
/// Create payload (POST /restaurants). `name` and `address` are required; all
/// four fields are stored exactly as sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct NewRestaurant {
    #[schema(value_type = Option<String>)]
    #[ts(type = "unknown")]
    pub name: Option<Value>,
    #[schema(value_type = Option<String>)]
    #[ts(type = "unknown")]
    pub address: Option<Value>,
    #[schema(value_type = Option<String>)]
    #[ts(type = "unknown")]
    pub phone: Option<Value>,
    #[schema(value_type = Option<String>)]
    #[ts(type = "unknown")]
    pub opening_hours: Option<Value>,
}

impl NewRestaurant {
    /// Builds the stored fields, or `None` if a required field is missing.
    pub fn into_record(self) -> Option<Record> {
        let name = self.name.filter(is_truthy)?;
        let address = self.address.filter(is_truthy)?;

        let mut record = Record::new();
        record.insert("name".into(), name);
        record.insert("address".into(), address);
        record.insert("phone".into(), self.phone.unwrap_or_else(empty_text));
        record.insert(
            "opening_hours".into(),
            self.opening_hours.unwrap_or_else(empty_text),
        );
        Some(record)
    }
}

/// NewMenuItem
///
/// Create payload (POST /menus). `restaurant_id`, `name` and `price` are
/// required. `price` accepts a number or a numeric string; the other fields
/// are stored exactly as sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct NewMenuItem {
    #[schema(value_type = Option<String>)]
    #[ts(type = "unknown")]
    pub restaurant_id: Option<Value>,
    #[schema(value_type = Option<String>)]
    #[ts(type = "unknown")]
    pub name: Option<Value>,
    #[schema(value_type = Option<String>)]
    #[ts(type = "unknown")]
    pub description: Option<Value>,
    #[schema(value_type = Option<f64>)]
    #[ts(type = "number | string | null")]
    pub price: Option<Value>,
    #[schema(value_type = Option<String>)]
    #[ts(type = "unknown")]
    pub category: Option<Value>,
}

/// Why a menu item payload was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItemError {
    MissingField,
    InvalidPrice,
}

impl NewMenuItem {
    pub fn into_record(self) -> Result<Record, MenuItemError> {
        let restaurant_id = self
            .restaurant_id
            .filter(is_truthy)
            .ok_or(MenuItemError::MissingField)?;
        let name = self
            .name
            .filter(is_truthy)
            .ok_or(MenuItemError::MissingField)?;
        let price = self.price.ok_or(MenuItemError::MissingField)?;
        let price = coerce_price(&price).ok_or(MenuItemError::InvalidPrice)?;

        let mut record = Record::new();
        record.insert("restaurant_id".into(), restaurant_id);
        record.insert("name".into(), name);
        record.insert(
            "description".into(),
            self.description.unwrap_or_else(empty_text),
        );
        record.insert("price".into(), price);
        record.insert("category".into(), self.category.unwrap_or_else(empty_text));
        Ok(record)
    }
}

fn empty_text() -> Value {
    Value::String(String::new())
}

// --- Loose JSON input ---

/// is_truthy
///
/// Presence test for loosely typed input: `null`, `false`, zero and the empty
/// string count as absent. Arrays and objects are always present.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// value_to_text
///
/// Reads any JSON value as text: strings as-is, numbers without a trailing
/// `.0`, arrays comma-joined, objects as `[object Object]`.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => match (number.as_i64(), number.as_u64(), number.as_f64()) {
            (Some(n), _, _) => n.to_string(),
            (_, Some(n), _) => n.to_string(),
            (_, _, Some(n)) if n.fract() == 0.0 && n.abs() < 1e21 => format!("{n:.0}"),
            _ => number.to_string(),
        },
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => value_to_text(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Text of a field that counts as absent when falsy: `""` in that case.
pub fn text_or_empty(value: Option<&Value>) -> String {
    value
        .filter(|value| is_truthy(value))
        .map(value_to_text)
        .unwrap_or_default()
}

/// coerce_price
///
/// Numbers pass through and numeric strings are parsed (blank counts as 0).
/// Whole values that fit in 32 bits become integers, everything else a
/// double. Returns `None` for anything that is not a finite number.
pub fn coerce_price(raw: &Value) -> Option<Value> {
    let value = match raw {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) if text.trim().is_empty() => 0.0,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if !value.is_finite() {
        return None;
    }

    if value.fract() == 0.0 && value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX) {
        return Some(Value::from(value as i64));
    }

    Number::from_f64(value).map(Value::Number)
}
