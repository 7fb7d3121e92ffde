use crate::models::{NewUser, Record, Resource, User, UserChanges, format_timestamp};
use crate::pagination::SortOrder;
use crate::repository::{RepoResult, Repository, RepositoryError, RecordQuery, parse_object_id};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// MemoryRepository
///
/// An in-process `Repository` with the same observable behaviour as the
/// MongoDB store: ObjectId identifiers, a unique email, exact-match filters,
/// sort/skip/limit windows and `$set`-style merges with dotted paths. Used by
/// the test suite and for running the API without a database.
#[derive(Default)]
pub struct MemoryRepository {
    users: RwLock<Vec<User>>,
    records: RwLock<HashMap<Resource, Vec<Record>>>,
    /// When true, every operation fails with a storage error.
    pub should_fail: bool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    fn check(&self) -> RepoResult<()> {
        if self.should_fail {
            return Err(RepositoryError::Storage(
                "Memory Storage Error: Simulation requested".to_string(),
            ));
        }
        Ok(())
    }
}

fn duplicate_email(email: &str) -> RepositoryError {
    RepositoryError::DuplicateKey(format!(
        "E11000 duplicate key error collection: users index: email_1 dup key: {{ email: \"{email}\" }}"
    ))
}

fn matches(record: &Record, filter: &Record) -> bool {
    filter
        .iter()
        .all(|(key, expected)| record.get(key) == Some(expected))
}

/// Cross-type ordering in the spirit of the document store: missing/null,
/// then numbers, strings, objects, arrays, booleans.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

/// Writes `value` at a dotted path, creating intermediate objects the way
/// `$set` does. Descending into a non-object value is an error.
fn set_path(record: &mut Record, path: &str, value: Value) -> RepoResult<()> {
    let mut segments = path.split('.');
    let mut key = segments.next().unwrap_or_default();
    let mut target = record;

    for next in segments {
        if key.is_empty() {
            return Err(empty_segment(path));
        }
        let entry = target
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Record::new()));
        target = match entry {
            Value::Object(nested) => nested,
            other => {
                return Err(RepositoryError::Storage(format!(
                    "Cannot create field '{next}' in element {{{key}: {other}}}"
                )));
            }
        };
        key = next;
    }

    if key.is_empty() {
        return Err(empty_segment(path));
    }
    target.insert(key.to_string(), value);
    Ok(())
}

fn empty_segment(path: &str) -> RepositoryError {
    RepositoryError::Storage(format!(
        "The update path '{path}' contains an empty field name, which is not allowed."
    ))
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user(&self, id: &str) -> RepoResult<Option<User>> {
        self.check()?;
        if parse_object_id(id).is_none() {
            return Ok(None);
        }
        let users = self.users.read().await;
        Ok(users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.check()?;
        let users = self.users.read().await;
        Ok(users.iter().find(|user| user.email == email).cloned())
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        self.check()?;
        Ok(self.users.read().await.clone())
    }

    async fn insert_user(&self, user: NewUser) -> RepoResult<User> {
        self.check()?;
        let mut users = self.users.write().await;
        if users.iter().any(|existing| existing.email == user.email) {
            return Err(duplicate_email(&user.email));
        }

        let created = User {
            id: ObjectId::new().to_hex(),
            email: user.email,
            username: user.username,
            password: user.password,
            role: user.role,
            created_at: Some(user.created_at),
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: &str, changes: UserChanges) -> RepoResult<Option<User>> {
        self.check()?;
        let mut users = self.users.write().await;
        if !users.iter().any(|user| user.id == id) {
            return Ok(None);
        }

        if let Some(email) = &changes.email {
            if users.iter().any(|other| other.id != id && &other.email == email) {
                return Err(duplicate_email(email));
            }
        }

        let Some(user) = users.iter_mut().find(|user| user.id == id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(password) = changes.password {
            user.password = password;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: &str) -> RepoResult<bool> {
        self.check()?;
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|user| user.id != id);
        Ok(users.len() < before)
    }

    async fn count_records(&self, resource: Resource, filter: &Record) -> RepoResult<u64> {
        self.check()?;
        let records = self.records.read().await;
        let count = records
            .get(&resource)
            .map(|stored| stored.iter().filter(|record| matches(record, filter)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn find_records(&self, resource: Resource, query: &RecordQuery) -> RepoResult<Vec<Record>> {
        self.check()?;
        let records = self.records.read().await;
        let mut found: Vec<Record> = records
            .get(&resource)
            .map(|stored| {
                stored
                    .iter()
                    .filter(|record| matches(record, &query.filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let field = query.sort.field;
        found.sort_by(|a, b| {
            let ordering = compare_values(a.get(field), b.get(field));
            match query.sort.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn find_record(&self, resource: Resource, id: &str) -> RepoResult<Option<Record>> {
        self.check()?;
        let records = self.records.read().await;
        Ok(records.get(&resource).and_then(|stored| {
            stored
                .iter()
                .find(|record| record.get("_id").and_then(Value::as_str) == Some(id))
                .cloned()
        }))
    }

    async fn insert_record(
        &self,
        resource: Resource,
        fields: Record,
        created_at: DateTime<Utc>,
    ) -> RepoResult<Record> {
        self.check()?;
        let mut record = fields;
        record.insert("_id".into(), Value::String(ObjectId::new().to_hex()));
        record.insert(
            "createdAt".into(),
            Value::String(format_timestamp(&created_at)),
        );

        let mut records = self.records.write().await;
        records.entry(resource).or_default().push(record.clone());
        Ok(record)
    }

    async fn merge_record(
        &self,
        resource: Resource,
        id: &str,
        changes: Record,
    ) -> RepoResult<Option<Record>> {
        self.check()?;
        if changes
            .keys()
            .any(|path| path.split('.').next() == Some("_id"))
        {
            return Err(RepositoryError::Storage(
                "Performing an update on the path '_id' would modify the immutable field '_id'"
                    .to_string(),
            ));
        }

        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&resource).and_then(|stored| {
            stored
                .iter_mut()
                .find(|record| record.get("_id").and_then(Value::as_str) == Some(id))
        }) else {
            return Ok(None);
        };

        // All-or-nothing, like a single `$set`.
        let mut updated = record.clone();
        for (path, value) in changes {
            set_path(&mut updated, &path, value)?;
        }
        *record = updated;
        Ok(Some(record.clone()))
    }

    async fn delete_record(&self, resource: Resource, id: &str) -> RepoResult<bool> {
        self.check()?;
        let mut records = self.records.write().await;
        let Some(stored) = records.get_mut(&resource) else {
            return Ok(false);
        };
        let before = stored.len();
        stored.retain(|record| record.get("_id").and_then(Value::as_str) != Some(id));
        Ok(stored.len() < before)
    }
}
