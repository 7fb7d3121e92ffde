use crate::models::{NewUser, Record, Resource, Role, User, UserChanges};
use crate::pagination::Sort;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{self, Bson, Document, doc, oid::ObjectId},
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Server error code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// RepositoryError
///
/// Failures surfaced by a storage backend. A unique index violation is kept
/// apart so handlers can report it as a client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("{0}")]
    DuplicateKey(String),
    #[error("{0}")]
    Storage(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Parses an identifier in the store's native format (24 hex chars).
pub fn parse_object_id(raw: &str) -> Option<ObjectId> {
    ObjectId::parse_str(raw).ok()
}

/// RecordQuery
///
/// Filter, sort and window for listing a schemaless collection. The filter is
/// an exact-match on every field it contains.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub filter: Record,
    pub sort: Sort,
    pub skip: u64,
    pub limit: u64,
}

/// Repository Trait
///
/// The storage contract shared by all handlers. Implementations are shared as
/// `Arc<dyn Repository>`, so the trait must be `Send + Sync`.
///
/// Lookups by id return `Ok(None)` (or `false`) when the id is not a valid
/// identifier, since such an id cannot address any record.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn find_user(&self, id: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
    // Fails with `DuplicateKey` when the email is taken.
    async fn insert_user(&self, user: NewUser) -> RepoResult<User>;
    // Returns the user after the update. An empty change set is a plain read.
    async fn update_user(&self, id: &str, changes: UserChanges) -> RepoResult<Option<User>>;
    async fn delete_user(&self, id: &str) -> RepoResult<bool>;

    // --- Restaurants & Menus ---
    async fn count_records(&self, resource: Resource, filter: &Record) -> RepoResult<u64>;
    async fn find_records(&self, resource: Resource, query: &RecordQuery) -> RepoResult<Vec<Record>>;
    async fn find_record(&self, resource: Resource, id: &str) -> RepoResult<Option<Record>>;
    // Stores `fields` plus `createdAt` and returns the document with its `_id`.
    async fn insert_record(
        &self,
        resource: Resource,
        fields: Record,
        created_at: DateTime<Utc>,
    ) -> RepoResult<Record>;
    // `$set`-style merge with no field allow-list. Returns the updated document.
    async fn merge_record(
        &self,
        resource: Resource,
        id: &str,
        changes: Record,
    ) -> RepoResult<Option<Record>>;
    async fn delete_record(&self, resource: Resource, id: &str) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share storage access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// MongoRepository
///
/// The `Repository` implementation backed by MongoDB. Holds the single client
/// handle created at startup.
pub struct MongoRepository {
    db: Database,
}

impl MongoRepository {
    /// Wraps an already-selected database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// connect
    ///
    /// Opens the client, selects `db_name` and makes sure the unique email
    /// index exists. The index creation doubles as the connectivity check.
    pub async fn connect(uri: &str, db_name: &str) -> RepoResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let repo = Self::new(client.database(db_name));
        repo.ensure_indexes().await?;
        tracing::info!(db = %db_name, "connected to MongoDB");
        Ok(repo)
    }

    /// Creates the unique index on `users.email`. Idempotent.
    pub async fn ensure_indexes(&self) -> RepoResult<()> {
        let index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users().create_index(index).await?;
        Ok(())
    }

    fn users(&self) -> Collection<Document> {
        self.db.collection("users")
    }

    fn records(&self, resource: Resource) -> Collection<Document> {
        self.db.collection(resource.collection())
    }
}

#[async_trait]
impl Repository for MongoRepository {
    async fn find_user(&self, id: &str) -> RepoResult<Option<User>> {
        let Some(oid) = parse_object_id(id) else {
            return Ok(None);
        };
        let found = self.users().find_one(doc! { "_id": oid }).await?;
        found.map(user_from_document).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let found = self.users().find_one(doc! { "email": email }).await?;
        found.map(user_from_document).transpose()
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        let documents: Vec<Document> = self.users().find(doc! {}).await?.try_collect().await?;
        documents.into_iter().map(user_from_document).collect()
    }

    async fn insert_user(&self, user: NewUser) -> RepoResult<User> {
        let document = doc! {
            "email": user.email.as_str(),
            "username": user.username.as_str(),
            "password": user.password.as_str(),
            "role": user.role.as_str(),
            "createdAt": to_bson_datetime(&user.created_at),
        };
        let inserted = self.users().insert_one(document).await?;
        let id = inserted
            .inserted_id
            .as_object_id()
            .map(|oid| oid.to_hex())
            .ok_or_else(|| RepositoryError::Storage("insert returned a non-ObjectId _id".into()))?;

        Ok(User {
            id,
            email: user.email,
            username: user.username,
            password: user.password,
            role: user.role,
            created_at: Some(user.created_at),
        })
    }

    async fn update_user(&self, id: &str, changes: UserChanges) -> RepoResult<Option<User>> {
        let Some(oid) = parse_object_id(id) else {
            return Ok(None);
        };

        if changes.is_empty() {
            let found = self.users().find_one(doc! { "_id": oid }).await?;
            return found.map(user_from_document).transpose();
        }

        let mut set = Document::new();
        if let Some(email) = changes.email {
            set.insert("email", email);
        }
        if let Some(username) = changes.username {
            set.insert("username", username);
        }
        if let Some(password) = changes.password {
            set.insert("password", password);
        }
        if let Some(role) = changes.role {
            set.insert("role", role.as_str());
        }

        let found = self
            .users()
            .find_one_and_update(doc! { "_id": oid }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?;
        found.map(user_from_document).transpose()
    }

    async fn delete_user(&self, id: &str) -> RepoResult<bool> {
        let Some(oid) = parse_object_id(id) else {
            return Ok(false);
        };
        let result = self.users().delete_one(doc! { "_id": oid }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn count_records(&self, resource: Resource, filter: &Record) -> RepoResult<u64> {
        let filter = to_document(filter)?;
        Ok(self.records(resource).count_documents(filter).await?)
    }

    async fn find_records(&self, resource: Resource, query: &RecordQuery) -> RepoResult<Vec<Record>> {
        let filter = to_document(&query.filter)?;
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let mut sort = Document::new();
        sort.insert(query.sort.field, query.sort.order.direction());

        let documents: Vec<Document> = self
            .records(resource)
            .find(filter)
            .sort(sort)
            .skip(query.skip)
            .limit(limit)
            .await?
            .try_collect()
            .await?;
        Ok(documents.into_iter().map(document_to_record).collect())
    }

    async fn find_record(&self, resource: Resource, id: &str) -> RepoResult<Option<Record>> {
        let Some(oid) = parse_object_id(id) else {
            return Ok(None);
        };
        let found = self.records(resource).find_one(doc! { "_id": oid }).await?;
        Ok(found.map(document_to_record))
    }

    async fn insert_record(
        &self,
        resource: Resource,
        fields: Record,
        created_at: DateTime<Utc>,
    ) -> RepoResult<Record> {
        let mut document = to_document(&fields)?;
        document.insert("createdAt", to_bson_datetime(&created_at));

        let inserted = self.records(resource).insert_one(&document).await?;
        document.insert("_id", inserted.inserted_id);
        Ok(document_to_record(document))
    }

    async fn merge_record(
        &self,
        resource: Resource,
        id: &str,
        changes: Record,
    ) -> RepoResult<Option<Record>> {
        let Some(oid) = parse_object_id(id) else {
            return Ok(None);
        };

        let collection = self.records(resource);
        let found = if changes.is_empty() {
            collection.find_one(doc! { "_id": oid }).await?
        } else {
            collection
                .find_one_and_update(doc! { "_id": oid }, doc! { "$set": to_document(&changes)? })
                .return_document(ReturnDocument::After)
                .await?
        };
        Ok(found.map(document_to_record))
    }

    async fn delete_record(&self, resource: Resource, id: &str) -> RepoResult<bool> {
        let Some(oid) = parse_object_id(id) else {
            return Ok(false);
        };
        let result = self.records(resource).delete_one(doc! { "_id": oid }).await?;
        Ok(result.deleted_count > 0)
    }
}

impl From<mongodb::error::Error> for RepositoryError {
    fn from(err: mongodb::error::Error) -> Self {
        let duplicate = match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY_CODE,
            ErrorKind::Command(command) => command.code == DUPLICATE_KEY_CODE,
            _ => false,
        };

        if duplicate {
            RepositoryError::DuplicateKey(err.to_string())
        } else {
            tracing::error!("MongoDB error: {:?}", err);
            RepositoryError::Storage(err.to_string())
        }
    }
}

impl From<bson::ser::Error> for RepositoryError {
    fn from(err: bson::ser::Error) -> Self {
        RepositoryError::Storage(err.to_string())
    }
}

// --- BSON <-> JSON mapping ---

fn to_bson_datetime(at: &DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(at.timestamp_millis())
}

fn from_bson_datetime(at: &bson::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(at.timestamp_millis())
}

fn to_document(record: &Record) -> RepoResult<Document> {
    Ok(bson::to_document(record)?)
}

/// Converts a stored document into its client-facing JSON shape.
pub fn document_to_record(document: Document) -> Record {
    document
        .into_iter()
        .map(|(key, value)| (key, bson_to_json(value)))
        .collect()
}

/// bson_to_json
///
/// ObjectIds become their hex string and dates an RFC 3339 string. Nested
/// documents and arrays are converted recursively; every other value uses
/// relaxed extended JSON.
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(at) => from_bson_datetime(&at)
            .map(|at| Value::String(crate::models::format_timestamp(&at)))
            .unwrap_or(Value::Null),
        Bson::Document(document) => Value::Object(document_to_record(document)),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}

fn user_from_document(document: Document) -> RepoResult<User> {
    let id = document
        .get_object_id("_id")
        .map_err(|e| RepositoryError::Storage(format!("user document without _id: {e}")))?;
    let text = |key: &str| document.get_str(key).unwrap_or_default().to_string();

    Ok(User {
        id: id.to_hex(),
        email: text("email"),
        username: text("username"),
        password: text("password"),
        role: Role::parse(document.get_str("role").unwrap_or_default()),
        created_at: document
            .get_datetime("createdAt")
            .ok()
            .and_then(from_bson_datetime),
    })
}
