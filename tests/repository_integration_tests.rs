use chrono::Utc;
use food_express::{
    MemoryRepository, MongoRepository,
    models::{NewUser, Record, Resource, Role, UserChanges},
    pagination::{Sort, SortOrder},
    repository::{RecordQuery, Repository, RepositoryError},
};
use mongodb::bson::oid::ObjectId;
use serde_json::{Value, json};
use tokio::test;

// --- Test Context and Setup ---

/// Connects to the database named by MONGO_URI, in a throwaway database so
/// runs never see each other's documents.
async fn mongo_repo() -> MongoRepository {
    dotenv::dotenv().ok();

    let uri = std::env::var("MONGO_URI").expect("MONGO_URI must be set to run integration tests");
    let db_name = format!("foodexpress_test_{}", ObjectId::new().to_hex());

    MongoRepository::connect(&uri, &db_name)
        .await
        .expect("Failed to connect to MongoDB for integration tests.")
}

fn new_user(email: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        username: "uma".to_string(),
        password: "pw".to_string(),
        role: Role::User,
        created_at: Utc::now(),
    }
}

fn fields(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}

fn query(filter: Record, field: &'static str, order: SortOrder, skip: u64, limit: u64) -> RecordQuery {
    RecordQuery {
        filter,
        sort: Sort { field, order },
        skip,
        limit,
    }
}

// --- Shared contract ---
// Both backends must behave identically; each check runs against either.

async fn check_user_lifecycle(repo: &dyn Repository) {
    let created = repo.insert_user(new_user("uma@example.com")).await.unwrap();
    assert!(ObjectId::parse_str(&created.id).is_ok());
    assert_eq!(created.role, Role::User);

    let err = repo.insert_user(new_user("uma@example.com")).await.unwrap_err();
    assert!(matches!(err, RepositoryError::DuplicateKey(_)));

    let found = repo.find_user(&created.id).await.unwrap().unwrap();
    assert_eq!(found.email, "uma@example.com");
    assert!(found.created_at.is_some());

    let by_email = repo.find_user_by_email("uma@example.com").await.unwrap();
    assert_eq!(by_email.map(|user| user.id), Some(created.id.clone()));

    let updated = repo
        .update_user(
            &created.id,
            UserChanges {
                role: Some(Role::Admin),
                username: Some("uma2".into()),
                ..UserChanges::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.role, Role::Admin);
    assert_eq!(updated.username, "uma2");
    assert_eq!(updated.password, "pw");

    let unchanged = repo
        .update_user(&created.id, UserChanges::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.username, "uma2");

    assert!(repo.find_user("not-an-id").await.unwrap().is_none());
    assert!(
        repo.update_user("not-an-id", UserChanges::default())
            .await
            .unwrap()
            .is_none()
    );

    assert!(repo.delete_user(&created.id).await.unwrap());
    assert!(!repo.delete_user(&created.id).await.unwrap());
    assert!(repo.list_users().await.unwrap().is_empty());
}

async fn check_email_conflict_on_update(repo: &dyn Repository) {
    let first = repo.insert_user(new_user("vic@example.com")).await.unwrap();
    repo.insert_user(new_user("wes@example.com")).await.unwrap();

    let err = repo
        .update_user(
            &first.id,
            UserChanges {
                email: Some("wes@example.com".into()),
                ..UserChanges::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::DuplicateKey(_)));
}

async fn check_record_window(repo: &dyn Repository) {
    for (name, price) in [("c", 3), ("a", 1), ("b", 2), ("d", 4)] {
        repo.insert_record(
            Resource::Menus,
            fields(json!({ "restaurant_id": "r1", "name": name, "price": price })),
            Utc::now(),
        )
        .await
        .unwrap();
    }
    repo.insert_record(
        Resource::Menus,
        fields(json!({ "restaurant_id": "r2", "name": "z", "price": 0 })),
        Utc::now(),
    )
    .await
    .unwrap();

    let filter = fields(json!({ "restaurant_id": "r1" }));
    assert_eq!(repo.count_records(Resource::Menus, &filter).await.unwrap(), 4);
    assert_eq!(repo.count_records(Resource::Menus, &Record::new()).await.unwrap(), 5);
    assert_eq!(repo.count_records(Resource::Restaurants, &Record::new()).await.unwrap(), 0);

    let page = repo
        .find_records(
            Resource::Menus,
            &query(filter.clone(), "price", SortOrder::Desc, 1, 2),
        )
        .await
        .unwrap();
    let names: Vec<&str> = page.iter().filter_map(|item| item["name"].as_str()).collect();
    assert_eq!(names, ["c", "b"]);

    let past_end = repo
        .find_records(Resource::Menus, &query(filter, "price", SortOrder::Asc, 10, 2))
        .await
        .unwrap();
    assert!(past_end.is_empty());
}

async fn check_record_lifecycle(repo: &dyn Repository) {
    let created = repo
        .insert_record(
            Resource::Restaurants,
            fields(json!({ "name": "Umami", "address": "4 Oak Rd" })),
            Utc::now(),
        )
        .await
        .unwrap();
    let id = created["_id"].as_str().unwrap().to_string();
    assert!(created["createdAt"].as_str().unwrap().ends_with('Z'));

    let fetched = repo.find_record(Resource::Restaurants, &id).await.unwrap();
    assert_eq!(fetched.as_ref(), Some(&created));

    // Not visible through the other collection.
    assert!(repo.find_record(Resource::Menus, &id).await.unwrap().is_none());

    let merged = repo
        .merge_record(
            Resource::Restaurants,
            &id,
            fields(json!({ "address": "5 Oak Rd", "featured": true })),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(merged["address"], "5 Oak Rd");
    assert_eq!(merged["featured"], true);
    assert_eq!(merged["name"], "Umami");

    // Dotted keys address nested fields.
    let nested = repo
        .merge_record(
            Resource::Restaurants,
            &id,
            fields(json!({ "owner.name": "Ada", "owner.since": 2020 })),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(nested["owner"], json!({ "name": "Ada", "since": 2020 }));
    assert!(nested.get("owner.name").is_none());

    // Cannot descend into a scalar; nothing is written.
    let err = repo
        .merge_record(
            Resource::Restaurants,
            &id,
            fields(json!({ "featured": false, "name.first": "U" })),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Storage(_)));

    let err = repo
        .merge_record(Resource::Restaurants, &id, fields(json!({ "_id": "x" })))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Storage(_)));

    let merged = repo
        .find_record(Resource::Restaurants, &id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(merged["featured"], true);
    assert_eq!(merged["name"], "Umami");

    let same = repo
        .merge_record(Resource::Restaurants, &id, Record::new())
        .await
        .unwrap();
    assert_eq!(same, Some(merged));

    assert!(
        repo.merge_record(Resource::Restaurants, "nope", fields(json!({ "a": 1 })))
            .await
            .unwrap()
            .is_none()
    );

    assert!(repo.delete_record(Resource::Restaurants, &id).await.unwrap());
    assert!(!repo.delete_record(Resource::Restaurants, &id).await.unwrap());
    assert!(!repo.delete_record(Resource::Restaurants, "nope").await.unwrap());
}

// --- In-memory backend ---

#[test]
async fn test_memory_user_lifecycle() {
    check_user_lifecycle(&MemoryRepository::new()).await;
}

#[test]
async fn test_memory_email_conflict_on_update() {
    check_email_conflict_on_update(&MemoryRepository::new()).await;
}

#[test]
async fn test_memory_record_window() {
    check_record_window(&MemoryRepository::new()).await;
}

#[test]
async fn test_memory_record_lifecycle() {
    check_record_lifecycle(&MemoryRepository::new()).await;
}

#[test]
async fn test_memory_failure_simulation() {
    let repo = MemoryRepository::new_failing();
    let err = repo.list_users().await.unwrap_err();
    assert_eq!(
        err,
        RepositoryError::Storage("Memory Storage Error: Simulation requested".into())
    );
}

// --- MongoDB backend ---

#[test]
#[ignore = "requires a running MongoDB (set MONGO_URI)"]
async fn test_mongo_user_lifecycle() {
    check_user_lifecycle(&mongo_repo().await).await;
}

#[test]
#[ignore = "requires a running MongoDB (set MONGO_URI)"]
async fn test_mongo_email_conflict_on_update() {
    check_email_conflict_on_update(&mongo_repo().await).await;
}

#[test]
#[ignore = "requires a running MongoDB (set MONGO_URI)"]
async fn test_mongo_record_window() {
    check_record_window(&mongo_repo().await).await;
}

#[test]
#[ignore = "requires a running MongoDB (set MONGO_URI)"]
async fn test_mongo_record_lifecycle() {
    check_record_lifecycle(&mongo_repo().await).await;
}
