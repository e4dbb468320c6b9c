//! Integration tests for the user repository.

use chrono::{Duration, Utc};
use stratum_core::error::StratumError;
use stratum_core::models::user::{CreateUser, UpdateUser};
use stratum_core::repository::UserRepository;
use stratum_core::router::{Connector, SchemaKind};
use stratum_core::scope::{Scope, Scoped};
use stratum_db::{DbConfig, DbHandle, SqlConnector};

async fn setup() -> Scoped<DbHandle> {
    let connector = SqlConnector::new(DbConfig::in_memory()).unwrap();
    let handle = connector.connect("tenant_acme_db", SchemaKind::Tenant).await.unwrap();
    connector.ensure_schema(&handle, SchemaKind::Tenant).await.unwrap();
    Scoped::new(handle, Scope::isolated(1))
}

fn alice() -> CreateUser {
    CreateUser {
        username: "alice".into(),
        email: "Alice@Acme.com".into(),
        password_hash: "$argon2id$v=19$stub".into(),
        is_active: true,
    }
}

#[tokio::test]
async fn create_and_look_up() {
    let db = setup().await;
    let users = db.users();

    let user = users.create(alice()).await.unwrap();
    assert_eq!(user.tenant_id, 1);
    assert_eq!(user.email, "alice@acme.com");
    assert!(user.api_key_hash.is_none());

    assert_eq!(users.get_by_id(user.id).await.unwrap().id, user.id);
    assert_eq!(users.get_by_email("ALICE@acme.com").await.unwrap().id, user.id);
    assert_eq!(users.get_by_username("alice").await.unwrap().id, user.id);
    assert_eq!(users.get_by_login("alice").await.unwrap().id, user.id);
    assert_eq!(users.get_by_login("alice@acme.com").await.unwrap().id, user.id);
    assert!(users.get_by_login("mallory").await.unwrap_err().is_not_found());
    assert_eq!(users.count().await.unwrap(), 1);
}

#[tokio::test]
async fn duplicates_conflict() {
    let db = setup().await;
    let users = db.users();
    users.create(alice()).await.unwrap();

    let mut same_email = alice();
    same_email.username = "alice2".into();
    let err = users.create(same_email).await.unwrap_err();
    assert!(matches!(err, StratumError::AlreadyExists { .. }));

    let mut same_name = alice();
    same_name.email = "other@acme.com".into();
    let err = users.create(same_name).await.unwrap_err();
    assert!(matches!(err, StratumError::AlreadyExists { .. }));
}

#[tokio::test]
async fn partial_update_touches_only_given_fields() {
    let db = setup().await;
    let users = db.users();
    let user = users.create(alice()).await.unwrap();

    let updated = users
        .update(
            user.id,
            UpdateUser {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!updated.is_active);
    assert_eq!(updated.username, "alice");
    assert_eq!(updated.email, "alice@acme.com");

    let renamed = users
        .update(
            user.id,
            UpdateUser {
                username: Some("alicia".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.username, "alicia");
    assert!(!renamed.is_active);

    let err = users.update(9999, UpdateUser::default()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn api_key_storage() {
    let db = setup().await;
    let users = db.users();
    let user = users.create(alice()).await.unwrap();
    let digest = "a".repeat(64);
    let expires = Utc::now() + Duration::minutes(10);

    users.set_api_key(user.id, &digest, expires).await.unwrap();
    let holder = users.get_by_api_key_hash(&digest).await.unwrap();
    assert_eq!(holder.id, user.id);
    assert!(holder.has_live_api_key(Utc::now()));

    assert!(users.clear_api_key(&digest).await.unwrap());
    assert!(!users.clear_api_key(&digest).await.unwrap());
    assert!(users.get_by_api_key_hash(&digest).await.unwrap_err().is_not_found());

    let cleared = users.get_by_id(user.id).await.unwrap();
    assert!(cleared.api_key_hash.is_none());
    assert!(cleared.api_key_expires_at.is_none());
}

#[tokio::test]
async fn delete_and_list() {
    let db = setup().await;
    let users = db.users();
    let user = users.create(alice()).await.unwrap();
    assert_eq!(users.list().await.unwrap().len(), 1);

    users.delete(user.id).await.unwrap();
    assert!(users.list().await.unwrap().is_empty());
    assert!(users.delete(user.id).await.unwrap_err().is_not_found());
}
