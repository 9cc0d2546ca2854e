mod common;

use common::register_user;
use conduit::auth::{JwtIssuer, PasswordHasher, Pbkdf2Hasher, TokenIssuer};
use conduit::users::{self, Registration, UserUpdate};
use conduit::{Error, MemStore, Store};

fn registration(username: &str, email: &str) -> Registration {
    Registration {
        username: username.to_string(),
        email: email.to_string(),
        password: "testpass123".to_string(),
        bio: None,
        image: None,
    }
}

#[test]
fn register_creates_account() {
    let store = MemStore::new();
    let hasher = Pbkdf2Hasher;
    let user = users::register(
        &store,
        &hasher,
        Registration {
            bio: Some("Test bio".to_string()),
            ..registration("testuser", "test@example.com")
        },
    )
    .unwrap();

    assert_eq!(user.username, "testuser");
    assert_eq!(user.email, "test@example.com");
    assert_eq!(user.bio.as_deref(), Some("Test bio"));
    assert!(user.active);
    assert_ne!(user.password_hash, "testpass123");
    assert!(hasher.verify("testpass123", &user.password_hash).unwrap());
}

#[test]
fn register_rejects_duplicate_email() {
    let store = MemStore::new();
    register_user(&store, "testuser");

    let err = users::register(
        &store,
        &Pbkdf2Hasher,
        registration("otheruser", "testuser@example.com"),
    )
    .unwrap_err();
    match err {
        Error::Conflict(fields) => assert!(fields.contains("email")),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn register_rejects_duplicate_username() {
    let store = MemStore::new();
    register_user(&store, "testuser");

    let err = users::register(
        &store,
        &Pbkdf2Hasher,
        registration("testuser", "other@example.com"),
    )
    .unwrap_err();
    match err {
        Error::Conflict(fields) => assert!(fields.contains("username")),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn register_reports_every_shape_problem_at_once() {
    let store = MemStore::new();
    let err = users::register(
        &store,
        &Pbkdf2Hasher,
        Registration {
            username: "x".to_string(),
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            bio: None,
            image: None,
        },
    )
    .unwrap_err();
    match err {
        Error::Validation(fields) => {
            assert!(fields.contains("username"));
            assert!(fields.contains("email"));
            assert!(fields.contains("password"));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    // Nothing was written.
    assert!(store.user_by_username("x").unwrap().is_none());
}

#[test]
fn login_round_trip() {
    let store = MemStore::new();
    let issuer = JwtIssuer::new("secret");
    register_user(&store, "testuser");

    let view = users::login(
        &store,
        &Pbkdf2Hasher,
        &issuer,
        "testuser@example.com",
        "testpass123",
    )
    .unwrap();
    assert_eq!(view.username, "testuser");
    assert!(!view.token.is_empty());

    let resolved = users::user_from_token(&store, &issuer, &view.token).unwrap();
    assert_eq!(resolved.username, "testuser");
}

#[test]
fn login_rejects_wrong_password() {
    let store = MemStore::new();
    register_user(&store, "testuser");

    let err = users::login(
        &store,
        &Pbkdf2Hasher,
        &JwtIssuer::new("secret"),
        "testuser@example.com",
        "wrongpass123",
    )
    .unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailed(_)));
}

#[test]
fn login_rejects_unknown_email() {
    let store = MemStore::new();
    let err = users::login(
        &store,
        &Pbkdf2Hasher,
        &JwtIssuer::new("secret"),
        "nobody@example.com",
        "testpass123",
    )
    .unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailed(_)));
}

#[test]
fn login_rejects_disabled_account() {
    let store = MemStore::new();
    let mut user = register_user(&store, "testuser");
    user.active = false;
    store.update_user(&user).unwrap();

    let err = users::login(
        &store,
        &Pbkdf2Hasher,
        &JwtIssuer::new("secret"),
        "testuser@example.com",
        "testpass123",
    )
    .unwrap_err();
    match err {
        Error::AuthenticationFailed(message) => assert!(message.contains("disabled")),
        other => panic!("expected authentication failure, got {other:?}"),
    }
}

#[test]
fn token_for_vanished_user_is_rejected() {
    let store = MemStore::new();
    let issuer = JwtIssuer::new("secret");
    let user = register_user(&store, "testuser");
    let other_store = MemStore::new();

    let token = issuer.issue(&user).unwrap();
    let err = users::user_from_token(&other_store, &issuer, &token).unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailed(_)));
}

#[test]
fn update_user_replaces_optional_fields() {
    let store = MemStore::new();
    let user = register_user(&store, "testuser");

    let updated = users::update_user(
        &store,
        &Pbkdf2Hasher,
        &user,
        UserUpdate {
            bio: Some("New bio".to_string()),
            image: Some("https://example.com/image.jpg".to_string()),
            ..UserUpdate::default()
        },
    )
    .unwrap();
    assert_eq!(updated.bio.as_deref(), Some("New bio"));
    assert_eq!(updated.image.as_deref(), Some("https://example.com/image.jpg"));
    // Untouched fields survive.
    assert_eq!(updated.username, "testuser");
    assert_eq!(updated.email, "testuser@example.com");
}

#[test]
fn update_user_rejects_taken_username() {
    let store = MemStore::new();
    register_user(&store, "testuser");
    let other = register_user(&store, "otheruser");

    let err = users::update_user(
        &store,
        &Pbkdf2Hasher,
        &other,
        UserUpdate {
            username: Some("testuser".to_string()),
            ..UserUpdate::default()
        },
    )
    .unwrap_err();
    match err {
        Error::Conflict(fields) => assert!(fields.contains("username")),
        other => panic!("expected conflict, got {other:?}"),
    }
    // The rename did not go through.
    let unchanged = store.user_by_id(other.id).unwrap().unwrap();
    assert_eq!(unchanged.username, "otheruser");
}

#[test]
fn update_user_keeping_own_username_is_not_a_conflict() {
    let store = MemStore::new();
    let user = register_user(&store, "testuser");

    let updated = users::update_user(
        &store,
        &Pbkdf2Hasher,
        &user,
        UserUpdate {
            username: Some("testuser".to_string()),
            bio: Some("still me".to_string()),
            ..UserUpdate::default()
        },
    )
    .unwrap();
    assert_eq!(updated.username, "testuser");
    assert_eq!(updated.bio.as_deref(), Some("still me"));
}

#[test]
fn update_user_rehashes_password() {
    let store = MemStore::new();
    let issuer = JwtIssuer::new("secret");
    let user = register_user(&store, "testuser");

    users::update_user(
        &store,
        &Pbkdf2Hasher,
        &user,
        UserUpdate {
            password: Some("newpassword1".to_string()),
            ..UserUpdate::default()
        },
    )
    .unwrap();

    assert!(users::login(
        &store,
        &Pbkdf2Hasher,
        &issuer,
        "testuser@example.com",
        "newpassword1",
    )
    .is_ok());
    assert!(matches!(
        users::login(
            &store,
            &Pbkdf2Hasher,
            &issuer,
            "testuser@example.com",
            "testpass123",
        ),
        Err(Error::AuthenticationFailed(_))
    ));
}
