//! Identity operations: registration, authentication, token resolution, and
//! account updates.

pub mod models;
pub mod validate;

use serde::Deserialize;
use tracing::{debug, info};

use crate::auth::{PasswordHasher, TokenIssuer};
use crate::error::{Error, ValidationError};
use crate::store::{Store, StoreError};

use self::models::{NewUser, User, UserView};
use self::validate::{validate_email, validate_password, validate_username};

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const USER_ACCOUNT_DISABLED: &str = "User account is disabled";
const EMAIL_ALREADY_EXISTS: &str = "A user with this email already exists.";
const USERNAME_ALREADY_EXISTS: &str = "A user with this username already exists.";

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Optional fields: `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

fn conflict(field: &str) -> Error {
    let message = match field {
        "username" => USERNAME_ALREADY_EXISTS,
        _ => EMAIL_ALREADY_EXISTS,
    };
    Error::Conflict(ValidationError::new(field, message))
}

/// Shape problems are reported together as `Validation`; duplicate
/// username/email as `Conflict`. Both are detected before any store write,
/// and the unique constraints catch whatever slips past the pre-checks.
pub fn register(
    store: &dyn Store,
    hasher: &dyn PasswordHasher,
    registration: Registration,
) -> Result<User, Error> {
    let mut errors = ValidationError::default();
    if let Err(e) = validate_username(&registration.username) {
        errors.merge(e);
    }
    if let Err(e) = validate_email(&registration.email) {
        errors.merge(e);
    }
    if let Err(e) = validate_password(&registration.password) {
        errors.merge(e);
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let mut conflicts = ValidationError::default();
    if store.username_exists(&registration.username, None)? {
        conflicts.add_error("username", USERNAME_ALREADY_EXISTS);
    }
    if store.email_exists(&registration.email, None)? {
        conflicts.add_error("email", EMAIL_ALREADY_EXISTS);
    }
    if !conflicts.is_empty() {
        return Err(Error::Conflict(conflicts));
    }

    let record = NewUser {
        username: registration.username,
        email: registration.email,
        password_hash: hasher.hash(&registration.password)?,
        bio: registration.bio,
        image: registration.image,
        active: true,
    };
    let user = match store.insert_user(record) {
        Ok(user) => user,
        // Lost a race with a concurrent registration of the same identity.
        Err(StoreError::UniqueViolation(field)) => return Err(conflict(field)),
        Err(err) => return Err(err.into()),
    };
    info!(user = user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Unknown email and bad password collapse into the same answer so the
/// response does not leak which accounts exist.
pub fn authenticate(
    store: &dyn Store,
    hasher: &dyn PasswordHasher,
    email: &str,
    password: &str,
) -> Result<User, Error> {
    let user = store
        .user_by_email(email)?
        .ok_or_else(|| Error::AuthenticationFailed(INVALID_CREDENTIALS.to_string()))?;
    if !hasher.verify(password, &user.password_hash)? {
        return Err(Error::AuthenticationFailed(INVALID_CREDENTIALS.to_string()));
    }
    if !user.active {
        return Err(Error::AuthenticationFailed(
            USER_ACCOUNT_DISABLED.to_string(),
        ));
    }
    Ok(user)
}

pub fn login(
    store: &dyn Store,
    hasher: &dyn PasswordHasher,
    issuer: &dyn TokenIssuer,
    email: &str,
    password: &str,
) -> Result<UserView, Error> {
    let user = authenticate(store, hasher, email, password)?;
    let token = issuer.issue(&user)?;
    debug!(user = user.id, "login succeeded");
    Ok(UserView::new(user, token))
}

/// Resolves the account behind an access token. A token whose subject no
/// longer resolves is treated like any other bad token.
pub fn user_from_token(
    store: &dyn Store,
    issuer: &dyn TokenIssuer,
    token: &str,
) -> Result<User, Error> {
    let user_id = issuer.decode(token)?;
    store
        .user_by_id(user_id)?
        .ok_or_else(|| Error::AuthenticationFailed(crate::auth::INVALID_TOKEN.to_string()))
}

pub fn update_user(
    store: &dyn Store,
    hasher: &dyn PasswordHasher,
    user: &User,
    update: UserUpdate,
) -> Result<User, Error> {
    let mut user = user.clone();
    let mut errors = ValidationError::default();
    let mut conflicts = ValidationError::default();

    if let Some(email) = update.email {
        match validate_email(&email) {
            Err(e) => errors.merge(e),
            Ok(()) => {
                if store.email_exists(&email, Some(user.id))? {
                    conflicts.add_error("email", EMAIL_ALREADY_EXISTS);
                }
                user.email = email;
            }
        }
    }
    if let Some(username) = update.username {
        match validate_username(&username) {
            Err(e) => errors.merge(e),
            Ok(()) => {
                if store.username_exists(&username, Some(user.id))? {
                    conflicts.add_error("username", USERNAME_ALREADY_EXISTS);
                }
                user.username = username;
            }
        }
    }
    if let Some(password) = update.password {
        match validate_password(&password) {
            Err(e) => errors.merge(e),
            Ok(()) => user.password_hash = hasher.hash(&password)?,
        }
    }
    if let Some(bio) = update.bio {
        user.bio = Some(bio);
    }
    if let Some(image) = update.image {
        user.image = Some(image);
    }

    if !errors.is_empty() {
        return Err(errors.into());
    }
    if !conflicts.is_empty() {
        return Err(Error::Conflict(conflicts));
    }

    let updated = match store.update_user(&user) {
        Ok(updated) => updated,
        Err(StoreError::UniqueViolation(field)) => return Err(conflict(field)),
        Err(err) => return Err(err.into()),
    };
    debug!(user = updated.id, "user updated");
    Ok(updated)
}
