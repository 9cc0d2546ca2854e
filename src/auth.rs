//! Credential hashing, access-token issuance, and the author-only gate.
//!
//! The hasher and issuer are contracts consumed by the identity operations;
//! the default implementations carry PBKDF2 and HS256 JWTs. Neither algorithm
//! choice leaks past this module.

use crypto::pbkdf2::{pbkdf2_check, pbkdf2_simple};
use jwt::{Header, Registered, Token};
use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::users::models::User;

const PBKDF2_ROUNDS: u32 = 1000;

pub const INVALID_TOKEN: &str = "Invalid access token";

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, Error>;

    fn verify(&self, password: &str, digest: &str) -> Result<bool, Error>;
}

/// PBKDF2-SHA256 hasher producing self-describing digests (salt and round
/// count embedded), so `verify` needs no side state.
pub struct Pbkdf2Hasher;

impl PasswordHasher for Pbkdf2Hasher {
    fn hash(&self, password: &str) -> Result<String, Error> {
        pbkdf2_simple(password, PBKDF2_ROUNDS)
            .map_err(|err| Error::Internal(format!("password hashing failed: {err}")))
    }

    fn verify(&self, password: &str, digest: &str) -> Result<bool, Error> {
        pbkdf2_check(password, digest)
            .map_err(|err| Error::Internal(format!("malformed password digest: {err}")))
    }
}

pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user: &User) -> Result<String, Error>;

    /// Returns the user id carried by a valid token.
    fn decode(&self, token: &str) -> Result<i32, Error>;
}

/// HS256 JWT issuer. Claims: `sub` carries the user id, `iss` the email.
pub struct JwtIssuer {
    secret: String,
}

impl JwtIssuer {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        JwtIssuer {
            secret: secret.into(),
        }
    }
}

impl TokenIssuer for JwtIssuer {
    fn issue(&self, user: &User) -> Result<String, Error> {
        let header = Header::default();
        let claims = Registered {
            iss: Some(user.email.clone()),
            sub: Some(user.id.to_string()),
            ..Default::default()
        };
        let token = Token::new(header, claims);
        token
            .signed(self.secret.as_bytes(), Sha256::new())
            .map_err(|_| Error::Internal("failed to sign access token".to_string()))
    }

    fn decode(&self, token: &str) -> Result<i32, Error> {
        let token = Token::<Header, Registered>::parse(token)
            .map_err(|_| Error::AuthenticationFailed(INVALID_TOKEN.to_string()))?;
        if !token.verify(self.secret.as_bytes(), Sha256::new()) {
            return Err(Error::AuthenticationFailed(INVALID_TOKEN.to_string()));
        }
        token
            .claims
            .sub
            .as_ref()
            .and_then(|sub| sub.parse::<i32>().ok())
            .ok_or_else(|| Error::AuthenticationFailed(INVALID_TOKEN.to_string()))
    }
}

/// Author-only mutation check: articles and comments may only be mutated by
/// the account that created them.
pub fn can_mutate(actor_id: i32, owner_id: i32) -> bool {
    actor_id == owner_id
}

/// Refuses the mutation with `PermissionDenied` when the actor is not the
/// owner. The resource stays visible; only the mutation is rejected.
pub fn ensure_owner(actor: &User, owner_id: i32, denial: &str) -> Result<(), Error> {
    if can_mutate(actor.id, owner_id) {
        Ok(())
    } else {
        Err(Error::PermissionDenied(denial.to_string()))
    }
}
