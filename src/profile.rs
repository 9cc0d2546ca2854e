//! Public profile views and the follow toggle. Follow edges are directed
//! and asymmetric: A following B says nothing about B following A.

use serde::Serialize;
use tracing::debug;

use crate::error::Error;
use crate::store::Store;
use crate::users::models::User;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub username: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub following: bool,
}

impl Profile {
    pub(crate) fn of(user: &User, following: bool) -> Profile {
        Profile {
            username: user.username.clone(),
            bio: user.bio.clone(),
            image: user.image.clone(),
            following,
        }
    }
}

pub fn get_profile(
    store: &dyn Store,
    viewer: Option<&User>,
    username: &str,
) -> Result<Profile, Error> {
    let user = store.user_by_username(username)?.ok_or(Error::NotFound)?;
    let following = match viewer {
        Some(viewer) => store.is_following(viewer.id, user.id)?,
        None => false,
    };
    Ok(Profile::of(&user, following))
}

/// Fails with `SelfFollow` before touching the store when `follower` names
/// their own profile; otherwise an idempotent edge insert.
pub fn follow(store: &dyn Store, follower: &User, username: &str) -> Result<Profile, Error> {
    let followed = store.user_by_username(username)?.ok_or(Error::NotFound)?;
    if follower.id == followed.id {
        return Err(Error::SelfFollow);
    }
    store.insert_follow(follower.id, followed.id)?;
    debug!(follower = follower.id, followed = followed.id, "follow edge added");
    Ok(Profile::of(&followed, true))
}

/// Idempotent: unfollowing an account the user never followed is a no-op.
pub fn unfollow(store: &dyn Store, follower: &User, username: &str) -> Result<Profile, Error> {
    let followed = store.user_by_username(username)?.ok_or(Error::NotFound)?;
    store.delete_follow(follower.id, followed.id)?;
    debug!(follower = follower.id, followed = followed.id, "follow edge removed");
    Ok(Profile::of(&followed, false))
}
