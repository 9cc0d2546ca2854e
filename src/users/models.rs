use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::users;

/// Identity row. The password digest and the `active` flag never serialize.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, AsChangeset, Serialize)]
#[diesel(table_name = users)]
#[diesel(treat_none_as_null = true)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    #[serde(skip_serializing)]
    pub active: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub active: bool,
}

/// The authenticated-user payload handed back from `login`.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub token: String,
}

impl UserView {
    pub fn new(user: User, token: String) -> Self {
        UserView {
            username: user.username,
            email: user.email,
            bio: user.bio,
            image: user.image,
            token,
        }
    }
}
