//! Comments are append-only: created by any authenticated account, deleted
//! only by their author (or implicitly when their article goes away).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::auth::ensure_owner;
use crate::db::schema::comments;
use crate::error::{Error, ValidationError};
use crate::profile::Profile;
use crate::store::Store;
use crate::users::models::User;
use crate::utils::serialize_date;

const CANNOT_DELETE_OTHERS_COMMENTS: &str = "You can only delete your own comments";

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Serialize)]
#[diesel(table_name = comments)]
pub struct Comment {
    pub id: i32,
    pub article_id: i32,
    pub author_id: i32,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment {
    pub article_id: i32,
    pub author_id: i32,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: i32,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_date")]
    pub updated_at: DateTime<Utc>,
    pub body: String,
    pub author: Profile,
}

impl From<(Comment, Profile)> for CommentView {
    fn from((comment, author): (Comment, Profile)) -> Self {
        CommentView {
            id: comment.id,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            body: comment.body,
            author,
        }
    }
}

pub fn add_comment(
    store: &dyn Store,
    author: &User,
    slug: &str,
    body: &str,
) -> Result<CommentView, Error> {
    if body.trim().is_empty() {
        return Err(ValidationError::new("body", "empty body").into());
    }
    let article = store.article_by_slug(slug)?.ok_or(Error::NotFound)?;
    let now = Utc::now();
    let comment = store.insert_comment(NewComment {
        article_id: article.id,
        author_id: author.id,
        body: body.to_string(),
        created_at: now,
        updated_at: now,
    })?;
    debug!(comment = comment.id, article = article.id, "comment added");
    Ok((comment, Profile::of(author, false)).into())
}

/// Newest first; comment authors are hydrated with one bulk lookup and the
/// viewer's follow memberships with another.
pub fn list_comments(
    store: &dyn Store,
    viewer: Option<&User>,
    slug: &str,
) -> Result<Vec<CommentView>, Error> {
    let article = store.article_by_slug(slug)?.ok_or(Error::NotFound)?;
    let rows = store.comments_of_article(article.id)?;
    let author_ids: Vec<i32> = rows.iter().map(|comment| comment.author_id).collect();
    let authors = store.users_by_ids(&author_ids)?;
    let following = match viewer {
        Some(viewer) => store.following_map(viewer.id, &author_ids)?,
        None => HashSet::new(),
    };

    rows.into_iter()
        .map(|comment| {
            let author = authors.get(&comment.author_id).ok_or(Error::NotFound)?;
            let profile = Profile::of(author, following.contains(&author.id));
            Ok((comment, profile).into())
        })
        .collect()
}

pub fn delete_comment(store: &dyn Store, actor: &User, comment_id: i32) -> Result<(), Error> {
    let comment = store.comment_by_id(comment_id)?.ok_or(Error::NotFound)?;
    ensure_owner(actor, comment.author_id, CANNOT_DELETE_OTHERS_COMMENTS)?;
    store.delete_comment(comment.id)?;
    debug!(comment = comment.id, "comment deleted");
    Ok(())
}
