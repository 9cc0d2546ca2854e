//! Transactional-store contract backing every component in this crate.
//!
//! The store is injected so the service layer stays independent of the
//! engine: [`crate::db::PgStore`] is the Postgres backend, [`MemStore`] the
//! in-memory one used by the test suite. Backends guarantee that every
//! method is atomic — composite writes (article plus its tag links, the
//! clear-then-add tag replace, cascade deletes) happen in one transaction,
//! so partial application is never observable by concurrent readers.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::article::{Article, ArticleFilter, NewArticle};
use crate::comment::{Comment, NewComment};
use crate::types::Pagination;
use crate::users::models::{NewUser, User};

mod memory;

pub use self::memory::MemStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// A unique constraint rejected the write; the payload names the field.
    /// The slug allocator catches `"slug"` violations and retries with the
    /// next candidate; everything else is terminal for the request.
    #[error("unique constraint violated on {0}")]
    UniqueViolation(&'static str),

    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database: {0}")]
    Database(diesel::result::Error),
}

pub trait Store: Send + Sync {
    // Identity.
    fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    fn user_by_id(&self, id: i32) -> Result<Option<User>, StoreError>;
    fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    fn users_by_ids(&self, ids: &[i32]) -> Result<HashMap<i32, User>, StoreError>;
    fn update_user(&self, user: &User) -> Result<User, StoreError>;
    fn username_exists(&self, username: &str, exclude: Option<i32>) -> Result<bool, StoreError>;
    fn email_exists(&self, email: &str, exclude: Option<i32>) -> Result<bool, StoreError>;

    // Follow graph. Inserts and deletes are idempotent set operations.
    fn insert_follow(&self, follower_id: i32, followed_id: i32) -> Result<(), StoreError>;
    fn delete_follow(&self, follower_id: i32, followed_id: i32) -> Result<(), StoreError>;
    fn is_following(&self, follower_id: i32, followed_id: i32) -> Result<bool, StoreError>;
    /// Which of `user_ids` does `follower_id` follow.
    fn following_map(
        &self,
        follower_id: i32,
        user_ids: &[i32],
    ) -> Result<HashSet<i32>, StoreError>;

    // Articles.
    fn slug_exists(&self, slug: &str, exclude: Option<i32>) -> Result<bool, StoreError>;
    /// Inserts the article and its tag links atomically, creating missing
    /// tags. Fails with `UniqueViolation("slug")` when a concurrent writer
    /// claimed the slug between the existence check and this insert.
    fn insert_article(
        &self,
        article: NewArticle,
        tag_names: &[String],
    ) -> Result<Article, StoreError>;
    /// Persists the mutated row; `Some(tag_names)` replaces the full tag
    /// association set (clear-then-add) in the same transaction.
    fn update_article(
        &self,
        article: &Article,
        tag_names: Option<&[String]>,
    ) -> Result<Article, StoreError>;
    fn article_by_slug(&self, slug: &str) -> Result<Option<Article>, StoreError>;
    /// Deletes the article and cascades to comments, favorites and tag
    /// links. Tag rows themselves are never deleted.
    fn delete_article(&self, article_id: i32) -> Result<(), StoreError>;
    /// Filtered page plus the total (unpaginated) match count.
    fn list_articles(
        &self,
        filter: &ArticleFilter,
        page: Pagination,
    ) -> Result<(Vec<Article>, i64), StoreError>;
    /// Articles authored by accounts `follower_id` follows, newest first.
    fn feed_articles(
        &self,
        follower_id: i32,
        page: Pagination,
    ) -> Result<(Vec<Article>, i64), StoreError>;

    // Favorites. Same set semantics as the follow graph.
    fn insert_favorite(&self, user_id: i32, article_id: i32) -> Result<(), StoreError>;
    fn delete_favorite(&self, user_id: i32, article_id: i32) -> Result<(), StoreError>;
    /// Which of `article_ids` has `user_id` favorited.
    fn favorited_map(
        &self,
        user_id: i32,
        article_ids: &[i32],
    ) -> Result<HashSet<i32>, StoreError>;
    fn favorites_counts(&self, article_ids: &[i32]) -> Result<HashMap<i32, i64>, StoreError>;

    // Tags.
    fn tags_map(&self, article_ids: &[i32]) -> Result<HashMap<i32, Vec<String>>, StoreError>;
    fn distinct_tags(&self) -> Result<Vec<String>, StoreError>;

    // Comments.
    fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError>;
    fn comment_by_id(&self, comment_id: i32) -> Result<Option<Comment>, StoreError>;
    fn comments_of_article(&self, article_id: i32) -> Result<Vec<Comment>, StoreError>;
    fn delete_comment(&self, comment_id: i32) -> Result<(), StoreError>;
}
