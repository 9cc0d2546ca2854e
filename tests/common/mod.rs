//! Shared harness for the service-level tests: a fresh in-memory backend per
//! test, canned fixtures, and an instrumented store wrapper for exercising
//! the slug race and the tag-cache read-through.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use conduit::article::{Article, ArticleDraft, ArticleFilter, NewArticle};
use conduit::auth::Pbkdf2Hasher;
use conduit::comment::{Comment, NewComment};
use conduit::users::models::{NewUser, User};
use conduit::users::{self, Registration};
use conduit::{MemStore, Pagination, Store, StoreError};

pub fn register_user(store: &dyn Store, username: &str) -> User {
    users::register(
        store,
        &Pbkdf2Hasher,
        Registration {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "testpass123".to_string(),
            bio: None,
            image: None,
        },
    )
    .expect("registration should succeed")
}

pub fn draft(title: &str) -> ArticleDraft {
    ArticleDraft {
        title: title.to_string(),
        description: "Test description".to_string(),
        body: "Test body content".to_string(),
        tag_list: Vec::new(),
    }
}

pub fn tagged_draft(title: &str, tags: &[&str]) -> ArticleDraft {
    ArticleDraft {
        tag_list: tags.iter().map(|tag| tag.to_string()).collect(),
        ..draft(title)
    }
}

/// Delegates everything to a [`MemStore`] while (a) optionally lying that a
/// slug candidate is free, to reproduce the check-then-insert race losing
/// side, and (b) counting `distinct_tags` hits, to observe cache behavior.
#[derive(Default)]
pub struct ObservedStore {
    inner: MemStore,
    pub free_slug_lies: AtomicUsize,
    pub distinct_tag_calls: AtomicUsize,
}

impl ObservedStore {
    pub fn new() -> Self {
        ObservedStore::default()
    }

    pub fn lie_that_next_slug_is_free(&self, times: usize) {
        self.free_slug_lies.store(times, Ordering::SeqCst);
    }

    pub fn tag_query_count(&self) -> usize {
        self.distinct_tag_calls.load(Ordering::SeqCst)
    }
}

impl Store for ObservedStore {
    fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.inner.insert_user(user)
    }
    fn user_by_id(&self, id: i32) -> Result<Option<User>, StoreError> {
        self.inner.user_by_id(id)
    }
    fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.inner.user_by_email(email)
    }
    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.inner.user_by_username(username)
    }
    fn users_by_ids(&self, ids: &[i32]) -> Result<HashMap<i32, User>, StoreError> {
        self.inner.users_by_ids(ids)
    }
    fn update_user(&self, user: &User) -> Result<User, StoreError> {
        self.inner.update_user(user)
    }
    fn username_exists(&self, username: &str, exclude: Option<i32>) -> Result<bool, StoreError> {
        self.inner.username_exists(username, exclude)
    }
    fn email_exists(&self, email: &str, exclude: Option<i32>) -> Result<bool, StoreError> {
        self.inner.email_exists(email, exclude)
    }
    fn insert_follow(&self, follower_id: i32, followed_id: i32) -> Result<(), StoreError> {
        self.inner.insert_follow(follower_id, followed_id)
    }
    fn delete_follow(&self, follower_id: i32, followed_id: i32) -> Result<(), StoreError> {
        self.inner.delete_follow(follower_id, followed_id)
    }
    fn is_following(&self, follower_id: i32, followed_id: i32) -> Result<bool, StoreError> {
        self.inner.is_following(follower_id, followed_id)
    }
    fn following_map(
        &self,
        follower_id: i32,
        user_ids: &[i32],
    ) -> Result<HashSet<i32>, StoreError> {
        self.inner.following_map(follower_id, user_ids)
    }
    fn slug_exists(&self, slug: &str, exclude: Option<i32>) -> Result<bool, StoreError> {
        if self.free_slug_lies.load(Ordering::SeqCst) > 0 {
            self.free_slug_lies.fetch_sub(1, Ordering::SeqCst);
            return Ok(false);
        }
        self.inner.slug_exists(slug, exclude)
    }
    fn insert_article(
        &self,
        article: NewArticle,
        tag_names: &[String],
    ) -> Result<Article, StoreError> {
        self.inner.insert_article(article, tag_names)
    }
    fn update_article(
        &self,
        article: &Article,
        tag_names: Option<&[String]>,
    ) -> Result<Article, StoreError> {
        self.inner.update_article(article, tag_names)
    }
    fn article_by_slug(&self, slug: &str) -> Result<Option<Article>, StoreError> {
        self.inner.article_by_slug(slug)
    }
    fn delete_article(&self, article_id: i32) -> Result<(), StoreError> {
        self.inner.delete_article(article_id)
    }
    fn list_articles(
        &self,
        filter: &ArticleFilter,
        page: Pagination,
    ) -> Result<(Vec<Article>, i64), StoreError> {
        self.inner.list_articles(filter, page)
    }
    fn feed_articles(
        &self,
        follower_id: i32,
        page: Pagination,
    ) -> Result<(Vec<Article>, i64), StoreError> {
        self.inner.feed_articles(follower_id, page)
    }
    fn insert_favorite(&self, user_id: i32, article_id: i32) -> Result<(), StoreError> {
        self.inner.insert_favorite(user_id, article_id)
    }
    fn delete_favorite(&self, user_id: i32, article_id: i32) -> Result<(), StoreError> {
        self.inner.delete_favorite(user_id, article_id)
    }
    fn favorited_map(
        &self,
        user_id: i32,
        article_ids: &[i32],
    ) -> Result<HashSet<i32>, StoreError> {
        self.inner.favorited_map(user_id, article_ids)
    }
    fn favorites_counts(&self, article_ids: &[i32]) -> Result<HashMap<i32, i64>, StoreError> {
        self.inner.favorites_counts(article_ids)
    }
    fn tags_map(&self, article_ids: &[i32]) -> Result<HashMap<i32, Vec<String>>, StoreError> {
        self.inner.tags_map(article_ids)
    }
    fn distinct_tags(&self) -> Result<Vec<String>, StoreError> {
        self.distinct_tag_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.distinct_tags()
    }
    fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError> {
        self.inner.insert_comment(comment)
    }
    fn comment_by_id(&self, comment_id: i32) -> Result<Option<Comment>, StoreError> {
        self.inner.comment_by_id(comment_id)
    }
    fn comments_of_article(&self, article_id: i32) -> Result<Vec<Comment>, StoreError> {
        self.inner.comments_of_article(article_id)
    }
    fn delete_comment(&self, comment_id: i32) -> Result<(), StoreError> {
        self.inner.delete_comment(comment_id)
    }
}
