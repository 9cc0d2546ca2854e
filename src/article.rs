//! Articles: creation, mutation, listing, the personalized feed, and the
//! favorite toggle. Slug allocation lives here too, including the retry path
//! for the race where two concurrent writers normalize the same title.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use slug::slugify;
use tracing::{debug, info};

use crate::auth::ensure_owner;
use crate::cache::Cache;
use crate::db::schema::articles;
use crate::error::{Error, ValidationError};
use crate::profile::Profile;
use crate::store::{Store, StoreError};
use crate::tags;
use crate::types::Pagination;
use crate::users::models::User;
use crate::utils::serialize_date;

pub const MAX_TITLE_LENGTH: usize = 255;
pub const MAX_SLUG_LENGTH: usize = 255;
pub const MAX_TAG_NAME_LENGTH: usize = 100;

/// How many times a writer re-probes after losing the slug race before the
/// violation is surfaced as-is.
const SLUG_RETRY_ATTEMPTS: usize = 5;

const CANNOT_EDIT_OTHERS_ARTICLES: &str = "You can only edit your own articles";
const CANNOT_DELETE_OTHERS_ARTICLES: &str = "You can only delete your own articles";

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, AsChangeset, Serialize)]
#[diesel(table_name = articles)]
pub struct Article {
    #[serde(skip_serializing)]
    pub id: i32,
    #[serde(skip_serializing)]
    pub author_id: i32,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = articles)]
pub struct NewArticle {
    pub author_id: i32,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDraft {
    pub title: String,
    pub description: String,
    pub body: String,
    #[serde(default)]
    pub tag_list: Vec<String>,
}

/// Partial update with explicit-optional semantics: `None` leaves the field
/// unchanged, `Some(value)` replaces it — including `Some("")` for
/// description and body, and `Some(vec![])` to clear the tag set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub tag_list: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleFilter {
    /// Tag name, matched case-insensitively.
    pub tag: Option<String>,
    /// Author username, matched case-insensitively.
    pub author: Option<String>,
    /// Username whose favorites to select; an unknown username matches
    /// nothing rather than erroring.
    pub favorited: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleView {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub tag_list: Vec<String>,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_date")]
    pub updated_at: DateTime<Utc>,
    pub favorited: bool,
    pub favorites_count: i64,
    pub author: Profile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePage {
    pub articles: Vec<ArticleView>,
    pub articles_count: i64,
}

fn slug_base(title: &str) -> Result<String, Error> {
    let mut base = slugify(title.trim());
    base.truncate(MAX_SLUG_LENGTH);
    while base.ends_with('-') {
        base.pop();
    }
    if base.is_empty() {
        return Err(ValidationError::new("title", "Title has no slug-safe characters").into());
    }
    Ok(base)
}

/// Finds the first free slug for `title`: the normalized base if unclaimed,
/// otherwise `base-1`, `base-2`, … in increasing order. `exclude` skips the
/// article's own row when regenerating for a title change.
pub fn allocate_slug(
    store: &dyn Store,
    title: &str,
    exclude: Option<i32>,
) -> Result<String, Error> {
    let base = slug_base(title)?;
    let mut candidate = base.clone();
    let mut counter = 1u32;
    while store.slug_exists(&candidate, exclude)? {
        candidate = format!("{base}-{counter}");
        counter += 1;
    }
    Ok(candidate)
}

fn validate_title(title: &str, errors: &mut ValidationError) {
    if title.trim().is_empty() {
        errors.add_error("title", "empty title");
    } else if title.chars().count() > MAX_TITLE_LENGTH {
        errors.add_error("title", "Title is too long");
    }
}

fn validate_draft(draft: &ArticleDraft) -> Result<(), Error> {
    let mut errors = ValidationError::default();
    validate_title(&draft.title, &mut errors);
    if draft.description.trim().is_empty() {
        errors.add_error("description", "empty description");
    }
    if draft.body.trim().is_empty() {
        errors.add_error("body", "empty body");
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}

/// Trims, drops empties, and deduplicates while preserving first-seen order.
fn normalize_tags(raw: Vec<String>) -> Result<Vec<String>, Error> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for name in raw {
        let name = name.trim().to_string();
        if name.is_empty() {
            continue;
        }
        if name.chars().count() > MAX_TAG_NAME_LENGTH {
            return Err(ValidationError::new("tagList", "Tag name is too long").into());
        }
        if seen.insert(name.clone()) {
            names.push(name);
        }
    }
    Ok(names)
}

/// Hydrates views in bulk: authors, tag lists, favorite counts and the
/// viewer's favorite/follow memberships each come from one store call, so a
/// page of articles never degrades into per-row lookups.
fn compose(
    store: &dyn Store,
    viewer: Option<i32>,
    rows: Vec<Article>,
) -> Result<Vec<ArticleView>, Error> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i32> = rows.iter().map(|article| article.id).collect();
    let author_ids: Vec<i32> = rows.iter().map(|article| article.author_id).collect();

    let authors = store.users_by_ids(&author_ids)?;
    let mut tag_lists = store.tags_map(&ids)?;
    let counts = store.favorites_counts(&ids)?;
    let (favorited, following) = match viewer {
        Some(viewer_id) => (
            store.favorited_map(viewer_id, &ids)?,
            store.following_map(viewer_id, &author_ids)?,
        ),
        None => (HashSet::new(), HashSet::new()),
    };

    rows.into_iter()
        .map(|article| {
            let author = authors.get(&article.author_id).ok_or(Error::NotFound)?;
            Ok(ArticleView {
                favorited: favorited.contains(&article.id),
                favorites_count: counts.get(&article.id).copied().unwrap_or(0),
                tag_list: tag_lists.remove(&article.id).unwrap_or_default(),
                author: Profile::of(author, following.contains(&author.id)),
                slug: article.slug,
                title: article.title,
                description: article.description,
                body: article.body,
                created_at: article.created_at,
                updated_at: article.updated_at,
            })
        })
        .collect()
}

fn compose_one(store: &dyn Store, viewer: Option<i32>, row: Article) -> Result<ArticleView, Error> {
    compose(store, viewer, vec![row])?.pop().ok_or(Error::NotFound)
}

fn load_by_slug(store: &dyn Store, slug: &str) -> Result<Article, Error> {
    store.article_by_slug(slug)?.ok_or(Error::NotFound)
}

pub fn create_article(
    store: &dyn Store,
    cache: &dyn Cache,
    author: &User,
    draft: ArticleDraft,
) -> Result<ArticleView, Error> {
    validate_draft(&draft)?;
    let tag_list = normalize_tags(draft.tag_list)?;
    let now = Utc::now();

    let mut attempts = 0;
    let article = loop {
        let slug = allocate_slug(store, &draft.title, None)?;
        let record = NewArticle {
            author_id: author.id,
            slug,
            title: draft.title.clone(),
            description: draft.description.clone(),
            body: draft.body.clone(),
            created_at: now,
            updated_at: now,
        };
        match store.insert_article(record, &tag_list) {
            Ok(article) => break article,
            // A concurrent creation claimed the candidate between the
            // existence check and the insert; re-probe for the next suffix.
            Err(StoreError::UniqueViolation("slug")) if attempts < SLUG_RETRY_ATTEMPTS => {
                attempts += 1;
            }
            Err(err) => return Err(err.into()),
        }
    };

    if !tag_list.is_empty() {
        tags::invalidate(cache);
    }
    info!(article = article.id, slug = %article.slug, "article created");
    compose_one(store, Some(author.id), article)
}

pub fn get_article(
    store: &dyn Store,
    viewer: Option<&User>,
    slug: &str,
) -> Result<ArticleView, Error> {
    let article = load_by_slug(store, slug)?;
    compose_one(store, viewer.map(|user| user.id), article)
}

pub fn update_article(
    store: &dyn Store,
    cache: &dyn Cache,
    actor: &User,
    slug: &str,
    update: ArticleUpdate,
) -> Result<ArticleView, Error> {
    let mut article = load_by_slug(store, slug)?;
    ensure_owner(actor, article.author_id, CANNOT_EDIT_OTHERS_ARTICLES)?;

    let tag_list = update.tag_list.map(normalize_tags).transpose()?;

    if let Some(title) = update.title {
        let mut errors = ValidationError::default();
        validate_title(&title, &mut errors);
        if !errors.is_empty() {
            return Err(errors.into());
        }
        if title != article.title {
            article.slug = allocate_slug(store, &title, Some(article.id))?;
            article.title = title;
        }
    }
    if let Some(description) = update.description {
        article.description = description;
    }
    if let Some(body) = update.body {
        article.body = body;
    }
    article.updated_at = Utc::now();

    let mut attempts = 0;
    let updated = loop {
        match store.update_article(&article, tag_list.as_deref()) {
            Ok(updated) => break updated,
            Err(StoreError::UniqueViolation("slug")) if attempts < SLUG_RETRY_ATTEMPTS => {
                attempts += 1;
                article.slug = allocate_slug(store, &article.title, Some(article.id))?;
            }
            Err(err) => return Err(err.into()),
        }
    };

    if tag_list.is_some() {
        tags::invalidate(cache);
    }
    debug!(article = updated.id, slug = %updated.slug, "article updated");
    compose_one(store, Some(actor.id), updated)
}

pub fn delete_article(store: &dyn Store, actor: &User, slug: &str) -> Result<(), Error> {
    let article = load_by_slug(store, slug)?;
    ensure_owner(actor, article.author_id, CANNOT_DELETE_OTHERS_ARTICLES)?;
    store.delete_article(article.id)?;
    info!(article = article.id, slug = %article.slug, "article deleted");
    Ok(())
}

pub fn list_articles(
    store: &dyn Store,
    viewer: Option<&User>,
    filter: &ArticleFilter,
    page: Pagination,
) -> Result<ArticlePage, Error> {
    let (rows, total) = store.list_articles(filter, page)?;
    Ok(ArticlePage {
        articles: compose(store, viewer.map(|user| user.id), rows)?,
        articles_count: total,
    })
}

/// Articles authored by accounts the viewer follows, newest first. An empty
/// following set yields an empty page, not an error.
pub fn feed(store: &dyn Store, viewer: &User, page: Pagination) -> Result<ArticlePage, Error> {
    let (rows, total) = store.feed_articles(viewer.id, page)?;
    Ok(ArticlePage {
        articles: compose(store, Some(viewer.id), rows)?,
        articles_count: total,
    })
}

/// Idempotent: favoriting an already-favorited article is a no-op. The view
/// reflects the post-operation membership and count.
pub fn favorite(store: &dyn Store, user: &User, slug: &str) -> Result<ArticleView, Error> {
    let article = load_by_slug(store, slug)?;
    store.insert_favorite(user.id, article.id)?;
    debug!(user = user.id, article = article.id, "favorite added");
    compose_one(store, Some(user.id), article)
}

/// Idempotent: unfavoriting an article the user never favorited is a silent
/// no-op.
pub fn unfavorite(store: &dyn Store, user: &User, slug: &str) -> Result<ArticleView, Error> {
    let article = load_by_slug(store, slug)?;
    store.delete_favorite(user.id, article.id)?;
    debug!(user = user.id, article = article.id, "favorite removed");
    compose_one(store, Some(user.id), article)
}
