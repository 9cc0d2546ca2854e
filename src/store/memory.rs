//! In-memory backend. One mutex guards the whole state, so every trait
//! method is atomic — the same isolation the Postgres backend gets from
//! transactions. Used by the test suite and as a throwaway embedded store.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::article::{Article, ArticleFilter, NewArticle};
use crate::comment::{Comment, NewComment};
use crate::types::Pagination;
use crate::users::models::{NewUser, User};

use super::{Store, StoreError};

#[derive(Default)]
struct State {
    users: Vec<User>,
    articles: Vec<Article>,
    comments: Vec<Comment>,
    follows: HashSet<(i32, i32)>,
    favorites: HashSet<(i32, i32)>,
    article_tags: HashMap<i32, Vec<String>>,
    /// Tag identities in creation order; rows are never removed.
    tag_registry: Vec<String>,
    next_user_id: i32,
    next_article_id: i32,
    next_comment_id: i32,
}

impl State {
    fn register_tags(&mut self, article_id: i32, tag_names: &[String]) {
        for name in tag_names {
            if !self.tag_registry.contains(name) {
                self.tag_registry.push(name.clone());
            }
        }
        self.article_tags
            .insert(article_id, tag_names.to_vec());
    }
}

#[derive(Default)]
pub struct MemStore {
    state: Mutex<State>,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn page_of(mut rows: Vec<Article>, page: Pagination) -> Vec<Article> {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    rows.into_iter()
        .skip(page.offset.max(0) as usize)
        .take(page.limit.max(0) as usize)
        .collect()
}

impl Store for MemStore {
    fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.state();
        if state.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::UniqueViolation("username"));
        }
        if state.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation("email"));
        }
        state.next_user_id += 1;
        let row = User {
            id: state.next_user_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            bio: user.bio,
            image: user.image,
            active: user.active,
        };
        state.users.push(row.clone());
        Ok(row)
    }

    fn user_by_id(&self, user_id: i32) -> Result<Option<User>, StoreError> {
        Ok(self.state().users.iter().find(|u| u.id == user_id).cloned())
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state().users.iter().find(|u| u.email == email).cloned())
    }

    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .state()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    fn users_by_ids(&self, ids: &[i32]) -> Result<HashMap<i32, User>, StoreError> {
        Ok(self
            .state()
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .map(|u| (u.id, u.clone()))
            .collect())
    }

    fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let mut state = self.state();
        if state
            .users
            .iter()
            .any(|u| u.id != user.id && u.username == user.username)
        {
            return Err(StoreError::UniqueViolation("username"));
        }
        if state
            .users
            .iter()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::UniqueViolation("email"));
        }
        let row = state
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or(StoreError::NotFound)?;
        *row = user.clone();
        Ok(row.clone())
    }

    fn username_exists(&self, username: &str, exclude: Option<i32>) -> Result<bool, StoreError> {
        Ok(self
            .state()
            .users
            .iter()
            .any(|u| u.username == username && Some(u.id) != exclude))
    }

    fn email_exists(&self, email: &str, exclude: Option<i32>) -> Result<bool, StoreError> {
        Ok(self
            .state()
            .users
            .iter()
            .any(|u| u.email == email && Some(u.id) != exclude))
    }

    fn insert_follow(&self, follower_id: i32, followed_id: i32) -> Result<(), StoreError> {
        self.state().follows.insert((follower_id, followed_id));
        Ok(())
    }

    fn delete_follow(&self, follower_id: i32, followed_id: i32) -> Result<(), StoreError> {
        self.state().follows.remove(&(follower_id, followed_id));
        Ok(())
    }

    fn is_following(&self, follower_id: i32, followed_id: i32) -> Result<bool, StoreError> {
        Ok(self.state().follows.contains(&(follower_id, followed_id)))
    }

    fn following_map(
        &self,
        follower_id: i32,
        user_ids: &[i32],
    ) -> Result<HashSet<i32>, StoreError> {
        let state = self.state();
        Ok(user_ids
            .iter()
            .copied()
            .filter(|followed| state.follows.contains(&(follower_id, *followed)))
            .collect())
    }

    fn slug_exists(&self, slug: &str, exclude: Option<i32>) -> Result<bool, StoreError> {
        Ok(self
            .state()
            .articles
            .iter()
            .any(|a| a.slug == slug && Some(a.id) != exclude))
    }

    fn insert_article(
        &self,
        article: NewArticle,
        tag_names: &[String],
    ) -> Result<Article, StoreError> {
        let mut state = self.state();
        if state.articles.iter().any(|a| a.slug == article.slug) {
            return Err(StoreError::UniqueViolation("slug"));
        }
        state.next_article_id += 1;
        let row = Article {
            id: state.next_article_id,
            author_id: article.author_id,
            slug: article.slug,
            title: article.title,
            description: article.description,
            body: article.body,
            created_at: article.created_at,
            updated_at: article.updated_at,
        };
        state.articles.push(row.clone());
        state.register_tags(row.id, tag_names);
        Ok(row)
    }

    fn update_article(
        &self,
        article: &Article,
        tag_names: Option<&[String]>,
    ) -> Result<Article, StoreError> {
        let mut state = self.state();
        if state
            .articles
            .iter()
            .any(|a| a.id != article.id && a.slug == article.slug)
        {
            return Err(StoreError::UniqueViolation("slug"));
        }
        let row = state
            .articles
            .iter_mut()
            .find(|a| a.id == article.id)
            .ok_or(StoreError::NotFound)?;
        *row = article.clone();
        if let Some(tag_names) = tag_names {
            state.register_tags(article.id, tag_names);
        }
        Ok(article.clone())
    }

    fn article_by_slug(&self, slug: &str) -> Result<Option<Article>, StoreError> {
        Ok(self.state().articles.iter().find(|a| a.slug == slug).cloned())
    }

    fn delete_article(&self, article_id: i32) -> Result<(), StoreError> {
        let mut state = self.state();
        let before = state.articles.len();
        state.articles.retain(|a| a.id != article_id);
        if state.articles.len() == before {
            return Err(StoreError::NotFound);
        }
        state.comments.retain(|c| c.article_id != article_id);
        state.favorites.retain(|(_, favorited)| *favorited != article_id);
        state.article_tags.remove(&article_id);
        Ok(())
    }

    fn list_articles(
        &self,
        filter: &ArticleFilter,
        page: Pagination,
    ) -> Result<(Vec<Article>, i64), StoreError> {
        let state = self.state();
        let no_tags = Vec::new();
        let rows: Vec<Article> = state
            .articles
            .iter()
            .filter(|a| {
                if let Some(tag) = filter.tag.as_deref() {
                    let tag = tag.to_lowercase();
                    let names = state.article_tags.get(&a.id).unwrap_or(&no_tags);
                    if !names.iter().any(|name| name.to_lowercase() == tag) {
                        return false;
                    }
                }
                if let Some(author) = filter.author.as_deref() {
                    let author = author.to_lowercase();
                    let matches = state
                        .users
                        .iter()
                        .any(|u| u.id == a.author_id && u.username.to_lowercase() == author);
                    if !matches {
                        return false;
                    }
                }
                if let Some(favorited) = filter.favorited.as_deref() {
                    let favoriter = state.users.iter().find(|u| u.username == favorited);
                    match favoriter {
                        Some(user) => {
                            if !state.favorites.contains(&(user.id, a.id)) {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                true
            })
            .cloned()
            .collect();
        let total = rows.len() as i64;
        Ok((page_of(rows, page), total))
    }

    fn feed_articles(
        &self,
        follower_id: i32,
        page: Pagination,
    ) -> Result<(Vec<Article>, i64), StoreError> {
        let state = self.state();
        let rows: Vec<Article> = state
            .articles
            .iter()
            .filter(|a| state.follows.contains(&(follower_id, a.author_id)))
            .cloned()
            .collect();
        let total = rows.len() as i64;
        Ok((page_of(rows, page), total))
    }

    fn insert_favorite(&self, user_id: i32, article_id: i32) -> Result<(), StoreError> {
        self.state().favorites.insert((user_id, article_id));
        Ok(())
    }

    fn delete_favorite(&self, user_id: i32, article_id: i32) -> Result<(), StoreError> {
        self.state().favorites.remove(&(user_id, article_id));
        Ok(())
    }

    fn favorited_map(
        &self,
        user_id: i32,
        article_ids: &[i32],
    ) -> Result<HashSet<i32>, StoreError> {
        let state = self.state();
        Ok(article_ids
            .iter()
            .copied()
            .filter(|article_id| state.favorites.contains(&(user_id, *article_id)))
            .collect())
    }

    fn favorites_counts(&self, article_ids: &[i32]) -> Result<HashMap<i32, i64>, StoreError> {
        let state = self.state();
        Ok(article_ids
            .iter()
            .copied()
            .map(|article_id| {
                let count = state
                    .favorites
                    .iter()
                    .filter(|(_, favorited)| *favorited == article_id)
                    .count() as i64;
                (article_id, count)
            })
            .collect())
    }

    fn tags_map(&self, article_ids: &[i32]) -> Result<HashMap<i32, Vec<String>>, StoreError> {
        let state = self.state();
        Ok(article_ids
            .iter()
            .copied()
            .filter_map(|article_id| {
                state.article_tags.get(&article_id).map(|names| {
                    let mut names = names.clone();
                    names.sort();
                    (article_id, names)
                })
            })
            .collect())
    }

    fn distinct_tags(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.state().tag_registry.clone())
    }

    fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError> {
        let mut state = self.state();
        state.next_comment_id += 1;
        let row = Comment {
            id: state.next_comment_id,
            article_id: comment.article_id,
            author_id: comment.author_id,
            body: comment.body,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        };
        state.comments.push(row.clone());
        Ok(row)
    }

    fn comment_by_id(&self, comment_id: i32) -> Result<Option<Comment>, StoreError> {
        Ok(self
            .state()
            .comments
            .iter()
            .find(|c| c.id == comment_id)
            .cloned())
    }

    fn comments_of_article(&self, article_id: i32) -> Result<Vec<Comment>, StoreError> {
        let mut rows: Vec<Comment> = self
            .state()
            .comments
            .iter()
            .filter(|c| c.article_id == article_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    fn delete_comment(&self, comment_id: i32) -> Result<(), StoreError> {
        let mut state = self.state();
        let before = state.comments.len();
        state.comments.retain(|c| c.id != comment_id);
        if state.comments.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
