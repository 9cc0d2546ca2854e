//! Content-sharing backend core: identity and follow graph, articles with
//! unique slugs, favorites, comments, personalized feeds, and a cached tag
//! list.
//!
//! The HTTP layer in front of this crate owns routing, request parsing and
//! response envelopes; it resolves an authenticated [`users::models::User`]
//! (via [`users::user_from_token`]) and calls the operation functions in
//! [`users`], [`profile`], [`article`], [`comment`] and [`tags`]. Those
//! functions run against injected capabilities: a [`store::Store`] (Postgres
//! via [`db::PgStore`], or [`store::MemStore`] in tests), a [`cache::Cache`],
//! and the hasher/token contracts in [`auth`].

pub mod article;
pub mod auth;
pub mod cache;
pub mod comment;
pub mod config;
pub mod db;
pub mod error;
pub mod profile;
pub mod store;
pub mod tags;
pub mod types;
pub mod users;
mod utils;

pub use crate::config::Config;
pub use crate::error::{Error, ValidationError};
pub use crate::store::{MemStore, Store, StoreError};
pub use crate::types::Pagination;
