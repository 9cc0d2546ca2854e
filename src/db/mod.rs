//! Postgres backend. The pool is r2d2 over diesel; every composite write
//! (article + tag links, tag replace, cascade delete) runs in one
//! transaction so the uniqueness race on slugs surfaces as a
//! `UniqueViolation` the allocator can retry.

use std::collections::{HashMap, HashSet};

use diesel::dsl::{count_star, exists};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::ConnectionManager;
use diesel::result::DatabaseErrorKind;
use diesel::{define_sql_function, delete, insert_into, select, update};

use crate::article::{Article, ArticleFilter, NewArticle};
use crate::comment::{Comment, NewComment};
use crate::store::{Store, StoreError};
use crate::types::Pagination;
use crate::users::models::{NewUser, User};

pub mod schema;

use self::schema::{article_tags, articles, comments, favorites, follows, tags, users};

define_sql_function! {
    fn lower(x: diesel::sql_types::Text) -> diesel::sql_types::Text;
}

pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;
type PooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

pub fn init_pool(database_url: &str, max_size: u32) -> Result<Pool, r2d2::Error> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder().max_size(max_size).build(manager)
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> StoreError {
        match err {
            diesel::result::Error::NotFound => StoreError::NotFound,
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::UniqueViolation(unique_violation_field(info.constraint_name()))
            }
            other => StoreError::Database(other),
        }
    }
}

fn unique_violation_field(constraint: Option<&str>) -> &'static str {
    let name = constraint.unwrap_or_default();
    if name.contains("slug") {
        "slug"
    } else if name.contains("username") {
        "username"
    } else if name.contains("email") {
        "email"
    } else if name.contains("tag") {
        "tag"
    } else {
        "record"
    }
}

pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        PgStore { pool }
    }

    fn conn(&self) -> Result<PooledConnection, StoreError> {
        Ok(self.pool.get()?)
    }
}

/// Creates any missing tags, then links them to the article. Runs inside the
/// caller's transaction.
fn attach_tags(
    conn: &mut PgConnection,
    target_article_id: i32,
    tag_names: &[String],
) -> Result<(), StoreError> {
    if tag_names.is_empty() {
        return Ok(());
    }
    let rows: Vec<_> = tag_names.iter().map(|name| tags::name.eq(name)).collect();
    insert_into(tags::table)
        .values(&rows)
        .on_conflict(tags::name)
        .do_nothing()
        .execute(conn)?;

    let tag_ids: Vec<i32> = tags::table
        .filter(tags::name.eq_any(tag_names))
        .select(tags::id)
        .load(conn)?;
    let links: Vec<_> = tag_ids
        .into_iter()
        .map(|tag_id| {
            (
                article_tags::article_id.eq(target_article_id),
                article_tags::tag_id.eq(tag_id),
            )
        })
        .collect();
    insert_into(article_tags::table)
        .values(&links)
        .on_conflict((article_tags::article_id, article_tags::tag_id))
        .do_nothing()
        .execute(conn)?;
    Ok(())
}

fn intersect(scope: Option<HashSet<i32>>, ids: Vec<i32>) -> HashSet<i32> {
    let ids: HashSet<i32> = ids.into_iter().collect();
    match scope {
        None => ids,
        Some(prev) => prev.intersection(&ids).copied().collect(),
    }
}

impl Store for PgStore {
    fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut conn = self.conn()?;
        Ok(insert_into(users::table)
            .values(&user)
            .get_result::<User>(&mut conn)?)
    }

    fn user_by_id(&self, user_id: i32) -> Result<Option<User>, StoreError> {
        let mut conn = self.conn()?;
        Ok(users::table
            .find(user_id)
            .first::<User>(&mut conn)
            .optional()?)
    }

    fn user_by_email(&self, email_: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::email.eq(email_))
            .first::<User>(&mut conn)
            .optional()?)
    }

    fn user_by_username(&self, username_: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::username.eq(username_))
            .first::<User>(&mut conn)
            .optional()?)
    }

    fn users_by_ids(&self, ids: &[i32]) -> Result<HashMap<i32, User>, StoreError> {
        let mut conn = self.conn()?;
        let rows: Vec<User> = users::table
            .filter(users::id.eq_any(ids))
            .load(&mut conn)?;
        Ok(rows.into_iter().map(|user| (user.id, user)).collect())
    }

    fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let mut conn = self.conn()?;
        Ok(update(users::table.find(user.id))
            .set(user)
            .get_result::<User>(&mut conn)?)
    }

    fn username_exists(&self, username_: &str, exclude: Option<i32>) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let result = match exclude {
            Some(excluded) => select(exists(
                users::table
                    .filter(users::username.eq(username_))
                    .filter(users::id.ne(excluded)),
            ))
            .get_result::<bool>(&mut conn),
            None => select(exists(users::table.filter(users::username.eq(username_))))
                .get_result::<bool>(&mut conn),
        };
        Ok(result?)
    }

    fn email_exists(&self, email_: &str, exclude: Option<i32>) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let result = match exclude {
            Some(excluded) => select(exists(
                users::table
                    .filter(users::email.eq(email_))
                    .filter(users::id.ne(excluded)),
            ))
            .get_result::<bool>(&mut conn),
            None => select(exists(users::table.filter(users::email.eq(email_))))
                .get_result::<bool>(&mut conn),
        };
        Ok(result?)
    }

    fn insert_follow(&self, follower_id_: i32, followed_id_: i32) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        insert_into(follows::table)
            .values((
                follows::follower_id.eq(follower_id_),
                follows::followed_id.eq(followed_id_),
            ))
            .on_conflict((follows::follower_id, follows::followed_id))
            .do_nothing()
            .execute(&mut conn)?;
        Ok(())
    }

    fn delete_follow(&self, follower_id_: i32, followed_id_: i32) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        delete(
            follows::table
                .filter(follows::follower_id.eq(follower_id_))
                .filter(follows::followed_id.eq(followed_id_)),
        )
        .execute(&mut conn)?;
        Ok(())
    }

    fn is_following(&self, follower_id_: i32, followed_id_: i32) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        Ok(select(exists(
            follows::table
                .filter(follows::follower_id.eq(follower_id_))
                .filter(follows::followed_id.eq(followed_id_)),
        ))
        .get_result::<bool>(&mut conn)?)
    }

    fn following_map(
        &self,
        follower_id_: i32,
        user_ids: &[i32],
    ) -> Result<HashSet<i32>, StoreError> {
        let mut conn = self.conn()?;
        let rows: Vec<i32> = follows::table
            .filter(follows::follower_id.eq(follower_id_))
            .filter(follows::followed_id.eq_any(user_ids))
            .select(follows::followed_id)
            .load(&mut conn)?;
        Ok(rows.into_iter().collect())
    }

    fn slug_exists(&self, slug_: &str, exclude: Option<i32>) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let result = match exclude {
            Some(excluded) => select(exists(
                articles::table
                    .filter(articles::slug.eq(slug_))
                    .filter(articles::id.ne(excluded)),
            ))
            .get_result::<bool>(&mut conn),
            None => select(exists(articles::table.filter(articles::slug.eq(slug_))))
                .get_result::<bool>(&mut conn),
        };
        Ok(result?)
    }

    fn insert_article(
        &self,
        article: NewArticle,
        tag_names: &[String],
    ) -> Result<Article, StoreError> {
        let mut conn = self.conn()?;
        conn.transaction::<Article, StoreError, _>(|conn| {
            let row: Article = insert_into(articles::table)
                .values(&article)
                .get_result(conn)?;
            attach_tags(conn, row.id, tag_names)?;
            Ok(row)
        })
    }

    fn update_article(
        &self,
        article: &Article,
        tag_names: Option<&[String]>,
    ) -> Result<Article, StoreError> {
        let mut conn = self.conn()?;
        conn.transaction::<Article, StoreError, _>(|conn| {
            let row: Article = update(articles::table.find(article.id))
                .set(article)
                .get_result(conn)?;
            if let Some(tag_names) = tag_names {
                delete(article_tags::table.filter(article_tags::article_id.eq(article.id)))
                    .execute(conn)?;
                attach_tags(conn, article.id, tag_names)?;
            }
            Ok(row)
        })
    }

    fn article_by_slug(&self, slug_: &str) -> Result<Option<Article>, StoreError> {
        let mut conn = self.conn()?;
        Ok(articles::table
            .filter(articles::slug.eq(slug_))
            .first::<Article>(&mut conn)
            .optional()?)
    }

    fn delete_article(&self, article_id_: i32) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        conn.transaction::<(), StoreError, _>(|conn| {
            delete(comments::table.filter(comments::article_id.eq(article_id_))).execute(conn)?;
            delete(favorites::table.filter(favorites::article_id.eq(article_id_)))
                .execute(conn)?;
            delete(article_tags::table.filter(article_tags::article_id.eq(article_id_)))
                .execute(conn)?;
            let deleted = delete(articles::table.find(article_id_)).execute(conn)?;
            if deleted == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    fn list_articles(
        &self,
        filter: &ArticleFilter,
        page: Pagination,
    ) -> Result<(Vec<Article>, i64), StoreError> {
        let mut conn = self.conn()?;
        let mut scope: Option<HashSet<i32>> = None;

        if let Some(tag) = filter.tag.as_deref() {
            let ids: Vec<i32> = article_tags::table
                .inner_join(tags::table)
                .filter(lower(tags::name).eq(tag.to_lowercase()))
                .select(article_tags::article_id)
                .load(&mut conn)?;
            scope = Some(intersect(scope, ids));
        }
        if let Some(author) = filter.author.as_deref() {
            let author_ids: Vec<i32> = users::table
                .filter(lower(users::username).eq(author.to_lowercase()))
                .select(users::id)
                .load(&mut conn)?;
            let ids: Vec<i32> = articles::table
                .filter(articles::author_id.eq_any(author_ids))
                .select(articles::id)
                .load(&mut conn)?;
            scope = Some(intersect(scope, ids));
        }
        if let Some(username_) = filter.favorited.as_deref() {
            let favoriter: Option<i32> = users::table
                .filter(users::username.eq(username_))
                .select(users::id)
                .first(&mut conn)
                .optional()?;
            let ids = match favoriter {
                Some(user_id_) => favorites::table
                    .filter(favorites::user_id.eq(user_id_))
                    .select(favorites::article_id)
                    .load(&mut conn)?,
                None => Vec::new(),
            };
            scope = Some(intersect(scope, ids));
        }

        match scope {
            None => {
                let total: i64 = articles::table.count().get_result(&mut conn)?;
                let rows = articles::table
                    .order((articles::created_at.desc(), articles::id.desc()))
                    .limit(page.limit)
                    .offset(page.offset)
                    .load::<Article>(&mut conn)?;
                Ok((rows, total))
            }
            Some(ids) => {
                let ids: Vec<i32> = ids.into_iter().collect();
                let total = ids.len() as i64;
                let rows = articles::table
                    .filter(articles::id.eq_any(&ids))
                    .order((articles::created_at.desc(), articles::id.desc()))
                    .limit(page.limit)
                    .offset(page.offset)
                    .load::<Article>(&mut conn)?;
                Ok((rows, total))
            }
        }
    }

    fn feed_articles(
        &self,
        follower_id_: i32,
        page: Pagination,
    ) -> Result<(Vec<Article>, i64), StoreError> {
        let mut conn = self.conn()?;
        let total: i64 = articles::table
            .inner_join(follows::table.on(follows::followed_id.eq(articles::author_id)))
            .filter(follows::follower_id.eq(follower_id_))
            .count()
            .get_result(&mut conn)?;
        let rows: Vec<Article> = articles::table
            .inner_join(follows::table.on(follows::followed_id.eq(articles::author_id)))
            .filter(follows::follower_id.eq(follower_id_))
            .select(articles::all_columns)
            .order((articles::created_at.desc(), articles::id.desc()))
            .limit(page.limit)
            .offset(page.offset)
            .load(&mut conn)?;
        Ok((rows, total))
    }

    fn insert_favorite(&self, user_id_: i32, article_id_: i32) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        insert_into(favorites::table)
            .values((
                favorites::user_id.eq(user_id_),
                favorites::article_id.eq(article_id_),
            ))
            .on_conflict((favorites::user_id, favorites::article_id))
            .do_nothing()
            .execute(&mut conn)?;
        Ok(())
    }

    fn delete_favorite(&self, user_id_: i32, article_id_: i32) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        delete(
            favorites::table
                .filter(favorites::user_id.eq(user_id_))
                .filter(favorites::article_id.eq(article_id_)),
        )
        .execute(&mut conn)?;
        Ok(())
    }

    fn favorited_map(
        &self,
        user_id_: i32,
        article_ids: &[i32],
    ) -> Result<HashSet<i32>, StoreError> {
        let mut conn = self.conn()?;
        let rows: Vec<i32> = favorites::table
            .filter(favorites::user_id.eq(user_id_))
            .filter(favorites::article_id.eq_any(article_ids))
            .select(favorites::article_id)
            .load(&mut conn)?;
        Ok(rows.into_iter().collect())
    }

    fn favorites_counts(&self, article_ids: &[i32]) -> Result<HashMap<i32, i64>, StoreError> {
        let mut conn = self.conn()?;
        let rows: Vec<(i32, i64)> = favorites::table
            .filter(favorites::article_id.eq_any(article_ids))
            .group_by(favorites::article_id)
            .select((favorites::article_id, count_star()))
            .load(&mut conn)?;
        Ok(rows.into_iter().collect())
    }

    fn tags_map(&self, article_ids: &[i32]) -> Result<HashMap<i32, Vec<String>>, StoreError> {
        let mut conn = self.conn()?;
        let rows: Vec<(i32, String)> = article_tags::table
            .inner_join(tags::table)
            .filter(article_tags::article_id.eq_any(article_ids))
            .order(tags::name.asc())
            .select((article_tags::article_id, tags::name))
            .load(&mut conn)?;
        let mut map: HashMap<i32, Vec<String>> = HashMap::new();
        for (article_id_, name) in rows {
            map.entry(article_id_).or_default().push(name);
        }
        Ok(map)
    }

    fn distinct_tags(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn()?;
        Ok(tags::table
            .order(tags::id.asc())
            .select(tags::name)
            .load(&mut conn)?)
    }

    fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError> {
        let mut conn = self.conn()?;
        Ok(insert_into(comments::table)
            .values(&comment)
            .get_result::<Comment>(&mut conn)?)
    }

    fn comment_by_id(&self, comment_id_: i32) -> Result<Option<Comment>, StoreError> {
        let mut conn = self.conn()?;
        Ok(comments::table
            .find(comment_id_)
            .first::<Comment>(&mut conn)
            .optional()?)
    }

    fn comments_of_article(&self, article_id_: i32) -> Result<Vec<Comment>, StoreError> {
        let mut conn = self.conn()?;
        Ok(comments::table
            .filter(comments::article_id.eq(article_id_))
            .order((comments::created_at.desc(), comments::id.desc()))
            .load(&mut conn)?)
    }

    fn delete_comment(&self, comment_id_: i32) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let deleted = delete(comments::table.find(comment_id_)).execute(&mut conn)?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
