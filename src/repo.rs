use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("storage error: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
            other => RepoError::Internal(other.to_string()),
        }
    }
}

use async_trait::async_trait;

#[async_trait]
pub trait AccountRepo: Send + Sync {
    /// Inserts an account. The first account ever stored becomes `Role::Admin`.
    async fn create_account(&self, new: NewAccount) -> RepoResult<Account>;
    async fn get_account(&self, id: Id) -> RepoResult<Account>;
    async fn find_account_by_email(&self, email: &str) -> RepoResult<Account>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn list_posts(&self) -> RepoResult<Vec<AuthoredPost>>;
    async fn get_post(&self, id: Id) -> RepoResult<AuthoredPost>;
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    /// Removes the post row only; its comments are left in place.
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<CommentView>>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    /// Fails with `NotFound` unless both the author and the post exist.
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
    /// Returns the removed row so callers can find its parent post.
    async fn delete_comment(&self, id: Id) -> RepoResult<Comment>;
}

pub trait Repo: AccountRepo + PostRepo + CommentRepo {}

impl<T> Repo for T where T: AccountRepo + PostRepo + CommentRepo {}

pub mod inmem {
    use super::*;

    #[derive(Default)]
    struct State {
        accounts: BTreeMap<Id, Account>,
        posts: BTreeMap<Id, Post>,
        comments: BTreeMap<Id, Comment>,
        last_account_id: Id,
        last_post_id: Id,
        last_comment_id: Id,
    }

    impl State {
        fn author_name(&self, id: Option<Id>) -> Option<String> {
            id.and_then(|id| self.accounts.get(&id)).map(|a| a.name.clone())
        }
    }

    /// Process-local store. Nothing survives a restart.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }
    }

    #[async_trait]
    impl AccountRepo for InMemRepo {
        async fn create_account(&self, new: NewAccount) -> RepoResult<Account> {
            let mut s = self.write()?;
            if s.accounts.values().any(|a| a.email == new.email) {
                return Err(RepoError::Conflict);
            }
            let role = if s.accounts.is_empty() { Role::Admin } else { Role::User };
            s.last_account_id += 1;
            let account = Account {
                id: s.last_account_id,
                email: new.email,
                password: new.password_hash,
                name: new.name,
                role,
            };
            s.accounts.insert(account.id, account.clone());
            Ok(account)
        }

        async fn get_account(&self, id: Id) -> RepoResult<Account> {
            self.read()?.accounts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn find_account_by_email(&self, email: &str) -> RepoResult<Account> {
            let s = self.read()?;
            s.accounts.values().find(|a| a.email == email).cloned().ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn list_posts(&self) -> RepoResult<Vec<AuthoredPost>> {
            let s = self.read()?;
            Ok(s.posts
                .values()
                .map(|p| AuthoredPost { post: p.clone(), author_name: s.author_name(p.author_id) })
                .collect())
        }

        async fn get_post(&self, id: Id) -> RepoResult<AuthoredPost> {
            let s = self.read()?;
            let post = s.posts.get(&id).cloned().ok_or(RepoError::NotFound)?;
            let author_name = s.author_name(post.author_id);
            Ok(AuthoredPost { post, author_name })
        }

        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.write()?;
            if s.posts.values().any(|p| p.title == new.title) {
                return Err(RepoError::Conflict);
            }
            s.last_post_id += 1;
            let post = Post {
                id: s.last_post_id,
                author_id: Some(new.author_id),
                title: new.title,
                subtitle: new.subtitle,
                date: new.date,
                body: new.body,
                img_url: new.img_url,
            };
            s.posts.insert(post.id, post.clone());
            Ok(post)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let mut s = self.write()?;

            // uniqueness check before taking the mutable borrow
            if s.posts.values().any(|p| p.title == upd.title && p.id != id) {
                return Err(RepoError::Conflict);
            }

            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            post.title = upd.title;
            post.subtitle = upd.subtitle;
            post.body = upd.body;
            post.img_url = upd.img_url;
            Ok(post.clone())
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            self.write()?.posts.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<CommentView>> {
            let s = self.read()?;
            Ok(s.comments
                .values()
                .filter(|c| c.post_id == Some(post_id))
                .map(|c| {
                    let author = c.author_id.and_then(|id| s.accounts.get(&id));
                    CommentView {
                        comment: c.clone(),
                        author_name: author.map(|a| a.name.clone()),
                        author_email: author.map(|a| a.email.clone()),
                    }
                })
                .collect())
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            self.read()?.comments.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut s = self.write()?;
            if !s.accounts.contains_key(&new.author_id) || !s.posts.contains_key(&new.post_id) {
                return Err(RepoError::NotFound);
            }
            s.last_comment_id += 1;
            let comment = Comment {
                id: s.last_comment_id,
                text: new.text,
                author_id: Some(new.author_id),
                post_id: Some(new.post_id),
            };
            s.comments.insert(comment.id, comment.clone());
            Ok(comment)
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<Comment> {
            self.write()?.comments.remove(&id).ok_or(RepoError::NotFound)
        }
    }
}

pub mod sqlite {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::{Pool, Sqlite};
    use std::str::FromStr;
    use tracing::info;

    // Foreign keys are declared but not enforced (see `connect`): deleting a
    // post must leave its comments behind.
    const SCHEMA: &[&str] = &[
        r#"CREATE TABLE IF NOT EXISTS users (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            email    TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL,
            name     TEXT NOT NULL,
            role     TEXT NOT NULL DEFAULT 'user'
        )"#,
        r#"CREATE TABLE IF NOT EXISTS blog_posts (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            author_id INTEGER REFERENCES users(id),
            title     TEXT NOT NULL UNIQUE,
            subtitle  TEXT NOT NULL,
            date      TEXT NOT NULL,
            body      TEXT NOT NULL,
            img_url   TEXT NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS comments (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            text      TEXT NOT NULL,
            author_id INTEGER REFERENCES users(id),
            post_id   INTEGER REFERENCES blog_posts(id)
        )"#,
    ];

    const AUTHORED_POST: &str = r#"
        SELECT p.id, p.author_id, p.title, p.subtitle, p.date, p.body, p.img_url,
               u.name AS author_name
        FROM blog_posts p
        LEFT JOIN users u ON u.id = p.author_id
    "#;

    #[derive(Clone)]
    pub struct SqliteRepo { pool: Pool<Sqlite> }

    impl SqliteRepo {
        pub fn new(pool: Pool<Sqlite>) -> Self { Self { pool } }

        /// Opens (creating if missing) the database at `url` and bootstraps the schema.
        pub async fn connect(url: &str) -> RepoResult<Self> {
            let opts = SqliteConnectOptions::from_str(url)?
                .create_if_missing(true)
                .foreign_keys(false);
            let in_memory = url.contains(":memory:") || url.contains("mode=memory");
            let pool = if in_memory {
                // every connection to :memory: is a separate database
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None::<std::time::Duration>)
                    .max_lifetime(None::<std::time::Duration>)
                    .connect_with(opts)
                    .await?
            } else {
                SqlitePoolOptions::new().max_connections(5).connect_with(opts).await?
            };
            let repo = Self::new(pool);
            repo.init_schema().await?;
            info!(in_memory, "SQLite repository ready");
            Ok(repo)
        }

        pub async fn init_schema(&self) -> RepoResult<()> {
            for stmt in SCHEMA {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AccountRepo for SqliteRepo {
        async fn create_account(&self, new: NewAccount) -> RepoResult<Account> {
            // single statement so two racing first registrations cannot both become admin
            let rec = sqlx::query_as::<_, Account>(r#"
                INSERT INTO users (email, password, name, role)
                SELECT ?1, ?2, ?3,
                       CASE WHEN EXISTS (SELECT 1 FROM users) THEN 'user' ELSE 'admin' END
                RETURNING id, email, password, name, role
            "#)
                .bind(&new.email)
                .bind(&new.password_hash)
                .bind(&new.name)
                .fetch_one(&self.pool).await?;
            Ok(rec)
        }

        async fn get_account(&self, id: Id) -> RepoResult<Account> {
            let rec = sqlx::query_as::<_, Account>("SELECT id, email, password, name, role FROM users WHERE id = ?1")
                .bind(id)
                .fetch_one(&self.pool).await?;
            Ok(rec)
        }

        async fn find_account_by_email(&self, email: &str) -> RepoResult<Account> {
            let rec = sqlx::query_as::<_, Account>("SELECT id, email, password, name, role FROM users WHERE email = ?1")
                .bind(email)
                .fetch_one(&self.pool).await?;
            Ok(rec)
        }
    }

    #[async_trait]
    impl PostRepo for SqliteRepo {
        async fn list_posts(&self) -> RepoResult<Vec<AuthoredPost>> {
            let recs = sqlx::query_as::<_, AuthoredPost>(&format!("{AUTHORED_POST} ORDER BY p.id"))
                .fetch_all(&self.pool).await?;
            Ok(recs)
        }

        async fn get_post(&self, id: Id) -> RepoResult<AuthoredPost> {
            let rec = sqlx::query_as::<_, AuthoredPost>(&format!("{AUTHORED_POST} WHERE p.id = ?1"))
                .bind(id)
                .fetch_one(&self.pool).await?;
            Ok(rec)
        }

        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let rec = sqlx::query_as::<_, Post>(r#"
                INSERT INTO blog_posts (author_id, title, subtitle, date, body, img_url)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                RETURNING id, author_id, title, subtitle, date, body, img_url
            "#)
                .bind(new.author_id)
                .bind(&new.title)
                .bind(&new.subtitle)
                .bind(&new.date)
                .bind(&new.body)
                .bind(&new.img_url)
                .fetch_one(&self.pool).await?;
            Ok(rec)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let rec = sqlx::query_as::<_, Post>(r#"
                UPDATE blog_posts SET title = ?2, subtitle = ?3, body = ?4, img_url = ?5
                WHERE id = ?1
                RETURNING id, author_id, title, subtitle, date, body, img_url
            "#)
                .bind(id)
                .bind(&upd.title)
                .bind(&upd.subtitle)
                .bind(&upd.body)
                .bind(&upd.img_url)
                .fetch_one(&self.pool).await?;
            Ok(rec)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM blog_posts WHERE id = ?1")
                .bind(id)
                .execute(&self.pool).await?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for SqliteRepo {
        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<CommentView>> {
            let recs = sqlx::query_as::<_, CommentView>(r#"
                SELECT c.id, c.text, c.author_id, c.post_id,
                       u.name AS author_name, u.email AS author_email
                FROM comments c
                LEFT JOIN users u ON u.id = c.author_id
                WHERE c.post_id = ?1
                ORDER BY c.id
            "#)
                .bind(post_id)
                .fetch_all(&self.pool).await?;
            Ok(recs)
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            let rec = sqlx::query_as::<_, Comment>("SELECT id, text, author_id, post_id FROM comments WHERE id = ?1")
                .bind(id)
                .fetch_one(&self.pool).await?;
            Ok(rec)
        }

        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let rec = sqlx::query_as::<_, Comment>(r#"
                INSERT INTO comments (text, author_id, post_id)
                SELECT ?1, ?2, ?3
                WHERE EXISTS (SELECT 1 FROM users WHERE id = ?2)
                  AND EXISTS (SELECT 1 FROM blog_posts WHERE id = ?3)
                RETURNING id, text, author_id, post_id
            "#)
                .bind(&new.text)
                .bind(new.author_id)
                .bind(new.post_id)
                .fetch_optional(&self.pool).await?;
            rec.ok_or(RepoError::NotFound)
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<Comment> {
            let rec = sqlx::query_as::<_, Comment>("DELETE FROM comments WHERE id = ?1 RETURNING id, text, author_id, post_id")
                .bind(id)
                .fetch_optional(&self.pool).await?;
            rec.ok_or(RepoError::NotFound)
        }
    }
}
