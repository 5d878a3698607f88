use serde::{Deserialize, Serialize};

pub type Id = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: Id,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String, // argon2 PHC string, never the plaintext
    pub name: String,
    pub role: Role,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Insert shape for `users`. The role is decided by the repository.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub author_id: Option<Id>,
    pub title: String,
    pub subtitle: String,
    pub date: String,
    pub body: String,
    pub img_url: String,
}

/// A post joined with its author's display name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthoredPost {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub post: Post,
    pub author_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Id,
    pub title: String,
    pub subtitle: String,
    pub date: String,
    pub body: String,
    pub img_url: String,
}

/// Mutable fields of a post. Owner, id and date are never touched on edit.
#[derive(Debug, Clone)]
pub struct UpdatePost {
    pub title: String,
    pub subtitle: String,
    pub body: String,
    pub img_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub text: String,
    pub author_id: Option<Id>,
    pub post_id: Option<Id>,
}

/// A comment joined with the author fields needed to display it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommentView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub comment: Comment,
    pub author_name: Option<String>,
    #[serde(skip_serializing)]
    pub author_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub text: String,
    pub author_id: Id,
    pub post_id: Id,
}
