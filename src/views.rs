//! HTML pages. Every user-supplied string goes through [`escape`] except post
//! bodies, which are administrator-authored rich text.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::forms::{CommentForm, FormErrors, LoginForm, PostForm, RegisterForm};
use crate::models::{Account, AuthoredPost, CommentView, Id};

const SITE_NAME: &str = "Quill";
const GRAVATAR_BASE: &str = "https://www.gravatar.com/avatar";

/// Per-request page furniture: who is looking and any pending flash message.
#[derive(Debug, Default, Clone, Copy)]
pub struct Chrome<'a> {
    pub user: Option<&'a Account>,
    pub flash: Option<&'a str>,
}

impl Chrome<'_> {
    fn is_admin(&self) -> bool {
        self.user.is_some_and(Account::is_admin)
    }
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Avatar for `email`: size 100, rating g, retro fallback.
pub fn gravatar_url(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    format!("{GRAVATAR_BASE}/{digest:x}?s=100&r=g&d=retro")
}

fn layout(title: &str, chrome: Chrome<'_>, content: &str) -> String {
    let mut nav = String::from(r#"<a href="/">Home</a> <a href="/about">About</a> <a href="/contact">Contact</a>"#);
    match chrome.user {
        Some(user) => {
            let _ = write!(nav, r#" <span class="who">{}</span> <a href="/logout">Log Out</a>"#, escape(&user.name));
        }
        None => nav.push_str(r#" <a href="/login">Login</a> <a href="/register">Register</a>"#),
    }
    let flash = chrome
        .flash
        .map(|m| format!(r#"<p class="flash">{}</p>"#, escape(m)))
        .unwrap_or_default();
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{title} | {SITE_NAME}</title></head>\n\
         <body>\n<nav>{nav}</nav>\n{flash}\n<main>\n{content}\n</main>\n\
         <footer>&copy; {SITE_NAME}</footer>\n</body>\n</html>\n",
        title = escape(title),
    )
}

fn field_errors(errors: &FormErrors, field: &str) -> String {
    errors
        .field(field)
        .iter()
        .map(|m| format!(r#"<span class="error">{}</span>"#, escape(m)))
        .collect()
}

fn input(errors: &FormErrors, name: &str, label: &str, kind: &str, value: &str) -> String {
    format!(
        r#"<p><label for="{name}">{label}</label> <input id="{name}" name="{name}" type="{kind}" value="{value}"> {errs}</p>"#,
        value = escape(value),
        errs = field_errors(errors, name),
    )
}

fn textarea(errors: &FormErrors, name: &str, label: &str, value: &str) -> String {
    format!(
        r#"<p><label for="{name}">{label}</label> <textarea id="{name}" name="{name}">{value}</textarea> {errs}</p>"#,
        value = escape(value),
        errs = field_errors(errors, name),
    )
}

pub fn index(chrome: Chrome<'_>, posts: &[AuthoredPost]) -> String {
    let mut content = String::from("<h1>Posts</h1>\n");
    for p in posts {
        let _ = write!(
            content,
            r#"<article class="post-preview"><a href="/post/{id}"><h2>{title}</h2><h3>{subtitle}</h3></a><p class="meta">Posted by {author} on {date}</p>"#,
            id = p.post.id,
            title = escape(&p.post.title),
            subtitle = escape(&p.post.subtitle),
            author = escape(p.author_name.as_deref().unwrap_or("unknown")),
            date = escape(&p.post.date),
        );
        if chrome.is_admin() {
            let _ = write!(content, r#" <a class="delete" href="/delete/{}">✘</a>"#, p.post.id);
        }
        content.push_str("</article>\n");
    }
    if chrome.is_admin() {
        content.push_str(r#"<p><a class="button" href="/new-post">Create New Post</a></p>"#);
    }
    layout("Home", chrome, &content)
}

pub fn post_page(
    chrome: Chrome<'_>,
    post: &AuthoredPost,
    comments: &[CommentView],
    form: &CommentForm,
    errors: &FormErrors,
) -> String {
    let p = &post.post;
    let mut content = format!(
        r#"<header><img class="cover" src="{img}" alt=""><h1>{title}</h1><h2>{subtitle}</h2><p class="meta">Posted by {author} on {date}</p></header>
<article>{body}</article>
"#,
        img = escape(&p.img_url),
        title = escape(&p.title),
        subtitle = escape(&p.subtitle),
        author = escape(post.author_name.as_deref().unwrap_or("unknown")),
        date = escape(&p.date),
        body = p.body,
    );
    if chrome.is_admin() {
        let _ = write!(content, r#"<p><a class="button" href="/edit-post/{}">Edit Post</a></p>"#, p.id);
    }
    let _ = write!(
        content,
        r#"<form method="post" action="/post/{id}">{comment}<button type="submit">Submit Comment</button></form>
<ul class="comments">
"#,
        id = p.id,
        comment = textarea(errors, "comment", "Comment", &form.comment),
    );
    for c in comments {
        let _ = write!(
            content,
            r#"<li><img class="avatar" src="{avatar}" alt=""><p>{text}</p><span class="sub">{author}</span>"#,
            avatar = escape(&gravatar_url(c.author_email.as_deref().unwrap_or_default())),
            text = escape(&c.comment.text),
            author = escape(c.author_name.as_deref().unwrap_or("unknown")),
        );
        if chrome.user.is_some() {
            let _ = write!(content, r#" <a class="delete" href="/delete-comment/{}">✘</a>"#, c.comment.id);
        }
        content.push_str("</li>\n");
    }
    content.push_str("</ul>");
    layout(&p.title, chrome, &content)
}

pub fn register_page(chrome: Chrome<'_>, form: &RegisterForm, errors: &FormErrors) -> String {
    let content = format!(
        r#"<h1>Register</h1><form method="post" action="/register">{email}{password}{name}<button type="submit">Sign Me Up!</button></form>"#,
        email = input(errors, "email", "Email", "email", &form.email),
        password = input(errors, "password", "Password", "password", ""),
        name = input(errors, "name", "Name", "text", &form.name),
    );
    layout("Register", chrome, &content)
}

pub fn login_page(chrome: Chrome<'_>, form: &LoginForm, errors: &FormErrors) -> String {
    let content = format!(
        r#"<h1>Log In</h1><form method="post" action="/login">{email}{password}<button type="submit">Let Me In!</button></form>"#,
        email = input(errors, "email", "Email", "email", &form.email),
        password = input(errors, "password", "Password", "password", ""),
    );
    layout("Log In", chrome, &content)
}

/// New-post form, or the edit form when `editing` names the post.
pub fn make_post_page(chrome: Chrome<'_>, form: &PostForm, errors: &FormErrors, editing: Option<Id>) -> String {
    let (heading, action) = match editing {
        Some(id) => ("Edit Post".to_string(), format!("/edit-post/{id}")),
        None => ("New Post".to_string(), "/new-post".to_string()),
    };
    let content = format!(
        r#"<h1>{heading}</h1><form method="post" action="{action}">{title}{subtitle}{img}{body}<button type="submit">Submit Post</button></form>"#,
        title = input(errors, "title", "Blog Post Title", "text", &form.title),
        subtitle = input(errors, "subtitle", "Subtitle", "text", &form.subtitle),
        img = input(errors, "img_url", "Blog Image URL", "url", &form.img_url),
        body = textarea(errors, "body", "Blog Content", &form.body),
    );
    layout(&heading, chrome, &content)
}

pub fn about_page(chrome: Chrome<'_>) -> String {
    layout(
        "About",
        chrome,
        "<h1>About Me</h1><p>A small personal blog: posts, thoughts and the occasional rant.</p>",
    )
}

pub fn contact_page(chrome: Chrome<'_>) -> String {
    layout(
        "Contact",
        chrome,
        "<h1>Contact Me</h1><p>Have questions? Leave a comment on any post and I will get back to you.</p>",
    )
}

pub fn error_page(status: u16, message: &str) -> String {
    layout(
        &status.to_string(),
        Chrome::default(),
        &format!("<h1>{status}</h1><p>{}</p>", escape(message)),
    )
}
