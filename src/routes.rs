use std::sync::Arc;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web::http::header::{self, ContentType};
use chrono::Local;
use tracing::{info, warn};

use crate::auth::{self, AdminUser, CurrentUser, Identity, SessionKeys};
use crate::error::AppError;
use crate::flash;
use crate::forms::{self, CommentForm, FormErrors, LoginForm, PostForm, RegisterForm};
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{Repo, RepoError};
use crate::views::{self, Chrome};

pub const ALREADY_REGISTERED: &str = "You've already signed up with that email, log in instead!";
pub const INVALID_CREDENTIALS: &str = "Invalid email or password, please try again.";
pub const LOGIN_TO_COMMENT: &str = "You need to login or register to comment.";
pub const DUPLICATE_TITLE: &str = "A post with that title already exists.";

/// Upper bound for urlencoded bodies; post bodies are rich text.
pub const MAX_FORM_BYTES: usize = 1 << 20;

/// Publish-date stamp, e.g. "October 19, 2026".
pub const DATE_FORMAT: &str = "%B %d, %Y";

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::FormConfig::default().limit(MAX_FORM_BYTES).error_handler(|err, req| {
        warn!(error = %err, path = req.path(), "malformed form body");
        AppError::BadRequest.into()
    }))
    .app_data(web::PathConfig::default().error_handler(|_, _| AppError::NotFound.into()));

    cfg.service(web::resource("/").route(web::get().to(get_all_posts)))
        .service(
            web::resource("/register")
                .route(web::get().to(register_form))
                .route(web::post().to(register)),
        )
        .service(
            web::resource("/login")
                .route(web::get().to(login_form))
                .route(web::post().to(login)),
        )
        .service(web::resource("/logout").route(web::get().to(logout)))
        .service(
            web::resource("/post/{id}")
                .route(web::get().to(show_post))
                .route(web::post().to(comment_on_post)),
        )
        .service(web::resource("/about").route(web::get().to(about)))
        .service(web::resource("/contact").route(web::get().to(contact)))
        // admin only
        .service(
            web::resource("/new-post")
                .route(web::get().to(new_post_form))
                .route(web::post().to(create_post)),
        )
        .service(
            web::resource("/edit-post/{id}")
                .route(web::get().to(edit_post_form))
                .route(web::post().to(edit_post)),
        )
        .service(web::resource("/delete/{id}").route(web::get().to(delete_post)))
        // any logged-in account
        .service(web::resource("/delete-comment/{id}").route(web::get().to(delete_comment)));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub sessions: SessionKeys,
    pub limiter: RateLimiterFacade,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, sessions: SessionKeys, limiter: RateLimiterFacade) -> Self {
        Self { repo, sessions, limiter }
    }
}

fn render(html: String, clear_flash: bool) -> HttpResponse {
    let mut resp = HttpResponse::Ok();
    resp.content_type(ContentType::html());
    if clear_flash {
        resp.cookie(flash::consumed());
    }
    resp.body(html)
}

/// Render a page for `user`, consuming any pending flash message.
fn page(req: &HttpRequest, user: Option<&Account>, build: impl FnOnce(Chrome<'_>) -> String) -> HttpResponse {
    let flash = flash::peek(req);
    let html = build(Chrome { user, flash: flash.as_deref() });
    render(html, flash.is_some())
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found().insert_header((header::LOCATION, location.to_string())).finish()
}

/// Throttle key: the socket peer. Forwarded headers are client-controlled and ignored.
fn client_ip(req: &HttpRequest) -> String {
    req.peer_addr().map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

/// Start a session for `account` and send the browser home.
fn begin_session(data: &AppState, account: &Account) -> Result<HttpResponse, AppError> {
    let token = data.sessions.create_token(account.id)?;
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, "/"))
        .cookie(data.sessions.session_cookie(token))
        .finish())
}

pub async fn get_all_posts(req: HttpRequest, ident: Identity, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let posts = data.repo.list_posts().await?;
    Ok(page(&req, ident.0.as_ref(), |c| views::index(c, &posts)))
}

pub async fn register_form(req: HttpRequest, ident: Identity) -> HttpResponse {
    page(&req, ident.0.as_ref(), |c| views::register_page(c, &RegisterForm::default(), &FormErrors::default()))
}

pub async fn register(
    req: HttpRequest,
    ident: Identity,
    data: web::Data<AppState>,
    form: web::Form<RegisterForm>,
) -> Result<HttpResponse, AppError> {
    if !data.limiter.allow_register(&client_ip(&req)) {
        return Err(AppError::TooManyRequests);
    }
    let form = form.into_inner();
    if let Err(errors) = forms::check(&form) {
        return Ok(page(&req, ident.0.as_ref(), |c| views::register_page(c, &form, &errors)));
    }

    match data.repo.find_account_by_email(&form.email).await {
        Ok(_) => return Ok(flash::redirect_with_flash("/login", ALREADY_REGISTERED)),
        Err(RepoError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }

    let new = NewAccount {
        email: form.email,
        password_hash: auth::hash_password(&form.password)?,
        name: form.name,
    };
    let account = match data.repo.create_account(new).await {
        Ok(account) => account,
        // lost a race with a concurrent registration
        Err(RepoError::Conflict) => return Ok(flash::redirect_with_flash("/login", ALREADY_REGISTERED)),
        Err(e) => return Err(e.into()),
    };
    info!(account_id = account.id, admin = account.is_admin(), "account registered");
    begin_session(&data, &account)
}

pub async fn login_form(req: HttpRequest, ident: Identity) -> HttpResponse {
    page(&req, ident.0.as_ref(), |c| views::login_page(c, &LoginForm::default(), &FormErrors::default()))
}

pub async fn login(
    req: HttpRequest,
    ident: Identity,
    data: web::Data<AppState>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, AppError> {
    if !data.limiter.allow_login(&client_ip(&req)) {
        return Err(AppError::TooManyRequests);
    }
    let form = form.into_inner();
    if let Err(errors) = forms::check(&form) {
        return Ok(page(&req, ident.0.as_ref(), |c| views::login_page(c, &form, &errors)));
    }

    let account = match data.repo.find_account_by_email(&form.email).await {
        Ok(account) => account,
        Err(RepoError::NotFound) => {
            warn!("login failed: unknown email");
            return Ok(flash::redirect_with_flash("/login", INVALID_CREDENTIALS));
        }
        Err(e) => return Err(e.into()),
    };
    if !auth::verify_password(&form.password, &account.password) {
        warn!(account_id = account.id, "login failed: wrong password");
        return Ok(flash::redirect_with_flash("/login", INVALID_CREDENTIALS));
    }
    info!(account_id = account.id, "logged in");
    begin_session(&data, &account)
}

pub async fn logout(user: CurrentUser, data: web::Data<AppState>) -> HttpResponse {
    info!(account_id = user.0.id, "logged out");
    HttpResponse::Found()
        .insert_header((header::LOCATION, "/"))
        .cookie(data.sessions.removal_cookie())
        .finish()
}

pub async fn show_post(
    req: HttpRequest,
    ident: Identity,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, AppError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    let comments = data.repo.list_comments(post.post.id).await?;
    Ok(page(&req, ident.0.as_ref(), |c| {
        views::post_page(c, &post, &comments, &CommentForm::default(), &FormErrors::default())
    }))
}

pub async fn comment_on_post(
    req: HttpRequest,
    ident: Identity,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    form: web::Form<CommentForm>,
) -> Result<HttpResponse, AppError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    let form = form.into_inner();
    if let Err(errors) = forms::check(&form) {
        let comments = data.repo.list_comments(post.post.id).await?;
        return Ok(page(&req, ident.0.as_ref(), |c| views::post_page(c, &post, &comments, &form, &errors)));
    }
    let Some(user) = ident.0 else {
        return Ok(flash::redirect_with_flash("/login", LOGIN_TO_COMMENT));
    };
    if !data.limiter.allow_comment(&client_ip(&req)) {
        return Err(AppError::TooManyRequests);
    }

    let comment = data.repo
        .create_comment(NewComment { text: form.comment, author_id: user.id, post_id: post.post.id })
        .await?;
    info!(comment_id = comment.id, post_id = post.post.id, account_id = user.id, "comment added");
    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, format!("/post/{}", post.post.id)))
        .finish())
}

pub async fn about(req: HttpRequest, ident: Identity) -> HttpResponse {
    page(&req, ident.0.as_ref(), views::about_page)
}

pub async fn contact(req: HttpRequest, ident: Identity) -> HttpResponse {
    page(&req, ident.0.as_ref(), views::contact_page)
}

pub async fn new_post_form(admin: AdminUser, req: HttpRequest) -> HttpResponse {
    page(&req, Some(&admin.0), |c| views::make_post_page(c, &PostForm::default(), &FormErrors::default(), None))
}

pub async fn create_post(
    admin: AdminUser,
    req: HttpRequest,
    data: web::Data<AppState>,
    form: web::Form<PostForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    if let Err(errors) = forms::check(&form) {
        return Ok(page(&req, Some(&admin.0), |c| views::make_post_page(c, &form, &errors, None)));
    }
    let new = NewPost {
        author_id: admin.0.id,
        title: form.title.clone(),
        subtitle: form.subtitle.clone(),
        date: Local::now().format(DATE_FORMAT).to_string(),
        body: form.body.clone(),
        img_url: form.img_url.clone(),
    };
    match data.repo.create_post(new).await {
        Ok(post) => {
            info!(post_id = post.id, "post created");
            Ok(redirect("/"))
        }
        Err(RepoError::Conflict) => {
            let mut errors = FormErrors::default();
            errors.add("title", DUPLICATE_TITLE);
            Ok(page(&req, Some(&admin.0), |c| views::make_post_page(c, &form, &errors, None)))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn edit_post_form(
    admin: AdminUser,
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, AppError> {
    let post = data.repo.get_post(path.into_inner()).await?.post;
    let form = PostForm {
        title: post.title,
        subtitle: post.subtitle,
        img_url: post.img_url,
        body: post.body,
    };
    Ok(page(&req, Some(&admin.0), |c| views::make_post_page(c, &form, &FormErrors::default(), Some(post.id))))
}

pub async fn edit_post(
    admin: AdminUser,
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    form: web::Form<PostForm>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    data.repo.get_post(id).await?;
    let form = form.into_inner();
    if let Err(errors) = forms::check(&form) {
        return Ok(page(&req, Some(&admin.0), |c| views::make_post_page(c, &form, &errors, Some(id))));
    }
    let upd = UpdatePost {
        title: form.title.clone(),
        subtitle: form.subtitle.clone(),
        body: form.body.clone(),
        img_url: form.img_url.clone(),
    };
    match data.repo.update_post(id, upd).await {
        Ok(post) => {
            info!(post_id = post.id, "post edited");
            Ok(redirect(&format!("/post/{}", post.id)))
        }
        Err(RepoError::Conflict) => {
            let mut errors = FormErrors::default();
            errors.add("title", DUPLICATE_TITLE);
            Ok(page(&req, Some(&admin.0), |c| views::make_post_page(c, &form, &errors, Some(id))))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_post(
    _admin: AdminUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    data.repo.delete_post(id).await?;
    info!(post_id = id, "post deleted");
    Ok(redirect("/"))
}

/// Any logged-in account may delete any comment.
pub async fn delete_comment(
    user: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, AppError> {
    let comment = data.repo.delete_comment(path.into_inner()).await?;
    info!(comment_id = comment.id, account_id = user.0.id, "comment deleted");
    Ok(match comment.post_id {
        Some(post_id) => redirect(&format!("/post/{post_id}")),
        None => redirect("/"),
    })
}
