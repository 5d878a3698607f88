#![allow(dead_code)]

use std::sync::Arc;

use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::http::header;
use actix_web::test::TestRequest;
use quill::auth::{SessionKeys, SESSION_COOKIE};
use quill::flash::FLASH_COOKIE;
use quill::rate_limit::RateLimiterFacade;
use quill::repo::{sqlite::SqliteRepo, Repo};
use quill::AppState;

pub const SECRET: &[u8] = b"integration-test-secret-32-bytes!!";

pub fn state_with(repo: Arc<dyn Repo>) -> AppState {
    AppState::new(repo, SessionKeys::new(SECRET, 24, false), RateLimiterFacade::disabled())
}

pub async fn sqlite_repo() -> SqliteRepo {
    SqliteRepo::connect("sqlite::memory:").await.expect("in-memory sqlite")
}

pub fn form_post(uri: &str, fields: &[(&str, &str)]) -> TestRequest {
    TestRequest::post().uri(uri).set_form(fields)
}

pub fn register_req(email: &str, password: &str, name: &str) -> TestRequest {
    form_post("/register", &[("email", email), ("password", password), ("name", name)])
}

pub fn login_req(email: &str, password: &str) -> TestRequest {
    form_post("/login", &[("email", email), ("password", password)])
}

pub fn post_fields<'a>(title: &'a str, body: &'a str) -> Vec<(&'a str, &'a str)> {
    vec![
        ("title", title),
        ("subtitle", "a subtitle"),
        ("img_url", "https://example.com/cover.png"),
        ("body", body),
    ]
}

fn cookie_named<B>(resp: &ServiceResponse<B>, name: &str) -> Option<Cookie<'static>> {
    resp.response().cookies().find(|c| c.name() == name).map(|c| c.into_owned())
}

pub fn session_cookie<B>(resp: &ServiceResponse<B>) -> Option<Cookie<'static>> {
    cookie_named(resp, SESSION_COOKIE).filter(|c| !c.value().is_empty())
}

pub fn flash_cookie<B>(resp: &ServiceResponse<B>) -> Option<Cookie<'static>> {
    cookie_named(resp, FLASH_COOKIE).filter(|c| !c.value().is_empty())
}

pub fn location<B>(resp: &ServiceResponse<B>) -> String {
    resp.headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default()
}

pub async fn body_text<B: actix_web::body::MessageBody>(resp: ServiceResponse<B>) -> String {
    String::from_utf8(actix_web::test::read_body(resp).await.to_vec()).unwrap()
}
