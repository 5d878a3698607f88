use std::sync::Arc;

use actix_web::cookie::Cookie;
use actix_web::test::TestRequest;
use actix_web::{dev::Payload, web, FromRequest};
use quill::auth::{hash_password, verify_password, AdminUser, CurrentUser, Identity, Role, SESSION_COOKIE};
use quill::error::AppError;
use quill::models::{Account, NewAccount};
use quill::repo::inmem::InMemRepo;
use quill::repo::AccountRepo;
use quill::{require_role, AppState};

mod common;

#[test]
fn password_hash_roundtrip() {
    let hash = hash_password("hunter2").expect("hash");
    assert_ne!(hash, "hunter2");
    assert!(hash.starts_with("$argon2"));
    assert!(verify_password("hunter2", &hash));
    assert!(!verify_password("hunter3", &hash));
}

#[test]
fn same_password_hashes_differently() {
    let a = hash_password("pw").unwrap();
    let b = hash_password("pw").unwrap();
    assert_ne!(a, b);
}

#[test]
fn malformed_stored_hash_never_verifies() {
    assert!(!verify_password("pw", "pw"));
    assert!(!verify_password("", ""));
}

async fn seeded() -> (AppState, Account, Account) {
    let repo = Arc::new(InMemRepo::new());
    let mk = |email: &str, name: &str| NewAccount {
        email: email.into(),
        password_hash: hash_password("pw").unwrap(),
        name: name.into(),
    };
    let admin = repo.create_account(mk("admin@x.com", "Admin")).await.unwrap();
    let user = repo.create_account(mk("user@x.com", "User")).await.unwrap();
    (common::state_with(repo), admin, user)
}

fn request_as(state: &AppState, account: Option<&Account>) -> actix_web::HttpRequest {
    let mut req = TestRequest::default().app_data(web::Data::new(state.clone()));
    if let Some(account) = account {
        let token = state.sessions.create_token(account.id).unwrap();
        req = req.cookie(Cookie::new(SESSION_COOKIE, token));
    }
    req.to_http_request()
}

#[actix_web::test]
async fn extractors_resolve_the_session_account() {
    let (state, admin, user) = seeded().await;

    let req = request_as(&state, Some(&user));
    let ident = Identity::from_request(&req, &mut Payload::None).await.unwrap();
    assert_eq!(ident.0.map(|a| a.id), Some(user.id));
    let current = CurrentUser::from_request(&req, &mut Payload::None).await.unwrap();
    assert_eq!(current.0.email, "user@x.com");
    assert!(matches!(
        AdminUser::from_request(&req, &mut Payload::None).await,
        Err(AppError::Forbidden)
    ));

    let req = request_as(&state, Some(&admin));
    let admin_ext = AdminUser::from_request(&req, &mut Payload::None).await.unwrap();
    assert_eq!(admin_ext.0.role, Role::Admin);
}

#[actix_web::test]
async fn anonymous_requests_are_rejected_by_gated_extractors() {
    let (state, _, _) = seeded().await;
    let req = request_as(&state, None);

    assert!(Identity::from_request(&req, &mut Payload::None).await.unwrap().0.is_none());
    assert!(matches!(
        CurrentUser::from_request(&req, &mut Payload::None).await,
        Err(AppError::Unauthorized)
    ));
    assert!(matches!(
        AdminUser::from_request(&req, &mut Payload::None).await,
        Err(AppError::Forbidden)
    ));
}

#[actix_web::test]
async fn garbage_cookie_is_anonymous() {
    let (state, _, _) = seeded().await;
    let req = TestRequest::default()
        .app_data(web::Data::new(state))
        .cookie(Cookie::new(SESSION_COOKIE, "garbage"))
        .to_http_request();
    assert!(Identity::from_request(&req, &mut Payload::None).await.unwrap().0.is_none());
}

#[actix_web::test]
async fn require_role_macro_enforces_roles() {
    let (_, admin, user) = seeded().await;

    fn guarded(account: &Account) -> Result<(), AppError> {
        require_role!(account, Role::Admin);
        Ok(())
    }
    assert!(guarded(&admin).is_ok());
    assert!(matches!(guarded(&user), Err(AppError::Forbidden)));
}
