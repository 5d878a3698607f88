use std::sync::Arc;

use actix_web::{test, web, App};
use quill::repo::inmem::InMemRepo;
use quill::repo::PostRepo;
use quill::{config, AppState};

mod common;

fn state(repo: &Arc<InMemRepo>) -> AppState {
    common::state_with(repo.clone())
}

#[actix_web::test]
async fn only_the_administrator_reaches_post_management() {
    let repo = Arc::new(InMemRepo::new());
    let app = test::init_service(App::new().app_data(web::Data::new(state(&repo))).configure(config)).await;

    let resp = test::call_service(&app, common::register_req("admin@x.com", "pw", "Admin").to_request()).await;
    let admin = common::session_cookie(&resp).unwrap();
    let resp = test::call_service(&app, common::register_req("user@x.com", "pw", "User").to_request()).await;
    let user = common::session_cookie(&resp).unwrap();

    let req = common::form_post("/new-post", &common::post_fields("Kept", "<p>k</p>"))
        .cookie(admin.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 302);

    // a regular account is forbidden everywhere admin-gated
    for uri in ["/new-post", "/edit-post/1", "/delete/1"] {
        let req = test::TestRequest::get().uri(uri).cookie(user.clone()).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403, "GET {uri}");
    }
    for uri in ["/new-post", "/edit-post/1"] {
        let req = common::form_post(uri, &common::post_fields("Hijacked", "<p>h</p>"))
            .cookie(user.clone())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403, "POST {uri}");
    }

    // so is an anonymous visitor
    for uri in ["/new-post", "/edit-post/1", "/delete/1"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403, "anonymous GET {uri}");
    }

    // nothing changed
    let posts = repo.list_posts().await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].post.title, "Kept");

    // the administrator sees the admin controls, the user does not
    let req = test::TestRequest::get().uri("/").cookie(admin).to_request();
    assert!(common::body_text(test::call_service(&app, req).await).await.contains("/new-post"));
    let req = test::TestRequest::get().uri("/").cookie(user).to_request();
    assert!(!common::body_text(test::call_service(&app, req).await).await.contains("/new-post"));
}

#[actix_web::test]
async fn login_gated_routes_reject_anonymous_visitors() {
    let repo = Arc::new(InMemRepo::new());
    let app = test::init_service(App::new().app_data(web::Data::new(state(&repo))).configure(config)).await;

    for uri in ["/logout", "/delete-comment/1"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401, "{uri}");
    }
}

#[actix_web::test]
async fn tampered_or_dangling_sessions_are_anonymous() {
    let repo = Arc::new(InMemRepo::new());
    let app = test::init_service(App::new().app_data(web::Data::new(state(&repo))).configure(config)).await;

    let forged = actix_web::cookie::Cookie::new("session", "not.a.token");
    let req = test::TestRequest::get().uri("/logout").cookie(forged).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    // a validly signed token for an account that does not exist
    let token = common::state_with(repo.clone()).sessions.create_token(99).unwrap();
    let req = test::TestRequest::get()
        .uri("/new-post")
        .cookie(actix_web::cookie::Cookie::new("session", token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
}

#[actix_web::test]
async fn missing_posts_are_not_found_for_the_administrator() {
    let repo = Arc::new(InMemRepo::new());
    let app = test::init_service(App::new().app_data(web::Data::new(state(&repo))).configure(config)).await;
    let resp = test::call_service(&app, common::register_req("admin@x.com", "pw", "Admin").to_request()).await;
    let admin = common::session_cookie(&resp).unwrap();

    for uri in ["/edit-post/42", "/delete/42"] {
        let req = test::TestRequest::get().uri(uri).cookie(admin.clone()).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404, "{uri}");
    }
    let req = common::form_post("/edit-post/42", &common::post_fields("T", "<p>b</p>"))
        .cookie(admin)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get().uri("/post/42").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}
