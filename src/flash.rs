//! One-shot messages carried to the next rendered page in a cookie.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse};

pub const FLASH_COOKIE: &str = "_flash";

/// Redirect to `location`, leaving `message` for the page rendered there.
pub fn redirect_with_flash(location: &str, message: &str) -> HttpResponse {
    let cookie = Cookie::build(FLASH_COOKIE, urlencoding::encode(message).into_owned())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();
    HttpResponse::Found()
        .insert_header((header::LOCATION, location.to_string()))
        .cookie(cookie)
        .finish()
}

/// Read the pending message, if any. Pair with [`consumed`] on the response.
pub fn peek(req: &HttpRequest) -> Option<String> {
    let cookie = req.cookie(FLASH_COOKIE)?;
    urlencoding::decode(cookie.value()).ok().map(|m| m.into_owned()).filter(|m| !m.is_empty())
}

/// Cookie that clears a shown message.
pub fn consumed() -> Cookie<'static> {
    Cookie::build(FLASH_COOKIE, "")
        .path("/")
        .max_age(CookieDuration::ZERO)
        .finish()
}
