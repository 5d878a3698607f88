use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{Account, Id};
use crate::repo::RepoError;
use crate::routes::AppState;

pub use crate::models::Role;

/// Helper macro for role-guarding handlers.
#[macro_export]
macro_rules! require_role {
    ($account:expr, $role:pat) => {
        if !matches!($account.role, $role) {
            return Err($crate::error::AppError::Forbidden.into());
        }
    };
}

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // account id
    pub exp: usize,
}

/// Signing material and cookie policy for session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
    secure_cookie: bool,
}

impl SessionKeys {
    pub fn new(secret: &[u8], ttl_hours: i64, secure_cookie: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_hours,
            secure_cookie,
        }
    }

    pub fn create_token(&self, account_id: Id) -> Result<String, jsonwebtoken::errors::Error> {
        self.create_token_expiring(account_id, chrono::Duration::hours(self.ttl_hours))
    }

    fn create_token_expiring(
        &self,
        account_id: Id,
        ttl: chrono::Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = (chrono::Utc::now() + ttl).timestamp().max(0) as usize;
        let claims = Claims { sub: account_id.to_string(), exp };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Validate a session token and return its claims.
    pub fn decode_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, token)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie)
            .max_age(CookieDuration::hours(self.ttl_hours))
            .finish()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, "")
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(CookieDuration::ZERO)
            .finish()
    }
}

/// Hash a plaintext password into an argon2 PHC string with a fresh salt.
pub fn hash_password(plain: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default().hash_password(plain.as_bytes(), &salt)?.to_string())
}

pub fn verify_password(plain: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default().verify_password(plain.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

/// Resolve the session cookie back to a stored account. Bad, expired or
/// dangling sessions are simply anonymous.
async fn resolve_identity(req: HttpRequest) -> Result<Option<Account>, AppError> {
    let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
        tracing::error!("AppState missing from app data");
        return Err(AppError::Internal);
    };
    let Some(cookie) = req.cookie(SESSION_COOKIE) else { return Ok(None) };
    let Ok(claims) = state.sessions.decode_token(cookie.value()) else { return Ok(None) };
    let Ok(id) = claims.sub.parse::<Id>() else { return Ok(None) };
    match state.repo.get_account(id).await {
        Ok(account) => Ok(Some(account)),
        Err(RepoError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Extractor yielding the current account, if any. Never rejects.
pub struct Identity(pub Option<Account>);

impl FromRequest for Identity {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, AppError>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { Ok(Identity(resolve_identity(req).await?)) })
    }
}

/// Extractor requiring any authenticated account (401 otherwise).
pub struct CurrentUser(pub Account);

impl FromRequest for CurrentUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, AppError>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            resolve_identity(req).await?.map(CurrentUser).ok_or(AppError::Unauthorized)
        })
    }
}

/// Extractor requiring the administrator (403 otherwise, anonymous included).
pub struct AdminUser(pub Account);

impl FromRequest for AdminUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, AppError>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let Some(account) = resolve_identity(req).await? else {
                return Err(AppError::Forbidden);
            };
            require_role!(account, Role::Admin);
            Ok(AdminUser(account))
        })
    }
}
