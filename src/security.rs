use std::rc::Rc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{self, HeaderName, HeaderValue};
use actix_web::Error;
use futures_util::future::{ready, LocalBoxFuture, Ready};

use crate::config::flag;

// Post cover images and Gravatar avatars are remote.
const CSP: &str = "default-src 'self'; img-src 'self' https: data:; object-src 'none'; \
                   base-uri 'none'; frame-ancestors 'none'; form-action 'self'";
const HSTS: &str = "max-age=63072000; includeSubDomains; preload";

/// Adds hardening headers to every response unless the handler already set them.
#[derive(Clone, Debug, Default)]
pub struct SecurityHeaders {
    pub enable_hsts: bool,
}

impl SecurityHeaders {
    pub fn from_env() -> Self {
        Self { enable_hsts: std::env::var("ENABLE_HSTS").is_ok_and(|v| flag(&v)) }
    }

    pub fn with_hsts(mut self, enable: bool) -> Self {
        self.enable_hsts = enable;
        self
    }

    fn defaults(&self) -> Vec<(HeaderName, HeaderValue)> {
        let mut set = vec![
            (header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(CSP)),
            (header::REFERRER_POLICY, HeaderValue::from_static("same-origin")),
            (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
            (header::X_XSS_PROTECTION, HeaderValue::from_static("0")),
        ];
        if self.enable_hsts {
            set.push((header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS)));
        }
        set
    }
}

impl<S, B> Transform<S, ServiceRequest> for SecurityHeaders
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = HeaderStamp<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HeaderStamp { service: Rc::new(service), headers: Rc::new(self.defaults()) }))
    }
}

pub struct HeaderStamp<S> {
    service: Rc<S>,
    headers: Rc<Vec<(HeaderName, HeaderValue)>>,
}

impl<S, B> Service<ServiceRequest> for HeaderStamp<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let defaults = Rc::clone(&self.headers);
        Box::pin(async move {
            let mut res = service.call(req).await?;
            let out = res.headers_mut();
            for (name, value) in defaults.iter() {
                if !out.contains_key(name) {
                    out.insert(name.clone(), value.clone());
                }
            }
            Ok(res)
        })
    }
}
