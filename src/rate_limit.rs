use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

use crate::config::{flag, secs_env, usize_env};

/// Sliding-window limiter keyed by arbitrary strings. State is process local.
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    hits: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { hits: Arc::new(DashMap::new()), enabled }
    }

    /// Records a hit for `key` and reports whether it fits in `limit` per `window`.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut recent = self.hits.entry(key.to_owned()).or_default();
        let stale = recent.iter().take_while(|at| now.duration_since(**at) >= window).count();
        recent.drain(..stale);
        let admitted = recent.len() < limit;
        if admitted {
            recent.push_back(now);
        }
        admitted
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    Login,
    Register,
    Comment,
}

impl Action {
    fn prefix(self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::Register => "register",
            Action::Comment => "comment",
        }
    }
}

/// Per-action limits derived from env.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub login_limit: usize,
    pub login_window: Duration,
    pub register_limit: usize,
    pub register_window: Duration,
    pub comment_limit: usize,
    pub comment_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_limit: 10,
            login_window: Duration::from_secs(60),
            register_limit: 5,
            register_window: Duration::from_secs(3600),
            comment_limit: 10,
            comment_window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            login_limit: usize_env("RL_LOGIN_LIMIT", d.login_limit),
            login_window: secs_env("RL_LOGIN_WINDOW", d.login_window.as_secs()),
            register_limit: usize_env("RL_REGISTER_LIMIT", d.register_limit),
            register_window: secs_env("RL_REGISTER_WINDOW", d.register_window.as_secs()),
            comment_limit: usize_env("RL_COMMENT_LIMIT", d.comment_limit),
            comment_window: secs_env("RL_COMMENT_WINDOW", d.comment_window.as_secs()),
        }
    }
}

/// Per-IP throttling for credential and comment submissions.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }

    pub fn from_env() -> Self {
        let enabled = std::env::var("RATE_LIMIT_ENABLED").map_or(true, |v| flag(&v));
        Self::new(InMemoryRateLimiter::new(enabled), RateLimitConfig::from_env())
    }

    pub fn disabled() -> Self { Self::new(InMemoryRateLimiter::new(false), RateLimitConfig::default()) }

    fn allow(&self, action: Action, ip: &str) -> bool {
        let (limit, window) = match action {
            Action::Login => (self.cfg.login_limit, self.cfg.login_window),
            Action::Register => (self.cfg.register_limit, self.cfg.register_window),
            Action::Comment => (self.cfg.comment_limit, self.cfg.comment_window),
        };
        let allowed = self.limiter.check(&format!("{}:{ip}", action.prefix()), limit, window);
        if !allowed {
            tracing::warn!(action = action.prefix(), "rate limit exceeded");
        }
        allowed
    }

    pub fn allow_login(&self, ip: &str) -> bool { self.allow(Action::Login, ip) }
    pub fn allow_register(&self, ip: &str) -> bool { self.allow(Action::Register, ip) }
    pub fn allow_comment(&self, ip: &str) -> bool { self.allow(Action::Comment, ip) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_basic() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_millis(50);
        for _ in 0..3 { assert!(rl.check("k", 3, window)); }
        assert!(!rl.check("k", 3, window));
    }

    #[test]
    fn window_expiry_readmits() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_millis(20);
        assert!(rl.check("k", 1, window));
        assert!(!rl.check("k", 1, window));
        std::thread::sleep(Duration::from_millis(30));
        assert!(rl.check("k", 1, window));
    }

    #[test]
    fn actions_are_counted_separately() {
        let cfg = RateLimitConfig { login_limit: 1, comment_limit: 1, ..RateLimitConfig::default() };
        let rl = RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg);
        assert!(rl.allow_login("1.2.3.4"));
        assert!(!rl.allow_login("1.2.3.4"));
        assert!(rl.allow_login("5.6.7.8"));
        assert!(rl.allow_comment("1.2.3.4"));
    }

    #[test]
    fn disabled_limiter_allows_everything() {
        let rl = RateLimiterFacade::disabled();
        for _ in 0..100 { assert!(rl.allow_register("x")); }
    }
}
