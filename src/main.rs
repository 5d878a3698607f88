use actix_web::{middleware::Compress, web, App, HttpServer};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use tracing_actix_web::TracingLogger;

use quill::auth::SessionKeys;
use quill::config::{Settings, StoreKind};
use quill::rate_limit::RateLimiterFacade;
use quill::repo::{inmem::InMemRepo, sqlite::SqliteRepo, Repo};
use quill::{routes, AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Environment is normally provided by the shell/systemd/Docker; debug builds also read .env.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let settings = Settings::from_env()?;
    info!("Bootstrapping blog server");

    let repo: Arc<dyn Repo> = match settings.store {
        StoreKind::Memory => {
            info!("Using in-memory repository backend");
            Arc::new(InMemRepo::new())
        }
        StoreKind::Sqlite => {
            info!(url = %settings.database_url, "Using SQLite repository backend");
            Arc::new(SqliteRepo::connect(&settings.database_url).await?)
        }
    };

    let sessions = SessionKeys::new(
        settings.secret_key.as_bytes(),
        settings.session_ttl_hours,
        settings.cookie_secure,
    );
    let state = AppState::new(repo, sessions, RateLimiterFacade::from_env());
    let security = SecurityHeaders::from_env();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(security.clone())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::config)
    })
    .bind(settings.bind_addr.as_str())?;

    info!("Listening on http://{}", settings.bind_addr);
    server.run().await?;
    Ok(())
}
