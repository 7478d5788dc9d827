mod config;
mod error;
mod handlers;
mod models;
mod routes;
mod state;
mod storage;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use anyhow::Context;
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // before the subscriber, so RUST_LOG may come from .env
    let env_file = dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = env_file {
        tracing::debug!("no .env file loaded: {}", e);
    }

    let settings = Settings::from_env()?;
    std::fs::create_dir_all(&settings.uploads_dir).with_context(|| {
        format!("creating uploads directory {}", settings.uploads_dir.display())
    })?;

    tracing::info!(
        host = %settings.host,
        port = settings.port,
        data_file = %settings.data_file.display(),
        uploads_dir = %settings.uploads_dir.display(),
        "starting appointment service"
    );

    let bind = (settings.host.clone(), settings.port);
    let state = web::Data::new(AppState::new(settings));

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(|cfg| routes::init(cfg, &state))
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
