pub mod appointments;
pub mod health;

use crate::state::AppState;
use actix_files::Files;
use actix_web::web;

pub fn init(cfg: &mut web::ServiceConfig, state: &AppState) {
    cfg.service(web::scope("/health").configure(health::init))
        .configure(|cfg| appointments::init(cfg, state.settings.max_upload_bytes))
        .service(Files::new("/uploads", state.uploads.dir()));
}
