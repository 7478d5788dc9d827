use crate::state::AppState;
use actix_web::{HttpResponse, Responder, get, web};
use serde_json::json;

#[get("/ping")]
async fn ping() -> impl Responder {
    HttpResponse::Ok().body("pong")
}

/// Ready once the appointment file can be read and parsed.
#[get("/ready")]
async fn ready(state: web::Data<AppState>) -> impl Responder {
    match state.store.load().await {
        Ok(appointments) => HttpResponse::Ok().json(json!({
            "status": "ok",
            "appointments": appointments.len(),
        })),
        Err(e) => {
            tracing::error!(
                path = %state.store.path().display(),
                error = %e,
                "readiness check failed"
            );
            HttpResponse::ServiceUnavailable().json(json!({ "status": "unavailable" }))
        }
    }
}

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.service(ping).service(ready);
}
