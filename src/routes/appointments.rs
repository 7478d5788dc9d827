use crate::error::ApiError;
use crate::handlers::appointments::{
    PendingUpload, cancel_appointment, find_appointments, save_appointments,
};
use crate::models::appointment::{AppointmentDraft, SavePayload};
use crate::models::query::RangeQuery;
use crate::state::AppState;
use actix_multipart::{Multipart, MultipartError};
use actix_web::http::header::CONTENT_TYPE;
use actix_web::{FromRequest, HttpRequest, HttpResponse, get, route, routes, web};
use futures_util::TryStreamExt;
use serde_json::{Map, Value, json};

/// Multipart field names that carry the uploaded document.
const UPLOAD_FIELDS: [&str; 2] = ["image", "file"];

#[routes]
#[post("/save")]
#[post("/create")]
#[post("/citas")]
async fn save(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let (drafts, upload) = if is_multipart(&req) {
        let multipart = Multipart::new(req.headers(), payload);
        read_multipart(multipart, state.settings.max_upload_bytes).await?
    } else {
        let mut payload = payload.into_inner();
        let web::Json(body) = web::Json::<SavePayload>::from_request(&req, &mut payload).await?;
        (body.into_drafts(), None)
    };

    let created = save_appointments(&state.store, &state.uploads, drafts, upload).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "appointments saved",
        "appointments": created,
    })))
}

#[get("/citas")]
async fn list(
    query: web::Query<RangeQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let views = find_appointments(&state.store, &state.settings.public_url, &query).await?;
    Ok(HttpResponse::Ok().json(views))
}

#[route("/cancel/{id}", method = "DELETE", method = "PATCH")]
async fn cancel(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let cancelled = cancel_appointment(&state.store, &id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "appointment cancelled",
        "appointmentId": cancelled.id,
        "appointment": cancelled,
    })))
}

/// `json_limit` caps JSON save bodies; multipart bodies are capped while reading.
pub fn init(cfg: &mut web::ServiceConfig, json_limit: usize) {
    cfg.app_data(json_config(json_limit))
        .service(save)
        .service(list)
        .service(cancel);
}

fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| ApiError::BadRequest(format!("invalid JSON body: {err}")).into())
}

fn is_multipart(req: &HttpRequest) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"))
}

fn too_large(limit: usize) -> ApiError {
    ApiError::BadRequest(format!("request body exceeds {limit} bytes"))
}

fn bad_multipart(e: MultipartError) -> ApiError {
    ApiError::BadRequest(format!("malformed multipart body: {e}"))
}

/// Text fields become one draft; at most one non-empty file field is kept.
async fn read_multipart(
    mut multipart: Multipart,
    limit: usize,
) -> Result<(Vec<AppointmentDraft>, Option<PendingUpload>), ApiError> {
    let mut fields = Map::new();
    let mut upload = None;
    let mut received = 0usize;

    while let Some(mut field) = multipart.try_next().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(bad_multipart)? {
            received += chunk.len();
            if received > limit {
                return Err(too_large(limit));
            }
            bytes.extend_from_slice(&chunk);
        }

        if UPLOAD_FIELDS.contains(&name.as_str()) {
            // browsers send an empty part when no file was picked
            if bytes.is_empty() {
                continue;
            }
            if upload.is_some() {
                return Err(ApiError::BadRequest(
                    "only one file may be uploaded per request".to_string(),
                ));
            }
            upload = Some(PendingUpload { file_name, bytes });
        } else if !name.is_empty() {
            let text = String::from_utf8(bytes)
                .map_err(|_| ApiError::BadRequest(format!("field {name} is not valid UTF-8")))?;
            fields.insert(name, Value::String(text));
        }
    }

    let draft: AppointmentDraft = serde_json::from_value(Value::Object(fields))
        .map_err(|e| ApiError::BadRequest(format!("invalid form fields: {e}")))?;
    Ok((vec![draft], upload))
}
