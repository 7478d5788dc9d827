use crate::error::ApiError;
use crate::handlers::validation::{check_conflicts, parse_range, validate_fields};
use crate::models::appointment::{
    Appointment, AppointmentDraft, AppointmentStatus, AppointmentView,
};
use crate::models::query::RangeQuery;
use crate::storage::json_file::Mutation;
use crate::storage::{AppointmentStore, UploadStore};
use chrono::Utc;
use tracing::info;
use url::Url;
use uuid::Uuid;

/// A file received with a save request, held in memory until validation passes.
#[derive(Debug)]
pub struct PendingUpload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Validates and appends a batch. The upload, if any, is attached to every
/// record of the batch and is only written once the field checks pass.
pub async fn save_appointments(
    store: &AppointmentStore,
    uploads: &UploadStore,
    drafts: Vec<AppointmentDraft>,
    upload: Option<PendingUpload>,
) -> Result<Vec<Appointment>, ApiError> {
    let valid = validate_fields(drafts)?;

    let image = match upload {
        Some(upload) => Some(
            uploads
                .store(upload.file_name.as_deref(), &upload.bytes)
                .await?,
        ),
        None => None,
    };

    let created_at = Utc::now();
    let stored_image = image.clone();
    let result = store
        .update(move |existing: &mut Vec<Appointment>| -> Result<_, ApiError> {
            check_conflicts(&valid, existing)?;

            let created: Vec<Appointment> = valid
                .into_iter()
                .map(|draft| Appointment {
                    id: draft.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                    cedula: draft.cedula,
                    arrival_time: draft.arrival_time,
                    status: AppointmentStatus::Active,
                    image: stored_image.clone(),
                    revision: 0,
                    created_at: Some(created_at),
                    extra: draft.extra,
                })
                .collect();

            existing.extend(created.iter().cloned());
            Ok(Mutation::Changed(created))
        })
        .await;

    match result {
        Ok(created) => {
            for appointment in &created {
                info!(
                    id = %appointment.id,
                    arrival = %appointment.arrival_time.as_str(),
                    image = ?appointment.image,
                    "appointment saved"
                );
            }
            Ok(created)
        }
        Err(e) => {
            if let Some(name) = image {
                uploads.remove(&name).await;
            }
            Err(e)
        }
    }
}

/// Appointments whose arrival date falls in the requested days, cancelled
/// ones included, each with a download link for its upload.
pub async fn find_appointments(
    store: &AppointmentStore,
    public_url: &Url,
    query: &RangeQuery,
) -> Result<Vec<AppointmentView>, ApiError> {
    let (range, cedula) = parse_range(query)?;

    let views = store
        .load()
        .await?
        .into_iter()
        .filter(|a| a.arrival_time.date().is_some_and(|day| range.contains(day)))
        .filter(|a| cedula.as_deref().is_none_or(|c| a.cedula == c))
        .map(|appointment| {
            let image_url = appointment
                .image
                .as_deref()
                .and_then(|name| public_url.join(&format!("uploads/{name}")).ok())
                .map(String::from);
            AppointmentView {
                appointment,
                image_url,
            }
        })
        .collect();

    Ok(views)
}

/// Marks an appointment cancelled. Cancelling twice is not an error.
pub async fn cancel_appointment(
    store: &AppointmentStore,
    id: &str,
) -> Result<Appointment, ApiError> {
    let cancelled = store
        .update(|appointments: &mut Vec<Appointment>| -> Result<_, ApiError> {
            let appointment = appointments
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| ApiError::NotFound(format!("no appointment with id {id}")))?;

            if appointment.cancel() {
                Ok(Mutation::Changed(appointment.clone()))
            } else {
                Ok(Mutation::Unchanged(appointment.clone()))
            }
        })
        .await?;

    info!(id = %cancelled.id, revision = cancelled.revision, "appointment cancelled");
    Ok(cancelled)
}
