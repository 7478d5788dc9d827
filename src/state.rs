use crate::config::Settings;
use crate::storage::{AppointmentStore, UploadStore};

/// Shared by every worker through `web::Data`.
pub struct AppState {
    pub settings: Settings,
    pub store: AppointmentStore,
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        AppState {
            store: AppointmentStore::new(&settings.data_file),
            uploads: UploadStore::new(&settings.uploads_dir),
            settings,
        }
    }
}
