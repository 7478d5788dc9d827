pub mod error;
pub mod json_file;
pub mod uploads;

pub use error::StorageError;
pub use json_file::AppointmentStore;
pub use uploads::UploadStore;
