use crate::models::appointment::Appointment;
use crate::storage::StorageError;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Result of an [`AppointmentStore::update`] closure: whether the list must be
/// written back, plus the value handed to the caller.
pub enum Mutation<T> {
    Changed(T),
    Unchanged(T),
}

/// Whole-file JSON store. Every read parses the full array, every write
/// replaces it.
///
/// Writers inside this process queue on `write_lock`; nothing guards against a
/// second process using the same file.
pub struct AppointmentStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AppointmentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AppointmentStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or blank file reads as an empty list.
    ///
    /// Records stored without an id get one derived from their position and
    /// content, so it stays the same across loads until the next write stores it.
    pub async fn load(&self) -> Result<Vec<Appointment>, StorageError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "appointment file missing, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut appointments: Vec<Appointment> =
            serde_json::from_str(&content).map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        let backfilled = backfill_ids(&mut appointments);
        if backfilled > 0 {
            debug!(
                path = %self.path.display(),
                count = backfilled,
                "assigned ids to stored records"
            );
        }
        let unscheduled = appointments
            .iter()
            .filter(|a| !a.arrival_time.is_scheduled())
            .count();
        if unscheduled > 0 {
            warn!(
                path = %self.path.display(),
                count = unscheduled,
                "stored records with unrecognized arrival times are kept but never match a query"
            );
        }

        debug!(path = %self.path.display(), count = appointments.len(), "appointments loaded");
        Ok(appointments)
    }

    pub async fn replace_all(&self, appointments: &[Appointment]) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(appointments).map_err(StorageError::Encode)?;
        let path = self.path.clone();
        let count = appointments.len();

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes)).await??;

        debug!(path = %self.path.display(), count, "appointments written");
        Ok(())
    }

    /// Load, let `apply` edit the list, and write it back if it reports a change.
    /// Nothing is written when `apply` fails.
    pub async fn update<T, E, F>(&self, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut Vec<Appointment>) -> Result<Mutation<T>, E>,
        E: From<StorageError>,
    {
        let _guard = self.write_lock.lock().await;

        let mut appointments = self.load().await?;
        match apply(&mut appointments)? {
            Mutation::Changed(value) => {
                self.replace_all(&appointments).await?;
                Ok(value)
            }
            Mutation::Unchanged(value) => Ok(value),
        }
    }
}

fn backfill_ids(appointments: &mut [Appointment]) -> usize {
    let mut assigned = 0;
    for (index, appointment) in appointments.iter_mut().enumerate() {
        if !appointment.id.is_empty() {
            continue;
        }
        let name = format!(
            "{index}:{}:{}",
            appointment.cedula,
            appointment.arrival_time.as_str()
        );
        appointment.id = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string();
        assigned += 1;
    }
    assigned
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StorageError::io(&dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| StorageError::io(tmp.path(), e))?;

    tmp.persist(path).map_err(|source| StorageError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, arrival: &str) -> Appointment {
        serde_json::from_value(json!({
            "id": id,
            "cedula": "0912345678",
            "arrivalTime": arrival,
            "status": "active"
        }))
        .unwrap()
    }

    #[actix_web::test]
    async fn missing_and_blank_files_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = AppointmentStore::new(dir.path().join("citas.json"));
        assert!(store.load().await.unwrap().is_empty());

        std::fs::write(store.path(), "  \n").unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn corrupt_file_is_an_error_not_an_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = AppointmentStore::new(dir.path().join("citas.json"));
        std::fs::write(store.path(), "{ not json").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[actix_web::test]
    async fn records_without_ids_load_and_keep_their_assigned_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = AppointmentStore::new(dir.path().join("citas.json"));
        let legacy = json!([{
            "cedula": "0912345678",
            "arrivalTime": "2024-05-01T09:00:00.000Z",
            "status": "active",
            "image": null
        }]);
        std::fs::write(store.path(), legacy.to_string()).unwrap();

        let first = store.load().await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(Uuid::parse_str(&first[0].id).is_ok());
        assert!(first[0].is_active());
        assert_eq!(store.load().await.unwrap()[0].id, first[0].id);

        let id = first[0].id.clone();
        store
            .update(|list| {
                list.push(record("b", "2024-05-02"));
                Ok::<_, StorageError>(Mutation::Changed(()))
            })
            .await
            .unwrap();
        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk[0]["id"], json!(id));
    }

    #[actix_web::test]
    async fn unrecognized_arrival_times_do_not_break_loading() {
        let dir = tempfile::tempdir().unwrap();
        let store = AppointmentStore::new(dir.path().join("citas.json"));
        std::fs::write(
            store.path(),
            r#"[
                {"cedula":"0912345678","arrivalTime":"2024-05-01 09:00","status":"active"},
                {"cedula":"0912345678","arrivalTime":"mañana","status":"active"},
                {"id":"c","cedula":"0912345678","arrivalTime":"2024-05-01T10:00","status":"active"}
            ]"#,
        )
        .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].arrival_time.as_str(), "2024-05-01 09:00");
        assert_eq!(loaded[0].arrival_time.date(), None);
        assert!(!loaded[1].arrival_time.is_scheduled());
        assert_ne!(loaded[0].id, loaded[1].id);
        assert_eq!(loaded[2].id, "c");

        store.replace_all(&loaded).await.unwrap();
        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk[1]["arrivalTime"], "mañana");
    }

    #[actix_web::test]
    async fn replace_all_creates_parent_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = AppointmentStore::new(dir.path().join("data").join("citas.json"));

        store
            .replace_all(&[record("a", "2024-05-01T09:00:00Z"), record("b", "2024-05-02")])
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].id, "b");
        assert_eq!(loaded[1].arrival_time.as_str(), "2024-05-02");

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert!(on_disk.is_array());
    }

    #[actix_web::test]
    async fn failed_update_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = AppointmentStore::new(dir.path().join("citas.json"));
        store.replace_all(&[record("a", "2024-05-01")]).await.unwrap();

        let result: Result<(), StorageError> = store
            .update(|list| {
                list.clear();
                Err(StorageError::Encode(serde_json::Error::io(std::io::Error::other("no"))))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.load().await.unwrap().len(), 1);

        let count: Result<usize, StorageError> = store
            .update(|list| {
                list.push(record("b", "2024-05-03"));
                Ok(Mutation::Changed(list.len()))
            })
            .await;
        assert_eq!(count.unwrap(), 2);
        assert_eq!(store.load().await.unwrap().len(), 2);
    }
}
