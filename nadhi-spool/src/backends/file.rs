use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use nadhi_common::{LogItem, internal};

use crate::{
    DiskStore, RecordId, Result, SpoolError,
    types::{IdGenerator, RECORD_EXTENSION},
};

const TEMP_PREFIX: &str = ".tmp_";
const DELETED_SUFFIX: &str = ".deleted";

/// File-based disk store
///
/// Each record is a JSON file named after its [`RecordId`]:
/// `{ulid}.json`. Because identifiers come from a monotonic generator,
/// sorting file names yields arrival order.
///
/// # Atomicity
/// - Writes go to `.tmp_{ulid}.json` and are renamed into place, so a crash
///   never leaves a partial record visible to `list`.
/// - Removal renames to `{ulid}.json.deleted` before unlinking; leftovers
///   from a crash are cleaned up by [`FileStore::init`].
///
/// # Concurrency
/// Identifier assignment is serialised; the writes themselves target
/// distinct files and run in parallel.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    ids: IdGenerator,
}

impl FileStore {
    #[must_use]
    pub fn builder() -> FileStoreBuilder {
        FileStoreBuilder::default()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate a store path
    ///
    /// Rejects paths inside system directories. Relative paths are resolved
    /// against the current directory.
    fn validate_path(path: &Path) -> Result<PathBuf> {
        if path.as_os_str().is_empty() {
            return Err(SpoolError::InvalidPath("Spool path must not be empty".into()));
        }

        let path = std::path::absolute(path)?;

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        for prefix in &sensitive_prefixes {
            if path.starts_with(prefix) {
                return Err(SpoolError::InvalidPath(format!(
                    "Spool path cannot be in system directory {prefix}: {}",
                    path.display()
                )));
            }
        }

        Ok(path)
    }

    /// Create the store directory if needed and clear crash leftovers.
    ///
    /// # Errors
    /// - If the directory cannot be created
    /// - If the path exists but is not a directory
    pub fn init(&self) -> Result<()> {
        internal!("Initialising disk store at {}", self.path.display());

        if !self.path.try_exists()? {
            internal!("{} does not exist, creating...", self.path.display());
            fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(SpoolError::InvalidPath(format!(
                "Expected {} to be a directory, but it is not",
                self.path.display()
            )));
        }

        self.cleanup_leftovers()
    }

    /// Remove `.deleted` files and stale temporary writes.
    fn cleanup_leftovers(&self) -> Result<()> {
        let mut cleaned = 0;

        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if filename.ends_with(DELETED_SUFFIX) || filename.starts_with(TEMP_PREFIX) {
                fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} leftover files in {}",
                self.path.display()
            );
        }

        Ok(())
    }

    fn record_path(&self, id: &RecordId) -> PathBuf {
        self.path.join(id.filename())
    }
}

impl DiskStore for FileStore {
    fn append(&self, item: &LogItem) -> Result<RecordId> {
        let id = self.ids.next()?;
        let filename = id.filename();

        let final_path = self.path.join(&filename);
        let temp_path = self.path.join(format!("{TEMP_PREFIX}{filename}"));

        let encoded = serde_json::to_vec(item)?;

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(&encoded)?;
            file.sync_data()?;
            fs::rename(&temp_path, &final_path)
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        internal!(
            level = DEBUG,
            "Persisted item {} as {id} ({} attempts)",
            item.id,
            item.attempts
        );

        Ok(id)
    }

    fn list(&self) -> Result<Vec<RecordId>> {
        let mut ids = Vec::new();

        for entry in fs::read_dir(&self.path)? {
            let filename = entry?.file_name();
            let filename = filename.to_string_lossy();

            if filename.ends_with(RECORD_EXTENSION)
                && let Some(id) = RecordId::from_filename(&filename)
            {
                ids.push(id);
            }
        }

        ids.sort_unstable();
        Ok(ids)
    }

    fn read(&self, id: &RecordId) -> Result<LogItem> {
        let contents = match fs::read(self.record_path(id)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SpoolError::NotFound(*id));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_slice(&contents)?)
    }

    fn remove(&self, id: &RecordId) -> Result<()> {
        let path = self.record_path(id);
        let deleted = self.path.join(format!("{}{DELETED_SUFFIX}", id.filename()));

        match fs::rename(&path, &deleted) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SpoolError::NotFound(*id));
            }
            Err(e) => return Err(e.into()),
        }

        fs::remove_file(&deleted)?;
        internal!(level = DEBUG, "Removed record {id} from disk store");

        Ok(())
    }
}

/// Builder for [`FileStore`]
#[derive(Debug, Default)]
pub struct FileStoreBuilder {
    path: PathBuf,
}

impl FileStoreBuilder {
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Validate the path and initialise the directory.
    ///
    /// # Errors
    /// Returns an error if the path is unusable or the directory cannot be
    /// prepared.
    pub fn build(self) -> Result<FileStore> {
        let store = FileStore {
            path: FileStore::validate_path(&self.path)?,
            ids: IdGenerator::default(),
        };
        store.init()?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use nadhi_common::EvaluatedRecord;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_rejects_system_paths() {
        assert!(matches!(
            FileStore::builder().path("/etc/nadhi").build(),
            Err(SpoolError::InvalidPath(_))
        ));
        assert!(matches!(
            FileStore::builder().build(),
            Err(SpoolError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_init_cleans_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let stale_temp = dir.path().join(".tmp_01ARZ3NDEKTSV4RRFFQ69G5FAV.json");
        let stale_deleted = dir.path().join("01ARZ3NDEKTSV4RRFFQ69G5FAV.json.deleted");
        fs::write(&stale_temp, b"{}").unwrap();
        fs::write(&stale_deleted, b"{}").unwrap();

        let store = FileStore::builder().path(dir.path()).build().unwrap();

        assert!(!stale_temp.exists());
        assert!(!stale_deleted.exists());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::builder().path(dir.path()).build().unwrap();

        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::write(dir.path().join("not-a-ulid.json"), b"{}").unwrap();

        let item = LogItem::new(EvaluatedRecord::new(json!({"message": "m"}), ["p"]));
        let id = store.append(&item).unwrap();

        assert_eq!(store.list().unwrap(), vec![id]);
    }

    #[test]
    fn test_rejects_non_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"").unwrap();

        assert!(matches!(
            FileStore::builder().path(&file).build(),
            Err(SpoolError::InvalidPath(_))
        ));
    }
}
