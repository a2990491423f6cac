use parking_lot::Mutex;

pub const RECORD_EXTENSION: &str = ".json";

/// Identifier of a record in a disk store
///
/// A ULID drawn from a monotonic generator, so identifiers sort in the
/// order records were appended even within the same millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    id: ulid::Ulid,
}

impl RecordId {
    /// Parse a record ID from a filename like `01ARZ3NDEKTSV4RRFFQ69G5FAV.json`
    ///
    /// Rejects anything containing path separators or traversal patterns.
    #[must_use]
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return None;
        }

        let stem = filename.strip_suffix(RECORD_EXTENSION)?;
        let id = ulid::Ulid::from_string(stem).ok()?;

        Some(Self { id })
    }

    #[must_use]
    pub fn filename(&self) -> String {
        format!("{}{RECORD_EXTENSION}", self.id)
    }

    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Hands out strictly increasing [`RecordId`]s.
pub(crate) struct IdGenerator {
    inner: Mutex<ulid::Generator>,
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            inner: Mutex::new(ulid::Generator::new()),
        }
    }
}

impl IdGenerator {
    pub(crate) fn next(&self) -> crate::Result<RecordId> {
        self.inner
            .lock()
            .generate()
            .map(|id| RecordId { id })
            .map_err(|e| crate::SpoolError::Internal(format!("Unable to generate record id: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_validation() {
        assert!(RecordId::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.json").is_some());

        assert!(RecordId::from_filename("../etc/passwd.json").is_none());
        assert!(RecordId::from_filename("foo/bar.json").is_none());
        assert!(RecordId::from_filename("..\\windows\\system32.json").is_none());

        assert!(RecordId::from_filename("not_a_valid_ulid.json").is_none());
        assert!(RecordId::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.bin").is_none());
        assert!(RecordId::from_filename(".tmp_01ARZ3NDEKTSV4RRFFQ69G5FAV.json").is_none());
    }

    #[test]
    fn test_filename_round_trip() {
        let id = IdGenerator::default().next().unwrap();
        assert_eq!(RecordId::from_filename(&id.filename()), Some(id));
    }

    #[test]
    fn test_generator_is_monotonic() {
        let generator = IdGenerator::default();
        let ids: Vec<_> = (0..1000).map(|_| generator.next().unwrap()).collect();

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
