use std::fs;
use std::path::Path;

use crate::acquire::{AcquireError, Materializer};

/// Copies an uploaded SQLite file byte for byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct DbFileMaterializer;

impl Materializer for DbFileMaterializer {
    fn materialize(&self, bytes: &[u8], target: &Path) -> Result<(), AcquireError> {
        fs::write(target, bytes).map_err(AcquireError::SaveDbFile)
    }
}
