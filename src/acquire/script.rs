use rusqlite::Connection;
use rusqlite::limits::Limit;
use std::path::Path;
use tracing::debug;

use crate::acquire::{AcquireError, Materializer};

/// Builds a database by running an uploaded `.sql` script against it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptMaterializer;

impl Materializer for ScriptMaterializer {
    fn materialize(&self, bytes: &[u8], target: &Path) -> Result<(), AcquireError> {
        let script = std::str::from_utf8(bytes)
            .map_err(|e| AcquireError::ProcessScript(e.to_string()))?;

        let conn = Connection::open(target).map_err(|e| AcquireError::ProcessScript(e.to_string()))?;
        // Scripts may only build the database they were uploaded as
        conn.set_limit(Limit::SQLITE_LIMIT_ATTACHED, 0);
        conn.execute_batch(script)
            .map_err(|e| AcquireError::ProcessScript(e.to_string()))?;

        debug!("Applied {} byte SQL script to {}", bytes.len(), target.display());
        Ok(())
    }
}
