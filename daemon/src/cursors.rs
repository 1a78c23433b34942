use common::CursorRole;
use std::collections::BTreeMap;
use crate::store::{CursorStore, StoreError};

/// Cursor paths captured right before a theme change. Only roles that had a
/// value are recorded, so a restore never invents a value the user did not set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorSnapshot {
    cursors: BTreeMap<CursorRole, String>,
}

impl CursorSnapshot {
    pub fn capture(store: &dyn CursorStore) -> Result<Self, StoreError> {
        let mut cursors = BTreeMap::new();
        for role in CursorRole::ALL {
            if let Some(path) = store.read_cursor(role)? {
                cursors.insert(role, path);
            }
        }
        Ok(Self { cursors })
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    #[cfg(test)]
    pub fn get(&self, role: CursorRole) -> Option<&str> {
        self.cursors.get(&role).map(String::as_str)
    }

    /// Writes back every captured role, then broadcasts a cursor reload.
    /// Returns the roles that could not be written; those are logged and
    /// skipped rather than stopping the rest.
    pub fn restore(self, store: &dyn CursorStore) -> Result<Vec<CursorRole>, StoreError> {
        let mut failed = Vec::new();
        for (role, path) in &self.cursors {
            if let Err(e) = store.write_cursor(*role, path) {
                log::error!("Error setting cursor {}: {}", role, e);
                failed.push(*role);
            }
        }
        store.reload_cursors()?;
        Ok(failed)
    }
}
