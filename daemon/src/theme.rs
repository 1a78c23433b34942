use common::ThemeMode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use crate::cursors::CursorSnapshot;
use crate::store::{CursorStore, StoreError, ThemeFlag, ThemeStore};

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("could not snapshot cursors, theme left unchanged: {0}")]
    Snapshot(#[source] StoreError),
    #[error("failed to write {flag}: {source}")]
    WriteFlag {
        flag: ThemeFlag,
        #[source]
        source: StoreError,
    },
    #[error("cursor restore failed: {0}")]
    Reload(#[source] StoreError),
}

/// Flips the personalization flags while keeping the user's cursor scheme.
///
/// Order matters: snapshot cursors, write both flags, wait for the shell to
/// react, then put the cursors back. Changing the flags can make Windows reset
/// cursor associations asynchronously, hence the settle delay before restoring.
#[derive(Clone)]
pub struct ThemeSwitcher {
    theme: Arc<dyn ThemeStore>,
    cursors: Arc<dyn CursorStore>,
    settle_delay: Duration,
}

impl ThemeSwitcher {
    pub fn new(theme: Arc<dyn ThemeStore>, cursors: Arc<dyn CursorStore>, settle_delay: Duration) -> Self {
        Self { theme, cursors, settle_delay }
    }

    /// Runs the full sequence even when `mode` is already active.
    pub async fn apply(&self, mode: ThemeMode) -> Result<(), SwitchError> {
        let snapshot = CursorSnapshot::capture(self.cursors.as_ref()).map_err(SwitchError::Snapshot)?;
        log::debug!("Captured {} cursor(s) before switching to {}", snapshot.len(), mode);

        // A failure on the second flag leaves the first one written.
        let value = mode.flag_value();
        for flag in ThemeFlag::ALL {
            self.theme.write_flag(flag, value)
                .map_err(|source| SwitchError::WriteFlag { flag, source })?;
        }

        tokio::time::sleep(self.settle_delay).await;

        let failed = snapshot.restore(self.cursors.as_ref()).map_err(SwitchError::Reload)?;
        if !failed.is_empty() {
            log::warn!("{} cursor(s) could not be restored after switching to {}", failed.len(), mode);
        }
        Ok(())
    }

    /// Mode as currently persisted, judged by the apps flag.
    pub fn current_mode(&self) -> Option<ThemeMode> {
        match self.theme.read_flag(ThemeFlag::AppsUseLightTheme) {
            Ok(value) => value.map(ThemeMode::from_flag_value),
            Err(e) => {
                log::warn!("Could not read current theme: {}", e);
                None
            }
        }
    }
}
