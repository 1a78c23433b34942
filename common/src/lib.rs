pub mod cursor;
pub mod ipc;
pub mod theme;

pub use cursor::CursorRole;
pub use ipc::{DaemonStatus, Request, Response};
pub use theme::{GeoCoordinate, SolarWindow, ThemeMode};

use std::path::PathBuf;

pub const SERVICE_NAME: &str = "AutoTheme";
pub const SERVICE_DISPLAY_NAME: &str = "Dark Mode Theme Autochanger";
pub const SERVICE_DESCRIPTION: &str =
    "Automatically changes Windows theme between light and dark mode based on sunrise/sunset";

/// Loopback address the daemon accepts control requests on.
pub const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:47613";

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const LOG_FILE_NAME: &str = "autotheme.log";

/// Machine-wide data directory: `%ProgramData%\AutoTheme` on Windows,
/// `/var/lib/autotheme` elsewhere.
pub fn data_dir() -> PathBuf {
    if cfg!(windows) {
        std::env::var_os("ProgramData")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"))
            .join(SERVICE_NAME)
    } else {
        PathBuf::from("/var/lib/autotheme")
    }
}

pub fn default_config_path() -> PathBuf {
    data_dir().join(CONFIG_FILE_NAME)
}

pub fn default_log_file() -> PathBuf {
    data_dir().join(LOG_FILE_NAME)
}
