use common::CursorRole;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

#[cfg_attr(not(windows), allow(dead_code))]
pub const PERSONALIZE_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Themes\Personalize";
#[cfg_attr(not(windows), allow(dead_code))]
pub const CURSORS_KEY: &str = r"Control Panel\Cursors";

/// Persisted light/dark switches under the personalization key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThemeFlag {
    AppsUseLightTheme,
    SystemUsesLightTheme,
}

impl ThemeFlag {
    pub const ALL: [ThemeFlag; 2] = [ThemeFlag::AppsUseLightTheme, ThemeFlag::SystemUsesLightTheme];

    pub fn value_name(self) -> &'static str {
        match self {
            ThemeFlag::AppsUseLightTheme => "AppsUseLightTheme",
            ThemeFlag::SystemUsesLightTheme => "SystemUsesLightTheme",
        }
    }
}

impl fmt::Display for ThemeFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value_name())
    }
}

/// Cursor paths such as `%SystemRoot%\cursors\aero_arrow.cur` are stored as
/// `REG_EXPAND_SZ` by the shell; writing them back as `REG_SZ` would break
/// the variable lookup.
#[cfg_attr(not(windows), allow(dead_code))]
pub fn needs_expansion(path: &str) -> bool {
    path.contains('%')
}

/// NUL-terminated UTF-16LE, the registry's string encoding.
#[cfg_attr(not(windows), allow(dead_code))]
pub fn reg_string_bytes(value: &str) -> Vec<u8> {
    value.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open {key}: {source}")]
    Open {
        key: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {name}: {source}")]
    Read {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {name}: {source}")]
    Write {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("cursor reload broadcast failed: {0}")]
    Broadcast(String),
}

pub trait ThemeStore: Send + Sync {
    fn read_flag(&self, flag: ThemeFlag) -> Result<Option<u32>, StoreError>;
    fn write_flag(&self, flag: ThemeFlag, value: u32) -> Result<(), StoreError>;
}

pub trait CursorStore: Send + Sync {
    /// `Ok(None)` when the role has no value set.
    fn read_cursor(&self, role: CursorRole) -> Result<Option<String>, StoreError>;
    fn write_cursor(&self, role: CursorRole, path: &str) -> Result<(), StoreError>;
    /// Ask the shell to reload the cursor scheme.
    fn reload_cursors(&self) -> Result<(), StoreError>;
}

/// In-process stand-in for the registry, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    flags: Mutex<HashMap<ThemeFlag, u32>>,
    cursors: Mutex<HashMap<CursorRole, String>>,
    reloads: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_cursors<I, S>(cursors: I) -> Self
    where
        I: IntoIterator<Item = (CursorRole, S)>,
        S: Into<String>,
    {
        let store = Self::new();
        if let Ok(mut map) = store.cursors.lock() {
            map.extend(cursors.into_iter().map(|(role, path)| (role, path.into())));
        }
        store
    }

    pub fn flag(&self, flag: ThemeFlag) -> Option<u32> {
        self.flags.lock().ok()?.get(&flag).copied()
    }

    pub fn cursor(&self, role: CursorRole) -> Option<String> {
        self.cursors.lock().ok()?.get(&role).cloned()
    }

    pub fn clear_cursors(&self) {
        if let Ok(mut map) = self.cursors.lock() {
            map.clear();
        }
    }

    pub fn reload_count(&self) -> u64 {
        self.reloads.lock().map(|n| *n).unwrap_or(0)
    }
}

fn poisoned(name: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("{} lock poisoned", name))
}

impl ThemeStore for MemoryStore {
    fn read_flag(&self, flag: ThemeFlag) -> Result<Option<u32>, StoreError> {
        let flags = self.flags.lock()
            .map_err(|_| StoreError::Read { name: flag.value_name(), source: poisoned("flags") })?;
        Ok(flags.get(&flag).copied())
    }

    fn write_flag(&self, flag: ThemeFlag, value: u32) -> Result<(), StoreError> {
        let mut flags = self.flags.lock()
            .map_err(|_| StoreError::Write { name: flag.value_name(), source: poisoned("flags") })?;
        flags.insert(flag, value);
        Ok(())
    }
}

impl CursorStore for MemoryStore {
    fn read_cursor(&self, role: CursorRole) -> Result<Option<String>, StoreError> {
        let cursors = self.cursors.lock()
            .map_err(|_| StoreError::Read { name: role.value_name(), source: poisoned("cursors") })?;
        Ok(cursors.get(&role).cloned())
    }

    fn write_cursor(&self, role: CursorRole, path: &str) -> Result<(), StoreError> {
        let mut cursors = self.cursors.lock()
            .map_err(|_| StoreError::Write { name: role.value_name(), source: poisoned("cursors") })?;
        cursors.insert(role, path.to_string());
        Ok(())
    }

    fn reload_cursors(&self) -> Result<(), StoreError> {
        let mut reloads = self.reloads.lock()
            .map_err(|_| StoreError::Broadcast("reload counter lock poisoned".to_string()))?;
        *reloads += 1;
        Ok(())
    }
}

#[cfg(windows)]
pub use registry::RegistryStore;

#[cfg(windows)]
mod registry {
    use super::*;
    use windows::Win32::UI::WindowsAndMessaging::{
        SystemParametersInfoW, SPI_SETCURSORS, SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS,
    };
    use winreg::enums::{RegType, HKEY_CURRENT_USER, KEY_QUERY_VALUE, KEY_SET_VALUE};
    use winreg::{RegKey, RegValue};

    /// `HKEY_CURRENT_USER` backed settings.
    pub struct RegistryStore {
        hkcu: RegKey,
    }

    impl RegistryStore {
        pub fn new() -> Self {
            Self { hkcu: RegKey::predef(HKEY_CURRENT_USER) }
        }

        fn open(&self, key: &'static str, access: u32) -> Result<RegKey, StoreError> {
            self.hkcu.open_subkey_with_flags(key, access)
                .map_err(|source| StoreError::Open { key, source })
        }
    }

    impl ThemeStore for RegistryStore {
        fn read_flag(&self, flag: ThemeFlag) -> Result<Option<u32>, StoreError> {
            let key = self.open(PERSONALIZE_KEY, KEY_QUERY_VALUE)?;
            match key.get_value::<u32, _>(flag.value_name()) {
                Ok(v) => Ok(Some(v)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(source) => Err(StoreError::Read { name: flag.value_name(), source }),
            }
        }

        fn write_flag(&self, flag: ThemeFlag, value: u32) -> Result<(), StoreError> {
            let key = self.open(PERSONALIZE_KEY, KEY_SET_VALUE)?;
            key.set_value(flag.value_name(), &value)
                .map_err(|source| StoreError::Write { name: flag.value_name(), source })
        }
    }

    impl CursorStore for RegistryStore {
        fn read_cursor(&self, role: CursorRole) -> Result<Option<String>, StoreError> {
            let key = self.open(CURSORS_KEY, KEY_QUERY_VALUE)?;
            match key.get_value::<String, _>(role.value_name()) {
                Ok(v) => Ok(Some(v)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(source) => Err(StoreError::Read { name: role.value_name(), source }),
            }
        }

        fn write_cursor(&self, role: CursorRole, path: &str) -> Result<(), StoreError> {
            let key = self.open(CURSORS_KEY, KEY_SET_VALUE)?;
            let vtype = if needs_expansion(path) { RegType::REG_EXPAND_SZ } else { RegType::REG_SZ };
            let value = RegValue { bytes: reg_string_bytes(path), vtype };
            key.set_raw_value(role.value_name(), &value)
                .map_err(|source| StoreError::Write { name: role.value_name(), source })
        }

        fn reload_cursors(&self) -> Result<(), StoreError> {
            unsafe {
                SystemParametersInfoW(SPI_SETCURSORS, 0, None, SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0))
            }
            .map_err(|e| StoreError::Broadcast(format!("{e:?}")))
        }
    }
}
