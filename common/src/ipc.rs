use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use crate::theme::{GeoCoordinate, SolarWindow, ThemeMode};

#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    /// Apply a mode now and hold it until cleared.
    SetOverride(ThemeMode),
    /// Drop the manual override and go back to sunrise/sunset scheduling.
    ClearOverride,
    Status,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Error(String),
    Status(DaemonStatus),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub location: Option<GeoCoordinate>,
    pub override_mode: Option<ThemeMode>,
    pub last_applied: Option<ThemeMode>,
    pub solar_window: Option<SolarWindow>,
    pub next_change: Option<DateTime<Local>>,
    pub ticks: u64,
    pub switches: u64,
    pub postponements: u64,
    pub failures: u64,
}
