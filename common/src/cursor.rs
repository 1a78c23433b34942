use serde::{Deserialize, Serialize};
use std::fmt;

/// Named slots of the cursor scheme under `HKCU\Control Panel\Cursors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CursorRole {
    Arrow,
    Hand,
    Help,
    IBeam,
    Wait,
    Cross,
    Crosshair,
    NWPen,
    No,
    SizeNS,
    SizeWE,
    SizeNWSE,
    SizeNESW,
    SizeAll,
    UpArrow,
    AppStarting,
}

impl CursorRole {
    pub const ALL: [CursorRole; 16] = [
        CursorRole::Arrow,
        CursorRole::Hand,
        CursorRole::Help,
        CursorRole::IBeam,
        CursorRole::Wait,
        CursorRole::Cross,
        CursorRole::Crosshair,
        CursorRole::NWPen,
        CursorRole::No,
        CursorRole::SizeNS,
        CursorRole::SizeWE,
        CursorRole::SizeNWSE,
        CursorRole::SizeNESW,
        CursorRole::SizeAll,
        CursorRole::UpArrow,
        CursorRole::AppStarting,
    ];

    /// Registry value name for this role.
    pub fn value_name(self) -> &'static str {
        match self {
            CursorRole::Arrow => "Arrow",
            CursorRole::Hand => "Hand",
            CursorRole::Help => "Help",
            CursorRole::IBeam => "IBeam",
            CursorRole::Wait => "Wait",
            CursorRole::Cross => "Cross",
            CursorRole::Crosshair => "Crosshair",
            CursorRole::NWPen => "NWPen",
            CursorRole::No => "No",
            CursorRole::SizeNS => "SizeNS",
            CursorRole::SizeWE => "SizeWE",
            CursorRole::SizeNWSE => "SizeNWSE",
            CursorRole::SizeNESW => "SizeNESW",
            CursorRole::SizeAll => "SizeAll",
            CursorRole::UpArrow => "UpArrow",
            CursorRole::AppStarting => "AppStarting",
        }
    }
}

impl fmt::Display for CursorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value_name())
    }
}
