#![cfg_attr(not(windows), allow(dead_code))]

/// Slack per dimension for borderless windows that are a few pixels short.
pub const TOLERANCE: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// A window counts as full-screen when both its width and height reach the
/// monitor's, less `tolerance`.
pub fn covers_monitor(window: Bounds, monitor: Bounds, tolerance: i32) -> bool {
    window.width() >= monitor.width() - tolerance
        && window.height() >= monitor.height() - tolerance
}

pub trait FullScreenDetector: Send + Sync {
    /// Best effort. Any lookup failure answers `false`.
    fn is_full_screen_active(&self) -> bool;
}

/// Used where there is no foreground window to inspect.
pub struct NeverFullScreen;

impl FullScreenDetector for NeverFullScreen {
    fn is_full_screen_active(&self) -> bool {
        false
    }
}

#[cfg(windows)]
pub use foreground::ForegroundWindowDetector;

#[cfg(windows)]
mod foreground {
    use super::*;
    use std::mem;
    use windows::Win32::Foundation::{HWND, RECT};
    use windows::Win32::Graphics::Gdi::{GetMonitorInfoW, MonitorFromWindow, MONITORINFO, MONITOR_DEFAULTTONULL};
    use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowRect};

    /// Compares the foreground window against the monitor it sits on.
    pub struct ForegroundWindowDetector {
        tolerance: i32,
    }

    impl ForegroundWindowDetector {
        pub fn new() -> Self {
            Self { tolerance: TOLERANCE }
        }
    }

    impl From<RECT> for Bounds {
        fn from(rect: RECT) -> Self {
            Bounds { left: rect.left, top: rect.top, right: rect.right, bottom: rect.bottom }
        }
    }

    fn window_rect(hwnd: HWND) -> Option<Bounds> {
        unsafe {
            let mut rect = RECT::default();
            if GetWindowRect(hwnd, &mut rect).is_ok() {
                Some(rect.into())
            } else {
                None
            }
        }
    }

    fn monitor_rect(hwnd: HWND) -> Option<Bounds> {
        unsafe {
            let monitor = MonitorFromWindow(hwnd, MONITOR_DEFAULTTONULL);
            if monitor.0.is_null() {
                return None;
            }
            let mut info: MONITORINFO = mem::zeroed();
            info.cbSize = mem::size_of::<MONITORINFO>() as u32;
            if GetMonitorInfoW(monitor, &mut info).as_bool() {
                Some(info.rcMonitor.into())
            } else {
                None
            }
        }
    }

    impl FullScreenDetector for ForegroundWindowDetector {
        fn is_full_screen_active(&self) -> bool {
            let hwnd = unsafe { GetForegroundWindow() };
            if hwnd.0.is_null() {
                return false;
            }
            match (window_rect(hwnd), monitor_rect(hwnd)) {
                (Some(window), Some(monitor)) => covers_monitor(window, monitor, self.tolerance),
                _ => false,
            }
        }
    }
}

/// Platform detector for this build.
pub fn system_detector() -> Box<dyn FullScreenDetector> {
    #[cfg(windows)]
    {
        Box::new(ForegroundWindowDetector::new())
    }
    #[cfg(not(windows))]
    {
        Box::new(NeverFullScreen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(left: i32, top: i32, right: i32, bottom: i32) -> Bounds {
        Bounds { left, top, right, bottom }
    }

    #[test]
    fn test_exact_fit_is_full_screen() {
        let monitor = rect(0, 0, 1920, 1080);
        assert!(covers_monitor(monitor, monitor, TOLERANCE));
    }

    #[test]
    fn test_within_tolerance() {
        let monitor = rect(0, 0, 1920, 1080);
        assert!(covers_monitor(rect(0, 0, 1910, 1070), monitor, TOLERANCE));
        assert!(!covers_monitor(rect(0, 0, 1909, 1080), monitor, TOLERANCE));
        assert!(!covers_monitor(rect(0, 0, 1920, 1069), monitor, TOLERANCE));
    }

    #[test]
    fn test_maximized_window_with_taskbar_is_not_full_screen() {
        let monitor = rect(0, 0, 2560, 1440);
        let maximized = rect(-8, -8, 2568, 1400);
        assert!(!covers_monitor(maximized, monitor, TOLERANCE));
    }

    #[test]
    fn test_secondary_monitor_offsets() {
        let monitor = rect(1920, 0, 3840, 1080);
        assert!(covers_monitor(rect(1920, 0, 3840, 1080), monitor, TOLERANCE));
        assert!(!covers_monitor(rect(1920, 0, 2880, 1080), monitor, TOLERANCE));
    }

    #[test]
    fn test_fallback_detector_never_blocks() {
        assert!(!NeverFullScreen.is_full_screen_active());
    }
}
