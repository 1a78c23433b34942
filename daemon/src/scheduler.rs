use chrono::{DateTime, Local};
use common::{DaemonStatus, GeoCoordinate, SolarWindow, ThemeMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use crate::fullscreen::FullScreenDetector;
use crate::providers::{LocationProvider, SolarTimeProvider};
use crate::theme::ThemeSwitcher;

pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Local::now)
}

/// Requests from the control surface. They are handled on the scheduler loop
/// so manual and scheduled switches never overlap.
#[derive(Debug)]
pub enum Command {
    SetOverride {
        mode: ThemeMode,
        reply: oneshot::Sender<Result<(), String>>,
    },
    ClearOverride {
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<DaemonStatus>,
    },
}

/// Level-triggered stop signal. Once fired it stays fired; a dropped sender
/// counts as fired.
#[derive(Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Applied(ThemeMode),
    Postponed(ThemeMode),
    Overridden(ThemeMode),
    SolarUnavailable,
    SwitchFailed(ThemeMode),
}

#[derive(Debug, Default)]
struct DaemonState {
    location: Option<GeoCoordinate>,
    override_mode: Option<ThemeMode>,
    last_applied: Option<ThemeMode>,
    solar_window: Option<SolarWindow>,
    ticks: u64,
    switches: u64,
    postponements: u64,
    failures: u64,
}

pub struct Scheduler {
    locator: Box<dyn LocationProvider>,
    solar: Box<dyn SolarTimeProvider>,
    detector: Box<dyn FullScreenDetector>,
    switcher: ThemeSwitcher,
    clock: Clock,
    tick_interval: Duration,
    state: DaemonState,
}

impl Scheduler {
    pub fn new(
        locator: Box<dyn LocationProvider>,
        solar: Box<dyn SolarTimeProvider>,
        detector: Box<dyn FullScreenDetector>,
        switcher: ThemeSwitcher,
        clock: Clock,
        tick_interval: Duration,
    ) -> Self {
        Self {
            locator,
            solar,
            detector,
            switcher,
            clock,
            tick_interval,
            state: DaemonState::default(),
        }
    }

    /// Resolves the location once, then ticks until `cancel` fires. A failed
    /// location lookup ends the run without entering the loop.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut cancel: Cancellation) {
        if cancel.is_cancelled() {
            return;
        }
        let location = match self.locator.locate().await {
            Ok(location) => location,
            Err(e) => {
                log::error!("Failed to get location: {:#}", e);
                return;
            }
        };
        log::info!("Location detected: {}", location);
        self.state.location = Some(location);
        if let Some(mode) = self.switcher.current_mode() {
            log::info!("Current theme is {}", mode);
        }

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                cmd = commands.recv(), if commands_open => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => commands_open = false,
                },
                _ = interval.tick() => {
                    self.tick(location).await;
                }
            }
        }
        log::info!("Scheduler stopped after {} tick(s)", self.state.ticks);
    }

    /// One scheduling pass, derived from scratch.
    pub async fn tick(&mut self, location: GeoCoordinate) -> TickOutcome {
        self.state.ticks += 1;

        if let Some(mode) = self.state.override_mode {
            log::debug!("Manual override to {} active, skipping scheduled switch", mode);
            return TickOutcome::Overridden(mode);
        }

        let today = (self.clock)().date_naive();
        let window = match self.solar.solar_window(location, today).await {
            Ok(window) => window,
            Err(e) => {
                log::error!("Error getting sunrise/sunset: {:#}", e);
                self.state.failures += 1;
                return TickOutcome::SolarUnavailable;
            }
        };
        self.state.solar_window = Some(window);

        let mode = window.mode_at((self.clock)());

        if self.detector.is_full_screen_active() {
            log::info!("Full-screen app running. Theme change to {} postponed.", mode);
            self.state.postponements += 1;
            return TickOutcome::Postponed(mode);
        }

        match self.switcher.apply(mode).await {
            Ok(()) => {
                if self.state.last_applied != Some(mode) {
                    log::info!("Set theme to {} mode", mode);
                } else {
                    log::debug!("Theme re-applied: {} mode", mode);
                }
                self.state.last_applied = Some(mode);
                self.state.switches += 1;
                TickOutcome::Applied(mode)
            }
            Err(e) => {
                log::error!("Theme setting error: {}", e);
                self.state.failures += 1;
                TickOutcome::SwitchFailed(mode)
            }
        }
    }

    pub async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SetOverride { mode, reply } => {
                let result = self.set_override(mode).await;
                let _ = reply.send(result);
            }
            Command::ClearOverride { reply } => {
                self.clear_override();
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    /// Manual switch. Bypasses the solar decision and the full-screen check,
    /// then holds until cleared.
    async fn set_override(&mut self, mode: ThemeMode) -> Result<(), String> {
        match self.switcher.apply(mode).await {
            Ok(()) => {
                log::info!("Manual override: theme set to {} mode", mode);
                self.state.override_mode = Some(mode);
                self.state.last_applied = Some(mode);
                self.state.switches += 1;
                Ok(())
            }
            Err(e) => {
                log::error!("Manual override to {} failed: {}", mode, e);
                self.state.failures += 1;
                Err(e.to_string())
            }
        }
    }

    fn clear_override(&mut self) {
        if let Some(mode) = self.state.override_mode.take() {
            log::info!("Manual override ({}) cleared, automatic switching resumes", mode);
        }
    }

    pub fn status(&self) -> DaemonStatus {
        let now = (self.clock)();
        DaemonStatus {
            location: self.state.location,
            override_mode: self.state.override_mode,
            last_applied: self.state.last_applied,
            solar_window: self.state.solar_window,
            next_change: self.state.solar_window.and_then(|w| w.next_change_after(now)),
            ticks: self.state.ticks,
            switches: self.state.switches,
            postponements: self.state.postponements,
            failures: self.state.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CursorStore, MemoryStore, ThemeFlag};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use common::CursorRole;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedLocation(Option<GeoCoordinate>);

    #[async_trait]
    impl LocationProvider for FixedLocation {
        async fn locate(&self) -> Result<GeoCoordinate> {
            self.0.ok_or_else(|| anyhow!("network unreachable"))
        }
    }

    struct CountingLocation(Arc<AtomicUsize>);

    #[async_trait]
    impl LocationProvider for CountingLocation {
        async fn locate(&self) -> Result<GeoCoordinate> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(berlin())
        }
    }

    /// Hands out queued answers, then repeats the fallback.
    struct ScriptedSolar {
        queue: Mutex<VecDeque<Option<SolarWindow>>>,
        fallback: SolarWindow,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SolarTimeProvider for ScriptedSolar {
        async fn solar_window(&self, _at: GeoCoordinate, _date: NaiveDate) -> Result<SolarWindow> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.queue.lock().unwrap().pop_front() {
                Some(Some(window)) => Ok(window),
                Some(None) => Err(anyhow!("HTTP 503")),
                None => Ok(self.fallback),
            }
        }
    }

    struct SwitchableDetector(Arc<AtomicBool>);

    impl FullScreenDetector for SwitchableDetector {
        fn is_full_screen_active(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn window() -> SolarWindow {
        SolarWindow {
            sunrise: Local.with_ymd_and_hms(2024, 3, 20, 6, 10, 0).unwrap(),
            sunset: Local.with_ymd_and_hms(2024, 3, 20, 18, 20, 0).unwrap(),
        }
    }

    fn berlin() -> GeoCoordinate {
        GeoCoordinate { latitude: 52.52, longitude: 13.40 }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        full_screen: Arc<AtomicBool>,
        solar_calls: Arc<AtomicUsize>,
    }

    fn scheduler_at(
        now: DateTime<Local>,
        script: Vec<Option<SolarWindow>>,
        location: Option<GeoCoordinate>,
    ) -> (Scheduler, Harness) {
        let store = Arc::new(MemoryStore::new());
        let full_screen = Arc::new(AtomicBool::new(false));
        let solar_calls = Arc::new(AtomicUsize::new(0));
        let switcher = ThemeSwitcher::new(store.clone(), store.clone(), Duration::from_millis(500));
        let scheduler = Scheduler::new(
            Box::new(FixedLocation(location)),
            Box::new(ScriptedSolar {
                queue: Mutex::new(script.into()),
                fallback: window(),
                calls: solar_calls.clone(),
            }),
            Box::new(SwitchableDetector(full_screen.clone())),
            switcher,
            Arc::new(move || now),
            Duration::from_secs(60),
        );
        (scheduler, Harness { store, full_screen, solar_calls })
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_applies_light_during_day() {
        let noon = Local.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let (mut scheduler, h) = scheduler_at(noon, vec![], Some(berlin()));

        assert_eq!(scheduler.tick(berlin()).await, TickOutcome::Applied(ThemeMode::Light));
        assert_eq!(h.store.flag(ThemeFlag::AppsUseLightTheme), Some(1));
        assert_eq!(h.store.flag(ThemeFlag::SystemUsesLightTheme), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_applies_dark_after_midnight() {
        let late = Local.with_ymd_and_hms(2024, 3, 20, 23, 59, 0).unwrap();
        let (mut scheduler, h) = scheduler_at(late, vec![], Some(berlin()));

        assert_eq!(scheduler.tick(berlin()).await, TickOutcome::Applied(ThemeMode::Dark));
        assert_eq!(h.store.flag(ThemeFlag::AppsUseLightTheme), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_screen_postpones_switch() {
        let before_sunrise = window().sunrise - chrono::Duration::minutes(1);
        let (mut scheduler, h) = scheduler_at(before_sunrise, vec![], Some(berlin()));
        h.full_screen.store(true, Ordering::SeqCst);

        assert_eq!(scheduler.tick(berlin()).await, TickOutcome::Postponed(ThemeMode::Dark));
        assert_eq!(h.store.flag(ThemeFlag::AppsUseLightTheme), None);
        assert_eq!(h.store.reload_count(), 0);

        // Nothing queued: the next tick decides again from scratch
        h.full_screen.store(false, Ordering::SeqCst);
        assert_eq!(scheduler.tick(berlin()).await, TickOutcome::Applied(ThemeMode::Dark));
        assert_eq!(scheduler.status().postponements, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_solar_failure_recovers_next_tick() {
        let noon = Local.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let (mut scheduler, h) = scheduler_at(noon, vec![None], Some(berlin()));

        assert_eq!(scheduler.tick(berlin()).await, TickOutcome::SolarUnavailable);
        assert_eq!(h.store.flag(ThemeFlag::AppsUseLightTheme), None);

        assert_eq!(scheduler.tick(berlin()).await, TickOutcome::Applied(ThemeMode::Light));
        let status = scheduler.status();
        assert_eq!(status.ticks, 2);
        assert_eq!(status.failures, 1);
        assert_eq!(status.switches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_holds_until_cleared() {
        let noon = Local.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let (mut scheduler, h) = scheduler_at(noon, vec![], Some(berlin()));
        h.store.write_cursor(CursorRole::Arrow, r"C:\cur\a.cur").unwrap();

        let (tx, rx) = oneshot::channel();
        scheduler.handle_command(Command::SetOverride { mode: ThemeMode::Dark, reply: tx }).await;
        assert_eq!(rx.await.unwrap(), Ok(()));
        assert_eq!(h.store.flag(ThemeFlag::SystemUsesLightTheme), Some(0));

        assert_eq!(scheduler.tick(berlin()).await, TickOutcome::Overridden(ThemeMode::Dark));
        assert_eq!(h.store.flag(ThemeFlag::SystemUsesLightTheme), Some(0));
        assert_eq!(h.solar_calls.load(Ordering::SeqCst), 0);

        let (tx, rx) = oneshot::channel();
        scheduler.handle_command(Command::ClearOverride { reply: tx }).await;
        rx.await.unwrap();

        assert_eq!(scheduler.tick(berlin()).await, TickOutcome::Applied(ThemeMode::Light));
        assert_eq!(h.store.cursor(CursorRole::Arrow).as_deref(), Some(r"C:\cur\a.cur"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_next_change() {
        let noon = Local.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let (mut scheduler, _h) = scheduler_at(noon, vec![], Some(berlin()));
        scheduler.tick(berlin()).await;

        let (tx, rx) = oneshot::channel();
        scheduler.handle_command(Command::Status { reply: tx }).await;
        let status = rx.await.unwrap();
        assert_eq!(status.solar_window, Some(window()));
        assert_eq!(status.next_change, Some(window().sunset));
        assert_eq!(status.last_applied, Some(ThemeMode::Light));
        assert_eq!(status.override_mode, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_failure_ends_run() {
        let noon = Local.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let (scheduler, h) = scheduler_at(noon, vec![], None);
        let (_tx, cancel) = Cancellation::channel();
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);

        // Returns on its own; no cancellation needed
        scheduler.run(cmd_rx, cancel).await;
        assert_eq!(h.solar_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.flag(ThemeFlag::AppsUseLightTheme), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait_stops_loop() {
        let noon = Local.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let (scheduler, h) = scheduler_at(noon, vec![], Some(berlin()));
        let (cancel_tx, cancel) = Cancellation::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let handle = tokio::spawn(scheduler.run(cmd_rx, cancel));

        // First tick fires immediately
        tokio::time::sleep(Duration::from_secs(1)).await;
        let (tx, rx) = oneshot::channel();
        cmd_tx.send(Command::Status { reply: tx }).await.unwrap();
        assert_eq!(rx.await.unwrap().ticks, 1);

        // Halfway through the wait for the next tick
        tokio::time::sleep(Duration::from_secs(30)).await;
        cancel_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(h.solar_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.reload_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_follow_interval() {
        let noon = Local.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let (scheduler, h) = scheduler_at(noon, vec![], Some(berlin()));
        let (cancel_tx, cancel) = Cancellation::channel();
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let handle = tokio::spawn(scheduler.run(cmd_rx, cancel));

        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel_tx.send(true).unwrap();
        handle.await.unwrap();

        // t=0, t=60, t=120
        assert_eq!(h.solar_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dropped_sender_counts_as_cancelled() {
        let (tx, mut cancel) = Cancellation::channel();
        drop(tx);
        assert!(cancel.is_cancelled());
        cancel.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_after_sender_dropped_skips_location() {
        let noon = Local.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let located = Arc::new(AtomicUsize::new(0));
        let (mut scheduler, h) = scheduler_at(noon, vec![], Some(berlin()));
        scheduler.locator = Box::new(CountingLocation(located.clone()));
        let (tx, cancel) = Cancellation::channel();
        drop(tx);
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);

        scheduler.run(cmd_rx, cancel).await;
        assert_eq!(located.load(Ordering::SeqCst), 0);
        assert_eq!(h.solar_calls.load(Ordering::SeqCst), 0);
    }
}
