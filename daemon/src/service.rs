use std::fmt;
use std::future::Future;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use crate::scheduler::Cancellation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    StartPending,
    Running,
    StopPending,
    Stopped,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceStatus::StartPending => "start pending",
            ServiceStatus::Running => "running",
            ServiceStatus::StopPending => "stop pending",
            ServiceStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Control requests from the host's service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Stop,
    Shutdown,
    Interrogate,
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    /// Hand control back to the host, which finalizes `Stopped`.
    Exit,
}

/// Where status changes are announced.
pub trait StatusReporter {
    fn report(&mut self, status: ServiceStatus) -> anyhow::Result<()>;
}

/// Reporter for console runs: status goes to the log.
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report(&mut self, status: ServiceStatus) -> anyhow::Result<()> {
        log::info!("Service status: {}", status);
        Ok(())
    }
}

/// StartPending -> Running -> StopPending -> Stopped, with Interrogate as a
/// self-loop. There is no way back to Running; a restart is a new instance.
pub struct ServiceController<R: StatusReporter> {
    status: ServiceStatus,
    reporter: R,
    cancel: Option<watch::Sender<bool>>,
}

impl<R: StatusReporter> ServiceController<R> {
    pub fn new(reporter: R) -> Self {
        Self {
            status: ServiceStatus::Stopped,
            reporter,
            cancel: None,
        }
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    fn emit(&mut self, status: ServiceStatus) {
        self.status = status;
        if let Err(e) = self.reporter.report(status) {
            log::error!("Failed to report service status {}: {:#}", status, e);
        }
    }

    /// Emits StartPending, spawns the daemon, emits Running once it is
    /// dispatched. Does not wait for the daemon's first tick.
    pub fn launch<F, Fut>(&mut self, runtime: &Handle, daemon: F) -> JoinHandle<()>
    where
        F: FnOnce(Cancellation) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.emit(ServiceStatus::StartPending);
        let (tx, cancel) = Cancellation::channel();
        self.cancel = Some(tx);
        let handle = runtime.spawn(daemon(cancel));
        self.emit(ServiceStatus::Running);
        handle
    }

    pub fn handle_control(&mut self, event: ControlEvent) -> ControlFlow {
        match event {
            ControlEvent::Interrogate => {
                let current = self.status;
                self.emit(current);
                ControlFlow::Continue
            }
            ControlEvent::Stop | ControlEvent::Shutdown => {
                if let Some(cancel) = self.cancel.take() {
                    let _ = cancel.send(true);
                }
                self.emit(ServiceStatus::StopPending);
                ControlFlow::Exit
            }
            ControlEvent::Other(code) => {
                log::warn!("unexpected control request #{}", code);
                ControlFlow::Continue
            }
        }
    }

    /// Called by the host once the control path has returned.
    pub fn finish(&mut self) {
        self.emit(ServiceStatus::Stopped);
    }
}
