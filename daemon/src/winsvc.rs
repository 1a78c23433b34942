//! Service control manager glue. The SCM calls into `service_main` on a
//! thread of its own and delivers control codes to `control_handler`; both
//! funnel into a `ServiceController`.

use anyhow::{anyhow, Context, Result};
use std::ffi::c_void;
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{ERROR_CALL_NOT_IMPLEMENTED, NO_ERROR};
use windows::Win32::System::Services::{
    RegisterServiceCtrlHandlerExW, SetServiceStatus, StartServiceCtrlDispatcherW,
    SERVICE_ACCEPT_SHUTDOWN, SERVICE_ACCEPT_STOP, SERVICE_CONTROL_INTERROGATE,
    SERVICE_CONTROL_SHUTDOWN, SERVICE_CONTROL_STOP, SERVICE_RUNNING, SERVICE_START_PENDING,
    SERVICE_STATUS, SERVICE_STATUS_HANDLE, SERVICE_STOPPED, SERVICE_STOP_PENDING,
    SERVICE_TABLE_ENTRYW, SERVICE_WIN32_OWN_PROCESS,
};
use crate::config::Config;
use crate::service::{ControlEvent, ControlFlow, ServiceController, ServiceStatus, StatusReporter};

/// Longest wait for an in-flight tick before reporting Stopped.
const STOP_GRACE: Duration = Duration::from_secs(30);

static CONFIG: OnceLock<Config> = OnceLock::new();
static CONTROL_TX: OnceLock<Mutex<Option<Sender<ControlEvent>>>> = OnceLock::new();

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Blocks until the service stops. Must be started by the SCM.
pub fn run(config: Config) -> Result<()> {
    CONFIG.set(config).map_err(|_| anyhow!("service already started"))?;

    let mut name = wide(common::SERVICE_NAME);
    let table = [
        SERVICE_TABLE_ENTRYW {
            lpServiceName: PWSTR(name.as_mut_ptr()),
            lpServiceProc: Some(service_main),
        },
        SERVICE_TABLE_ENTRYW::default(),
    ];
    unsafe { StartServiceCtrlDispatcherW(table.as_ptr()) }
        .context("StartServiceCtrlDispatcherW failed; is this running under the service manager?")?;
    Ok(())
}

unsafe extern "system" fn service_main(_argc: u32, _argv: *mut PWSTR) {
    if let Err(e) = run_service() {
        log::error!("Service failed: {:#}", e);
    }
}

unsafe extern "system" fn control_handler(
    control: u32,
    _event_type: u32,
    _event_data: *mut c_void,
    _context: *mut c_void,
) -> u32 {
    let event = match control {
        SERVICE_CONTROL_STOP => ControlEvent::Stop,
        SERVICE_CONTROL_SHUTDOWN => ControlEvent::Shutdown,
        SERVICE_CONTROL_INTERROGATE => ControlEvent::Interrogate,
        other => ControlEvent::Other(other),
    };
    let sent = CONTROL_TX
        .get()
        .and_then(|slot| slot.lock().ok())
        .and_then(|tx| tx.as_ref().map(|tx| tx.send(event).is_ok()))
        .unwrap_or(false);
    match (sent, event) {
        (true, ControlEvent::Other(_)) => ERROR_CALL_NOT_IMPLEMENTED.0,
        (true, _) => NO_ERROR.0,
        (false, _) => ERROR_CALL_NOT_IMPLEMENTED.0,
    }
}

fn run_service() -> Result<()> {
    let config = CONFIG.get().cloned().ok_or_else(|| anyhow!("service configuration missing"))?;

    let (tx, rx) = mpsc::channel();
    let slot = CONTROL_TX.get_or_init(|| Mutex::new(None));
    *slot.lock().map_err(|_| anyhow!("control channel lock poisoned"))? = Some(tx);

    let name = wide(common::SERVICE_NAME);
    let handle = unsafe {
        RegisterServiceCtrlHandlerExW(PCWSTR(name.as_ptr()), Some(control_handler), None)
    }
    .context("RegisterServiceCtrlHandlerExW failed")?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let mut controller = ServiceController::new(ScmReporter { handle, checkpoint: 0 });
    let daemon = controller.launch(runtime.handle(), |cancel| crate::run_daemon(config, cancel));

    while let Ok(event) = rx.recv() {
        if controller.handle_control(event) == ControlFlow::Exit {
            break;
        }
    }

    if runtime.block_on(tokio::time::timeout(STOP_GRACE, daemon)).is_err() {
        log::warn!("Daemon did not stop within {:?}", STOP_GRACE);
    }
    controller.finish();
    Ok(())
}

struct ScmReporter {
    handle: SERVICE_STATUS_HANDLE,
    checkpoint: u32,
}

impl StatusReporter for ScmReporter {
    fn report(&mut self, status: ServiceStatus) -> Result<()> {
        let (state, accepts, wait_hint) = match status {
            ServiceStatus::StartPending => (SERVICE_START_PENDING, 0, 10_000),
            ServiceStatus::Running => (SERVICE_RUNNING, SERVICE_ACCEPT_STOP | SERVICE_ACCEPT_SHUTDOWN, 0),
            ServiceStatus::StopPending => (SERVICE_STOP_PENDING, 0, STOP_GRACE.as_millis() as u32),
            ServiceStatus::Stopped => (SERVICE_STOPPED, 0, 0),
        };
        let checkpoint = match status {
            ServiceStatus::StartPending | ServiceStatus::StopPending => {
                self.checkpoint += 1;
                self.checkpoint
            }
            _ => 0,
        };
        let raw = SERVICE_STATUS {
            dwServiceType: SERVICE_WIN32_OWN_PROCESS,
            dwCurrentState: state,
            dwControlsAccepted: accepts,
            dwWin32ExitCode: NO_ERROR.0,
            dwServiceSpecificExitCode: 0,
            dwCheckPoint: checkpoint,
            dwWaitHint: wait_hint,
        };
        unsafe { SetServiceStatus(self.handle, &raw) }.context("SetServiceStatus failed")
    }
}
