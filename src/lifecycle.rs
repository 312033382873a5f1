//! Process lifecycle policy: the shell stays up unless someone explicitly
//! allowed it to go down.
//!
//! ```text
//! Running ──fault──────────────▶ Running
//! Running ──quit (suppressed)──▶ Running
//! Running ──quit (allowed)─────▶ Terminated
//! ```
//!
//! Faults are panics. A process-wide hook logs them with a backtrace and
//! [`survive`] contains them at each handler boundary so the event loop keeps
//! going.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{error, info, warn};

use crate::session::{FLAG_ALLOW_QUIT, SessionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Terminated,
}

/// Where a quit request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitOrigin {
    /// Window manager close button / Alt+F4.
    CloseRequested,
    /// The last surface went away.
    SurfacesClosed,
    /// Ctrl+Shift+Q.
    Shortcut,
    /// `requestQuit` from the content.
    Capability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitOutcome {
    Proceed,
    Suppressed,
}

/// Details of a content process that went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentExit {
    pub reason: String,
    pub backtrace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    None,
    Reload,
}

/// Hook consulted when the content process dies.
pub trait RecoveryPolicy {
    fn on_content_gone(&mut self, exit: &ContentExit) -> RecoveryAction;
}

/// Default policy: the crash is logged by [`LifecyclePolicy`], nothing else
/// happens.
#[derive(Debug, Default)]
pub struct LogOnly;

impl RecoveryPolicy for LogOnly {
    fn on_content_gone(&mut self, _exit: &ContentExit) -> RecoveryAction {
        RecoveryAction::None
    }
}

pub struct LifecyclePolicy {
    config: Rc<SessionConfig>,
    state: ProcessState,
    faults: u64,
    recovery: Box<dyn RecoveryPolicy>,
}

impl LifecyclePolicy {
    pub fn new(config: Rc<SessionConfig>) -> Self {
        Self::with_recovery(config, Box::new(LogOnly))
    }

    pub fn with_recovery(config: Rc<SessionConfig>, recovery: Box<dyn RecoveryPolicy>) -> Self {
        Self {
            config,
            state: ProcessState::Running,
            faults: 0,
            recovery,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Number of host faults survived so far.
    pub fn faults(&self) -> u64 {
        self.faults
    }

    fn quit_allowed(&self) -> bool {
        self.config.dev_mode || self.config.allow_explicit_quit
    }

    pub fn request_quit(&mut self, origin: QuitOrigin) -> QuitOutcome {
        if self.state == ProcessState::Terminated {
            return QuitOutcome::Proceed;
        }
        if !self.quit_allowed() {
            warn!(?origin, "Quit prevented - relaunch with {FLAG_ALLOW_QUIT} to allow it");
            return QuitOutcome::Suppressed;
        }
        info!(?origin, "Quit allowed, shutting down");
        self.state = ProcessState::Terminated;
        QuitOutcome::Proceed
    }

    /// A handler panicked. The panic hook already logged the details.
    pub fn record_fault(&mut self, context: &str, message: &str) {
        self.faults += 1;
        error!(
            context,
            fault = message,
            total = self.faults,
            "Host fault contained, signage keeps running"
        );
    }

    pub fn on_content_gone(&mut self, exit: &ContentExit) -> RecoveryAction {
        warn!(
            reason = %exit.reason,
            backtrace = exit.backtrace.as_deref().unwrap_or("<none>"),
            "Content process gone"
        );
        self.recovery.on_content_gone(exit)
    }
}

/// Installs the process-wide hook that logs every panic, on any thread,
/// with its location and a backtrace.
pub fn install_fault_hook() {
    panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "<unknown>".to_owned());
        let thread = std::thread::current();
        error!(
            thread = thread.name().unwrap_or("<unnamed>"),
            location = %location,
            fault = %panic_message(info.payload()),
            backtrace = %Backtrace::force_capture(),
            "Uncaught host fault"
        );
    }));
}

/// Runs `f`, turning a panic into `Err(message)` instead of unwinding
/// further.
pub fn survive<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
