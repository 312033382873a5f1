//! Kiosk session controller.
//!
//! All host-side state lives in one [`KioskSession`], built once from the
//! resolved [`SessionConfig`] and handed its collaborators explicitly. Engine
//! and window callbacks never touch it directly: they queue an [`Event`], and
//! the winit thread pumps the queue one event at a time. Handling an event
//! produces [`Effect`]s that the host carries out on the real window and
//! webview.
//!
//! ```text
//! delegate callbacks ──push──▶ EventQueue ──pump──▶ KioskSession::dispatch
//!                                                        │
//!                                         Vec<Effect> ◀──┘──▶ host applies
//! ```
//!
//! Each dispatch runs under [`lifecycle::survive`]: a panicking handler is
//! logged as a host fault and the next event is processed normally.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, warn};
use url::Url;

use crate::bridge::{
    BridgeError, Capability, CapabilityResponse, CapabilityResult, PlatformInfo, RequestId,
};
use crate::display::{DisplayManager, SurfaceSpec, WindowState, WorkArea};
use crate::lifecycle::{
    self, ContentExit, LifecyclePolicy, ProcessState, QuitOrigin, QuitOutcome, RecoveryAction,
    RecoveryPolicy,
};
use crate::navigation::{NavigationDecision, NavigationGuard, Verdict};
use crate::session::SessionConfig;

/// Something that happened to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The host can create windows (startup, or re-activation).
    Launch { work_area: WorkArea },
    /// The content finished loading and can be shown.
    ContentReady,
    LocationChanged(Url),
    FullscreenShortcut,
    /// Leave fullscreen, never enter it.
    ExitFullscreenShortcut,
    QuitRequested { origin: QuitOrigin },
    Capability {
        id: RequestId,
        request: Result<Capability, BridgeError>,
    },
    ContentProcessGone(ContentExit),
    /// The window system destroyed the surface.
    SurfaceClosed,
}

impl Event {
    fn label(&self) -> &'static str {
        match self {
            Event::Launch { .. } => "launch",
            Event::ContentReady => "content-ready",
            Event::LocationChanged(_) => "location-changed",
            Event::FullscreenShortcut => "fullscreen-shortcut",
            Event::ExitFullscreenShortcut => "exit-fullscreen-shortcut",
            Event::QuitRequested { .. } => "quit-requested",
            Event::Capability { .. } => "capability",
            Event::ContentProcessGone(_) => "content-process-gone",
            Event::SurfaceClosed => "surface-closed",
        }
    }
}

/// Work for the host to carry out, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CreateSurface(SurfaceSpec),
    /// Make the surface visible and give it input focus.
    ShowSurface,
    OpenDiagnostics,
    SetFullscreen(bool),
    Reply {
        id: RequestId,
        response: CapabilityResponse,
    },
    ReloadContent,
    ReleaseSurface,
    Exit,
}

pub struct KioskSession {
    config: Rc<SessionConfig>,
    display: DisplayManager,
    guard: NavigationGuard,
    lifecycle: LifecyclePolicy,
    platform_info: PlatformInfo,
    last_work_area: Option<WorkArea>,
}

impl KioskSession {
    pub fn new(config: Rc<SessionConfig>, guard: NavigationGuard, background: [f32; 4]) -> Self {
        Self {
            display: DisplayManager::new(config.clone(), background),
            lifecycle: LifecyclePolicy::new(config.clone()),
            platform_info: PlatformInfo::for_session(&config),
            guard,
            config,
            last_work_area: None,
        }
    }

    /// Replaces the content-process recovery hook.
    pub fn with_recovery_policy(mut self, recovery: Box<dyn RecoveryPolicy>) -> Self {
        self.lifecycle = LifecyclePolicy::with_recovery(self.config.clone(), recovery);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn window_state(&self) -> &WindowState {
        self.display.state()
    }

    pub fn process_state(&self) -> ProcessState {
        self.lifecycle.state()
    }

    pub fn faults(&self) -> u64 {
        self.lifecycle.faults()
    }

    /// A fault contained outside [`KioskSession::dispatch`] (engine callback,
    /// effect execution).
    pub fn report_fault(&mut self, context: &str, message: &str) {
        self.lifecycle.record_fault(context, message);
    }

    pub fn review_navigation(&self, target: &Url) -> NavigationDecision {
        self.guard.review_navigation(target)
    }

    pub fn review_auxiliary(&self) -> Verdict {
        self.guard.review_auxiliary()
    }

    /// Handles one event, containing any fault it raises.
    pub fn dispatch(&mut self, event: Event) -> Vec<Effect> {
        let label = event.label();
        match lifecycle::survive(|| self.handle(event)) {
            Ok(effects) => effects,
            Err(message) => {
                self.lifecycle.record_fault(label, &message);
                Vec::new()
            }
        }
    }

    fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Launch { work_area } => self.launch(work_area),

            Event::ContentReady => match self.display.present_when_ready() {
                Ok(true) => vec![Effect::ShowSurface, Effect::OpenDiagnostics],
                Ok(false) => vec![Effect::ShowSurface],
                Err(e) => {
                    debug!(error = %e, "Ready signal ignored");
                    Vec::new()
                }
            },

            Event::LocationChanged(url) => {
                self.display.set_location(url);
                Vec::new()
            }

            Event::FullscreenShortcut => {
                if !self.display.has_surface() {
                    return Vec::new();
                }
                vec![Effect::SetFullscreen(self.display.toggle_fullscreen())]
            }

            Event::ExitFullscreenShortcut => {
                if !self.display.has_surface() || !self.display.state().fullscreen_active {
                    return Vec::new();
                }
                vec![Effect::SetFullscreen(self.display.toggle_fullscreen())]
            }

            Event::QuitRequested { origin } => self.quit(origin),

            Event::Capability { id, request } => {
                let (response, mut effects) = match request {
                    Ok(capability) => self.invoke(capability),
                    Err(e) => {
                        warn!(id, error = %e, "Capability request rejected");
                        (CapabilityResponse::failed(&e), Vec::new())
                    }
                };
                effects.insert(0, Effect::Reply { id, response });
                effects
            }

            Event::ContentProcessGone(exit) => match self.lifecycle.on_content_gone(&exit) {
                RecoveryAction::Reload if self.display.has_surface() => {
                    vec![Effect::ReloadContent]
                }
                _ => Vec::new(),
            },

            Event::SurfaceClosed => {
                if !self.display.destroy() {
                    return Vec::new();
                }
                let mut effects = vec![Effect::ReleaseSurface];
                if self.config.platform.quits_when_surfaces_closed() {
                    effects.extend(self.quit(QuitOrigin::SurfacesClosed));
                    if !effects.contains(&Effect::Exit)
                        && let Some(work_area) = self.last_work_area
                    {
                        // Suppressed: signage has to stay on screen.
                        effects.extend(self.launch(work_area));
                    }
                }
                effects
            }
        }
    }

    fn launch(&mut self, work_area: WorkArea) -> Vec<Effect> {
        match self.display.create(work_area) {
            Ok(spec) => {
                self.last_work_area = Some(work_area);
                vec![Effect::CreateSurface(spec)]
            }
            Err(e) => {
                debug!(error = %e, "Launch ignored");
                Vec::new()
            }
        }
    }

    fn quit(&mut self, origin: QuitOrigin) -> Vec<Effect> {
        match self.lifecycle.request_quit(origin) {
            QuitOutcome::Proceed => vec![Effect::Exit],
            QuitOutcome::Suppressed => Vec::new(),
        }
    }

    /// Dispatch table of the bridge. The match is exhaustive over
    /// [`Capability`], so adding an operation is a compile-time change here.
    fn invoke(&mut self, capability: Capability) -> (CapabilityResponse, Vec<Effect>) {
        debug!(operation = capability.name(), "Capability invoked");
        match capability {
            Capability::GetPlatformInfo => (
                CapabilityResponse::ok(CapabilityResult::PlatformInfo(self.platform_info.clone())),
                Vec::new(),
            ),
            Capability::ToggleFullscreen => {
                let had_surface = self.display.has_surface();
                let fullscreen = self.display.toggle_fullscreen();
                let effects = if had_surface {
                    vec![Effect::SetFullscreen(fullscreen)]
                } else {
                    Vec::new()
                };
                (
                    CapabilityResponse::ok(CapabilityResult::Fullscreen(fullscreen)),
                    effects,
                )
            }
            Capability::RequestQuit => (
                CapabilityResponse::ok(CapabilityResult::Unit),
                self.quit(QuitOrigin::Capability),
            ),
        }
    }
}

/// FIFO of pending events, drained only on the winit thread.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<Event>,
}

impl EventQueue {
    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Drains `queue` in arrival order, handing every effect to `apply`.
///
/// Neither the queue nor the session stays borrowed while `apply` runs, so
/// effects may re-enter the engine and queue further events; those are
/// handled in the same pump.
pub fn pump(
    queue: &RefCell<EventQueue>,
    session: &RefCell<KioskSession>,
    mut apply: impl FnMut(Effect),
) {
    loop {
        let Some(event) = queue.borrow_mut().pop() else {
            break;
        };
        let effects = session.borrow_mut().dispatch(event);
        for effect in effects {
            apply(effect);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::Lifecycle;
    use crate::navigation::NavigationScope;
    use crate::session::{HostPlatform, LaunchFlags, Os};

    const BACKGROUND: [f32; 4] = [0.102, 0.102, 0.102, 1.0];
    const SCREEN: WorkArea = WorkArea {
        width: 1280,
        height: 720,
    };
    const PI: HostPlatform = HostPlatform {
        os: Os::Linux,
        arch: "aarch64",
    };

    fn content_url() -> Url {
        Url::parse("file:///opt/signage/content/index.html").unwrap()
    }

    fn session_on(platform: HostPlatform, flags: &[&str]) -> KioskSession {
        let config = Rc::new(SessionConfig::resolve(LaunchFlags::parse(flags), platform));
        let guard = NavigationGuard::new(&content_url(), NavigationScope::Origin);
        KioskSession::new(config, guard, BACKGROUND)
    }

    fn session(flags: &[&str]) -> KioskSession {
        session_on(PI, flags)
    }

    fn invoke(s: &mut KioskSession, id: RequestId, capability: Capability) -> Vec<Effect> {
        s.dispatch(Event::Capability {
            id,
            request: Ok(capability),
        })
    }

    fn reply(effects: &[Effect]) -> &CapabilityResponse {
        match effects.first() {
            Some(Effect::Reply { response, .. }) => response,
            other => panic!("expected a reply first, got {other:?}"),
        }
    }

    fn shown(flags: &[&str]) -> KioskSession {
        let mut s = session(flags);
        s.dispatch(Event::Launch { work_area: SCREEN });
        s.dispatch(Event::ContentReady);
        s
    }

    #[test]
    fn test_scenario_embedded_launch_without_flags() {
        let mut s = session(&[]);
        assert!(s.config().kiosk_mode);

        let effects = s.dispatch(Event::Launch { work_area: SCREEN });
        let [Effect::CreateSurface(spec)] = effects.as_slice() else {
            panic!("expected CreateSurface, got {effects:?}");
        };
        assert!(spec.fullscreen && spec.kiosk && !spec.framed && !spec.visible);
        assert_eq!(s.window_state().lifecycle, Lifecycle::Created);

        assert_eq!(s.dispatch(Event::ContentReady), vec![Effect::ShowSurface]);
        assert_eq!(s.window_state().lifecycle, Lifecycle::Shown);

        // one ready signal per session
        assert!(s.dispatch(Event::ContentReady).is_empty());
    }

    #[test]
    fn test_scenario_dev_mode() {
        let mut s = session(&["--dev"]);
        s.dispatch(Event::Launch { work_area: SCREEN });
        assert_eq!(
            s.dispatch(Event::ContentReady),
            vec![Effect::ShowSurface, Effect::OpenDiagnostics]
        );
        let effects = invoke(&mut s, 1, Capability::RequestQuit);
        assert!(reply(&effects).is_ok());
        assert_eq!(effects.last(), Some(&Effect::Exit));
        assert_eq!(s.process_state(), ProcessState::Terminated);
    }

    #[test]
    fn test_scenario_external_navigation_denied() {
        let mut s = shown(&["--dev"]);
        s.dispatch(Event::LocationChanged(content_url()));
        let before = s.window_state().clone();

        let decision = s.review_navigation(&Url::parse("https://ads.example.net/").unwrap());
        assert_eq!(decision.verdict, Verdict::Deny);
        assert_eq!(s.window_state(), &before);
        assert_eq!(s.window_state().location, Some(content_url()));
        assert_eq!(s.review_auxiliary(), Verdict::Deny);
    }

    #[test]
    fn test_scenario_toggle_twice_restores_initial_state() {
        let mut s = shown(&[]);
        let original = s.window_state().fullscreen_active;

        let first = invoke(&mut s, 1, Capability::ToggleFullscreen);
        assert_eq!(
            reply(&first),
            &CapabilityResponse::ok(CapabilityResult::Fullscreen(!original))
        );
        assert_eq!(first[1], Effect::SetFullscreen(!original));

        let second = invoke(&mut s, 2, Capability::ToggleFullscreen);
        assert_eq!(
            reply(&second),
            &CapabilityResponse::ok(CapabilityResult::Fullscreen(original))
        );
        assert_eq!(s.window_state().fullscreen_active, original);
    }

    #[test]
    fn test_toggle_before_launch_returns_false() {
        let mut s = session(&[]);
        let effects = invoke(&mut s, 9, Capability::ToggleFullscreen);
        assert_eq!(
            effects,
            vec![Effect::Reply {
                id: 9,
                response: CapabilityResponse::ok(CapabilityResult::Fullscreen(false)),
            }]
        );
        assert_eq!(s.window_state().lifecycle, Lifecycle::Uninitialized);
        assert!(s.dispatch(Event::FullscreenShortcut).is_empty());
    }

    #[test]
    fn test_scenario_quit_suppressed() {
        let mut s = shown(&[]);
        let effects = invoke(&mut s, 3, Capability::RequestQuit);
        assert_eq!(effects.len(), 1);
        assert!(reply(&effects).is_ok());
        assert!(
            s.dispatch(Event::QuitRequested {
                origin: QuitOrigin::CloseRequested
            })
            .is_empty()
        );
        assert_eq!(s.process_state(), ProcessState::Running);
    }

    /// Collects formatted log lines emitted while `f` runs.
    fn captured_logs(f: impl FnOnce()) -> String {
        use std::io;
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl io::Write for Capture {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);

        let bytes = capture.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_suppressed_quit_logs_one_diagnostic() {
        let mut s = shown(&[]);
        let logs = captured_logs(|| {
            invoke(&mut s, 3, Capability::RequestQuit);
        });
        let naming_flag = logs
            .lines()
            .filter(|line| line.contains(crate::session::FLAG_ALLOW_QUIT))
            .count();
        assert_eq!(naming_flag, 1, "{logs}");
        assert!(logs.contains("WARN"), "{logs}");
    }

    #[test]
    fn test_allowed_quit_logs_no_diagnostic() {
        let mut s = shown(&["--allow-quit"]);
        let logs = captured_logs(|| {
            invoke(&mut s, 3, Capability::RequestQuit);
        });
        assert!(!logs.contains("Quit prevented"), "{logs}");
    }

    #[test]
    fn test_ctrl_escape_only_leaves_fullscreen() {
        let mut s = shown(&[]);
        assert!(s.window_state().fullscreen_active);
        assert_eq!(
            s.dispatch(Event::ExitFullscreenShortcut),
            vec![Effect::SetFullscreen(false)]
        );
        assert!(!s.window_state().fullscreen_active);
        assert!(s.dispatch(Event::ExitFullscreenShortcut).is_empty());
        assert!(!s.window_state().fullscreen_active);

        let mut bare = session(&[]);
        assert!(bare.dispatch(Event::ExitFullscreenShortcut).is_empty());
    }

    #[test]
    fn test_allow_quit_flag_exits() {
        let mut s = shown(&["--allow-quit"]);
        assert_eq!(
            s.dispatch(Event::QuitRequested {
                origin: QuitOrigin::Shortcut
            }),
            vec![Effect::Exit]
        );
    }

    #[test]
    fn test_platform_info_matches_session_kiosk_mode() {
        for (platform, flags, kiosk) in [
            (PI, &[][..], true),
            (
                HostPlatform {
                    os: Os::Windows,
                    arch: "x86_64",
                },
                &[][..],
                false,
            ),
            (
                HostPlatform {
                    os: Os::Windows,
                    arch: "x86_64",
                },
                &["--kiosk"][..],
                true,
            ),
        ] {
            let mut s = session_on(platform, flags);
            for id in 0..3 {
                let effects = invoke(&mut s, id, Capability::GetPlatformInfo);
                let CapabilityResponse::Ok {
                    result: CapabilityResult::PlatformInfo(info),
                } = reply(&effects)
                else {
                    panic!("unexpected response {effects:?}");
                };
                assert_eq!(info.is_kiosk, kiosk);
                assert_eq!(info.is_kiosk, s.config().kiosk_mode);
                s.dispatch(Event::FullscreenShortcut);
            }
        }
    }

    #[test]
    fn test_unknown_operation_fails_only_that_request() {
        let mut s = shown(&[]);
        let effects = s.dispatch(Event::Capability {
            id: 4,
            request: Err(BridgeError::UnknownOperation("readFile".to_owned())),
        });
        assert_eq!(effects.len(), 1);
        assert!(!reply(&effects).is_ok());

        let next = invoke(&mut s, 5, Capability::GetPlatformInfo);
        assert!(reply(&next).is_ok());
        assert_eq!(s.process_state(), ProcessState::Running);
    }

    #[test]
    fn test_second_launch_is_ignored() {
        let mut s = shown(&[]);
        assert!(s.dispatch(Event::Launch { work_area: SCREEN }).is_empty());
    }

    #[test]
    fn test_surface_closed_recreates_when_quit_suppressed() {
        let mut s = shown(&[]);
        let effects = s.dispatch(Event::SurfaceClosed);
        assert_eq!(effects[0], Effect::ReleaseSurface);
        assert!(matches!(effects[1], Effect::CreateSurface(_)));
        assert_eq!(s.window_state().lifecycle, Lifecycle::Created);
        assert!(s.window_state().location.is_none());
    }

    #[test]
    fn test_surface_closed_exits_when_allowed() {
        let mut s = shown(&["--allow-quit"]);
        assert_eq!(
            s.dispatch(Event::SurfaceClosed),
            vec![Effect::ReleaseSurface, Effect::Exit]
        );
    }

    #[test]
    fn test_surface_closed_on_macos_waits_for_launch() {
        let mac = HostPlatform {
            os: Os::MacOs,
            arch: "aarch64",
        };
        let mut s = session_on(mac, &["--allow-quit"]);
        s.dispatch(Event::Launch { work_area: SCREEN });
        assert_eq!(s.dispatch(Event::SurfaceClosed), vec![Effect::ReleaseSurface]);
        assert_eq!(s.process_state(), ProcessState::Running);
        assert!(matches!(
            s.dispatch(Event::Launch { work_area: SCREEN }).as_slice(),
            [Effect::CreateSurface(_)]
        ));
    }

    struct Panicking;

    impl RecoveryPolicy for Panicking {
        fn on_content_gone(&mut self, _exit: &ContentExit) -> RecoveryAction {
            panic!("recovery hook failed");
        }
    }

    struct Reload;

    impl RecoveryPolicy for Reload {
        fn on_content_gone(&mut self, _exit: &ContentExit) -> RecoveryAction {
            RecoveryAction::Reload
        }
    }

    fn crash() -> Event {
        Event::ContentProcessGone(ContentExit {
            reason: "renderer crashed".to_owned(),
            backtrace: None,
        })
    }

    #[test]
    fn test_content_crash_is_logged_noop_by_default() {
        let mut s = shown(&[]);
        assert!(s.dispatch(crash()).is_empty());
        assert_eq!(s.process_state(), ProcessState::Running);
        assert_eq!(s.faults(), 0);
    }

    #[test]
    fn test_recovery_policy_can_reload() {
        let mut s = shown(&[]).with_recovery_policy(Box::new(Reload));
        assert_eq!(s.dispatch(crash()), vec![Effect::ReloadContent]);
    }

    #[test]
    fn test_fault_does_not_block_later_events() {
        let mut s = shown(&[]).with_recovery_policy(Box::new(Panicking));
        assert!(s.dispatch(crash()).is_empty());
        assert_eq!(s.faults(), 1);
        assert_eq!(s.process_state(), ProcessState::Running);

        let effects = invoke(&mut s, 6, Capability::ToggleFullscreen);
        assert!(reply(&effects).is_ok());
        assert_eq!(effects[1], Effect::SetFullscreen(false));
    }

    #[test]
    fn test_pump_preserves_order_and_survives_faults() {
        let queue = RefCell::new(EventQueue::default());
        let session = RefCell::new(session(&[]).with_recovery_policy(Box::new(Panicking)));

        {
            let mut q = queue.borrow_mut();
            q.push(Event::Launch { work_area: SCREEN });
            q.push(crash());
            q.push(Event::ContentReady);
            for id in 10..13 {
                q.push(Event::Capability {
                    id,
                    request: Ok(Capability::GetPlatformInfo),
                });
            }
            assert_eq!(q.len(), 6);
        }

        let mut applied = Vec::new();
        pump(&queue, &session, |effect| applied.push(effect));

        assert!(queue.borrow().is_empty());
        assert_eq!(session.borrow().faults(), 1);
        assert!(matches!(applied[0], Effect::CreateSurface(_)));
        assert_eq!(applied[1], Effect::ShowSurface);
        let ids: Vec<RequestId> = applied
            .iter()
            .filter_map(|e| match e {
                Effect::Reply { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![10, 11, 12]);
    }

    #[test]
    fn test_pump_handles_events_queued_by_effects() {
        let queue = RefCell::new(EventQueue::default());
        let session = RefCell::new(session(&[]));
        queue
            .borrow_mut()
            .push(Event::Launch { work_area: SCREEN });

        let mut applied = Vec::new();
        pump(&queue, &session, |effect| {
            if matches!(effect, Effect::CreateSurface(_)) {
                queue.borrow_mut().push(Event::ContentReady);
            }
            applied.push(effect);
        });

        assert_eq!(applied.len(), 2);
        assert_eq!(applied[1], Effect::ShowSurface);
    }
}
