//! Boucle d'événements Winit et exécution des effets du contrôleur.
//!
//! ## Pattern "Two-Phase App"
//!
//! Winit 0.30 impose que les fenêtres soient créées à l'intérieur du callback
//! `resumed()`, et non dans `main()`. On résout ce problème avec un enum
//! à deux états :
//!
//! ```text
//! App::Initial { waker, launch }  →  [resumed() appelé]  →  App::Running(Rc<AppState>)
//! ```
//!
//! ## Flux Winit / Servo ↔ contrôleur
//!
//! ```text
//! Threads Servo ── wake() ──▶ EventLoopProxy ──▶ user_event()
//!                                                   └─ servo.spin_event_loop()
//!                                                        └─ WebViewDelegate → EventQueue
//! WindowEvent ──────────────────────────────────────────────────▶ EventQueue
//!                                                                     │
//!                         AppState::pump() ◀──────────────────────────┘
//!                           └─ KioskSession::dispatch() → Effect → apply()
//! ```
//!
//! La surface n'a pas de chrome : la webview occupe toute la fenêtre.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use euclid::Scale;
use servo::{InputEvent, WheelDelta, WheelEvent, WheelMode};
use servo::{InterceptedWebResourceLoad, MouseLeftViewportEvent, MouseMoveEvent};
use servo::{MouseButton as ServoMouseButton, MouseButtonAction, MouseButtonEvent};
use servo::{RenderingContext, Servo, ServoBuilder, WebView, WebViewBuilder, WindowRenderingContext};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;
use webrender_api::units::DevicePoint;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::ModifiersState;
use winit::raw_window_handle::{HandleError, HasDisplayHandle, HasWindowHandle};
use winit::window::{Fullscreen, Window, WindowId, WindowLevel};

use crate::bridge::{BridgeError, CapabilityResponse, PendingReplies};
use crate::config::DisplayConfig;
use crate::controller::{self, Effect, Event, EventQueue, KioskSession};
use crate::display::{Lifecycle, SurfaceSpec, WorkArea};
use crate::keyutils;
use crate::lifecycle::{self, QuitOrigin};
use crate::rendering::{self, RenderingError};
use crate::servo_glue::{Waker, WakerEvent};
use crate::session::SessionConfig;

// ─────────────────────────────────────────────────────────────────────────────
// Launch : tout ce qui est résolu avant la boucle d'événements
// ─────────────────────────────────────────────────────────────────────────────

/// Contexte résolu dans `main()`, consommé au premier `resumed()`.
pub struct Launch {
    pub session_config: Rc<SessionConfig>,
    pub session: KioskSession,
    pub preferences: servo::Preferences,
    pub content_url: Url,
    pub window_title: String,
    pub display: DisplayConfig,
    pub shim: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// AppState : état partagé entre Winit et Servo
// ─────────────────────────────────────────────────────────────────────────────

/// La surface native et sa webview. Au plus une à la fois.
///
/// Ordre des champs = ordre de destruction : webview, contexte, fenêtre.
pub struct Surface {
    pub window_id: WindowId,
    pub webview: WebView,
    pub rendering_context: Rc<WindowRenderingContext>,
    pub window: Window,
    pub background: [f32; 4],
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("window handle unavailable: {0}")]
    Handle(#[from] HandleError),
    #[error(transparent)]
    Rendering(#[from] RenderingError),
}

/// État partagé de l'application, créé lors de `resumed()`.
///
/// Encapsulé dans `Rc` car :
/// - `WebViewDelegate` attend un `Rc<dyn WebViewDelegate>`
/// - Servo et l'App doivent référencer les mêmes données
/// - Tout vit sur le thread principal (pas besoin d'`Arc`)
pub struct AppState {
    pub servo: Servo,
    pub session_config: Rc<SessionConfig>,
    pub session: RefCell<KioskSession>,
    pub events: RefCell<EventQueue>,
    pub surface: RefCell<Option<Surface>>,

    /// Réponses du pont en attente, par identifiant de requête.
    pub pending_replies: RefCell<PendingReplies<InterceptedWebResourceLoad>>,

    pub content_url: Url,
    pub window_title: String,
    pub fallback_area: WorkArea,
    /// Script client servi sur `kiosk.bridge/kiosk.js`.
    pub shim: String,
    pub devtools_port: Cell<Option<u16>>,

    /// Position courante du curseur en device pixels.
    pub cursor_position: Cell<DevicePoint>,
    /// État des modificateurs clavier (Ctrl, Shift, Alt, Meta).
    pub modifiers: Cell<ModifiersState>,
}

impl AppState {
    pub fn queue(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    pub fn report_fault(&self, context: &str, message: &str) {
        match self.session.try_borrow_mut() {
            Ok(mut session) => session.report_fault(context, message),
            Err(_) => error!(context, fault = message, "Host fault contained"),
        }
    }

    pub fn request_redraw(&self) {
        if let Some(surface) = self.surface.borrow().as_ref() {
            surface.window.request_redraw();
        }
    }

    fn with_webview(&self, f: impl FnOnce(&WebView)) {
        if let Some(surface) = self.surface.borrow().as_ref() {
            f(&surface.webview);
        }
    }

    /// Traite toute la file d'événements, dans l'ordre d'arrivée.
    fn pump(self: &Rc<Self>, event_loop: &ActiveEventLoop) {
        controller::pump(&self.events, &self.session, |effect| {
            if let Err(message) = lifecycle::survive(|| self.apply(event_loop, effect)) {
                self.report_fault("effect", &message);
            }
        });
    }

    fn apply(self: &Rc<Self>, event_loop: &ActiveEventLoop, effect: Effect) {
        match effect {
            Effect::CreateSurface(spec) => {
                if let Err(e) = self.create_surface(event_loop, &spec) {
                    error!(error = %e, "Cannot create the signage surface");
                }
            }

            Effect::ShowSurface => {
                if let Some(surface) = self.surface.borrow().as_ref() {
                    surface.window.set_visible(true);
                    surface.window.focus_window();
                    surface.webview.focus();
                    surface.window.request_redraw();
                }
            }

            Effect::OpenDiagnostics => match self.devtools_port.get() {
                Some(port) => info!(port, "Diagnostics: connect a devtools client to this port"),
                None => warn!("Diagnostics requested but the devtools server is not running"),
            },

            Effect::SetFullscreen(on) => {
                if let Some(surface) = self.surface.borrow().as_ref() {
                    surface
                        .window
                        .set_fullscreen(on.then_some(Fullscreen::Borderless(None)));
                }
            }

            Effect::Reply { id, response } => {
                let Some(load) = self.pending_replies.borrow_mut().take(id) else {
                    warn!(id, "Reply for an unknown bridge request");
                    return;
                };
                load.send_body_data(response.to_json());
                load.finish();
            }

            Effect::ReloadContent => self.with_webview(|webview| webview.reload()),

            Effect::ReleaseSurface => {
                let surface = self.surface.borrow_mut().take();
                // Les requêtes du pont en attente appartiennent à cette webview.
                let abandoned = self.pending_replies.borrow_mut().drain();
                if !abandoned.is_empty() {
                    warn!(count = abandoned.len(), "Bridge requests dropped with the surface");
                    let body = CapabilityResponse::failed(&BridgeError::SurfaceReleased).to_json();
                    for (_, load) in abandoned {
                        load.send_body_data(body.clone());
                        load.finish();
                    }
                }
                drop(surface);
            }

            Effect::Exit => event_loop.exit(),
        }
    }

    /// Crée la fenêtre, le contexte GL et la webview de contenu.
    fn create_surface(
        self: &Rc<Self>,
        event_loop: &ActiveEventLoop,
        spec: &SurfaceSpec,
    ) -> Result<(), SurfaceError> {
        let mut attributes = Window::default_attributes()
            .with_title(self.window_title.clone())
            .with_inner_size(PhysicalSize::new(spec.width, spec.height))
            .with_decorations(spec.framed)
            .with_visible(spec.visible)
            .with_resizable(!spec.kiosk);
        if spec.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        if spec.kiosk {
            attributes = attributes.with_window_level(WindowLevel::AlwaysOnTop);
        }

        let window = event_loop.create_window(attributes)?;
        let rendering_context = rendering::create_rendering_context(
            event_loop.display_handle()?,
            window.window_handle()?,
            window.inner_size(),
        )?;
        rendering::fill_background(&rendering_context, spec.background);

        let webview = WebViewBuilder::new(
            &self.servo,
            rendering_context.clone() as Rc<dyn RenderingContext>,
        )
        .url(self.content_url.clone())
        .hidpi_scale_factor(Scale::new(window.scale_factor() as f32))
        .delegate(self.clone())
        .build();

        *self.surface.borrow_mut() = Some(Surface {
            window_id: window.id(),
            window,
            rendering_context,
            webview,
            background: spec.background,
        });
        Ok(())
    }

    fn on_window_event(self: &Rc<Self>, event_loop: &ActiveEventLoop, event: WindowEvent) {
        // Toujours faire tourner la boucle Servo en premier.
        self.servo.spin_event_loop();

        match event {
            // ── Fermeture : soumise à la politique de quit ─────────────
            WindowEvent::CloseRequested => self.queue(Event::QuitRequested {
                origin: QuitOrigin::CloseRequested,
            }),

            WindowEvent::Destroyed => self.queue(Event::SurfaceClosed),

            // ── Redraw : contenu si montré, sinon fond uni ─────────────
            WindowEvent::RedrawRequested => {
                let shown = self.session.borrow().window_state().lifecycle == Lifecycle::Shown;
                if let Some(surface) = self.surface.borrow().as_ref() {
                    if shown {
                        surface.webview.paint();
                        surface.rendering_context.present();
                    } else {
                        rendering::fill_background(&surface.rendering_context, surface.background);
                    }
                }
            }

            WindowEvent::Resized(new_size) => {
                if let Some(surface) = self.surface.borrow().as_ref() {
                    surface.rendering_context.resize(new_size);
                    surface.webview.resize(new_size);
                }
            }

            WindowEvent::ModifiersChanged(new_modifiers) => {
                self.modifiers.set(new_modifiers.state());
            }

            // ── Clavier : raccourcis hôte, le reste au contenu ────────
            WindowEvent::KeyboardInput { event, .. } => {
                let mods = self.modifiers.get();
                match keyutils::host_shortcut(&event.logical_key, mods) {
                    Some(shortcut) => {
                        if event.state == ElementState::Pressed {
                            self.queue(shortcut);
                        }
                    }
                    None => self.with_webview(|webview| {
                        let keyboard_event = keyutils::keyboard_event_from_winit(&event, mods);
                        webview.notify_input_event(InputEvent::Keyboard(keyboard_event));
                    }),
                }
            }

            // ── Souris / tactile émulé ────────────────────────────────
            WindowEvent::CursorMoved { position, .. } => {
                let point = DevicePoint::new(position.x as f32, position.y as f32);
                self.cursor_position.set(point);
                self.with_webview(|webview| {
                    webview.notify_input_event(InputEvent::MouseMove(MouseMoveEvent::new(
                        point.into(),
                    )));
                });
            }

            WindowEvent::CursorLeft { .. } => self.with_webview(|webview| {
                webview.notify_input_event(InputEvent::MouseLeftViewport(
                    MouseLeftViewportEvent::default(),
                ));
            }),

            WindowEvent::MouseInput {
                state: btn_state,
                button,
                ..
            } => {
                let pos = self.cursor_position.get();
                let servo_button = match button {
                    WinitMouseButton::Left => ServoMouseButton::Left,
                    WinitMouseButton::Right => ServoMouseButton::Right,
                    WinitMouseButton::Middle => ServoMouseButton::Middle,
                    WinitMouseButton::Back => ServoMouseButton::Back,
                    WinitMouseButton::Forward => ServoMouseButton::Forward,
                    WinitMouseButton::Other(id) => ServoMouseButton::Other(id),
                };
                let action = match btn_state {
                    ElementState::Pressed => MouseButtonAction::Down,
                    ElementState::Released => MouseButtonAction::Up,
                };
                self.with_webview(|webview| {
                    webview.notify_input_event(InputEvent::MouseButton(MouseButtonEvent::new(
                        action,
                        servo_button,
                        pos.into(),
                    )));
                });
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let pos = self.cursor_position.get();
                let (delta_x, delta_y, mode) = match delta {
                    MouseScrollDelta::LineDelta(dx, dy) => {
                        ((dx * 76.0) as f64, (dy * 76.0) as f64, WheelMode::DeltaLine)
                    }
                    MouseScrollDelta::PixelDelta(delta) => (delta.x, delta.y, WheelMode::DeltaPixel),
                };
                self.with_webview(|webview| {
                    webview.notify_input_event(InputEvent::Wheel(WheelEvent::new(
                        WheelDelta {
                            x: delta_x,
                            y: delta_y,
                            z: 0.0,
                            mode,
                        },
                        pos.into(),
                    )));
                });
            }

            _ => (),
        }

        self.pump(event_loop);
    }
}

/// Zone de l'écran principal, ou la taille de repli configurée.
///
/// Winit n'expose pas la zone de travail (écran moins barres système) : on
/// prend la taille complète du moniteur, ce qui convient à une surface plein
/// écran.
fn work_area(event_loop: &ActiveEventLoop, fallback: WorkArea) -> WorkArea {
    event_loop
        .primary_monitor()
        .or_else(|| event_loop.available_monitors().next())
        .map(|monitor| monitor.size())
        .filter(|size| size.width > 0 && size.height > 0)
        .map(|size| WorkArea {
            width: size.width,
            height: size.height,
        })
        .unwrap_or(fallback)
}

/// Seule la fenêtre de la surface courante alimente la session.
fn is_current_window(current: Option<WindowId>, id: WindowId) -> bool {
    current == Some(id)
}

// ─────────────────────────────────────────────────────────────────────────────
// App : enum deux phases
// ─────────────────────────────────────────────────────────────────────────────

/// Application à deux phases de vie.
pub enum App {
    /// Phase pré-initialisation : on attend que Winit appelle `resumed()`.
    Initial {
        waker: Waker,
        launch: Option<Box<Launch>>,
    },

    /// Phase opérationnelle : la session est active.
    Running(Rc<AppState>),
}

impl App {
    pub fn new(event_loop: &EventLoop<WakerEvent>, launch: Launch) -> Self {
        Self::Initial {
            waker: Waker::new(event_loop),
            launch: Some(Box::new(launch)),
        }
    }

    fn start(event_loop: &ActiveEventLoop, waker: Waker, launch: Launch) -> Rc<AppState> {
        let servo = ServoBuilder::default()
            .preferences(launch.preferences)
            .event_loop_waker(Box::new(waker))
            .build();

        let state = Rc::new(AppState {
            servo,
            session_config: launch.session_config,
            session: RefCell::new(launch.session),
            events: RefCell::new(EventQueue::default()),
            surface: RefCell::new(None),
            pending_replies: RefCell::new(PendingReplies::default()),
            content_url: launch.content_url,
            window_title: launch.window_title,
            fallback_area: WorkArea {
                width: launch.display.fallback_width,
                height: launch.display.fallback_height,
            },
            shim: launch.shim,
            devtools_port: Cell::new(None),
            cursor_position: Cell::new(DevicePoint::zero()),
            modifiers: Cell::new(ModifiersState::default()),
        });
        state.servo.set_delegate(state.clone());

        state.queue(Event::Launch {
            work_area: work_area(event_loop, state.fallback_area),
        });
        state.pump(event_loop);
        state
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ApplicationHandler : dispatch des événements Winit
// ─────────────────────────────────────────────────────────────────────────────

impl ApplicationHandler<WakerEvent> for App {
    /// Premier appel : démarre Servo et la session. Appels suivants :
    /// réactivation, la surface est recréée si elle a disparu.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        match self {
            Self::Initial { waker, launch } => {
                let Some(launch) = launch.take() else { return };
                let waker = waker.clone();
                match lifecycle::survive(|| Self::start(event_loop, waker, *launch)) {
                    Ok(state) => *self = Self::Running(state),
                    Err(message) => {
                        error!(fault = %message, "Startup failed");
                        event_loop.exit();
                    }
                }
            }
            Self::Running(state) => {
                let state = state.clone();
                state.queue(Event::Launch {
                    work_area: work_area(event_loop, state.fallback_area),
                });
                state.pump(event_loop);
            }
        }
    }

    /// Appelé quand un `WakerEvent` arrive depuis les threads Servo.
    fn user_event(&mut self, event_loop: &ActiveEventLoop, _event: WakerEvent) {
        if let Self::Running(state) = self {
            let state = state.clone();
            if let Err(message) = lifecycle::survive(|| {
                state.servo.spin_event_loop();
                state.pump(event_loop);
            }) {
                state.report_fault("user-event", &message);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if let Self::Running(state) = self {
            let state = state.clone();
            let current = state.surface.borrow().as_ref().map(|s| s.window_id);
            if !is_current_window(current, window_id) {
                // Fenêtre déjà libérée (ex. `Destroyed` tardif après recréation).
                debug!(?window_id, ?event, "Event for a stale window ignored");
                return;
            }
            if let Err(message) = lifecycle::survive(|| state.on_window_event(event_loop, event)) {
                state.report_fault("window-event", &message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_from_replaced_window_ignored() {
        let old = WindowId::from(1u64);
        let new = WindowId::from(2u64);
        assert!(is_current_window(Some(new), new));
        assert!(!is_current_window(Some(new), old));
        assert!(!is_current_window(None, old));
    }
}
