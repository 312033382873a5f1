//! Point d'entrée de signage-shell.
//!
//! Usage :
//!   signage-shell [--kiosk] [--dev] [--allow-quit]
//!
//! Exemples :
//!   cargo run                        → contenu embarqué, plein écran
//!   cargo run -- --dev               → diagnostics (devtools) disponibles
//!   cargo run -- --kiosk --allow-quit → kiosque hors Linux, quit autorisé
//!
//! Le contenu et le réglage moteur viennent de `signage.toml`
//! (voir [`signage_shell::config`]).

use std::error::Error;
use std::rc::Rc;

use signage_shell::bridge;
use signage_shell::browser::{App, Launch};
use signage_shell::config::Config;
use signage_shell::controller::KioskSession;
use signage_shell::lifecycle;
use signage_shell::navigation::NavigationGuard;
use signage_shell::platform::PlatformTuning;
use signage_shell::preferences::build_servo_preferences;
use signage_shell::resources;
use signage_shell::session::{HostPlatform, LaunchFlags, SessionConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;
use winit::event_loop::EventLoop;

fn main() -> Result<(), Box<dyn Error>> {
    // ── 1. Logging / Tracing ───────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── 2. Aucune panique ne passe inaperçue ───────────────────────────
    lifecycle::install_fault_hook();

    // ── 3. Session : flags + plateforme, figés pour tout le processus ──
    let platform = HostPlatform::detect();
    let session_config = Rc::new(SessionConfig::resolve(LaunchFlags::from_env(), platform));
    info!(
        platform = %session_config.platform,
        kiosk = session_config.kiosk_mode,
        dev = session_config.dev_mode,
        allow_quit = session_config.allow_explicit_quit,
        version = env!("CARGO_PKG_VERSION"),
        "Starting signage session"
    );

    #[cfg(debug_assertions)]
    tracing::warn!("Running in DEBUG mode, content will render slowly");

    // ── 4. Configuration de déploiement ────────────────────────────────
    let config = Config::load();
    let content_url = config.content.entry_url()?;
    info!(url = %content_url, "Content entry");

    // ── 5. Préférences Servo + réglages plateforme ─────────────────────
    let tuning = PlatformTuning::for_platform(&session_config.platform);
    let preferences = build_servo_preferences(&config.servo, &session_config, &tuning);

    // ── 6. Provider crypto TLS ─────────────────────────────────────────
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| "rustls crypto provider already installed")?;

    // ── 7. Lecteur de ressources Servo ─────────────────────────────────
    resources::init()?;

    // ── 8. Contrôleur de session ───────────────────────────────────────
    let guard = NavigationGuard::new(&content_url, config.navigation_scope());
    let session = KioskSession::new(session_config.clone(), guard, config.display.background);

    // ── 9. Boucle d'événements Winit ───────────────────────────────────
    let event_loop = EventLoop::with_user_event().build()?;

    let launch = Launch {
        shim: bridge::client_shim(&session_config),
        session_config,
        session,
        preferences,
        content_url,
        window_title: config.general.window_title,
        display: config.display,
    };
    let mut app = App::new(&event_loop, launch);

    Ok(event_loop.run_app(&mut app)?)
}
