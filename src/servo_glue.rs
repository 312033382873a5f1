//! Couche d'intégration entre Servo et le contrôleur de session.
//!
//! Ce module contient trois éléments clés :
//!
//! 1. **[`Waker`] / [`WakerEvent`]** : Le pont `Send + Sync` entre les threads
//!    internes de Servo (Constellation, script, réseau) et le thread principal Winit.
//!
//! 2. **[`WebViewDelegate`] pour [`AppState`]** : Les callbacks Servo sont
//!    traduits en [`Event`]s mis en file pour le contrôleur. Seules deux
//!    décisions sont prises sur place, car Servo attend la réponse : la
//!    navigation (garde de navigation) et l'ouverture d'une webview auxiliaire
//!    (toujours refusée). Le script client (`window.kiosk` et le verrouillage
//!    de la page) est injecté par l'hôte dans chaque page chargée.
//!
//! 3. **[`ServoDelegate`] pour [`AppState`]** : Erreurs moteur et serveur
//!    devtools (mode développeur uniquement).
//!
//! Chaque callback s'exécute sous [`lifecycle::survive`] : une panique ne
//! traverse jamais la frontière Servo.

use http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use servo::{
    AllowOrDenyRequest, LoadStatus, NavigationRequest, Servo, ServoDelegate, ServoError,
    WebResourceLoad, WebResourceResponse, WebView, WebViewDelegate,
};
use tracing::{debug, error, info, warn};
use url::Url;
use winit::event_loop::{EventLoop, EventLoopProxy};

use crate::bridge::{self, BridgeRoute};
use crate::browser::AppState;
use crate::controller::Event;
use crate::lifecycle::{self, ContentExit};
use crate::navigation::Verdict;

// ─────────────────────────────────────────────────────────────────────────────
// Waker : pont Servo → Winit
// ─────────────────────────────────────────────────────────────────────────────

/// Événement marqueur envoyé à travers le `EventLoopProxy` de Winit.
///
/// Quand un thread interne de Servo a terminé un travail (page chargée,
/// frame prête, réponse réseau reçue), il appelle `Waker::wake()`,
/// qui envoie ce `WakerEvent`. La boucle Winit le reçoit dans
/// `user_event()` et appelle `servo.spin_event_loop()` en réponse.
#[derive(Debug)]
pub struct WakerEvent;

/// Pont thread-safe entre les threads internes de Servo et la boucle
/// d'événements Winit sur le thread principal.
///
/// `Waker` est `Clone + Send + Sync` car `EventLoopProxy` l'est.
/// C'est requis par le trait `EventLoopWaker: 'static + Send + Sync`.
#[derive(Clone)]
pub struct Waker(EventLoopProxy<WakerEvent>);

impl Waker {
    pub fn new(event_loop: &EventLoop<WakerEvent>) -> Self {
        Self(event_loop.create_proxy())
    }
}

impl embedder_traits::EventLoopWaker for Waker {
    fn clone_box(&self) -> Box<dyn embedder_traits::EventLoopWaker> {
        Box::new(Self(self.0.clone()))
    }

    fn wake(&self) {
        if let Err(error) = self.0.send_event(WakerEvent) {
            warn!(?error, "Échec du réveil de la boucle d'événements Winit");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebViewDelegate : callbacks Servo → contrôleur
// ─────────────────────────────────────────────────────────────────────────────

impl AppState {
    /// Exécute un callback Servo ; une panique devient une faute journalisée.
    fn guarded(&self, context: &str, f: impl FnOnce()) {
        if let Err(message) = lifecycle::survive(f) {
            self.report_fault(context, &message);
        }
    }

    fn inject_shim(&self, webview: &WebView) {
        webview.evaluate_javascript(self.shim.clone(), |result| {
            if let Err(error) = result {
                warn!(?error, "Injection du script client échouée");
            }
        });
    }

    /// Répond aux requêtes vers l'hôte du pont ; les autres passent.
    fn intercept_bridge(&self, load: WebResourceLoad) {
        let url = load.request().url.clone();
        let Some(route) = bridge::route(&url) else {
            return;
        };

        match route {
            BridgeRoute::Shim => {
                let intercepted =
                    load.intercept(bridge_response(&url, StatusCode::OK, "text/javascript"));
                intercepted.send_body_data(self.shim.clone().into_bytes());
                intercepted.finish();
            }
            BridgeRoute::Invoke(request) => {
                let status = if request.is_ok() {
                    StatusCode::OK
                } else {
                    StatusCode::NOT_FOUND
                };
                let intercepted = load.intercept(bridge_response(&url, status, "application/json"));
                let id = self.pending_replies.borrow_mut().park(intercepted);
                self.queue(Event::Capability { id, request });
            }
        }
    }
}

/// En-tête de réponse du pont. Le contenu est servi depuis `file://`, d'où
/// l'en-tête CORS.
fn bridge_response(url: &Url, status: StatusCode, content_type: &'static str) -> WebResourceResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    WebResourceResponse::new(url.clone())
        .headers(headers)
        .status_code(status)
}

impl WebViewDelegate for AppState {
    /// Servo a composité un nouveau frame : on demande un redraw à Winit.
    fn notify_new_frame_ready(&self, _webview: WebView) {
        self.guarded("new-frame-ready", || self.request_redraw());
    }

    /// Injecte le script client dans chaque page (le script s'installe une
    /// seule fois), puis signale le contenu prêt à la fin du chargement.
    fn notify_load_status_changed(&self, webview: WebView, status: LoadStatus) {
        match status {
            LoadStatus::HeadParsed => self.guarded("inject-shim", || self.inject_shim(&webview)),
            LoadStatus::Complete => {
                self.guarded("inject-shim", || self.inject_shim(&webview));
                self.queue(Event::ContentReady);
            }
            _ => {}
        }
    }

    fn notify_url_changed(&self, _webview: WebView, url: Url) {
        self.queue(Event::LocationChanged(url));
    }

    /// Toute navigation passe par la garde. Si la session est
    /// indisponible, on refuse.
    fn request_navigation(&self, _webview: WebView, navigation_request: NavigationRequest) {
        let verdict = lifecycle::survive(|| {
            self.session
                .try_borrow()
                .map(|session| session.review_navigation(&navigation_request.url).verdict)
                .unwrap_or(Verdict::Deny)
        })
        .unwrap_or(Verdict::Deny);

        match verdict {
            Verdict::Allow => navigation_request.allow(),
            Verdict::Deny => navigation_request.deny(),
        }
    }

    /// Jamais de seconde surface.
    fn request_open_auxiliary_webview(&self, _parent_webview: WebView) -> Option<WebView> {
        if let Ok(session) = self.session.try_borrow() {
            session.review_auxiliary();
        }
        None
    }

    fn notify_closed(&self, _webview: WebView) {
        debug!("Le contenu a demandé window.close(), ignoré");
    }

    /// Le processus de contenu est mort : événement opérationnel, pas une
    /// faute de l'hôte.
    fn notify_crashed(&self, _webview: WebView, reason: String, backtrace: Option<String>) {
        self.queue(Event::ContentProcessGone(ContentExit { reason, backtrace }));
    }

    /// Intercepte les requêtes vers `kiosk.bridge`.
    fn load_web_resource(&self, _webview: WebView, load: WebResourceLoad) {
        self.guarded("load-web-resource", || self.intercept_bridge(load));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ServoDelegate : callbacks moteur globaux
// ─────────────────────────────────────────────────────────────────────────────

impl ServoDelegate for AppState {
    fn notify_error(&self, _servo: &Servo, error: ServoError) {
        error!(?error, "Erreur moteur Servo");
        self.report_fault("servo", &format!("{error:?}"));
    }

    fn notify_devtools_server_started(&self, _servo: &Servo, port: u16, _token: String) {
        info!(port, "Serveur devtools démarré");
        self.devtools_port.set(Some(port));
    }

    fn request_devtools_connection(&self, _servo: &Servo, request: AllowOrDenyRequest) {
        if self.session_config.dev_mode {
            request.allow();
        } else {
            warn!("Connexion devtools refusée hors mode développeur");
            request.deny();
        }
    }
}
