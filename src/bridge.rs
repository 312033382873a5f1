//! Capability bridge between the signage content and the host.
//!
//! Content reaches the host only through requests to [`BRIDGE_HOST`], which
//! the engine glue intercepts before they hit the network. The set of
//! operations is the closed [`Capability`] enum; the URL path is matched
//! against it exactly once, at the boundary, and anything else is a typed
//! failure for that single request.
//!
//! ```text
//! GET http://kiosk.bridge/getPlatformInfo   → {"status":"ok","result":{...}}
//! GET http://kiosk.bridge/toggleFullscreen  → {"status":"ok","result":true}
//! GET http://kiosk.bridge/requestQuit       → {"status":"ok","result":null}
//! GET http://kiosk.bridge/kiosk.js          → client shim (window.kiosk)
//! ```
//!
//! The host also evaluates the shim in every page it loads, so the content
//! lockdown applies even when a page never references `kiosk.js`. The shim
//! installs itself at most once per page.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::session::SessionConfig;

pub const BRIDGE_HOST: &str = "kiosk.bridge";

const SHIM_PATH: &str = "kiosk.js";
const SHIM_SOURCE: &str = include_str!("kiosk.js");
const SHIM_DEV_MODE: &str = "__KIOSK_DEV_MODE__";

/// Identifier the host uses to pair a deferred response with its request.
pub type RequestId = u64;

/// Every operation the content can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    GetPlatformInfo,
    ToggleFullscreen,
    RequestQuit,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::GetPlatformInfo,
        Capability::ToggleFullscreen,
        Capability::RequestQuit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Capability::GetPlatformInfo => "getPlatformInfo",
            Capability::ToggleFullscreen => "toggleFullscreen",
            Capability::RequestQuit => "requestQuit",
        }
    }
}

impl FromStr for Capability {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| BridgeError::UnknownOperation(s.to_owned()))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),
    #[error("surface released before the reply was sent")]
    SurfaceReleased,
}

/// What a request to the bridge host asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeRoute {
    /// The client shim script.
    Shim,
    Invoke(Result<Capability, BridgeError>),
}

/// Returns `None` when `url` is not addressed to the bridge.
pub fn route(url: &Url) -> Option<BridgeRoute> {
    if !matches!(url.scheme(), "http" | "https") || url.host_str() != Some(BRIDGE_HOST) {
        return None;
    }
    let operation = url.path().trim_start_matches('/');
    if operation == SHIM_PATH {
        return Some(BridgeRoute::Shim);
    }
    Some(BridgeRoute::Invoke(operation.parse()))
}

/// Result of `getPlatformInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    pub platform: String,
    pub architecture: String,
    pub is_kiosk: bool,
    pub app_version: String,
}

impl PlatformInfo {
    pub fn for_session(config: &SessionConfig) -> Self {
        Self {
            platform: config.platform.os.as_str().to_owned(),
            architecture: config.platform.arch.to_owned(),
            is_kiosk: config.kiosk_mode,
            app_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CapabilityResult {
    PlatformInfo(PlatformInfo),
    Fullscreen(bool),
    Unit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CapabilityResponse {
    Ok { result: CapabilityResult },
    Failed { error: String },
}

impl CapabilityResponse {
    pub fn ok(result: CapabilityResult) -> Self {
        Self::Ok { result }
    }

    pub fn failed(error: &BridgeError) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// HTTP status carried by the intercepted response.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Ok { .. } => 200,
            Self::Failed { .. } => 404,
        }
    }

    pub fn to_json(&self) -> Vec<u8> {
        // Plain data with string keys, serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_else(|_| br#"{"status":"failed"}"#.to_vec())
    }
}

/// Intercepted requests waiting for the controller's reply, keyed by the id
/// handed out when they were parked.
#[derive(Debug)]
pub struct PendingReplies<T> {
    next_id: RequestId,
    waiting: BTreeMap<RequestId, T>,
}

impl<T> Default for PendingReplies<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            waiting: BTreeMap::new(),
        }
    }
}

impl<T> PendingReplies<T> {
    pub fn park(&mut self, load: T) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        self.waiting.insert(id, load);
        id
    }

    pub fn take(&mut self, id: RequestId) -> Option<T> {
        self.waiting.remove(&id)
    }

    /// Removes every waiting request, oldest first.
    pub fn drain(&mut self) -> Vec<(RequestId, T)> {
        std::mem::take(&mut self.waiting).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

/// Client shim with the session's developer mode baked in.
pub fn client_shim(config: &SessionConfig) -> String {
    SHIM_SOURCE.replace(SHIM_DEV_MODE, if config.dev_mode { "true" } else { "false" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{HostPlatform, LaunchFlags, Os};

    fn config(flags: &[&str]) -> SessionConfig {
        let platform = HostPlatform {
            os: Os::Linux,
            arch: "aarch64",
        };
        SessionConfig::resolve(LaunchFlags::parse(flags), platform)
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_route_known_operations() {
        for cap in Capability::ALL {
            let u = url(&format!("http://kiosk.bridge/{}", cap.name()));
            assert_eq!(route(&u), Some(BridgeRoute::Invoke(Ok(cap))));
        }
    }

    #[test]
    fn test_route_unknown_operation_is_typed_failure() {
        assert_eq!(
            route(&url("http://kiosk.bridge/readFile")),
            Some(BridgeRoute::Invoke(Err(BridgeError::UnknownOperation(
                "readFile".to_owned()
            ))))
        );
        // names are case-sensitive
        assert!(matches!(
            route(&url("http://kiosk.bridge/GETPLATFORMINFO")),
            Some(BridgeRoute::Invoke(Err(_)))
        ));
    }

    #[test]
    fn test_route_ignores_other_hosts() {
        assert_eq!(route(&url("https://example.com/getPlatformInfo")), None);
        assert_eq!(route(&url("file:///kiosk.bridge/getPlatformInfo")), None);
        assert_eq!(route(&url("http://kiosk.bridge.evil.com/requestQuit")), None);
    }

    #[test]
    fn test_route_shim() {
        assert_eq!(
            route(&url("http://kiosk.bridge/kiosk.js")),
            Some(BridgeRoute::Shim)
        );
    }

    #[test]
    fn test_platform_info_wire_format() {
        let info = PlatformInfo::for_session(&config(&[]));
        let json = CapabilityResponse::ok(CapabilityResult::PlatformInfo(info)).to_json();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["result"]["platform"], "linux");
        assert_eq!(value["result"]["architecture"], "aarch64");
        assert_eq!(value["result"]["isKiosk"], true);
        assert_eq!(value["result"]["appVersion"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_fullscreen_and_unit_results() {
        let value: serde_json::Value = serde_json::from_slice(
            &CapabilityResponse::ok(CapabilityResult::Fullscreen(false)).to_json(),
        )
        .unwrap();
        assert_eq!(value["result"], false);

        let value: serde_json::Value =
            serde_json::from_slice(&CapabilityResponse::ok(CapabilityResult::Unit).to_json())
                .unwrap();
        assert!(value["result"].is_null());
    }

    #[test]
    fn test_failure_wire_format() {
        let response =
            CapabilityResponse::failed(&BridgeError::UnknownOperation("exec".to_owned()));
        assert!(!response.is_ok());
        assert_eq!(response.status_code(), 404);
        let value: serde_json::Value = serde_json::from_slice(&response.to_json()).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "unknown operation 'exec'");
    }

    #[test]
    fn test_shim_bakes_dev_mode() {
        let prod = client_shim(&config(&[]));
        assert!(prod.contains("const DEV_MODE = false;"));
        assert!(!prod.contains(SHIM_DEV_MODE));

        let dev = client_shim(&config(&["--dev"]));
        assert!(dev.contains("const DEV_MODE = true;"));
        for cap in Capability::ALL {
            assert!(dev.contains(cap.name()));
        }
    }

    #[test]
    fn test_shim_installs_once_per_page() {
        let shim = client_shim(&config(&[]));
        let guard = shim.find(r#"if ("kiosk" in window)"#).unwrap();
        let install = shim.find("Object.defineProperty(window, \"kiosk\"").unwrap();
        assert!(guard < install);
    }

    #[test]
    fn test_pending_replies_pair_ids_with_loads() {
        let mut pending = PendingReplies::default();
        let first = pending.park("getPlatformInfo");
        let second = pending.park("toggleFullscreen");
        assert_ne!(first, second);

        assert_eq!(pending.take(second), Some("toggleFullscreen"));
        assert_eq!(pending.take(second), None);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_pending_replies_drain_on_release() {
        let mut pending = PendingReplies::default();
        let ids: Vec<_> = ["a", "b", "c"].into_iter().map(|l| pending.park(l)).collect();

        let drained = pending.drain();
        assert_eq!(drained, vec![(ids[0], "a"), (ids[1], "b"), (ids[2], "c")]);
        assert!(pending.is_empty());

        // Ids are never reused after a drain.
        let next = pending.park("d");
        assert!(!ids.contains(&next));

        let released = CapabilityResponse::failed(&BridgeError::SurfaceReleased);
        assert!(!released.is_ok());
    }
}
