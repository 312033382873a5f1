//! Navigation lockdown.
//!
//! The signage surface may only ever show the bundled content. Every
//! navigation the content attempts is compared with the origin of the content
//! entry point, and every attempt to open an auxiliary webview is refused.
//! Developer mode does not relax any of this.

use tracing::{debug, warn};
use url::Url;

/// `(scheme, host, port)` triple. Unlike [`url::Origin`], `file:` URLs all
/// share one origin here, which is what local signage content needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentOrigin {
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
}

impl ContentOrigin {
    pub fn of(url: &Url) -> Self {
        Self {
            scheme: url.scheme().to_owned(),
            host: url.host_str().filter(|h| !h.is_empty()).map(str::to_owned),
            port: url.port_or_known_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

/// Outcome for one navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationDecision {
    pub target: ContentOrigin,
    pub verdict: Verdict,
}

/// How much of the content origin is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationScope {
    /// Anything on the content origin.
    Origin,
    /// Only paths below the directory holding the entry point.
    ContentDir,
}

pub struct NavigationGuard {
    origin: ContentOrigin,
    root: Option<Url>,
}

impl NavigationGuard {
    pub fn new(content_url: &Url, scope: NavigationScope) -> Self {
        let root = match scope {
            NavigationScope::Origin => None,
            NavigationScope::ContentDir => content_url.join("./").ok(),
        };
        Self {
            origin: ContentOrigin::of(content_url),
            root,
        }
    }

    pub fn review_navigation(&self, target: &Url) -> NavigationDecision {
        let origin = ContentOrigin::of(target);
        let in_scope = origin == self.origin
            && self
                .root
                .as_ref()
                .is_none_or(|root| target.path().starts_with(root.path()));

        let verdict = if in_scope {
            Verdict::Allow
        } else {
            warn!(%target, "Navigation away from the signage content denied");
            Verdict::Deny
        };

        NavigationDecision {
            target: origin,
            verdict,
        }
    }

    /// New windows, tabs and popups are never created.
    pub fn review_auxiliary(&self) -> Verdict {
        debug!("Auxiliary webview request denied");
        Verdict::Deny
    }
}
