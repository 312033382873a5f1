//! Display manager: sole owner and mutator of the signage surface state.
//!
//! The manager never touches winit directly. Each transition returns a value
//! (a [`SurfaceSpec`], a boolean, a flag asking for diagnostics) that the host
//! turns into window operations, which keeps the state machine testable
//! without a display.
//!
//! ```text
//! Uninitialized ──create()──▶ Created ──present_when_ready()──▶ Shown
//!                                 │                              │
//!                                 └──────────destroy()───────────┴──▶ Destroyed
//! ```
//!
//! `Destroyed` is terminal for a [`WindowState`]; `create()` after it starts
//! over with a brand-new state.

use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::session::SessionConfig;

/// Lifecycle of the single rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Created,
    Shown,
    Destroyed,
}

/// Mutable surface state, one instance per surface.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowState {
    pub lifecycle: Lifecycle,
    pub fullscreen_active: bool,
    pub focused: bool,
    /// Last location the content reported as committed.
    pub location: Option<Url>,
}

impl WindowState {
    fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Uninitialized,
            fullscreen_active: false,
            focused: false,
            location: None,
        }
    }

    fn is_live(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Created | Lifecycle::Shown)
    }
}

/// Usable area of the primary screen, in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkArea {
    pub width: u32,
    pub height: u32,
}

/// Everything the host needs to build the native window.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSpec {
    pub width: u32,
    pub height: u32,
    pub framed: bool,
    pub fullscreen: bool,
    pub kiosk: bool,
    /// Surfaces always start hidden.
    pub visible: bool,
    /// RGBA fill painted until the content is ready.
    pub background: [f32; 4],
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DisplayError {
    #[error("a signage surface already exists")]
    SurfaceExists,
    #[error("cannot go from {from:?} to {to:?}")]
    InvalidTransition { from: Lifecycle, to: Lifecycle },
}

pub struct DisplayManager {
    config: Rc<SessionConfig>,
    background: [f32; 4],
    state: WindowState,
}

impl DisplayManager {
    pub fn new(config: Rc<SessionConfig>, background: [f32; 4]) -> Self {
        Self {
            config,
            background,
            state: WindowState::new(),
        }
    }

    pub fn state(&self) -> &WindowState {
        &self.state
    }

    pub fn has_surface(&self) -> bool {
        self.state.is_live()
    }

    /// `Uninitialized → Created`, or `Destroyed → Created` on a fresh state.
    pub fn create(&mut self, work_area: WorkArea) -> Result<SurfaceSpec, DisplayError> {
        match self.state.lifecycle {
            Lifecycle::Created | Lifecycle::Shown => return Err(DisplayError::SurfaceExists),
            Lifecycle::Destroyed => self.state = WindowState::new(),
            Lifecycle::Uninitialized => {}
        }

        self.state.lifecycle = Lifecycle::Created;
        self.state.fullscreen_active = self.config.fullscreen;

        info!(
            width = work_area.width,
            height = work_area.height,
            kiosk = self.config.kiosk_mode,
            "Signage surface created (hidden)"
        );

        Ok(SurfaceSpec {
            width: work_area.width,
            height: work_area.height,
            framed: self.config.framed,
            fullscreen: self.config.fullscreen,
            kiosk: self.config.kiosk_mode,
            visible: false,
            background: self.background,
        })
    }

    /// `Created → Shown`. Returns `true` when a diagnostics view should be
    /// opened along with the surface.
    pub fn present_when_ready(&mut self) -> Result<bool, DisplayError> {
        if self.state.lifecycle != Lifecycle::Created {
            return Err(DisplayError::InvalidTransition {
                from: self.state.lifecycle,
                to: Lifecycle::Shown,
            });
        }
        self.state.lifecycle = Lifecycle::Shown;
        self.state.focused = true;
        info!("Content ready, surface shown and focused");
        Ok(self.config.dev_mode)
    }

    /// Flips fullscreen and returns the new value. Without a live surface
    /// nothing changes and `false` is returned.
    pub fn toggle_fullscreen(&mut self) -> bool {
        if !self.state.is_live() {
            debug!("toggle_fullscreen without a surface");
            return false;
        }
        self.state.fullscreen_active = !self.state.fullscreen_active;
        self.state.fullscreen_active
    }

    /// Records the location the content committed to.
    pub fn set_location(&mut self, url: Url) {
        if self.state.is_live() {
            self.state.location = Some(url);
        }
    }

    /// The host closed the surface. Returns `false` if there was none.
    pub fn destroy(&mut self) -> bool {
        if !self.state.is_live() {
            return false;
        }
        self.state.lifecycle = Lifecycle::Destroyed;
        self.state.focused = false;
        info!("Signage surface destroyed");
        true
    }
}
