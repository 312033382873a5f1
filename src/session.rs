//! Launch flags, host platform identity and the immutable [`SessionConfig`].
//!
//! The session configuration is resolved exactly once at startup, before any
//! other component exists. Resolution cannot fail: unknown arguments are
//! ignored and every flag is a case-sensitive presence check.

use std::fmt;

/// Forces kiosk mode on any platform.
pub const FLAG_KIOSK: &str = "--kiosk";
/// Developer mode: relaxes quit suppression, enables diagnostics and the
/// context menu.
pub const FLAG_DEV: &str = "--dev";
/// Lets quit requests succeed outside developer mode.
pub const FLAG_ALLOW_QUIT: &str = "--allow-quit";

/// Flags present on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchFlags {
    pub kiosk: bool,
    pub dev: bool,
    pub allow_quit: bool,
}

impl LaunchFlags {
    /// Scans the arguments for the known flags. Values, positional arguments
    /// and unknown flags are ignored.
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flags = Self::default();
        for arg in args {
            match arg.as_ref() {
                FLAG_KIOSK => flags.kiosk = true,
                FLAG_DEV => flags.dev = true,
                FLAG_ALLOW_QUIT => flags.allow_quit = true,
                _ => {}
            }
        }
        flags
    }

    /// Flags of the running process (program name skipped).
    pub fn from_env() -> Self {
        Self::parse(std::env::args().skip(1))
    }
}

/// Operating system family of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Os {
    pub fn as_str(self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::MacOs => "macos",
            Os::Windows => "windows",
            Os::Other => std::env::consts::OS,
        }
    }
}

/// Identity of the machine the shell runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPlatform {
    pub os: Os,
    pub arch: &'static str,
}

impl HostPlatform {
    pub fn detect() -> Self {
        let os = match std::env::consts::OS {
            "linux" => Os::Linux,
            "macos" => Os::MacOs,
            "windows" => Os::Windows,
            _ => Os::Other,
        };
        Self {
            os,
            arch: std::env::consts::ARCH,
        }
    }

    /// Signage boards (Raspberry Pi and friends) all run Linux.
    pub fn is_embedded_target(&self) -> bool {
        self.os == Os::Linux
    }

    /// On macOS the process outlives its last surface.
    pub fn quits_when_surfaces_closed(&self) -> bool {
        self.os != Os::MacOs
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.os.as_str(), self.arch)
    }
}

/// Startup configuration shared by reference with every component.
///
/// Never mutated after [`SessionConfig::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub kiosk_mode: bool,
    pub fullscreen: bool,
    /// `false` means no native window chrome.
    pub framed: bool,
    pub dev_mode: bool,
    pub allow_explicit_quit: bool,
    pub platform: HostPlatform,
}

impl SessionConfig {
    pub fn resolve(flags: LaunchFlags, platform: HostPlatform) -> Self {
        Self {
            kiosk_mode: flags.kiosk || platform.is_embedded_target(),
            fullscreen: true,
            framed: false,
            dev_mode: flags.dev,
            allow_explicit_quit: flags.allow_quit,
            platform,
        }
    }
}
