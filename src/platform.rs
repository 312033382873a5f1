//! One-shot engine tuning for the embedded target.
//!
//! The switch set is decided once from the detected platform and folded into
//! the engine [`servo::Preferences`] before Servo is built. Nothing here can
//! be changed while the session runs.

use tracing::{debug, info};

use crate::session::HostPlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningSwitch {
    GpuRasterization,
    ZeroCopy,
    IgnoreGpuBlocklist,
    /// Shared-memory mode is unstable on small boards.
    DisableDevShmUsage,
    /// Servo cannot lift the same-origin policy; the only relaxation applied
    /// is turning off TLS enforcement, so plain-http assets on the local
    /// network still load.
    DisableWebSecurity,
}

impl TuningSwitch {
    pub fn name(self) -> &'static str {
        match self {
            TuningSwitch::GpuRasterization => "enable-gpu-rasterization",
            TuningSwitch::ZeroCopy => "enable-zero-copy",
            TuningSwitch::IgnoreGpuBlocklist => "ignore-gpu-blocklist",
            TuningSwitch::DisableDevShmUsage => "disable-dev-shm-usage",
            TuningSwitch::DisableWebSecurity => "disable-web-security",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformTuning {
    switches: Vec<TuningSwitch>,
}

impl PlatformTuning {
    pub fn for_platform(platform: &HostPlatform) -> Self {
        if !platform.is_embedded_target() {
            return Self::default();
        }
        Self {
            switches: vec![
                TuningSwitch::GpuRasterization,
                TuningSwitch::ZeroCopy,
                TuningSwitch::IgnoreGpuBlocklist,
                TuningSwitch::DisableDevShmUsage,
                TuningSwitch::DisableWebSecurity,
            ],
        }
    }

    pub fn switches(&self) -> &[TuningSwitch] {
        &self.switches
    }

    pub fn contains(&self, switch: TuningSwitch) -> bool {
        self.switches.contains(&switch)
    }

    /// Folds the switches into the engine preferences. Runs before the
    /// deployment config is applied, which can override any of them.
    pub fn apply(&self, prefs: &mut servo::Preferences) {
        for &switch in &self.switches {
            match switch {
                TuningSwitch::GpuRasterization => prefs.gfx_precache_shaders = true,
                // Not a cross-origin switch: only stops requiring TLS for
                // non-local hosts.
                TuningSwitch::DisableWebSecurity => prefs.network_enforce_tls_enabled = false,
                // WebRender already rasterizes on the GPU and uploads without
                // an extra copy; Servo has no blocklist or /dev/shm switch.
                TuningSwitch::ZeroCopy
                | TuningSwitch::IgnoreGpuBlocklist
                | TuningSwitch::DisableDevShmUsage => {
                    debug!(switch = switch.name(), "No engine equivalent");
                }
            }
        }
        if !self.switches.is_empty() {
            let names: Vec<&str> = self.switches.iter().map(|s| s.name()).collect();
            info!(switches = ?names, "Embedded platform tuning applied");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Os;

    #[test]
    fn test_linux_gets_full_switch_set() {
        let tuning = PlatformTuning::for_platform(&HostPlatform {
            os: Os::Linux,
            arch: "aarch64",
        });
        assert_eq!(tuning.switches().len(), 5);
        assert!(tuning.contains(TuningSwitch::DisableDevShmUsage));
        assert!(tuning.contains(TuningSwitch::DisableWebSecurity));
    }

    #[test]
    fn test_desktop_platforms_untouched() {
        for os in [Os::MacOs, Os::Windows, Os::Other] {
            let tuning = PlatformTuning::for_platform(&HostPlatform { os, arch: "x86_64" });
            assert!(tuning.switches().is_empty());
        }
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_apply_relaxes_tls_and_precaches() {
        let tuning = PlatformTuning::for_platform(&HostPlatform {
            os: Os::Linux,
            arch: "armv7",
        });
        let mut prefs = servo::Preferences::default();
        prefs.gfx_precache_shaders = false;
        prefs.network_enforce_tls_enabled = true;
        tuning.apply(&mut prefs);
        assert!(prefs.gfx_precache_shaders);
        assert!(!prefs.network_enforce_tls_enabled);
    }
}
