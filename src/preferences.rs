//! Servo engine preferences for an unattended signage session.
//!
//! Builds a [`servo::Preferences`] struct from:
//! - the `[servo]` section of the deployment config (threads, cache, UA)
//! - the session (devtools server only in developer mode)
//! - the one-shot [`PlatformTuning`] of the embedded target

use tracing::info;

use crate::config::ServoConfig;
use crate::platform::PlatformTuning;
use crate::session::SessionConfig;

/// Builds Servo `Preferences` tuned for the current machine.
#[allow(clippy::field_reassign_with_default)]
pub fn build_servo_preferences(
    servo_config: &ServoConfig,
    session: &SessionConfig,
    tuning: &PlatformTuning,
) -> servo::Preferences {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get() as i64)
        .unwrap_or(4);

    let mut prefs = servo::Preferences::default();

    // ── Embedded target ───────────────────────────────────────────────────
    // Applied first: explicit `[servo]` settings below take precedence.
    tuning.apply(&mut prefs);

    // ── Performance Tuning ────────────────────────────────────────────────
    // Small boards have 4 cores; keep pools proportional.
    prefs.layout_threads = match servo_config.layout_threads {
        0 => cpus.min(8),
        n => n,
    };
    prefs.threadpools_async_runtime_workers_max = (cpus * 2).min(16);
    prefs.threadpools_image_cache_workers_max = cpus.min(8);
    prefs.threadpools_webrender_workers_max = (cpus / 2).clamp(2, 8);
    prefs.threadpools_resource_workers_max = cpus.min(8);
    prefs.network_http_cache_size = servo_config.cache_size;
    if prefs.gfx_precache_shaders && !servo_config.precache_shaders {
        info!("Shader pre-caching disabled by configuration, overriding platform tuning");
    }
    prefs.gfx_precache_shaders = servo_config.precache_shaders;

    if !servo_config.user_agent.is_empty() {
        prefs.user_agent = servo_config.user_agent.clone();
    }

    // ── Diagnostics ───────────────────────────────────────────────────────
    prefs.devtools_server_enabled = session.dev_mode;

    info!(
        cpus,
        layout_threads = prefs.layout_threads,
        cache_size = prefs.network_http_cache_size,
        devtools = prefs.devtools_server_enabled,
        "Servo preferences configured"
    );

    prefs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{HostPlatform, LaunchFlags, Os};

    fn session(os: Os, flags: &[&str]) -> SessionConfig {
        SessionConfig::resolve(LaunchFlags::parse(flags), HostPlatform { os, arch: "aarch64" })
    }

    #[test]
    fn test_explicit_layout_threads_win() {
        let servo_config = ServoConfig {
            layout_threads: 3,
            ..ServoConfig::default()
        };
        let s = session(Os::MacOs, &[]);
        let prefs =
            build_servo_preferences(&servo_config, &s, &PlatformTuning::for_platform(&s.platform));
        assert_eq!(prefs.layout_threads, 3);
        assert_eq!(prefs.network_http_cache_size, 50_000);
    }

    #[test]
    fn test_devtools_only_in_dev_mode() {
        let servo_config = ServoConfig::default();
        for (flags, expected) in [(&[][..], false), (&["--dev"][..], true)] {
            let s = session(Os::Windows, flags);
            let prefs = build_servo_preferences(
                &servo_config,
                &s,
                &PlatformTuning::for_platform(&s.platform),
            );
            assert_eq!(prefs.devtools_server_enabled, expected);
        }
    }

    #[test]
    fn test_custom_user_agent() {
        let servo_config = ServoConfig {
            user_agent: "SignageShell/1.0".to_owned(),
            ..ServoConfig::default()
        };
        let s = session(Os::Linux, &[]);
        let prefs =
            build_servo_preferences(&servo_config, &s, &PlatformTuning::for_platform(&s.platform));
        assert_eq!(prefs.user_agent, "SignageShell/1.0");
        assert!(!prefs.network_enforce_tls_enabled);
    }

    #[test]
    fn test_config_precache_overrides_platform_tuning() {
        let servo_config = ServoConfig {
            precache_shaders: false,
            ..ServoConfig::default()
        };
        let s = session(Os::Linux, &[]);
        let tuning = PlatformTuning::for_platform(&s.platform);
        assert!(tuning.contains(crate::platform::TuningSwitch::GpuRasterization));

        let prefs = build_servo_preferences(&servo_config, &s, &tuning);
        assert!(!prefs.gfx_precache_shaders);
    }
}
