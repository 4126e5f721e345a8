//! Logging facade shared by the pcloud crates
//!
//! Every crate logs through `emit` using the short macros exported here.
//! Output goes to stderr and is controlled by the `PCLOUD_LOG` environment
//! variable:
//!
//! - `PCLOUD_LOG=off` (default) - no logs
//! - `PCLOUD_LOG=error` / `warn` - problems only
//! - `PCLOUD_LOG=info` - transfers and chunk progress
//! - `PCLOUD_LOG=debug` - every remote call

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable consulted by [`init_diagnostics`]
pub const LOG_ENV: &str = "PCLOUD_LOG";

static INIT: Once = Once::new();

/// Minimum level selected by a `PCLOUD_LOG` value.
///
/// `None` means logging stays disabled. Unknown values fall back to `info`.
#[must_use]
pub fn level_from_setting(setting: &str) -> Option<emit::Level> {
    match setting.trim().to_ascii_lowercase().as_str() {
        "off" | "" => None,
        "error" => Some(emit::Level::Error),
        "warn" => Some(emit::Level::Warn),
        "debug" => Some(emit::Level::Debug),
        _ => Some(emit::Level::Info),
    }
}

/// Initialize diagnostics based on the `PCLOUD_LOG` environment variable
///
/// Safe to call more than once; only the first call installs the emitter.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let setting = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());

        let Some(level) = level_from_setting(&setting) else {
            return;
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        // The emitter lives for the rest of the process.
        std::mem::forget(rt);
    });
}

/// Log transfers and state changes users might want to see
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log per-call detail (endpoints, descriptors, byte counts)
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log recoverable problems and best-effort fallbacks
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log failures
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

pub use init_diagnostics as init;
