//! One-time process setup
//!
//! Runs before any provider is built. Installing the rustls crypto provider
//! is process-global: kube and reqwest both link rustls, and rustls panics on
//! first handshake when it cannot pick a provider on its own. The kube-runtime
//! watcher also reports every stream error on its own; controllers report
//! their failures themselves, so that reporting is silenced here.

use std::sync::Once;

use tracing::debug;

static INSTALL: Once = Once::new();

/// Log filter directive that silences kube-runtime's own error reporting
pub const SUPPRESS_RUNTIME_ERRORS: &str = "kube_runtime::watcher=off";

/// Perform process-wide setup. Safe to call any number of times.
pub fn install() {
    INSTALL.call_once(|| {
        // Err means another provider was installed first, which is fine.
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider already installed");
        }
    });
}

/// Whether [`install`] has run in this process
pub fn is_installed() -> bool {
    INSTALL.is_completed()
}

/// Filter directives to add to the log filter
///
/// Empty until [`install`] has run.
pub fn log_directives() -> Vec<&'static str> {
    if is_installed() {
        vec![SUPPRESS_RUNTIME_ERRORS]
    } else {
        Vec::new()
    }
}
