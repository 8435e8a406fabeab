//! Install and startup setup.
//!
//! Both routines are called once when the process starts. `on_installed` is
//! guarded by a marker in the store so it only does its work on the first
//! launch of an install; `on_startup` is idempotent and runs every time.
//! Failures are logged and swallowed.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use crate::error::SetupError;
use crate::storage::KeyValueStore;

pub const INSTALLED_KEY: &str = "installedAt";
pub const PANEL_BEHAVIOR_KEY: &str = "panelBehavior";

/// Host hooks for the panel's surface
pub trait PanelSurface {
    /// Make the panel available persistently
    fn enable(&self) -> Result<(), SetupError>;

    /// Open the panel when the user triggers the app's action
    fn set_open_on_action(&self, open: bool) -> Result<(), SetupError>;
}

/// First-install setup. Returns true when the install work ran.
pub fn on_installed(store: &dyn KeyValueStore, surface: &dyn PanelSurface) -> bool {
    match store.get(INSTALLED_KEY) {
        Ok(Some(_)) => return false,
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "could not read install marker, skipping install setup");
            return false;
        }
    }

    if let Err(e) = surface.enable() {
        tracing::warn!(error = %e, "install setup failed");
        return false;
    }

    let installed_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    if let Err(e) = store.set(INSTALLED_KEY, json!(installed_at)) {
        tracing::warn!(error = %e, "could not record install marker");
    }

    tracing::info!("first launch setup complete");
    true
}

pub fn on_startup(store: &dyn KeyValueStore, surface: &dyn PanelSurface) {
    if let Err(e) = surface.set_open_on_action(true) {
        tracing::warn!(error = %e, "could not configure panel open trigger");
        return;
    }

    if let Err(e) = store.set(PANEL_BEHAVIOR_KEY, json!({ "openPanelOnActionClick": true })) {
        tracing::warn!(error = %e, "could not record panel behavior");
    }
}
