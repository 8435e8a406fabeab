//! Terminal implementations of the host hooks the core library asks for.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use pagechat_core::error::{SetupError, TabQueryError};
use pagechat_core::{Config, PanelSurface, TabQuery};

/// The page the panel is pointed at. The terminal has no browser tabs, so
/// the "active tab" is whatever URL the user last set.
#[derive(Clone, Default)]
pub struct ActiveTab {
    url: Arc<RwLock<Option<String>>>,
}

impl ActiveTab {
    pub fn new(url: Option<String>) -> Self {
        Self { url: Arc::new(RwLock::new(url)) }
    }

    pub fn set(&self, url: Option<String>) {
        match self.url.write() {
            Ok(mut current) => *current = url,
            Err(poisoned) => *poisoned.into_inner() = url,
        }
    }

    pub fn get(&self) -> Option<String> {
        self.url.read().ok().and_then(|url| url.clone())
    }
}

#[async_trait]
impl TabQuery for ActiveTab {
    async fn active_tab_url(&self) -> Result<Option<String>, TabQueryError> {
        self.url
            .read()
            .map(|url| url.clone())
            .map_err(|e| TabQueryError(e.to_string()))
    }
}

/// Checks a user-entered page address. The backend only accepts http(s).
pub fn validate_page_url(url: &str) -> Result<String, String> {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.to_string())
    } else {
        Err(format!("Page URL must start with http:// or https:// (got '{}')", url))
    }
}

/// Panel surface for the terminal: the persistent part is the config file
/// the user can edit; the panel opens whenever `pagechat` runs without a
/// subcommand.
pub struct TerminalSurface;

impl PanelSurface for TerminalSurface {
    fn enable(&self) -> Result<(), SetupError> {
        match Config::write_default_if_missing() {
            Ok(true) => {
                tracing::info!("wrote default config file");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => Err(SetupError::Surface(e.to_string())),
        }
    }

    fn set_open_on_action(&self, open: bool) -> Result<(), SetupError> {
        tracing::debug!(open, "panel opens on launch");
        Ok(())
    }
}
