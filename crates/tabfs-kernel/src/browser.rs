//! The browser-capability surface route handlers call.
//!
//! The engine treats the browser as an opaque set of async capabilities
//! behind this trait. A concrete adapter (extension messaging, CDP, or a
//! fake for tests) implements it; handlers hold an `Arc<dyn Browser>` and
//! surface failures as I/O errors unless they have a specific translation.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::errno::BrowserResult;

/// A browser tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub id: i64,
    pub window_id: i64,
    pub title: String,
    pub url: String,
    pub active: bool,
}

/// A browser window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub id: i64,
    pub focused: bool,
    pub tab_ids: Vec<i64>,
}

/// An installed extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// Whether the browser allows toggling this extension.
    pub may_disable: bool,
}

/// A script known to the debugger for some tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInfo {
    pub script_id: String,
    pub url: String,
}

/// Debug-protocol notifications the engine tracks per tab.
#[derive(Debug, Clone)]
pub enum DebuggerEvent {
    /// The tab's top frame started loading; its script map is stale.
    FrameStartedLoading { tab_id: i64 },
    /// A script was parsed and can be fetched by id.
    ScriptParsed { tab_id: i64, script: ScriptInfo },
}

/// Async browser capabilities.
///
/// Each method may suspend; between suspensions no handler observes
/// intermediate state of the engine's shared tables.
#[async_trait]
pub trait Browser: Send + Sync {
    // Tabs.
    async fn tabs(&self) -> BrowserResult<Vec<Tab>>;
    async fn tab(&self, tab_id: i64) -> BrowserResult<Tab>;
    async fn create_tab(&self, url: &str) -> BrowserResult<Tab>;
    async fn close_tab(&self, tab_id: i64) -> BrowserResult<()>;
    async fn navigate_tab(&self, tab_id: i64, url: &str) -> BrowserResult<()>;
    async fn reload_tab(&self, tab_id: i64) -> BrowserResult<()>;
    async fn activate_tab(&self, tab_id: i64) -> BrowserResult<()>;
    async fn go_back(&self, tab_id: i64) -> BrowserResult<()>;
    async fn go_forward(&self, tab_id: i64) -> BrowserResult<()>;

    // Injected-script capabilities.
    async fn eval_in_tab(&self, tab_id: i64, code: &str) -> BrowserResult<Value>;
    async fn page_text(&self, tab_id: i64) -> BrowserResult<String>;
    async fn input_ids(&self, tab_id: i64) -> BrowserResult<Vec<String>>;
    async fn input_value(&self, tab_id: i64, input_id: &str) -> BrowserResult<String>;
    async fn set_input_value(&self, tab_id: i64, input_id: &str, value: &str)
        -> BrowserResult<()>;

    // Windows.
    async fn windows(&self) -> BrowserResult<Vec<Window>>;
    async fn window(&self, window_id: i64) -> BrowserResult<Window>;
    async fn focus_window(&self, window_id: i64) -> BrowserResult<()>;
    async fn last_focused_window(&self) -> BrowserResult<Window>;
    /// PNG capture of the window's visible tab.
    async fn capture_window(&self, window_id: i64) -> BrowserResult<Vec<u8>>;

    // Extensions.
    async fn extensions(&self) -> BrowserResult<Vec<Extension>>;
    async fn set_extension_enabled(&self, id: &str, enabled: bool) -> BrowserResult<()>;

    // Debugger.
    async fn debugger_attach(&self, tab_id: i64) -> BrowserResult<()>;
    async fn debugger_detach(&self, tab_id: i64) -> BrowserResult<()>;
    async fn debugger_command(
        &self,
        tab_id: i64,
        method: &str,
        params: Value,
    ) -> BrowserResult<Value>;
    /// Subscribe to debugger notifications. Events only flow for tabs with
    /// an active attachment.
    fn debugger_events(&self) -> broadcast::Receiver<DebuggerEvent>;

    // Runtime.
    /// Evaluate replacement engine source in place.
    async fn reload_background(&self, source: &str) -> BrowserResult<()>;
}

/// Attach the debugger to a tab, stealing the attachment if another
/// debugger already holds it.
pub async fn attach_debugger(browser: &dyn Browser, tab_id: i64) -> BrowserResult<()> {
    match browser.debugger_attach(tab_id).await {
        Err(crate::errno::BrowserError::DebuggerConflict(_)) => {
            browser.debugger_detach(tab_id).await?;
            browser.debugger_attach(tab_id).await
        }
        other => other,
    }
}
