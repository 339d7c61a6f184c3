//! Test utilities for tabfs.
//!
//! Provides [`FakeBrowser`], an in-memory implementation of the kernel's
//! `Browser` capability trait with scripted state, plus request builders
//! and response accessors for driving the engine end to end in tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use tabfs_kernel::browser::{Browser, DebuggerEvent, Extension, Tab, Window};
use tabfs_kernel::{BrowserError, BrowserResult};

/// A page behind a tab: its text and form inputs.
#[derive(Debug, Default, Clone)]
struct Page {
    text: String,
    inputs: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    tabs: Vec<Tab>,
    windows: Vec<Window>,
    extensions: Vec<Extension>,
    pages: HashMap<i64, Page>,
    eval_results: HashMap<String, Value>,
    script_sources: HashMap<(i64, String), String>,
    resources: HashMap<i64, Vec<(String, String, bool)>>,
    captures: HashMap<i64, Vec<u8>>,
    attached: HashSet<i64>,
    conflicted: HashSet<i64>,
    attach_attempts: Vec<i64>,
    commands: Vec<String>,
    reloads: Vec<String>,
    next_tab_id: i64,
}

/// An in-memory browser with scripted state.
pub struct FakeBrowser {
    state: Mutex<State>,
    events: broadcast::Sender<DebuggerEvent>,
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBrowser {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(State {
                next_tab_id: 1000,
                ..State::default()
            }),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Scripting the fixture ---

    pub fn add_window(&self, id: i64, focused: bool) {
        self.lock().windows.push(Window {
            id,
            focused,
            tab_ids: Vec::new(),
        });
    }

    pub fn add_tab(&self, id: i64, window_id: i64, title: &str, url: &str) {
        let mut state = self.lock();
        let active = !state.tabs.iter().any(|t| t.window_id == window_id);
        state.tabs.push(Tab {
            id,
            window_id,
            title: title.to_string(),
            url: url.to_string(),
            active,
        });
        if let Some(w) = state.windows.iter_mut().find(|w| w.id == window_id) {
            w.tab_ids.push(id);
        }
        state.pages.entry(id).or_default();
    }

    pub fn add_extension(&self, id: &str, name: &str, enabled: bool, may_disable: bool) {
        self.lock().extensions.push(Extension {
            id: id.to_string(),
            name: name.to_string(),
            enabled,
            may_disable,
        });
    }

    pub fn set_page_text(&self, tab_id: i64, text: &str) {
        self.lock().pages.entry(tab_id).or_default().text = text.to_string();
    }

    pub fn set_input(&self, tab_id: i64, input_id: &str, value: &str) {
        self.lock()
            .pages
            .entry(tab_id)
            .or_default()
            .inputs
            .insert(input_id.to_string(), value.to_string());
    }

    /// Fix the value `eval_in_tab` returns for an exact code string.
    /// Unscripted code evaluates to `null`.
    pub fn stub_eval(&self, code: &str, value: Value) {
        self.lock().eval_results.insert(code.to_string(), value);
    }

    pub fn add_script_source(&self, tab_id: i64, script_id: &str, source: &str) {
        self.lock()
            .script_sources
            .insert((tab_id, script_id.to_string()), source.to_string());
    }

    pub fn add_resource(&self, tab_id: i64, url: &str, content: &str, base64_encoded: bool) {
        self.lock().resources.entry(tab_id).or_default().push((
            url.to_string(),
            content.to_string(),
            base64_encoded,
        ));
    }

    pub fn set_capture(&self, window_id: i64, png: &[u8]) {
        self.lock().captures.insert(window_id, png.to_vec());
    }

    /// Make the next attach to this tab report a debugger conflict until a
    /// detach clears it.
    pub fn set_attach_conflict(&self, tab_id: i64) {
        self.lock().conflicted.insert(tab_id);
    }

    /// Push a debugger event as if the browser had emitted it.
    pub fn emit(&self, event: DebuggerEvent) {
        let _ = self.events.send(event);
    }

    // --- Observing effects ---

    pub fn tab_url(&self, tab_id: i64) -> Option<String> {
        self.lock()
            .tabs
            .iter()
            .find(|t| t.id == tab_id)
            .map(|t| t.url.clone())
    }

    pub fn tab_ids(&self) -> Vec<i64> {
        self.lock().tabs.iter().map(|t| t.id).collect()
    }

    pub fn input(&self, tab_id: i64, input_id: &str) -> Option<String> {
        self.lock()
            .pages
            .get(&tab_id)
            .and_then(|p| p.inputs.get(input_id))
            .cloned()
    }

    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn reloads(&self) -> Vec<String> {
        self.lock().reloads.clone()
    }

    pub fn attach_attempts(&self) -> Vec<i64> {
        self.lock().attach_attempts.clone()
    }

    pub fn script_source(&self, tab_id: i64, script_id: &str) -> Option<String> {
        self.lock()
            .script_sources
            .get(&(tab_id, script_id.to_string()))
            .cloned()
    }

    pub fn extension_enabled(&self, id: &str) -> Option<bool> {
        self.lock()
            .extensions
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.enabled)
    }

    pub fn focused_window(&self) -> Option<i64> {
        self.lock().windows.iter().find(|w| w.focused).map(|w| w.id)
    }

    fn find_tab(state: &State, tab_id: i64) -> BrowserResult<Tab> {
        state
            .tabs
            .iter()
            .find(|t| t.id == tab_id)
            .cloned()
            .ok_or_else(|| BrowserError::NotFound(format!("tab {tab_id}")))
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn tabs(&self) -> BrowserResult<Vec<Tab>> {
        Ok(self.lock().tabs.clone())
    }

    async fn tab(&self, tab_id: i64) -> BrowserResult<Tab> {
        Self::find_tab(&self.lock(), tab_id)
    }

    async fn create_tab(&self, url: &str) -> BrowserResult<Tab> {
        let mut state = self.lock();
        let id = state.next_tab_id;
        state.next_tab_id += 1;
        let window_id = state.windows.first().map(|w| w.id).unwrap_or(1);
        let tab = Tab {
            id,
            window_id,
            title: String::new(),
            url: url.to_string(),
            active: false,
        };
        state.tabs.push(tab.clone());
        state.pages.entry(id).or_default();
        Ok(tab)
    }

    async fn close_tab(&self, tab_id: i64) -> BrowserResult<()> {
        let mut state = self.lock();
        Self::find_tab(&state, tab_id)?;
        state.tabs.retain(|t| t.id != tab_id);
        for w in &mut state.windows {
            w.tab_ids.retain(|id| *id != tab_id);
        }
        Ok(())
    }

    async fn navigate_tab(&self, tab_id: i64, url: &str) -> BrowserResult<()> {
        let mut state = self.lock();
        match state.tabs.iter_mut().find(|t| t.id == tab_id) {
            Some(tab) => {
                tab.url = url.to_string();
                Ok(())
            }
            None => Err(BrowserError::NotFound(format!("tab {tab_id}"))),
        }
    }

    async fn reload_tab(&self, tab_id: i64) -> BrowserResult<()> {
        let mut state = self.lock();
        Self::find_tab(&state, tab_id)?;
        state.commands.push(format!("reload:{tab_id}"));
        Ok(())
    }

    async fn activate_tab(&self, tab_id: i64) -> BrowserResult<()> {
        let mut state = self.lock();
        let window_id = Self::find_tab(&state, tab_id)?.window_id;
        for t in &mut state.tabs {
            if t.window_id == window_id {
                t.active = t.id == tab_id;
            }
        }
        state.commands.push(format!("activate:{tab_id}"));
        Ok(())
    }

    async fn go_back(&self, tab_id: i64) -> BrowserResult<()> {
        let mut state = self.lock();
        Self::find_tab(&state, tab_id)?;
        state.commands.push(format!("goBack:{tab_id}"));
        Ok(())
    }

    async fn go_forward(&self, tab_id: i64) -> BrowserResult<()> {
        let mut state = self.lock();
        Self::find_tab(&state, tab_id)?;
        state.commands.push(format!("goForward:{tab_id}"));
        Ok(())
    }

    async fn eval_in_tab(&self, tab_id: i64, code: &str) -> BrowserResult<Value> {
        let state = self.lock();
        Self::find_tab(&state, tab_id)?;
        Ok(state.eval_results.get(code).cloned().unwrap_or(Value::Null))
    }

    async fn page_text(&self, tab_id: i64) -> BrowserResult<String> {
        let state = self.lock();
        Self::find_tab(&state, tab_id)?;
        Ok(state.pages.get(&tab_id).map(|p| p.text.clone()).unwrap_or_default())
    }

    async fn input_ids(&self, tab_id: i64) -> BrowserResult<Vec<String>> {
        let state = self.lock();
        Self::find_tab(&state, tab_id)?;
        let mut ids: Vec<String> = state
            .pages
            .get(&tab_id)
            .map(|p| p.inputs.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    async fn input_value(&self, tab_id: i64, input_id: &str) -> BrowserResult<String> {
        let state = self.lock();
        Self::find_tab(&state, tab_id)?;
        state
            .pages
            .get(&tab_id)
            .and_then(|p| p.inputs.get(input_id))
            .cloned()
            .ok_or_else(|| BrowserError::NotFound(format!("input {input_id}")))
    }

    async fn set_input_value(
        &self,
        tab_id: i64,
        input_id: &str,
        value: &str,
    ) -> BrowserResult<()> {
        let mut state = self.lock();
        Self::find_tab(&state, tab_id)?;
        match state
            .pages
            .get_mut(&tab_id)
            .and_then(|p| p.inputs.get_mut(input_id))
        {
            Some(stored) => {
                *stored = value.to_string();
                Ok(())
            }
            None => Err(BrowserError::NotFound(format!("input {input_id}"))),
        }
    }

    async fn windows(&self) -> BrowserResult<Vec<Window>> {
        Ok(self.lock().windows.clone())
    }

    async fn window(&self, window_id: i64) -> BrowserResult<Window> {
        self.lock()
            .windows
            .iter()
            .find(|w| w.id == window_id)
            .cloned()
            .ok_or_else(|| BrowserError::NotFound(format!("window {window_id}")))
    }

    async fn focus_window(&self, window_id: i64) -> BrowserResult<()> {
        let mut state = self.lock();
        if !state.windows.iter().any(|w| w.id == window_id) {
            return Err(BrowserError::NotFound(format!("window {window_id}")));
        }
        for w in &mut state.windows {
            w.focused = w.id == window_id;
        }
        Ok(())
    }

    async fn last_focused_window(&self) -> BrowserResult<Window> {
        self.lock()
            .windows
            .iter()
            .find(|w| w.focused)
            .cloned()
            .ok_or_else(|| BrowserError::NotFound("focused window".to_string()))
    }

    async fn capture_window(&self, window_id: i64) -> BrowserResult<Vec<u8>> {
        let state = self.lock();
        if !state.windows.iter().any(|w| w.id == window_id) {
            return Err(BrowserError::NotFound(format!("window {window_id}")));
        }
        Ok(state
            .captures
            .get(&window_id)
            .cloned()
            .unwrap_or_else(|| b"\x89PNG\r\n\x1a\n".to_vec()))
    }

    async fn extensions(&self) -> BrowserResult<Vec<Extension>> {
        Ok(self.lock().extensions.clone())
    }

    async fn set_extension_enabled(&self, id: &str, enabled: bool) -> BrowserResult<()> {
        let mut state = self.lock();
        match state.extensions.iter_mut().find(|e| e.id == id) {
            Some(ext) => {
                ext.enabled = enabled;
                Ok(())
            }
            None => Err(BrowserError::NotFound(format!("extension {id}"))),
        }
    }

    async fn debugger_attach(&self, tab_id: i64) -> BrowserResult<()> {
        let mut state = self.lock();
        state.attach_attempts.push(tab_id);
        if state.conflicted.contains(&tab_id) {
            return Err(BrowserError::DebuggerConflict(tab_id));
        }
        state.attached.insert(tab_id);
        Ok(())
    }

    async fn debugger_detach(&self, tab_id: i64) -> BrowserResult<()> {
        let mut state = self.lock();
        state.conflicted.remove(&tab_id);
        state.attached.remove(&tab_id);
        Ok(())
    }

    async fn debugger_command(
        &self,
        tab_id: i64,
        method: &str,
        params: Value,
    ) -> BrowserResult<Value> {
        let mut state = self.lock();
        match method {
            "Debugger.enable" | "Page.enable" => Ok(json!({})),
            "Debugger.getScriptSource" => {
                let script_id = params["scriptId"].as_str().unwrap_or_default().to_string();
                state
                    .script_sources
                    .get(&(tab_id, script_id.clone()))
                    .map(|src| json!({ "scriptSource": src }))
                    .ok_or_else(|| BrowserError::Api(format!("unknown script {script_id}")))
            }
            "Debugger.setScriptSource" => {
                let script_id = params["scriptId"].as_str().unwrap_or_default().to_string();
                let source = params["scriptSource"].as_str().unwrap_or_default().to_string();
                state.script_sources.insert((tab_id, script_id), source);
                Ok(json!({}))
            }
            "Page.getResourceTree" => {
                let resources: Vec<Value> = state
                    .resources
                    .get(&tab_id)
                    .map(|rs| rs.iter().map(|(url, _, _)| json!({ "url": url })).collect())
                    .unwrap_or_default();
                Ok(json!({
                    "frameTree": {
                        "frame": { "id": format!("frame-{tab_id}") },
                        "resources": resources,
                    }
                }))
            }
            "Page.getResourceContent" => {
                let url = params["url"].as_str().unwrap_or_default();
                state
                    .resources
                    .get(&tab_id)
                    .and_then(|rs| rs.iter().find(|(u, _, _)| u == url))
                    .map(|(_, content, b64)| {
                        json!({ "content": content, "base64Encoded": b64 })
                    })
                    .ok_or_else(|| BrowserError::Api(format!("unknown resource {url}")))
            }
            other => Err(BrowserError::Api(format!("unscripted method {other}"))),
        }
    }

    fn debugger_events(&self) -> broadcast::Receiver<DebuggerEvent> {
        self.events.subscribe()
    }

    async fn reload_background(&self, source: &str) -> BrowserResult<()> {
        self.lock().reloads.push(source.to_string());
        Ok(())
    }
}

/// Request builders producing the wire-level JSON the host adapter sends.
pub mod req {
    use super::*;

    fn base(id: u64, op: &str, path: &str) -> Value {
        json!({ "id": id, "op": op, "path": path })
    }

    pub fn getattr(id: u64, path: &str) -> Value {
        base(id, "getattr", path)
    }

    pub fn readdir(id: u64, path: &str) -> Value {
        let mut v = base(id, "readdir", path);
        v["offset"] = json!(0);
        v
    }

    pub fn open(id: u64, path: &str) -> Value {
        let mut v = base(id, "open", path);
        v["flags"] = json!(0);
        v
    }

    pub fn read(id: u64, path: &str, fh: u64, offset: u64, size: u64) -> Value {
        let mut v = base(id, "read", path);
        v["fh"] = json!(fh);
        v["offset"] = json!(offset);
        v["size"] = json!(size);
        v
    }

    pub fn write(id: u64, path: &str, fh: u64, offset: u64, data: &[u8]) -> Value {
        let mut v = base(id, "write", path);
        v["fh"] = json!(fh);
        v["offset"] = json!(offset);
        v["buf"] = json!(BASE64.encode(data));
        v
    }

    pub fn release(id: u64, path: &str, fh: u64) -> Value {
        let mut v = base(id, "release", path);
        v["fh"] = json!(fh);
        v
    }

    pub fn truncate(id: u64, path: &str, size: u64) -> Value {
        let mut v = base(id, "truncate", path);
        v["size"] = json!(size);
        v
    }

    pub fn readlink(id: u64, path: &str) -> Value {
        base(id, "readlink", path)
    }

    pub fn unlink(id: u64, path: &str) -> Value {
        base(id, "unlink", path)
    }

    pub fn mknod(id: u64, path: &str) -> Value {
        let mut v = base(id, "mknod", path);
        v["mode"] = json!(0o100644);
        v
    }

    pub fn mkdir(id: u64, path: &str) -> Value {
        let mut v = base(id, "mkdir", path);
        v["mode"] = json!(0o755);
        v
    }
}

/// Decode a response's base64 `buf` field.
pub fn decoded_buf(resp: &Value) -> Vec<u8> {
    let b64 = resp["buf"].as_str().unwrap_or_else(|| panic!("no buf in {resp}"));
    BASE64.decode(b64).expect("valid base64 buf")
}

/// A response's `entries` list as strings.
pub fn entries(resp: &Value) -> Vec<String> {
    resp["entries"]
        .as_array()
        .unwrap_or_else(|| panic!("no entries in {resp}"))
        .iter()
        .map(|e| e.as_str().expect("string entry").to_string())
        .collect()
}

/// A response's `fh` field.
pub fn handle(resp: &Value) -> u64 {
    resp["fh"].as_u64().unwrap_or_else(|| panic!("no fh in {resp}"))
}
