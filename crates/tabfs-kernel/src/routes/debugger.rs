//! Debug-protocol routes: script sources and frame resources per tab.
//!
//! The script listing is driven by a per-tab map from script id to
//! metadata, maintained from debugger notifications: a frame starting to
//! load clears the tab's map, a parsed script extends it. Fetch and push of
//! script sources go through `Debugger.getScriptSource` /
//! `Debugger.setScriptSource`; frame resources go through the `Page`
//! domain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::browser::{attach_debugger, Browser, DebuggerEvent, ScriptInfo};
use crate::contents::Contents;
use crate::errno::{BrowserResult, FsError, FsResult};
use crate::route::Route;
use crate::sanitize::sanitize;
use crate::wire::{Op, Reply};

use super::CatalogState;

/// Scripts known to the debugger, per tab.
#[derive(Debug, Default)]
pub(crate) struct ScriptMap {
    tabs: Mutex<HashMap<i64, HashMap<String, ScriptInfo>>>,
}

impl ScriptMap {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, HashMap<String, ScriptInfo>>> {
        self.tabs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn clear_tab(&self, tab_id: i64) {
        self.lock().remove(&tab_id);
    }

    pub(crate) fn insert(&self, tab_id: i64, script: ScriptInfo) {
        self.lock()
            .entry(tab_id)
            .or_default()
            .insert(script.script_id.clone(), script);
    }

    fn contains(&self, tab_id: i64, script_id: &str) -> bool {
        self.lock()
            .get(&tab_id)
            .is_some_and(|scripts| scripts.contains_key(script_id))
    }

    fn filenames(&self, tab_id: i64) -> Vec<String> {
        let lock = self.lock();
        let Some(scripts) = lock.get(&tab_id) else {
            return Vec::new();
        };
        let mut names: Vec<String> = scripts.values().map(script_filename).collect();
        names.sort();
        names
    }
}

/// `<scriptId>_<sanitizedUrl>`, the entry name under `debugger/scripts`.
fn script_filename(script: &ScriptInfo) -> String {
    format!("{}_{}", script.script_id, sanitize(&script.url))
}

/// Recover the script id from an entry name.
fn parse_script_filename(name: &str) -> FsResult<&str> {
    name.split_once('_')
        .map(|(id, _)| id)
        .ok_or(FsError::NotFound)
}

/// Keep a script map in sync with debugger notifications. Runs until the
/// event channel closes; lagged receivers just miss stale entries.
pub(crate) fn spawn_script_tracker(
    browser: Arc<dyn Browser>,
    scripts: Arc<ScriptMap>,
) -> tokio::task::JoinHandle<()> {
    let mut events = browser.debugger_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(DebuggerEvent::FrameStartedLoading { tab_id }) => {
                    tracing::debug!(tab_id, "frame load, clearing script map");
                    scripts.clear_tab(tab_id);
                }
                Ok(DebuggerEvent::ScriptParsed { tab_id, script }) => {
                    scripts.insert(tab_id, script);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "debugger event stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Attach and enable the domain the operation needs. Enablement is
/// idempotent on the browser side.
async fn attach_with_domain(
    browser: &dyn Browser,
    tab_id: i64,
    domain: &str,
) -> BrowserResult<()> {
    attach_debugger(browser, tab_id).await?;
    browser
        .debugger_command(tab_id, &format!("{domain}.enable"), json!({}))
        .await?;
    Ok(())
}

fn field<'a>(value: &'a serde_json::Value, path: &[&str]) -> FsResult<&'a serde_json::Value> {
    let mut current = value;
    for key in path {
        current = current
            .get(key)
            .ok_or_else(|| FsError::io(format!("debugger reply missing {key}")))?;
    }
    Ok(current)
}

pub(crate) fn register(routes: &mut Vec<Route>, state: &CatalogState) {
    let browser = state.browser.clone();
    let scripts = state.scripts.clone();
    routes.push(
        Route::new("/tabs/by-id/#TAB_ID/debugger/scripts")
            .usage("ls debugger/scripts while the page runs")
            .on(Op::Readdir, move |cx| {
                let browser = browser.clone();
                let scripts = scripts.clone();
                async move {
                    let tab_id = cx.vars.int("tabId")?;
                    attach_with_domain(browser.as_ref(), tab_id, "Debugger").await?;
                    let mut entries = vec![".".to_string(), "..".to_string()];
                    entries.extend(scripts.filenames(tab_id));
                    Ok(Reply::Entries(entries))
                }
            }),
    );

    let get_browser = state.browser.clone();
    let get_scripts = state.scripts.clone();
    let set_browser = state.browser.clone();
    routes.push(
        Contents::read_write(
            move |cx| {
                let browser = get_browser.clone();
                let scripts = get_scripts.clone();
                async move {
                    let tab_id = cx.vars.int("tabId")?;
                    let script_id = parse_script_filename(cx.vars.str("filename")?)?.to_string();
                    if !scripts.contains(tab_id, &script_id) {
                        return Err(FsError::NotFound);
                    }
                    attach_with_domain(browser.as_ref(), tab_id, "Debugger").await?;
                    let reply = browser
                        .debugger_command(
                            tab_id,
                            "Debugger.getScriptSource",
                            json!({ "scriptId": script_id }),
                        )
                        .await?;
                    let source = field(&reply, &["scriptSource"])?
                        .as_str()
                        .ok_or_else(|| FsError::io("scriptSource is not a string"))?;
                    Ok(source.as_bytes().to_vec())
                }
            },
            move |cx, text| {
                let browser = set_browser.clone();
                async move {
                    let tab_id = cx.vars.int("tabId")?;
                    let script_id = parse_script_filename(cx.vars.str("filename")?)?.to_string();
                    attach_with_domain(browser.as_ref(), tab_id, "Debugger").await?;
                    browser
                        .debugger_command(
                            tab_id,
                            "Debugger.setScriptSource",
                            json!({ "scriptId": script_id, "scriptSource": text }),
                        )
                        .await?;
                    Ok(())
                }
            },
        )
        .install(
            Route::new("/tabs/by-id/#TAB_ID/debugger/scripts/:FILENAME"),
            &state.handles,
        ),
    );

    let browser = state.browser.clone();
    routes.push(
        Route::new("/tabs/by-id/#TAB_ID/debugger/resources").on(Op::Readdir, move |cx| {
            let browser = browser.clone();
            async move {
                let tab_id = cx.vars.int("tabId")?;
                attach_with_domain(browser.as_ref(), tab_id, "Page").await?;
                let tree = browser
                    .debugger_command(tab_id, "Page.getResourceTree", json!({}))
                    .await?;
                let resources = field(&tree, &["frameTree", "resources"])?
                    .as_array()
                    .ok_or_else(|| FsError::io("resources is not an array"))?;
                let mut entries = vec![".".to_string(), "..".to_string()];
                for resource in resources {
                    if let Some(url) = resource.get("url").and_then(|u| u.as_str()) {
                        entries.push(sanitize(url));
                    }
                }
                Ok(Reply::Entries(entries))
            }
        }),
    );

    let browser = state.browser.clone();
    routes.push(
        Contents::read_only(move |cx| {
            let browser = browser.clone();
            async move {
                let tab_id = cx.vars.int("tabId")?;
                let suffix = cx.vars.str("suffix")?.to_string();
                attach_with_domain(browser.as_ref(), tab_id, "Page").await?;
                let tree = browser
                    .debugger_command(tab_id, "Page.getResourceTree", json!({}))
                    .await?;
                let frame_id = field(&tree, &["frameTree", "frame", "id"])?
                    .as_str()
                    .ok_or_else(|| FsError::io("frame id is not a string"))?
                    .to_string();
                let resources = field(&tree, &["frameTree", "resources"])?
                    .as_array()
                    .ok_or_else(|| FsError::io("resources is not an array"))?;
                let url = resources
                    .iter()
                    .filter_map(|r| r.get("url").and_then(|u| u.as_str()))
                    .find(|url| sanitize(url) == suffix)
                    .ok_or(FsError::NotFound)?
                    .to_string();

                let reply = browser
                    .debugger_command(
                        tab_id,
                        "Page.getResourceContent",
                        json!({ "frameId": frame_id, "url": url }),
                    )
                    .await?;
                let content = field(&reply, &["content"])?
                    .as_str()
                    .ok_or_else(|| FsError::io("content is not a string"))?;
                if field(&reply, &["base64Encoded"])?.as_bool().unwrap_or(false) {
                    use base64::Engine as _;
                    base64::engine::general_purpose::STANDARD
                        .decode(content)
                        .map_err(|e| FsError::io(format!("bad base64 resource: {e}")))
                } else {
                    Ok(content.as_bytes().to_vec())
                }
            }
        })
        .install(
            Route::new("/tabs/by-id/#TAB_ID/debugger/resources/:SUFFIX"),
            &state.handles,
        ),
    );
}
