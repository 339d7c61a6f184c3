//! The route catalog: every path family the engine exposes.
//!
//! Each submodule registers the routes for one area of the browser, in
//! source order, against the shared catalog state. The table construction
//! passes (ancestor synthesis, default injection) run once at the end, so
//! the dispatcher never observes a partial table.

mod debugger;
mod evals;
mod extensions;
mod inputs;
mod runtime;
mod tabs;
mod windows;

use std::sync::Arc;

use crate::browser::Browser;
use crate::contents::HandleTable;
use crate::table::RouteTable;

/// State shared by route handlers: the browser capability and the
/// process-lifetime registries. Everything is keyed by a stable identifier
/// (tab id, handle, path) and only mutated between suspension points.
#[derive(Clone)]
pub(crate) struct CatalogState {
    pub browser: Arc<dyn Browser>,
    pub handles: Arc<HandleTable>,
    pub evals: Arc<evals::EvalTable>,
    pub watches: Arc<evals::WatchTable>,
    pub scripts: Arc<debugger::ScriptMap>,
}

impl CatalogState {
    fn new(browser: Arc<dyn Browser>) -> Self {
        Self {
            browser,
            handles: Arc::new(HandleTable::new()),
            evals: Arc::new(evals::EvalTable::default()),
            watches: Arc::new(evals::WatchTable::default()),
            scripts: Arc::new(debugger::ScriptMap::default()),
        }
    }
}

/// Build the full route table for a browser.
///
/// When called inside a tokio runtime this also spawns the background task
/// that keeps the per-tab script map in sync with debugger events.
pub fn build_table(browser: Arc<dyn Browser>) -> RouteTable {
    let state = CatalogState::new(browser);

    // The tracker is detached; it ends on its own when the event channel
    // closes.
    if tokio::runtime::Handle::try_current().is_ok() {
        let _ = debugger::spawn_script_tracker(state.browser.clone(), state.scripts.clone());
    }

    let mut routes = Vec::new();
    tabs::register(&mut routes, &state);
    evals::register(&mut routes, &state);
    inputs::register(&mut routes, &state);
    debugger::register(&mut routes, &state);
    windows::register(&mut routes, &state);
    extensions::register(&mut routes, &state);

    // The routes listing documents the author-declared catalog, itself
    // included; synthetic ancestors are added later and never appear.
    let mut docs: Vec<(String, Vec<String>)> = routes
        .iter()
        .map(|r| (r.pattern().to_string(), r.usage_hints().to_vec()))
        .collect();
    docs.push((
        "/runtime/background.js".to_string(),
        vec!["the engine's own source; write and close to hot-reload".to_string()],
    ));
    docs.push(("/runtime/routes.html".to_string(), Vec::new()));
    runtime::register(&mut routes, &state, docs);

    RouteTable::build(routes)
}
