//! Per-tab evaluation files and watch expressions.
//!
//! `evals/` holds named code files: `mknod` creates one, writing it runs
//! the code in the tab and stores the JSON result, and the `<name>.result`
//! sibling serves that result. `watches/` holds bare expressions that are
//! re-evaluated on every open.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::contents::Contents;
use crate::errno::{FsError, FsResult};
use crate::route::Route;
use crate::wire::{Op, Reply};

use super::CatalogState;

#[derive(Debug, Default, Clone)]
struct EvalEntry {
    code: String,
    result: Option<String>,
}

/// Evaluation files per tab. The per-tab sub-maps stay allocated for the
/// life of the process.
// TODO: drop a tab's sub-map once its last entry is unlinked.
#[derive(Debug, Default)]
pub(crate) struct EvalTable {
    tabs: Mutex<HashMap<i64, HashMap<String, EvalEntry>>>,
}

impl EvalTable {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, HashMap<String, EvalEntry>>> {
        self.tabs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn create(&self, tab_id: i64, name: &str) {
        self.lock()
            .entry(tab_id)
            .or_default()
            .entry(name.to_string())
            .or_default();
    }

    fn remove(&self, tab_id: i64, name: &str) -> FsResult<()> {
        self.lock()
            .get_mut(&tab_id)
            .and_then(|files| files.remove(name))
            .map(|_| ())
            .ok_or(FsError::NotFound)
    }

    fn code(&self, tab_id: i64, name: &str) -> FsResult<String> {
        self.lock()
            .get(&tab_id)
            .and_then(|files| files.get(name))
            .map(|e| e.code.clone())
            .ok_or(FsError::NotFound)
    }

    fn set_code(&self, tab_id: i64, name: &str, code: String) -> FsResult<()> {
        self.lock()
            .get_mut(&tab_id)
            .and_then(|files| files.get_mut(name))
            .map(|e| e.code = code)
            .ok_or(FsError::NotFound)
    }

    fn set_result(&self, tab_id: i64, name: &str, result: String) {
        if let Some(entry) = self.lock().get_mut(&tab_id).and_then(|f| f.get_mut(name)) {
            entry.result = Some(result);
        }
    }

    fn result(&self, tab_id: i64, name: &str) -> FsResult<String> {
        self.lock()
            .get(&tab_id)
            .and_then(|files| files.get(name))
            .and_then(|e| e.result.clone())
            .ok_or(FsError::NotFound)
    }

    fn clear_result(&self, tab_id: i64, name: &str) -> FsResult<()> {
        self.lock()
            .get_mut(&tab_id)
            .and_then(|files| files.get_mut(name))
            .map(|e| e.result = None)
            .ok_or(FsError::NotFound)
    }

    fn names(&self, tab_id: i64) -> Vec<String> {
        let lock = self.lock();
        let Some(files) = lock.get(&tab_id) else {
            return Vec::new();
        };
        let mut names: Vec<String> = files.keys().cloned().collect();
        names.sort();
        let mut out = Vec::new();
        for name in names {
            if files.get(&name).and_then(|e| e.result.as_ref()).is_some() {
                out.push(format!("{name}.result"));
            }
            out.push(name);
        }
        out
    }
}

/// Watch expressions per tab.
// TODO: drop a tab's sub-map once its last expression is unlinked.
#[derive(Debug, Default)]
pub(crate) struct WatchTable {
    tabs: Mutex<HashMap<i64, Vec<String>>>,
}

impl WatchTable {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Vec<String>>> {
        self.tabs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn create(&self, tab_id: i64, expr: &str) {
        let mut tabs = self.lock();
        let exprs = tabs.entry(tab_id).or_default();
        if !exprs.iter().any(|e| e == expr) {
            exprs.push(expr.to_string());
        }
    }

    fn remove(&self, tab_id: i64, expr: &str) -> FsResult<()> {
        let mut tabs = self.lock();
        let exprs = tabs.get_mut(&tab_id).ok_or(FsError::NotFound)?;
        let before = exprs.len();
        exprs.retain(|e| e != expr);
        if exprs.len() == before {
            return Err(FsError::NotFound);
        }
        Ok(())
    }

    fn contains(&self, tab_id: i64, expr: &str) -> bool {
        self.lock()
            .get(&tab_id)
            .is_some_and(|exprs| exprs.iter().any(|e| e == expr))
    }

    fn list(&self, tab_id: i64) -> Vec<String> {
        self.lock().get(&tab_id).cloned().unwrap_or_default()
    }
}

pub(crate) fn register(routes: &mut Vec<Route>, state: &CatalogState) {
    let evals = state.evals.clone();
    routes.push(
        Route::new("/tabs/by-id/#TAB_ID/evals")
            .usages([
                "touch evals/example.js, then write code into it",
                "cat evals/example.js.result",
            ])
            .on(Op::Readdir, move |cx| {
                let evals = evals.clone();
                async move {
                    let mut entries = vec![".".to_string(), "..".to_string()];
                    entries.extend(evals.names(cx.vars.int("tabId")?));
                    Ok(Reply::Entries(entries))
                }
            }),
    );

    // Declared before the generic filename route; first match wins.
    let evals = state.evals.clone();
    let unlink_evals = state.evals.clone();
    routes.push(
        Contents::read_only(move |cx| {
            let evals = evals.clone();
            async move {
                let result = evals.result(cx.vars.int("tabId")?, cx.vars.str("filename")?)?;
                Ok(result.into_bytes())
            }
        })
        .install(
            Route::new("/tabs/by-id/#TAB_ID/evals/:FILENAME.result").on(
                Op::Unlink,
                move |cx| {
                    let evals = unlink_evals.clone();
                    async move {
                        evals.clear_result(cx.vars.int("tabId")?, cx.vars.str("filename")?)?;
                        Ok(Reply::Done)
                    }
                },
            ),
            &state.handles,
        ),
    );

    let get_evals = state.evals.clone();
    let set_evals = state.evals.clone();
    let browser = state.browser.clone();
    let mknod_evals = state.evals.clone();
    let mkdir_evals = state.evals.clone();
    let unlink_evals = state.evals.clone();
    routes.push(
        Contents::read_write(
            move |cx| {
                let evals = get_evals.clone();
                async move {
                    let code = evals.code(cx.vars.int("tabId")?, cx.vars.str("filename")?)?;
                    Ok(code.into_bytes())
                }
            },
            move |cx, code| {
                let evals = set_evals.clone();
                let browser = browser.clone();
                async move {
                    let tab_id = cx.vars.int("tabId")?;
                    let name = cx.vars.str("filename")?.to_string();
                    evals.set_code(tab_id, &name, code.clone())?;
                    let value = browser.eval_in_tab(tab_id, &code).await?;
                    let rendered = serde_json::to_string(&value)?;
                    evals.set_result(tab_id, &name, format!("{rendered}\n"));
                    Ok(())
                }
            },
        )
        .install(
            Route::new("/tabs/by-id/#TAB_ID/evals/:FILENAME")
                .on(Op::Mknod, move |cx| {
                    let evals = mknod_evals.clone();
                    async move {
                        create_eval(&evals, &cx)?;
                        Ok(Reply::Done)
                    }
                })
                .on(Op::Mkdir, move |cx| {
                    // The host adapter sends mkdir for FUSE create.
                    let evals = mkdir_evals.clone();
                    async move {
                        create_eval(&evals, &cx)?;
                        Ok(Reply::Done)
                    }
                })
                .on(Op::Unlink, move |cx| {
                    let evals = unlink_evals.clone();
                    async move {
                        evals.remove(cx.vars.int("tabId")?, cx.vars.str("filename")?)?;
                        Ok(Reply::Done)
                    }
                }),
            &state.handles,
        ),
    );

    let watches = state.watches.clone();
    routes.push(
        Route::new("/tabs/by-id/#TAB_ID/watches")
            .usage("touch 'watches/document.title', then cat it")
            .on(Op::Readdir, move |cx| {
                let watches = watches.clone();
                async move {
                    let mut entries = vec![".".to_string(), "..".to_string()];
                    entries.extend(watches.list(cx.vars.int("tabId")?));
                    Ok(Reply::Entries(entries))
                }
            }),
    );

    let get_watches = state.watches.clone();
    let browser = state.browser.clone();
    let mknod_watches = state.watches.clone();
    let mkdir_watches = state.watches.clone();
    let unlink_watches = state.watches.clone();
    routes.push(
        Contents::read_only(move |cx| {
            let watches = get_watches.clone();
            let browser = browser.clone();
            async move {
                let tab_id = cx.vars.int("tabId")?;
                let expr = cx.vars.str("expr")?.to_string();
                if !watches.contains(tab_id, &expr) {
                    return Err(FsError::NotFound);
                }
                let value = browser.eval_in_tab(tab_id, &expr).await?;
                Ok(format!("{}\n", serde_json::to_string(&value)?).into_bytes())
            }
        })
        .install(
            Route::new("/tabs/by-id/#TAB_ID/watches/:EXPR")
                .on(Op::Mknod, move |cx| {
                    let watches = mknod_watches.clone();
                    async move {
                        watches.create(cx.vars.int("tabId")?, cx.vars.str("expr")?);
                        Ok(Reply::Done)
                    }
                })
                .on(Op::Mkdir, move |cx| {
                    let watches = mkdir_watches.clone();
                    async move {
                        watches.create(cx.vars.int("tabId")?, cx.vars.str("expr")?);
                        Ok(Reply::Done)
                    }
                })
                .on(Op::Unlink, move |cx| {
                    let watches = unlink_watches.clone();
                    async move {
                        watches.remove(cx.vars.int("tabId")?, cx.vars.str("expr")?)?;
                        Ok(Reply::Done)
                    }
                }),
            &state.handles,
        ),
    );
}

/// Creating a `.result` file by hand would shadow a computed one.
fn create_eval(evals: &EvalTable, cx: &crate::route::OpContext) -> FsResult<()> {
    let name = cx.vars.str("filename")?;
    if name.ends_with(".result") {
        return Err(FsError::NotSupported);
    }
    evals.create(cx.vars.int("tabId")?, name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_table_lifecycle() {
        let table = EvalTable::default();
        assert!(table.code(1, "a.js").is_err());

        table.create(1, "a.js");
        assert_eq!(table.code(1, "a.js").unwrap(), "");

        table.set_code(1, "a.js", "1 + 1".into()).unwrap();
        assert!(table.result(1, "a.js").is_err());

        table.set_result(1, "a.js", "2\n".into());
        assert_eq!(table.result(1, "a.js").unwrap(), "2\n");

        assert_eq!(table.names(1), vec!["a.js.result", "a.js"]);

        table.remove(1, "a.js").unwrap();
        assert!(table.code(1, "a.js").is_err());
        assert!(table.remove(1, "a.js").is_err());
    }

    #[test]
    fn test_eval_names_without_result() {
        let table = EvalTable::default();
        table.create(2, "b.js");
        assert_eq!(table.names(2), vec!["b.js"]);
        assert!(table.names(3).is_empty());
    }

    #[test]
    fn test_watch_table_lifecycle() {
        let table = WatchTable::default();
        table.create(1, "document.title");
        table.create(1, "document.title");
        assert_eq!(table.list(1), vec!["document.title"]);
        assert!(table.contains(1, "document.title"));

        table.remove(1, "document.title").unwrap();
        assert!(!table.contains(1, "document.title"));
        assert!(table.remove(1, "document.title").is_err());
    }
}
