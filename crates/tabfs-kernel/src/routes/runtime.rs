//! Runtime routes: the engine's own source and the routes listing view.
//!
//! `/runtime/background.js` serves the dispatcher source out of a
//! process-wide slot. The slot is lazily populated and lives outside the
//! engine instance, so it survives a hot reload: the fresh engine reuses
//! whatever text was stored before the reload. Writes accumulate in the
//! open handle and only take effect at `release`, when the new text is
//! stored and handed to the browser's runtime-reload capability.

use std::sync::{Mutex, OnceLock};

use crate::contents::Contents;
use crate::route::{OpContext, Route, S_IFREG};
use crate::wire::{Op, Reply};

use super::CatalogState;

const ENGINE_SOURCE: &str = include_str!("../dispatch.rs");

static SOURCE: OnceLock<Mutex<String>> = OnceLock::new();

fn source_slot() -> &'static Mutex<String> {
    SOURCE.get_or_init(|| Mutex::new(ENGINE_SOURCE.to_string()))
}

fn current_source() -> String {
    source_slot()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

fn store_source(text: String) {
    *source_slot().lock().unwrap_or_else(|e| e.into_inner()) = text;
}

pub(crate) fn register(
    routes: &mut Vec<Route>,
    state: &CatalogState,
    docs: Vec<(String, Vec<String>)>,
) {
    let open_handles = state.handles.clone();
    let read_handles = state.handles.clone();
    let write_handles = state.handles.clone();
    let release_handles = state.handles.clone();
    let browser = state.browser.clone();
    routes.push(
        Route::new("/runtime/background.js")
            .usage("the engine's own source; write and close to hot-reload")
            .on(Op::Getattr, |_cx| async {
                Ok(Reply::Attr {
                    st_mode: S_IFREG | 0o666,
                    st_nlink: 1,
                    st_size: current_source().len() as u64,
                })
            })
            .on(Op::Open, move |cx: OpContext| {
                let handles = open_handles.clone();
                async move {
                    Ok(Reply::Handle(
                        handles.allocate(&cx.path, current_source().into_bytes()),
                    ))
                }
            })
            .on(Op::Read, move |cx: OpContext| {
                let handles = read_handles.clone();
                async move {
                    Ok(Reply::Data(handles.read_at(
                        cx.fh()?,
                        cx.offset()?,
                        cx.size()?,
                    )?))
                }
            })
            .on(Op::Write, move |cx: OpContext| {
                let handles = write_handles.clone();
                async move {
                    let data = cx.buf()?.to_vec();
                    handles.write_at(cx.fh()?, cx.offset()?, &data)?;
                    Ok(Reply::Written(data.len() as u64))
                }
            })
            .on(Op::Truncate, |cx: OpContext| async move {
                let mut bytes = current_source().into_bytes();
                bytes.resize(cx.size()? as usize, 0);
                store_source(String::from_utf8_lossy(&bytes).into_owned());
                Ok(Reply::Done)
            })
            .on(Op::Release, move |cx: OpContext| {
                let handles = release_handles.clone();
                let browser = browser.clone();
                async move {
                    if let Some(open) = handles.take(cx.fh()?) {
                        let text = String::from_utf8_lossy(&open.buf).into_owned();
                        if text != current_source() {
                            tracing::info!(bytes = text.len(), "reloading engine source");
                            store_source(text.clone());
                            browser.reload_background(&text).await?;
                        }
                    }
                    Ok(Reply::Done)
                }
            }),
    );

    routes.push(
        Contents::read_only(move |_cx| {
            let html = routes_html(&docs);
            async move { Ok(html.into_bytes()) }
        })
        .install(Route::new("/runtime/routes.html"), &state.handles),
    );
}

/// Render the declared catalog as a small HTML page.
fn routes_html(docs: &[(String, Vec<String>)]) -> String {
    let mut html = String::from(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>routes</title></head>\n<body>\n<dl>\n",
    );
    for (pattern, usage) in docs {
        html.push_str(&format!("  <dt><code>{}</code></dt>\n", escape(pattern)));
        for hint in usage {
            html.push_str(&format!("  <dd>{}</dd>\n", escape(hint)));
        }
    }
    html.push_str("</dl>\n</body>\n</html>\n");
    html
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
