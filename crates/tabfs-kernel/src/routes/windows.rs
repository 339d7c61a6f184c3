//! Window routes.

use crate::contents::Contents;
use crate::route::Route;
use crate::wire::{Op, Reply};

use super::CatalogState;

pub(crate) fn register(routes: &mut Vec<Route>, state: &CatalogState) {
    let browser = state.browser.clone();
    routes.push(
        Route::new("/windows")
            .usage("ls windows")
            .on(Op::Readdir, move |_cx| {
                let browser = browser.clone();
                async move {
                    let mut entries = vec![".".to_string(), "..".to_string()];
                    entries.extend(browser.windows().await?.iter().map(|w| w.id.to_string()));
                    entries.push("last-focused".to_string());
                    Ok(Reply::Entries(entries))
                }
            }),
    );

    let browser = state.browser.clone();
    routes.push(
        Route::new("/windows/last-focused").on(Op::Readlink, move |_cx| {
            let browser = browser.clone();
            async move {
                let window = browser.last_focused_window().await?;
                Ok(Reply::Data(format!("./{}", window.id).into_bytes()))
            }
        }),
    );

    let get_browser = state.browser.clone();
    let set_browser = state.browser.clone();
    routes.push(
        Contents::read_write(
            move |cx| {
                let browser = get_browser.clone();
                async move {
                    let window = browser.window(cx.vars.int("windowId")?).await?;
                    Ok(format!("{}\n", window.focused).into_bytes())
                }
            },
            move |cx, text| {
                let browser = set_browser.clone();
                async move {
                    if text.trim() == "true" {
                        browser.focus_window(cx.vars.int("windowId")?).await?;
                    }
                    Ok(())
                }
            },
        )
        .install(
            Route::new("/windows/#WINDOW_ID/focused")
                .usage("echo true > windows/1/focused"),
            &state.handles,
        ),
    );

    let browser = state.browser.clone();
    routes.push(
        Contents::read_only(move |cx| {
            let browser = browser.clone();
            async move { Ok(browser.capture_window(cx.vars.int("windowId")?).await?) }
        })
        .install(
            Route::new("/windows/#WINDOW_ID/visible-tab.png"),
            &state.handles,
        ),
    );
}
