//! Tab routes: enumeration, per-tab files, title symlinks, tab control.

use crate::contents::Contents;
use crate::errno::{FsError, FsResult};
use crate::route::Route;
use crate::sanitize::sanitize;
use crate::wire::{Op, Reply};

use super::CatalogState;

/// `<sanitizedTitle>.<id>`, the entry name under `/tabs/by-title`.
fn title_entry(title: &str, id: i64) -> String {
    format!("{}.{}", sanitize(title), id)
}

/// Recover the tab id from a by-title entry name.
fn parse_title_entry(name: &str) -> FsResult<i64> {
    name.rsplit_once('.')
        .and_then(|(_, id)| id.parse().ok())
        .ok_or(FsError::NotFound)
}

pub(crate) fn register(routes: &mut Vec<Route>, state: &CatalogState) {
    let browser = state.browser.clone();
    routes.push(
        Route::new("/tabs/create")
            .usage("echo https://example.com > tabs/create")
            .on(Op::Write, move |cx| {
                let browser = browser.clone();
                async move {
                    let data = cx.buf()?.to_vec();
                    let text = String::from_utf8_lossy(&data);
                    for url in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                        browser.create_tab(url).await?;
                    }
                    Ok(Reply::Written(data.len() as u64))
                }
            }),
    );

    let browser = state.browser.clone();
    routes.push(
        Route::new("/tabs/by-id")
            .usage("ls tabs/by-id")
            .on(Op::Readdir, move |_cx| {
                let browser = browser.clone();
                async move {
                    let mut entries = vec![".".to_string(), "..".to_string()];
                    entries.extend(browser.tabs().await?.iter().map(|t| t.id.to_string()));
                    Ok(Reply::Entries(entries))
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
                    let tab = browser.tab(cx.vars.int("tabId")?).await?;
                    Ok(format!("{}\n", tab.url).into_bytes())
                }
            },
            move |cx, text| {
                let browser = set_browser.clone();
                async move {
                    let url = text.trim();
                    if url.is_empty() {
                        return Ok(());
                    }
                    browser.navigate_tab(cx.vars.int("tabId")?, url).await?;
                    Ok(())
                }
            },
        )
        .install(
            Route::new("/tabs/by-id/#TAB_ID/url.txt")
                .usage("echo https://example.com > tabs/by-id/42/url.txt"),
            &state.handles,
        ),
    );

    let browser = state.browser.clone();
    routes.push(
        Contents::read_only(move |cx| {
            let browser = browser.clone();
            async move {
                let tab = browser.tab(cx.vars.int("tabId")?).await?;
                Ok(format!("{}\n", tab.title).into_bytes())
            }
        })
        .install(Route::new("/tabs/by-id/#TAB_ID/title.txt"), &state.handles),
    );

    let browser = state.browser.clone();
    routes.push(
        Contents::read_only(move |cx| {
            let browser = browser.clone();
            async move {
                let text = browser.page_text(cx.vars.int("tabId")?).await?;
                Ok(text.into_bytes())
            }
        })
        .install(Route::new("/tabs/by-id/#TAB_ID/text.txt"), &state.handles),
    );

    // Whole-value fetch matters here: a screenshot of live state cannot be
    // re-captured per read without tearing.
    let browser = state.browser.clone();
    routes.push(
        Contents::read_only(move |cx| {
            let browser = browser.clone();
            async move {
                let tab = browser.tab(cx.vars.int("tabId")?).await?;
                Ok(browser.capture_window(tab.window_id).await?)
            }
        })
        .install(
            Route::new("/tabs/by-id/#TAB_ID/screenshot.png"),
            &state.handles,
        ),
    );

    let browser = state.browser.clone();
    routes.push(
        Route::new("/tabs/by-id/#TAB_ID/control")
            .usages([
                "echo remove > tabs/by-id/42/control",
                "commands: remove, reload, activate, goBack, goForward",
            ])
            .on(Op::Write, move |cx| {
                let browser = browser.clone();
                async move {
                    let tab_id = cx.vars.int("tabId")?;
                    let data = cx.buf()?.to_vec();
                    let text = String::from_utf8_lossy(&data);
                    for command in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                        match command {
                            "remove" => browser.close_tab(tab_id).await?,
                            "reload" => browser.reload_tab(tab_id).await?,
                            "activate" => browser.activate_tab(tab_id).await?,
                            "goBack" => browser.go_back(tab_id).await?,
                            "goForward" => browser.go_forward(tab_id).await?,
                            other => {
                                return Err(FsError::io(format!("unknown command {other:?}")))
                            }
                        }
                    }
                    Ok(Reply::Written(data.len() as u64))
                }
            }),
    );

    let browser = state.browser.clone();
    routes.push(
        Route::new("/tabs/by-id/#TAB_ID/window").on(Op::Readlink, move |cx| {
            let browser = browser.clone();
            async move {
                let tab = browser.tab(cx.vars.int("tabId")?).await?;
                Ok(Reply::Data(
                    format!("../../../windows/{}", tab.window_id).into_bytes(),
                ))
            }
        }),
    );

    let browser = state.browser.clone();
    routes.push(
        Route::new("/tabs/by-title")
            .usage("ls tabs/by-title")
            .on(Op::Readdir, move |_cx| {
                let browser = browser.clone();
                async move {
                    let mut entries = vec![".".to_string(), "..".to_string()];
                    entries.extend(
                        browser
                            .tabs()
                            .await?
                            .iter()
                            .map(|t| title_entry(&t.title, t.id)),
                    );
                    Ok(Reply::Entries(entries))
                }
            }),
    );

    let browser = state.browser.clone();
    routes.push(
        Route::new("/tabs/by-title/:TAB_TITLE")
            .usage("rm tabs/by-title/<title>.<id> closes the tab")
            .on(Op::Readlink, |cx| async move {
                let id = parse_title_entry(cx.vars.str("tabTitle")?)?;
                Ok(Reply::Data(format!("../by-id/{id}").into_bytes()))
            })
            .on(Op::Unlink, move |cx| {
                let browser = browser.clone();
                async move {
                    let id = parse_title_entry(cx.vars.str("tabTitle")?)?;
                    browser.close_tab(id).await?;
                    Ok(Reply::Done)
                }
            }),
    );

    let browser = state.browser.clone();
    routes.push(
        Route::new("/tabs/last-focused").on(Op::Readlink, move |_cx| {
            let browser = browser.clone();
            async move {
                let window = browser.last_focused_window().await?;
                let tabs = browser.tabs().await?;
                let tab = tabs
                    .iter()
                    .find(|t| t.window_id == window.id && t.active)
                    .ok_or(FsError::NotFound)?;
                Ok(Reply::Data(format!("by-id/{}", tab.id).into_bytes()))
            }
        }),
    );
}
