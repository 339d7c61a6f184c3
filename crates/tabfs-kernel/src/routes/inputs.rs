//! Form-input routes: each input element with an id on the page appears as
//! a writable `.txt` file holding its current value.

use crate::contents::Contents;
use crate::route::Route;
use crate::sanitize::sanitize;
use crate::wire::{Op, Reply};

use super::CatalogState;

pub(crate) fn register(routes: &mut Vec<Route>, state: &CatalogState) {
    let browser = state.browser.clone();
    routes.push(
        Route::new("/tabs/by-id/#TAB_ID/inputs")
            .usage("echo hello > inputs/searchbox.txt")
            .on(Op::Readdir, move |cx| {
                let browser = browser.clone();
                async move {
                    let ids = browser.input_ids(cx.vars.int("tabId")?).await?;
                    let mut entries = vec![".".to_string(), "..".to_string()];
                    entries.extend(ids.iter().map(|id| format!("{}.txt", sanitize(id))));
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
                    let value = browser
                        .input_value(cx.vars.int("tabId")?, cx.vars.str("inputId")?)
                        .await?;
                    Ok(value.into_bytes())
                }
            },
            move |cx, text| {
                let browser = set_browser.clone();
                async move {
                    let value = text.trim_end_matches('\n');
                    browser
                        .set_input_value(cx.vars.int("tabId")?, cx.vars.str("inputId")?, value)
                        .await?;
                    Ok(())
                }
            },
        )
        .install(
            Route::new("/tabs/by-id/#TAB_ID/inputs/:INPUT_ID.txt"),
            &state.handles,
        ),
    );
}
