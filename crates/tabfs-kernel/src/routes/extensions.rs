//! Extension routes: listing and the per-extension enabled toggle.

use crate::browser::Extension;
use crate::contents::Contents;
use crate::errno::{FsError, FsResult};
use crate::route::Route;
use crate::sanitize::sanitize;
use crate::wire::{Op, Reply};

use super::CatalogState;

/// `<sanitizedName>.<id>`, the entry name under `/extensions`.
fn extension_entry(ext: &Extension) -> String {
    format!("{}.{}", sanitize(&ext.name), ext.id)
}

/// Recover the extension id from an entry name.
fn parse_extension_entry(name: &str) -> FsResult<&str> {
    name.rsplit_once('.')
        .map(|(_, id)| id)
        .filter(|id| !id.is_empty())
        .ok_or(FsError::NotFound)
}

async fn find_extension(
    browser: &dyn crate::browser::Browser,
    entry: &str,
) -> FsResult<Extension> {
    let id = parse_extension_entry(entry)?;
    browser
        .extensions()
        .await?
        .into_iter()
        .find(|e| e.id == id)
        .ok_or(FsError::NotFound)
}

pub(crate) fn register(routes: &mut Vec<Route>, state: &CatalogState) {
    let browser = state.browser.clone();
    routes.push(
        Route::new("/extensions")
            .usage("ls extensions")
            .on(Op::Readdir, move |_cx| {
                let browser = browser.clone();
                async move {
                    let mut entries = vec![".".to_string(), "..".to_string()];
                    entries.extend(browser.extensions().await?.iter().map(extension_entry));
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
                    let ext = find_extension(browser.as_ref(), cx.vars.str("extensionId")?).await?;
                    Ok(format!("{}\n", ext.enabled).into_bytes())
                }
            },
            move |cx, text| {
                let browser = set_browser.clone();
                async move {
                    let ext = find_extension(browser.as_ref(), cx.vars.str("extensionId")?).await?;
                    if !ext.may_disable {
                        return Err(FsError::PermissionDenied);
                    }
                    browser
                        .set_extension_enabled(&ext.id, text.trim() == "true")
                        .await?;
                    Ok(())
                }
            },
        )
        .install(
            Route::new("/extensions/:EXTENSION_ID/enabled")
                .usage("echo false > 'extensions/<name>.<id>/enabled'"),
            &state.handles,
        ),
    );
}
