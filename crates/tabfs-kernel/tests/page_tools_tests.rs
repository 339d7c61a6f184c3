//! End-to-end tests for the page-state routes: evals, watches, form
//! inputs, and the debugger script/resource families.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use tabfs_kernel::browser::{DebuggerEvent, ScriptInfo};
use tabfs_kernel::Engine;
use tabfs_testutil::{decoded_buf, entries, handle, req, FakeBrowser};

fn setup() -> (Arc<FakeBrowser>, Engine) {
    let browser = Arc::new(FakeBrowser::new());
    browser.add_window(1, true);
    browser.add_tab(1, 1, "Example Domain", "https://example.com/");
    let engine = Engine::new(browser.clone());
    (browser, engine)
}

async fn dispatch(engine: &Engine, request: Value) -> Value {
    engine.handle(request).await.expect("reply")
}

async fn read_file(engine: &Engine, path: &str) -> Result<Vec<u8>, i64> {
    let resp = dispatch(engine, req::open(1, path)).await;
    if let Some(err) = resp.get("error") {
        return Err(err.as_i64().expect("errno"));
    }
    let fh = handle(&resp);
    let resp = dispatch(engine, req::read(2, path, fh, 0, 1 << 20)).await;
    let data = decoded_buf(&resp);
    dispatch(engine, req::release(3, path, fh)).await;
    Ok(data)
}

async fn write_file(engine: &Engine, path: &str, data: &[u8]) -> Value {
    let fh = handle(&dispatch(engine, req::open(1, path)).await);
    let resp = dispatch(engine, req::write(2, path, fh, 0, data)).await;
    dispatch(engine, req::release(3, path, fh)).await;
    resp
}

/// Give the event-driven script tracker a moment to catch up.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ============================================================================
// Evals
// ============================================================================

#[tokio::test]
async fn test_eval_lifecycle() {
    let (browser, engine) = setup();
    browser.stub_eval("2 + 2", json!(4));

    // touch, write code, read the result sibling.
    let resp = dispatch(&engine, req::mknod(1, "/tabs/by-id/1/evals/calc.js")).await;
    assert!(resp.get("error").is_none(), "{resp}");

    let names = entries(&dispatch(&engine, req::readdir(2, "/tabs/by-id/1/evals")).await);
    assert!(names.iter().any(|n| n == "calc.js"), "{names:?}");
    assert!(!names.iter().any(|n| n == "calc.js.result"));

    write_file(&engine, "/tabs/by-id/1/evals/calc.js", b"2 + 2").await;

    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/evals/calc.js").await.unwrap(),
        b"2 + 2"
    );
    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/evals/calc.js.result").await.unwrap(),
        b"4\n"
    );

    let names = entries(&dispatch(&engine, req::readdir(3, "/tabs/by-id/1/evals")).await);
    assert!(names.iter().any(|n| n == "calc.js.result"), "{names:?}");
}

#[tokio::test]
async fn test_eval_create_via_mkdir_alias() {
    // The host adapter sends mkdir for FUSE create.
    let (_browser, engine) = setup();
    let resp = dispatch(&engine, req::mkdir(1, "/tabs/by-id/1/evals/made.js")).await;
    assert!(resp.get("error").is_none(), "{resp}");
    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/evals/made.js").await.unwrap(),
        b""
    );
}

#[tokio::test]
async fn test_eval_unlink_removes_entry() {
    let (_browser, engine) = setup();
    dispatch(&engine, req::mknod(1, "/tabs/by-id/1/evals/gone.js")).await;
    let resp = dispatch(&engine, req::unlink(2, "/tabs/by-id/1/evals/gone.js")).await;
    assert!(resp.get("error").is_none());

    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/evals/gone.js").await,
        Err(2)
    );
    let resp = dispatch(&engine, req::unlink(3, "/tabs/by-id/1/evals/gone.js")).await;
    assert_eq!(resp["error"], 2);
}

#[tokio::test]
async fn test_result_file_rejects_writes() {
    let (browser, engine) = setup();
    browser.stub_eval("1", json!(1));
    dispatch(&engine, req::mknod(1, "/tabs/by-id/1/evals/a.js")).await;
    write_file(&engine, "/tabs/by-id/1/evals/a.js", b"1").await;

    // No write handler on computed results: the open succeeds, the write
    // must not.
    let fh = handle(&dispatch(&engine, req::open(2, "/tabs/by-id/1/evals/a.js.result")).await);
    let resp = dispatch(
        &engine,
        req::write(3, "/tabs/by-id/1/evals/a.js.result", fh, 0, b"5\n"),
    )
    .await;
    assert_eq!(resp["error"], 45);
}

#[tokio::test]
async fn test_unwritten_eval_has_no_result() {
    let (_browser, engine) = setup();
    dispatch(&engine, req::mknod(1, "/tabs/by-id/1/evals/empty.js")).await;
    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/evals/empty.js.result").await,
        Err(2)
    );
}

// ============================================================================
// Watches
// ============================================================================

#[tokio::test]
async fn test_watch_reevaluates_per_open() {
    let (browser, engine) = setup();
    browser.stub_eval("document.title", json!("First"));

    dispatch(&engine, req::mknod(1, "/tabs/by-id/1/watches/document.title")).await;
    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/watches/document.title").await.unwrap(),
        b"\"First\"\n"
    );

    browser.stub_eval("document.title", json!("Second"));
    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/watches/document.title").await.unwrap(),
        b"\"Second\"\n"
    );
}

#[tokio::test]
async fn test_watch_listing_and_unlink() {
    let (_browser, engine) = setup();
    dispatch(&engine, req::mknod(1, "/tabs/by-id/1/watches/location.href")).await;

    let names = entries(&dispatch(&engine, req::readdir(2, "/tabs/by-id/1/watches")).await);
    assert!(names.iter().any(|n| n == "location.href"), "{names:?}");

    dispatch(&engine, req::unlink(3, "/tabs/by-id/1/watches/location.href")).await;
    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/watches/location.href").await,
        Err(2)
    );
}

#[tokio::test]
async fn test_unregistered_watch_is_enoent() {
    let (_browser, engine) = setup();
    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/watches/never.made").await,
        Err(2)
    );
}

// ============================================================================
// Inputs
// ============================================================================

#[tokio::test]
async fn test_input_listing_read_write() {
    let (browser, engine) = setup();
    browser.set_input(1, "searchbox", "query");

    let names = entries(&dispatch(&engine, req::readdir(1, "/tabs/by-id/1/inputs")).await);
    assert!(names.iter().any(|n| n == "searchbox.txt"), "{names:?}");

    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/inputs/searchbox.txt").await.unwrap(),
        b"query"
    );

    write_file(&engine, "/tabs/by-id/1/inputs/searchbox.txt", b"hello\n").await;
    assert_eq!(browser.input(1, "searchbox").unwrap(), "hello");
}

#[tokio::test]
async fn test_unknown_input_is_enoent() {
    let (_browser, engine) = setup();
    let resp = dispatch(&engine, req::getattr(1, "/tabs/by-id/1/inputs/nope.txt")).await;
    assert_eq!(resp["error"], 2);
}

// ============================================================================
// Debugger scripts
// ============================================================================

#[tokio::test]
async fn test_script_listing_follows_debugger_events() {
    let (browser, engine) = setup();
    browser.emit(DebuggerEvent::ScriptParsed {
        tab_id: 1,
        script: ScriptInfo {
            script_id: "17".into(),
            url: "https://example.com/app.js".into(),
        },
    });
    settle().await;

    let names = entries(&dispatch(&engine, req::readdir(1, "/tabs/by-id/1/debugger/scripts")).await);
    assert!(
        names.iter().any(|n| n == "17_https___example.com_app.js"),
        "{names:?}"
    );

    browser.emit(DebuggerEvent::FrameStartedLoading { tab_id: 1 });
    settle().await;

    let names = entries(&dispatch(&engine, req::readdir(2, "/tabs/by-id/1/debugger/scripts")).await);
    assert_eq!(names, vec![".".to_string(), "..".to_string()]);
}

#[tokio::test]
async fn test_script_source_fetch_and_push() {
    let (browser, engine) = setup();
    browser.add_script_source(1, "17", "console.log('original')");
    browser.emit(DebuggerEvent::ScriptParsed {
        tab_id: 1,
        script: ScriptInfo {
            script_id: "17".into(),
            url: "https://example.com/app.js".into(),
        },
    });
    settle().await;

    let path = "/tabs/by-id/1/debugger/scripts/17_https___example.com_app.js";
    assert_eq!(
        read_file(&engine, path).await.unwrap(),
        b"console.log('original')"
    );

    write_file(&engine, path, b"console.log('patched')").await;
    assert_eq!(
        browser.script_source(1, "17").unwrap(),
        "console.log('patched')"
    );
}

#[tokio::test]
async fn test_unknown_script_is_enoent() {
    let (_browser, engine) = setup();
    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/debugger/scripts/99_unknown.js").await,
        Err(2)
    );
}

#[tokio::test]
async fn test_attach_conflict_is_stolen() {
    let (browser, engine) = setup();
    browser.set_attach_conflict(1);

    let resp = dispatch(&engine, req::readdir(1, "/tabs/by-id/1/debugger/scripts")).await;
    assert!(resp.get("error").is_none(), "{resp}");
    // First attach conflicts, then detach + re-attach.
    assert_eq!(browser.attach_attempts(), vec![1, 1]);
}

// ============================================================================
// Debugger resources
// ============================================================================

#[tokio::test]
async fn test_resource_listing_and_content() {
    let (browser, engine) = setup();
    browser.add_resource(1, "https://example.com/style.css", "body { margin: 0 }", false);

    let names =
        entries(&dispatch(&engine, req::readdir(1, "/tabs/by-id/1/debugger/resources")).await);
    assert!(
        names.iter().any(|n| n == "https___example.com_style.css"),
        "{names:?}"
    );

    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/debugger/resources/https___example.com_style.css")
            .await
            .unwrap(),
        b"body { margin: 0 }"
    );
}

#[tokio::test]
async fn test_base64_resource_is_decoded() {
    use base64::Engine as _;
    let (browser, engine) = setup();
    let bytes = [0x89u8, 0x50, 0x4e, 0x47, 0x00, 0xff];
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    browser.add_resource(1, "https://example.com/img.png", &encoded, true);

    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/debugger/resources/https___example.com_img.png")
            .await
            .unwrap(),
        bytes
    );
}

#[tokio::test]
async fn test_unknown_resource_is_enoent() {
    let (_browser, engine) = setup();
    assert_eq!(
        read_file(&engine, "/tabs/by-id/1/debugger/resources/missing.css").await,
        Err(2)
    );
}
