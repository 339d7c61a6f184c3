//! A canned browser for exercising the mount without a live browser.

use std::sync::Arc;

use tabfs_kernel::Browser;
use tabfs_testutil::FakeBrowser;

/// A browser with one window and a couple of tabs, enough to `ls` around
/// the mount and try the per-tab files.
pub fn demo_browser() -> Arc<dyn Browser> {
    let browser = FakeBrowser::new();
    browser.add_window(1, true);
    browser.add_tab(1, 1, "Example Domain", "https://example.com/");
    browser.add_tab(2, 1, "tabfs", "https://omar.website/tabfs/");
    browser.set_page_text(1, "Example Domain\nThis domain is for use in examples.\n");
    browser.set_input(1, "searchbox", "");
    browser.add_extension("demoextension", "Demo Extension", true, true);
    Arc::new(browser)
}
