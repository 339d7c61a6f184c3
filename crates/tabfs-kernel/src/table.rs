//! The route table.
//!
//! Construction runs in three phases and the dispatcher only ever sees the
//! finished table:
//!
//! 1. Author-declared routes, in source order.
//! 2. Ancestor synthesis — every non-root prefix of every declared pattern
//!    gets a synthetic directory route listing its direct children.
//! 3. Default-handler injection — directory, symlink, and raw read/write
//!    routes get the standard companions for the ops they declare.
//!
//! Lookup is first-match in insertion order. Declared patterns must not
//! overlap except where the catalog relies on declaration order on purpose
//! (the `.result` routes are declared before their generic siblings).

use crate::pattern::Bindings;
use crate::route::{handler, OpContext, Route, S_IFDIR, S_IFLNK, S_IFREG};
use crate::wire::{Op, Reply};

/// Placeholder size reported for raw read/write routes, where the true size
/// is unknowable without running the handler. The host adapter copes.
const RAW_FILE_SIZE: u64 = 100;

/// Insertion-ordered set of routes with first-match lookup.
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: Vec<Route>,
}

impl RouteTable {
    /// Run all three construction phases over the author-declared routes.
    pub fn build(routes: Vec<Route>) -> Self {
        let mut table = Self { entries: routes };
        table.synthesize_ancestors();
        table.inject_defaults();
        table
    }

    /// All entries, synthetic included, in lookup order.
    pub fn routes(&self) -> &[Route] {
        &self.entries
    }

    /// First entry whose matcher accepts the path, with its bindings.
    pub fn lookup(&self, path: &str) -> Option<(&Route, Bindings)> {
        self.entries
            .iter()
            .find_map(|route| route.try_match(path).map(|vars| (route, vars)))
    }

    fn contains(&self, pattern: &str) -> bool {
        self.entries.iter().any(|r| r.pattern() == pattern)
    }

    /// Phase B: deepest-first upward fill. Each missing prefix becomes a
    /// synthetic directory whose `readdir` lists the unique first segments
    /// of the keys one level below it.
    ///
    /// One level per pass: processing depth `d` only ever inserts depth
    /// `d - 1` parents, and any synthetic key at depth `d` was inserted
    /// during the `d + 1` pass. So when a parent is created, its child set
    /// is already final — no recursion needed.
    fn synthesize_ancestors(&mut self) {
        let max_depth = self
            .entries
            .iter()
            .map(|r| depth(r.pattern()))
            .max()
            .unwrap_or(0);

        for d in (1..=max_depth).rev() {
            let at_depth: Vec<String> = self
                .entries
                .iter()
                .map(|r| r.pattern().to_string())
                .filter(|p| depth(p) == d)
                .collect();
            for path in at_depth {
                if let Some(p) = parent(&path) {
                    if !self.contains(&p) {
                        let children = self.direct_children(&p);
                        self.entries.push(synthetic_dir(&p, children));
                    }
                }
            }
        }
    }

    /// Unique first segments of existing keys strictly one segment deeper
    /// than `prefix`, in insertion order.
    fn direct_children(&self, prefix: &str) -> Vec<String> {
        let base = if prefix == "/" { 0 } else { depth(prefix) };
        let lead = if prefix == "/" {
            "/".to_string()
        } else {
            format!("{prefix}/")
        };
        let mut children = Vec::new();
        for route in &self.entries {
            let key = route.pattern();
            if depth(key) == base + 1 && key.starts_with(&lead) {
                let name = &key[lead.len()..];
                if !children.iter().any(|c| c == name) {
                    children.push(name.to_string());
                }
            }
        }
        children
    }

    /// Phase C: inject the standard companions for whatever each route
    /// declares. Author-supplied handlers always win.
    fn inject_defaults(&mut self) {
        for route in &mut self.entries {
            if route.defines(Op::Readdir) {
                route.default_handler(
                    Op::Getattr,
                    handler(|_cx| async {
                        Ok(Reply::Attr {
                            st_mode: S_IFDIR | 0o755,
                            st_nlink: 3,
                            st_size: 0,
                        })
                    }),
                );
                route.default_handler(Op::Opendir, handler(|_cx| async { Ok(Reply::Handle(0)) }));
                route.default_handler(Op::Releasedir, handler(|_cx| async { Ok(Reply::Done) }));
            } else if let Some(readlink) = route.handler_for(Op::Readlink).cloned() {
                route.default_handler(
                    Op::Getattr,
                    handler(move |cx: OpContext| {
                        let readlink = readlink.clone();
                        async move {
                            let target = match readlink(cx).await? {
                                Reply::Data(bytes) => bytes,
                                _ => return Err(crate::errno::FsError::io("readlink reply shape")),
                            };
                            Ok(Reply::Attr {
                                st_mode: S_IFLNK | 0o444,
                                st_nlink: 1,
                                st_size: target.len() as u64 + 1,
                            })
                        }
                    }),
                );
            } else if route.defines(Op::Read) || route.defines(Op::Write) {
                let mode = S_IFREG
                    | if route.defines(Op::Read) { 0o444 } else { 0 }
                    | if route.defines(Op::Write) { 0o222 } else { 0 };
                route.default_handler(
                    Op::Getattr,
                    handler(move |_cx| async move {
                        Ok(Reply::Attr {
                            st_mode: mode,
                            st_nlink: 1,
                            st_size: RAW_FILE_SIZE,
                        })
                    }),
                );
                route.default_handler(Op::Open, handler(|_cx| async { Ok(Reply::Handle(0)) }));
                route.default_handler(Op::Release, handler(|_cx| async { Ok(Reply::Done) }));
            }
        }
    }
}

/// Segment count of a pattern; `/` is depth 0.
fn depth(pattern: &str) -> usize {
    if pattern == "/" {
        0
    } else {
        pattern.matches('/').count()
    }
}

/// One segment up; `None` above the root.
fn parent(pattern: &str) -> Option<String> {
    if pattern == "/" {
        return None;
    }
    match pattern.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(pattern[..idx].to_string()),
        None => None,
    }
}

fn synthetic_dir(pattern: &str, children: Vec<String>) -> Route {
    Route::synthetic(pattern).on(Op::Readdir, move |_cx| {
        let mut entries = vec![".".to_string(), "..".to_string()];
        entries.extend(children.iter().cloned());
        async move { Ok(Reply::Entries(entries)) }
    })
}
