//! Route records and handler plumbing.
//!
//! A route is a path pattern plus a sparse map from operation to handler.
//! Handlers are async closures over shared state (the browser capability,
//! the handle table, the per-tab registries); they receive an [`OpContext`]
//! carrying the request's operation fields merged with the variables bound
//! by the pattern match.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::errno::{FsError, FsResult};
use crate::pattern::{Bindings, Pattern};
use crate::wire::{Op, Reply};

/// File-type bits for `st_mode`, as the host adapter expects them.
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o40000;
pub const S_IFLNK: u32 = 0o120000;

/// A request as seen by a handler: operation fields plus bound variables.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    pub path: String,
    pub fh: Option<u64>,
    pub offset: Option<u64>,
    pub size: Option<u64>,
    pub mode: Option<u32>,
    /// Decoded request bytes (base64 already stripped by the dispatcher).
    pub buf: Option<Vec<u8>>,
    pub vars: Bindings,
}

impl OpContext {
    pub fn fh(&self) -> FsResult<u64> {
        self.fh.ok_or_else(|| FsError::io("request missing fh"))
    }

    pub fn offset(&self) -> FsResult<u64> {
        self.offset
            .ok_or_else(|| FsError::io("request missing offset"))
    }

    pub fn size(&self) -> FsResult<u64> {
        self.size.ok_or_else(|| FsError::io("request missing size"))
    }

    pub fn buf(&self) -> FsResult<&[u8]> {
        self.buf
            .as_deref()
            .ok_or_else(|| FsError::io("request missing buf"))
    }
}

/// Boxed handler future; all handlers are `Send` so requests can run on any
/// worker.
pub type HandlerFuture = Pin<Box<dyn Future<Output = FsResult<Reply>> + Send>>;

/// One operation handler.
pub type Handler = Arc<dyn Fn(OpContext) -> HandlerFuture + Send + Sync>;

/// Wrap a plain async closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(OpContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FsResult<Reply>> + Send + 'static,
{
    Arc::new(move |cx| Box::pin(f(cx)))
}

/// A path pattern plus its operation handlers.
pub struct Route {
    pattern: Pattern,
    usage: Vec<String>,
    synthetic: bool,
    handlers: HashMap<Op, Handler>,
}

impl Route {
    /// A new author-declared route for the given pattern.
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: Pattern::compile(pattern),
            usage: Vec::new(),
            synthetic: false,
            handlers: HashMap::new(),
        }
    }

    /// A route introduced by ancestor synthesis; suppressed in the routes
    /// listing view.
    pub fn synthetic(pattern: &str) -> Self {
        let mut route = Self::new(pattern);
        route.synthetic = true;
        route
    }

    /// Attach one usage hint line.
    pub fn usage(mut self, hint: &str) -> Self {
        self.usage.push(hint.to_string());
        self
    }

    /// Attach an ordered sequence of usage hints.
    pub fn usages<'a>(mut self, hints: impl IntoIterator<Item = &'a str>) -> Self {
        self.usage.extend(hints.into_iter().map(str::to_string));
        self
    }

    /// Register a handler for an operation, replacing any previous one.
    pub fn on<F, Fut>(self, op: Op, f: F) -> Self
    where
        F: Fn(OpContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FsResult<Reply>> + Send + 'static,
    {
        self.on_handler(op, handler(f))
    }

    /// Register a pre-wrapped handler.
    pub fn on_handler(mut self, op: Op, h: Handler) -> Self {
        self.handlers.insert(op, h);
        self
    }

    /// Register a handler only if the operation has none yet. Used by the
    /// default-injection pass so author handlers always win.
    pub(crate) fn default_handler(&mut self, op: Op, h: Handler) {
        self.handlers.entry(op).or_insert(h);
    }

    pub fn pattern(&self) -> &str {
        self.pattern.source()
    }

    pub fn usage_hints(&self) -> &[String] {
        &self.usage
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub fn defines(&self, op: Op) -> bool {
        self.handlers.contains_key(&op)
    }

    pub fn handler_for(&self, op: Op) -> Option<&Handler> {
        self.handlers.get(&op)
    }

    /// Match a path against this route's pattern.
    pub fn try_match(&self, path: &str) -> Option<Bindings> {
        self.pattern.try_match(path)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ops: Vec<&str> = self.handlers.keys().map(Op::name).collect();
        ops.sort_unstable();
        f.debug_struct("Route")
            .field("pattern", &self.pattern.source())
            .field("synthetic", &self.synthetic)
            .field("ops", &ops)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_route_dispatches_registered_handler() {
        let route = Route::new("/ping").on(Op::Getattr, |_cx| async {
            Ok(Reply::Attr {
                st_mode: S_IFREG | 0o444,
                st_nlink: 1,
                st_size: 4,
            })
        });

        assert!(route.defines(Op::Getattr));
        assert!(!route.defines(Op::Read));

        let h = route.handler_for(Op::Getattr).unwrap().clone();
        let reply = h(OpContext::default()).await.unwrap();
        assert_eq!(
            reply,
            Reply::Attr {
                st_mode: S_IFREG | 0o444,
                st_nlink: 1,
                st_size: 4
            }
        );
    }

    #[test]
    fn test_default_handler_does_not_override_author() {
        let mut route = Route::new("/f").on(Op::Open, |_cx| async { Ok(Reply::Handle(7)) });
        route.default_handler(Op::Open, handler(|_cx| async { Ok(Reply::Handle(0)) }));
        route.default_handler(Op::Release, handler(|_cx| async { Ok(Reply::Done) }));

        assert!(route.defines(Op::Release));
        let open = route.handler_for(Op::Open).unwrap().clone();
        let reply = futures_block_on(open(OpContext::default())).unwrap();
        assert_eq!(reply, Reply::Handle(7));
    }

    // Small helper so non-async tests can poll a handler future.
    fn futures_block_on<T>(fut: impl Future<Output = T>) -> T {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime")
            .block_on(fut)
    }

    #[test]
    fn test_op_context_accessors() {
        let cx = OpContext {
            fh: Some(3),
            offset: Some(10),
            ..OpContext::default()
        };
        assert_eq!(cx.fh().unwrap(), 3);
        assert_eq!(cx.offset().unwrap(), 10);
        assert!(cx.size().is_err());
        assert!(cx.buf().is_err());
    }
}
