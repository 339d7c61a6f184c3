//! tabfs-kernel: the request router and virtual-filesystem engine.
//!
//! A host-side filesystem adapter turns POSIX syscalls into JSON request
//! messages; this crate receives them over a [`transport::Transport`],
//! routes them through a table of path patterns, and services them by
//! invoking [`browser::Browser`] capabilities.
//!
//! The pieces, leaves first:
//!
//! - **pattern**: compiles route patterns with typed wildcards into
//!   matchers that bind path variables
//! - **contents**: expands a whole-value getter/setter into the full
//!   POSIX file-op surface with per-open buffers
//! - **table**: the ordered route set, with ancestor-directory synthesis
//!   and default-handler injection
//! - **dispatch**: matches requests to routes, enforces the per-request
//!   timeout, encodes replies and errors
//! - **routes**: the catalog exposing tabs, windows, extensions, the
//!   debugger, form inputs, and the runtime itself

pub mod browser;
pub mod contents;
pub mod dispatch;
pub mod errno;
pub mod pattern;
pub mod route;
pub mod routes;
pub mod sanitize;
pub mod table;
pub mod transport;
pub mod wire;

pub use browser::Browser;
pub use dispatch::{Engine, EngineConfig};
pub use errno::{BrowserError, BrowserResult, FsError, FsResult};
