//! Contents adapter: whole-value get/set expanded to the POSIX file surface.
//!
//! Route authors describe a file by an async getter (and optional setter)
//! over live browser state; the adapter supplies `getattr`, `open`, `read`,
//! `write`, `release`, and `truncate` on top. `open` fetches the whole value
//! once into a per-open buffer, so authors never implement seek semantics
//! against live state (screenshots in particular). Reads within one open
//! return the bytes captured at open time; the shell's `cat f` pattern of
//! open/read-to-EOF/close makes that the useful contract.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::errno::{FsError, FsResult};
use crate::route::{OpContext, Route, S_IFREG};
use crate::wire::{Op, Reply};

/// State behind one open file handle.
#[derive(Debug, Clone)]
pub struct OpenFile {
    pub path: String,
    pub buf: Vec<u8>,
}

/// Process-wide registry of open file handles.
///
/// Handles are nonzero and monotonically increasing; an ID is never reused
/// within a session. Each open of the same path gets an independent buffer.
/// The lock is only held across non-await sections.
#[derive(Debug, Default)]
pub struct HandleTable {
    next: AtomicU64,
    open: Mutex<HashMap<u64, OpenFile>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            open: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, OpenFile>> {
        // Handler tasks never panic while holding the lock; treat a
        // poisoned lock as still usable.
        self.open.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a freshly fetched buffer and return its new handle.
    pub fn allocate(&self, path: &str, buf: Vec<u8>) -> u64 {
        let fh = self.next.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(
            fh,
            OpenFile {
                path: path.to_string(),
                buf,
            },
        );
        fh
    }

    /// The `[offset, offset+size)` slice of the handle's buffer, clamped to
    /// the buffer length.
    pub fn read_at(&self, fh: u64, offset: u64, size: u64) -> FsResult<Vec<u8>> {
        let open = self.lock();
        let file = open.get(&fh).ok_or_else(|| bad_handle(fh))?;
        let len = file.buf.len() as u64;
        let start = offset.min(len) as usize;
        let end = offset.saturating_add(size).min(len) as usize;
        Ok(file.buf[start..end].to_vec())
    }

    /// Copy `data` into the handle's buffer at `offset`, growing it with
    /// zero padding if needed. Returns the entire updated buffer.
    pub fn write_at(&self, fh: u64, offset: u64, data: &[u8]) -> FsResult<Vec<u8>> {
        let mut open = self.lock();
        let file = open.get_mut(&fh).ok_or_else(|| bad_handle(fh))?;
        let offset = offset as usize;
        let needed = offset + data.len();
        if file.buf.len() < needed {
            file.buf.resize(needed, 0);
        }
        file.buf[offset..needed].copy_from_slice(data);
        Ok(file.buf.clone())
    }

    /// Replace the buffer of every open handle for `path`. Used by
    /// `truncate` to broadcast the reshaped contents.
    pub fn set_for_path(&self, path: &str, buf: &[u8]) {
        let mut open = self.lock();
        for file in open.values_mut().filter(|f| f.path == path) {
            file.buf = buf.to_vec();
        }
    }

    /// Discard the handle's buffer and free the handle.
    pub fn release(&self, fh: u64) -> FsResult<()> {
        self.lock().remove(&fh).map(|_| ()).ok_or_else(|| bad_handle(fh))
    }

    /// Remove and return the handle's state. For routes that act on the
    /// accumulated buffer at release time.
    pub fn take(&self, fh: u64) -> Option<OpenFile> {
        self.lock().remove(&fh)
    }

    #[cfg(test)]
    pub(crate) fn open_count(&self) -> usize {
        self.lock().len()
    }
}

fn bad_handle(fh: u64) -> FsError {
    FsError::io(format!("unknown file handle {fh}"))
}

type GetFuture = std::pin::Pin<Box<dyn Future<Output = FsResult<Vec<u8>>> + Send>>;
type GetFn = Arc<dyn Fn(OpContext) -> GetFuture + Send + Sync>;
type SetFuture = std::pin::Pin<Box<dyn Future<Output = FsResult<()>> + Send>>;
type SetFn = Arc<dyn Fn(OpContext, String) -> SetFuture + Send + Sync>;

/// The whole-value description of a file.
#[derive(Clone)]
pub struct Contents {
    get: GetFn,
    set: Option<SetFn>,
}

impl Contents {
    /// A read-only file described by its getter.
    pub fn read_only<F, Fut>(get: F) -> Self
    where
        F: Fn(OpContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FsResult<Vec<u8>>> + Send + 'static,
    {
        Self {
            get: Arc::new(move |cx| Box::pin(get(cx))),
            set: None,
        }
    }

    /// A read-write file. The setter receives the entire updated buffer
    /// decoded as UTF-8 after every write chunk; authors wanting patch
    /// semantics override `write` on the route instead.
    pub fn read_write<F, Fut, G, Gut>(get: F, set: G) -> Self
    where
        F: Fn(OpContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FsResult<Vec<u8>>> + Send + 'static,
        G: Fn(OpContext, String) -> Gut + Send + Sync + 'static,
        Gut: Future<Output = FsResult<()>> + Send + 'static,
    {
        Self {
            get: Arc::new(move |cx| Box::pin(get(cx))),
            set: Some(Arc::new(move |cx, text| Box::pin(set(cx, text)))),
        }
    }

    /// Install the full file-operation surface on a route.
    ///
    /// `write` and `truncate` are only registered when a setter exists; the
    /// reported mode's write bits agree with that.
    pub fn install(self, route: Route, handles: &Arc<HandleTable>) -> Route {
        let mode = S_IFREG | 0o444 | if self.set.is_some() { 0o222 } else { 0 };

        let get = self.get.clone();
        let route = route.on(Op::Getattr, move |cx| {
            let get = get.clone();
            async move {
                let data = get(cx).await?;
                Ok(Reply::Attr {
                    st_mode: mode,
                    st_nlink: 1,
                    st_size: data.len() as u64,
                })
            }
        });

        let get = self.get.clone();
        let open_handles = handles.clone();
        let route = route.on(Op::Open, move |cx| {
            let get = get.clone();
            let handles = open_handles.clone();
            async move {
                let path = cx.path.clone();
                let data = get(cx).await?;
                Ok(Reply::Handle(handles.allocate(&path, data)))
            }
        });

        let read_handles = handles.clone();
        let route = route.on(Op::Read, move |cx| {
            let handles = read_handles.clone();
            async move {
                let data = handles.read_at(cx.fh()?, cx.offset()?, cx.size()?)?;
                Ok(Reply::Data(data))
            }
        });

        let release_handles = handles.clone();
        let mut route = route.on(Op::Release, move |cx| {
            let handles = release_handles.clone();
            async move {
                handles.release(cx.fh()?)?;
                Ok(Reply::Done)
            }
        });

        if let Some(set) = self.set {
            let write_set = set.clone();
            let write_handles = handles.clone();
            route = route.on(Op::Write, move |cx| {
                let set = write_set.clone();
                let handles = write_handles.clone();
                async move {
                    let data = cx.buf()?.to_vec();
                    let updated = handles.write_at(cx.fh()?, cx.offset()?, &data)?;
                    let text = String::from_utf8_lossy(&updated).into_owned();
                    set(cx, text).await?;
                    Ok(Reply::Written(data.len() as u64))
                }
            });

            let get = self.get.clone();
            let truncate_handles = handles.clone();
            route = route.on(Op::Truncate, move |cx| {
                let get = get.clone();
                let set = set.clone();
                let handles = truncate_handles.clone();
                async move {
                    let size = cx.size()? as usize;
                    let mut data = get(cx.clone()).await?;
                    data.resize(size, 0);
                    handles.set_for_path(&cx.path, &data);
                    let text = String::from_utf8_lossy(&data).into_owned();
                    set(cx, text).await?;
                    Ok(Reply::Done)
                }
            });
        }

        route
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn ctx(path: &str) -> OpContext {
        OpContext {
            path: path.to_string(),
            ..OpContext::default()
        }
    }

    async fn call(route: &Route, op: Op, cx: OpContext) -> FsResult<Reply> {
        route
            .handler_for(op)
            .unwrap_or_else(|| panic!("route missing {}", op.name()))
            .clone()(cx)
        .await
    }

    fn fixed(data: &'static [u8]) -> Contents {
        Contents::read_only(move |_cx| async move { Ok(data.to_vec()) })
    }

    #[tokio::test]
    async fn test_handle_ids_are_nonzero_and_unique() {
        let handles = HandleTable::new();
        let a = handles.allocate("/a", vec![]);
        let b = handles.allocate("/a", vec![]);
        assert_ne!(a, 0);
        assert_ne!(a, b);
        handles.release(a).unwrap();
        let c = handles.allocate("/a", vec![]);
        assert_ne!(c, a, "handle ids are never reused");
    }

    #[tokio::test]
    async fn test_open_captures_getter_value() {
        let handles = Arc::new(HandleTable::new());
        let route = fixed(b"hello").install(Route::new("/f"), &handles);

        let Reply::Handle(fh) = call(&route, Op::Open, ctx("/f")).await.unwrap() else {
            panic!("open did not return a handle");
        };
        let reply = call(
            &route,
            Op::Read,
            OpContext {
                fh: Some(fh),
                offset: Some(0),
                size: Some(1024),
                ..ctx("/f")
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, Reply::Data(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_read_clamps_to_buffer() {
        let handles = Arc::new(HandleTable::new());
        let fh = handles.allocate("/f", b"abcdef".to_vec());
        assert_eq!(handles.read_at(fh, 4, 10).unwrap(), b"ef");
        assert_eq!(handles.read_at(fh, 100, 10).unwrap(), b"");
        assert_eq!(handles.read_at(fh, 2, 2).unwrap(), b"cd");
    }

    #[tokio::test]
    async fn test_chunked_write_grows_and_reports_chunk_len() {
        let seen = Arc::new(StdMutex::new(Vec::<String>::new()));
        let store = seen.clone();
        let contents = Contents::read_write(
            |_cx| async { Ok(Vec::new()) },
            move |_cx, text| {
                let store = store.clone();
                async move {
                    store.lock().unwrap().push(text);
                    Ok(())
                }
            },
        );
        let handles = Arc::new(HandleTable::new());
        let route = contents.install(Route::new("/f"), &handles);

        let Reply::Handle(fh) = call(&route, Op::Open, ctx("/f")).await.unwrap() else {
            panic!("no handle");
        };

        let write = |offset: u64, data: &[u8]| OpContext {
            fh: Some(fh),
            offset: Some(offset),
            buf: Some(data.to_vec()),
            ..ctx("/f")
        };

        let reply = call(&route, Op::Write, write(0, b"hello")).await.unwrap();
        assert_eq!(reply, Reply::Written(5));
        let reply = call(&route, Op::Write, write(5, b" world")).await.unwrap();
        assert_eq!(reply, Reply::Written(6));

        let reply = call(
            &route,
            Op::Read,
            OpContext {
                fh: Some(fh),
                offset: Some(0),
                size: Some(11),
                ..ctx("/f")
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, Reply::Data(b"hello world".to_vec()));

        let texts = seen.lock().unwrap();
        assert_eq!(texts.as_slice(), ["hello", "hello world"]);
    }

    #[tokio::test]
    async fn test_write_beyond_end_zero_pads() {
        let handles = Arc::new(HandleTable::new());
        let fh = handles.allocate("/f", b"ab".to_vec());
        let updated = handles.write_at(fh, 4, b"xy").unwrap();
        assert_eq!(updated, b"ab\0\0xy");
    }

    #[tokio::test]
    async fn test_truncate_grows_with_zero_padding() {
        let seen = Arc::new(StdMutex::new(Vec::<String>::new()));
        let store = seen.clone();
        let contents = Contents::read_write(
            |_cx| async { Ok(b"abc".to_vec()) },
            move |_cx, text| {
                let store = store.clone();
                async move {
                    store.lock().unwrap().push(text);
                    Ok(())
                }
            },
        );
        let handles = Arc::new(HandleTable::new());
        let route = contents.install(Route::new("/f"), &handles);

        call(
            &route,
            Op::Truncate,
            OpContext {
                size: Some(5),
                ..ctx("/f")
            },
        )
        .await
        .unwrap();

        let texts = seen.lock().unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].as_bytes(), b"abc\0\0");
    }

    #[tokio::test]
    async fn test_truncate_updates_open_handles_of_same_path() {
        let contents = Contents::read_write(
            |_cx| async { Ok(b"abcdef".to_vec()) },
            |_cx, _text| async { Ok(()) },
        );
        let handles = Arc::new(HandleTable::new());
        let route = contents.install(Route::new("/f"), &handles);

        let fh = handles.allocate("/f", b"abcdef".to_vec());
        let other = handles.allocate("/other", b"zzz".to_vec());

        call(
            &route,
            Op::Truncate,
            OpContext {
                size: Some(2),
                ..ctx("/f")
            },
        )
        .await
        .unwrap();

        assert_eq!(handles.read_at(fh, 0, 100).unwrap(), b"ab");
        assert_eq!(handles.read_at(other, 0, 100).unwrap(), b"zzz");
    }

    #[tokio::test]
    async fn test_getattr_reports_size_and_mode() {
        let handles = Arc::new(HandleTable::new());
        let ro = fixed(b"12345").install(Route::new("/ro"), &handles);
        let reply = call(&ro, Op::Getattr, ctx("/ro")).await.unwrap();
        assert_eq!(
            reply,
            Reply::Attr {
                st_mode: S_IFREG | 0o444,
                st_nlink: 1,
                st_size: 5
            }
        );
        assert!(!ro.defines(Op::Write));

        let rw = Contents::read_write(
            |_cx| async { Ok(Vec::new()) },
            |_cx, _t| async { Ok(()) },
        )
        .install(Route::new("/rw"), &handles);
        let reply = call(&rw, Op::Getattr, ctx("/rw")).await.unwrap();
        assert_eq!(
            reply,
            Reply::Attr {
                st_mode: S_IFREG | 0o666,
                st_nlink: 1,
                st_size: 0
            }
        );
    }

    #[tokio::test]
    async fn test_release_frees_handle() {
        let handles = Arc::new(HandleTable::new());
        let route = fixed(b"x").install(Route::new("/f"), &handles);

        let Reply::Handle(fh) = call(&route, Op::Open, ctx("/f")).await.unwrap() else {
            panic!("no handle");
        };
        assert_eq!(handles.open_count(), 1);
        call(
            &route,
            Op::Release,
            OpContext {
                fh: Some(fh),
                ..ctx("/f")
            },
        )
        .await
        .unwrap();
        assert_eq!(handles.open_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_opens_get_independent_buffers() {
        let handles = Arc::new(HandleTable::new());
        let a = handles.allocate("/f", b"one".to_vec());
        let b = handles.allocate("/f", b"one".to_vec());
        handles.write_at(a, 0, b"two").unwrap();
        assert_eq!(handles.read_at(b, 0, 10).unwrap(), b"one");
    }
}
