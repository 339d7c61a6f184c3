//! Wire protocol types.
//!
//! Messages are JSON objects. Requests carry `{id, op, path, ...opFields}`;
//! responses echo `{id, op, ...resultFields}` or `{id, op, error}`. A `buf`
//! field in either direction holds arbitrary bytes, base64-encoded on the
//! wire; the dispatcher decodes on ingress and re-encodes on egress so
//! handlers only ever see raw bytes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errno::{FsError, FsResult};

/// The filesystem verbs the host adapter sends.
///
/// `mkdir` is not part of the core set but the adapter emits it for both its
/// FUSE `mkdir` and `create` callbacks, so routes that create entries answer
/// it alongside `mknod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Getattr,
    Readdir,
    Opendir,
    Releasedir,
    Open,
    Read,
    Write,
    Release,
    Truncate,
    Readlink,
    Unlink,
    Mknod,
    Mkdir,
}

impl Op {
    /// The lowercase name echoed back in responses.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Getattr => "getattr",
            Op::Readdir => "readdir",
            Op::Opendir => "opendir",
            Op::Releasedir => "releasedir",
            Op::Open => "open",
            Op::Read => "read",
            Op::Write => "write",
            Op::Release => "release",
            Op::Truncate => "truncate",
            Op::Readlink => "readlink",
            Op::Unlink => "unlink",
            Op::Mknod => "mknod",
            Op::Mkdir => "mkdir",
        }
    }
}

/// A decoded request from the host adapter.
///
/// Operation-specific fields are optional; the host only sends the ones the
/// operation uses (`flags` is parsed and ignored).
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub id: u64,
    pub op: Op,
    pub path: String,
    #[serde(default)]
    pub fh: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mode: Option<u32>,
    #[serde(default)]
    pub flags: Option<i64>,
    /// Base64 on the wire; decoded by the dispatcher before handlers run.
    #[serde(default)]
    pub buf: Option<String>,
}

impl Request {
    /// Decode the base64 `buf` field, if present.
    pub fn decode_buf(&self) -> FsResult<Option<Vec<u8>>> {
        match &self.buf {
            None => Ok(None),
            Some(b64) => BASE64
                .decode(b64)
                .map(Some)
                .map_err(|e| FsError::io(format!("bad base64 buf: {e}"))),
        }
    }
}

/// The result payload of a successful operation.
///
/// The dispatcher flattens these fields into the response object next to
/// `id` and `op`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `getattr` result.
    Attr {
        st_mode: u32,
        st_nlink: u32,
        st_size: u64,
    },
    /// `readdir` result; the list begins with `.` and `..`.
    Entries(Vec<String>),
    /// `open`/`opendir` result.
    Handle(u64),
    /// `read`/`readlink` result; re-encoded to base64 on egress.
    Data(Vec<u8>),
    /// `write` result: the number of bytes accepted.
    Written(u64),
    /// Operations with no result fields (`release`, `truncate`, ...).
    Done,
}

impl Reply {
    fn fields(&self) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        match self {
            Reply::Attr {
                st_mode,
                st_nlink,
                st_size,
            } => {
                map.insert("st_mode".into(), Value::from(*st_mode));
                map.insert("st_nlink".into(), Value::from(*st_nlink));
                map.insert("st_size".into(), Value::from(*st_size));
            }
            Reply::Entries(entries) => {
                map.insert("entries".into(), Value::from(entries.clone()));
            }
            Reply::Handle(fh) => {
                map.insert("fh".into(), Value::from(*fh));
            }
            Reply::Data(bytes) => {
                map.insert("buf".into(), Value::from(BASE64.encode(bytes)));
            }
            Reply::Written(size) => {
                map.insert("size".into(), Value::from(*size));
            }
            Reply::Done => {}
        }
        map
    }
}

/// Assemble a success response.
pub fn response(id: u64, op: Op, reply: &Reply) -> Value {
    let mut map = reply.fields();
    map.insert("op".into(), Value::from(op.name()));
    map.insert("id".into(), Value::from(id));
    Value::Object(map)
}

/// Assemble an error response carrying an errno.
pub fn error_response(id: u64, op: Op, errno: i32) -> Value {
    serde_json::json!({ "op": op.name(), "id": id, "error": errno })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_minimal() {
        let req: Request =
            serde_json::from_value(serde_json::json!({"id": 7, "op": "getattr", "path": "/tabs"}))
                .unwrap();
        assert_eq!(req.id, 7);
        assert_eq!(req.op, Op::Getattr);
        assert_eq!(req.path, "/tabs");
        assert!(req.fh.is_none());
    }

    #[test]
    fn test_request_parses_write_fields() {
        let req: Request = serde_json::from_value(serde_json::json!({
            "id": 1, "op": "write", "path": "/x",
            "buf": BASE64.encode(b"hello"), "offset": 3, "fh": 12, "flags": 0
        }))
        .unwrap();
        assert_eq!(req.decode_buf().unwrap().unwrap(), b"hello");
        assert_eq!(req.offset, Some(3));
        assert_eq!(req.fh, Some(12));
    }

    #[test]
    fn test_bad_base64_is_io_error() {
        let req: Request = serde_json::from_value(serde_json::json!({
            "id": 1, "op": "write", "path": "/x", "buf": "%%%"
        }))
        .unwrap();
        assert_eq!(req.decode_buf().unwrap_err().errno(), crate::errno::EIO);
    }

    #[test]
    fn test_response_flattens_reply_fields() {
        let resp = response(
            9,
            Op::Getattr,
            &Reply::Attr {
                st_mode: 0o40755,
                st_nlink: 3,
                st_size: 0,
            },
        );
        assert_eq!(resp["id"], 9);
        assert_eq!(resp["op"], "getattr");
        assert_eq!(resp["st_mode"], 0o40755);
        assert_eq!(resp["st_nlink"], 3);
    }

    #[test]
    fn test_data_reply_is_base64() {
        let resp = response(2, Op::Read, &Reply::Data(b"\x00\x01binary".to_vec()));
        let decoded = BASE64.decode(resp["buf"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, b"\x00\x01binary");
    }

    #[test]
    fn test_error_response_shape() {
        let resp = error_response(4, Op::Open, 45);
        assert_eq!(resp, serde_json::json!({"op": "open", "id": 4, "error": 45}));
    }
}
