//! Wire protocol: newline-delimited JSON request/response framing over the
//! workspace socket.
//!
//! Each request carries a method name, a JSON-encoded argument record, and
//! an optional deadline; each response carries a success flag, a
//! JSON-encoded data payload, and a nullable error string (§6 "Wire
//! protocol"). Framing is one JSON object per line -- simpler than a
//! separate length prefix, and sufficient because `serde_json` values never
//! contain a bare newline once serialized.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// One RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// The RPC method name, e.g. `"Create"`, `"WatchEvents"`.
    pub method: String,
    /// Method-specific arguments, as a JSON object.
    #[serde(default)]
    pub args: Value,
    /// Client-side deadline for this call, in milliseconds. `None` means no
    /// deadline beyond the server's own per-RPC bound.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

/// One RPC response. For streaming methods (`WatchEvents`), the server
/// writes a sequence of these, one per event, until the client disconnects
/// or the stream is canceled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Reads one newline-delimited JSON [`Request`] from `reader`.
///
/// Returns `Ok(None)` on a clean EOF (the client closed the connection).
pub async fn read_request<R>(reader: &mut BufReader<R>) -> std::io::Result<Option<Request>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str(trimmed) {
        Ok(req) => Ok(Some(req)),
        Err(e) => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
    }
}

/// Writes one newline-delimited JSON [`Response`] to `writer` and flushes.
pub async fn write_response<W>(writer: &mut W, response: &Response) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(response)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_ok_has_no_error() {
        let r = Response::ok(serde_json::json!({"a": 1}));
        assert!(r.success);
        assert!(r.error.is_none());
    }

    #[test]
    fn request_roundtrip() {
        let req = Request {
            method: "Health".to_string(),
            args: serde_json::json!({}),
            deadline_ms: Some(500),
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back.method, "Health");
        assert_eq!(back.deadline_ms, Some(500));
    }
}
