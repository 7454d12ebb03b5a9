//! RESP2 framing
//!
//! Commands go out as arrays of bulk strings. Replies are decoded with an
//! explicit stack, so deeply nested arrays cannot overflow the call stack.

use keyshard_types::{BackendError, BackendResult, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};

const CRLF: &[u8] = b"\r\n";

/// Largest bulk string a store will send (512 MiB)
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Longest header or simple-reply line accepted, CRLF included
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Array slots reserved up front; longer arrays grow as items arrive
const MAX_ARRAY_PREALLOC: usize = 1024;

/// One decoded line of a reply
enum Frame {
    Value(Value),
    Array(usize),
    Error(String),
}

/// Append `arg` to `out` as bulk strings, flattening lists.
fn push_args(out: &mut Vec<Vec<u8>>, arg: &Value) -> BackendResult<()> {
    match arg {
        Value::Nil => {
            return Err(BackendError::Protocol("nil cannot be sent as an argument".to_string()))
        }
        Value::Int(n) => out.push(n.to_string().into_bytes()),
        Value::Float(f) => out.push(f.to_string().into_bytes()),
        Value::Str(s) => out.push(s.as_bytes().to_vec()),
        Value::Bytes(b) => out.push(b.clone()),
        Value::List(items) => {
            for item in items {
                push_args(out, item)?;
            }
        }
    }
    Ok(())
}

/// Encode `verb args...` as a RESP array of bulk strings
pub fn encode_command(verb: &str, args: &[Value]) -> BackendResult<Vec<u8>> {
    let mut parts = vec![verb.as_bytes().to_vec()];
    for arg in args {
        push_args(&mut parts, arg)?;
    }

    let mut buf = Vec::with_capacity(16 + parts.iter().map(|p| p.len() + 16).sum::<usize>());
    buf.extend_from_slice(format!("*{}\r\n", parts.len()).as_bytes());
    for part in &parts {
        buf.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        buf.extend_from_slice(part);
        buf.extend_from_slice(CRLF);
    }
    Ok(buf)
}

/// Parse a length header. `None` is the nil marker `-1`.
fn parse_len(line: &str, what: &str) -> BackendResult<Option<usize>> {
    let len = line
        .parse::<i64>()
        .map_err(|_| BackendError::Protocol(format!("invalid {} length: {:?}", what, line)))?;
    if len < 0 {
        return Ok(None);
    }
    usize::try_from(len)
        .map(Some)
        .map_err(|_| BackendError::Protocol(format!("{} length {} is too large", what, len)))
}

fn bulk_value(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(s) => Value::Str(s),
        Err(e) => Value::Bytes(e.into_bytes()),
    }
}

/// A buffered RESP2 connection
#[derive(Debug)]
pub struct RespStream<S> {
    inner: BufStream<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> RespStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: BufStream::new(stream),
        }
    }

    /// Send a command and wait for its reply
    pub async fn call(&mut self, verb: &str, args: &[Value]) -> BackendResult<Value> {
        self.send(verb, args).await?;
        self.read_reply().await
    }

    pub async fn send(&mut self, verb: &str, args: &[Value]) -> BackendResult<()> {
        let buf = encode_command(verb, args)?;
        self.inner.write_all(&buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Read one complete reply.
    ///
    /// An error reply at the top level becomes `BackendError::Server`. An
    /// error nested inside an array is read to the end of the array first,
    /// so the stream stays in sync, and then reported the same way.
    pub async fn read_reply(&mut self) -> BackendResult<Value> {
        // (items so far, expected length) for every open array
        let mut open: Vec<(Vec<Value>, usize)> = Vec::new();
        let mut nested_error: Option<String> = None;

        loop {
            let mut value = match self.read_frame().await? {
                Frame::Value(value) => value,
                Frame::Array(0) => Value::List(Vec::new()),
                Frame::Array(len) => {
                    open.push((Vec::with_capacity(len.min(MAX_ARRAY_PREALLOC)), len));
                    continue;
                }
                Frame::Error(message) if open.is_empty() => {
                    return Err(BackendError::Server(message));
                }
                Frame::Error(message) => {
                    nested_error.get_or_insert(message);
                    Value::Nil
                }
            };

            // Close every array this value completes.
            loop {
                let Some((items, expected)) = open.last_mut() else {
                    return match nested_error {
                        Some(message) => Err(BackendError::Server(message)),
                        None => Ok(value),
                    };
                };
                items.push(value);
                if items.len() < *expected {
                    break;
                }
                let (items, _) = open.pop().ok_or_else(|| {
                    BackendError::Protocol("array stack underflow".to_string())
                })?;
                value = Value::List(items);
            }
        }
    }

    async fn read_line(&mut self) -> BackendResult<String> {
        let mut line = Vec::new();
        let read = (&mut self.inner)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            return Err(BackendError::Connection("connection closed by server".to_string()));
        }
        if read == MAX_LINE_LEN && !line.ends_with(b"\n") {
            return Err(BackendError::Protocol(format!(
                "reply line longer than {} bytes",
                MAX_LINE_LEN
            )));
        }
        if !line.ends_with(CRLF) {
            return Err(BackendError::Protocol("reply line not terminated by CRLF".to_string()));
        }
        line.truncate(line.len() - CRLF.len());
        String::from_utf8(line)
            .map_err(|_| BackendError::Protocol("reply line is not valid UTF-8".to_string()))
    }

    async fn read_frame(&mut self) -> BackendResult<Frame> {
        let line = self.read_line().await?;
        let Some(kind) = line.chars().next() else {
            return Err(BackendError::Protocol("empty reply line".to_string()));
        };
        let rest = &line[kind.len_utf8()..];

        match kind {
            '+' => Ok(Frame::Value(Value::Str(rest.to_string()))),
            '-' => Ok(Frame::Error(rest.to_string())),
            ':' => rest
                .parse::<i64>()
                .map(|n| Frame::Value(Value::Int(n)))
                .map_err(|_| BackendError::Protocol(format!("invalid integer reply: {:?}", rest))),
            '$' => {
                let Some(len) = parse_len(rest, "bulk")? else {
                    return Ok(Frame::Value(Value::Nil));
                };
                if len > MAX_BULK_LEN {
                    return Err(BackendError::Protocol(format!(
                        "bulk length {} exceeds {} bytes",
                        len, MAX_BULK_LEN
                    )));
                }
                let mut data = vec![0u8; len + CRLF.len()];
                self.inner.read_exact(&mut data).await?;
                if !data.ends_with(CRLF) {
                    return Err(BackendError::Protocol("bulk reply not terminated by CRLF".to_string()));
                }
                data.truncate(len);
                Ok(Frame::Value(bulk_value(data)))
            }
            '*' => match parse_len(rest, "array")? {
                Some(len) => Ok(Frame::Array(len)),
                None => Ok(Frame::Value(Value::Nil)),
            },
            other => Err(BackendError::Protocol(format!("unknown reply type {:?}", other))),
        }
    }

    #[cfg(test)]
    pub(crate) async fn write_raw(&mut self, data: &[u8]) -> BackendResult<()> {
        self.inner.write_all(data).await?;
        self.inner.flush().await?;
        Ok(())
    }
}
