//! Stdio transport for JSON-RPC messages
//!
//! Implements line-delimited JSON communication for MCP: each message is a
//! single JSON object terminated by a newline. The reader tolerates a leading
//! UTF-8 BOM, skips blank lines, and handles partial reads (the underlying
//! `read_line` buffers until a full line arrives). All diagnostics go to
//! stderr via `tracing`; stdout carries protocol frames only.

use super::{JsonRpcRequest, JsonRpcResponse};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error};

/// Outcome of reading one frame from the wire.
#[derive(Debug)]
pub enum Frame {
    /// A well-formed request (or notification)
    Request(JsonRpcRequest),
    /// A line that was not valid JSON-RPC; carries the parse diagnostic.
    /// The connection stays open — the dispatcher answers with -32700.
    Malformed(String),
}

/// Line-delimited JSON-RPC transport, generic over the byte streams so the
/// server can be driven end-to-end through `tokio::io::duplex` in tests.
pub struct Transport<R, W> {
    reader: R,
    writer: W,
}

/// Transport bound to the process's stdin/stdout.
pub type StdioTransport = Transport<BufReader<io::Stdin>, io::Stdout>;

impl StdioTransport {
    /// Create a transport over stdin/stdout
    pub fn stdio() -> Self {
        Transport {
            reader: BufReader::new(io::stdin()),
            writer: io::stdout(),
        }
    }
}

impl<R, W> Transport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a transport over arbitrary streams
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Split into the read and write halves so reading and writing can
    /// proceed on independent tasks.
    pub fn into_split(self) -> (ReadHalf<R>, WriteHalf<W>) {
        (
            ReadHalf {
                reader: self.reader,
            },
            WriteHalf {
                writer: self.writer,
            },
        )
    }
}

/// Reading half of a transport.
pub struct ReadHalf<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> ReadHalf<R> {
    /// Read the next frame. Returns `None` on end-of-stream.
    ///
    /// Blank lines are skipped; a leading UTF-8 BOM on any line is stripped.
    /// A line that fails to parse yields `Frame::Malformed` rather than an
    /// error so the connection can continue.
    pub async fn read_frame(&mut self) -> io::Result<Option<Frame>> {
        loop {
            let mut line = String::new();

            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Ok(None);
            }

            let trimmed = line.trim_start_matches('\u{feff}').trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => {
                    debug!(method = %request.method, "received request");
                    return Ok(Some(Frame::Request(request)));
                }
                Err(e) => {
                    error!(error = %e, "failed to parse request line");
                    return Ok(Some(Frame::Malformed(e.to_string())));
                }
            }
        }
    }
}

/// Writing half of a transport.
pub struct WriteHalf<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> WriteHalf<W> {
    /// Write a response as a single line followed by LF, then flush.
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> io::Result<()> {
        let json = serde_json::to_string(response).map_err(|e| {
            error!(error = %e, "failed to serialize response");
            io::Error::new(io::ErrorKind::InvalidData, e)
        })?;

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Flush and release the writer.
    pub async fn close(&mut self) -> io::Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;
    use tokio::io::BufReader;

    async fn read_all(input: &str) -> Vec<Frame> {
        let reader = BufReader::new(input.as_bytes());
        let transport = Transport::new(reader, Vec::new());
        let (mut rx, _tx) = transport.into_split();

        let mut frames = Vec::new();
        while let Some(frame) = rx.read_frame().await.unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_read_single_request() {
        let frames = read_all("{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\"}\n").await;
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::Request(req) => {
                assert_eq!(req.method, "initialize");
                assert_eq!(req.id, Some(RequestId::Number(1)));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_blank_lines_skipped() {
        let frames = read_all("\n\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"a\"}\n\n").await;
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn test_bom_tolerated() {
        let frames = read_all("\u{feff}{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"a\"}\n").await;
        match &frames[0] {
            Frame::Request(req) => assert_eq!(req.id, Some(RequestId::Number(7))),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multiple_requests_in_one_chunk() {
        let frames = read_all(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"a\"}\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"b\"}\n",
        )
        .await;
        assert_eq!(frames.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_line_keeps_connection() {
        let frames =
            read_all("not json\n{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"after\"}\n").await;
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Frame::Malformed(_)));
        assert!(matches!(frames[1], Frame::Request(_)));
    }

    #[tokio::test]
    async fn test_write_is_one_line_per_message() {
        let transport = Transport::new(BufReader::new(&b""[..]), Vec::new());
        let (_rx, mut tx) = transport.into_split();

        let resp = JsonRpcResponse::success(RequestId::Number(1), serde_json::json!({"ok": true}));
        tx.write_response(&resp).await.unwrap();
        let resp2 = JsonRpcResponse::success(RequestId::Number(2), serde_json::json!({}));
        tx.write_response(&resp2).await.unwrap();

        let written = String::from_utf8(tx.writer).unwrap();
        let lines: Vec<&str> = written.trim_end().split('\n').collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }
}
