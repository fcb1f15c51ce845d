//! Per-connection request handling.
//!
//! One request per connection. `POST` on any path copies everything after the
//! request head into the output file until the peer closes its side, then
//! answers `200` with an empty body. Other methods get `501`.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::io::ReaderStream;

use crate::request::{RequestHead, read_head};
use crate::sink::AppendLog;

/// Serve the single request carried by `stream`.
pub async fn serve_connection<S>(stream: S, peer: SocketAddr, sink: &AppendLog) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let head = match read_head(&mut reader).await {
        Ok(Some(head)) => head,
        Ok(None) => return Ok(()),
        Err(e) => {
            let _ = write_status(&mut write_half, 400, "Bad Request").await;
            return Err(e.context(format!("bad request from {peer}")));
        }
    };

    if !head.method.eq_ignore_ascii_case("POST") {
        log_request(&head, peer, 501, None);
        return write_status(&mut write_half, 501, "Not Implemented").await;
    }

    let body = ReaderStream::with_capacity(reader, sink.read_chunk_bytes());
    match sink.append_stream(body).await {
        Ok(written) => {
            if let Some(declared) = length_mismatch(&head, written) {
                tracing::warn!(
                    peer = %peer,
                    path = %head.path(),
                    declared,
                    written,
                    "body length differs from content-length"
                );
            }
            log_request(&head, peer, 200, Some(written));
            write_status(&mut write_half, 200, "OK").await
        }
        Err(e) => {
            tracing::error!(peer = %peer, path = %head.path(), "append failed: {e:#}");
            let _ = write_status(&mut write_half, 500, "Internal Server Error").await;
            Err(e)
        }
    }
}

/// Declared length when the client sent a numeric `Content-Length` that does
/// not match the bytes actually appended.
fn length_mismatch(head: &RequestHead, written: u64) -> Option<u64> {
    head.parsed_length().filter(|declared| *declared != written)
}

fn log_request(head: &RequestHead, peer: SocketAddr, status: u16, bytes: Option<u64>) {
    tracing::info!(
        peer = %peer,
        method = %head.method,
        path = %head.path(),
        status,
        bytes = ?bytes,
        "http request"
    );
}

async fn write_status<W>(writer: &mut W, status: u16, reason: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response =
        format!("HTTP/1.1 {status} {reason}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
    writer
        .write_all(response.as_bytes())
        .await
        .context("write response")?;
    writer.shutdown().await.context("close response")?;
    Ok(())
}
