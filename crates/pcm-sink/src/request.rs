//! Request line and header parsing.
//!
//! Only the head of a request is parsed here. The body is never framed: the
//! caller reads whatever follows the blank line until the peer closes.

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Upper bound on request line plus headers.
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Parsed request line and the headers the handler cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub version: String,
    /// Raw `Content-Length` value, if the header was sent.
    pub content_length: Option<String>,
}

impl RequestHead {
    /// Path part of the request target (query string dropped).
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("")
    }

    /// Declared body length; missing or malformed counts as zero.
    pub fn declared_length(&self) -> u64 {
        self.parsed_length().unwrap_or(0)
    }

    /// Declared length only when the header is present and numeric.
    pub fn parsed_length(&self) -> Option<u64> {
        self.content_length
            .as_deref()
            .and_then(|v| v.trim().parse().ok())
    }
}

/// Read the request head from `reader`.
///
/// Returns `Ok(None)` when the peer closes before sending anything. On success
/// the reader is positioned at the first body byte.
pub async fn read_head<R>(reader: &mut R) -> Result<Option<RequestHead>>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0usize;
    let mut line = String::new();

    let request_line = loop {
        line.clear();
        let n = read_line(reader, &mut line, &mut consumed).await?;
        if n == 0 {
            return Ok(None);
        }
        // Stray blank lines before the request line are skipped.
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if !trimmed.is_empty() {
            break trimmed.to_string();
        }
    };

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(anyhow!("malformed request line {request_line:?}"));
    };
    if !version.starts_with("HTTP/") {
        return Err(anyhow!("unsupported protocol {version:?}"));
    }

    let mut head = RequestHead {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
        content_length: None,
    };

    loop {
        line.clear();
        let n = read_line(reader, &mut line, &mut consumed).await?;
        if n == 0 {
            return Err(anyhow!("connection closed inside request headers"));
        }
        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            break;
        }
        let Some((name, value)) = header.split_once(':') else {
            return Err(anyhow!("malformed header line {header:?}"));
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            head.content_length = Some(value.trim().to_string());
        }
    }

    Ok(Some(head))
}

async fn read_line<R>(reader: &mut R, line: &mut String, consumed: &mut usize) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let remaining = (MAX_HEAD_BYTES - *consumed + 1) as u64;
    let n = (&mut *reader)
        .take(remaining)
        .read_line(line)
        .await
        .context("read request head")?;
    *consumed += n;
    if *consumed > MAX_HEAD_BYTES {
        return Err(anyhow!("request head exceeds {MAX_HEAD_BYTES} bytes"));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_request_line_and_length() {
        let mut raw: &[u8] = b"POST /pcm?id=1 HTTP/1.1\r\nHost: x\r\ncontent-LENGTH: 3\r\n\r\nabc";
        let head = read_head(&mut raw).await.unwrap().unwrap();

        assert_eq!(head.method, "POST");
        assert_eq!(head.path(), "/pcm");
        assert_eq!(head.version, "HTTP/1.1");
        assert_eq!(head.declared_length(), 3);

        let mut rest = Vec::new();
        raw.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"abc");
    }

    #[tokio::test]
    async fn missing_or_malformed_length_counts_as_zero() {
        let mut raw: &[u8] = b"POST / HTTP/1.0\r\n\r\n";
        let head = read_head(&mut raw).await.unwrap().unwrap();
        assert_eq!(head.content_length, None);
        assert_eq!(head.declared_length(), 0);

        let mut raw: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: not-a-number\r\n\r\n";
        let head = read_head(&mut raw).await.unwrap().unwrap();
        assert_eq!(head.content_length.as_deref(), Some("not-a-number"));
        assert_eq!(head.parsed_length(), None);
        assert_eq!(head.declared_length(), 0);
    }

    #[tokio::test]
    async fn accepts_bare_newlines_and_leading_blank_lines() {
        let mut raw: &[u8] = b"\r\nPOST / HTTP/1.1\nContent-Length: 5\n\n";
        let head = read_head(&mut raw).await.unwrap().unwrap();
        assert_eq!(head.declared_length(), 5);
    }

    #[tokio::test]
    async fn closed_before_request_is_none() {
        let mut raw: &[u8] = b"";
        assert!(read_head(&mut raw).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_malformed_request_line() {
        let mut raw: &[u8] = b"garbage\r\n\r\n";
        assert!(read_head(&mut raw).await.is_err());

        let mut raw: &[u8] = b"POST / SMTP/1.0\r\n\r\n";
        assert!(read_head(&mut raw).await.is_err());
    }

    #[tokio::test]
    async fn rejects_truncated_headers() {
        let mut raw: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 3\r\n";
        let err = read_head(&mut raw).await.unwrap_err();
        assert!(format!("{err:#}").contains("inside request headers"));
    }

    #[tokio::test]
    async fn rejects_oversized_head() {
        let mut raw = b"POST / HTTP/1.1\r\nX-Pad: ".to_vec();
        raw.extend(std::iter::repeat_n(b'a', MAX_HEAD_BYTES));
        raw.extend_from_slice(b"\r\n\r\n");
        let mut reader: &[u8] = &raw;
        assert!(read_head(&mut reader).await.is_err());
    }
}
