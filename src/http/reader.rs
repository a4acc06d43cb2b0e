use crate::error::ProxyError;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Maximum number of bytes read per `recv` call while accumulating a
/// request, per §4.2.
const READ_CHUNK: usize = 64 * 1024;

/// A request is rejected with `413` once the buffer grows past this size
/// without a complete header block having been found.
pub const MAX_HEADER_BYTES: usize = 1024 * 1024;

/// Bytes read from a client connection, up to and including a complete
/// HTTP/1.1 request (headers terminated by CRLF CRLF, plus a body sized by
/// `Content-Length`).
pub struct RawRequest {
    pub buffer: Vec<u8>,
    pub header_end: usize,
}

/// Reads from `stream` until a complete request has been buffered.
///
/// Chunks of up to 64 KiB are appended to a growing buffer; after each read
/// the buffer is scanned for the end-of-headers marker. Once found, the
/// `Content-Length` header (0 if absent) determines how many more bytes to
/// read before the request is complete. A buffer that exceeds 1 MiB without
/// a complete header is rejected.
pub async fn read_request(stream: &mut TcpStream) -> Result<RawRequest, ProxyError> {
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut header_end: Option<usize> = None;

    loop {
        if header_end.is_none() && buffer.len() > MAX_HEADER_BYTES {
            return Err(ProxyError::PayloadTooLarge(
                "request headers exceeded 1 MiB bound".into(),
            ));
        }

        if let Some(end) = header_end {
            let content_length = content_length_of(&buffer[..end]).unwrap_or(0);
            if buffer.len() - end >= content_length {
                return Ok(RawRequest {
                    buffer,
                    header_end: end,
                });
            }
        }

        let mut chunk = [0u8; READ_CHUNK];
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| ProxyError::ClientProtocolError(format!("read error: {e}")))?;

        if n == 0 {
            return Err(ProxyError::ClientProtocolError(
                "connection closed before request completed".into(),
            ));
        }

        buffer.extend_from_slice(&chunk[..n]);

        if header_end.is_none() {
            header_end = find_header_end(&buffer);
        }
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Scans the already-located header block for `Content-Length`, without a
/// full parse. Used only to decide how many more bytes to read; the
/// authoritative parse happens once the full request is in hand.
fn content_length_of(headers: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(headers).ok()?;
    for line in text.split("\r\n") {
        let mut parts = line.splitn(2, ':');
        let name = parts.next()?.trim();
        if name.eq_ignore_ascii_case("content-length") {
            let value = parts.next()?.trim();
            return value.parse::<usize>().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_header_end() {
        let buf = b"GET / HTTP/1.1\r\nHost: x\r\n\r\nbody";
        let end = find_header_end(buf).unwrap();
        assert_eq!(&buf[end..], b"body");
    }

    #[test]
    fn no_header_end_yet() {
        let buf = b"GET / HTTP/1.1\r\nHost: x";
        assert!(find_header_end(buf).is_none());
    }

    #[test]
    fn content_length_parsed_case_insensitively() {
        let headers = b"POST / HTTP/1.1\r\ncontent-length: 42\r\n\r\n";
        assert_eq!(content_length_of(headers), Some(42));
    }

    #[test]
    fn missing_content_length_is_none() {
        let headers = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        assert_eq!(content_length_of(headers), None);
    }
}
