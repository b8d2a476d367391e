use crate::error::NetconfResult;
use memmem::{Searcher, TwoWaySearcher};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// RFC 6242 §3.1: the very first exchange on a connection is not chunked.
/// It ends with the legacy `]]>]]>` delimiter. Servers must write their
/// hello unprompted and must not wait for the client's hello first.
pub const LEGACY_TERMINATOR: &str = "]]>]]>";

/// Reads one unchunked message, stopping at `]]>]]>`. Used exactly once
/// per session, for the client hello.
///
/// A client that pipelines its first chunked RPC onto the same write as
/// its hello can land bytes past the terminator in the same `read()`;
/// those bytes belong to the chunked stream that follows, not the hello,
/// so they are returned alongside the message instead of being dropped
/// with `read_buffer` when this function returns.
pub async fn read_hello<T: AsyncRead + Unpin>(channel: &mut T) -> NetconfResult<(String, Vec<u8>)> {
    let mut read_buffer = Vec::new();
    let mut scratch = [0u8; 256];
    let search = TwoWaySearcher::new(LEGACY_TERMINATOR.as_bytes());
    loop {
        if let Some(pos) = search.search_in(&read_buffer) {
            let message = String::from_utf8_lossy(&read_buffer[..pos])
                .trim()
                .to_string();
            let leftover = read_buffer.split_off(pos + LEGACY_TERMINATOR.len());
            return Ok((message, leftover));
        }
        let n = channel.read(&mut scratch).await?;
        if n == 0 {
            let message = String::from_utf8_lossy(&read_buffer).trim().to_string();
            return Ok((message, Vec::new()));
        }
        read_buffer.extend_from_slice(&scratch[..n]);
    }
}

/// Writes one unchunked message followed by `]]>]]>`.
pub async fn write_hello<T: AsyncWrite + Unpin>(channel: &mut T, body: &str) -> NetconfResult<()> {
    channel.write_all(body.as_bytes()).await?;
    channel.write_all(LEGACY_TERMINATOR.as_bytes()).await?;
    channel.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_message_up_to_terminator() {
        let mut source = Cursor::new(b"<hello/>]]>]]>".to_vec());
        let (message, leftover) = read_hello(&mut source).await.unwrap();
        assert_eq!(message, "<hello/>");
        assert!(leftover.is_empty());
    }

    #[tokio::test]
    async fn preserves_bytes_pipelined_past_the_terminator() {
        let mut source = Cursor::new(b"<hello/>]]>]]>\n#4\nabcd\n##\n".to_vec());
        let (message, leftover) = read_hello(&mut source).await.unwrap();
        assert_eq!(message, "<hello/>");
        assert_eq!(leftover, b"\n#4\nabcd\n##\n");
    }
}
