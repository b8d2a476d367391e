use crate::error::{FramingError, NetconfError, NetconfResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

/// RFC 6242 §4.1 chunk framing, once the session has upgraded past the
/// legacy hello exchange. The reader hands out one byte source per
/// message (a "lazy stream of readers", see spec.md §9) so a caller can
/// start consuming a message's bytes before the whole thing has arrived;
/// the background pump below never holds more than one chunk's payload
/// in its copy buffer at a time.
pub struct ChunkedReader {
    messages: mpsc::Receiver<NetconfResult<DuplexStream>>,
}

impl ChunkedReader {
    pub fn new<R>(source: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(pump(source, tx));
        ChunkedReader { messages: rx }
    }

    /// Returns the byte source for the next message, or `None` once the
    /// underlying transport has reached a clean end-of-stream.
    pub async fn next_message(&mut self) -> NetconfResult<Option<DuplexStream>> {
        match self.messages.recv().await {
            Some(Ok(reader)) => Ok(Some(reader)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }
}

enum ChunkHeader {
    Size(u64),
    Terminator,
    Eof,
}

async fn pump<R>(mut source: R, tx: mpsc::Sender<NetconfResult<DuplexStream>>)
where
    R: AsyncRead + Unpin,
{
    let mut first_chunk = true;
    loop {
        match read_chunk_header(&mut source, &mut first_chunk, true).await {
            Ok(ChunkHeader::Eof) => return,
            Ok(ChunkHeader::Terminator) => continue,
            Ok(ChunkHeader::Size(size)) => {
                let (reader_half, mut writer_half) = tokio::io::duplex(4096);
                if tx.send(Ok(reader_half)).await.is_err() {
                    return;
                }
                if let Err(err) = copy_chunk(&mut source, &mut writer_half, size).await {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
                loop {
                    match read_chunk_header(&mut source, &mut first_chunk, false).await {
                        Ok(ChunkHeader::Terminator) => break,
                        Ok(ChunkHeader::Size(size)) => {
                            if let Err(err) = copy_chunk(&mut source, &mut writer_half, size).await
                            {
                                let _ = tx.send(Err(err)).await;
                                return;
                            }
                        }
                        Ok(ChunkHeader::Eof) => unreachable!("eof only checked at message start"),
                        Err(err) => {
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                    }
                }
                drop(writer_half);
            }
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
        }
    }
}

async fn read_chunk_header<R>(
    source: &mut R,
    first: &mut bool,
    at_message_start: bool,
) -> NetconfResult<ChunkHeader>
where
    R: AsyncRead + Unpin,
{
    let mut byte = [0u8; 1];
    match source.read_exact(&mut byte).await {
        Ok(()) => {}
        Err(err) if at_message_start && err.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Ok(ChunkHeader::Eof);
        }
        Err(err) => return Err(NetconfError::Io(err)),
    }

    if byte[0] != b'\n' {
        if !*first {
            return Err(FramingError::ExpectedLineFeed(byte[0]).into());
        }
        // RFC 6242 §4.1: the very first chunk of a stream may omit the
        // leading LF; `byte` already holds the '#' that follows it.
    } else {
        source.read_exact(&mut byte).await?;
    }
    *first = false;

    if byte[0] != b'#' {
        return Err(FramingError::ExpectedHash(byte[0]).into());
    }

    let mut digits: u64 = 0;
    let mut has_digits = false;
    let mut saw_second_hash = false;
    loop {
        source.read_exact(&mut byte).await?;
        match byte[0] {
            b'0'..=b'9' if !saw_second_hash => {
                has_digits = true;
                digits = digits
                    .checked_mul(10)
                    .and_then(|d| d.checked_add(u64::from(byte[0] - b'0')))
                    .ok_or(FramingError::ChunkTooLarge(u64::MAX))?;
            }
            b'#' if !has_digits && !saw_second_hash => {
                saw_second_hash = true;
            }
            b'\n' if saw_second_hash => {
                if has_digits {
                    return Err(FramingError::MalformedTerminator.into());
                }
                return Ok(ChunkHeader::Terminator);
            }
            b'\n' if has_digits => {
                if digits == 0 || digits > u64::from(u32::MAX) {
                    return Err(FramingError::ChunkTooLarge(digits).into());
                }
                return Ok(ChunkHeader::Size(digits));
            }
            other => return Err(FramingError::IllegalSizeByte(other).into()),
        }
    }
}

async fn copy_chunk<R, W>(source: &mut R, sink: &mut W, size: u64) -> NetconfResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut remaining = size;
    let mut buf = [0u8; 4096];
    while remaining > 0 {
        let take = remaining.min(buf.len() as u64) as usize;
        source.read_exact(&mut buf[..take]).await?;
        sink.write_all(&buf[..take]).await?;
        remaining -= take as u64;
    }
    Ok(())
}

/// Writer half of RFC 6242 §4.1 chunked framing. Each [`write_chunk`] call
/// emits exactly one chunk; [`close_message`] emits the `##` terminator
/// without closing the underlying transport, which stays open across many
/// messages for the lifetime of the session.
pub struct ChunkedWriter<W> {
    raw: W,
}

impl<W: AsyncWrite + Unpin> ChunkedWriter<W> {
    pub fn new(raw: W) -> Self {
        ChunkedWriter { raw }
    }

    pub async fn write_chunk(&mut self, payload: &[u8]) -> NetconfResult<()> {
        self.raw
            .write_all(format!("\n#{}\n", payload.len()).as_bytes())
            .await?;
        self.raw.write_all(payload).await?;
        Ok(())
    }

    pub async fn close_message(&mut self) -> NetconfResult<()> {
        self.raw.write_all(b"\n##\n").await?;
        self.raw.flush().await?;
        Ok(())
    }

    /// Convenience for the common case of a message sent as a single chunk.
    pub async fn write_message(&mut self, payload: &[u8]) -> NetconfResult<()> {
        self.write_chunk(payload).await?;
        self.close_message().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncReadExt;

    async fn read_message(reader: &mut DuplexStream) -> Vec<u8> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn chunked_round_trip_matches_rfc_example() {
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = ChunkedWriter::new(client);
        writer.write_message(b"1234567890").await.unwrap();
        writer.write_chunk(b"1234").await.unwrap();
        writer.write_chunk(b"1").await.unwrap();
        writer.close_message().await.unwrap();
        drop(writer);

        let mut reader = ChunkedReader::new(server);
        let mut first = reader.next_message().await.unwrap().unwrap();
        assert_eq!(
            String::from_utf8(read_message(&mut first).await).unwrap(),
            "1234567890"
        );

        let mut second = reader.next_message().await.unwrap().unwrap();
        assert_eq!(
            String::from_utf8(read_message(&mut second).await).unwrap(),
            "12341"
        );
    }

    #[tokio::test]
    async fn rejects_illegal_size_prefix_byte() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(b"\n#4x\n").await.unwrap();
        let mut reader = ChunkedReader::new(server);
        let err = reader.next_message().await.unwrap_err();
        assert!(matches!(
            err,
            NetconfError::Framing(FramingError::IllegalSizeByte(b'x'))
        ));
    }

    #[tokio::test]
    async fn accepts_first_chunk_without_leading_linefeed() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(b"#5\nhello\n##\n").await.unwrap();
        let mut reader = ChunkedReader::new(server);
        let mut msg = reader.next_message().await.unwrap().unwrap();
        assert_eq!(read_message(&mut msg).await, b"hello");
    }

    #[tokio::test]
    async fn clean_eof_between_messages_yields_none() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let mut reader = ChunkedReader::new(server);
        assert!(reader.next_message().await.unwrap().is_none());
    }
}
