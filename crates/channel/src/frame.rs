//! Newline-terminated frames.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ChannelError;

/// Largest frame either side will read, terminator included.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Writes `payload`, appending `\n` when it is missing, and flushes.
///
/// Returns the number of bytes written. A writer that stops accepting
/// bytes before the frame is complete is a
/// [`LengthMismatch`](ChannelError::LengthMismatch).
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<usize, ChannelError>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = payload.to_vec();
    if !frame.ends_with(b"\n") {
        frame.push(b'\n');
    }

    let mut written = 0;
    while written < frame.len() {
        match writer.write(&frame[written..]).await? {
            0 => {
                return Err(ChannelError::LengthMismatch {
                    expected: frame.len(),
                    written,
                });
            }
            n => written += n,
        }
    }
    writer.flush().await?;
    Ok(written)
}

/// Reads one line, terminator included.
///
/// Returns `None` at end of stream. A peer that closes mid-line yields the
/// partial line; a peer that closes without a TLS close_notify is treated
/// as end of stream too.
pub async fn read_line<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ChannelError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut limited = (&mut *reader).take(MAX_FRAME_LEN as u64 + 1);

    match limited.read_until(b'\n', &mut buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {}
        Err(e) => return Err(e.into()),
    }

    if buf.len() > MAX_FRAME_LEN {
        return Err(ChannelError::FrameTooLong(MAX_FRAME_LEN));
    }
    if buf.is_empty() {
        return Ok(None);
    }
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::BufReader;

    /// Accepts `capacity` bytes, then reports a zero-length write.
    struct Stalling {
        capacity: usize,
    }

    impl AsyncWrite for Stalling {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let n = buf.len().min(self.capacity);
            self.capacity -= n;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn appends_missing_terminator() {
        let mut out = Vec::new();
        let n = write_frame(&mut out, b"hello").await.unwrap();
        assert_eq!(out, b"hello\n");
        assert_eq!(n, 6);

        out.clear();
        write_frame(&mut out, b"already\n").await.unwrap();
        assert_eq!(out, b"already\n");
    }

    #[tokio::test]
    async fn short_write_is_length_mismatch() {
        let mut writer = Stalling { capacity: 3 };
        let err = write_frame(&mut writer, b"abcdef").await.unwrap_err();
        assert!(matches!(
            err,
            ChannelError::LengthMismatch {
                expected: 7,
                written: 3
            }
        ));
    }

    #[tokio::test]
    async fn reads_lines_then_eof() {
        let data: &[u8] = b"first\nsecond";
        let mut reader = BufReader::new(data);
        assert_eq!(read_line(&mut reader).await.unwrap().unwrap(), b"first\n");
        assert_eq!(read_line(&mut reader).await.unwrap().unwrap(), b"second");
        assert!(read_line(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_frame_rejected() {
        let data = vec![b'x'; MAX_FRAME_LEN + 10];
        let mut reader = BufReader::new(data.as_slice());
        assert!(matches!(
            read_line(&mut reader).await,
            Err(ChannelError::FrameTooLong(_))
        ));
    }
}
