//! Wires a [`Framer`] to an `AsyncRead`/`AsyncWrite` pair: read from the
//! source, forward every byte to the sink immediately, and hand completed
//! message spans to a callback. This is the §4.3 stdio proxy's per-direction
//! primitive.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::state::Framer;

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The source reached end-of-stream cleanly.
    SourceClosed,
    /// The sink rejected a write (the peer process is gone).
    SinkClosed,
}

/// An I/O failure while pumping. Per §4.2, this terminates only this
/// pump's direction — never escalated to the other pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PumpError {
    /// Reading from the source failed.
    #[error("read error: {0}")]
    ReadError(#[source] std::io::Error),
    /// Writing to the sink failed.
    #[error("sink write error: {0}")]
    SinkError(#[source] std::io::Error),
}

/// Read from `source` in chunks up to `read_buf_size`, forward every byte
/// read to `sink` before framing is even attempted, and invoke `on_message`
/// for each complete message span the framer detects.
///
/// Byte forwarding happens unconditionally per read; framing only ever
/// adds message events on top, never gates or delays the write.
pub async fn pump<R, W, F>(
    mut source: R,
    mut sink: W,
    read_buf_size: usize,
    cap_bytes: usize,
    mut on_message: F,
) -> Result<PumpOutcome, PumpError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(Vec<u8>),
{
    let mut framer = Framer::new(cap_bytes);
    let mut read_buf = vec![0u8; read_buf_size.max(1)];

    loop {
        let n = source
            .read(&mut read_buf)
            .await
            .map_err(PumpError::ReadError)?;

        if n == 0 {
            return Ok(PumpOutcome::SourceClosed);
        }

        let chunk = &read_buf[..n];

        if sink.write_all(chunk).await.is_err() {
            return Ok(PumpOutcome::SinkClosed);
        }
        if sink.flush().await.is_err() {
            return Ok(PumpOutcome::SinkClosed);
        }

        for message in framer.feed(chunk) {
            on_message(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn forwards_bytes_and_reports_messages() {
        let input = b"{\"a\":1}\n{\"b\":2}\n".to_vec();
        let source = std::io::Cursor::new(input.clone());
        let mut output = Vec::new();
        let messages: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let messages_clone = messages.clone();

        let outcome = pump(source, &mut output, 4096, 1024, move |m| {
            messages_clone.lock().unwrap().push(m);
        })
        .await
        .unwrap();

        assert_eq!(outcome, PumpOutcome::SourceClosed);
        assert_eq!(output, input, "byte transparency must hold exactly");
        assert_eq!(messages.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn partial_reads_still_reassemble_messages() {
        // A reader that yields one byte per poll exercises the framer's
        // split-across-chunks path end to end.
        struct OneByteAtATime(std::io::Cursor<Vec<u8>>);

        impl AsyncRead for OneByteAtATime {
            fn poll_read(
                mut self: std::pin::Pin<&mut Self>,
                cx: &mut std::task::Context<'_>,
                buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                let mut one = [0u8; 1];
                use std::io::Read;
                match self.0.read(&mut one) {
                    Ok(0) => std::task::Poll::Ready(Ok(())),
                    Ok(_) => {
                        buf.put_slice(&one);
                        std::task::Poll::Ready(Ok(()))
                    }
                    Err(e) => std::task::Poll::Ready(Err(e)),
                }
            }
        }

        let input = b"{\"x\":1}".to_vec();
        let source = OneByteAtATime(std::io::Cursor::new(input.clone()));
        let mut output = Vec::new();
        let messages: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let messages_clone = messages.clone();

        pump(source, &mut output, 64, 1024, move |m| {
            messages_clone.lock().unwrap().push(m);
        })
        .await
        .unwrap();

        assert_eq!(output, input);
        assert_eq!(messages.lock().unwrap().len(), 1);
        assert_eq!(messages.lock().unwrap()[0], input);
    }
}
