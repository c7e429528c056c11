//! Response bodies produced by blocking code.
//!
//! A producer runs on the blocking pool and writes into a [`ChannelWriter`];
//! the response body drains the other end. Dropping the body (client went
//! away) closes the channel, so the producer's next write fails with
//! `BrokenPipe` and it unwinds, closing whatever files it held.

use std::io::{self, Write};

use axum::body::{Body, Bytes};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

const CHUNK: usize = 64 * 1024;
const DEPTH: usize = 8;

type Chunk = Result<Bytes, io::Error>;

pub struct ChannelWriter {
    tx: mpsc::Sender<Chunk>,
    buf: Vec<u8>,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<Chunk>) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(CHUNK),
        }
    }

    fn send(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK)));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body dropped"))
    }

    /// Abort the body with `err` so the client sees a truncated response.
    fn fail(self, err: io::Error) {
        let _ = self.tx.blocking_send(Err(err));
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.tx.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "response body dropped"));
        }
        let room = CHUNK - self.buf.len();
        let n = data.len().min(room);
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() >= CHUNK {
            self.send()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send()
    }
}

/// Run `produce` on the blocking pool and stream what it writes.
pub fn blocking_body<F>(what: String, produce: F) -> Body
where
    F: FnOnce(&mut ChannelWriter) -> vntl_core::Result<()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(DEPTH);
    tokio::task::spawn_blocking(move || {
        let mut w = ChannelWriter::new(tx);
        let res = produce(&mut w).and_then(|()| w.flush().map_err(Into::into));
        match res {
            Ok(()) => debug!(%what, "stream complete"),
            Err(vntl_core::VntlError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!(%what, "client went away mid-stream")
            }
            Err(e) => {
                warn!(%what, error = %e, "stream aborted");
                w.fail(io::Error::other(e.to_string()));
            }
        }
    });
    Body::from_stream(ReceiverStream::new(rx))
}
