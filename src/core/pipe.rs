//! Pseudo-input channel
//!
//! Byte pipe between the input pump (producer) and the line editor
//! (consumer). Each decoded event travels as one chunk, so multi-byte escape
//! sequences are never split by other input.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

enum Chunk {
    Data(Vec<u8>),
    /// The pump stopped on an error
    Failed(io::Error),
    /// A new pump started after a failure
    Reopened,
}

/// Outcome of pulling one chunk off the channel.
enum Next {
    Data,
    Failed(io::Error),
    Eof,
    Empty,
}

/// Create a connected sender/reader pair.
pub fn pipe() -> (InputSender, InputReader) {
    let (tx, rx) = mpsc::channel();
    (
        InputSender { tx },
        InputReader { rx, pending: Vec::new(), pos: 0, error: None, failed: false, closed: false },
    )
}

/// Producer half, owned by the input pump.
#[derive(Clone)]
pub struct InputSender {
    tx: Sender<Chunk>,
}

impl InputSender {
    /// Send `bytes` as one unit. Returns `false` if the reader is gone.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        if bytes.is_empty() {
            return true;
        }
        self.tx.send(Chunk::Data(bytes)).is_ok()
    }

    /// Deliver a pump error to the reader. The reader reports end of input
    /// after it until [`reopen`](Self::reopen) is sent.
    pub fn fail(&self, err: io::Error) {
        let _ = self.tx.send(Chunk::Failed(err));
    }

    /// Tell the reader that input flows again after a failure.
    pub fn reopen(&self) {
        let _ = self.tx.send(Chunk::Reopened);
    }
}

/// Consumer half.
pub struct InputReader {
    rx: Receiver<Chunk>,
    pending: Vec<u8>,
    pos: usize,
    /// Failure seen by `available`, returned by the next read
    error: Option<io::Error>,
    failed: bool,
    closed: bool,
}

impl InputReader {
    /// Read with a deadline. `Ok(None)` on timeout, `Ok(Some(0))` once the
    /// pump has gone away.
    pub fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        if buf.is_empty() {
            return Ok(Some(0));
        }
        if self.pos < self.pending.len() {
            return Ok(Some(self.drain_into(buf)));
        }
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        match self.next(Some(timeout)) {
            Next::Data => Ok(Some(self.drain_into(buf))),
            Next::Failed(err) => Err(err),
            Next::Eof => Ok(Some(0)),
            Next::Empty => Ok(None),
        }
    }

    /// Whether a read would return without blocking.
    pub fn available(&mut self) -> bool {
        if self.pos < self.pending.len() || self.error.is_some() {
            return true;
        }
        match self.next(Some(Duration::ZERO)) {
            Next::Data | Next::Eof => true,
            Next::Failed(err) => {
                self.error = Some(err);
                true
            }
            Next::Empty => false,
        }
    }

    /// Pull the next chunk. `None` blocks, otherwise waits up to `timeout`.
    fn next(&mut self, timeout: Option<Duration>) -> Next {
        loop {
            if self.closed {
                return Next::Eof;
            }
            let chunk = if self.failed {
                // Only a reopen can follow a failure; until then input has ended
                match self.rx.try_recv() {
                    Ok(chunk) => Some(chunk),
                    Err(TryRecvError::Empty) => return Next::Eof,
                    Err(TryRecvError::Disconnected) => None,
                }
            } else {
                match timeout {
                    None => self.rx.recv().ok(),
                    Some(timeout) => match self.rx.recv_timeout(timeout) {
                        Ok(chunk) => Some(chunk),
                        Err(RecvTimeoutError::Timeout) => return Next::Empty,
                        Err(RecvTimeoutError::Disconnected) => None,
                    },
                }
            };

            match chunk {
                None => {
                    self.closed = true;
                    return Next::Eof;
                }
                Some(Chunk::Data(bytes)) => {
                    self.pending = bytes;
                    self.pos = 0;
                    return Next::Data;
                }
                Some(Chunk::Failed(err)) => {
                    self.failed = true;
                    return Next::Failed(err);
                }
                Some(Chunk::Reopened) => self.failed = false,
            }
        }
    }

    fn drain_into(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos < self.pending.len() {
            return Ok(self.drain_into(buf));
        }
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        match self.next(None) {
            Next::Data => Ok(self.drain_into(buf)),
            Next::Failed(err) => Err(err),
            Next::Eof | Next::Empty => Ok(0),
        }
    }
}
