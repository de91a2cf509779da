//! Ctrl-C wiring.
//!
//! The first interrupt raises the cancel flag polled by the driver, which
//! stops at the next offset and discards the staged output. A prompt waiting
//! on the operator sees end of input through [`CancellableInput`] and stops
//! the same way. A second interrupt exits on the spot; the destination path
//! is still untouched because nothing is renamed into place until the run
//! succeeds.

use std::io::{self, BufRead, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::exit_codes::EXIT_INTERRUPTED;

pub fn install() -> io::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let raised = Arc::clone(&flag);
    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                raised.store(true, Ordering::SeqCst);
                warn!("Interrupt received; stopping. Press Ctrl-C again to exit immediately.");

                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(i32::from(EXIT_INTERRUPTED));
                }
            });
        })?;

    Ok(flag)
}

// ============================================================================
// Prompt input
// ============================================================================

const POLL: Duration = Duration::from_millis(50);

/// Operator input that reports end of input once the cancel flag is raised.
///
/// Lines are read on a background thread and handed over through a channel,
/// so a blocked prompt notices an interrupt within one poll interval.
pub struct CancellableInput {
    lines: Receiver<io::Result<Vec<u8>>>,
    cancel: Arc<AtomicBool>,
    buf: Vec<u8>,
    pos: usize,
}

impl CancellableInput {
    /// Read standard input. The reader thread starts here, so only call this
    /// when a prompt is actually needed.
    pub fn stdin(cancel: Arc<AtomicBool>) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("stdin".into())
            .spawn(move || {
                let mut stdin = io::stdin().lock();
                loop {
                    let mut line = Vec::new();
                    match stdin.read_until(b'\n', &mut line) {
                        Ok(0) => break,
                        Ok(_) => {
                            if tx.send(Ok(line)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e));
                            break;
                        }
                    }
                }
            })?;
        Ok(Self::from_channel(rx, cancel))
    }

    fn from_channel(lines: Receiver<io::Result<Vec<u8>>>, cancel: Arc<AtomicBool>) -> Self {
        Self { lines, cancel, buf: Vec::new(), pos: 0 }
    }
}

impl Read for CancellableInput {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for CancellableInput {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos >= self.buf.len() {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(&[]);
            }
            match self.lines.recv_timeout(POLL) {
                Ok(line) => {
                    self.buf = line?;
                    self.pos = 0;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(&[]),
            }
        }
        Ok(&self.buf[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.buf.len());
    }
}
