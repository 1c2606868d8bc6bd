//! Buffered duplex channel (C8): batches up to [`BATCH_MAX`] messages per
//! wire send. Built on `std::sync::mpsc`, per the threaded-runtime
//! substitution for `multiprocessing.Pipe` the design notes allow.

use std::sync::mpsc;
use std::time::Duration;

/// A sent "message" on the wire batches 1..=96 logical messages.
pub const BATCH_MAX: usize = 96;

/// Coordinator -> one worker, or worker -> coordinator on a private line.
pub struct BufferedSender<T> {
    tx: mpsc::Sender<Vec<T>>,
    buf: Vec<T>,
}

impl<T> BufferedSender<T> {
    pub fn new(tx: mpsc::Sender<Vec<T>>) -> Self {
        Self { tx, buf: Vec::new() }
    }

    pub fn send(&mut self, msg: T) {
        self.buf.push(msg);
        if self.buf.len() >= BATCH_MAX {
            self.flush();
        }
    }

    pub fn flush(&mut self) {
        if !self.buf.is_empty() {
            let batch = std::mem::take(&mut self.buf);
            // A closed receiver means the peer has already exited (e.g.
            // post-TERMINATE); dropping the batch is correct, not an error.
            let _ = self.tx.send(batch);
        }
    }
}

pub struct BufferedReceiver<T> {
    rx: mpsc::Receiver<Vec<T>>,
}

impl<T> BufferedReceiver<T> {
    pub fn new(rx: mpsc::Receiver<Vec<T>>) -> Self {
        Self { rx }
    }

    pub fn recv(&self) -> Option<Vec<T>> {
        self.rx.recv().ok()
    }
}

pub fn channel<T>() -> (BufferedSender<T>, BufferedReceiver<T>) {
    let (tx, rx) = mpsc::channel();
    (BufferedSender::new(tx), BufferedReceiver::new(rx))
}

/// A worker's outgoing line into the coordinator's single fan-in receiver,
/// tagged with the worker's id so the coordinator knows which channel to
/// reply on.
pub struct TaggedSender<T> {
    id: usize,
    tx: mpsc::Sender<(usize, Vec<T>)>,
    buf: Vec<T>,
}

impl<T> TaggedSender<T> {
    pub fn send(&mut self, msg: T) {
        self.buf.push(msg);
        if self.buf.len() >= BATCH_MAX {
            self.flush();
        }
    }

    pub fn flush(&mut self) {
        if !self.buf.is_empty() {
            let batch = std::mem::take(&mut self.buf);
            let _ = self.tx.send((self.id, batch));
        }
    }
}

/// The coordinator's single receive end for all workers' [`TaggedSender`]s.
pub struct FanInReceiver<T> {
    rx: mpsc::Receiver<(usize, Vec<T>)>,
}

impl<T> FanInReceiver<T> {
    /// Blocks up to `timeout` for the next batch from any worker.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<(usize, Vec<T>)> {
        self.rx.recv_timeout(timeout).ok()
    }
}

pub fn fan_in<T>() -> (mpsc::Sender<(usize, Vec<T>)>, FanInReceiver<T>) {
    let (tx, rx) = mpsc::channel();
    (tx, FanInReceiver { rx })
}

pub fn tagged_sender<T>(id: usize, tx: mpsc::Sender<(usize, Vec<T>)>) -> TaggedSender<T> {
    TaggedSender { id, tx, buf: Vec::new() }
}
