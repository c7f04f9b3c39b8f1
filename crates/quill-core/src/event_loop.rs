//! Single dispatch queue for the UI thread.
//!
//! Background threads never touch editor state. They get a [`UiSender`] and post messages; the
//! UI thread calls [`UiQueue::drain`] once per loop iteration and handles the messages in order.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::Duration;

/// Posting side of a [`UiQueue`]. Cheap to clone, usable from any thread.
#[derive(Debug)]
pub struct UiSender<T> {
    tx: Sender<T>,
}

impl<T> Clone for UiSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> UiSender<T> {
    /// Post a message. Returns `false` once the UI side is gone.
    pub fn post(&self, message: T) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Receiving side, owned by the UI thread.
#[derive(Debug)]
pub struct UiQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Default for UiQueue<T> {
    fn default() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }
}

impl<T> UiQueue<T> {
    /// Create a new queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// A new sender for this queue.
    pub fn sender(&self) -> UiSender<T> {
        UiSender {
            tx: self.tx.clone(),
        }
    }

    /// Take every message posted so far, without blocking.
    pub fn drain(&self) -> Vec<T> {
        let mut messages = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(message) => messages.push(message),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        messages
    }

    /// Wait up to `timeout` for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_drain_preserves_post_order_across_threads() {
        let queue = UiQueue::new();
        let sender = queue.sender();
        thread::spawn(move || {
            for i in 0..5 {
                sender.post(i);
            }
        })
        .join()
        .unwrap();

        assert_eq!(queue.drain(), vec![0, 1, 2, 3, 4]);
        assert!(queue.drain().is_empty());
    }
}
