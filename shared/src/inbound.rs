//! Inbound datagram queue between the I/O tasks and the tick loop
//!
//! Any number of [`InboundSender`] handles feed a single [`InboundQueue`].
//! Producers never block: when the queue is full the datagram is dropped,
//! which the reliability layer recovers from like any other loss. The tick
//! loop is the only consumer and drains the queue once per tick.

use log::warn;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// One received datagram and who sent it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: SocketAddr,
    pub bytes: Vec<u8>,
}

impl InboundMessage {
    pub fn new(sender: SocketAddr, bytes: Vec<u8>) -> Self {
        Self { sender, bytes }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Producer handle, cloned into every task that receives datagrams
#[derive(Debug, Clone)]
pub struct InboundSender {
    tx: mpsc::Sender<InboundMessage>,
    dropped: Arc<AtomicU64>,
}

impl InboundSender {
    /// Appends a message without waiting. Returns false if it was dropped
    /// because the queue is full or the consumer is gone.
    pub fn push(&self, message: InboundMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Inbound queue full, dropping {} bytes from {}",
                    message.size(),
                    message.sender
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// The single consumer end. Deliberately not `Clone`.
#[derive(Debug)]
pub struct InboundQueue {
    rx: mpsc::Receiver<InboundMessage>,
    dropped: Arc<AtomicU64>,
}

impl InboundQueue {
    pub fn new(capacity: usize) -> (InboundSender, InboundQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        (
            InboundSender {
                tx,
                dropped: Arc::clone(&dropped),
            },
            InboundQueue { rx, dropped },
        )
    }

    /// Takes everything queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<InboundMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Waits for the next message. Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }

    /// Datagrams dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
