use crate::State;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    StateChanged { old: State, new: State },
    StreamStart,
    Eos,
    Warning { source: String, message: String },
    Error { source: String, message: String },
}

/// Message queue between the streaming threads and the application.
#[derive(Debug, Clone)]
pub struct Bus {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn post(&self, message: Message) {
        log::debug!("bus message: {message:?}");

        if let Err(e) = self.sender.send(message) {
            log::warn!("post bus message failed: {e}");
        }
    }

    /// Block until a message is available.
    pub fn pop(&self) -> Option<Message> {
        self.receiver.recv().ok()
    }

    pub fn try_pop(&self) -> Option<Message> {
        match self.receiver.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn timed_pop(&self, timeout: Duration) -> Option<Message> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Blocking iterator over incoming messages.
    pub fn iter(&self) -> impl Iterator<Item = Message> + '_ {
        self.receiver.iter()
    }

    pub fn clear(&self) {
        while self.receiver.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_order() {
        let bus = Bus::new();
        bus.post(Message::StreamStart);
        bus.post(Message::Eos);

        assert_eq!(bus.try_pop(), Some(Message::StreamStart));
        assert_eq!(bus.pop(), Some(Message::Eos));
        assert_eq!(bus.timed_pop(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_bus_clear() {
        let bus = Bus::new();
        bus.post(Message::Eos);
        bus.clone().post(Message::StreamStart);
        bus.clear();
        assert_eq!(bus.try_pop(), None);
    }
}
