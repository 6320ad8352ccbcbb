use flume::{Receiver, Sender};
use thiserror::Error;

use convene_api::Envelope;

/// Errors related to Mailbox operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailboxError {
    #[error("Mailbox is closed")]
    Closed,
}

/// Item in an actor's inbox.
#[derive(Debug)]
pub enum Delivery {
    Message(Envelope),
    /// Ends the dispatch loop after everything queued before it.
    Stop,
}

/// Receiving half of an actor inbox.
///
/// Unbounded flume channel; one consumer, any number of producers. Items from
/// one producer are popped in the order they were pushed.
#[derive(Debug)]
pub struct Mailbox {
    receiver: Receiver<Delivery>,
}

/// Sending half of an actor inbox; cheap to clone.
#[derive(Debug, Clone)]
pub struct MailboxSender {
    sender: Sender<Delivery>,
}

pub fn channel() -> (MailboxSender, Mailbox) {
    let (sender, receiver) = flume::unbounded();
    (MailboxSender { sender }, Mailbox { receiver })
}

impl MailboxSender {
    pub fn deliver(&self, envelope: Envelope) -> Result<(), MailboxError> {
        self.sender
            .send(Delivery::Message(envelope))
            .map_err(|_| MailboxError::Closed)
    }

    pub fn stop(&self) -> Result<(), MailboxError> {
        self.sender
            .send(Delivery::Stop)
            .map_err(|_| MailboxError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_disconnected()
    }
}

impl Mailbox {
    /// Waits for the next delivery. `None` once every sender is gone.
    pub async fn pop(&self) -> Option<Delivery> {
        self.receiver.recv_async().await.ok()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convene_api::{ActorRef, NodeAddress, Payload};

    fn envelope(n: i64) -> Envelope {
        let dest = ActorRef::new(NodeAddress::from_parts("local", 1));
        Envelope::new(dest, Payload::Count(n), None)
    }

    #[tokio::test]
    async fn test_push_and_pop_in_order() {
        let (sender, mailbox) = channel();
        for n in 0..3 {
            sender.deliver(envelope(n)).unwrap();
        }
        assert_eq!(mailbox.len(), 3);

        for n in 0..3 {
            match mailbox.pop().await {
                Some(Delivery::Message(env)) => assert_eq!(env.payload, Payload::Count(n)),
                other => panic!("unexpected delivery: {:?}", other),
            }
        }
        assert!(mailbox.is_empty());
    }

    #[tokio::test]
    async fn test_closed_when_mailbox_dropped() {
        let (sender, mailbox) = channel();
        drop(mailbox);
        assert!(sender.is_closed());
        assert_eq!(sender.deliver(envelope(1)), Err(MailboxError::Closed));
    }

    #[tokio::test]
    async fn test_pop_none_after_senders_dropped() {
        let (sender, mailbox) = channel();
        sender.stop().unwrap();
        drop(sender);
        assert!(matches!(mailbox.pop().await, Some(Delivery::Stop)));
        assert!(mailbox.pop().await.is_none());
    }
}
