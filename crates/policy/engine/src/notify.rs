//! External notification sink
//!
//! A one-way channel blocks use to announce state changes to observers
//! outside the policy — external automation, audit feeds. Decoupled
//! from the event router: no delivery guarantee, no ordering contract,
//! and a dropped receiver simply means nobody is observing.

use policy_types::ExternalEvent;
use tokio::sync::mpsc;

/// Fire-and-forget sender for external events
#[derive(Clone, Debug)]
pub struct ExternalNotifier {
    sender: Option<mpsc::UnboundedSender<ExternalEvent>>,
}

impl ExternalNotifier {
    /// Create a notifier and the receiving end for observers
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExternalEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A notifier with nobody listening
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Emit an event. Never fails, never blocks.
    pub fn emit(&self, event: ExternalEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
