//! # Link Events
//!
//! Observers are notified of every message a link forwards and of the link's
//! lifecycle. They run inside the forwarding task of the direction concerned,
//! in registration order, so a slow observer only holds back its own
//! direction.
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use mcproxy_network::{EventBus, HookOutcome, LinkObserver, MessageContext};
//! use mcproxy_protocol::Message;
//! use std::sync::Arc;
//!
//! struct DropChat;
//!
//! #[async_trait]
//! impl LinkObserver for DropChat {
//!     async fn on_message_received(&self, _: &MessageContext<'_>, message: &Message) -> HookOutcome {
//!         match message {
//!             Message::Binary(binary) if binary.id == 0x07 => HookOutcome::Handled,
//!             _ => HookOutcome::Continue,
//!         }
//!     }
//! }
//!
//! let mut bus = EventBus::new();
//! bus.subscribe(Arc::new(DropChat));
//! ```

use crate::channel::{ChannelControl, ChannelControls};
use async_trait::async_trait;
use mcproxy_core::{Direction, Phase, ProtocolVersion, ProxyError, Side};
use mcproxy_protocol::Message;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Result of a message hook
#[derive(Debug)]
pub enum HookOutcome {
    /// Let the next observer see the message
    Continue,
    /// On receive, the message is dealt with: later observers are skipped
    /// and the message is not forwarded. Ignored on send.
    Handled,
    /// The observer failed; the direction stops
    Error(ProxyError),
}

/// Lifecycle step of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkEvent {
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Controls of the four channel halves of a link
#[derive(Debug, Clone)]
pub struct LinkControls {
    pub player: ChannelControls,
    pub server: ChannelControls,
}

impl LinkControls {
    pub fn channel(&self, side: Side) -> &ChannelControls {
        match side {
            Side::Client => &self.player,
            Side::Server => &self.server,
        }
    }

    /// Halves owned by the forwarding task of `direction`
    pub fn own_halves(&self, direction: Direction) -> [&Arc<ChannelControl>; 2] {
        [
            &self.channel(direction.source()).reader,
            &self.channel(direction.destination()).writer,
        ]
    }

    /// Halves owned by the forwarding task of the opposite direction
    pub fn opposite_halves(&self, direction: Direction) -> [&Arc<ChannelControl>; 2] {
        self.own_halves(direction.opposite())
    }
}

/// What a message hook knows about the message's surroundings
#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a> {
    pub link: &'a str,
    pub direction: Direction,
    /// Protocol version of the source half
    pub version: Option<ProtocolVersion>,
    /// Phase the source half was in when the message was read
    pub phase: Option<Phase>,
    pub controls: &'a LinkControls,
}

#[async_trait]
pub trait LinkObserver: Send + Sync {
    /// A message was read and is about to be forwarded
    async fn on_message_received(&self, _context: &MessageContext<'_>, _message: &Message) -> HookOutcome {
        HookOutcome::Continue
    }

    /// A message was written to its destination
    async fn on_message_sent(&self, _context: &MessageContext<'_>, _message: &Message) -> HookOutcome {
        HookOutcome::Continue
    }

    async fn on_link_event(&self, _link: &str, _event: LinkEvent) {}
}

/// Ordered list of observers
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Vec<Arc<dyn LinkObserver>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn LinkObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Run the receive hooks until one does not return `Continue`
    pub async fn message_received(&self, context: &MessageContext<'_>, message: &Message) -> HookOutcome {
        for observer in &self.observers {
            match observer.on_message_received(context, message).await {
                HookOutcome::Continue => {}
                outcome => {
                    trace!("{} {}: receive hook returned {:?}", context.link, context.direction, outcome);
                    return outcome;
                }
            }
        }
        HookOutcome::Continue
    }

    /// Run the send hooks until one returns `Error`
    ///
    /// The message is already written, so `Handled` does not hide it from
    /// later observers.
    pub async fn message_sent(&self, context: &MessageContext<'_>, message: &Message) -> HookOutcome {
        for observer in &self.observers {
            if let HookOutcome::Error(e) = observer.on_message_sent(context, message).await {
                return HookOutcome::Error(e);
            }
        }
        HookOutcome::Continue
    }

    pub async fn emit(&self, link: &str, event: LinkEvent) {
        for observer in &self.observers {
            observer.on_link_event(link, event).await;
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}
