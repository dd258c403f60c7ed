//! # Links
//!
//! A link joins a player channel and a server channel and forwards messages
//! between them with one task per direction.
//!
//! # Lifecycle
//!
//! ```text
//! Created → Starting → Running → Stopping → Stopped
//! ```
//!
//! # Shutdown
//!
//! When a forwarding task ends (peer closed, cancelled, or failed) it:
//! 1. raises `Stopping` (once per link)
//! 2. flushes and closes its destination
//! 3. disposes the opposite direction: graceful cancellation, then after
//!    the grace period forced cancellation, then after the grace period
//!    again a `LinkStuck` error
//! 4. raises `Stopped` once both directions are done (once per link)

use crate::channel::{Channel, ChannelReader, ChannelWriter};
use crate::events::{EventBus, HookOutcome, LinkControls, LinkEvent, MessageContext};
use mcproxy_core::{Direction, ProxyError, Result};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Time a direction gets to settle at each shutdown step
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LinkState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Cancellation of one forwarding direction
#[derive(Debug, Default)]
struct PumpControl {
    /// Finish the current message, then stop
    graceful: CancellationToken,
    /// Stop now, even mid-read
    force: CancellationToken,
    /// Set by the task once it has closed its destination
    done: CancellationToken,
}

#[derive(Debug, Default)]
struct Completion {
    stopping_raised: bool,
    stopped_raised: bool,
}

struct LinkShared {
    name: String,
    bus: EventBus,
    controls: LinkControls,
    grace_period: Duration,
    state: watch::Sender<LinkState>,
    completion: Mutex<Completion>,
    serverbound: PumpControl,
    clientbound: PumpControl,
}

impl LinkShared {
    fn pump(&self, direction: Direction) -> &PumpControl {
        match direction {
            Direction::Serverbound => &self.serverbound,
            Direction::Clientbound => &self.clientbound,
        }
    }

    /// Move forward to `state`; states never go back
    fn advance(&self, state: LinkState) {
        self.state.send_if_modified(|current| {
            if *current < state {
                *current = state;
                true
            } else {
                false
            }
        });
    }

    async fn raise_stopping(&self) {
        {
            let mut completion = self.completion.lock();
            if completion.stopping_raised {
                return;
            }
            completion.stopping_raised = true;
        }

        self.advance(LinkState::Stopping);
        self.bus.emit(&self.name, LinkEvent::Stopping).await;
    }

    /// Raise `Stopped` if both directions are done and nobody did yet
    async fn raise_stopped(&self) {
        {
            let mut completion = self.completion.lock();
            let settled = self.serverbound.done.is_cancelled() && self.clientbound.done.is_cancelled();
            if !settled || completion.stopped_raised {
                return;
            }
            completion.stopped_raised = true;
        }

        self.bus.emit(&self.name, LinkEvent::Stopped).await;
        self.advance(LinkState::Stopped);
        info!("Link {} stopped", self.name);
    }

    /// Stop one direction, escalating to forced cancellation
    ///
    /// # Errors
    /// `LinkStuck` when the direction does not settle even after forced
    /// cancellation.
    async fn dispose(&self, direction: Direction) -> Result<()> {
        let pump = self.pump(direction);
        if pump.done.is_cancelled() {
            return Ok(());
        }

        pump.graceful.cancel();
        if tokio::time::timeout(self.grace_period, pump.done.cancelled()).await.is_ok() {
            return Ok(());
        }

        warn!(
            "Link {}: {} direction did not stop within {:?}, cancelling by force",
            self.name, direction, self.grace_period
        );
        pump.force.cancel();
        if tokio::time::timeout(self.grace_period, pump.done.cancelled()).await.is_ok() {
            return Ok(());
        }

        error!("Link {}: {} direction is stuck", self.name, direction);
        Err(ProxyError::LinkStuck {
            link: self.name.clone(),
            direction,
        })
    }
}

/// Why a forwarding loop ended
#[derive(Debug)]
enum PumpExit {
    Cancelled,
    Closed,
    Failed(ProxyError),
}

/// Run `future` unless the direction is cancelled by force first
async fn unless_forced<F: Future>(force: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = force.cancelled() => None,
        output = future => Some(output),
    }
}

/// One forwarding direction: owns its source reader and destination writer
struct Pump {
    shared: Arc<LinkShared>,
    direction: Direction,
    source: ChannelReader,
    destination: ChannelWriter,
}

impl Pump {
    async fn run(mut self) -> Result<()> {
        debug!("Link {}: {} forwarding started", self.shared.name, self.direction);

        let exit = self.forward().await;
        match &exit {
            PumpExit::Cancelled => debug!("Link {}: {} forwarding cancelled", self.shared.name, self.direction),
            PumpExit::Closed => info!(
                "Link {}: {} stopped forwarding, {:?} closed the connection",
                self.shared.name,
                self.direction,
                self.direction.source()
            ),
            PumpExit::Failed(e) => error!(
                "Link {}: {} stopped forwarding: {}",
                self.shared.name, self.direction, e
            ),
        }

        self.finish().await
    }

    async fn forward(&mut self) -> PumpExit {
        let shared = Arc::clone(&self.shared);
        let pump = shared.pump(self.direction);

        loop {
            // waiting for the next message is the only point a graceful stop applies
            let read = tokio::select! {
                biased;
                _ = pump.force.cancelled() => return PumpExit::Cancelled,
                _ = pump.graceful.cancelled() => return PumpExit::Cancelled,
                read = self.source.read_message() => read,
            };

            let message = match read {
                Ok(message) => message,
                Err(e) if e.is_closed() => return PumpExit::Closed,
                Err(e) if e.is_message_local() => {
                    warn!("Link {}: dropped {} message: {}", shared.name, self.direction, e);
                    continue;
                }
                Err(e) => return PumpExit::Failed(e),
            };

            let context = MessageContext {
                link: &shared.name,
                direction: self.direction,
                version: self.source.registries().version(),
                phase: self.source.registries().phase(),
                controls: &shared.controls,
            };

            let Some(outcome) = unless_forced(&pump.force, shared.bus.message_received(&context, &message)).await
            else {
                return PumpExit::Cancelled;
            };
            match outcome {
                HookOutcome::Continue => {}
                HookOutcome::Handled => {
                    trace!("Link {}: {} {} not forwarded", shared.name, self.direction, message.name());
                    continue;
                }
                HookOutcome::Error(e) => return PumpExit::Failed(e),
            }

            let Some(written) = unless_forced(&pump.force, self.destination.write_message(&message)).await else {
                return PumpExit::Cancelled;
            };
            match written {
                Ok(()) => {}
                Err(e) if e.is_closed() => return PumpExit::Closed,
                Err(ProxyError::UnregisteredPacket(name)) => {
                    warn!("Link {}: cannot write {} {}, no packet id", shared.name, self.direction, name);
                    continue;
                }
                Err(e) => return PumpExit::Failed(e),
            }

            let Some(outcome) = unless_forced(&pump.force, shared.bus.message_sent(&context, &message)).await else {
                return PumpExit::Cancelled;
            };
            if let HookOutcome::Error(e) = outcome {
                return PumpExit::Failed(e);
            }
        }
    }

    async fn finish(mut self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let pump = shared.pump(self.direction);

        shared.raise_stopping().await;

        let closed = unless_forced(&pump.force, async {
            self.destination.flush().await?;
            self.destination.shutdown().await
        })
        .await;
        if let Some(Err(e)) = closed {
            if !e.is_closed() {
                debug!("Link {}: closing {:?} failed: {}", shared.name, self.direction.destination(), e);
            }
        }

        self.source.registries_mut().reset();
        self.destination.registries_mut().reset();
        pump.done.cancel();

        let disposed = shared.dispose(self.direction.opposite()).await;
        shared.raise_stopped().await;
        disposed
    }
}

/// Two channels forwarding into each other
///
/// # Example
///
/// ```no_run
/// use mcproxy_network::{Channel, EventBus, Link};
/// use mcproxy_core::Side;
///
/// # async fn run(player: tokio::net::TcpStream, server: tokio::net::TcpStream) -> mcproxy_core::Result<()> {
/// let link = Link::new(
///     "player -> lobby",
///     Channel::new(Side::Client, player, 8192),
///     Channel::new(Side::Server, server, 8192),
///     EventBus::new(),
/// );
/// link.start().await?;
/// link.wait_stopped().await;
/// # Ok(())
/// # }
/// ```
pub struct Link {
    shared: Arc<LinkShared>,
    channels: Mutex<Option<(Channel, Channel)>>,
    tasks: Mutex<Vec<JoinHandle<Result<()>>>>,
}

impl Link {
    pub fn new(name: impl Into<String>, player: Channel, server: Channel, bus: EventBus) -> Self {
        let controls = LinkControls {
            player: player.controls(),
            server: server.controls(),
        };

        Self {
            shared: Arc::new(LinkShared {
                name: name.into(),
                bus,
                controls,
                grace_period: DEFAULT_GRACE_PERIOD,
                state: watch::Sender::new(LinkState::Created),
                completion: Mutex::new(Completion::default()),
                serverbound: PumpControl::default(),
                clientbound: PumpControl::default(),
            }),
            channels: Mutex::new(Some((player, server))),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Set the grace period of each shutdown step (before `start`)
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.grace_period = grace_period;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> LinkState {
        *self.shared.state.borrow()
    }

    pub fn controls(&self) -> &LinkControls {
        &self.shared.controls
    }

    /// Spawn both forwarding directions
    ///
    /// # Errors
    /// `LinkState` when the link was already started.
    pub async fn start(&self) -> Result<()> {
        let Some((player, server)) = self.channels.lock().take() else {
            return Err(ProxyError::LinkState(format!("link {} was already started", self.shared.name)));
        };

        self.shared.advance(LinkState::Starting);
        self.shared.bus.emit(&self.shared.name, LinkEvent::Starting).await;

        let serverbound = Pump {
            shared: Arc::clone(&self.shared),
            direction: Direction::Serverbound,
            source: player.reader,
            destination: server.writer,
        };
        let clientbound = Pump {
            shared: Arc::clone(&self.shared),
            direction: Direction::Clientbound,
            source: server.reader,
            destination: player.writer,
        };

        // `Started` goes out before any pump can raise `Stopping`
        self.shared.advance(LinkState::Running);
        self.shared.bus.emit(&self.shared.name, LinkEvent::Started).await;

        {
            let mut tasks = self.tasks.lock();
            tasks.push(tokio::spawn(serverbound.run()));
            tasks.push(tokio::spawn(clientbound.run()));
        }

        info!("Link {} started", self.shared.name);
        Ok(())
    }

    /// Both directions are still forwarding
    pub fn is_alive(&self) -> bool {
        self.state() == LinkState::Running
            && !self.shared.serverbound.done.is_cancelled()
            && !self.shared.clientbound.done.is_cancelled()
    }

    /// Stop both directions and wait for the link to stop
    ///
    /// # Errors
    /// - `LinkState` when the link was never started
    /// - `LinkStuck` when a direction ignores forced cancellation
    pub async fn stop(&self) -> Result<()> {
        if self.state() == LinkState::Created {
            return Err(ProxyError::LinkState(format!("link {} was never started", self.shared.name)));
        }

        info!("Stopping link {}", self.shared.name);
        self.shared.dispose(Direction::Clientbound).await?;
        self.shared.dispose(Direction::Serverbound).await?;
        self.wait_stopped().await;
        Ok(())
    }

    /// Resolves once the link reached `Stopped`
    pub async fn wait_stopped(&self) {
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(|state| *state == LinkState::Stopped).await;
    }

    /// Wait for both forwarding tasks and return the first failure
    pub async fn join(&self) -> Result<()> {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        let mut result = Ok(());

        for task in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ProxyError::LinkState(format!("forwarding task failed: {}", e))),
            };
            if result.is_ok() {
                result = outcome;
            }
        }

        result
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}
