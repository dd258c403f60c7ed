//! # Phase Coordinator
//!
//! Keeps the four channel halves of a link in step with the protocol:
//! - phase transitions from [`ProtocolTables::transitions`] swap the id space
//! - `SetCompression` inserts the compression layer
//!
//! # Timing
//!
//! Halves owned by the direction carrying the trigger switch once the trigger
//! was sent, so the trigger itself is written with the old settings. Halves
//! of the opposite direction are switched when the trigger is received;
//! their owner applies the change at its next frame boundary.
//!
//! # Ordering
//!
//! Subscribe the coordinator after every observer that may return
//! `Handled` on receive. A vetoed trigger then never reaches it and the
//! peer halves keep their phase.

use crate::channel::{ChannelControl, Reconfigure};
use crate::events::{HookOutcome, LinkObserver, MessageContext};
use async_trait::async_trait;
use mcproxy_core::{Phase, ProtocolVersion};
use mcproxy_protocol::packets::SetCompression;
use mcproxy_protocol::{Message, PhaseTransition, ProtocolTables};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PhaseCoordinator {
    tables: Arc<ProtocolTables>,
}

impl PhaseCoordinator {
    pub fn new(tables: Arc<ProtocolTables>) -> Self {
        Self { tables }
    }

    fn transition(&self, context: &MessageContext<'_>, message: &Message) -> Option<(&PhaseTransition, ProtocolVersion)> {
        let version = context.version?;
        let trigger = message.packet_type_id()?;
        self.tables
            .transition_for(trigger, context.direction, version)
            .map(|transition| (transition, version))
    }

    fn switch(&self, halves: [&Arc<ChannelControl>; 2], phase: Phase) {
        for half in halves {
            half.post(Reconfigure::SwitchPhase {
                phase,
                mappings: self.tables.mappings(phase, half.direction()),
            });
        }
    }

    fn compress(halves: [&Arc<ChannelControl>; 2], threshold: i32) {
        for half in halves {
            half.post(Reconfigure::SetCompression { threshold });
        }
    }
}

#[async_trait]
impl LinkObserver for PhaseCoordinator {
    async fn on_message_received(&self, context: &MessageContext<'_>, message: &Message) -> HookOutcome {
        let opposite = context.controls.opposite_halves(context.direction);

        if let Some(packet) = message.downcast_ref::<SetCompression>() {
            debug!("{}: compression threshold {} for {}", context.link, packet.threshold, context.direction.opposite());
            Self::compress(opposite, packet.threshold);
        }

        if let Some((transition, version)) = self.transition(context, message) {
            if transition.peer {
                debug!(
                    "{}: {} moves {} into {} ({})",
                    context.link,
                    transition.trigger_name,
                    context.direction.opposite(),
                    transition.next,
                    version
                );
                self.switch(opposite, transition.next);
            }
        }

        HookOutcome::Continue
    }

    async fn on_message_sent(&self, context: &MessageContext<'_>, message: &Message) -> HookOutcome {
        let own = context.controls.own_halves(context.direction);

        if let Some(packet) = message.downcast_ref::<SetCompression>() {
            debug!("{}: compression threshold {} for {}", context.link, packet.threshold, context.direction);
            Self::compress(own, packet.threshold);
        }

        if let Some((transition, version)) = self.transition(context, message) {
            debug!(
                "{}: {} moves {} into {} ({})",
                context.link, transition.trigger_name, context.direction, transition.next, version
            );
            self.switch(own, transition.next);
        }

        HookOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Channel, ChannelControls};
    use crate::events::{EventBus, LinkControls};
    use crate::link::Link;
    use bytes::BytesMut;
    use mcproxy_core::{Direction, Side};
    use mcproxy_protocol::packets::LoginSuccess;
    use mcproxy_protocol::{put_var_int, BinaryPacket};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn tables() -> Arc<ProtocolTables> {
        Arc::new(ProtocolTables::system().unwrap())
    }

    fn controls() -> LinkControls {
        LinkControls {
            player: ChannelControls::new(Side::Client),
            server: ChannelControls::new(Side::Server),
        }
    }

    fn context<'a>(controls: &'a LinkControls, direction: Direction, version: ProtocolVersion) -> MessageContext<'a> {
        MessageContext {
            link: "test",
            direction,
            version: Some(version),
            phase: Some(Phase::Login),
            controls,
        }
    }

    fn pending(control: &ChannelControl) -> bool {
        control.has_pending()
    }

    #[tokio::test]
    async fn test_modern_login_success_switches_own_halves_after_send() {
        let coordinator = PhaseCoordinator::new(tables());
        let controls = controls();
        let context = context(&controls, Direction::Clientbound, ProtocolVersion::LATEST);
        let message = Message::packet(LoginSuccess { payload: Default::default() });

        coordinator.on_message_received(&context, &message).await;
        assert!(!pending(&controls.server.reader));
        assert!(!pending(&controls.player.reader));

        coordinator.on_message_sent(&context, &message).await;
        assert!(pending(&controls.server.reader));
        assert!(pending(&controls.player.writer));
        // the serverbound halves wait for the acknowledgement
        assert!(!pending(&controls.player.reader));
        assert!(!pending(&controls.server.writer));
    }

    #[tokio::test]
    async fn test_legacy_login_success_switches_peer_on_receive() {
        let coordinator = PhaseCoordinator::new(tables());
        let controls = controls();
        let context = context(&controls, Direction::Clientbound, ProtocolVersion::MINECRAFT_1_12_2);
        let message = Message::packet(LoginSuccess { payload: Default::default() });

        coordinator.on_message_received(&context, &message).await;
        assert!(pending(&controls.player.reader));
        assert!(pending(&controls.server.writer));
        assert!(!pending(&controls.server.reader));
    }

    #[tokio::test]
    async fn test_set_compression_reaches_all_halves() {
        let coordinator = PhaseCoordinator::new(tables());
        let controls = controls();
        let context = context(&controls, Direction::Clientbound, ProtocolVersion::MINECRAFT_1_8);
        let message = Message::packet(SetCompression { threshold: 256 });

        coordinator.on_message_received(&context, &message).await;
        coordinator.on_message_sent(&context, &message).await;

        for control in [
            &controls.player.reader,
            &controls.player.writer,
            &controls.server.reader,
            &controls.server.writer,
        ] {
            assert!(pending(control));
        }
    }

    #[tokio::test]
    async fn test_binary_messages_are_ignored() {
        let coordinator = PhaseCoordinator::new(tables());
        let controls = controls();
        let context = context(&controls, Direction::Serverbound, ProtocolVersion::LATEST);
        let message = Message::from(BinaryPacket::new(0x03, Vec::new()));

        coordinator.on_message_received(&context, &message).await;
        coordinator.on_message_sent(&context, &message).await;
        assert!(!pending(&controls.player.reader));
        assert!(!pending(&controls.server.writer));
    }

    struct VetoLoginSuccess;

    #[async_trait]
    impl LinkObserver for VetoLoginSuccess {
        async fn on_message_received(&self, _: &MessageContext<'_>, message: &Message) -> HookOutcome {
            if message.downcast_ref::<LoginSuccess>().is_some() {
                HookOutcome::Handled
            } else {
                HookOutcome::Continue
            }
        }

        async fn on_message_sent(&self, _: &MessageContext<'_>, _: &Message) -> HookOutcome {
            HookOutcome::Handled
        }
    }

    fn vetoing_bus() -> EventBus {
        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(VetoLoginSuccess));
        bus.subscribe(Arc::new(PhaseCoordinator::new(tables())));
        bus
    }

    #[tokio::test]
    async fn test_vetoed_trigger_keeps_peer_phase() {
        let bus = vetoing_bus();
        let controls = controls();
        let context = context(&controls, Direction::Clientbound, ProtocolVersion::MINECRAFT_1_12_2);
        let message = Message::packet(LoginSuccess { payload: Default::default() });

        assert!(matches!(bus.message_received(&context, &message).await, HookOutcome::Handled));
        assert!(!pending(&controls.player.reader));
        assert!(!pending(&controls.server.writer));
    }

    #[tokio::test]
    async fn test_sent_trigger_reaches_coordinator_behind_other_observers() {
        let bus = vetoing_bus();
        let controls = controls();
        let context = context(&controls, Direction::Clientbound, ProtocolVersion::LATEST);
        let message = Message::packet(LoginSuccess { payload: Default::default() });

        assert!(matches!(bus.message_sent(&context, &message).await, HookOutcome::Continue));
        assert!(pending(&controls.server.reader));
        assert!(pending(&controls.player.writer));
    }

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut out = BytesMut::new();
        put_var_int(&mut out, body.len() as i32);
        out.extend_from_slice(body);
        out.to_vec()
    }

    async fn read_frame(stream: &mut DuplexStream) -> Vec<u8> {
        let length = stream.read_u8().await.unwrap() as usize;
        let mut body = vec![0u8; length];
        stream.read_exact(&mut body).await.unwrap();
        body
    }

    /// Login of a 1.21.4 player through a running link
    #[tokio::test]
    async fn test_login_through_link() {
        let tables = tables();
        let (player_end, mut player) = duplex(64 * 1024);
        let (server_end, mut server) = duplex(64 * 1024);

        let mut player_channel = Channel::new(Side::Client, player_end, 1024);
        let mut server_channel = Channel::new(Side::Server, server_end, 1024);
        for channel in [&mut player_channel, &mut server_channel] {
            channel.set_version(ProtocolVersion::MINECRAFT_1_21_4);
            channel
                .switch_phase(Phase::Login, |direction| tables.mappings(Phase::Login, direction))
                .unwrap();
        }

        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(PhaseCoordinator::new(Arc::clone(&tables))));
        let link = Link::new("login", player_channel, server_channel, bus).with_grace_period(Duration::from_millis(200));
        link.start().await.unwrap();

        // SetCompression travels uncompressed, everything after it compressed
        server.write_all(&frame(&[0x03, 0x80, 0x02])).await.unwrap();
        assert_eq!(read_frame(&mut player).await, vec![0x03, 0x80, 0x02]);

        // login success with a compressed-format frame, written compressed to the player
        server.write_all(&frame(&[0x00, 0x02, 0xAB])).await.unwrap();
        assert_eq!(read_frame(&mut player).await, vec![0x00, 0x02, 0xAB]);

        // the player acknowledges, which moves the serverbound halves to configuration
        player.write_all(&frame(&[0x00, 0x03])).await.unwrap();
        assert_eq!(read_frame(&mut server).await, vec![0x00, 0x03]);

        // finish configuration is 0x03 in configuration (1.20.5+) and decodes natively
        server.write_all(&frame(&[0x00, 0x03])).await.unwrap();
        assert_eq!(read_frame(&mut player).await, vec![0x00, 0x03]);

        assert!(link.is_alive());
        link.stop().await.unwrap();
    }
}
