//! # Channels
//!
//! A channel is one proxied socket (player or server) split into a read half
//! and a write half. Each half carries its own registry holder and its own
//! stream layers, and is owned by exactly one forwarding task:
//!
//! ```text
//! serverbound task:  player reader  → server writer
//! clientbound task:  server reader  → player writer
//! ```
//!
//! # Reconfiguration
//!
//! A half is only mutated by the task that owns it. Other tasks post
//! [`Reconfigure`] commands to the half's [`ChannelControl`]; the owner
//! applies them at its next frame boundary, before the next frame is
//! interpreted (read half) or before the next message is encoded (write
//! half).

use crate::layer::{InboundLayers, OutboundLayers};
use bytes::{Bytes, BytesMut};
use mcproxy_core::{Direction, Phase, ProtocolVersion, ProxyError, Result, Side};
use mcproxy_protocol::{peek_var_int, Message, PacketMappings, RegistryHolder};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;
use tracing::{debug, trace};

/// Object-safe byte stream a channel can run over
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Transport for T {}

pub type BoxedTransport = Box<dyn Transport>;

/// Read or write end of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    Read,
    Write,
}

/// Deferred change to a channel half
#[derive(Debug, Clone)]
pub enum Reconfigure {
    /// Load the id space of `phase`
    SwitchPhase {
        phase: Phase,
        mappings: Arc<PacketMappings>,
    },
    /// Insert, replace or (negative threshold) remove compression
    SetCompression { threshold: i32 },
    /// Insert encryption with the 16-byte shared secret
    EnableEncryption { secret: [u8; 16] },
}

/// Mailbox and pause gate of one channel half
pub struct ChannelControl {
    side: Side,
    half: Half,
    pending: Mutex<VecDeque<Reconfigure>>,
    paused: watch::Sender<bool>,
}

impl ChannelControl {
    pub fn new(side: Side, half: Half) -> Self {
        Self {
            side,
            half,
            pending: Mutex::new(VecDeque::new()),
            paused: watch::Sender::new(false),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn half(&self) -> Half {
        self.half
    }

    /// Direction of the packets flowing through this half
    pub fn direction(&self) -> Direction {
        match self.half {
            Half::Read => self.side.inbound(),
            Half::Write => self.side.outbound(),
        }
    }

    /// Queue a command for the owning task
    pub fn post(&self, command: Reconfigure) {
        trace!("{:?} {:?} half: queued {:?}", self.side, self.half, command);
        self.pending.lock().push_back(command);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    fn take_pending(&self) -> Vec<Reconfigure> {
        self.pending.lock().drain(..).collect()
    }

    /// Hold the read half after its current message
    ///
    /// # Errors
    /// `LinkState` when already paused, or for a write half.
    pub fn pause(&self) -> Result<()> {
        if self.half == Half::Write {
            return Err(ProxyError::LinkState("only read halves can be paused".into()));
        }

        let paused = self.paused.send_if_modified(|paused| !std::mem::replace(paused, true));
        if !paused {
            return Err(ProxyError::LinkState(format!("{:?} reader is already paused", self.side)));
        }

        debug!("{:?} reader paused", self.side);
        Ok(())
    }

    /// # Errors
    /// `LinkState` when the reader is not paused.
    pub fn resume(&self) -> Result<()> {
        let resumed = self.paused.send_if_modified(|paused| std::mem::replace(paused, false));
        if !resumed {
            return Err(ProxyError::LinkState(format!("{:?} reader is not paused", self.side)));
        }

        debug!("{:?} reader resumed", self.side);
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    async fn wait_resumed(&self) {
        let mut paused = self.paused.subscribe();
        // the sender lives in self, so the channel cannot close here
        let _ = paused.wait_for(|paused| !*paused).await;
    }
}

impl fmt::Debug for ChannelControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelControl")
            .field("side", &self.side)
            .field("half", &self.half)
            .field("pending", &self.pending.lock().len())
            .field("paused", &self.is_paused())
            .finish()
    }
}

/// Controls of both halves of one channel
#[derive(Debug, Clone)]
pub struct ChannelControls {
    pub reader: Arc<ChannelControl>,
    pub writer: Arc<ChannelControl>,
}

impl ChannelControls {
    pub fn new(side: Side) -> Self {
        Self {
            reader: Arc::new(ChannelControl::new(side, Half::Read)),
            writer: Arc::new(ChannelControl::new(side, Half::Write)),
        }
    }
}

/// Read half of a channel
pub struct ChannelReader {
    side: Side,
    io: ReadHalf<BoxedTransport>,
    buffer: BytesMut,
    read_size: usize,
    layers: InboundLayers,
    registries: RegistryHolder,
    control: Arc<ChannelControl>,
}

impl ChannelReader {
    pub fn side(&self) -> Side {
        self.side
    }

    /// Direction of the packets read here
    pub fn direction(&self) -> Direction {
        self.side.inbound()
    }

    pub fn registries(&self) -> &RegistryHolder {
        &self.registries
    }

    pub fn registries_mut(&mut self) -> &mut RegistryHolder {
        &mut self.registries
    }

    pub fn layers(&self) -> &InboundLayers {
        &self.layers
    }

    pub fn control(&self) -> &Arc<ChannelControl> {
        &self.control
    }

    /// Bytes received but not yet framed
    pub fn read_ahead(&self) -> usize {
        self.buffer.len()
    }

    /// Apply every queued [`Reconfigure`]; only valid at a frame boundary
    pub fn apply_pending(&mut self) -> Result<()> {
        for command in self.control.take_pending() {
            match command {
                Reconfigure::SwitchPhase { phase, mappings } => self.registries.switch_phase(phase, &mappings)?,
                Reconfigure::SetCompression { threshold } => self.layers.set_compression(threshold),
                Reconfigure::EnableEncryption { secret } => {
                    self.layers.enable_encryption(&secret, &mut self.buffer[..])?
                }
            }
        }
        Ok(())
    }

    /// Read the next message
    ///
    /// Waits while the reader is paused. Queued reconfigurations are applied
    /// before the next frame is looked at.
    ///
    /// # Cancel safety
    /// Cancel safe: bytes already received stay buffered for the next call.
    ///
    /// # Errors
    /// - `StreamClosed` when the peer closed the stream
    /// - message-local errors (`PacketDecode`, `NotFullyConsumed`,
    ///   `Malformed`) after which the next message can still be read
    /// - anything else leaves the stream unusable
    pub async fn read_message(&mut self) -> Result<Message> {
        loop {
            if self.control.is_paused() {
                self.control.wait_resumed().await;
            }

            self.apply_pending()?;

            if let Some(body) = self.layers.next_body(&mut self.buffer)? {
                return self.decode(body);
            }

            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<()> {
        let start = self.buffer.len();
        self.buffer.reserve(self.read_size);

        if self.io.read_buf(&mut self.buffer).await? == 0 {
            return Err(ProxyError::StreamClosed);
        }

        self.layers.receive(&mut self.buffer[start..]);
        Ok(())
    }

    fn decode(&self, body: Bytes) -> Result<Message> {
        let (id, size) = peek_var_int(&body)?
            .ok_or_else(|| ProxyError::Malformed("frame has no packet id".into()))?;

        let message = self.registries.decode(id, body.slice(size..))?;
        trace!("{:?} read {} (0x{:02X}, {} bytes)", self.side, message.name(), id, body.len());
        Ok(message)
    }
}

impl fmt::Debug for ChannelReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelReader")
            .field("side", &self.side)
            .field("buffered", &self.buffer.len())
            .field("layers", &self.layers)
            .field("registries", &self.registries)
            .finish()
    }
}

/// Write half of a channel
pub struct ChannelWriter {
    side: Side,
    io: WriteHalf<BoxedTransport>,
    body: BytesMut,
    frame: BytesMut,
    layers: OutboundLayers,
    registries: RegistryHolder,
    control: Arc<ChannelControl>,
}

impl ChannelWriter {
    pub fn side(&self) -> Side {
        self.side
    }

    /// Direction of the packets written here
    pub fn direction(&self) -> Direction {
        self.side.outbound()
    }

    pub fn registries(&self) -> &RegistryHolder {
        &self.registries
    }

    pub fn registries_mut(&mut self) -> &mut RegistryHolder {
        &mut self.registries
    }

    pub fn layers(&self) -> &OutboundLayers {
        &self.layers
    }

    pub fn control(&self) -> &Arc<ChannelControl> {
        &self.control
    }

    /// Apply every queued [`Reconfigure`]; only valid between messages
    pub fn apply_pending(&mut self) -> Result<()> {
        for command in self.control.take_pending() {
            match command {
                Reconfigure::SwitchPhase { phase, mappings } => self.registries.switch_phase(phase, &mappings)?,
                Reconfigure::SetCompression { threshold } => self.layers.set_compression(threshold),
                Reconfigure::EnableEncryption { secret } => self.layers.enable_encryption(&secret)?,
            }
        }
        Ok(())
    }

    /// Encode, frame and send one message
    ///
    /// # Errors
    /// `UnregisteredPacket` when a native packet has no id here; nothing is
    /// written in that case. IO errors leave the stream unusable.
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        self.apply_pending()?;

        self.body.clear();
        self.registries.encode(message, &mut self.body)?;

        self.frame.clear();
        self.layers.frame(&self.body, &mut self.frame)?;

        self.io.write_all(&self.frame).await?;
        trace!("{:?} wrote {} ({} bytes)", self.side, message.name(), self.body.len());
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    /// Flush and close the write direction of the socket
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}

impl fmt::Debug for ChannelWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelWriter")
            .field("side", &self.side)
            .field("layers", &self.layers)
            .field("registries", &self.registries)
            .finish()
    }
}

/// A proxied socket, split into its two halves
#[derive(Debug)]
pub struct Channel {
    pub reader: ChannelReader,
    pub writer: ChannelWriter,
}

impl Channel {
    /// Wrap a connected stream facing `side`
    ///
    /// `read_size` is the number of bytes reserved for every socket read.
    pub fn new<T: Transport>(side: Side, stream: T, read_size: usize) -> Self {
        let (read, write) = tokio::io::split(Box::new(stream) as BoxedTransport);
        let controls = ChannelControls::new(side);

        Self {
            reader: ChannelReader {
                side,
                io: read,
                buffer: BytesMut::with_capacity(read_size),
                read_size,
                layers: InboundLayers::new(),
                registries: RegistryHolder::new(),
                control: controls.reader,
            },
            writer: ChannelWriter {
                side,
                io: write,
                body: BytesMut::new(),
                frame: BytesMut::new(),
                layers: OutboundLayers::new(),
                registries: RegistryHolder::new(),
                control: controls.writer,
            },
        }
    }

    pub fn side(&self) -> Side {
        self.reader.side
    }

    pub fn controls(&self) -> ChannelControls {
        ChannelControls {
            reader: Arc::clone(&self.reader.control),
            writer: Arc::clone(&self.writer.control),
        }
    }

    /// Set the protocol version of both halves
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.reader.registries.set_version(version);
        self.writer.registries.set_version(version);
    }

    /// Load the id space of `phase` into both halves right away
    ///
    /// `mappings` picks the table of a direction.
    pub fn switch_phase(&mut self, phase: Phase, mappings: impl Fn(Direction) -> Arc<PacketMappings>) -> Result<()> {
        let reader_mappings = mappings(self.reader.direction());
        self.reader.registries.switch_phase(phase, &reader_mappings)?;

        let writer_mappings = mappings(self.writer.direction());
        self.writer.registries.switch_phase(phase, &writer_mappings)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcproxy_protocol::packets::{Handshake, SetCompression};
    use mcproxy_protocol::{put_var_int, BinaryPacket, ProtocolTables};
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream};

    fn tables() -> ProtocolTables {
        ProtocolTables::system().unwrap()
    }

    /// A channel facing the client, plus the raw client end of the socket
    fn client_channel() -> (Channel, DuplexStream) {
        let (proxy_end, client_end) = duplex(64 * 1024);
        (Channel::new(Side::Client, proxy_end, 1024), client_end)
    }

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut out = BytesMut::new();
        put_var_int(&mut out, body.len() as i32);
        out.extend_from_slice(body);
        out.to_vec()
    }

    fn handshake() -> Handshake {
        Handshake {
            protocol_version: ProtocolVersion::MINECRAFT_1_21_4.version(),
            server_address: "play.example.net".into(),
            server_port: 25565,
            next_state: 2,
        }
    }

    #[tokio::test]
    async fn test_reads_handshake_after_switch() {
        let tables = tables();
        let (mut proxy, client_end) = client_channel();
        // the player's side of the socket writes serverbound packets
        let mut player = Channel::new(Side::Server, client_end, 1024);

        for channel in [&mut proxy, &mut player] {
            channel.set_version(ProtocolVersion::LATEST);
            channel
                .switch_phase(Phase::Handshake, |direction| tables.mappings(Phase::Handshake, direction))
                .unwrap();
        }

        player.writer.write_message(&Message::packet(handshake())).await.unwrap();

        let message = proxy.reader.read_message().await.unwrap();
        assert_eq!(message.downcast_ref::<Handshake>(), Some(&handshake()));
        assert_eq!(proxy.reader.registries().phase(), Some(Phase::Handshake));
    }

    #[tokio::test]
    async fn test_unknown_packets_pass_as_binary() {
        let (mut channel, mut client) = client_channel();
        client.write_all(&frame(&[0x42, 1, 2, 3])).await.unwrap();

        let message = channel.reader.read_message().await.unwrap();
        match message {
            Message::Binary(binary) => {
                assert_eq!(binary.id, 0x42);
                assert_eq!(&binary.payload[..], &[1, 2, 3]);
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_eof_is_closed() {
        let (mut channel, client) = client_channel();
        drop(client);

        let err = channel.reader.read_message().await.unwrap_err();
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn test_write_then_read_back() {
        let (mut proxy, mut client) = client_channel();
        proxy
            .writer
            .write_message(&BinaryPacket::new(0x10, vec![7, 7]).into())
            .await
            .unwrap();

        let mut raw = [0u8; 4];
        client.read_exact(&mut raw).await.unwrap();
        assert_eq!(raw, [0x03, 0x10, 7, 7]);
    }

    #[tokio::test]
    async fn test_unregistered_native_packet_writes_nothing() {
        let (mut proxy, mut client) = client_channel();
        proxy.set_version(ProtocolVersion::LATEST);

        let err = proxy
            .writer
            .write_message(&Message::packet(SetCompression { threshold: 1 }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::UnregisteredPacket(_)));

        proxy
            .writer
            .write_message(&BinaryPacket::new(0x01, Vec::new()).into())
            .await
            .unwrap();
        let mut raw = [0u8; 2];
        client.read_exact(&mut raw).await.unwrap();
        assert_eq!(raw, [0x01, 0x01]);
    }

    #[tokio::test]
    async fn test_compression_applies_to_next_frame() {
        let (mut proxy, mut client) = client_channel();

        // an uncompressed frame and a compressed-format frame arrive together
        let mut wire = frame(&[0x01, 0xAA]);
        wire.extend(frame(&[0x00, 0x02, 0xBB]));
        client.write_all(&wire).await.unwrap();

        let first = proxy.reader.read_message().await.unwrap();
        assert!(matches!(first, Message::Binary(BinaryPacket { id: 0x01, .. })));

        proxy.reader.control().post(Reconfigure::SetCompression { threshold: 256 });
        let second = proxy.reader.read_message().await.unwrap();
        match second {
            Message::Binary(binary) => {
                assert_eq!(binary.id, 0x02);
                assert_eq!(&binary.payload[..], &[0xBB]);
            }
            other => panic!("expected binary, got {:?}", other),
        }
        assert!(proxy.reader.layers().is_compressed());
    }

    #[tokio::test]
    async fn test_encryption_decrypts_read_ahead() {
        let secret = [3u8; 16];
        let (mut proxy, client) = client_channel();
        let mut peer = Channel::new(Side::Server, client, 1024);

        // the peer sends one plain frame, then switches to encryption
        peer.writer.write_message(&BinaryPacket::new(0x01, vec![1]).into()).await.unwrap();
        peer.writer
            .control()
            .post(Reconfigure::EnableEncryption { secret });
        peer.writer.write_message(&BinaryPacket::new(0x02, vec![2]).into()).await.unwrap();
        peer.writer.write_message(&BinaryPacket::new(0x03, vec![3]).into()).await.unwrap();
        assert!(peer.writer.layers().is_encrypted());

        let first = proxy.reader.read_message().await.unwrap();
        assert!(matches!(first, Message::Binary(BinaryPacket { id: 0x01, .. })));
        assert!(proxy.reader.read_ahead() > 0);

        proxy.reader.control().post(Reconfigure::EnableEncryption { secret });
        for id in [0x02, 0x03] {
            match proxy.reader.read_message().await.unwrap() {
                Message::Binary(binary) => assert_eq!(binary.id, id),
                other => panic!("expected binary, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let (mut proxy, mut client) = client_channel();
        let control = Arc::clone(proxy.reader.control());

        control.pause().unwrap();
        assert!(matches!(control.pause(), Err(ProxyError::LinkState(_))));

        client.write_all(&frame(&[0x05])).await.unwrap();

        let read = tokio::spawn(async move { proxy.reader.read_message().await.map(|m| m.name()) });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!read.is_finished());

        control.resume().unwrap();
        assert!(matches!(control.resume(), Err(ProxyError::LinkState(_))));
        assert_eq!(read.await.unwrap().unwrap(), "BinaryPacket");
    }

    #[test]
    fn test_writer_cannot_pause() {
        let control = ChannelControl::new(Side::Server, Half::Write);
        assert!(matches!(control.pause(), Err(ProxyError::LinkState(_))));
        assert_eq!(control.direction(), Direction::Serverbound);

        let control = ChannelControl::new(Side::Server, Half::Read);
        assert_eq!(control.direction(), Direction::Clientbound);
    }

    #[tokio::test]
    async fn test_switch_phase_via_mailbox_needs_version() {
        let tables = tables();
        let (mut proxy, _client) = client_channel();

        proxy.writer.control().post(Reconfigure::SwitchPhase {
            phase: Phase::Login,
            mappings: tables.mappings(Phase::Login, Direction::Clientbound),
        });
        assert!(proxy.writer.control().has_pending());

        let err = proxy
            .writer
            .write_message(&BinaryPacket::new(0x00, Vec::new()).into())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::LinkState(_)));
        assert!(!proxy.writer.control().has_pending());
    }
}
