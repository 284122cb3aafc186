use std::collections::hash_map::Entry;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::bail;
use bytes::BytesMut;
use rustc_hash::FxHashMap;
use tokio::net::UdpSocket;
use tokio::select;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info, trace, warn};

use crate::config::RmcastConfig;
use crate::message_dispatcher::MessageDispatcher;
use crate::packet::{Packet, PacketKind};
use crate::packetizer::packetize;
use crate::reassembly::MessageAssembler;
use crate::receiver_logic::ReceiverLogic;
use crate::send_socket::SendSocket;
use crate::sender_logic::SenderLogic;

/// EndPoint is the place where all other parts of the protocol come together: It listens on a
///  UDP socket joined to the multicast group, feeds incoming packets to the per-sender
///  receiver state machines and the sender-side retransmission buffer, and has an API for
///  application code to send messages to the group.
pub struct EndPoint {
    config: Arc<RmcastConfig>,
    receive_socket: Arc<UdpSocket>,
    send_socket: Arc<dyn SendSocket>,
    sender: Arc<RwLock<SenderLogic>>,
    receivers: Arc<RwLock<FxHashMap<SocketAddr, PeerReceiver>>>,
    message_dispatcher: Arc<dyn MessageDispatcher>,
}

/// per-remote-sender receive state, created lazily when the first packet from that sender
///  arrives and dropped when the association is torn down
struct PeerReceiver {
    logic: ReceiverLogic,
    assembler: MessageAssembler,
}

impl EndPoint {
    pub async fn new(
        message_dispatcher: Arc<dyn MessageDispatcher>,
        config: Arc<RmcastConfig>,
    ) -> anyhow::Result<EndPoint> {
        config.validate()?;

        let receive_socket = Arc::new(UdpSocket::bind(config.local_addr).await?);
        info!("bound receive socket to {:?}", receive_socket.local_addr()?);

        match (config.group_addr.ip(), receive_socket.local_addr()?.ip()) {
            (IpAddr::V4(group), IpAddr::V4(local)) => {
                receive_socket.join_multicast_v4(group, local)?;
                receive_socket.set_multicast_loop_v4(false)?;
            }
            (IpAddr::V6(group), IpAddr::V6(_)) => {
                receive_socket.join_multicast_v6(&group, 0)?;
                receive_socket.set_multicast_loop_v6(false)?;
            }
            _ => bail!("group address {} and local address must be the same IP version", config.group_addr),
        }
        info!("joined multicast group {:?}", config.group_addr);

        let send_socket: Arc<dyn SendSocket> = Arc::new(receive_socket.clone());
        Ok(Self::from_parts(receive_socket, send_socket, message_dispatcher, config))
    }

    fn from_parts(
        receive_socket: Arc<UdpSocket>,
        send_socket: Arc<dyn SendSocket>,
        message_dispatcher: Arc<dyn MessageDispatcher>,
        config: Arc<RmcastConfig>,
    ) -> EndPoint {
        let sender = Arc::new(RwLock::new(SenderLogic::new(config.sender_history_size)));

        EndPoint {
            config,
            receive_socket,
            send_socket,
            sender,
            receivers: Default::default(),
            message_dispatcher,
        }
    }

    /// Fragments the given buffers (logically concatenated) into packets, assigns sequence
    ///  ids, and sends them to the group. Returns the number of payload bytes sent.
    pub async fn send_bytes(&self, buffers: &[&[u8]]) -> anyhow::Result<usize> {
        let packets = packetize(buffers);
        let num_payload_bytes = packets.iter().map(|p| p.payload.len()).sum();

        debug!("sending message of {} bytes as {} packets to {:?}", num_payload_bytes, packets.len(), self.config.group_addr);

        let mut sender = self.sender.write().await;
        for packet in packets {
            let packet = sender.send(packet);
            self.send_packet(self.config.group_addr, &packet).await;
        }

        Ok(num_payload_bytes)
    }

    /// Receive loop - this function never returns, it runs until the endpoint is dropped
    pub async fn recv_loop(&self) {
        info!("starting receive loop");

        let mut buf = vec![0u8; 65536];
        loop {
            let (num_read, from) = match self.receive_socket.recv_from(&mut buf).await {
                Ok(x) => x,
                Err(e) => {
                    error!("socket error: {}", e);
                    continue;
                }
            };

            let mut parse_buf = &buf[..num_read];
            let packet = match Packet::deser(&mut parse_buf) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("received unparseable packet from {:?} - dropping: {}", from, e);
                    continue;
                }
            };

            self.on_packet(from, packet).await;
        }
    }

    /// Active loop - periodically re-emits outstanding NACKs and sends heartbeats. Never
    ///  returns; run it alongside [`EndPoint::recv_loop`].
    pub async fn active_loop(&self) {
        let mut nack_interval = interval(self.config.nack_interval);
        let mut heartbeat_interval = interval(self.config.heartbeat_interval);

        loop {
            select! {
                _ = nack_interval.tick() => {
                    let receivers = self.receivers.read().await;
                    for (&peer_addr, receiver) in receivers.iter() {
                        for nack in receiver.logic.nack_snapshot() {
                            trace!("re-emitting NACK [{}, {}) to {:?}", nack.nack_begin, nack.nack_end, peer_addr);
                            self.send_packet(peer_addr, &nack).await;
                        }
                    }
                }
                _ = heartbeat_interval.tick() => {
                    let heartbeat = self.sender.read().await.make_heartbeat();
                    self.send_packet(self.config.group_addr, &heartbeat).await;
                }
            }
        }
    }

    async fn on_packet(&self, from: SocketAddr, packet: Packet) {
        trace!("received {:?} packet {} from {:?}", packet.kind, packet.id, from);

        if packet.kind == PacketKind::Nack {
            let redelivered = self.sender.read().await.receive(&packet);
            debug!("NACK from {:?} for [{}, {}) - re-sending {} packets", from, packet.nack_begin, packet.nack_end, redelivered.len());

            for packet in &redelivered {
                // re-sends go back to the whole group, so one receiver's NACK can repair
                // another receiver's loss as a side effect
                self.send_packet(self.config.group_addr, packet).await;
            }
            return;
        }

        let mut receivers = self.receivers.write().await;
        let peer = match receivers.entry(from) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                debug!("first packet from {:?} - initializing receiver state", from);
                e.insert(PeerReceiver {
                    logic: ReceiverLogic::new(self.config.receiver_buffer_size, self.config.reliability),
                    assembler: MessageAssembler::new(),
                })
            }
        };

        match peer.logic.receive(packet) {
            Ok(received) => {
                for nack in &received.nacks {
                    self.send_packet(from, nack).await;
                }
                for packet in &received.delivered {
                    if let Some(msg) = peer.assembler.push(packet) {
                        self.message_dispatcher.on_message(from, &msg).await;
                    }
                }
            }
            Err(e) => {
                error!("association with {:?} failed - tearing it down: {}", from, e);
                receivers.remove(&from);
            }
        }
    }

    async fn send_packet(&self, to: SocketAddr, packet: &Packet) {
        let mut buf = BytesMut::with_capacity(packet.serialized_len());
        packet.ser(&mut buf);
        self.send_socket.do_send_packet(to, &buf).await;
    }
}
