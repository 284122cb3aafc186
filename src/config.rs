use std::net::SocketAddr;
use std::time::Duration;

use anyhow::bail;

use crate::receiver_logic::Reliability;

/// Configuration for an [`crate::end_point::EndPoint`]. The protocol is robust against peers
///  running with different values - the settings only shape local buffering and timing.
pub struct RmcastConfig {
    /// local address the datagram socket binds to
    pub local_addr: SocketAddr,

    /// the multicast group data packets, heartbeats and retransmissions are sent to
    pub group_addr: SocketAddr,

    /// The maximum number of out-of-order packets buffered per remote sender. When the buffer
    ///  fills up with a gap still unresolved, `reliability` decides what happens.
    pub receiver_buffer_size: usize,

    /// The number of sent packets retained for answering NACKs. Choosing this too small makes
    ///  receivers run into 'not available' answers on short outages; choosing it too big
    ///  costs memory per association.
    pub sender_history_size: usize,

    pub reliability: Reliability,

    /// how often outstanding NACKs are re-emitted - configure to roughly 2x RTT
    pub nack_interval: Duration,

    /// how often a heartbeat is sent while the stream is idle - on the order of seconds
    pub heartbeat_interval: Duration,
}

impl RmcastConfig {
    pub fn new(local_addr: SocketAddr, group_addr: SocketAddr) -> RmcastConfig {
        RmcastConfig {
            local_addr,
            group_addr,
            receiver_buffer_size: 256,
            sender_history_size: 1024,
            reliability: Reliability::Hard,
            nack_interval: Duration::from_millis(20),
            heartbeat_interval: Duration::from_secs(1),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.receiver_buffer_size < 2 {
            bail!("receiver buffer size {} is too small to hold an out-of-order packet", self.receiver_buffer_size);
        }
        if self.sender_history_size == 0 {
            bail!("sender history size must be at least 1");
        }
        if !self.group_addr.ip().is_multicast() {
            bail!("group address {} is not a multicast address", self.group_addr);
        }
        if self.group_addr.is_ipv4() != self.local_addr.is_ipv4() {
            bail!("group address {} and local address {} must be the same IP version", self.group_addr, self.local_addr);
        }
        Ok(())
    }
}
