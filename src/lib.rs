//! Reliable-multicast protocol engine: turns an unreliable, unordered, lossy datagram channel
//!  (typically UDP multicast) into an ordered, gap-filling, bounded-memory delivery stream for
//!  a pub/sub transport.
//!
//! ## Design goals
//!
//! * One sender, many receivers over a best-effort datagram group
//!   * every receiver tracks the sender's packet stream independently
//!   * no connection handshake - a receiver syncs onto the stream from the first data packet
//!      it sees
//! * The abstraction is sending / receiving *messages* (defined-length chunks of data), while
//!   the wire carries fixed-size *packets*
//!   * messages bigger than [`packetizer::MAX_PAYLOAD_SIZE`] are split across consecutive
//!     packets and reassembled on the receiving side
//! * The default is to assume delivery unless a negative ack (NACK) is sent
//!   * receivers detect gaps in the sequence numbers and request re-sends for exactly the
//!     missing ranges
//!   * the sender retains a bounded history of sent packets; evicted ids are answered with an
//!     explicit 'not available' marker so receivers can stop waiting
//! * Guarantee that those packets that are delivered, are delivered in the order they were sent
//! * Bounded memory on both sides
//!   * the receive buffer holds at most a configured number of out-of-order packets; when it
//!     overflows, the configured reliability policy decides between failing the association
//!     ('hard') and abandoning the gap to resynchronize on the freshest data ('soft')
//! * Sequence numbers are 32 bits and wrap around; all window and ordering arithmetic is
//!   circular
//! * Heartbeats let an idle stream's receivers notice that they are stale even when no new
//!   data is being sent
//!
//! ## Wire format
//!
//! Every UDP datagram carries exactly one packet. All numbers are in network byte order (BE):
//!
//! ```ascii
//! 0: packet kind (u8):
//!     * 0 DATA_INTERMEDIATE:   a fragment of a message that continues in the next packet
//!     * 1 DATA_END_OF_MESSAGE: the last (or only) fragment of a message
//!     * 2 DATA_NOT_AVAILABLE:  the sender no longer has this packet; receivers must give up on it
//!     * 3 HEARTBEAT:           carries the sender's next unassigned sequence number
//!     * 4 NACK:                a receiver is missing a range of sequence numbers
//! 1: sequence number (u32)
//! 5: for kind 0..=3: payload length (u32), followed by that many payload bytes
//!     NB: kinds 2 and 3 are sent with a zero payload length
//!    for kind 4: missing range as [begin (u32)][end (u32)], half-open, in place of a payload
//! ```
//!
//! ## NACK semantics
//!
//! A receiver NACKs the half-open range of every gap it currently sees, re-emitting the full
//!  set both on packet arrival and periodically on a timer until the gaps are filled (or
//!  abandoned). The sender answers each NACK'ed id either with the retained packet or with
//!  DATA_NOT_AVAILABLE. Re-sends go back to the group, so one receiver's NACK can repair
//!  another receiver's loss as a side effect.
//!
//! NB: The criteria for *when* to re-emit NACKs are configurable ([`config::RmcastConfig`]);
//!  the protocol is robust against differing configurations since NACK handling on the sender
//!  side is stateless.

pub mod config;
pub mod end_point;
pub mod error;
pub mod message_dispatcher;
pub mod nack_tracker;
pub mod packet;
pub mod packet_id;
pub mod packetizer;
pub mod reassembly;
pub mod receiver_logic;
pub mod send_socket;
pub mod sender_logic;
