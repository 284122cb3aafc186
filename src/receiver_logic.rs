use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use crate::error::RmcastError;
use crate::nack_tracker::NackTracker;
use crate::packet::{Packet, PacketKind};
use crate::packet_id::PacketId;

/// What to do when the receive buffer fills up while a gap is still unresolved.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Reliability {
    /// an unrecoverable gap fails the association
    Hard,
    /// unrecoverable gaps are abandoned silently, resynchronizing on the freshest data
    Soft,
}

/// The outputs of one [`ReceiverLogic::receive`] call: NACKs to send back to the sender, and
///  packets that are now deliverable in order.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct Received {
    pub nacks: Vec<Packet>,
    pub delivered: Vec<Packet>,
}

/// Per-remote-sender reassembly state machine: consumes incoming packets, buffers
///  out-of-order arrivals up to a configured capacity, delivers consecutive runs in order,
///  and tracks the currently missing id ranges for NACK'ing.
///
/// One instance serves exactly one remote sender; the caller serializes access per instance.
///  Every call is a bounded-time computation over bounded in-memory state.
pub struct ReceiverLogic {
    buffer_size: usize,
    reliability: Reliability,

    /// `None` until the first data packet from this sender has been seen; afterwards the id
    ///  of the last packet handed to the application
    last_delivered: Option<PacketId>,

    /// Out-of-order arrivals waiting for the gap before them to be filled.
    ///
    /// NB: Keys are in numeric order, *not* circular order. After the sequence numbers wrap,
    ///  the freshest ids are the numerically smallest ones; the places that care
    ///  (`previous_received_id`, the soft-overflow flush) handle that explicitly.
    buffer: BTreeMap<PacketId, Packet>,

    nack_tracker: NackTracker,

    /// set once a hard-reliability overflow has failed this association; terminal
    failed: bool,
}

impl ReceiverLogic {
    pub fn new(buffer_size: usize, reliability: Reliability) -> ReceiverLogic {
        debug_assert!(buffer_size >= 2, "receive buffer of size {} cannot hold an out-of-order packet", buffer_size);

        ReceiverLogic {
            buffer_size,
            reliability,
            last_delivered: None,
            buffer: BTreeMap::default(),
            nack_tracker: NackTracker::new(),
            failed: false,
        }
    }

    /// Consumes one incoming packet, returning the NACKs that should go back on the wire and
    ///  the packets that became deliverable.
    ///
    /// Under hard reliability this fails with [`RmcastError::ReliabilityViolated`] when the
    ///  buffer is exhausted with an unresolved gap; the instance is unusable afterwards, and
    ///  every subsequent call reports the same error.
    pub fn receive(&mut self, packet: Packet) -> Result<Received, RmcastError> {
        if self.failed {
            return Err(RmcastError::ReliabilityViolated {
                last_delivered: self.last_delivered,
            });
        }

        let mut delivered = Vec::new();

        match packet.kind {
            PacketKind::Intermediate | PacketKind::EndOfMessage | PacketKind::NotAvailable => {
                let last = match self.last_delivered {
                    Some(last) => last,
                    None => {
                        if !packet.is_data() {
                            trace!("ignoring {:?} packet before the first data packet", packet.kind);
                            return Ok(Received::default());
                        }
                        debug!("first data packet from this sender has id {}", packet.id);
                        let last = packet.id.prev();
                        self.last_delivered = Some(last);
                        last
                    }
                };

                let was_canceled = self.nack_tracker.cancel(packet.id);

                if self.is_in_receive_window(last, packet.id) {
                    if packet.id == last.next() {
                        self.deliver(packet, &mut delivered);
                        self.flush_consecutive(&mut delivered);
                    }
                    else if !self.buffer.contains_key(&packet.id) {
                        if packet.is_data() {
                            let packet_id = packet.id;
                            let previous = self.previous_received_id(packet_id, last);
                            self.buffer.insert(packet_id, packet);

                            if !was_canceled {
                                // everything between the latest received id and this one is
                                // now known to be missing
                                self.nack_tracker.add_range(previous.next(), packet_id);
                            }

                            if self.buffer.len() == self.buffer_size {
                                self.handle_overflow(&mut delivered)?;
                            }
                        }
                        else {
                            // the sender has given up on this id for good - treat it like an
                            // exhausted buffer and let the reliability policy decide
                            debug!("sender reports packet {} as gone for good", packet.id);
                            self.handle_overflow(&mut delivered)?;
                        }
                    }
                }
                else {
                    trace!("packet {} is outside the receive window after {} - ignoring", packet.id, last);
                }
            }
            PacketKind::Heartbeat => {
                let Some(last) = self.last_delivered else {
                    return Ok(Received::default());
                };

                if !self.is_in_recent_window(last, packet.id) {
                    // we are stale: NACK a single id near the sender's current position; the
                    // answer (data or a not-available marker) drags us back into sync
                    debug!("heartbeat id {} is far from the last delivered id {} - requesting resync", packet.id, last);
                    self.nack_tracker.add_range(packet.id, packet.id.next());
                }
            }
            PacketKind::Nack => {
                // NACKs are consumed by the sending side; nothing to do here
                if self.last_delivered.is_none() {
                    return Ok(Received::default());
                }
            }
        }

        Ok(Received {
            nacks: self.nack_tracker.snapshot(),
            delivered,
        })
    }

    /// The current set of outstanding NACKs, for periodic re-emission by a timer.
    pub fn nack_snapshot(&self) -> Vec<Packet> {
        self.nack_tracker.snapshot()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// ids the receiver is still willing to buffer: `(last, last + 2*buffer_size]`
    fn is_in_receive_window(&self, last: PacketId, id: PacketId) -> bool {
        let offset = id.offset_from(last);
        offset >= 1 && offset <= 2 * self.buffer_size as u32
    }

    /// ids considered 'recently seen' for heartbeat staleness: `[last - 2*buffer_size, last]`
    fn is_in_recent_window(&self, last: PacketId, id: PacketId) -> bool {
        last.offset_from(id) <= 2 * self.buffer_size as u32
    }

    fn deliver(&mut self, packet: Packet, delivered: &mut Vec<Packet>) {
        self.last_delivered = Some(packet.id);
        delivered.push(packet);
    }

    /// pops and delivers buffered packets for as long as they continue the delivered run
    fn flush_consecutive(&mut self, delivered: &mut Vec<Packet>) {
        loop {
            let next = self
                .last_delivered
                .expect("this is a bug: flushing consecutive packets before the first delivery")
                .next();
            match self.buffer.remove(&next) {
                Some(packet) => self.deliver(packet, delivered),
                None => break,
            }
        }
    }

    /// The id of the latest received packet before `id`, *before* `id` itself is inserted:
    ///  the numeric predecessor among buffered ids, falling back to the numerically largest
    ///  buffered id (its wrapped-around predecessor) when `id` is below all buffered entries,
    ///  else to the last delivered id.
    fn previous_received_id(&self, id: PacketId, last: PacketId) -> PacketId {
        if let Some((&predecessor, _)) = self.buffer.range(..id).next_back() {
            return predecessor;
        }
        if let Some((&numerically_largest, _)) = self.buffer.last_key_value() {
            // `id` is numerically below every buffered entry, but inside the receive window:
            // the sequence numbers have wrapped, and the circular predecessor is the
            // numerically largest buffered id
            return numerically_largest;
        }
        last
    }

    fn handle_overflow(&mut self, delivered: &mut Vec<Packet>) -> Result<(), RmcastError> {
        match self.reliability {
            Reliability::Hard => {
                warn!("receive buffer exhausted with an unresolved gap after {:?} - failing the association", self.last_delivered);
                self.failed = true;
                Err(RmcastError::ReliabilityViolated {
                    last_delivered: self.last_delivered,
                })
            }
            Reliability::Soft => {
                debug!("receive buffer exhausted - abandoning the gap and resynchronizing on the freshest data");

                if let Some(newest) = self.newest_buffered_id() {
                    // walk back to the start of the consecutive run ending at the newest id;
                    // the walk wraps, so it picks up pre-wrap ids that belong to the run
                    let mut start = newest;
                    while self.buffer.contains_key(&start.prev()) {
                        start = start.prev();
                    }

                    let mut id = start;
                    loop {
                        let packet = self
                            .buffer
                            .remove(&id)
                            .expect("this is a bug: the run was probed as fully buffered");
                        self.deliver(packet, delivered);
                        if id == newest {
                            break;
                        }
                        id = id.next();
                    }
                }

                self.buffer.clear();
                self.nack_tracker.cancel_all();
                Ok(())
            }
        }
    }

    /// The most recently sent id in the buffer. In numeric key order the freshest ids come
    ///  first after a wraparound, so the newest entry is the one right before the first jump
    ///  of `2*buffer_size` or more between consecutive keys; entries beyond that jump are
    ///  either stale leftovers or the pre-wrap part of the final run.
    fn newest_buffered_id(&self) -> Option<PacketId> {
        let mut keys = self.buffer.keys();
        let mut newest = *keys.next()?;
        for &key in keys {
            if key.offset_from(newest) >= 2 * self.buffer_size as u32 {
                break;
            }
            newest = key;
        }
        Some(newest)
    }
}
