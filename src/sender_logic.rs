use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::packet::{Packet, PacketKind};
use crate::packet_id::PacketId;

/// Retransmission buffer for one local sender: assigns consecutive (wrapping) sequence ids at
///  send time and retains the last `history_size` sent packets so NACK'ed ids can be answered
///  with the original data. Ids that were evicted are answered with a `NotAvailable` marker,
///  telling receivers the data is permanently gone.
pub struct SenderLogic {
    history_size: usize,
    /// the next id to be assigned
    current_id: PacketId,
    history: BTreeMap<PacketId, Packet>,
}

impl SenderLogic {
    pub fn new(history_size: usize) -> SenderLogic {
        SenderLogic {
            history_size,
            current_id: PacketId::ZERO,
            history: BTreeMap::default(),
        }
    }

    /// Assigns the next sequence id to `packet`, retains a copy for retransmission, and
    ///  returns the packet for immediate transmission.
    pub fn send(&mut self, mut packet: Packet) -> Packet {
        packet.id = self.current_id;
        self.current_id = self.current_id.next();

        self.history.insert(packet.id, packet.clone());
        while self.history.len() > self.history_size {
            let evicted = self.history.pop_first();
            trace!("evicting packet {:?} from the send history", evicted.map(|(id, _)| id));
        }

        packet
    }

    /// Answers a NACK: for every id in `[nack_begin, nack_end)`, the retained packet if it is
    ///  still in the history, else a synthesized `NotAvailable` placeholder.
    pub fn receive(&self, nack: &Packet) -> Vec<Packet> {
        debug_assert_eq!(nack.kind, PacketKind::Nack);

        let num_requested = nack.nack_end.offset_from(nack.nack_begin);
        let mut redelivered = Vec::with_capacity(num_requested as usize);

        let mut id = nack.nack_begin;
        while id != nack.nack_end {
            match self.history.get(&id) {
                Some(packet) => redelivered.push(packet.clone()),
                None => {
                    debug!("NACK requested packet {} which is no longer in the send history", id);
                    redelivered.push(Packet::not_available(id));
                }
            }
            id = id.next();
        }

        redelivered
    }

    /// A heartbeat carrying the next id to be assigned, so receivers can detect staleness
    ///  while no data is being sent.
    pub fn make_heartbeat(&self) -> Packet {
        Packet::heartbeat(self.current_id)
    }
}
