use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::packet::{Packet, PacketKind};
use crate::packet_id::PacketId;

/// Reassembles the in-order packet stream delivered by
///  [`crate::receiver_logic::ReceiverLogic`] into whole messages: fragment payloads are
///  accumulated until an `EndOfMessage` packet completes the message.
///
/// The delivered stream has consecutive ids except where a soft-reliability flush abandoned a
///  gap. In that case the tail of the interrupted message is gone for good, so the assembler
///  drops the partial assembly and skips up to the next message boundary before resuming. A
///  delivered `NotAvailable` marker means the same thing for a single id.
#[derive(Default)]
pub struct MessageAssembler {
    /// the id expected to continue the stream, `None` before the first delivered packet
    next_id: Option<PacketId>,
    partial: BytesMut,
    /// set while discarding the remainder of a message whose earlier fragments are lost
    skipping: bool,
}

impl MessageAssembler {
    pub fn new() -> MessageAssembler {
        MessageAssembler::default()
    }

    pub fn push(&mut self, packet: &Packet) -> Option<Bytes> {
        if let Some(expected) = self.next_id {
            if packet.id != expected {
                // ids jumped: a gap was abandoned, and with it the message it interrupted
                debug!("delivered ids jumped from {} to {} - dropping the interrupted message", expected, packet.id);
                self.partial.clear();
                self.skipping = true;
            }
        }
        self.next_id = Some(packet.id.next());

        match packet.kind {
            PacketKind::Intermediate => {
                if !self.skipping {
                    self.partial.put_slice(&packet.payload);
                }
                None
            }
            PacketKind::EndOfMessage => {
                if self.skipping {
                    // this terminates the partially lost message; resume with the next one
                    self.skipping = false;
                    self.partial.clear();
                    return None;
                }
                self.partial.put_slice(&packet.payload);
                Some(self.partial.split().freeze())
            }
            PacketKind::NotAvailable => {
                if !self.partial.is_empty() || self.skipping {
                    debug!("packet {} is gone for good - dropping the message it belonged to", packet.id);
                }
                self.partial.clear();
                self.skipping = true;
                None
            }
            PacketKind::Heartbeat | PacketKind::Nack => {
                debug_assert!(false, "this is a bug: {:?} packets are never delivered", packet.kind);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(kind: PacketKind, id: u32, payload: &'static [u8]) -> Packet {
        Packet::data(kind, PacketId::from_raw(id), Bytes::from_static(payload))
    }

    #[test]
    fn test_single_packet_message() {
        let mut assembler = MessageAssembler::new();

        let msg = assembler.push(&packet(PacketKind::EndOfMessage, 0, b"hello"));
        assert_eq!(msg.as_deref(), Some(b"hello".as_slice()));
    }

    #[test]
    fn test_multi_packet_message() {
        let mut assembler = MessageAssembler::new();

        assert_eq!(assembler.push(&packet(PacketKind::Intermediate, 0, b"This is ")), None);
        assert_eq!(assembler.push(&packet(PacketKind::Intermediate, 1, b"a ")), None);
        let msg = assembler.push(&packet(PacketKind::EndOfMessage, 2, b"test"));
        assert_eq!(msg.as_deref(), Some(b"This is a test".as_slice()));

        // and the next message starts cleanly
        let msg = assembler.push(&packet(PacketKind::EndOfMessage, 3, b"next"));
        assert_eq!(msg.as_deref(), Some(b"next".as_slice()));
    }

    #[test]
    fn test_messages_across_id_wrap() {
        let mut assembler = MessageAssembler::new();

        assert_eq!(assembler.push(&packet(PacketKind::Intermediate, 0xffff_ffff, b"wrapped ")), None);
        let msg = assembler.push(&packet(PacketKind::EndOfMessage, 0, b"message"));
        assert_eq!(msg.as_deref(), Some(b"wrapped message".as_slice()));
    }

    #[test]
    fn test_not_available_drops_the_message() {
        let mut assembler = MessageAssembler::new();

        assert_eq!(assembler.push(&packet(PacketKind::Intermediate, 0, b"doomed")), None);
        assert_eq!(assembler.push(&Packet::not_available(PacketId::from_raw(1))), None);

        // the rest of the interrupted message is discarded up to its end marker
        assert_eq!(assembler.push(&packet(PacketKind::EndOfMessage, 2, b"tail")), None);

        let msg = assembler.push(&packet(PacketKind::EndOfMessage, 3, b"fresh"));
        assert_eq!(msg.as_deref(), Some(b"fresh".as_slice()));
    }

    #[test]
    fn test_id_jump_drops_the_interrupted_message() {
        let mut assembler = MessageAssembler::new();

        assert_eq!(assembler.push(&packet(PacketKind::Intermediate, 0, b"lost tail")), None);

        // a soft-reliability flush skipped ids 1..=4; the delivered stream resumes at 5 in
        // the middle of some later message
        assert_eq!(assembler.push(&packet(PacketKind::Intermediate, 5, b"later ")), None);
        assert_eq!(assembler.push(&packet(PacketKind::EndOfMessage, 6, b"fragment")), None);

        let msg = assembler.push(&packet(PacketKind::EndOfMessage, 7, b"clean"));
        assert_eq!(msg.as_deref(), Some(b"clean".as_slice()));
    }
}
