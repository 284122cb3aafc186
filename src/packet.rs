use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::DecodeError;
use crate::packet_id::PacketId;

/// The type tag of a packet. The discriminants are the wire representation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PacketKind {
    /// a fragment of a message that continues in the packet with the next id
    Intermediate = 0,
    /// the last (or only) fragment of a message
    EndOfMessage = 1,
    /// the sender no longer retains this id - receivers must stop waiting for it
    NotAvailable = 2,
    /// carries the sender's next unassigned id so idle receivers can detect staleness
    Heartbeat = 3,
    /// a receiver is missing the ids in `[nack_begin, nack_end)`
    Nack = 4,
}

/// The wire / logical unit of the protocol. Equality is structural, which the receiver relies
///  on for idempotence checks and the tests rely on throughout.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Packet {
    pub id: PacketId,
    pub kind: PacketKind,
    /// start of the missing range; meaningful only for [`PacketKind::Nack`], zero otherwise
    pub nack_begin: PacketId,
    /// end (exclusive) of the missing range; meaningful only for [`PacketKind::Nack`]
    pub nack_end: PacketId,
    /// opaque message bytes; meaningful only for the two data kinds, empty otherwise
    pub payload: Bytes,
}

impl Packet {
    pub fn data(kind: PacketKind, id: PacketId, payload: Bytes) -> Packet {
        debug_assert!(matches!(kind, PacketKind::Intermediate | PacketKind::EndOfMessage));
        Packet {
            id,
            kind,
            nack_begin: PacketId::ZERO,
            nack_end: PacketId::ZERO,
            payload,
        }
    }

    pub fn not_available(id: PacketId) -> Packet {
        Packet {
            id,
            kind: PacketKind::NotAvailable,
            nack_begin: PacketId::ZERO,
            nack_end: PacketId::ZERO,
            payload: Bytes::new(),
        }
    }

    pub fn heartbeat(id: PacketId) -> Packet {
        Packet {
            id,
            kind: PacketKind::Heartbeat,
            nack_begin: PacketId::ZERO,
            nack_end: PacketId::ZERO,
            payload: Bytes::new(),
        }
    }

    pub fn nack(begin: PacketId, end: PacketId) -> Packet {
        Packet {
            id: begin,
            kind: PacketKind::Nack,
            nack_begin: begin,
            nack_end: end,
            payload: Bytes::new(),
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self.kind, PacketKind::Intermediate | PacketKind::EndOfMessage)
    }

    pub fn serialized_len(&self) -> usize {
        match self.kind {
            PacketKind::Nack => 1 + 3 * size_of::<u32>(),
            _ => 1 + 2 * size_of::<u32>() + self.payload.len(),
        }
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(self.kind.into());
        buf.put_u32(self.id.to_raw());
        match self.kind {
            PacketKind::Nack => {
                buf.put_u32(self.nack_begin.to_raw());
                buf.put_u32(self.nack_end.to_raw());
            }
            _ => {
                buf.put_u32(self.payload.len() as u32);
                buf.put_slice(&self.payload);
            }
        }
    }

    pub fn deser(buf: &mut impl Buf) -> Result<Packet, DecodeError> {
        let kind_byte = buf.try_get_u8()?;
        let kind = PacketKind::try_from(kind_byte).map_err(|_| DecodeError::UnknownKind(kind_byte))?;
        let id = PacketId::from_raw(buf.try_get_u32()?);

        match kind {
            PacketKind::Nack => {
                let nack_begin = PacketId::from_raw(buf.try_get_u32()?);
                let nack_end = PacketId::from_raw(buf.try_get_u32()?);
                Ok(Packet {
                    id,
                    kind,
                    nack_begin,
                    nack_end,
                    payload: Bytes::new(),
                })
            }
            _ => {
                let payload_len = buf.try_get_u32()? as usize;
                if buf.remaining() < payload_len {
                    return Err(DecodeError::Truncated {
                        requested: payload_len,
                        available: buf.remaining(),
                    });
                }
                Ok(Packet {
                    id,
                    kind,
                    nack_begin: PacketId::ZERO,
                    nack_end: PacketId::ZERO,
                    payload: buf.copy_to_bytes(payload_len),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn id(raw: u32) -> PacketId {
        PacketId::from_raw(raw)
    }

    #[rstest]
    #[case::intermediate(
        Packet::data(PacketKind::Intermediate, id(0x01020304), Bytes::from_static(b"ab")),
        vec![0, 1,2,3,4, 0,0,0,2, b'a',b'b'])]
    #[case::end_of_message(
        Packet::data(PacketKind::EndOfMessage, id(7), Bytes::from_static(b"Test Payload")),
        vec![1, 0,0,0,7, 0,0,0,12, b'T',b'e',b's',b't',b' ',b'P',b'a',b'y',b'l',b'o',b'a',b'd'])]
    #[case::empty_end_of_message(
        Packet::data(PacketKind::EndOfMessage, id(0), Bytes::new()),
        vec![1, 0,0,0,0, 0,0,0,0])]
    #[case::not_available(
        Packet::not_available(id(10)),
        vec![2, 0,0,0,10, 0,0,0,0])]
    #[case::heartbeat(
        Packet::heartbeat(id(0xffff_ffff)),
        vec![3, 255,255,255,255, 0,0,0,0])]
    #[case::nack(
        Packet::nack(id(0x0a), id(0x10)),
        vec![4, 0,0,0,10, 0,0,0,10, 0,0,0,16])]
    #[case::nack_across_wrap(
        Packet::nack(id(0xffff_ffff), id(5)),
        vec![4, 255,255,255,255, 255,255,255,255, 0,0,0,5])]
    fn test_ser_deser_round_trip(#[case] packet: Packet, #[case] expected_wire: Vec<u8>) {
        let mut buf = BytesMut::new();
        packet.ser(&mut buf);
        assert_eq!(buf.as_ref(), expected_wire.as_slice());
        assert_eq!(buf.len(), packet.serialized_len());

        let mut b: &[u8] = &buf;
        let deserialized = Packet::deser(&mut b).unwrap();
        assert!(b.is_empty());
        assert_eq!(deserialized, packet);
    }

    #[test]
    fn test_deser_rejects_unknown_kind() {
        let mut b: &[u8] = &[5, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(Packet::deser(&mut b), Err(DecodeError::UnknownKind(5)));
    }

    #[test]
    fn test_deser_rejects_truncated_input() {
        let mut buf = BytesMut::new();
        Packet::data(PacketKind::EndOfMessage, id(3), Bytes::from_static(b"hello")).ser(&mut buf);

        // every proper prefix must fail cleanly, without panicking
        for cut in 0..buf.len() {
            let mut b: &[u8] = &buf[..cut];
            let result = Packet::deser(&mut b);
            assert!(matches!(result, Err(DecodeError::Truncated { .. })), "prefix of length {} was accepted", cut);
        }

        let mut nack_buf = BytesMut::new();
        Packet::nack(id(1), id(2)).ser(&mut nack_buf);
        for cut in 0..nack_buf.len() {
            let mut b: &[u8] = &nack_buf[..cut];
            assert!(Packet::deser(&mut b).is_err());
        }
    }

    #[test]
    fn test_deser_rejects_payload_length_past_end() {
        // declared payload length of 4 but only 2 bytes present
        let mut b: &[u8] = &[0, 0, 0, 0, 1, 0, 0, 0, 4, b'x', b'y'];
        assert_eq!(
            Packet::deser(&mut b),
            Err(DecodeError::Truncated { requested: 4, available: 2 })
        );
    }

    #[test]
    fn test_structural_equality() {
        let a = Packet::data(PacketKind::EndOfMessage, id(1), Bytes::from_static(b"x"));
        let b = Packet::data(PacketKind::EndOfMessage, id(1), Bytes::from_static(b"x"));
        let c = Packet::data(PacketKind::Intermediate, id(1), Bytes::from_static(b"x"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Packet::not_available(id(1)));
    }
}
