use bytes::{BufMut, BytesMut};

use crate::packet::{Packet, PacketKind};
use crate::packet_id::PacketId;

/// The maximum number of message bytes carried by a single packet. This is a protocol
///  constant, not a tunable: all participants must agree on it for reassembly to line up.
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// Splits an outbound message (given as a sequence of byte slices that are logically
///  concatenated) into packets of at most [`MAX_PAYLOAD_SIZE`] payload bytes: one
///  `Intermediate` packet per full chunk, with the final chunk marked `EndOfMessage`.
///
/// The emitted packets carry placeholder id 0; [`crate::sender_logic::SenderLogic::send`]
///  assigns the real consecutive ids in send order.
pub fn packetize(bufs: &[&[u8]]) -> Vec<Packet> {
    let total_len = bufs.iter().map(|b| b.len()).sum();

    let mut data = BytesMut::with_capacity(total_len);
    for buf in bufs {
        data.put_slice(buf);
    }
    let mut rest = data.freeze();

    let mut packets = Vec::with_capacity(total_len / MAX_PAYLOAD_SIZE + 1);
    while rest.len() > MAX_PAYLOAD_SIZE {
        let chunk = rest.split_to(MAX_PAYLOAD_SIZE);
        packets.push(Packet::data(PacketKind::Intermediate, PacketId::ZERO, chunk));
    }
    packets.push(Packet::data(PacketKind::EndOfMessage, PacketId::ZERO, rest));
    packets
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty(0, 1)]
    #[case::small(34, 1)]
    #[case::one_below(MAX_PAYLOAD_SIZE - 1, 1)]
    #[case::exactly_full(MAX_PAYLOAD_SIZE, 1)]
    #[case::one_above(MAX_PAYLOAD_SIZE + 1, 2)]
    #[case::two_full(2 * MAX_PAYLOAD_SIZE, 2)]
    #[case::big(10 * MAX_PAYLOAD_SIZE + 7, 11)]
    fn test_packetize_chunking(#[case] message_len: usize, #[case] expected_num_packets: usize) {
        let message = (0..message_len).map(|i| i as u8).collect::<Vec<_>>();

        let packets = packetize(&[&message]);

        assert_eq!(packets.len(), expected_num_packets);
        for packet in &packets[..packets.len() - 1] {
            assert_eq!(packet.kind, PacketKind::Intermediate);
            assert_eq!(packet.payload.len(), MAX_PAYLOAD_SIZE);
        }
        assert_eq!(packets.last().unwrap().kind, PacketKind::EndOfMessage);

        // concatenating the payloads in emission order reproduces the message exactly
        let mut reassembled = Vec::new();
        for packet in &packets {
            reassembled.extend_from_slice(&packet.payload);
        }
        assert_eq!(reassembled, message);
    }

    #[test]
    fn test_packetize_concatenates_input_buffers() {
        let packets = packetize(&[b"This is a test", b"This is another test"]);

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].kind, PacketKind::EndOfMessage);
        assert_eq!(packets[0].payload.as_ref(), b"This is a testThis is another test");
    }

    #[test]
    fn test_packetize_multiple_buffers_across_chunks() {
        let filler = [9u8; MAX_PAYLOAD_SIZE];
        let packets = packetize(&[b"This is a test", b"This is another test", &filler]);

        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].kind, PacketKind::Intermediate);
        assert_eq!(packets[0].payload.len(), MAX_PAYLOAD_SIZE);
        assert_eq!(packets[1].kind, PacketKind::EndOfMessage);
        assert_eq!(packets[1].payload.len(), 34);
    }

    #[test]
    fn test_packetize_assigns_placeholder_ids() {
        let message = [0u8; 3 * MAX_PAYLOAD_SIZE];
        for packet in packetize(&[&message]) {
            assert_eq!(packet.id, PacketId::ZERO);
        }
    }
}
