use std::collections::BTreeMap;

use tracing::trace;

use crate::packet::Packet;
use crate::packet_id::PacketId;

/// The set of id ranges one receiver currently believes missing from a sender's stream. Each
///  entry maps a range's start to its (exclusive) end; ranges never overlap, and adjacent
///  ranges may remain distinct entries.
///
/// Every [`crate::receiver_logic::ReceiverLogic`] owns its own tracker - there is no shared
///  state between associations.
#[derive(Default, Debug)]
pub struct NackTracker {
    ranges: BTreeMap<PacketId, PacketId>,
}

impl NackTracker {
    pub fn new() -> NackTracker {
        NackTracker::default()
    }

    /// Registers `[begin, end)` as an outstanding gap. Callers only ever add ranges that are
    ///  disjoint from the existing ones (a gap is added exactly once, when it is first
    ///  detected); empty ranges are ignored.
    pub fn add_range(&mut self, begin: PacketId, end: PacketId) {
        if begin == end {
            return;
        }
        trace!("tracking missing id range [{}, {})", begin, end);
        self.ranges.insert(begin, end);
    }

    /// Removes `id` from whichever outstanding range contains it, splitting the range in two
    ///  if `id` is strictly interior. Returns `true` iff `id` was found in some range.
    pub fn cancel(&mut self, id: PacketId) -> bool {
        // ranges can straddle the wrap point, so membership is circular and the lookup walks
        // the (few) entries instead of relying on key order
        let found = self
            .ranges
            .iter()
            .find(|(&begin, &end)| id.offset_from(begin) < end.offset_from(begin))
            .map(|(&begin, &end)| (begin, end));

        let Some((begin, end)) = found else {
            return false;
        };

        self.ranges.remove(&begin);
        if id != begin {
            self.ranges.insert(begin, id);
        }
        if id.next() != end {
            self.ranges.insert(id.next(), end);
        }
        true
    }

    pub fn cancel_all(&mut self) {
        self.ranges.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Emits one NACK packet per outstanding range.
    pub fn snapshot(&self) -> Vec<Packet> {
        self.ranges
            .iter()
            .map(|(&begin, &end)| Packet::nack(begin, end))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn id(raw: u32) -> PacketId {
        PacketId::from_raw(raw)
    }

    fn tracker_with(ranges: &[(u32, u32)]) -> NackTracker {
        let mut tracker = NackTracker::new();
        for &(begin, end) in ranges {
            tracker.add_range(id(begin), id(end));
        }
        tracker
    }

    #[rstest]
    #[case::interior(5, vec![(4, 5), (6, 9)])]
    #[case::begin_edge(4, vec![(5, 9)])]
    #[case::end_edge(8, vec![(4, 8)])]
    fn test_cancel_splits_range(#[case] canceled: u32, #[case] expected: Vec<(u32, u32)>) {
        let mut tracker = tracker_with(&[(4, 9)]);

        assert!(tracker.cancel(id(canceled)));

        let expected = expected
            .into_iter()
            .map(|(b, e)| Packet::nack(id(b), id(e)))
            .collect::<Vec<_>>();
        assert_eq!(tracker.snapshot(), expected);
    }

    #[test]
    fn test_cancel_drops_single_id_range() {
        let mut tracker = tracker_with(&[(4, 5)]);

        assert!(tracker.cancel(id(4)));

        assert!(tracker.is_empty());
        assert_eq!(tracker.snapshot(), vec![]);
    }

    #[rstest]
    #[case::below(3)]
    #[case::at_end(9)]
    #[case::unrelated(100)]
    fn test_cancel_misses(#[case] canceled: u32) {
        let mut tracker = tracker_with(&[(4, 9)]);

        assert!(!tracker.cancel(id(canceled)));

        assert_eq!(tracker.snapshot(), vec![Packet::nack(id(4), id(9))]);
    }

    #[test]
    fn test_cancel_in_range_across_wrap() {
        let mut tracker = tracker_with(&[(0xffff_ffff, 5)]);

        assert!(tracker.cancel(id(2)));

        assert_eq!(
            tracker.snapshot(),
            vec![Packet::nack(id(3), id(5)), Packet::nack(id(0xffff_ffff), id(2))]
        );
    }

    #[test]
    fn test_cancel_all() {
        let mut tracker = tracker_with(&[(1, 2), (4, 9)]);

        tracker.cancel_all();

        assert!(tracker.is_empty());
        assert_eq!(tracker.snapshot(), vec![]);
    }

    #[test]
    fn test_snapshot_emits_one_nack_per_range() {
        let tracker = tracker_with(&[(1, 2), (4, 9)]);

        let nacks = tracker.snapshot();

        assert_eq!(nacks, vec![Packet::nack(id(1), id(2)), Packet::nack(id(4), id(9))]);
        assert_eq!(nacks[0].id, id(1));
        assert_eq!(nacks[1].id, id(4));
    }

    #[test]
    fn test_empty_range_is_ignored() {
        let mut tracker = NackTracker::new();
        tracker.add_range(id(7), id(7));
        assert!(tracker.is_empty());
    }
}
