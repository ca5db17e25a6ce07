//! Channel identifier allocation.

use std::collections::{BTreeSet, HashSet};

use super::error::ConnectionError;

/// Hands out channel ids in `1..=max_id`, reusing the smallest freed id
/// before growing.
#[derive(Debug)]
pub struct ChannelIds {
    max_id: u16,
    next_free: u32,
    occupied: HashSet<u16>,
    freed: BTreeSet<u16>,
}

impl ChannelIds {
    /// Allocator bounded by the negotiated `channel_max`; 0 means 65535.
    #[must_use]
    pub fn new(channel_max: u16) -> Self {
        Self {
            max_id: if channel_max == 0 { u16::MAX } else { channel_max },
            next_free: 1,
            occupied: HashSet::new(),
            freed: BTreeSet::new(),
        }
    }

    /// Highest id this allocator will issue.
    #[must_use]
    pub fn max_id(&self) -> u16 { self.max_id }

    /// Number of ids currently issued.
    #[must_use]
    pub fn len(&self) -> usize { self.occupied.len() }

    /// Whether no id is issued.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.occupied.is_empty() }

    /// Issue the next id.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::MaxChannelsLimitReached`] when every id up
    /// to `max_id` is in use.
    pub fn next(&mut self) -> Result<u16, ConnectionError> {
        let id = match self.freed.pop_first() {
            Some(id) => id,
            None => {
                let id = u16::try_from(self.next_free)
                    .ok()
                    .filter(|id| *id <= self.max_id)
                    .ok_or(ConnectionError::MaxChannelsLimitReached)?;
                self.next_free += 1;
                id
            }
        };
        self.occupied.insert(id);
        Ok(id)
    }

    /// Reclaim `id`. Ids that are not issued are ignored.
    pub fn remove(&mut self, id: u16) {
        if !self.occupied.remove(&id) {
            return;
        }
        if u32::from(id) + 1 == self.next_free {
            self.next_free -= 1;
            // Fold freed ids that now sit at the top back into `next_free`.
            while let Some(top) = self.freed.last().copied() {
                if u32::from(top) + 1 != self.next_free {
                    break;
                }
                self.freed.pop_last();
                self.next_free -= 1;
            }
        } else {
            self.freed.insert(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn freed_id_is_reused_before_growing() {
        let mut ids = ChannelIds::new(10);
        assert_eq!(ids.next(), Ok(1));
        assert_eq!(ids.next(), Ok(2));
        assert_eq!(ids.next(), Ok(3));
        ids.remove(2);
        assert_eq!(ids.next(), Ok(2));
        assert_eq!(ids.next(), Ok(4));
    }

    #[test]
    fn smallest_freed_id_wins() {
        let mut ids = ChannelIds::new(10);
        for _ in 0..5 {
            ids.next().expect("id available");
        }
        ids.remove(4);
        ids.remove(2);
        assert_eq!(ids.next(), Ok(2));
        assert_eq!(ids.next(), Ok(4));
        assert_eq!(ids.next(), Ok(6));
    }

    #[test]
    fn removing_the_newest_id_shrinks_the_range() {
        let mut ids = ChannelIds::new(3);
        let newest = (0..3).map(|_| ids.next().expect("id")).last();
        assert_eq!(newest, Some(3));
        ids.remove(2);
        ids.remove(3);
        assert_eq!(ids.next(), Ok(2));
        assert_eq!(ids.next(), Ok(3));
        assert_eq!(ids.next(), Err(ConnectionError::MaxChannelsLimitReached));
    }

    #[rstest]
    #[case::small(3)]
    #[case::default_limit(2047)]
    fn limit_is_inclusive(#[case] max: u16) {
        let mut ids = ChannelIds::new(max);
        for expected in 1..=max {
            assert_eq!(ids.next(), Ok(expected));
        }
        assert_eq!(ids.next(), Err(ConnectionError::MaxChannelsLimitReached));
        assert_eq!(ids.len(), usize::from(max));
    }

    #[test]
    fn zero_means_the_full_id_space() {
        let mut ids = ChannelIds::new(0);
        assert_eq!(ids.max_id(), u16::MAX);
        for _ in 0..u16::MAX {
            ids.next().expect("id available");
        }
        assert_eq!(ids.next(), Err(ConnectionError::MaxChannelsLimitReached));
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut ids = ChannelIds::new(5);
        assert_eq!(ids.next(), Ok(1));
        ids.remove(4);
        ids.remove(1);
        ids.remove(1);
        assert!(ids.is_empty());
        assert_eq!(ids.next(), Ok(1));
    }
}
