use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use teloxide::types::MediaGroupId;

const SEEN_GROUPS_CAPACITY: usize = 100;

/// Remembers which photo albums already produced a reply. Telegram delivers
/// each photo of an album as a separate message sharing one media-group id,
/// so without this guard every album would get one poem per photo.
pub struct SeenGroups {
    capacity: usize,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    order: VecDeque<MediaGroupId>,
    members: HashSet<MediaGroupId>,
}

impl SeenGroups {
    pub fn new() -> Self {
        Self::with_capacity(SEEN_GROUPS_CAPACITY)
    }

    fn with_capacity(capacity: usize) -> Self {
        SeenGroups {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Returns true when the caller should process the message. Messages
    /// without a media-group id are always admitted. The membership check
    /// and the insert happen under one lock, so concurrent events for the
    /// same album cannot both pass.
    pub fn admit(&self, group_id: Option<&MediaGroupId>) -> bool {
        let Some(group_id) = group_id else {
            return true;
        };

        let mut inner = self.inner.lock();
        if inner.members.contains(group_id) {
            return false;
        }

        inner.members.insert(group_id.clone());
        inner.order.push_back(group_id.clone());
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.members.remove(&evicted);
            }
        }
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().members.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn group(id: &str) -> MediaGroupId {
        MediaGroupId(id.to_owned())
    }

    #[test]
    fn admits_every_message_without_an_album_id() {
        let seen = SeenGroups::new();
        assert!(seen.admit(None));
        assert!(seen.admit(None));
        assert!(seen.admit(None));
        assert_eq!(seen.len(), 0);
    }

    #[test]
    fn admits_only_the_first_message_of_an_album() {
        let seen = SeenGroups::new();
        assert!(seen.admit(Some(&group("album-1"))));
        assert!(!seen.admit(Some(&group("album-1"))));
        assert!(!seen.admit(Some(&group("album-1"))));
        assert!(seen.admit(Some(&group("album-2"))));
    }

    #[test]
    fn membership_never_grows_past_capacity() {
        let seen = SeenGroups::new();
        for index in 0..250 {
            seen.admit(Some(&group(&format!("album-{index}"))));
            assert!(seen.len() <= SEEN_GROUPS_CAPACITY);
        }
        assert_eq!(seen.len(), SEEN_GROUPS_CAPACITY);
    }

    #[test]
    fn eviction_forgets_the_oldest_albums_first() {
        let seen = SeenGroups::with_capacity(3);
        assert!(seen.admit(Some(&group("a"))));
        assert!(seen.admit(Some(&group("b"))));
        assert!(seen.admit(Some(&group("c"))));

        // "d" evicts "a", the oldest entry.
        assert!(seen.admit(Some(&group("d"))));
        assert!(seen.admit(Some(&group("a"))));

        // "b" was evicted in turn; the recent entries are still known.
        assert!(seen.admit(Some(&group("b"))));
        assert!(!seen.admit(Some(&group("a"))));
        assert!(!seen.admit(Some(&group("d"))));
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn concurrent_admits_of_one_album_have_a_single_winner() {
        let seen = Arc::new(SeenGroups::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let seen = seen.clone();
                std::thread::spawn(move || seen.admit(Some(&group("race"))))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|handle| handle.join().expect("admit thread panicked"))
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 1);
    }
}
