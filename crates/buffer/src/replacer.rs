//! The LRU replacer: tracks which unpinned frames are eligible for
//! eviction and in what order (spec.md §4.2's "LRU replacer contract").
//!
//! A frame is a member of the replacer iff its pin count is zero; the
//! buffer pool is responsible for keeping that invariant by calling
//! [`LruReplacer::pin`]/[`LruReplacer::unpin`] exactly when a frame's pin
//! count transitions to/from zero. Internally this is an intrusive
//! doubly linked list over frame indices (`prev`/`next` arrays sized to
//! the pool's frame count) so `victim`/`pin`/`unpin` are all O(1), per
//! spec.md §4.2.

#[derive(Debug)]
pub struct LruReplacer {
    prev: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
    in_replacer: Vec<bool>,
    /// Most-recently-unpinned end.
    head: Option<usize>,
    /// Least-recently-unpinned end; `victim` evicts from here.
    tail: Option<usize>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            prev: vec![None; capacity],
            next: vec![None; capacity],
            in_replacer: vec![false; capacity],
            head: None,
            tail: None,
        }
    }

    pub fn contains(&self, frame_id: usize) -> bool {
        self.in_replacer[frame_id]
    }

    /// A frame's pin count reached zero: it becomes eligible for
    /// eviction, most-recently-used.
    pub fn unpin(&mut self, frame_id: usize) {
        if self.in_replacer[frame_id] {
            return;
        }
        self.in_replacer[frame_id] = true;
        self.prev[frame_id] = None;
        self.next[frame_id] = self.head;
        if let Some(h) = self.head {
            self.prev[h] = Some(frame_id);
        }
        self.head = Some(frame_id);
        if self.tail.is_none() {
            self.tail = Some(frame_id);
        }
    }

    /// A frame was fetched (pinned): remove it from eviction candidacy.
    /// No-op if the frame isn't currently a member.
    pub fn pin(&mut self, frame_id: usize) {
        if !self.in_replacer[frame_id] {
            return;
        }
        self.in_replacer[frame_id] = false;
        let p = self.prev[frame_id];
        let n = self.next[frame_id];
        match p {
            Some(pi) => self.next[pi] = n,
            None => self.head = n,
        }
        match n {
            Some(ni) => self.prev[ni] = p,
            None => self.tail = p,
        }
        self.prev[frame_id] = None;
        self.next[frame_id] = None;
    }

    /// Evict and return the least-recently-unpinned frame, if any.
    pub fn victim(&mut self) -> Option<usize> {
        let t = self.tail?;
        self.pin(t);
        Some(t)
    }

    pub fn len(&self) -> usize {
        self.in_replacer.iter().filter(|&&b| b).count()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn victim_is_least_recently_unpinned() {
        let mut r = LruReplacer::new(4);
        r.unpin(0);
        r.unpin(1);
        r.unpin(2);
        assert_eq!(r.victim(), Some(0));
        assert_eq!(r.victim(), Some(1));
        assert_eq!(r.victim(), Some(2));
        assert_eq!(r.victim(), None);
    }

    #[test]
    fn pin_removes_from_middle() {
        let mut r = LruReplacer::new(4);
        r.unpin(0);
        r.unpin(1);
        r.unpin(2);
        r.pin(1);
        assert_eq!(r.victim(), Some(0));
        assert_eq!(r.victim(), Some(2));
        assert_eq!(r.victim(), None);
    }

    #[test]
    fn re_unpin_after_pin_moves_to_most_recent() {
        let mut r = LruReplacer::new(4);
        r.unpin(0);
        r.unpin(1);
        r.pin(0);
        r.unpin(0);
        assert_eq!(r.victim(), Some(1));
        assert_eq!(r.victim(), Some(0));
    }

    #[test]
    fn double_unpin_is_idempotent() {
        let mut r = LruReplacer::new(2);
        r.unpin(0);
        r.unpin(0);
        assert_eq!(r.len(), 1);
    }
}
