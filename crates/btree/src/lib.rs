//! The disk-resident B+Tree index (spec.md §4.4): point lookup, range
//! scan via linked leaves, insertion with leaf copy-up / internal
//! push-up splits and parent propagation, and deletion with
//! redistribute-before-coalesce and parent separator fix-up.
//!
//! Every node is one page fetched through [`buffer::BufferPool`] — the
//! same pool `heap`/`catalog` share, not a second cache (spec.md §5).
//! Mutations pin pages along their root-to-leaf path and unpin them
//! (dirty if modified) before returning, including on error, by virtue
//! of never holding more than the current node's frame borrowed across
//! a recursive call: each level decodes what it needs into an owned
//! `Vec`, unpins, recurses, then re-fetches to write back — the same
//! "copy bytes out, mutate, unpin" discipline [`heap::TableHeap`] uses.

mod node;


use buffer::BufferPool;
use common::{DbError, DbResult, PageId, RowId};
use node::IndexPageView;
use types::{cmp_keys, SqlType, Value};

/// A disk-resident B+Tree keyed by a tuple of column values (spec.md §3's
/// "Index" model), mapping to `RowId`.
pub struct BTreeIndex {
    root: PageId,
    key_types: Vec<SqlType>,
    unique: bool,
}

/// Result of a split propagating up to the caller: the separator key and
/// the new right sibling's page id.
struct Split {
    sep_key: Vec<Value>,
    new_page: PageId,
}

/// Result of a delete propagating up to the caller.
struct DeleteOutcome {
    /// Whether this subtree now holds fewer than the minimum occupancy
    /// and its parent must redistribute or coalesce it (spec.md §4.4
    /// steps 3-5). Always `false` when the subtree is the tree root.
    underflow: bool,
}

impl BTreeIndex {
    /// Allocate a fresh empty leaf as the root of a brand new index.
    pub fn create(pool: &mut BufferPool, key_types: Vec<SqlType>, unique: bool) -> DbResult<Self> {
        let (root, buf) = pool.new_page()?;
        IndexPageView::init_leaf(buf, root);
        pool.unpin(root, true)?;
        Ok(Self { root, key_types, unique })
    }

    /// Resume operating on an existing index whose root page is already
    /// on disk (engine reopen), per the root pointer persisted in the
    /// catalog's index record.
    pub fn open(root: PageId, key_types: Vec<SqlType>, unique: bool) -> Self {
        Self { root, key_types, unique }
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    /// Free every page belonging to this index — root and every
    /// descendant. Used when the index or its owning table is dropped.
    pub fn drop_all(&self, pool: &mut BufferPool) -> DbResult<()> {
        self.drop_subtree(pool, self.root)
    }

    fn drop_subtree(&self, pool: &mut BufferPool, page_id: PageId) -> DbResult<()> {
        let buf = pool.fetch(page_id)?;
        let view = IndexPageView::new(buf);
        let children = if view.is_leaf() { Vec::new() } else { view.children() };
        pool.unpin(page_id, false)?;
        for child in children {
            self.drop_subtree(pool, child)?;
        }
        pool.delete_page(page_id)
    }

    fn max_leaf(&self, pool: &BufferPool) -> usize {
        IndexPageView::max_leaf_entries(pool.page_size(), &self.key_types).max(2)
    }

    fn max_internal(&self, pool: &BufferPool) -> usize {
        IndexPageView::max_internal_keys(pool.page_size(), &self.key_types).max(2)
    }

    fn min_leaf(&self, pool: &BufferPool) -> usize {
        self.max_leaf(pool).div_ceil(2).saturating_sub(1)
    }

    fn min_internal(&self, pool: &BufferPool) -> usize {
        self.max_internal(pool).div_ceil(2).saturating_sub(1)
    }

    /// Descend from `page_id` to the leaf that would hold `key`,
    /// following spec.md §4.4's "on exact-match in an internal node,
    /// descend the right child" tie-break.
    fn find_leaf(&self, pool: &mut BufferPool, mut page_id: PageId, key: &[Value]) -> DbResult<PageId> {
        loop {
            let buf = pool.fetch(page_id)?;
            let view = IndexPageView::new(buf);
            if view.is_leaf() {
                pool.unpin(page_id, false)?;
                return Ok(page_id);
            }
            let keys = view.internal_keys(&self.key_types)?;
            let idx = keys.partition_point(|k| cmp_keys(k, key) != std::cmp::Ordering::Greater);
            let child = view.child_at(idx as u16);
            pool.unpin(page_id, false)?;
            page_id = child;
        }
    }

    /// Point lookup: every `RowId` stored under `key` (more than one only
    /// for a non-unique index).
    pub fn lookup(&self, pool: &mut BufferPool, key: &[Value]) -> DbResult<Vec<RowId>> {
        let leaf_id = self.find_leaf(pool, self.root, key)?;
        let buf = pool.fetch(leaf_id)?;
        let view = IndexPageView::new(buf);
        let entries = view.leaf_entries(&self.key_types)?;
        pool.unpin(leaf_id, false)?;
        Ok(entries
            .into_iter()
            .filter(|(k, _)| cmp_keys(k, key) == std::cmp::Ordering::Equal)
            .map(|(_, rid)| rid)
            .collect())
    }

    /// Range scan `[lo, hi]` (bounds optional, inclusivity per flag),
    /// walking the leaf chain left to right (spec.md §4.4).
    pub fn range(
        &self,
        pool: &mut BufferPool,
        lo: Option<&[Value]>,
        hi: Option<&[Value]>,
        lo_inclusive: bool,
        hi_inclusive: bool,
    ) -> DbResult<Vec<RowId>> {
        let start_leaf = match lo {
            Some(k) => self.find_leaf(pool, self.root, k)?,
            None => self.leftmost_leaf(pool)?,
        };
        let mut results = Vec::new();
        let mut current = Some(start_leaf);
        'outer: while let Some(page_id) = current {
            let buf = pool.fetch(page_id)?;
            let view = IndexPageView::new(buf);
            let entries = view.leaf_entries(&self.key_types)?;
            let next = view.next_leaf();
            pool.unpin(page_id, false)?;
            for (k, rid) in entries {
                if let Some(lo) = lo {
                    let ord = cmp_keys(&k, lo);
                    if ord == std::cmp::Ordering::Less
                        || (ord == std::cmp::Ordering::Equal && !lo_inclusive)
                    {
                        continue;
                    }
                }
                if let Some(hi) = hi {
                    let ord = cmp_keys(&k, hi);
                    if ord == std::cmp::Ordering::Greater
                        || (ord == std::cmp::Ordering::Equal && !hi_inclusive)
                    {
                        break 'outer;
                    }
                }
                results.push(rid);
            }
            current = next;
        }
        Ok(results)
    }

    fn leftmost_leaf(&self, pool: &mut BufferPool) -> DbResult<PageId> {
        let mut page_id = self.root;
        loop {
            let buf = pool.fetch(page_id)?;
            let view = IndexPageView::new(buf);
            if view.is_leaf() {
                pool.unpin(page_id, false)?;
                return Ok(page_id);
            }
            let child = view.child_at(0);
            pool.unpin(page_id, false)?;
            page_id = child;
        }
    }

    /// Every `(key, RowId)` in ascending key order (used by tests and
    /// by consistency checks, spec.md §8 property 4).
    pub fn scan_all(&self, pool: &mut BufferPool) -> DbResult<Vec<(Vec<Value>, RowId)>> {
        let mut out = Vec::new();
        let mut current = Some(self.leftmost_leaf(pool)?);
        while let Some(page_id) = current {
            let buf = pool.fetch(page_id)?;
            let view = IndexPageView::new(buf);
            out.extend(view.leaf_entries(&self.key_types)?);
            let next = view.next_leaf();
            pool.unpin(page_id, false)?;
            current = next;
        }
        Ok(out)
    }

    /// Insert `(key, rid)`. `DuplicateKey` (tree left unmodified) if this
    /// is a unique index and `key` is already present (spec.md §4.4).
    pub fn insert(&mut self, pool: &mut BufferPool, key: Vec<Value>, rid: RowId) -> DbResult<()> {
        if let Some(split) = self.insert_recursive(pool, self.root, &key, rid)? {
            let (new_root, buf) = pool.new_page()?;
            IndexPageView::init_internal(buf, new_root);
            IndexPageView::new(buf).set_internal(
                &[split.sep_key],
                &[self.root, split.new_page],
                &self.key_types,
            );
            pool.unpin(new_root, true)?;
            self.root = new_root;
        }
        Ok(())
    }

    fn insert_recursive(
        &mut self,
        pool: &mut BufferPool,
        page_id: PageId,
        key: &[Value],
        rid: RowId,
    ) -> DbResult<Option<Split>> {
        let buf = pool.fetch(page_id)?;
        let view = IndexPageView::new(buf);
        let is_leaf = view.is_leaf();

        if is_leaf {
            let mut entries = view.leaf_entries(&self.key_types)?;
            pool.unpin(page_id, false)?;

            let idx = entries.partition_point(|(k, _)| cmp_keys(k, key) != std::cmp::Ordering::Greater);
            if self.unique && idx > 0 && cmp_keys(&entries[idx - 1].0, key) == std::cmp::Ordering::Equal {
                return Err(DbError::DuplicateKey);
            }
            entries.insert(idx, (key.to_vec(), rid));

            if entries.len() <= self.max_leaf(pool) {
                let buf = pool.fetch(page_id)?;
                IndexPageView::new(buf).set_leaf_entries(&entries, &self.key_types);
                pool.unpin(page_id, true)?;
                return Ok(None);
            }

            // Leaf split: copy-up (spec.md §4.4 step 3).
            let mid = entries.len() / 2;
            let right_entries: Vec<_> = entries.split_off(mid);
            let sep_key = right_entries[0].0.clone();

            let buf = pool.fetch(page_id)?;
            let old_next = IndexPageView::new(buf).next_leaf();
            pool.unpin(page_id, false)?;
            let (right_id, rbuf) = pool.new_page()?;
            IndexPageView::init_leaf(rbuf, right_id);
            IndexPageView::new(rbuf).set_leaf_entries(&right_entries, &self.key_types);
            IndexPageView::new(rbuf).set_next_leaf(old_next);
            IndexPageView::new(rbuf).set_prev_leaf(Some(page_id));
            pool.unpin(right_id, true)?;

            if let Some(next) = old_next {
                let nbuf = pool.fetch(next)?;
                IndexPageView::new(nbuf).set_prev_leaf(Some(right_id));
                pool.unpin(next, true)?;
            }

            let buf = pool.fetch(page_id)?;
            let mut lview = IndexPageView::new(buf);
            lview.set_leaf_entries(&entries, &self.key_types);
            lview.set_next_leaf(Some(right_id));
            pool.unpin(page_id, true)?;

            return Ok(Some(Split { sep_key, new_page: right_id }));
        }

        let mut keys = view.internal_keys(&self.key_types)?;
        let mut children = view.children();
        pool.unpin(page_id, false)?;

        let idx = keys.partition_point(|k| cmp_keys(k, key) != std::cmp::Ordering::Greater);
        let child_split = self.insert_recursive(pool, children[idx], key, rid)?;

        let Some(split) = child_split else { return Ok(None) };
        keys.insert(idx, split.sep_key);
        children.insert(idx + 1, split.new_page);

        if keys.len() <= self.max_internal(pool) {
            let buf = pool.fetch(page_id)?;
            IndexPageView::new(buf).set_internal(&keys, &children, &self.key_types);
            pool.unpin(page_id, true)?;
            return Ok(None);
        }

        // Internal split: push-up (spec.md §4.4 step 4) — the median key
        // moves to the parent rather than being duplicated into both
        // halves.
        let mid = keys.len() / 2;
        let sep_key = keys[mid].clone();
        let right_keys = keys.split_off(mid + 1);
        keys.pop(); // drop the median, now `sep_key`, from the left half
        let right_children = children.split_off(mid + 1);

        let buf = pool.fetch(page_id)?;
        IndexPageView::new(buf).set_internal(&keys, &children, &self.key_types);
        pool.unpin(page_id, true)?;

        let (right_id, rbuf) = pool.new_page()?;
        IndexPageView::init_internal(rbuf, right_id);
        IndexPageView::new(rbuf).set_internal(&right_keys, &right_children, &self.key_types);
        pool.unpin(right_id, true)?;

        Ok(Some(Split { sep_key, new_page: right_id }))
    }

    /// Remove the entry matching both `key` and `rid`. `NotFound` if no
    /// such entry exists (spec.md §4.4).
    pub fn remove(&mut self, pool: &mut BufferPool, key: &[Value], rid: RowId) -> DbResult<()> {
        let removed = self.delete_recursive(pool, self.root, true, key, rid)?;
        if !removed.0 {
            return Err(DbError::NotFound);
        }

        // Root collapse: an internal root left with one child becomes
        // that child (spec.md §4.4 step 5).
        let buf = pool.fetch(self.root)?;
        let view = IndexPageView::new(buf);
        if !view.is_leaf() && view.count() == 0 {
            let sole_child = view.child_at(0);
            pool.unpin(self.root, false)?;
            pool.delete_page(self.root)?;
            self.root = sole_child;
        } else {
            pool.unpin(self.root, false)?;
        }
        Ok(())
    }

    /// Returns `(found, outcome)`; `found` is whether an entry was
    /// actually removed anywhere in the subtree.
    fn delete_recursive(
        &mut self,
        pool: &mut BufferPool,
        page_id: PageId,
        is_root: bool,
        key: &[Value],
        rid: RowId,
    ) -> DbResult<(bool, DeleteOutcome)> {
        let buf = pool.fetch(page_id)?;
        let view = IndexPageView::new(buf);

        if view.is_leaf() {
            let mut entries = view.leaf_entries(&self.key_types)?;
            pool.unpin(page_id, false)?;

            let before = entries.len();
            entries.retain(|(k, r)| !(cmp_keys(k, key) == std::cmp::Ordering::Equal && *r == rid));
            let found = entries.len() < before;

            let buf = pool.fetch(page_id)?;
            IndexPageView::new(buf).set_leaf_entries(&entries, &self.key_types);
            pool.unpin(page_id, found)?;

            let underflow = found && !is_root && entries.len() < self.min_leaf(pool);
            return Ok((found, DeleteOutcome { underflow }));
        }

        let mut keys = view.internal_keys(&self.key_types)?;
        let mut children = view.children();
        pool.unpin(page_id, false)?;

        let idx = keys.partition_point(|k| cmp_keys(k, key) != std::cmp::Ordering::Greater);
        let (found, child_outcome) =
            self.delete_recursive(pool, children[idx], false, key, rid)?;

        if !found {
            return Ok((false, DeleteOutcome { underflow: false }));
        }

        if child_outcome.underflow {
            self.fix_child_underflow(pool, &mut keys, &mut children, idx)?;
        }

        let buf = pool.fetch(page_id)?;
        IndexPageView::new(buf).set_internal(&keys, &children, &self.key_types);
        pool.unpin(page_id, true)?;

        let underflow = !is_root && keys.len() < self.min_internal(pool);
        Ok((true, DeleteOutcome { underflow }))
    }

    /// Redistribute or coalesce the child at `idx` with a sibling,
    /// mutating `keys`/`children` (the parent's own arrays) in place
    /// (spec.md §4.4 steps 3-4: "redistribute is chosen over coalesce
    /// when a sibling has > minimum occupancy... when both siblings
    /// exist, redistribute prefers the one with more slack; coalesce
    /// prefers the left").
    fn fix_child_underflow(
        &mut self,
        pool: &mut BufferPool,
        keys: &mut Vec<Vec<Value>>,
        children: &mut Vec<PageId>,
        idx: usize,
    ) -> DbResult<()> {
        let child_id = children[idx];
        let child_buf = pool.fetch(child_id)?;
        let child_is_leaf = IndexPageView::new(child_buf).is_leaf();
        pool.unpin(child_id, false)?;

        let left_id = (idx > 0).then(|| children[idx - 1]);
        let right_id = (idx + 1 < children.len()).then(|| children[idx + 1]);

        let left_slack = match left_id {
            Some(id) => self.slack(pool, id, child_is_leaf)?,
            None => None,
        };
        let right_slack = match right_id {
            Some(id) => self.slack(pool, id, child_is_leaf)?,
            None => None,
        };

        if left_slack.unwrap_or(0) > 0 && left_slack.unwrap_or(0) >= right_slack.unwrap_or(0) {
            if child_is_leaf {
                self.redistribute_leaf_from_left(pool, keys, children, idx)
            } else {
                self.redistribute_internal_from_left(pool, keys, children, idx)
            }
        } else if right_slack.unwrap_or(0) > 0 {
            if child_is_leaf {
                self.redistribute_leaf_from_right(pool, keys, children, idx)
            } else {
                self.redistribute_internal_from_right(pool, keys, children, idx)
            }
        } else if left_id.is_some() {
            if child_is_leaf {
                self.coalesce_leaf_with_left(pool, keys, children, idx)
            } else {
                self.coalesce_internal_with_left(pool, keys, children, idx)
            }
        } else {
            if child_is_leaf {
                self.coalesce_leaf_with_right(pool, keys, children, idx)
            } else {
                self.coalesce_internal_with_right(pool, keys, children, idx)
            }
        }
    }

    /// Entries/keys a sibling could lend without itself underflowing, or
    /// `None` if there is no such sibling.
    fn slack(&self, pool: &mut BufferPool, id: PageId, is_leaf: bool) -> DbResult<Option<usize>> {
        let buf = pool.fetch(id)?;
        let count = IndexPageView::new(buf).count() as usize;
        pool.unpin(id, false)?;
        let min = if is_leaf { self.min_leaf(pool) } else { self.min_internal(pool) };
        Ok(Some(count.saturating_sub(min)))
    }

    fn redistribute_leaf_from_left(
        &mut self,
        pool: &mut BufferPool,
        keys: &mut [Vec<Value>],
        children: &[PageId],
        idx: usize,
    ) -> DbResult<()> {
        let left_id = children[idx - 1];
        let cur_id = children[idx];

        let buf = pool.fetch(left_id)?;
        let mut left_entries = IndexPageView::new(buf).leaf_entries(&self.key_types)?;
        pool.unpin(left_id, false)?;
        let borrowed = left_entries.pop().expect("left sibling has slack");

        let buf = pool.fetch(left_id)?;
        IndexPageView::new(buf).set_leaf_entries(&left_entries, &self.key_types);
        pool.unpin(left_id, true)?;

        let buf = pool.fetch(cur_id)?;
        let mut cur_entries = IndexPageView::new(buf).leaf_entries(&self.key_types)?;
        pool.unpin(cur_id, false)?;
        cur_entries.insert(0, borrowed.clone());

        let buf = pool.fetch(cur_id)?;
        IndexPageView::new(buf).set_leaf_entries(&cur_entries, &self.key_types);
        pool.unpin(cur_id, true)?;

        keys[idx - 1] = borrowed.0;
        Ok(())
    }

    fn redistribute_leaf_from_right(
        &mut self,
        pool: &mut BufferPool,
        keys: &mut [Vec<Value>],
        children: &[PageId],
        idx: usize,
    ) -> DbResult<()> {
        let right_id = children[idx + 1];
        let cur_id = children[idx];

        let buf = pool.fetch(right_id)?;
        let mut right_entries = IndexPageView::new(buf).leaf_entries(&self.key_types)?;
        pool.unpin(right_id, false)?;
        let borrowed = right_entries.remove(0);

        let buf = pool.fetch(right_id)?;
        IndexPageView::new(buf).set_leaf_entries(&right_entries, &self.key_types);
        pool.unpin(right_id, true)?;

        let buf = pool.fetch(cur_id)?;
        let mut cur_entries = IndexPageView::new(buf).leaf_entries(&self.key_types)?;
        pool.unpin(cur_id, false)?;
        cur_entries.push(borrowed);

        let buf = pool.fetch(cur_id)?;
        IndexPageView::new(buf).set_leaf_entries(&cur_entries, &self.key_types);
        pool.unpin(cur_id, true)?;

        keys[idx] = right_entries_first_key(&right_entries);
        Ok(())
    }

    fn coalesce_leaf_with_left(
        &mut self,
        pool: &mut BufferPool,
        keys: &mut Vec<Vec<Value>>,
        children: &mut Vec<PageId>,
        idx: usize,
    ) -> DbResult<()> {
        let left_id = children[idx - 1];
        let cur_id = children[idx];

        let buf = pool.fetch(cur_id)?;
        let cur_view = IndexPageView::new(buf);
        let cur_entries = cur_view.leaf_entries(&self.key_types)?;
        let cur_next = cur_view.next_leaf();
        pool.unpin(cur_id, false)?;

        let buf = pool.fetch(left_id)?;
        let mut left_entries = IndexPageView::new(buf).leaf_entries(&self.key_types)?;
        pool.unpin(left_id, false)?;
        left_entries.extend(cur_entries);

        let buf = pool.fetch(left_id)?;
        let mut lview = IndexPageView::new(buf);
        lview.set_leaf_entries(&left_entries, &self.key_types);
        lview.set_next_leaf(cur_next);
        pool.unpin(left_id, true)?;

        if let Some(next) = cur_next {
            let buf = pool.fetch(next)?;
            IndexPageView::new(buf).set_prev_leaf(Some(left_id));
            pool.unpin(next, true)?;
        }

        pool.delete_page(cur_id)?;
        keys.remove(idx - 1);
        children.remove(idx);
        Ok(())
    }

    fn coalesce_leaf_with_right(
        &mut self,
        pool: &mut BufferPool,
        keys: &mut Vec<Vec<Value>>,
        children: &mut Vec<PageId>,
        idx: usize,
    ) -> DbResult<()> {
        let cur_id = children[idx];
        let right_id = children[idx + 1];

        let buf = pool.fetch(right_id)?;
        let right_view = IndexPageView::new(buf);
        let right_entries = right_view.leaf_entries(&self.key_types)?;
        let right_next = right_view.next_leaf();
        pool.unpin(right_id, false)?;

        let buf = pool.fetch(cur_id)?;
        let mut cur_entries = IndexPageView::new(buf).leaf_entries(&self.key_types)?;
        pool.unpin(cur_id, false)?;
        cur_entries.extend(right_entries);

        let buf = pool.fetch(cur_id)?;
        let mut cview = IndexPageView::new(buf);
        cview.set_leaf_entries(&cur_entries, &self.key_types);
        cview.set_next_leaf(right_next);
        pool.unpin(cur_id, true)?;

        if let Some(next) = right_next {
            let buf = pool.fetch(next)?;
            IndexPageView::new(buf).set_prev_leaf(Some(cur_id));
            pool.unpin(next, true)?;
        }

        pool.delete_page(right_id)?;
        keys.remove(idx);
        children.remove(idx + 1);
        Ok(())
    }

    fn redistribute_internal_from_left(
        &mut self,
        pool: &mut BufferPool,
        keys: &mut [Vec<Value>],
        children: &mut [PageId],
        idx: usize,
    ) -> DbResult<()> {
        let left_id = children[idx - 1];
        let cur_id = children[idx];

        let buf = pool.fetch(left_id)?;
        let lview = IndexPageView::new(buf);
        let mut left_keys = lview.internal_keys(&self.key_types)?;
        let mut left_children = lview.children();
        pool.unpin(left_id, false)?;
        let borrowed_child = left_children.pop().expect("left sibling has slack");
        let pulled_key = left_keys.pop().expect("left sibling has slack");

        let buf = pool.fetch(left_id)?;
        IndexPageView::new(buf).set_internal(&left_keys, &left_children, &self.key_types);
        pool.unpin(left_id, true)?;

        let buf = pool.fetch(cur_id)?;
        let cview = IndexPageView::new(buf);
        let mut cur_keys = cview.internal_keys(&self.key_types)?;
        let mut cur_children = cview.children();
        pool.unpin(cur_id, false)?;
        cur_keys.insert(0, keys[idx - 1].clone());
        cur_children.insert(0, borrowed_child);

        let buf = pool.fetch(cur_id)?;
        IndexPageView::new(buf).set_internal(&cur_keys, &cur_children, &self.key_types);
        pool.unpin(cur_id, true)?;

        keys[idx - 1] = pulled_key;
        Ok(())
    }

    fn redistribute_internal_from_right(
        &mut self,
        pool: &mut BufferPool,
        keys: &mut [Vec<Value>],
        children: &mut [PageId],
        idx: usize,
    ) -> DbResult<()> {
        let right_id = children[idx + 1];
        let cur_id = children[idx];

        let buf = pool.fetch(right_id)?;
        let rview = IndexPageView::new(buf);
        let mut right_keys = rview.internal_keys(&self.key_types)?;
        let mut right_children = rview.children();
        pool.unpin(right_id, false)?;
        let borrowed_child = right_children.remove(0);
        let pulled_key = right_keys.remove(0);

        let buf = pool.fetch(right_id)?;
        IndexPageView::new(buf).set_internal(&right_keys, &right_children, &self.key_types);
        pool.unpin(right_id, true)?;

        let buf = pool.fetch(cur_id)?;
        let cview = IndexPageView::new(buf);
        let mut cur_keys = cview.internal_keys(&self.key_types)?;
        let mut cur_children = cview.children();
        pool.unpin(cur_id, false)?;
        cur_keys.push(keys[idx].clone());
        cur_children.push(borrowed_child);

        let buf = pool.fetch(cur_id)?;
        IndexPageView::new(buf).set_internal(&cur_keys, &cur_children, &self.key_types);
        pool.unpin(cur_id, true)?;

        keys[idx] = pulled_key;
        Ok(())
    }

    fn coalesce_internal_with_left(
        &mut self,
        pool: &mut BufferPool,
        keys: &mut Vec<Vec<Value>>,
        children: &mut Vec<PageId>,
        idx: usize,
    ) -> DbResult<()> {
        let left_id = children[idx - 1];
        let cur_id = children[idx];

        let buf = pool.fetch(cur_id)?;
        let cview = IndexPageView::new(buf);
        let cur_keys = cview.internal_keys(&self.key_types)?;
        let cur_children = cview.children();
        pool.unpin(cur_id, false)?;

        let buf = pool.fetch(left_id)?;
        let lview = IndexPageView::new(buf);
        let mut left_keys = lview.internal_keys(&self.key_types)?;
        let mut left_children = lview.children();
        pool.unpin(left_id, false)?;

        left_keys.push(keys[idx - 1].clone());
        left_keys.extend(cur_keys);
        left_children.extend(cur_children);

        let buf = pool.fetch(left_id)?;
        IndexPageView::new(buf).set_internal(&left_keys, &left_children, &self.key_types);
        pool.unpin(left_id, true)?;

        pool.delete_page(cur_id)?;
        keys.remove(idx - 1);
        children.remove(idx);
        Ok(())
    }

    fn coalesce_internal_with_right(
        &mut self,
        pool: &mut BufferPool,
        keys: &mut Vec<Vec<Value>>,
        children: &mut Vec<PageId>,
        idx: usize,
    ) -> DbResult<()> {
        let cur_id = children[idx];
        let right_id = children[idx + 1];

        let buf = pool.fetch(right_id)?;
        let rview = IndexPageView::new(buf);
        let right_keys = rview.internal_keys(&self.key_types)?;
        let right_children = rview.children();
        pool.unpin(right_id, false)?;

        let buf = pool.fetch(cur_id)?;
        let cview = IndexPageView::new(buf);
        let mut merged_keys = cview.internal_keys(&self.key_types)?;
        let mut merged_children = cview.children();
        pool.unpin(cur_id, false)?;

        merged_keys.push(keys[idx].clone());
        merged_keys.extend(right_keys);
        merged_children.extend(right_children);

        let buf = pool.fetch(cur_id)?;
        IndexPageView::new(buf).set_internal(&merged_keys, &merged_children, &self.key_types);
        pool.unpin(cur_id, true)?;

        pool.delete_page(right_id)?;
        keys.remove(idx);
        children.remove(idx + 1);
        Ok(())
    }
}

fn right_entries_first_key(entries: &[(Vec<Value>, RowId)]) -> Vec<Value> {
    entries
        .first()
        .map(|(k, _)| k.clone())
        .expect("right sibling kept at least one entry after lending")
}
