//! Eviction Link Module
//!
//! Bookkeeping nodes for the volatile cache. Every live link participates
//! in two circular doubly-linked cycles at once: one ordered by access
//! recency (for LRU eviction) and one ordered by insertion time (for TTL
//! sweeping). A sentinel root node is permanently present in both cycles;
//! the node just after the root is the oldest in each order and new links
//! are attached just before the root.
//!
//! Links live in an arena and reference their neighbors by slot index, so
//! cycle surgery is plain index rewrites. Detached links are self-linked,
//! never dangling.

use tokio::time::Instant;

/// Arena slot of the sentinel root link.
pub(crate) const ROOT: usize = 0;

// == Eviction Link ==
/// Per-key metadata node shared by the recency and expiry cycles.
#[derive(Debug)]
pub(crate) struct EvictionLink {
    /// The key this link tracks (empty for the root)
    pub key: String,
    /// Absolute expiry instant
    pub expires_at: Instant,
    /// Declared size in bytes
    pub size: usize,
    lru_prev: usize,
    lru_next: usize,
    ttl_prev: usize,
    ttl_next: usize,
}

impl EvictionLink {
    /// True once the expiry instant has been reached.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    fn new(key: String, expires_at: Instant, size: usize, slot: usize) -> Self {
        Self {
            key,
            expires_at,
            size,
            lru_prev: slot,
            lru_next: slot,
            ttl_prev: slot,
            ttl_next: slot,
        }
    }
}

// == Link Arena ==
/// Slot storage for eviction links plus the two cycles they form.
///
/// Slot 0 always holds the root. Freed slots are recycled through a free
/// list, so a slot index stays valid for as long as its key is live.
#[derive(Debug)]
pub(crate) struct LinkArena {
    links: Vec<EvictionLink>,
    free: Vec<usize>,
    live: usize,
}

impl LinkArena {
    // == Constructor ==
    /// Creates an arena containing only the self-linked root.
    pub fn new() -> Self {
        Self {
            links: vec![EvictionLink::new(String::new(), Instant::now(), 0, ROOT)],
            free: Vec::new(),
            live: 0,
        }
    }

    /// Number of live links, excluding the root.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Borrows the link at `index`.
    pub fn get(&self, index: usize) -> &EvictionLink {
        &self.links[index]
    }

    // == Insert ==
    /// Allocates a link for `key` and attaches it at the most-recent end
    /// of both cycles. Returns the link's slot index.
    pub fn insert(&mut self, key: String, expires_at: Instant, size: usize) -> usize {
        let index = match self.free.pop() {
            Some(slot) => {
                self.links[slot] = EvictionLink::new(key, expires_at, size, slot);
                slot
            }
            None => {
                let slot = self.links.len();
                self.links.push(EvictionLink::new(key, expires_at, size, slot));
                slot
            }
        };
        self.attach_lru(index);
        self.attach_ttl(index);
        self.live += 1;
        index
    }

    // == Relink ==
    /// Detaches a live link from both cycles, updates its expiry and size,
    /// and reattaches it at the most-recent end of both cycles.
    pub fn relink(&mut self, index: usize, expires_at: Instant, size: usize) {
        debug_assert_ne!(index, ROOT, "root is never relinked");
        self.detach_lru(index);
        self.detach_ttl(index);
        let link = &mut self.links[index];
        link.expires_at = expires_at;
        link.size = size;
        self.attach_lru(index);
        self.attach_ttl(index);
    }

    // == Touch ==
    /// Moves a link to the most-recent end of the recency cycle only.
    /// Its position in the expiry cycle is untouched.
    pub fn touch_lru(&mut self, index: usize) {
        debug_assert_ne!(index, ROOT, "root is never touched");
        self.detach_lru(index);
        self.attach_lru(index);
    }

    // == Remove ==
    /// Detaches a link from both cycles and recycles its slot.
    pub fn remove(&mut self, index: usize) {
        debug_assert_ne!(index, ROOT, "root is never removed");
        self.detach_lru(index);
        self.detach_ttl(index);
        let link = &mut self.links[index];
        link.key = String::new();
        link.size = 0;
        self.free.push(index);
        self.live -= 1;
    }

    // == Oldest Lookups ==
    /// Slot of the least recently used link, or None when only the root
    /// remains.
    pub fn oldest_lru(&self) -> Option<usize> {
        let next = self.links[ROOT].lru_next;
        (next != ROOT).then_some(next)
    }

    /// Slot of the oldest link in insertion order, or None when only the
    /// root remains.
    pub fn oldest_ttl(&self) -> Option<usize> {
        let next = self.links[ROOT].ttl_next;
        (next != ROOT).then_some(next)
    }

    // == Order Walks ==
    /// Slots in insertion order, oldest first.
    pub fn ttl_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.live);
        let mut current = self.links[ROOT].ttl_next;
        while current != ROOT {
            order.push(current);
            current = self.links[current].ttl_next;
        }
        order
    }

    /// Slots in recency order, least recently used first.
    pub fn lru_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.live);
        let mut current = self.links[ROOT].lru_next;
        while current != ROOT {
            order.push(current);
            current = self.links[current].lru_next;
        }
        order
    }

    // == Clear ==
    /// Discards every live link and reinitializes the root self-cycles.
    pub fn clear(&mut self) {
        self.links.truncate(1);
        self.free.clear();
        self.live = 0;
        let root = &mut self.links[ROOT];
        root.lru_prev = ROOT;
        root.lru_next = ROOT;
        root.ttl_prev = ROOT;
        root.ttl_next = ROOT;
    }

    // == Cycle Surgery ==
    // Attach between the current most-recent link (root's prev) and the
    // root itself.
    fn attach_lru(&mut self, index: usize) {
        let prev = self.links[ROOT].lru_prev;
        self.links[index].lru_next = ROOT;
        self.links[index].lru_prev = prev;
        self.links[prev].lru_next = index;
        self.links[ROOT].lru_prev = index;
    }

    fn attach_ttl(&mut self, index: usize) {
        let prev = self.links[ROOT].ttl_prev;
        self.links[index].ttl_next = ROOT;
        self.links[index].ttl_prev = prev;
        self.links[prev].ttl_next = index;
        self.links[ROOT].ttl_prev = index;
    }

    // Detached links are left self-linked so a stale index cannot rewrite
    // a live cycle.
    fn detach_lru(&mut self, index: usize) {
        let (prev, next) = {
            let link = &self.links[index];
            (link.lru_prev, link.lru_next)
        };
        self.links[prev].lru_next = next;
        self.links[next].lru_prev = prev;
        self.links[index].lru_prev = index;
        self.links[index].lru_next = index;
    }

    fn detach_ttl(&mut self, index: usize) {
        let (prev, next) = {
            let link = &self.links[index];
            (link.ttl_prev, link.ttl_next)
        };
        self.links[prev].ttl_next = next;
        self.links[next].ttl_prev = prev;
        self.links[index].ttl_prev = index;
        self.links[index].ttl_next = index;
    }
}
