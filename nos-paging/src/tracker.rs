//! Residency tracker
//!
//! One global list of every resident user page, most recently touched at the
//! head. Nodes live in an arena and link to each other by index, so
//! relinking never allocates and a stale handle can never dangle.
//!
//! # Eviction policy
//!
//! [`evict`](ResidencyTracker::evict) takes the **most** recently touched
//! page, not the least. This is the intended policy, not an inverted LRU
//! bug: it models workloads that stream through memory once, where the
//! page just touched is the one least likely to be needed again and the
//! oldest pages are the valuable ones to keep resident.

extern crate alloc;

use alloc::vec::Vec;

use hashbrown::HashMap;
use log::trace;
use nos_api::{ProcessId, VirtAddr};

use crate::error::{SwapError, SwapResult};

/// A tracked resident page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResidentPage {
    /// Owning process
    pub pid: ProcessId,
    /// Page-aligned virtual address
    pub va: VirtAddr,
}

impl ResidentPage {
    /// Page `va` of process `pid`
    pub const fn new(pid: ProcessId, va: VirtAddr) -> Self {
        Self { pid, va }
    }
}

/// What [`ResidencyTracker::touch`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    /// The page was already tracked and moved to the head
    Promoted,
    /// The page was new and took a free slot
    Inserted,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    page: ResidentPage,
    prev: Option<usize>,
    /// Next node towards the tail, or the next vacant node when not live
    next: Option<usize>,
    live: bool,
}

/// Budget-bounded MRU list of resident pages
pub struct ResidencyTracker {
    nodes: Vec<Node>,
    free_head: Option<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    index: HashMap<ResidentPage, usize>,
    len: usize,
    budget: usize,
}

impl ResidencyTracker {
    /// Creates an empty tracker holding at most `budget` pages
    pub fn new(budget: usize) -> Self {
        Self {
            nodes: Vec::new(),
            free_head: None,
            head: None,
            tail: None,
            index: HashMap::new(),
            len: 0,
            budget,
        }
    }

    /// Number of tracked pages
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of tracked pages
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Returns true if a new page cannot be inserted without evicting
    pub fn is_full(&self) -> bool {
        self.len >= self.budget
    }

    /// Returns true if the page is tracked
    pub fn contains(&self, page: &ResidentPage) -> bool {
        self.index.contains_key(page)
    }

    /// Marks a page as just used
    ///
    /// A tracked page moves to the head. An untracked page is inserted at
    /// the head if there is room; at budget this fails with
    /// [`SwapError::BudgetExceeded`] and the caller has to evict first.
    pub fn touch(&mut self, page: ResidentPage) -> SwapResult<Touch> {
        if let Some(&id) = self.index.get(&page) {
            if self.head != Some(id) {
                self.unlink(id);
                self.link_front(id);
            }
            trace!("tracker: promoted {:?} {:?}", page.pid, page.va);
            return Ok(Touch::Promoted);
        }
        if self.is_full() {
            return Err(SwapError::BudgetExceeded);
        }
        let id = self.alloc_node(page);
        self.link_front(id);
        self.index.insert(page, id);
        self.len += 1;
        trace!("tracker: inserted {:?} {:?} ({} / {})", page.pid, page.va, self.len, self.budget);
        Ok(Touch::Inserted)
    }

    /// Detaches and returns the most recently touched page
    pub fn evict(&mut self) -> Option<ResidentPage> {
        let id = self.head?;
        let page = self.nodes[id].page;
        self.detach(id);
        trace!("tracker: evicted {:?} {:?}", page.pid, page.va);
        Some(page)
    }

    /// Removes a specific page; a no-op if it is not tracked
    pub fn remove(&mut self, page: &ResidentPage) -> bool {
        match self.index.get(page) {
            Some(&id) => {
                self.detach(id);
                true
            }
            None => false,
        }
    }

    /// Removes every page owned by `pid`, returning how many there were
    pub fn remove_process(&mut self, pid: ProcessId) -> usize {
        let mut removed = 0;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            cursor = self.nodes[id].next;
            if self.nodes[id].page.pid == pid {
                self.detach(id);
                removed += 1;
            }
        }
        removed
    }

    /// Puts a previously evicted page back at the least-recent end
    ///
    /// Used to return a victim that could not be swapped out. Fails with
    /// [`SwapError::BudgetExceeded`] if the slot it held has been taken in
    /// the meantime.
    pub fn reinsert_least_recent(&mut self, page: ResidentPage) -> SwapResult<()> {
        if self.index.contains_key(&page) {
            return Ok(());
        }
        if self.is_full() {
            return Err(SwapError::BudgetExceeded);
        }
        let id = self.alloc_node(page);
        self.link_back(id);
        self.index.insert(page, id);
        self.len += 1;
        Ok(())
    }

    /// Tracked pages, most recent first
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            tracker: self,
            cursor: self.head,
        }
    }

    /// Copies the list, most recent first
    pub fn snapshot(&self) -> Vec<ResidentPage> {
        self.iter().collect()
    }

    /// Verifies the list structure against the count, the index and the budget
    pub fn check_invariants(&self) -> Result<(), &'static str> {
        if let Some(h) = self.head {
            if self.nodes[h].prev.is_some() {
                return Err("head has a previous link");
            }
        }
        if let Some(t) = self.tail {
            if self.nodes[t].next.is_some() {
                return Err("tail has a next link");
            }
        }
        if self.head.is_none() != self.tail.is_none() {
            return Err("head and tail disagree on emptiness");
        }

        let mut visited = 0;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let node = &self.nodes[id];
            if !node.live {
                return Err("list reaches a vacant node");
            }
            if node.prev != prev {
                return Err("previous link does not match traversal");
            }
            if self.index.get(&node.page) != Some(&id) {
                return Err("index does not point at node");
            }
            visited += 1;
            if visited > self.len {
                return Err("traversal longer than count");
            }
            prev = Some(id);
            cursor = node.next;
        }

        if visited != self.len {
            return Err("traversal shorter than count");
        }
        if prev != self.tail {
            return Err("traversal does not end at tail");
        }
        if self.index.len() != self.len {
            return Err("index size differs from count");
        }
        if self.len > self.budget {
            return Err("count above budget");
        }
        Ok(())
    }

    fn alloc_node(&mut self, page: ResidentPage) -> usize {
        let node = Node {
            page,
            prev: None,
            next: None,
            live: true,
        };
        match self.free_head {
            Some(id) => {
                self.free_head = self.nodes[id].next;
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn detach(&mut self, id: usize) {
        self.unlink(id);
        let page = self.nodes[id].page;
        self.index.remove(&page);
        self.len -= 1;

        let node = &mut self.nodes[id];
        node.live = false;
        node.next = self.free_head;
        self.free_head = Some(id);
    }

    fn unlink(&mut self, id: usize) {
        let Node { prev, next, .. } = self.nodes[id];
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[id].prev = None;
        self.nodes[id].next = None;
    }

    fn link_front(&mut self, id: usize) {
        self.nodes[id].prev = None;
        self.nodes[id].next = self.head;
        match self.head {
            Some(h) => self.nodes[h].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    fn link_back(&mut self, id: usize) {
        self.nodes[id].next = None;
        self.nodes[id].prev = self.tail;
        match self.tail {
            Some(t) => self.nodes[t].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }
}

/// Iterator over tracked pages, most recent first
pub struct Iter<'a> {
    tracker: &'a ResidencyTracker,
    cursor: Option<usize>,
}

impl Iterator for Iter<'_> {
    type Item = ResidentPage;

    fn next(&mut self) -> Option<ResidentPage> {
        let node = &self.tracker.nodes[self.cursor?];
        self.cursor = node.next;
        Some(node.page)
    }
}
