//! The ready-queue set: one circular doubly-linked ring per priority.
//!
//! These rings are the structures shared between the public API and the
//! timer handler. Every mutation happens inside a signal-masked critical
//! section or inside the handler itself, which runs with its own signal
//! masked, so no two edits ever overlap.

use core::ptr;

use crate::scheduler::thread::{ThreadBlock, ThreadIdType, ThreadPriority};

/// Index of a ready queue within the scheduler state. `Undefined` doubles
/// as the "no thread is running" marker.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum QueueIndex {
    Low = 0,
    Medium = 1,
    High = 2,
    Undefined = 3,
}

impl QueueIndex {
    pub(crate) fn from_priority(priority: ThreadPriority) -> QueueIndex {
        match priority {
            ThreadPriority::Low => QueueIndex::Low,
            ThreadPriority::Medium => QueueIndex::Medium,
            ThreadPriority::High => QueueIndex::High,
        }
    }
}

/// Queues are scanned for selection from `High` downwards.
pub(crate) const SELECTION_ORDER: [QueueIndex; 3] =
    [QueueIndex::High, QueueIndex::Medium, QueueIndex::Low];

/// One circular doubly-linked ready queue.
///
/// The ring refers to blocks by identity; block storage is owned by the
/// scheduler, which creates blocks in `schedule_thread` and reclaims them
/// after termination. A non-empty ring closes on itself: following `next`
/// from the head eventually reaches the head again.
pub(crate) struct RunQueue {
    head: *mut ThreadBlock,
}

impl RunQueue {
    pub(crate) const fn new() -> RunQueue {
        RunQueue {
            head: ptr::null_mut(),
        }
    }

    pub(crate) fn head(&self) -> *mut ThreadBlock {
        self.head
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    pub(crate) fn set_head(&mut self, block: *mut ThreadBlock) {
        self.head = block;
    }

    /// Links `block` immediately before the head, i.e. at the tail of the
    /// ring. An empty queue makes `block` the head, linked to itself.
    pub(crate) unsafe fn add_tail(&mut self, block: *mut ThreadBlock) {
        if self.head.is_null() {
            self.head = block;
            (*block).next = block;
            (*block).previous = block;
        } else {
            let head = self.head;
            let tail = (*head).previous;
            (*head).previous = block;
            (*block).next = head;
            (*block).previous = tail;
            (*tail).next = block;
        }
    }

    /// Unlinks `block` from the ring. A sole element clears the head.
    /// Otherwise the head pointer is left untouched even when `block` is
    /// the head: the scheduler rotates the head as part of selecting the
    /// next thread, and the unlinked block keeps its own links so that
    /// rotation can still step off it.
    pub(crate) unsafe fn remove(&mut self, block: *mut ThreadBlock) {
        if (*block).next == block {
            self.head = ptr::null_mut();
        } else {
            let next = (*block).next;
            let previous = (*block).previous;
            (*next).previous = previous;
            (*previous).next = next;
        }
    }

    /// Linear scan around the ring.
    pub(crate) unsafe fn find(&self, id: ThreadIdType) -> Option<*mut ThreadBlock> {
        if self.head.is_null() {
            return None;
        }
        let mut pointer = self.head;
        loop {
            if (*pointer).id == id {
                return Some(pointer);
            }
            pointer = (*pointer).next;
            if pointer == self.head {
                return None;
            }
        }
    }

    pub(crate) unsafe fn len(&self) -> usize {
        if self.head.is_null() {
            return 0;
        }
        let mut count = 1;
        let mut pointer = (*self.head).next;
        while pointer != self.head {
            count += 1;
            pointer = (*pointer).next;
        }
        count
    }
}

/// The three ready queues, indexed by priority.
pub(crate) struct RunQueueSet {
    queues: [RunQueue; 3],
}

impl RunQueueSet {
    pub(crate) const fn new() -> RunQueueSet {
        RunQueueSet {
            queues: [RunQueue::new(), RunQueue::new(), RunQueue::new()],
        }
    }

    pub(crate) fn queue(&self, index: QueueIndex) -> &RunQueue {
        if index == QueueIndex::Undefined {
            panic!("Error: queue: index {:?} does not name a queue.", index);
        }
        &self.queues[index as usize]
    }

    pub(crate) fn queue_mut(&mut self, index: QueueIndex) -> &mut RunQueue {
        if index == QueueIndex::Undefined {
            panic!("Error: queue_mut: index {:?} does not name a queue.", index);
        }
        &mut self.queues[index as usize]
    }
}
