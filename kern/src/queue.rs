//! Intrusive, PID-indexed FIFO queues (spec.md §9 design note).
//!
//! Nothing here is a linked list in the pointer sense: a queue is just a
//! pair of optional PIDs, and link storage is the `next` field already
//! present on every `Descriptor`. This is what makes the queues usable in a
//! `#![no_std]` kernel with a bump allocator and no frees.

use abi::Pid;

use crate::task::Descriptor;

/// A FIFO of process descriptors, threaded through `Descriptor::next`.
///
/// Used directly for the three per-priority ready queues. The per-receiver
/// sender queues use free functions in this module instead of this type,
/// because a `Queue` stored *inside* the `Descriptor` it's paired with can't
/// be `&mut` borrowed at the same time as the table slice its links point
/// into -- see the comment on `Descriptor::senders_head`.
#[derive(Copy, Clone)]
pub struct Queue {
    head: Option<Pid>,
    tail: Option<Pid>,
}

impl Queue {
    pub const EMPTY: Queue = Queue {
        head: None,
        tail: None,
    };

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn push_back(&mut self, tasks: &mut [Descriptor], pid: Pid) {
        tasks[pid.index()].next = None;
        match self.tail {
            Some(t) => tasks[t.index()].next = Some(pid),
            None => self.head = Some(pid),
        }
        self.tail = Some(pid);
    }

    pub fn pop_front(&mut self, tasks: &mut [Descriptor]) -> Option<Pid> {
        let pid = self.head?;
        self.head = tasks[pid.index()].next.take();
        if self.head.is_none() {
            self.tail = None;
        }
        Some(pid)
    }

    /// Splices `pid` out of the queue, wherever it currently sits. Returns
    /// whether it was found. Used by `receive()` to pull a filter-matching
    /// sender out from behind others that arrived earlier but don't match
    /// (spec.md §4.E: "the *first* queued sender whose message type matches
    /// the filter").
    pub fn remove(&mut self, tasks: &mut [Descriptor], pid: Pid) -> bool {
        if self.head == Some(pid) {
            self.pop_front(tasks);
            return true;
        }
        let mut prev = self.head;
        while let Some(p) = prev {
            let next = tasks[p.index()].next;
            if next == Some(pid) {
                let after = tasks[pid.index()].next;
                tasks[p.index()].next = after;
                if self.tail == Some(pid) {
                    self.tail = Some(p);
                }
                tasks[pid.index()].next = None;
                return true;
            }
            prev = next;
        }
        false
    }

    /// Iterates the queue front-to-back without mutating it, for `remove`'s
    /// callers that need to find a match before deciding to splice it out.
    pub fn iter<'a>(&self, tasks: &'a [Descriptor]) -> QueueIter<'a> {
        QueueIter {
            tasks,
            next: self.head,
        }
    }
}

pub struct QueueIter<'a> {
    tasks: &'a [Descriptor],
    next: Option<Pid>,
}

impl<'a> Iterator for QueueIter<'a> {
    type Item = Pid;

    fn next(&mut self) -> Option<Pid> {
        let pid = self.next?;
        self.next = self.tasks[pid.index()].next;
        Some(pid)
    }
}

/// Pushes `pid` onto the back of the sender queue belonging to `receiver`.
/// Free function, not a method, for the aliasing reason noted on
/// `Descriptor::senders_head`.
pub fn sender_push_back(tasks: &mut [Descriptor], receiver: Pid, pid: Pid) {
    tasks[pid.index()].next = None;
    let tail = tasks[receiver.index()].senders_tail;
    match tail {
        Some(t) => tasks[t.index()].next = Some(pid),
        None => tasks[receiver.index()].senders_head = Some(pid),
    }
    tasks[receiver.index()].senders_tail = Some(pid);
}

/// Removes `pid` from `receiver`'s sender queue, wherever it sits.
pub fn sender_remove(tasks: &mut [Descriptor], receiver: Pid, pid: Pid) -> bool {
    let head = tasks[receiver.index()].senders_head;
    if head == Some(pid) {
        let next = tasks[pid.index()].next.take();
        tasks[receiver.index()].senders_head = next;
        if next.is_none() {
            tasks[receiver.index()].senders_tail = None;
        }
        return true;
    }
    let mut prev = head;
    while let Some(p) = prev {
        let next = tasks[p.index()].next;
        if next == Some(pid) {
            let after = tasks[pid.index()].next;
            tasks[p.index()].next = after;
            if tasks[receiver.index()].senders_tail == Some(pid) {
                tasks[receiver.index()].senders_tail = Some(p);
            }
            tasks[pid.index()].next = None;
            return true;
        }
        prev = next;
    }
    false
}

/// Iterates `receiver`'s sender queue front-to-back without mutating it.
pub fn sender_iter<'a>(tasks: &'a [Descriptor], receiver: Pid) -> QueueIter<'a> {
    QueueIter {
        tasks,
        next: tasks[receiver.index()].senders_head,
    }
}
