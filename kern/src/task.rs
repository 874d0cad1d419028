//! The process descriptor and process table (spec §3, §4.B).

use abi::{Message, MsgType, Pid, Priority, BLANK, NPROCS};

use crate::queue::Queue;

/// A process's state, as defined by spec.md §3. A process is on exactly one
/// list (a ready queue, or some other process's sender queue) unless it is
/// `Receiving` or `Idling`, in which case it is on none.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum State {
    /// Slot is unused, or its occupant has called `exit()`.
    Dead,
    /// Runnable or running; queued on its priority's ready queue unless it
    /// is the process currently executing.
    Active,
    /// Blocked in `send()`, queued on the destination's sender queue.
    Sending,
    /// Blocked in `receive()`, waiting for a message matching `msg_filter`.
    Receiving,
    /// Blocked in `sendrec()`'s request phase, queued on the destination's
    /// sender queue; becomes `Receiving` (filtered on `REPLY`) once
    /// delivered.
    SendRec,
    /// The idle process (PID 0) only. Runs `wait-for-interrupt` in a loop
    /// and is never placed on a ready queue.
    Idling,
}

/// Internal representation of one process.
///
/// Descriptors live in a fixed-capacity table indexed by PID (§4.B) and are
/// threaded onto lists (ready queues, sender queues) through the single
/// `next` field, per the design note in spec.md §9: list linkage is
/// PID-indexed rather than pointer-based, so there is exactly one owned
/// `next` slot per descriptor regardless of which list it's currently on.
pub struct Descriptor {
    pub pid: Pid,
    pub name: &'static str,
    pub state: State,

    /// Saved stack pointer. Meaningless while the process is the one
    /// currently running.
    pub sp: u32,
    pub stack_base: usize,
    pub stack_size: usize,

    pub priority: Priority,

    /// Head/tail of the queue of processes blocked in `send`/`sendrec`
    /// toward *this* process. Manipulated only through the free functions in
    /// `crate::queue` that index the process table directly, since a method
    /// borrowing `&mut self` here can't simultaneously borrow the table that
    /// `self` lives inside of.
    pub senders_head: Option<Pid>,
    pub senders_tail: Option<Pid>,

    /// Set by the interrupt bridge when an interrupt arrives and this
    /// process isn't in a matching receive. Cleared the next time a
    /// receive admitting `INTERRUPT` observes it set.
    pub pending: bool,

    /// The message type this process is sending, or filtering on while
    /// receiving. `None` when neither applies.
    pub msg_filter: Option<MsgType>,

    /// While `Receiving`, restricts the filter to a single sender -- used
    /// only for the reply half of `sendrec`, where accepting a `REPLY` from
    /// anyone but the original destination would be a correctness bug, not
    /// a feature. `None` for an ordinary `receive()`.
    pub expect_from: Option<Pid>,

    /// The message a blocked `Sending`/`SendRec` process is waiting to
    /// hand off, copied out by the receiver that eventually admits it.
    pub pending_send: Option<Message>,

    /// Reference to the caller-provided message buffer for the in-progress
    /// receive/sendrec. There is no MMU on this target and no memory
    /// protection non-goal (spec.md §1), so this is an ordinary raw pointer
    /// into whatever stack or static the process gave us, valid for as long
    /// as the process remains blocked.
    pub msg_buf: Option<core::ptr::NonNull<Message>>,

    /// Thread-through-one-list-at-a-time link, per the invariant above.
    pub next: Option<Pid>,
}

impl Descriptor {
    pub const fn empty() -> Self {
        Descriptor {
            pid: Pid(0),
            name: "",
            state: State::Dead,
            sp: 0,
            stack_base: 0,
            stack_size: 0,
            priority: Priority::IDLE,
            senders_head: None,
            senders_tail: None,
            pending: false,
            msg_filter: None,
            expect_from: None,
            pending_send: None,
            msg_buf: None,
            next: None,
        }
    }

    /// Computes the high-water mark of this process's stack by scanning down
    /// from `stack_base` for the first word that's no longer `BLANK`. Used
    /// only by `dump()` (spec.md §10); `unsafe` because it reads memory that,
    /// on real hardware, belongs to a stack region the kernel merely
    /// allocated but does not otherwise own the contents of.
    pub unsafe fn stack_high_water(&self) -> usize {
        let words = self.stack_size / core::mem::size_of::<u32>();
        let base = self.stack_base as *const u32;
        for i in 0..words {
            if base.add(i).read_volatile() != BLANK {
                return self.stack_size - i * core::mem::size_of::<u32>();
            }
        }
        0
    }
}

/// The fixed-capacity process table (spec.md §4.B, capacity `NPROCS`).
pub struct Table {
    pub descs: [Descriptor; NPROCS],
    /// One past the highest allocated PID.
    pub nprocs: usize,
}

impl Table {
    pub const fn new() -> Self {
        // `Descriptor` has no `Copy`/`Default` derive issue here since
        // `empty()` is a `const fn`; this avoids requiring `Descriptor:
        // Copy` just to build the array.
        const EMPTY: Descriptor = Descriptor::empty();
        Table {
            descs: [EMPTY; NPROCS],
            nprocs: 0,
        }
    }

    pub fn as_slice_mut(&mut self) -> &mut [Descriptor] {
        &mut self.descs
    }

    /// Checks a caller-supplied `Pid` for validity, per spec.md §4.E's
    /// "validate dest; panic if out of range or descriptor state is DEAD."
    /// Returns `Ok` for any live index; callers that need to treat DEAD as
    /// fatal do so explicitly, since `sendrec`'s reply path tolerates a
    /// DEAD callee silently while `send`/`receive` do not (see `ipc.rs`).
    pub fn check_pid(&self, pid: Pid) -> bool {
        pid.index() < self.nprocs
    }
}

/// Return value for operations that can have scheduling implications.
/// Forces call sites to either apply the hint or explicitly discard it,
/// making the "who should run next" question visible at every call site
/// instead of buried in a side effect.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum NextTask {
    /// Keep running whatever was running (or, for syscalls, resume the
    /// caller).
    Same,
    /// A context switch is needed, but the caller doesn't know to what --
    /// the scheduler must pick.
    Other,
    /// A context switch is needed, and the caller already knows the winner
    /// (an optimization available when IPC delivery picks a specific
    /// process).
    Specific(Pid),
}

impl NextTask {
    /// Merges two scheduling hints produced independently (e.g. the
    /// interrupt bridge waking a process while a syscall is also in
    /// flight). Disagreeing `Specific` hints are downgraded to `Other`
    /// rather than silently picking one.
    pub fn combine(self, other: Self) -> Self {
        use NextTask::*;
        match (self, other) {
            (x, y) if x == y => x,
            (Specific(_), Specific(_)) => Other,
            (Specific(p), _) | (_, Specific(p)) => Specific(p),
            (Other, _) | (_, Other) => Other,
            (Same, Same) => Same,
        }
    }
}

/// Queue used for the per-priority ready lists (spec.md §4.C). Defined here
/// rather than in `queue.rs` would be equally reasonable; it's kept in
/// `queue.rs` because, unlike the sender-queue helpers, it's a genuinely
/// reusable (head, tail) type that doesn't alias the table it manipulates.
pub type ReadyQueue = Queue;

#[cfg(test)]
mod tests {
    use super::*;

    /// An untouched (still-`BLANK`) stack reports full depth available --
    /// nothing below `stack_base` has ever been written.
    #[test]
    fn stack_high_water_on_untouched_stack_is_zero() {
        let stack = [BLANK; 64];
        let mut d = Descriptor::empty();
        d.stack_base = stack.as_ptr() as usize;
        d.stack_size = stack.len() * core::mem::size_of::<u32>();
        assert_eq!(unsafe { d.stack_high_water() }, 0);
    }

    /// Painting a word partway down the stack (as a real process's use would
    /// leave behind) is reported as that much depth used, measured from the
    /// base rather than from wherever the scan started.
    #[test]
    fn stack_high_water_reports_depth_below_first_non_blank_word() {
        let mut stack = [BLANK; 64];
        stack[10] = 0x1234_5678;
        let mut d = Descriptor::empty();
        d.stack_base = stack.as_ptr() as usize;
        d.stack_size = stack.len() * core::mem::size_of::<u32>();

        let used = unsafe { d.stack_high_water() };
        assert_eq!(used, d.stack_size - 10 * core::mem::size_of::<u32>());
    }
}
