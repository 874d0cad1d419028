//! Synchronous rendezvous IPC: `send`, `receive`, `sendrec` (spec.md §4.E).
//!
//! There is no buffering anywhere in this module. A message either transfers
//! directly from sender to a receiver that's already waiting, or the sender
//! (or, for `sendrec`, the requester) parks on the destination's sender
//! queue until a matching `receive` comes along and copies it out. Reply is
//! not a separate syscall: a handler replies to a `sendrec` request by
//! calling ordinary `send()` back at the requester, who is parked waiting
//! specifically for a [`MsgType::REPLY`] from that one process.

use abi::{Message, MsgType, Pid, UsageError};

use crate::err::kpanic_usage;
use crate::kernel::Kernel;
use crate::queue;
use crate::sched::make_ready;
use crate::task::{NextTask, State};

/// Validates a caller-supplied destination (spec.md §4.E step 1). Both
/// faults name `dest`, not whichever process made the call, in the
/// diagnostic -- spec.md §8 scenario 5 expects `send(99, ...)`'s panic
/// message to name the bad PID itself.
fn validate_dest(k: &Kernel, dest: Pid) {
    if !k.tasks.check_pid(dest) {
        kpanic_usage(dest, UsageError::TaskOutOfRange);
    }
    if k.tasks.descs[dest.index()].state == State::Dead {
        kpanic_usage(dest, UsageError::DeadDestination);
    }
}

/// Copies `msg` into the message buffer a blocked process supplied, stamping
/// the sender identity the receiver didn't (and can't) know in advance.
unsafe fn deliver(receiver_buf: core::ptr::NonNull<Message>, sender: Pid, msg: &Message) {
    let mut out = *msg;
    out.sender = sender;
    *receiver_buf.as_ptr() = out;
}

/// Checks whether `receiver` (currently blocked in `Receiving`) would accept
/// a message of type `ty` arriving from `from`.
fn receiver_accepts(k: &Kernel, receiver: Pid, from: Pid, ty: MsgType) -> bool {
    let d = &k.tasks.descs[receiver.index()];
    if d.state != State::Receiving {
        return false;
    }
    let filter = d.msg_filter.unwrap_or(MsgType::ANY);
    if !ty.matches(filter) {
        return false;
    }
    match d.expect_from {
        Some(expected) => expected == from,
        None => true,
    }
}

/// `send(dest, msg)`. Never returns a reply; see `sendrec` for that.
pub fn send(k: &mut Kernel, caller: Pid, dest: Pid, msg: &Message) -> NextTask {
    validate_dest(k, dest);

    if receiver_accepts(k, dest, caller, msg.ty) {
        let buf = k.tasks.descs[dest.index()].msg_buf.take().expect("receiving task has no buffer");
        unsafe { deliver(buf, caller, msg) };
        k.tasks.descs[dest.index()].expect_from = None;
        let hint = make_ready(k, dest);
        return NextTask::Same.combine(hint);
    }

    let d = &mut k.tasks.descs[caller.index()];
    d.state = State::Sending;
    d.msg_filter = Some(msg.ty);
    d.pending_send = Some(*msg);
    queue::sender_push_back(&mut k.tasks.descs, dest, caller);
    NextTask::Other
}

/// `receive(filter)`. Delivers the caller's pending interrupt notification
/// first if one is outstanding and admitted by `filter`, per spec.md §4.F;
/// otherwise takes the first queued sender whose message type matches.
pub fn receive(k: &mut Kernel, caller: Pid, filter: MsgType, msg_out: core::ptr::NonNull<Message>) -> NextTask {
    if k.tasks.descs[caller.index()].pending && MsgType::INTERRUPT.matches(filter) {
        k.tasks.descs[caller.index()].pending = false;
        let synthetic = Message {
            sender: Pid::HARDWARE,
            ty: MsgType::INTERRUPT,
            body: [0; abi::MESSAGE_BODY_BYTES],
        };
        unsafe { deliver(msg_out, Pid::HARDWARE, &synthetic) };
        return NextTask::Same;
    }

    let found = queue::sender_iter(&k.tasks.descs, caller)
        .find(|&pid| k.tasks.descs[pid.index()].msg_filter.map_or(false, |t| t.matches(filter)));

    match found {
        Some(sender) => {
            queue::sender_remove(&mut k.tasks.descs, caller, sender);
            let msg = k.tasks.descs[sender.index()].pending_send.take().expect("sender has no message");
            unsafe { deliver(msg_out, sender, &msg) };

            let hint = if k.tasks.descs[sender.index()].state == State::SendRec {
                // The requester doesn't become ready; it's still blocked,
                // now waiting specifically for our reply.
                let d = &mut k.tasks.descs[sender.index()];
                d.state = State::Receiving;
                d.msg_filter = Some(MsgType::REPLY);
                d.expect_from = Some(caller);
                NextTask::Same
            } else {
                make_ready(k, sender)
            };
            NextTask::Same.combine(hint)
        }
        None => {
            let d = &mut k.tasks.descs[caller.index()];
            d.state = State::Receiving;
            d.msg_filter = Some(filter);
            d.expect_from = None;
            d.msg_buf = Some(msg_out);
            NextTask::Other
        }
    }
}

/// `sendrec(dest, msg)`: delivers `msg` to `dest` exactly like `send`, but
/// the caller never becomes ready again on its own -- it always ends up
/// parked waiting for a [`MsgType::REPLY`] from `dest` specifically, whether
/// delivery happened immediately or only after `dest` got around to
/// receiving it.
pub fn sendrec(k: &mut Kernel, caller: Pid, dest: Pid, msg: &Message, reply_out: core::ptr::NonNull<Message>) -> NextTask {
    validate_dest(k, dest);

    if receiver_accepts(k, dest, caller, msg.ty) {
        let buf = k.tasks.descs[dest.index()].msg_buf.take().expect("receiving task has no buffer");
        unsafe { deliver(buf, caller, msg) };
        k.tasks.descs[dest.index()].expect_from = None;
        let hint = make_ready(k, dest);

        let d = &mut k.tasks.descs[caller.index()];
        d.state = State::Receiving;
        d.msg_filter = Some(MsgType::REPLY);
        d.expect_from = Some(dest);
        d.msg_buf = Some(reply_out);
        return NextTask::Other.combine(hint);
    }

    let d = &mut k.tasks.descs[caller.index()];
    d.state = State::SendRec;
    d.msg_filter = Some(msg.ty);
    d.pending_send = Some(*msg);
    d.msg_buf = Some(reply_out);
    queue::sender_push_back(&mut k.tasks.descs, dest, caller);
    NextTask::Other
}
