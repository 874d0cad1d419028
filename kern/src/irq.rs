//! The interrupt-to-message bridge (spec.md §4.F).
//!
//! `connect()` is a startup-time operation, not a syscall -- this kernel
//! has no dynamic process creation after boot (§1 Non-goals), and the set
//! of processes that own interrupt lines is part of the static image
//! `startup.rs` builds. At runtime, an interrupt either lands directly in a
//! process that's already waiting for it via `receive(INTERRUPT)` (or
//! `ANY`), or sets that process's `pending` flag, which coalesces any
//! number of repeat firings into a single future delivery.

use abi::{MsgType, Pid, UsageError};

use crate::arch;
use crate::err::kpanic_usage;
use crate::kernel::with_kernel;
use crate::sched::outranks_current;
use crate::task::State;

/// Registers `owner` as the handler for `irq`, raising it to
/// [`abi::Priority::HANDLER`] as spec.md §4.F requires ("connecting a
/// process to an interrupt raises it to priority 0, since it may need to
/// run promptly"). Reachable two ways: at boot, through
/// `startup::connect` (owner named explicitly, before `os_start`), and at
/// runtime, through the `CONNECT` syscall (§6), where a process connects
/// itself and `owner` is always the caller.
pub fn connect(k: &mut crate::kernel::Kernel, irq: usize, owner: Pid) {
    if irq >= abi::NIRQ {
        kpanic_usage(owner, UsageError::NegativeIrq);
    }
    k.irq_table[irq] = Some(owner);
    k.tasks.descs[owner.index()].priority = abi::Priority::HANDLER;
    arch::enable_irq(irq);
}

/// Called from the architecture layer's interrupt vector dispatch. Masks
/// the firing line (the owning process re-enables it once it's dealt with
/// the condition, per spec.md §4.F) and delivers a synthetic `INTERRUPT`
/// message to whichever process owns it, or sets that process's pending
/// flag if it isn't in a matching receive right now.
pub fn dispatch_external(irqn: usize) {
    arch::disable_irq(irqn);
    unsafe {
        with_kernel(|k| {
            let owner = match k.irq_table[irqn] {
                Some(pid) => pid,
                None => return, // spurious / unrouted vector
            };
            interrupt(k, owner);
        })
    }
}

/// The portable half of interrupt delivery, also reachable directly for
/// software-simulated interrupts in tests.
pub fn interrupt(k: &mut crate::kernel::Kernel, dest: Pid) {
    let d = &k.tasks.descs[dest.index()];
    let waiting = d.state == State::Receiving
        && d.msg_filter.map_or(true, |f| MsgType::INTERRUPT.matches(f));

    if waiting {
        let buf = k.tasks.descs[dest.index()].msg_buf.take();
        if let Some(buf) = buf {
            let msg = abi::Message {
                sender: Pid::HARDWARE,
                ty: MsgType::INTERRUPT,
                body: [0; abi::MESSAGE_BODY_BYTES],
            };
            unsafe { *buf.as_ptr() = msg };
            crate::sched::make_ready(k, dest);
            arch::request_context_switch();
            return;
        }
    }

    k.tasks.descs[dest.index()].pending = true;
    if outranks_current(k, k.tasks.descs[dest.index()].priority) {
        arch::request_context_switch();
    }
}

#[cfg(test)]
mod tests {
    use abi::{Message, Priority};

    use super::*;
    use crate::ipc::receive;
    use crate::test_support::test_kernel;

    /// `connect` raises the caller to handler priority and wires up the
    /// IRQ table entry (spec.md §4.F).
    #[test]
    fn connect_raises_priority_and_registers_owner() {
        let mut tk = test_kernel();
        let h = tk.spawn("h", Priority::LOW);
        connect(&mut tk, 7, h);
        assert_eq!(tk.kernel.tasks.descs[h.index()].priority, Priority::HANDLER);
        assert_eq!(tk.kernel.irq_table[7], Some(h));
    }

    /// No lost interrupts: an interrupt that arrives while the handler is
    /// off doing something else (not blocked in a matching receive) sets
    /// the pending flag, and the handler's next admitting receive observes
    /// it as a synthesized INTERRUPT message.
    #[test]
    fn interrupt_before_receive_sets_pending_then_delivers_on_next_receive() {
        let mut tk = test_kernel();
        let h = tk.spawn("h", Priority::HANDLER);
        // h is ACTIVE (just spawned, running something other than receive).

        interrupt(&mut tk, h);
        assert!(tk.kernel.tasks.descs[h.index()].pending);

        let mut out = Message::new();
        let out_ptr = core::ptr::NonNull::new(&mut out as *mut Message).unwrap();
        receive(&mut tk, h, MsgType::ANY, out_ptr);
        assert_eq!(out.sender, Pid::HARDWARE);
        assert_eq!(out.ty, MsgType::INTERRUPT);
        assert!(!tk.kernel.tasks.descs[h.index()].pending);
    }

    /// Repeated interrupts before the handler drains coalesce into exactly
    /// one pending notification, not a queue of them.
    #[test]
    fn repeated_interrupts_coalesce() {
        let mut tk = test_kernel();
        let h = tk.spawn("h", Priority::HANDLER);
        interrupt(&mut tk, h);
        interrupt(&mut tk, h);
        interrupt(&mut tk, h);
        assert!(tk.kernel.tasks.descs[h.index()].pending);

        let mut out = Message::new();
        let out_ptr = core::ptr::NonNull::new(&mut out as *mut Message).unwrap();
        receive(&mut tk, h, MsgType::ANY, out_ptr);
        assert!(!tk.kernel.tasks.descs[h.index()].pending);

        // A second receive with nothing else pending blocks rather than
        // manufacturing a second INTERRUPT out of the coalesced ones.
        let mut out2 = Message::new();
        let out2_ptr = core::ptr::NonNull::new(&mut out2 as *mut Message).unwrap();
        let hint = receive(&mut tk, h, MsgType::ANY, out2_ptr);
        assert_eq!(hint, crate::task::NextTask::Other);
        assert_eq!(tk.state(h), State::Receiving);
    }

    /// An interrupt delivered straight to a waiting handler makes it
    /// ACTIVE and queues it on the ready list immediately, without going
    /// through the pending flag at all.
    #[test]
    fn interrupt_delivers_directly_to_a_waiting_receiver() {
        let mut tk = test_kernel();
        let h = tk.spawn("h", Priority::HANDLER);
        let mut out = Message::new();
        let out_ptr = core::ptr::NonNull::new(&mut out as *mut Message).unwrap();
        receive(&mut tk, h, MsgType::INTERRUPT, out_ptr);
        assert_eq!(tk.state(h), State::Receiving);

        interrupt(&mut tk, h);
        assert_eq!(out.sender, Pid::HARDWARE);
        assert_eq!(out.ty, MsgType::INTERRUPT);
        assert_eq!(tk.state(h), State::Active);
        assert!(!tk.kernel.tasks.descs[h.index()].pending);
    }
}
