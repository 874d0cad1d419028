//! Process-side syscall stubs, plus the startup builder API re-exported from
//! `kern` so that boot code has one crate to depend on instead of two.
//!
//! Every stub here is a thin wrapper around an `svc` trap whose *immediate
//! operand* selects the syscall (spec.md §4.G) and whose arguments travel in
//! r0-r2 exactly where an ordinary AAPCS call already puts them. Unlike the
//! teacher's syscall ABI, which is register-starved enough to need a whole
//! `push`/`pop`-and-shuffle dance through r4-r11 to get the syscall number
//! and a struct of arguments into place (see the upstream `sys_send_stub`),
//! this kernel keeps the syscall number out of any register entirely, so
//! every stub below is a single `svc` instruction and a `bx lr`.

#![no_std]
#![cfg_attr(not(feature = "sim"), feature(naked_functions))]

pub use abi::*;
pub use kern::startup::{os_start, start, Entry};

/// Voluntarily gives up the CPU for this scheduling round (spec.md §6).
#[inline(always)]
pub fn yield_now() {
    unsafe { yield_stub() }
}

/// Ends the calling process. There is no process-exit-by-return in this
/// design (spec.md §4.H) -- this is the only way out.
#[inline(always)]
pub fn exit() -> ! {
    unsafe { exit_stub() }
}

/// Sends `msg` to `dest`, blocking until a matching `receive` admits it.
/// Panics (in the kernel, fatally) if `dest` is out of range or dead.
#[inline(always)]
pub fn send(dest: Pid, msg: &Message) {
    unsafe { send_stub(u32::from(dest.0), msg as *const Message) }
}

/// Blocks until a message whose type matches `filter` is available, either
/// a queued sender or (if `filter` admits [`MsgType::INTERRUPT`]) a pending
/// interrupt notification, and returns it.
#[inline(always)]
pub fn receive(filter: MsgType) -> Message {
    let mut out = Message::new();
    unsafe { receive_stub(u32::from(filter.0), &mut out as *mut Message) };
    out
}

/// Sends `msg` to `dest` and blocks until `dest` (and only `dest`) replies
/// with a [`MsgType::REPLY`] message, returning that reply.
#[inline(always)]
pub fn sendrec(dest: Pid, msg: &Message) -> Message {
    let mut reply = Message::new();
    unsafe { sendrec_stub(u32::from(dest.0), msg as *const Message, &mut reply as *mut Message) };
    reply
}

/// Registers the caller as the handler for `irq` and raises it to
/// [`Priority::HANDLER`] (spec.md §4.F).
#[inline(always)]
pub fn connect(irq: usize) {
    unsafe { connect_stub(irq as u32) }
}

/// Changes the caller's own scheduling priority. Passing the idle level or
/// past it is a usage error (the kernel panics).
#[inline(always)]
pub fn priority(level: Priority) {
    unsafe { priority_stub(u32::from(level.0)) }
}

/// Prints a diagnostic snapshot of every process to the kernel log
/// (spec.md §10).
#[inline(always)]
pub fn dump() {
    unsafe { dump_stub() }
}

// Real stubs exist only for the hardware backend; there is no `svc`
// instruction to execute on the host, and tests exercise the kernel
// directly through `kern::syscall::dispatch` instead of through these.
cfg_if::cfg_if! {
    if #[cfg(feature = "sim")] {
        unsafe fn yield_stub() { unimplemented!("userlib stubs are arm_m-only") }
        unsafe fn exit_stub() -> ! { unimplemented!("userlib stubs are arm_m-only") }
        unsafe fn send_stub(_dest: u32, _msg: *const Message) { unimplemented!("userlib stubs are arm_m-only") }
        unsafe fn receive_stub(_filter: u32, _out: *mut Message) { unimplemented!("userlib stubs are arm_m-only") }
        unsafe fn sendrec_stub(_dest: u32, _msg: *const Message, _out: *mut Message) { unimplemented!("userlib stubs are arm_m-only") }
        unsafe fn connect_stub(_irq: u32) { unimplemented!("userlib stubs are arm_m-only") }
        unsafe fn priority_stub(_level: u32) { unimplemented!("userlib stubs are arm_m-only") }
        unsafe fn dump_stub() { unimplemented!("userlib stubs are arm_m-only") }
    } else {
        #[naked]
        unsafe extern "C" fn yield_stub() {
            core::arch::asm!("svc #0", "bx lr", options(noreturn));
        }

        #[naked]
        unsafe extern "C" fn exit_stub() -> ! {
            core::arch::asm!("svc #4", options(noreturn));
        }

        #[naked]
        unsafe extern "C" fn send_stub(_dest: u32, _msg: *const Message) {
            core::arch::asm!("svc #1", "bx lr", options(noreturn));
        }

        #[naked]
        unsafe extern "C" fn receive_stub(_filter: u32, _out: *mut Message) {
            core::arch::asm!("svc #2", "bx lr", options(noreturn));
        }

        #[naked]
        unsafe extern "C" fn sendrec_stub(_dest: u32, _msg: *const Message, _out: *mut Message) {
            core::arch::asm!("svc #3", "bx lr", options(noreturn));
        }

        #[naked]
        unsafe extern "C" fn connect_stub(_irq: u32) {
            core::arch::asm!("svc #6", "bx lr", options(noreturn));
        }

        #[naked]
        unsafe extern "C" fn priority_stub(_level: u32) {
            core::arch::asm!("svc #7", "bx lr", options(noreturn));
        }

        #[naked]
        unsafe extern "C" fn dump_stub() {
            core::arch::asm!("svc #5", "bx lr", options(noreturn));
        }
    }
}
