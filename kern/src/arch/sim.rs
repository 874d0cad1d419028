//! Host-native backend used only under `#[cfg(test)]`.
//!
//! There's no real exception hardware here, so tests drive `syscall::dispatch`
//! and `irq::interrupt` directly with already-decoded arguments rather than
//! going through `svc_dispatch`/an `ExceptionFrame` at all -- this backend
//! only needs to stand in for the handful of free functions the portable
//! modules (`task`, `queue`, `sched`, `ipc`, `irq`, `syscall`) call through
//! `crate::arch`. This is enough to exercise every one of them exactly as
//! they run on real hardware, without a single `asm!` block -- completing a
//! backend the upstream kernel this one is patterned on had only stubbed
//! out.

use std::cell::Cell;

/// Builds the initial stack state for a freshly-`start()`ed process.
///
/// There is no real exception frame on this backend -- the host never jumps
/// into a process body through a forged register restore -- so this is only
/// asked to produce *some* address below `stack_top` for bookkeeping
/// purposes. Tests exercise the scheduler and IPC logic through
/// `syscall::dispatch` and `irq::interrupt` directly rather than by running
/// process bodies, so nothing ever dereferences this value as a frame.
pub fn build_initial_frame(
    stack_top: usize,
    _entry: extern "C" fn(u32) -> !,
    _arg: u32,
) -> u32 {
    stack_top as u32
}

/// There is no hardware to forge an exception return on under this backend.
/// Kept only so the portable `startup::os_start` compiles under `feature =
/// "sim"`; no test calls it, since `cargo test -p kern` drives the kernel
/// through `syscall::dispatch`/`irq::interrupt` rather than the boot path.
pub unsafe fn start_first_task(_tasks: &crate::task::Table, _pid: abi::Pid) -> ! {
    unimplemented!("sim backend has no real task dispatch; call syscall::dispatch instead")
}

thread_local! {
    static IRQ_DISABLED: Cell<bool> = Cell::new(false);
    static LAST_LOG: std::cell::RefCell<std::string::String> = std::cell::RefCell::new(std::string::String::new());
}

pub fn disable_interrupts() {
    IRQ_DISABLED.with(|c| c.set(true));
}

pub fn enable_interrupts() {
    IRQ_DISABLED.with(|c| c.set(false));
}

pub fn wait_for_interrupt() {
    std::thread::yield_now();
}

pub fn enable_irq(_irq: usize) {}
pub fn disable_irq(_irq: usize) {}
pub fn request_context_switch() {}

pub fn klog_impl(args: core::fmt::Arguments) {
    let line = std::format!("{}", args);
    eprintln!("{}", line);
    LAST_LOG.with(|l| *l.borrow_mut() = line);
}

#[cfg(test)]
pub fn last_log() -> std::string::String {
    LAST_LOG.with(|l| l.borrow().clone())
}
