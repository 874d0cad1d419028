//! Architecture isolation layer.
//!
//! Everything in `task.rs`, `queue.rs`, `sched.rs`, `ipc.rs` and `irq.rs` is
//! portable: it only ever touches a `Descriptor` table and the abstractions
//! in this module. The two backends below are the only code in the kernel
//! that know what a Cortex-M exception frame looks like, or that there
//! isn't one at all.
//!
//! `arm_m` is the real target; `sim` exists purely so the scheduling and
//! IPC logic can run under `cargo test` on the host, the way the upstream
//! kernel this one is patterned on sketched but never finished.

cfg_if::cfg_if! {
    if #[cfg(feature = "sim")] {
        mod sim;
        pub use sim::*;
    } else {
        mod arm_m;
        pub use arm_m::*;
    }
}

/// Emits a line through whichever logging backend is configured, with
/// interrupts assumed already masked by the caller for fatal paths (see
/// `err.rs`) or left alone for routine `dump()` output.
///
/// Mirrors the three-way `klog!` split this kernel's house style settled on:
/// a compiled-out no-op, an ITM stimulus-port writer, and a semihosting
/// writer, selected by Cargo feature rather than at runtime, so that a
/// release image with no debugger attached pays nothing for log sites.
#[macro_export]
macro_rules! klog {
    ($($arg:tt)*) => {
        $crate::arch::klog_impl(format_args!($($arg)*))
    };
}
