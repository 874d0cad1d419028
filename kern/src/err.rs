//! Fatal-error policy (spec.md §7).
//!
//! There is no recoverable-error channel anywhere in this kernel's IPC
//! surface: a programming error, resource exhaustion, or CPU fault all end
//! the same way, with the whole system halted and a diagnostic emitted
//! through `klog!`. This is a deliberate simplification relative to a
//! kernel that isolates faults per-process (see DESIGN.md) -- there's
//! nothing here to isolate *to*, since every process shares one address
//! space.

use abi::UsageError;

use crate::klog;

/// Halts the system with a message, after disabling interrupts so the
/// diagnostic can't be interrupted mid-print by another fault.
///
/// Never returns. On the `sim` backend this unwinds via `core::panic!` so
/// `#[should_panic]` tests can observe it; on real hardware it loops
/// forever after the log line is flushed.
#[cfg_attr(feature = "sim", allow(unreachable_code))]
pub fn kpanic(msg: &str) -> ! {
    crate::arch::disable_interrupts();
    klog!("PANIC: {}", msg);
    fatal_halt()
}

/// Same as [`kpanic`], but for a structured [`UsageError`] raised by a
/// syscall's argument validation.
pub fn kpanic_usage(pid: abi::Pid, err: UsageError) -> ! {
    crate::arch::disable_interrupts();
    klog!("PANIC: task {:?}: {:?}", pid, err);
    fatal_halt()
}

#[cfg(not(feature = "sim"))]
fn fatal_halt() -> ! {
    loop {
        crate::arch::wait_for_interrupt();
    }
}

#[cfg(feature = "sim")]
fn fatal_halt() -> ! {
    panic!("kernel halted")
}
