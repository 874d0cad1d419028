//! The kernel-state aggregate (spec.md §9 design note: "model the whole of
//! kernel state as a single aggregate guarded by the hardware-exclusive
//! execution of trap handlers").
//!
//! A single `static mut` holds it, and every entry point -- SVC, PendSV, an
//! external interrupt vector -- reaches it through [`with_kernel`]. That's
//! sound only because trap handlers on this target run with interrupts of
//! equal or lower priority masked for their duration, so two trap handlers
//! are never inside `with_kernel`'s closure at once; nothing here is safe
//! to call from ordinary (non-trap) code.

use abi::{NIRQ, NUM_PRIORITIES};

use crate::alloc::Allocator;
use crate::queue::Queue;
use crate::task::Table;

pub struct Kernel {
    pub tasks: Table,
    pub ready: [Queue; NUM_PRIORITIES],
    pub irq_table: [Option<abi::Pid>; NIRQ],
    pub current: abi::Pid,
    pub alloc: Allocator,
}

impl Kernel {
    pub const fn new(arena_lo: usize, arena_hi: usize) -> Self {
        Kernel {
            tasks: Table::new(),
            ready: [Queue::EMPTY; NUM_PRIORITIES],
            irq_table: [None; NIRQ],
            current: abi::Pid::IDLE,
            alloc: Allocator::new(arena_lo, arena_hi),
        }
    }
}

static mut KERNEL: Option<Kernel> = None;

/// Installs the kernel aggregate. Called exactly once, by `startup::os_init`.
pub fn install(k: Kernel) {
    unsafe {
        debug_assert!(KERNEL.is_none(), "os_init called more than once");
        KERNEL = Some(k);
    }
}

/// Runs `f` with exclusive access to the kernel aggregate.
///
/// # Safety
/// Must only be called from a trap handler (or from code that otherwise
/// has the exclusivity guarantee described on this module), and never
/// recursively.
pub unsafe fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    f(KERNEL.as_mut().expect("kernel not installed"))
}
