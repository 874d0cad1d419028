//! Boot-time process creation (spec.md §4.A, §6).
//!
//! Every process this kernel will ever run is created here, between
//! `os_init` and `os_start`; there is no process creation once scheduling
//! begins (§1 Non-goals). `start()` is the moral equivalent of the upstream
//! kernel's static `App`/`TaskDesc` image, just built by ordinary Rust calls
//! instead of a linker-placed table, since this kernel has no flash-resident
//! app descriptor format to parse.

use abi::{Pid, Priority, UsageError};

use crate::err::kpanic_usage;
use crate::kernel::{install, with_kernel, Kernel};
use crate::sched::{choose_next, make_ready};
use crate::task::{Descriptor, State};

/// A process entry point. Takes the argument word passed to `start()` and
/// never returns -- there is no process-exit-by-return in this design, only
/// the explicit `exit()` syscall.
pub type Entry = extern "C" fn(u32) -> !;

/// Idle's body is nothing but a `wait-for-interrupt` spin loop (spec.md §3),
/// so its stack never needs to hold more than a handful of call frames.
const IDLE_STACK_BYTES: usize = 128;

extern "C" fn idle_body(_arg: u32) -> ! {
    loop {
        crate::arch::wait_for_interrupt();
    }
}

/// Reserves the RAM arena `[ram_lo, ram_hi)` for stacks and kernel
/// bookkeeping, installs the empty kernel-state aggregate, and creates PID
/// 0, the idle process (spec.md §3, §4.H). Must be called before any
/// `start()` -- the first ordinary process created after this gets PID 1,
/// since idle has already claimed PID 0.
pub fn os_init(ram_lo: usize, ram_hi: usize) {
    let mut k = Kernel::new(ram_lo, ram_hi);
    create_idle(&mut k);
    install(k);
}

/// Builds the idle descriptor in `k`: a small dedicated stack, `Idling`
/// state, and the idle priority level, so `Priority::queue_index` keeps it
/// off every ready queue and `choose_next`'s empty-queues fallback is the
/// only thing that ever selects it. `os_start` still starts by asking the
/// scheduler to choose (see there) rather than unconditionally running idle
/// first, so a process created with a real priority before `os_start()`
/// preempts idle immediately rather than waiting for its first yield.
///
/// Takes `&mut Kernel` directly, like `syscall::dispatch`/`irq::interrupt`,
/// so tests can build a kernel without going through the `with_kernel`
/// singleton at all.
pub fn create_idle(k: &mut Kernel) {
    debug_assert_eq!(k.tasks.nprocs, 0, "idle must be allocated PID 0");
    let pid = Pid(0);
    k.tasks.nprocs = 1;

    let stack_base = k.alloc.alloc_stack(IDLE_STACK_BYTES);
    let stack_top = stack_base + IDLE_STACK_BYTES;
    let sp = crate::arch::build_initial_frame(stack_top, idle_body, 0);

    k.tasks.descs[pid.index()] = Descriptor {
        pid,
        name: "idle",
        state: State::Idling,
        sp,
        stack_base,
        stack_size: IDLE_STACK_BYTES,
        priority: Priority::IDLE,
        ..Descriptor::empty()
    };
}

/// Creates a process in `k`, giving it its own stack of `stack_size` bytes
/// and starting it at `entry(arg)` with priority `priority`. Returns its
/// PID.
///
/// Panics (a resource-exhaustion fault, §7) if the process table or the
/// arena is full.
pub fn start_on(k: &mut Kernel, name: &'static str, entry: Entry, arg: u32, stack_size: usize, priority: Priority) -> Pid {
    if k.tasks.nprocs >= abi::NPROCS {
        kpanic_usage(Pid(k.tasks.nprocs as u8), UsageError::TooManyProcesses);
    }
    let pid = Pid(k.tasks.nprocs as u8);
    k.tasks.nprocs += 1;

    let stack_base = k.alloc.alloc_stack(stack_size);
    let stack_top = stack_base + stack_size;
    let sp = crate::arch::build_initial_frame(stack_top, entry, arg);

    k.tasks.descs[pid.index()] = Descriptor {
        pid,
        name,
        state: State::Active,
        sp,
        stack_base,
        stack_size,
        priority,
        ..Descriptor::empty()
    };

    if pid != Pid::IDLE {
        make_ready(k, pid);
    }
    pid
}

/// Creates a process, giving it its own stack of `stack_size` bytes and
/// starting it at `entry(arg)` with priority `priority`. Returns its PID.
/// May be called only before `os_start()`, per spec.md §6.
pub fn start(name: &'static str, entry: Entry, arg: u32, stack_size: usize, priority: Priority) -> Pid {
    unsafe { with_kernel(|k| start_on(k, name, entry, arg, stack_size, priority)) }
}

/// Hooks `owner` (already created via `start()`) to `irq`. See
/// `irq::connect` for the runtime semantics; this is just the startup-time
/// entry point, kept here so application boot code has one place to call
/// into for both task and interrupt setup.
pub fn connect(irq: usize, owner: Pid) {
    unsafe {
        with_kernel(|k| crate::irq::connect(k, irq, owner));
    }
}

/// Hands control to the scheduler for the first time: asks it to choose
/// among whatever was made ready by earlier `start()` calls, falling back to
/// idle if none exist, and forges a one-time transfer into the winner's
/// synthetic initial frame. Never returns.
pub fn os_start() -> ! {
    unsafe {
        with_kernel(|k| {
            let first = choose_next(k);
            let tasks_ptr: *const crate::task::Table = &k.tasks;
            crate::arch::start_first_task(&*tasks_ptr, first)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_kernel;

    /// `test_kernel()` itself goes through `create_idle`; this just pins
    /// down the fields it's supposed to set.
    #[test]
    fn create_idle_builds_pid_zero_idling_at_idle_priority() {
        let tk = test_kernel();
        let idle = &tk.kernel.tasks.descs[Pid::IDLE.index()];
        assert_eq!(idle.pid, Pid::IDLE);
        assert_eq!(idle.state, State::Idling);
        assert_eq!(idle.priority, Priority::IDLE);
        assert_eq!(idle.stack_size, IDLE_STACK_BYTES);
        assert_eq!(tk.kernel.tasks.nprocs, 1);
    }

    /// A process started before the scheduler has picked anyone lands on
    /// its priority's ready queue immediately (spec.md §6), not just in the
    /// table.
    #[test]
    fn start_on_enqueues_a_real_priority_process() {
        let mut tk = test_kernel();
        let pid = tk.spawn("worker", Priority::LOW);
        assert_eq!(pid, Pid(1));
        assert_eq!(tk.state(pid), State::Active);
        assert_eq!(choose_next(&mut tk), pid);
    }

    /// Resource exhaustion (spec.md §7): the `NPROCS`-th call to
    /// `start_on`, one past the table's capacity, is a fatal usage error
    /// rather than a silent wraparound.
    #[test]
    fn start_on_past_table_capacity_panics() {
        let mut tk = test_kernel();
        // `create_idle` already claimed slot 0; fill the rest.
        for i in 0..abi::NPROCS - 1 {
            tk.spawn("filler", Priority::LOW);
            let _ = i;
        }
        assert_eq!(tk.kernel.tasks.nprocs, abi::NPROCS);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tk.spawn("one-too-many", Priority::LOW);
        }));
        assert!(result.is_err());
    }
}
