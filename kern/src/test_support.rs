//! Test-only fixtures shared by every module's `#[cfg(test)]` tests.
//!
//! Builds a `Kernel` directly, the way `syscall::dispatch`/`irq::interrupt`
//! expect to be driven, without going through the `with_kernel` singleton --
//! that singleton is sound only under the single-trap-handler-at-a-time
//! guarantee real hardware gives it, which doesn't hold across the host
//! test harness's parallel threads.

#![cfg(test)]

use abi::{Pid, Priority};

use crate::kernel::Kernel;
use crate::startup::{create_idle, start_on};

/// Large enough for a handful of small test stacks; arbitrary otherwise.
const TEST_ARENA_BYTES: usize = 0x4000;

/// A `Kernel` plus the backing memory its stack pointers and
/// `Descriptor::stack_base` values point into. The two must travel
/// together: dropping `arena` while `kernel` is still alive would leave
/// those addresses dangling.
pub struct TestKernel {
    pub(crate) kernel: Kernel,
    _arena: Box<[u8]>,
}

impl core::ops::Deref for TestKernel {
    type Target = Kernel;
    fn deref(&self) -> &Kernel {
        &self.kernel
    }
}

impl core::ops::DerefMut for TestKernel {
    fn deref_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }
}

/// A process body that is never actually entered -- tests drive processes
/// through `syscall::dispatch`/`irq::interrupt` directly rather than by
/// running their code, so this only needs to satisfy `Entry`'s type.
extern "C" fn unreachable_body(_arg: u32) -> ! {
    unreachable!("test process bodies are never entered under the sim backend")
}

pub fn test_kernel() -> TestKernel {
    let mut arena = vec![0u8; TEST_ARENA_BYTES].into_boxed_slice();
    let lo = arena.as_mut_ptr() as usize;
    let hi = lo + arena.len();
    let mut kernel = Kernel::new(lo, hi);
    create_idle(&mut kernel);
    TestKernel { kernel, _arena: arena }
}

impl TestKernel {
    /// Creates a process at `priority`, ready to run, the way `start()`
    /// would during boot. Returns its PID.
    pub fn spawn(&mut self, name: &'static str, priority: Priority) -> Pid {
        start_on(&mut self.kernel, name, unreachable_body, 0, 256, priority)
    }

    pub fn state(&self, pid: Pid) -> crate::task::State {
        self.kernel.tasks.descs[pid.index()].state
    }
}
