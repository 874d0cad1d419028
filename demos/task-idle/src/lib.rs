//! A lowest-priority demo task with nothing to do but yield.
//!
//! Distinct from the kernel's own idle process (PID 0, always created by
//! `os_init` and never scheduled through the ordinary ready queues): this is
//! an ordinary `P_LOW` task, started like any other, that demonstrates the
//! "nothing to run" path showing up in application code instead of only in
//! the kernel, the way the teacher's own `task-idle` does for its platform.

#![no_std]

/// Process body: yields forever. Never sends, never receives, never exits.
pub extern "C" fn body(_arg: u32) -> ! {
    loop {
        userlib::yield_now();
    }
}
