//! Cortex-M0 / Cortex-M0+ backend.
//!
//! This target has no FPU and a single-word exception-entry stacking
//! sequence (the base frame only; there is no lazy-FP-stacking variant to
//! worry about as there would be on M4F/M33). The syscall trap is SVC;
//! context switches are requested from handler mode via PendSV, which runs
//! at the lowest exception priority so it always drains after any pending
//! interrupt work.

use core::sync::atomic::{AtomicBool, Ordering};

use abi::Pid;
use zerocopy::FromBytes;

use crate::task::Table;

/// The portion of register state the hardware pushes automatically on
/// exception entry, and pops automatically on exception return.
#[derive(FromBytes, Default)]
#[repr(C)]
pub struct ExceptionFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub psr: u32,
}

const INITIAL_PSR: u32 = 1 << 24; // Thumb bit; M0 has no other mode bits to set.

/// Size in bytes of the software-saved register block (r4-r11) that every
/// context switch stacks immediately below the hardware [`ExceptionFrame`].
/// A process's saved stack pointer (`Descriptor::sp`, and every `sp` taken
/// by the functions below) always refers to the bottom of this combined
/// block, never to the hardware frame directly -- see the `SVCall`/`PendSV`
/// save/restore sequences further down.
const SOFT_SAVE_BYTES: u32 = 8 * core::mem::size_of::<u32>() as u32;

fn exception_frame(sp: u32) -> *const ExceptionFrame {
    (sp + SOFT_SAVE_BYTES) as *const ExceptionFrame
}

/// Reads the three syscall argument registers (r0-r2) out of the exception
/// frame belonging to `sp`. Used by `syscall::svc_dispatch` so the portable
/// dispatcher never has to know a frame's layout. r3 carries no syscall
/// argument on this ABI -- the syscall number itself travels in the `svc`
/// instruction's immediate, not in a register, per spec.md §4.G, leaving all
/// three general-purpose argument registers free for the one op
/// (`sendrec`) that needs the most of them.
///
/// # Safety
/// `sp` must be a saved stack pointer produced by `SVCall`/`PendSV`/
/// `build_initial_frame`.
pub unsafe fn read_args(sp: u32) -> [u32; 3] {
    let frame = &*exception_frame(sp);
    [frame.r0, frame.r1, frame.r2]
}

/// Writes a syscall's return value into the r0 slot of the frame owned by
/// `sp`.
///
/// # Safety
/// Same requirement as [`read_args`].
pub unsafe fn write_ret0(sp: u32, value: u32) {
    (*(exception_frame(sp) as *mut ExceptionFrame)).r0 = value;
}

/// Decodes the syscall number carried in the `svc` instruction that trapped,
/// per spec.md §4.G step 1: "reads the SVC operand byte from the saved PC -
/// 2 (the SVC instruction immediately preceding the saved return address)."
/// Thumb's `svc #imm8` encodes as the halfword `0xDF00 | imm8`, and the
/// hardware-saved `pc` already points one halfword past it (the return
/// address), so the instruction itself sits directly at `pc - 2`.
///
/// # Safety
/// `sp` must be a saved stack pointer produced by `SVCall`, and its frame's
/// `pc` field must genuinely be the return address from an executed `svc`.
pub unsafe fn read_svc_num(sp: u32) -> u8 {
    let frame = &*exception_frame(sp);
    let svc_instr = *((frame.pc - 2) as *const u16);
    (svc_instr & 0xFF) as u8
}

/// Builds the synthetic initial exception frame for a freshly-allocated
/// process, so that the ordinary exception-return path (shared with every
/// other context switch) can be used to start it for the first time. This
/// is the same trick the SVC/PendSV trampoline pattern this kernel follows
/// uses: there's no special-cased "first run" code path in the scheduler.
///
/// Returns the initial saved stack pointer: the bottom of a zeroed r4-r11
/// block immediately below the hardware frame, the same layout a real
/// context switch leaves behind.
pub fn build_initial_frame(
    stack_top: usize,
    entry: extern "C" fn(u32) -> !,
    arg: u32,
) -> u32 {
    let frame_addr = (stack_top - core::mem::size_of::<ExceptionFrame>()) & !7;
    let frame = unsafe { &mut *(frame_addr as *mut ExceptionFrame) };
    *frame = ExceptionFrame {
        r0: arg,
        r1: 0,
        r2: 0,
        r3: 0,
        r12: 0,
        lr: exit_trampoline as u32 | 1,
        pc: entry as u32,
        psr: INITIAL_PSR,
    };

    let soft_save = frame_addr as u32 - SOFT_SAVE_BYTES;
    unsafe { core::ptr::write_bytes(soft_save as *mut u8, 0, SOFT_SAVE_BYTES as usize) };
    soft_save
}

/// Every process body in this kernel is `-> !`; this exists only so the
/// synthesized initial `lr` points somewhere sane (and recognizable in a
/// debugger) if a process body ever does return, which is a usage error the
/// kernel has no graceful way to handle (no process-exit-by-return in this
/// design, only the explicit `exit()` syscall).
#[no_mangle]
extern "C" fn exit_trampoline() -> ! {
    crate::err::kpanic("process body returned without calling exit()");
}

static IRQ_MASK_DEPTH: AtomicBool = AtomicBool::new(false);

pub fn disable_interrupts() {
    cortex_m::interrupt::disable();
    IRQ_MASK_DEPTH.store(true, Ordering::SeqCst);
}

pub fn enable_interrupts() {
    IRQ_MASK_DEPTH.store(false, Ordering::SeqCst);
    unsafe { cortex_m::interrupt::enable() };
}

pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

/// Enables the NVIC line for `irq`, called once by `connect()` at startup.
pub fn enable_irq(irq: usize) {
    unsafe {
        (*cortex_m::peripheral::NVIC::ptr()).iser[irq / 32].write(1 << (irq % 32));
    }
}

/// Masks the NVIC line for `irq`. The interrupt bridge (`irq.rs`) calls this
/// on delivery; the owning process re-enables it explicitly once it has
/// finished handling the condition, per spec.md §4.F.
pub fn disable_irq(irq: usize) {
    unsafe {
        (*cortex_m::peripheral::NVIC::ptr()).icer[irq / 32].write(1 << (irq % 32));
    }
}

/// Requests a PendSV so the scheduler reruns at the next exception-exit
/// boundary, rather than inline -- used by the interrupt bridge, which runs
/// in handler mode and must not switch contexts itself.
pub fn request_context_switch() {
    cortex_m::peripheral::SCB::set_pendsv();
}

cfg_if::cfg_if! {
    if #[cfg(feature = "klog-semihosting")] {
        pub fn klog_impl(args: core::fmt::Arguments) {
            use core::fmt::Write;
            let _ = writeln!(cortex_m_semihosting::hio::hstdout().unwrap(), "{}", args);
        }
    } else if #[cfg(feature = "klog-itm")] {
        pub fn klog_impl(args: core::fmt::Arguments) {
            unsafe {
                let itm = &mut *cortex_m::peripheral::ITM::ptr();
                cortex_m::iprintln!(&mut itm.stim[0], "{}", args);
            }
        }
    } else {
        pub fn klog_impl(_args: core::fmt::Arguments) {}
    }
}

/// Transfers control to `pid` for the very first time, never returning to
/// the caller. Used once, by `os_start()`.
///
/// Rather than trap through `SVCall` (which expects an *outgoing* task to
/// save state for, and there isn't one yet), this forges an exception
/// return directly: point PSP at the synthetic frame `startup.rs` built for
/// `pid`, switch to using PSP in thread mode, then perform the same
/// `bx`-to-`EXC_RETURN` sequence the tail of every other exception handler
/// uses to resume a task.
///
/// # Safety
/// Must be called at most once, with interrupts configured and the task
/// table fully initialized, exactly as `startup.rs` does it.
pub unsafe fn start_first_task(tasks: &Table, pid: Pid) -> ! {
    let sp = tasks.descs[pid.index()].sp;
    core::arch::asm!(
        "ldm r0!, {{r4-r7}}",
        "mov r8, r4",
        "mov r9, r5",
        "mov r10, r6",
        "mov r11, r7",
        "ldm r0!, {{r4-r7}}",
        "msr psp, r0",
        "movs r0, #2",        // SPSEL=1 (use PSP), privileged thread mode
        "msr control, r0",
        "isb",
        "ldr lr, ={exc_return}",
        "bx lr",
        in("r0") sp,
        exc_return = const 0xFFFF_FFFDu32,
        options(noreturn),
    );
}

/// The SVC handler. Syscall entry, like a timer or peripheral interrupt, can
/// leave with a different task running than the one that trapped in -- the
/// common case, since `send`/`receive`/`sendrec` usually block -- so this
/// handler shares its save/restore shape with `PendSV` below rather than
/// returning to the same stack it entered on. `{dispatch}` both runs the
/// portable syscall logic (`syscall::svc_dispatch`) and picks the next task;
/// it returns the PSP to resume on.
#[naked]
#[no_mangle]
unsafe extern "C" fn SVCall() {
    core::arch::asm!(
        "mrs r0, psp",
        "subs r0, r0, #32",
        "stm r0!, {{r4-r7}}",
        "mov r4, r8",
        "mov r5, r9",
        "mov r6, r10",
        "mov r7, r11",
        "stm r0!, {{r4-r7}}",
        "subs r0, r0, #32",
        "bl {dispatch}",
        "ldm r0!, {{r4-r7}}",
        "mov r8, r4",
        "mov r9, r5",
        "mov r10, r6",
        "mov r11, r7",
        "ldm r0!, {{r4-r7}}",
        "msr psp, r0",
        "bx lr",
        dispatch = sym crate::syscall::svc_dispatch,
        options(noreturn),
    );
}

/// The PendSV handler performs the same mechanical register save/restore as
/// `SVCall`, but is triggered by the interrupt bridge (`irq.rs`) instead of
/// a syscall trap, for the case where an ISR wakes a higher-priority process
/// and the currently-running one needs to be preempted at the next
/// exception-return boundary. It shares the save/restore shim but calls
/// `sched::pendsv_switch`, which only re-schedules -- it runs no syscall.
#[naked]
#[no_mangle]
unsafe extern "C" fn PendSV() {
    core::arch::asm!(
        "mrs r0, psp",
        "subs r0, r0, #32",
        "stm r0!, {{r4-r7}}",
        "mov r4, r8",
        "mov r5, r9",
        "mov r6, r10",
        "mov r7, r11",
        "stm r0!, {{r4-r7}}",
        "subs r0, r0, #32",
        "bl {switch}",
        "ldm r0!, {{r4-r7}}",
        "mov r8, r4",
        "mov r9, r5",
        "mov r10, r6",
        "mov r11, r7",
        "ldm r0!, {{r4-r7}}",
        "msr psp, r0",
        "bx lr",
        switch = sym crate::sched::pendsv_switch,
        options(noreturn),
    );
}

/// Interrupt entry point for every peripheral vector the bridge can route
/// (spec.md §4.F). Installed as the default handler for the NVIC's
/// externally-numbered vectors; `ipsr` tells us which one fired.
#[no_mangle]
unsafe extern "C" fn DefaultHandler() {
    let ipsr = cortex_m::peripheral::SCB::vect_active(&*cortex_m::peripheral::SCB::ptr());
    if let cortex_m::peripheral::scb::VectActive::Interrupt { irqn } = ipsr {
        crate::irq::dispatch_external(irqn as usize);
    }
}
