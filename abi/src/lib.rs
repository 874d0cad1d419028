//! Kernel ABI definitions, shared between the kernel and process code.
//!
//! Everything here is plain old data: no logic beyond small helper methods
//! for testing filter/priority relationships. Process code and kernel code
//! are compiled separately but must agree bit-for-bit on these layouts, so
//! nothing here should grow a non-`repr(C)`/`repr(transparent)` layout.

#![no_std]

use core::convert::TryFrom;

use zerocopy::{AsBytes, FromBytes, Unaligned};

/// Number of process table slots. Chosen to keep the table small on a
/// ~16 KB-RAM part; raising it costs one `Descriptor` per slot even for
/// unused entries.
pub const NPROCS: usize = 32;

/// Number of peripheral interrupt lines the bridge can route.
pub const NIRQ: usize = 32;

/// Payload capacity of a [`Message`], in bytes.
pub const MESSAGE_BODY_BYTES: usize = 28;

/// Sentinel word used to paint unused stack memory, so that depth can be
/// measured later by scanning for the first word that's no longer `BLANK`.
pub const BLANK: u32 = 0xDEAD_BEEF;

/// Number of non-idle priority levels, and hence the number of ready queues.
pub const NUM_PRIORITIES: usize = 3;

/// Names a process by its index in the process table.
///
/// `PID 0` is reserved for the idle process and is never placed on a ready
/// queue. PIDs are assigned densely starting at 0 and are never reused.
#[derive(Copy, Clone, Eq, PartialEq, FromBytes, AsBytes, Unaligned)]
#[repr(transparent)]
pub struct Pid(pub u8);

impl Pid {
    /// The idle process's fixed identity.
    pub const IDLE: Pid = Pid(0);

    /// Sentinel sender identity used for kernel-synthesized interrupt
    /// messages. `0xFF` can never name a real process, since [`NPROCS`] is
    /// well under 256.
    pub const HARDWARE: Pid = Pid(0xFF);

    /// Index into the process table.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl core::fmt::Debug for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if *self == Self::HARDWARE {
            write!(f, "HARDWARE")
        } else {
            write!(f, "Pid({})", self.0)
        }
    }
}

/// Priority of a process. Numerically lower is more important: `0` is the
/// interrupt-handler level, the highest. Values `>= `[`Priority::IDLE`]`.0`
/// name the idle level, which has no corresponding ready queue — the idle
/// process is selected implicitly when all three real queues are empty.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, FromBytes, AsBytes, Unaligned)]
#[repr(transparent)]
pub struct Priority(pub u8);

impl Priority {
    pub const HANDLER: Priority = Priority(0);
    pub const HIGH: Priority = Priority(1);
    pub const LOW: Priority = Priority(2);
    pub const IDLE: Priority = Priority(3);

    /// Whether this names the idle level (or anything past it).
    pub fn is_idle(self) -> bool {
        self.0 >= Self::IDLE.0
    }

    /// The ready-queue slot for this priority, or `None` for the idle level.
    pub fn queue_index(self) -> Option<usize> {
        if self.is_idle() {
            None
        } else {
            Some(usize::from(self.0))
        }
    }

    /// Checks if `self` is strictly more important (numerically smaller)
    /// than `other`. Deliberately named instead of implementing `PartialOrd`,
    /// so call sites can't get confused about which direction "greater"
    /// points.
    pub fn is_more_important_than(self, other: Self) -> bool {
        self.0 < other.0
    }
}

/// Message type tag. Non-negative application-defined values name
/// application message kinds; three values are reserved by the kernel.
#[derive(Copy, Clone, Eq, PartialEq, FromBytes, AsBytes, Unaligned)]
#[repr(transparent)]
pub struct MsgType(pub u16);

impl MsgType {
    /// Wildcard filter accepted by `receive`: matches any sender type.
    pub const ANY: MsgType = MsgType(0xFFFF);
    /// Type stamped on synthetic messages delivered by the interrupt bridge.
    pub const INTERRUPT: MsgType = MsgType(0xFFFE);
    /// Conventional type used for the reply half of `sendrec`.
    pub const REPLY: MsgType = MsgType(0xFFFD);

    /// Whether a message of type `self` satisfies receive filter `filter`.
    pub fn matches(self, filter: MsgType) -> bool {
        filter == Self::ANY || filter == self
    }
}

impl core::fmt::Debug for MsgType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            Self::ANY => write!(f, "ANY"),
            Self::INTERRUPT => write!(f, "INTERRUPT"),
            Self::REPLY => write!(f, "REPLY"),
            MsgType(n) => write!(f, "MsgType({})", n),
        }
    }
}

/// Fixed-size message body, one cache line or less, copied by value between
/// processes. `sender` and `ty` are stamped by the kernel on delivery; the
/// body is opaque payload the kernel never interprets.
#[derive(Copy, Clone, Debug, FromBytes)]
#[repr(C)]
pub struct Message {
    pub sender: Pid,
    pub ty: MsgType,
    pub body: [u8; MESSAGE_BODY_BYTES],
}

impl Default for Message {
    fn default() -> Self {
        Message {
            sender: Pid::IDLE,
            ty: MsgType(0),
            body: [0; MESSAGE_BODY_BYTES],
        }
    }
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Syscall numbers, decoded from the SVC operand byte (§4.G).
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Sysnum {
    Yield = 0,
    Send = 1,
    Recv = 2,
    SendRec = 3,
    Exit = 4,
    Dump = 5,
    /// Registers the caller as the handler for an IRQ line and raises it to
    /// [`Priority::HANDLER`] (§4.F, §6).
    Connect = 6,
    /// Changes the caller's own scheduling priority (§6).
    Priority = 7,
}

impl TryFrom<u32> for Sysnum {
    type Error = ();

    fn try_from(x: u32) -> Result<Self, Self::Error> {
        match x {
            0 => Ok(Self::Yield),
            1 => Ok(Self::Send),
            2 => Ok(Self::Recv),
            3 => Ok(Self::SendRec),
            4 => Ok(Self::Exit),
            5 => Ok(Self::Dump),
            6 => Ok(Self::Connect),
            7 => Ok(Self::Priority),
            _ => Err(()),
        }
    }
}

/// A kernel-defined fault, arising from how a process (mis)behaved.
///
/// Every variant here is, per spec, fatal: the kernel has no error-return
/// channel for IPC, so these only ever travel as far as a panic message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UsageError {
    /// A syscall used an operand byte with no corresponding [`Sysnum`].
    BadSyscallNumber,
    /// A process named a PID that will never be valid (out of range).
    TaskOutOfRange,
    /// A process tried to exchange messages with a `DEAD` process.
    DeadDestination,
    /// `priority()` was asked to install a priority at or past the idle
    /// level.
    BadPriority,
    /// `connect()` was asked to hook a negative (CPU-exception) vector.
    NegativeIrq,
    /// Process-table capacity was exhausted at startup.
    TooManyProcesses,
    /// The stack/descriptor bump allocator ran out of room.
    OutOfMemory,
}
