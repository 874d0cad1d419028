//! The two-process ping-reply demo from spec.md §8 scenario 1, as a pair of
//! ordinary process bodies -- the smallest program that exercises `sendrec`,
//! `receive`, and `send` together, the way the teacher's `task-ping`/
//! `task-pong` exercise `sys_send`/`sys_recv`.

#![no_std]

use abi::{Message, MsgType, Pid};

/// Application message type for the ping request. Any value outside the
/// kernel-reserved range (`MsgType::REPLY` and above) works.
pub const PING: MsgType = MsgType(1);

/// `ping`'s body. `arg` carries pong's PID -- a process body has no
/// environment beyond that one word (spec.md §4.H), so the caller of
/// `start()` is responsible for wiring the two up in the right order.
pub extern "C" fn ping_body(arg: u32) -> ! {
    let pong = Pid(arg as u8);
    let request = Message {
        ty: PING,
        ..Message::new()
    };
    let reply = userlib::sendrec(pong, &request);
    debug_assert_eq!(reply.ty, MsgType::REPLY);
    userlib::exit();
}

/// `pong`'s body: answers every `PING` with an empty `REPLY`, forever.
pub extern "C" fn pong_body(_arg: u32) -> ! {
    loop {
        let request = userlib::receive(PING);
        let reply = Message {
            ty: MsgType::REPLY,
            ..Message::new()
        };
        userlib::send(request.sender, &reply);
    }
}
