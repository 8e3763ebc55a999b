//! Fuzz target: inbound RPC dispatch.
//!
//! Feeds arbitrary payloads through the link callback and the dispatcher.
//! Neither may panic, only in-range channels may be written, and any reply
//! must leave the outbox's arena consistent.
//!
//! cargo fuzz run fuzz_command_dispatch

#![no_main]

use libfuzzer_sys::fuzz_target;
use smartlight::app::ports::OutputPort;
use smartlight::pubsub::dispatch::{dispatch, CommandContext};
use smartlight::pubsub::link::SessionLink;
use smartlight::pubsub::outbox::Outbox;
use smartlight::pubsub::transport::PacketType;

struct Outputs {
    levels: [bool; 4],
}

impl OutputPort for Outputs {
    fn set_channel(&mut self, index: usize, on: bool) {
        assert!(index < 4, "dispatcher wrote channel {index}");
        self.levels[index] = on;
    }

    fn get_channel(&self, index: usize) -> bool {
        self.levels[index]
    }

    fn channel_count(&self) -> usize {
        4
    }
}

fuzz_target!(|data: &[u8]| {
    let link = SessionLink::new();
    if link
        .on_publish_received(1, PacketType::Publish, "v1/devices/me/rpc/request/9", data)
        .is_err()
    {
        return;
    }
    let Some(command) = link.try_next_command() else {
        return;
    };

    let outbox = Outbox::new();
    let mut outputs = Outputs { levels: [false; 4] };
    let mut ctx = CommandContext {
        outputs: &mut outputs,
        outbox: &outbox,
        request_id: command.request_id,
    };
    let _ = dispatch(&command, &mut ctx);

    // At most one reply, and it accounts for every used unit.
    assert!(outbox.queue.len() <= 1);
    outbox.shutdown();
    assert_eq!(outbox.arena.used_units(), 0);
});
