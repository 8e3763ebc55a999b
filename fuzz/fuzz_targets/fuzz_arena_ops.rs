//! Fuzz target: arena allocate/release sequences.
//!
//! Each input byte is one operation: the high bit selects release, the rest
//! is a size (in 16-byte steps) or the index of a live block. Occupancy must
//! always match the live blocks, and blocks never overlap.
//!
//! cargo fuzz run fuzz_arena_ops

#![no_main]

use libfuzzer_sys::fuzz_target;
use smartlight::pubsub::arena::{Arena, ArenaBlock};

fuzz_target!(|data: &[u8]| {
    let arena: Arena = Arena::new();
    let mut live: Vec<(ArenaBlock, u8)> = Vec::new();
    let mut next_tag = 0u8;

    for &op in data {
        if op & 0x80 != 0 {
            if !live.is_empty() {
                let (block, _) = live.swap_remove(usize::from(op & 0x7F) % live.len());
                arena.release(block);
            }
        } else if let Ok(mut block) = arena.allocate(usize::from(op) * 16) {
            next_tag = next_tag.wrapping_add(1);
            arena.bytes_mut(&mut block).fill(next_tag);
            live.push((block, next_tag));
        }

        let used: usize = live.iter().map(|(b, _)| b.units()).sum();
        assert_eq!(arena.used_units(), used);
        // A write into an overlapping block would have clobbered a stamp.
        for (block, tag) in &live {
            assert!(arena.bytes(block).iter().all(|b| b == tag));
        }
    }

    for (block, _) in live {
        arena.release(block);
    }
    assert_eq!(arena.used_units(), 0);
});
