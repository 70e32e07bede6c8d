//! Property tests: random well-nested scope programs.

use framescratch::{ArenaMode, CollectingSink, ScratchAlloc, ScratchConfig, ScratchScope};
use proptest::prelude::*;
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Push,
    Pop,
    /// Allocate from the scope `pick % open` levels below the top.
    Alloc { pick: usize, size: usize, align_shift: u32 },
    /// Resize live block `block % live` through the scope `pick % open`
    /// levels below the top.
    Realloc { pick: usize, block: usize, size: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::Push),
        2 => Just(Op::Pop),
        5 => (0usize..8, 0usize..600, 0u32..7).prop_map(|(pick, size, align_shift)| Op::Alloc {
            pick,
            size,
            align_shift
        }),
        3 => (0usize..8, 0usize..64, 1usize..600).prop_map(|(pick, block, size)| Op::Realloc {
            pick,
            block,
            size
        }),
    ]
}

fn alloc_with(mode: ArenaMode) -> ScratchAlloc {
    let config = ScratchConfig::minimal()
        .with_arena_capacity(16 * 1024)
        .with_mode(mode);
    ScratchAlloc::with_sink(config, Arc::new(CollectingSink::new()))
}

/// A live block: address range, alignment, owning depth and fill byte.
struct Block {
    range: Range<usize>,
    align: usize,
    depth: usize,
    fill: u8,
}

fn check_disjoint(range: &Range<usize>, live: &[Block]) -> Result<(), TestCaseError> {
    for block in live {
        prop_assert!(
            range.end <= block.range.start || block.range.end <= range.start,
            "{:?} overlaps live block {:?}",
            range,
            block.range
        );
    }
    Ok(())
}

fn run(mode: ArenaMode, ops: &[Op]) -> Result<(), TestCaseError> {
    let alloc = alloc_with(mode);
    let mut stack: Vec<ScratchScope> = Vec::new();
    let mut live: Vec<Block> = Vec::new();
    let mut fill = 0u8;

    for op in ops {
        match op {
            Op::Push => stack.push(alloc.push()),
            Op::Pop => {
                if let Some(scope) = stack.pop() {
                    let depth = scope.depth() as usize;
                    scope.pop();
                    live.retain(|b| b.depth != depth);
                }
            }
            Op::Alloc { pick, size, align_shift } => {
                if stack.is_empty() || *size == 0 {
                    continue;
                }
                let index = stack.len() - 1 - pick % stack.len();
                let scope = &stack[index];
                let Ok(ptr) = scope.try_alloc(*size, 1 << align_shift) else {
                    continue;
                };
                prop_assert_eq!(ptr.as_ptr() as usize % (1 << align_shift), 0);

                let start = ptr.as_ptr() as usize;
                let range = start..start + size;
                check_disjoint(&range, &live)?;

                fill = fill.wrapping_add(1);
                unsafe { ptr.as_ptr().write_bytes(fill, *size) };
                live.push(Block {
                    range,
                    align: 1 << align_shift,
                    depth: scope.depth() as usize,
                    fill,
                });
            }
            Op::Realloc { pick, block, size } => {
                if stack.is_empty() || live.is_empty() {
                    continue;
                }
                let scope = &stack[stack.len() - 1 - pick % stack.len()];
                let index = block % live.len();
                let old_ptr = std::ptr::NonNull::new(live[index].range.start as *mut u8).unwrap();
                let align = live[index].align;
                let Ok(ptr) = (unsafe { scope.try_realloc(old_ptr, *size, align) }) else {
                    continue;
                };
                let old = live.swap_remove(index);
                prop_assert_eq!(ptr.as_ptr() as usize % align, 0);

                // The kept prefix moved with the block.
                let kept = old.range.len().min(*size);
                let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), kept) };
                prop_assert!(bytes.iter().all(|&b| b == old.fill));

                let start = ptr.as_ptr() as usize;
                let range = start..start + size;
                check_disjoint(&range, &live)?;

                // The block now lives as long as the scope that resized it.
                fill = fill.wrapping_add(1);
                unsafe { ptr.as_ptr().write_bytes(fill, *size) };
                live.push(Block {
                    range,
                    align,
                    depth: scope.depth() as usize,
                    fill,
                });
            }
        }

        // Every live block still holds what was written into it.
        for block in &live {
            let bytes = unsafe {
                std::slice::from_raw_parts(block.range.start as *const u8, block.range.len())
            };
            prop_assert!(bytes.iter().all(|&b| b == block.fill));
        }
    }

    while let Some(scope) = stack.pop() {
        scope.pop();
    }
    prop_assert_eq!(alloc.current_thread_stats().map_or(0, |s| s.open_depth), 0);
    Ok(())
}

proptest! {
    #[test]
    fn bump_blocks_never_overlap(ops in prop::collection::vec(op(), 1..120)) {
        run(ArenaMode::Bump, &ops)?;
    }

    #[test]
    fn heap_tracked_blocks_never_overlap(ops in prop::collection::vec(op(), 1..80)) {
        run(ArenaMode::HeapTracked, &ops)?;
    }

    #[test]
    fn heap_tracked_items_balance(sizes in prop::collection::vec(1usize..256, 0..24)) {
        let alloc = alloc_with(ArenaMode::HeapTracked);
        let outer = alloc.push();
        outer.alloc(8, 8);
        let before = alloc.current_thread_stats().unwrap().tracked_items;

        let inner = alloc.push();
        for size in &sizes {
            inner.alloc(*size, 8);
            // Interleaved allocations of the outer scope outlive the inner pop.
            outer.alloc(*size, 8);
        }
        inner.pop();

        let after = alloc.current_thread_stats().unwrap().tracked_items;
        prop_assert_eq!(after, before + sizes.len());
        outer.pop();
        prop_assert_eq!(alloc.current_thread_stats().unwrap().tracked_items, 0);
    }

    #[test]
    fn top_scope_usage_returns_on_pop(sizes in prop::collection::vec(1usize..1024, 0..16)) {
        let alloc = alloc_with(ArenaMode::Bump);
        let outer = alloc.push();
        outer.alloc(64, 8);
        let before = alloc.current_thread_stats().unwrap().usage;

        let inner = alloc.push();
        for size in &sizes {
            let _ = inner.try_alloc(*size, 16);
        }
        inner.pop();

        prop_assert_eq!(alloc.current_thread_stats().unwrap().usage, before);
        outer.pop();
    }
}
