//! Integration tests for framescratch.

use framescratch::{
    AllocSide, ArenaMode, CollectingSink, ScratchAlloc, ScratchConfig, ScratchError, StrictMode,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const FRAME: Duration = Duration::from_millis(16);

fn quiet(config: ScratchConfig) -> (ScratchAlloc, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    (ScratchAlloc::with_sink(config, sink.clone()), sink)
}

fn span(ptr: std::ptr::NonNull<u8>, len: usize) -> std::ops::Range<usize> {
    let start = ptr.as_ptr() as usize;
    start..start + len
}

#[test]
fn test_basic_scope_allocation() {
    let (alloc, sink) = quiet(ScratchConfig::minimal());

    let scope = alloc.push();
    let a = scope.alloc(64, 8);
    let b = scope.alloc(256, 32);
    assert_eq!(b.as_ptr() as usize % 32, 0);

    // Write to verify memory is usable
    unsafe {
        a.as_ptr().write_bytes(0xAA, 64);
        b.as_ptr().write_bytes(0xBB, 256);
        assert_eq!(a.as_ptr().add(63).read(), 0xAA);
    }
    assert_eq!(scope.depth(), 1);
    scope.pop();

    assert!(sink.reports().is_empty());
}

#[test]
fn test_tick_reset_reuses_memory() {
    let (alloc, _sink) = quiet(ScratchConfig::minimal());

    let scope = alloc.push();
    let first = scope.alloc(100, 8);
    scope.pop();

    let report = alloc.tick(FRAME);
    assert_eq!(report.reset, 1);
    assert_eq!(alloc.current_thread_stats().unwrap().usage, 0);

    let scope = alloc.push();
    assert_eq!(scope.depth(), 1);
    let second = scope.alloc(100, 8);
    scope.pop();

    // After reset, should get the same memory back
    assert_eq!(first, second);
}

#[test]
fn test_collapsing_scope_does_not_collide() {
    let (alloc, _sink) = quiet(ScratchConfig::minimal());

    // A job pushes, gets suspended, and another job pushes on top of it.
    let suspended = alloc.push();
    let newer = alloc.push();

    let resumed_block = suspended.alloc(512, 16);
    let newer_block = newer.alloc(512, 16);
    assert!(!ranges_overlap(&span(resumed_block, 512), &span(newer_block, 512)));

    unsafe {
        resumed_block.as_ptr().write_bytes(1, 512);
        newer_block.as_ptr().write_bytes(2, 512);
        assert_eq!(resumed_block.as_ptr().add(511).read(), 1);
    }

    newer.pop();
    suspended.pop();
}

fn ranges_overlap(a: &std::ops::Range<usize>, b: &std::ops::Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

#[test]
fn test_cursors_crossing_is_exhaustion() {
    let (alloc, _sink) = quiet(ScratchConfig::minimal().with_arena_capacity(4096));

    let outer = alloc.push();
    let inner = alloc.push();
    let capacity = alloc.current_thread_stats().unwrap().capacity;

    inner.try_alloc(capacity - 1000, 8).unwrap();
    let err = outer.try_alloc(1200, 8).unwrap_err();
    assert!(matches!(err, ScratchError::OutOfMemory { requested: 1200, .. }));
    assert!(err.is_exhaustion());

    inner.pop();
    outer.pop();
}

#[test]
#[should_panic(expected = "FS001")]
fn test_infallible_alloc_exhaustion_is_fatal() {
    let (alloc, _sink) = quiet(ScratchConfig::minimal());
    let scope = alloc.push();
    let capacity = alloc.current_thread_stats().unwrap().capacity;
    scope.alloc(capacity * 2, 8);
}

#[test]
#[should_panic(expected = "FS004")]
fn test_out_of_order_pop_is_fatal() {
    let (alloc, _sink) = quiet(ScratchConfig::minimal());
    let outer = alloc.push();
    let _inner = alloc.push();
    outer.pop();
}

#[test]
fn test_realloc_preserves_contents() {
    let (alloc, _sink) = quiet(ScratchConfig::minimal());
    let scope = alloc.push();

    let block = scope.alloc(32, 8);
    unsafe {
        for i in 0..32 {
            block.as_ptr().add(i).write(i as u8);
        }
        let grown = scope.realloc(block, 4096, 8);
        let bytes = std::slice::from_raw_parts(grown.as_ptr(), 32);
        assert_eq!(bytes, (0..32).collect::<Vec<u8>>().as_slice());
    }
    scope.pop();
}

#[test]
fn test_outer_realloc_of_inner_block_outlives_inner_pop() {
    for mode in [ArenaMode::Bump, ArenaMode::HeapTracked] {
        let (alloc, _sink) = quiet(ScratchConfig::minimal().with_mode(mode));
        let outer = alloc.push();
        let inner = alloc.push();

        let block = inner.alloc(16, 8);
        let moved = unsafe {
            block.as_ptr().write_bytes(0x7E, 16);
            outer.realloc(block, 32, 8)
        };
        inner.pop();

        let stats = alloc.current_thread_stats().unwrap();
        assert!(stats.usage >= 32, "{mode}: usage {}", stats.usage);
        if mode == ArenaMode::HeapTracked {
            assert_eq!(stats.tracked_items, 1);
        }
        unsafe {
            assert_eq!(moved.as_ptr().add(15).read(), 0x7E);
            moved.as_ptr().write_bytes(0, 32);
        }
        outer.pop();
    }
}

#[test]
fn test_multithreaded_arenas() {
    let (alloc, _sink) = quiet(ScratchConfig::minimal());

    let handles: Vec<_> = (0..4u8)
        .map(|i| {
            let alloc = alloc.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    alloc.with_scratch(|scope| {
                        let values = scope.alloc_slice_fill(64, i);
                        assert!(values.iter().all(|&v| v == i));
                    });
                }
                assert!(alloc.is_registered(thread::current().id()));
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Thread exit released every worker arena.
    assert_eq!(alloc.arena_count(), 0);
    assert_eq!(alloc.stats().arenas_created, 4);
}

#[test]
fn test_idle_arena_is_evicted_and_recreated() {
    let (alloc, _sink) =
        quiet(ScratchConfig::minimal().with_idle_timeout(Duration::from_secs(1)));

    alloc.with_scratch(|scope| {
        scope.alloc(64, 8);
    });
    assert_eq!(alloc.arena_count(), 1);

    let report = alloc.tick(Duration::from_secs(2));
    assert_eq!(report.evicted, 1);
    assert_eq!(alloc.arena_count(), 0);

    alloc.with_scratch(|scope| {
        scope.alloc(64, 8);
    });
    assert_eq!(alloc.arena_count(), 1);

    let stats = alloc.stats();
    assert_eq!(stats.arenas_created, 2);
    assert_eq!(stats.arenas_evicted, 1);
}

#[test]
fn test_long_held_scope_is_not_evicted_after_pop() {
    let config = ScratchConfig::minimal()
        .with_idle_timeout(Duration::from_secs(1))
        .with_leak_thresholds(Duration::from_secs(5), Duration::from_secs(10));
    let (alloc, sink) = quiet(config);

    let scope = alloc.push();
    scope.alloc(64, 8);
    alloc.tick(Duration::from_millis(700));
    alloc.tick(Duration::from_millis(700));
    scope.pop();

    let report = alloc.tick(FRAME);
    assert_eq!(report.reset, 1);
    assert_eq!(report.evicted, 0);
    assert_eq!(alloc.arena_count(), 1);
    assert!(sink.reports().is_empty());
}

#[test]
fn test_open_scope_warns_across_frames() {
    let config = ScratchConfig::minimal()
        .with_leak_thresholds(Duration::from_millis(100), Duration::from_secs(10));
    let (alloc, sink) = quiet(config);

    let scope = alloc.push();
    let mut warnings = 0;
    for _ in 0..10 {
        let report = alloc.tick(FRAME);
        assert_eq!(report.open, 1);
        assert_eq!(report.reset, 0);
        warnings += report.warnings;
    }
    assert_eq!(warnings, 1);
    assert_eq!(sink.codes(), vec!["FS002"]);

    let report = &sink.reports()[0];
    assert!(report.context.contains("integration_tests.rs"));
    scope.pop();
}

#[test]
#[should_panic(expected = "FS003")]
fn test_leaked_scope_is_fatal() {
    let config = ScratchConfig::minimal()
        .with_leak_thresholds(Duration::from_millis(20), Duration::from_millis(50));
    let (alloc, _sink) = quiet(config);

    let _leaked = alloc.push();
    for _ in 0..10 {
        alloc.tick(FRAME);
    }
}

#[test]
#[should_panic(expected = "FS002")]
fn test_strict_mode_escalates_warning() {
    let config = ScratchConfig::minimal()
        .with_strict(StrictMode::PanicOnWarning)
        .with_leak_thresholds(Duration::from_millis(20), Duration::from_secs(10));
    let (alloc, _sink) = quiet(config);

    let _open = alloc.push();
    for _ in 0..5 {
        alloc.tick(FRAME);
    }
}

#[test]
fn test_heap_tracked_mode() {
    let (alloc, _sink) = quiet(ScratchConfig::minimal().with_mode(ArenaMode::HeapTracked));

    let outer = alloc.push();
    outer.alloc(16, 8);
    let before = alloc.current_thread_stats().unwrap().tracked_items;

    let inner = alloc.push();
    for _ in 0..8 {
        let block = inner.alloc(100, 8);
        unsafe { block.as_ptr().write_bytes(0x42, 100) };
    }
    assert_eq!(alloc.current_thread_stats().unwrap().tracked_items, before + 8);
    inner.pop();

    let stats = alloc.current_thread_stats().unwrap();
    assert_eq!(stats.mode, ArenaMode::HeapTracked);
    assert_eq!(stats.tracked_items, before);
    outer.pop();
    assert_eq!(alloc.current_thread_stats().unwrap().tracked_items, 0);
}

#[test]
fn test_trace_snapshot_freezes_previous_frame() {
    let (alloc, _sink) = quiet(ScratchConfig::minimal().with_trace(true));
    let me = thread::current().id();

    let outer = alloc.push();
    let inner = alloc.push();
    outer.alloc(10, 8);
    inner.alloc(20, 8);
    inner.pop();
    outer.pop();
    alloc.tick(FRAME);

    let view = alloc.trace_snapshot(me).unwrap();
    assert!(view.is_frozen());
    assert_eq!(view.frame_number(), 1);
    assert_eq!(view.total_requested(), 30);

    let sides: Vec<AllocSide> = view.events().iter().map(|e| e.side).collect();
    assert_eq!(sides, vec![AllocSide::Bottom, AllocSide::Top]);
    assert!(view.events()[1].site.is_some());

    // Without tracing there is nothing to snapshot.
    let (plain, _sink) = quiet(ScratchConfig::minimal());
    plain.with_scratch(|_| {});
    assert!(plain.trace_snapshot(me).is_none());
}

#[test]
fn test_release_current_thread() {
    let (alloc, sink) = quiet(ScratchConfig::minimal());
    alloc.with_scratch(|_| {});

    assert!(alloc.release_current_thread());
    assert!(!alloc.release_current_thread());
    assert!(sink.reports().is_empty());

    // Next push lazily creates a fresh arena.
    alloc.with_scratch(|_| {});
    assert!(alloc.is_registered(thread::current().id()));
}

#[test]
fn test_thread_exit_with_open_scope_reports() {
    let (alloc, sink) = quiet(ScratchConfig::minimal());

    let worker = {
        let alloc = alloc.clone();
        thread::spawn(move || {
            let scope = alloc.push();
            scope.alloc(64, 8);
            std::mem::forget(scope);
        })
    };
    worker.join().unwrap();

    assert_eq!(sink.codes(), vec!["FS005"]);
    assert_eq!(alloc.arena_count(), 0);
}

#[test]
fn test_shutdown_releases_everything() {
    let (alloc, sink) = quiet(ScratchConfig::minimal());
    alloc.with_scratch(|_| {});
    assert_eq!(alloc.arena_count(), 1);

    alloc.shutdown();
    assert_eq!(alloc.arena_count(), 0);
    assert!(sink.reports().is_empty());
}

#[test]
#[should_panic(expected = "FS005")]
fn test_shutdown_with_open_scope_is_fatal() {
    let (alloc, _sink) = quiet(ScratchConfig::minimal());
    let _open = alloc.push();
    alloc.shutdown();
}

#[test]
fn test_scope_moved_to_another_thread() {
    let (alloc, _sink) = quiet(ScratchConfig::minimal());
    let owner = thread::current().id();

    let scope = alloc.push();
    let scope = thread::spawn(move || {
        let values = scope.alloc_slice_copy(&[1u64, 2, 3]);
        assert_eq!(values.iter().sum::<u64>(), 6);
        scope
    })
    .join()
    .unwrap();

    // The resumed allocation came from the pushing thread's arena.
    assert!(alloc.current_thread_stats().unwrap().usage > 0);
    assert_eq!(alloc.arena_count(), 1);
    assert!(alloc.is_registered(owner));
    scope.pop();
}

#[test]
fn test_stats_display() {
    let (alloc, _sink) = quiet(ScratchConfig::minimal());
    let scope = alloc.push();
    scope.alloc(1000, 8);

    let stats = alloc.stats();
    assert_eq!(stats.arenas.len(), 1);
    assert_eq!(stats.open_scopes(), 1);
    assert!(stats.total_usage() >= 1000);
    assert!(stats.to_string().contains("Live arenas"));
    scope.pop();
}
