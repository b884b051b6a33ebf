use lifetime_memory::{
    close_scope, current_kind, depth, export, open_scope, tracked_alloc, with_stack,
    LifetimeGuard, PointerMapKind, ALLOCATOR,
};
use std::ptr::NonNull;

const HINTS: [usize; 3] = [2, 10, 40];

fn write_marker(ptr: NonNull<u8>, value: u8) {
    unsafe { ptr.as_ptr().write(value) };
}

#[test]
fn test_close_releases_every_tracked_block() {
    for hint in HINTS {
        let before = ALLOCATOR.get_count();

        open_scope(hint);
        for _ in 0..20 {
            tracked_alloc(32);
        }
        assert_eq!(ALLOCATOR.get_count(), before + 20);
        close_scope();

        assert_eq!(ALLOCATOR.get_count(), before, "hint {hint} leaked");
    }
}

#[test]
fn test_exported_block_survives_close() {
    for hint in HINTS {
        let before = ALLOCATOR.get_count();

        open_scope(hint);
        let ptr = tracked_alloc(4);
        write_marker(ptr, 0xAB);
        tracked_alloc(4);
        let mut block = export(ptr).expect("block was tracked");
        close_scope();

        assert_eq!(ALLOCATOR.get_count(), before + 1);
        assert_eq!(block.as_slice()[0], 0xAB);
        block.as_mut_slice()[3] = 7;

        drop(block);
        assert_eq!(ALLOCATOR.get_count(), before);
    }
}

#[test]
fn test_inner_scope_does_not_touch_outer_registrations() {
    let _outer = LifetimeGuard::new(40);
    let outer_ptrs: Vec<_> = (0..4).map(|_| tracked_alloc(8)).collect();
    let before_inner = ALLOCATOR.get_count();

    {
        let _inner = LifetimeGuard::new(2);
        tracked_alloc(8);
        tracked_alloc(8);

        // Outer blocks are not visible from the inner scope.
        assert!(export(outer_ptrs[0]).is_none());
        assert_eq!(current_kind(), Some(PointerMapKind::Vla));
    }

    assert_eq!(ALLOCATOR.get_count(), before_inner);
    with_stack(|stack| {
        let pointers = stack.current_frame();
        assert_eq!(pointers.len(), 4);
        assert!(outer_ptrs.iter().all(|&ptr| pointers.contains(ptr)));
    });
}

#[test]
fn test_repeated_and_foreign_exports_are_ignored() {
    for hint in HINTS {
        let _scope = LifetimeGuard::new(hint);
        let a = tracked_alloc(8);
        let b = tracked_alloc(8);
        let foreign = lifetime_memory::Block::new(8);

        let exported = export(a);
        assert!(exported.is_some());
        assert!(export(a).is_none());
        assert!(export(foreign.as_ptr()).is_none());

        with_stack(|stack| {
            let pointers = stack.current_frame();
            assert_eq!(pointers.len(), 1);
            assert!(pointers.contains(b));
        });
    }
}

#[test]
fn test_array_growth_keeps_registrations() {
    let _scope = LifetimeGuard::new(2);

    let ptrs: Vec<_> = (0..40u8)
        .map(|i| {
            let ptr = tracked_alloc(1);
            write_marker(ptr, i);
            ptr
        })
        .collect();

    with_stack(|stack| {
        let pointers = stack.current_frame();
        // 2 -> 8 -> 32 -> 128
        assert_eq!(pointers.capacity(), Some(128));

        let visited: Vec<_> = pointers.iter().map(|block| block.as_ptr()).collect();
        assert_eq!(visited, ptrs);
        for (i, block) in pointers.iter().enumerate() {
            assert_eq!(block.as_slice()[0], i as u8);
        }
    });
}

#[test]
fn test_hint_selects_container_layout() {
    let expected = [
        PointerMapKind::Vla,
        PointerMapKind::LinkList,
        PointerMapKind::HashMap,
    ];

    for (hint, kind) in HINTS.into_iter().zip(expected) {
        let _scope = LifetimeGuard::new(hint);
        assert_eq!(current_kind(), Some(kind));
    }
}

#[test]
fn test_export_then_close_on_grown_array() {
    let before = ALLOCATOR.get_count();

    open_scope(2);
    let p1 = tracked_alloc(16);
    let p2 = tracked_alloc(16);
    let p3 = tracked_alloc(16);
    with_stack(|stack| assert_eq!(stack.current_frame().capacity(), Some(8)));

    let kept = export(p2).expect("p2 was tracked");
    with_stack(|stack| {
        let pointers = stack.current_frame();
        assert!(pointers.contains(p1));
        assert!(!pointers.contains(p2));
        assert!(pointers.contains(p3));
    });
    close_scope();

    assert_eq!(depth(), 0);
    assert_eq!(ALLOCATOR.get_count(), before + 1);
    assert_eq!(kept.as_ptr(), p2);

    // Manual ownership: turn it into a raw pointer and release it later.
    let raw = kept.into_raw();
    assert_eq!(ALLOCATOR.get_count(), before + 1);
    unsafe { lifetime_memory::release(raw, 16) };
    assert_eq!(ALLOCATOR.get_count(), before);
}

#[test]
fn test_original_address_stays_valid_after_export() {
    for hint in HINTS {
        let before = ALLOCATOR.get_count();

        let (ptr, kept) = {
            let _scope = LifetimeGuard::new(hint);
            let ptr = tracked_alloc(16);
            (ptr, lifetime_memory::export!(ptr))
        };

        // The scope is gone, the exported block and its address are not.
        assert_eq!(depth(), 0);
        assert_eq!(ALLOCATOR.get_count(), before + 1);
        write_marker(ptr, 0x5A);
        let kept = kept.expect("block was tracked");
        assert_eq!(kept.as_ptr(), ptr);
        assert_eq!(kept.as_slice()[0], 0x5A);

        drop(kept);
        assert_eq!(ALLOCATOR.get_count(), before);
    }
}
