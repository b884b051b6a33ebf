use crate::block::Block;
use crate::error::LifetimeError;
use crate::lifetime::LifetimeStack;
use crate::pointer_map::PointerMapKind;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::ptr::NonNull;

thread_local! {
    static LIFETIME_STACK: RefCell<LifetimeStack> = RefCell::new(LifetimeStack::new());
}

/// Runs `f` against this thread's lifetime stack.
///
/// # Panics
///
/// Panics if called re-entrantly from inside `f`.
pub fn with_stack<R>(f: impl FnOnce(&mut LifetimeStack) -> R) -> R {
    LIFETIME_STACK.with(|stack| f(&mut stack.borrow_mut()))
}

pub fn open_scope(hint: usize) {
    with_stack(|stack| stack.open_scope(hint));
}

/// # Panics
///
/// Panics if no scope is open on this thread.
pub fn close_scope() {
    with_stack(LifetimeStack::close_scope);
}

pub fn try_close_scope() -> Result<(), LifetimeError> {
    with_stack(LifetimeStack::try_close_scope)
}

pub fn depth() -> usize {
    with_stack(|stack| stack.depth())
}

/// Container layout of the innermost scope on this thread, if any.
pub fn current_kind() -> Option<PointerMapKind> {
    with_stack(|stack| stack.try_current_frame().ok().map(|pointers| pointers.kind()))
}

/// Allocates `size` zeroed bytes tracked by the innermost scope on this
/// thread, or untracked if none is open.
pub fn tracked_alloc(size: usize) -> NonNull<u8> {
    with_stack(|stack| stack.alloc(size))
}

/// Moves `ptr` out of the innermost scope on this thread.
///
/// # Panics
///
/// Panics if no scope is open on this thread.
#[must_use = "dropping the exported Block releases it"]
pub fn export(ptr: NonNull<u8>) -> Option<Block> {
    with_stack(|stack| stack.export(ptr))
}

#[must_use = "dropping the exported Block releases it"]
pub fn try_export(ptr: NonNull<u8>) -> Result<Option<Block>, LifetimeError> {
    with_stack(|stack| stack.try_export(ptr))
}

/// Releases memory the caller owns outright: an untracked allocation or an
/// exported block turned into a raw pointer.
///
/// # Safety
///
/// `ptr` must come from [`tracked_alloc`] or [`Block::into_raw`] for a request
/// of exactly `size` bytes, must not be registered in any scope, and must not
/// have been released already.
pub unsafe fn release(ptr: NonNull<u8>, size: usize) {
    drop(unsafe { Block::from_raw(ptr, size) });
}

/// Keeps a lifetime scope open on this thread until dropped.
///
/// The scope closes on every way out of the enclosing block, unwinding
/// included. Guards must be dropped in reverse creation order, which normal
/// lexical scoping does.
pub struct LifetimeGuard {
    // Scopes live on a thread-local stack.
    _not_send: PhantomData<*const ()>,
}

impl LifetimeGuard {
    #[must_use]
    pub fn new(hint: usize) -> Self {
        open_scope(hint);

        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for LifetimeGuard {
    fn drop(&mut self) {
        close_scope();
    }
}

/// Runs `body` inside a lifetime scope and returns its value.
pub fn lifetime<R>(hint: usize, body: impl FnOnce() -> R) -> R {
    let _lifetime_guard = LifetimeGuard::new(hint);
    body()
}

/// Opens a lifetime scope for the duration of a block.
///
/// ```
/// use lifetime_memory::{export, lifetime, tracked_alloc, depth};
///
/// let kept = lifetime!(4, {
///     let _scratch = tracked_alloc(64);
///     let kept = tracked_alloc(16);
///     assert_eq!(depth(), 1);
///     export!(kept).unwrap()
/// });
///
/// assert_eq!(depth(), 0);
/// assert_eq!(kept.len(), 16);
/// ```
#[macro_export]
macro_rules! lifetime {
    ($hint:expr, $body:block) => {{
        let _lifetime_guard = $crate::LifetimeGuard::new($hint);
        $body
    }};
}

/// Moves an address out of the innermost open scope.
#[macro_export]
macro_rules! export {
    ($ptr:expr) => {
        $crate::export($ptr)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking_allocator::ALLOCATOR;

    #[test]
    fn test_guard_opens_and_closes() {
        assert_eq!(depth(), 0);
        {
            let _guard = LifetimeGuard::new(10);
            assert_eq!(depth(), 1);
            assert_eq!(current_kind(), Some(PointerMapKind::LinkList));
        }
        assert_eq!(depth(), 0);
        assert_eq!(current_kind(), None);
    }

    #[test]
    fn test_guard_releases_on_early_return() {
        fn work(bail: bool) -> Option<usize> {
            let _guard = LifetimeGuard::new(2);
            tracked_alloc(8);
            if bail {
                return None;
            }
            tracked_alloc(8);
            Some(depth())
        }

        let before = ALLOCATOR.get_count();
        assert_eq!(work(true), None);
        assert_eq!(depth(), 0);
        assert_eq!(work(false), Some(1));
        assert_eq!(depth(), 0);
        assert_eq!(ALLOCATOR.get_count(), before);
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let before = ALLOCATOR.get_count();

        let result = std::panic::catch_unwind(|| {
            let _guard = LifetimeGuard::new(40);
            tracked_alloc(32);
            panic!("boom");
        });

        assert!(result.is_err());
        assert_eq!(depth(), 0);
        assert_eq!(ALLOCATOR.get_count(), before);
    }

    #[test]
    fn test_lifetime_returns_body_value() {
        let before = ALLOCATOR.get_count();

        let len = lifetime(8, || {
            tracked_alloc(1);
            depth()
        });

        assert_eq!(len, 1);
        assert_eq!(ALLOCATOR.get_count(), before);
    }

    #[test]
    fn test_untracked_alloc_is_released_manually() {
        let before = ALLOCATOR.get_count();

        let ptr = tracked_alloc(24);
        assert_eq!(ALLOCATOR.get_count(), before + 1);

        unsafe { release(ptr, 24) };
        assert_eq!(ALLOCATOR.get_count(), before);
    }

    #[test]
    fn test_try_variants_report_missing_scope() {
        let block = Block::new(8);

        assert_eq!(try_close_scope(), Err(LifetimeError::NoActiveScope));
        assert_eq!(
            try_export(block.as_ptr()).unwrap_err(),
            LifetimeError::NoActiveScope
        );
    }

    #[test]
    #[should_panic(expected = "no lifetime scope is open")]
    fn test_export_without_scope_panics() {
        let block = Block::new(8);
        let _ = export(block.as_ptr());
    }

    #[test]
    fn test_stacks_are_per_thread() {
        let _guard = LifetimeGuard::new(2);

        let other = std::thread::spawn(depth).join().unwrap();
        assert_eq!(other, 0);
        assert_eq!(depth(), 1);
    }
}
