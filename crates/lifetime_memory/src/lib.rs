//! Scope-bound memory tracking.
//!
//! Memory allocated through [`tracked_alloc`] while a lifetime scope is open
//! belongs to that scope and is released when the scope closes. [`export`]
//! moves a block out of its scope so it survives, under the caller's
//! ownership.
//!
//! ```
//! use lifetime_memory::{export, tracked_alloc, LifetimeGuard};
//!
//! let kept = {
//!     let _scope = LifetimeGuard::new(2);
//!     let _scratch = tracked_alloc(128);
//!     let result = tracked_alloc(16);
//!     export(result).unwrap()
//! };
//!
//! assert_eq!(kept.as_slice(), &[0; 16]);
//! ```

mod block;
mod error;
mod lifetime;
pub mod pointer_map;
mod scope;
mod tracking_allocator;

pub use block::{Block, BLOCK_ALIGN};
pub use error::LifetimeError;
pub use lifetime::{LifetimeFrame, LifetimeStack};
pub use lifetime_memory_macros::scoped_lifetime;
pub use pointer_map::{PointerMap, PointerMapKind, SelectionPolicy};
pub use scope::{
    close_scope, current_kind, depth, export, lifetime, open_scope, release, tracked_alloc,
    try_close_scope, try_export, with_stack, LifetimeGuard,
};
pub use tracking_allocator::{AllocationStats, TrackingAllocator, ALLOCATOR};
