use crate::block::Block;
use crate::error::LifetimeError;
use crate::pointer_map::{PointerMap, PointerMapKind, SelectionPolicy};
use log::{debug, trace};
use std::ptr::NonNull;

/// One open scope: the blocks it will release when it closes.
///
/// The enclosing frame is the one below it on the [`LifetimeStack`].
#[derive(Debug)]
pub struct LifetimeFrame {
    pointers: PointerMap,
}

impl LifetimeFrame {
    fn new(hint: usize, policy: &SelectionPolicy) -> Self {
        Self {
            pointers: PointerMap::with_policy(hint, policy),
        }
    }

    pub fn pointers(&self) -> &PointerMap {
        &self.pointers
    }

    pub fn kind(&self) -> PointerMapKind {
        self.pointers.kind()
    }
}

/// Stack of nested scopes, innermost on top.
///
/// Scopes must be closed in the reverse order they were opened; the stack
/// does not check it. Dropping the stack closes whatever is still open.
#[derive(Debug, Default)]
pub struct LifetimeStack {
    frames: Vec<LifetimeFrame>,
    policy: SelectionPolicy,
}

impl LifetimeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: SelectionPolicy) -> Self {
        Self {
            frames: Vec::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn open_scope(&mut self, hint: usize) {
        let frame = LifetimeFrame::new(hint, &self.policy);
        debug!(
            "Opening lifetime scope {} with hint {hint} ({})",
            self.frames.len() + 1,
            frame.kind()
        );
        self.frames.push(frame);
    }

    /// Closes the innermost scope and releases every block still registered
    /// in it.
    ///
    /// # Panics
    ///
    /// Panics if no scope is open.
    pub fn close_scope(&mut self) {
        if let Err(err) = self.try_close_scope() {
            panic!("cannot close scope: {err}");
        }
    }

    pub fn try_close_scope(&mut self) -> Result<(), LifetimeError> {
        let depth = self.frames.len();
        let frame = self.frames.pop().ok_or(LifetimeError::NoActiveScope)?;
        let kind = frame.kind();

        let released = frame.pointers.destroy();
        debug!("Closed lifetime scope {depth} ({kind}), released {released} block(s)");

        Ok(())
    }

    /// Container of the innermost scope.
    ///
    /// # Panics
    ///
    /// Panics if no scope is open.
    pub fn current_frame(&mut self) -> &mut PointerMap {
        match self.try_current_frame() {
            Ok(pointers) => pointers,
            Err(err) => panic!("no current frame: {err}"),
        }
    }

    pub fn try_current_frame(&mut self) -> Result<&mut PointerMap, LifetimeError> {
        self.frames
            .last_mut()
            .map(|frame| &mut frame.pointers)
            .ok_or(LifetimeError::NoActiveScope)
    }

    pub fn frames(&self) -> &[LifetimeFrame] {
        &self.frames
    }

    /// Allocates `size` zeroed bytes and registers them in the innermost
    /// scope.
    ///
    /// With no scope open the block is not tracked: the caller owns it and
    /// must hand it to [`release`](crate::release) (or
    /// [`Block::from_raw`]) eventually.
    pub fn alloc(&mut self, size: usize) -> NonNull<u8> {
        let block = Block::new(size);

        match self.frames.last_mut() {
            Some(frame) => frame.pointers.insert(block),
            None => {
                trace!("No lifetime scope open, {size} byte block is untracked");
                block.into_raw()
            }
        }
    }

    /// Moves the block at `ptr` out of the innermost scope so it outlives it.
    ///
    /// Returns `None` when `ptr` is not registered there, including when it
    /// was already exported.
    ///
    /// # Panics
    ///
    /// Panics if no scope is open.
    #[must_use = "dropping the exported Block releases it"]
    pub fn export(&mut self, ptr: NonNull<u8>) -> Option<Block> {
        match self.try_export(ptr) {
            Ok(block) => block,
            Err(err) => panic!("cannot export {ptr:p}: {err}"),
        }
    }

    #[must_use = "dropping the exported Block releases it"]
    pub fn try_export(&mut self, ptr: NonNull<u8>) -> Result<Option<Block>, LifetimeError> {
        let block = self.try_current_frame()?.remove(ptr);
        if block.is_some() {
            trace!("Exported {ptr:p} from lifetime scope {}", self.frames.len());
        }
        Ok(block)
    }
}

impl Drop for LifetimeStack {
    fn drop(&mut self) {
        while !self.frames.is_empty() {
            self.close_scope();
        }
    }
}
