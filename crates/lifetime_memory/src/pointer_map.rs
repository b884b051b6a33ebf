//! Pointer containers owned by lifetime frames.
//!
//! A [`PointerMap`] holds the [`Block`]s registered in one scope. It picks one
//! of three layouts when it is created and keeps it for its whole life:
//!
//! - **Hash table** for large hints: a fixed number of independent chains,
//!   `hint / 4` of them.
//! - **Linked list** for medium hints: one unbounded chain, newest first.
//! - **Growable array** for small hints: contiguous slots that quadruple
//!   when full.
//!
//! Removing a block leaves an empty slot behind instead of unlinking or
//! compacting. Traversal and release skip empty slots.

use crate::block::Block;
use log::trace;
use std::fmt;
use std::mem;
use std::ptr::NonNull;

/// Hints at or above this select the hash table.
pub const HASHMAP_THRESHOLD: usize = 32;
/// Hints at or above this (and below the hash table threshold) select the list.
pub const LINKLIST_THRESHOLD: usize = 8;
/// Smallest capacity the array grows to, so a zero hint can still grow.
pub const VLA_MIN_CAPACITY: usize = 4;
/// Capacity multiplier applied when the array is full.
pub const GROWTH_FACTOR: usize = 4;
/// Hash tables get `hint / BUCKET_DIVISOR` buckets.
pub const BUCKET_DIVISOR: usize = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PointerMapKind {
    HashMap,
    LinkList,
    Vla,
}

impl fmt::Display for PointerMapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PointerMapKind::HashMap => "hash table",
            PointerMapKind::LinkList => "linked list",
            PointerMapKind::Vla => "growable array",
        };
        f.write_str(name)
    }
}

/// Thresholds that map a size hint to a container layout.
///
/// Larger thresholds are checked first: `hint >= hashmap_threshold` gives a
/// hash table, `hint >= linklist_threshold` a linked list, anything smaller a
/// growable array.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SelectionPolicy {
    pub hashmap_threshold: usize,
    pub linklist_threshold: usize,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            hashmap_threshold: HASHMAP_THRESHOLD,
            linklist_threshold: LINKLIST_THRESHOLD,
        }
    }
}

impl SelectionPolicy {
    pub fn select(&self, hint: usize) -> PointerMapKind {
        if hint >= self.hashmap_threshold {
            PointerMapKind::HashMap
        } else if hint >= self.linklist_threshold {
            PointerMapKind::LinkList
        } else {
            PointerMapKind::Vla
        }
    }
}

struct Node {
    block: Option<Block>,
    next: Option<Box<Node>>,
}

/// Singly linked chain, used on its own and as a hash bucket.
#[derive(Default)]
struct Chain {
    head: Option<Box<Node>>,
}

impl Chain {
    fn push_front(&mut self, block: Block) {
        let next = self.head.take();
        self.head = Some(Box::new(Node {
            block: Some(block),
            next,
        }));
    }

    fn take(&mut self, ptr: NonNull<u8>) -> Option<Block> {
        let mut node = self.head.as_deref_mut();
        while let Some(current) = node {
            if holds(&current.block, ptr) {
                return current.block.take();
            }
            node = current.next.as_deref_mut();
        }
        None
    }

    fn iter(&self) -> ChainIter<'_> {
        ChainIter {
            node: self.head.as_deref(),
        }
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        // Unlink one node at a time; the default recursive drop can blow the
        // stack on long chains.
        let mut next = self.head.take();
        while let Some(mut node) = next {
            next = node.next.take();
        }
    }
}

struct ChainIter<'a> {
    node: Option<&'a Node>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.node {
            self.node = node.next.as_deref();
            if let Some(block) = node.block.as_ref() {
                return Some(block);
            }
        }
        None
    }
}

struct HashTable {
    buckets: Vec<Chain>,
}

impl HashTable {
    fn with_buckets(bucket_count: usize) -> Self {
        let bucket_count = bucket_count.max(1);
        Self {
            buckets: (0..bucket_count).map(|_| Chain::default()).collect(),
        }
    }

    /// Word-aligned addresses differ in their low bits only by multiples of
    /// the word size, so divide those away before reducing.
    fn bucket_index(&self, ptr: NonNull<u8>) -> usize {
        (ptr.as_ptr() as usize / mem::size_of::<usize>()) % self.buckets.len()
    }

    fn insert(&mut self, block: Block) {
        let index = self.bucket_index(block.as_ptr());
        self.buckets[index].push_front(block);
    }

    fn take(&mut self, ptr: NonNull<u8>) -> Option<Block> {
        let index = self.bucket_index(ptr);
        self.buckets[index].take(ptr)
    }

    fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.buckets[self.bucket_index(ptr)]
            .iter()
            .any(|block| block.as_ptr() == ptr)
    }
}

struct GrowableArray {
    slots: Vec<Option<Block>>,
    capacity: usize,
}

impl GrowableArray {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn insert(&mut self, block: Block) {
        if self.slots.len() >= self.capacity {
            let grown = (self.capacity * GROWTH_FACTOR).max(VLA_MIN_CAPACITY);
            trace!("Growing pointer array from {} to {grown} slots", self.capacity);

            self.slots.reserve_exact(grown - self.slots.len());
            self.capacity = grown;
        }
        self.slots.push(Some(block));
    }

    fn take(&mut self, ptr: NonNull<u8>) -> Option<Block> {
        self.slots
            .iter_mut()
            .find(|slot| holds(slot, ptr))
            .and_then(Option::take)
    }
}

enum Repr {
    HashMap(HashTable),
    LinkList(Chain),
    Vla(GrowableArray),
}

/// Set of blocks registered in one scope.
pub struct PointerMap {
    repr: Repr,
}

impl PointerMap {
    pub fn new(hint: usize) -> Self {
        Self::with_policy(hint, &SelectionPolicy::default())
    }

    pub fn with_policy(hint: usize, policy: &SelectionPolicy) -> Self {
        let repr = match policy.select(hint) {
            PointerMapKind::HashMap => Repr::HashMap(HashTable::with_buckets(hint / BUCKET_DIVISOR)),
            PointerMapKind::LinkList => Repr::LinkList(Chain::default()),
            PointerMapKind::Vla => Repr::Vla(GrowableArray::with_capacity(hint)),
        };

        Self { repr }
    }

    pub fn kind(&self) -> PointerMapKind {
        match self.repr {
            Repr::HashMap(_) => PointerMapKind::HashMap,
            Repr::LinkList(_) => PointerMapKind::LinkList,
            Repr::Vla(_) => PointerMapKind::Vla,
        }
    }

    /// Takes ownership of `block` and returns its address.
    pub fn insert(&mut self, block: Block) -> NonNull<u8> {
        let ptr = block.as_ptr();
        trace!("Registering {ptr:p} in {}", self.kind());

        match &mut self.repr {
            Repr::HashMap(table) => table.insert(block),
            Repr::LinkList(chain) => chain.push_front(block),
            Repr::Vla(array) => array.insert(block),
        }

        ptr
    }

    /// Hands the block registered at `ptr` back to the caller and leaves an
    /// empty slot. Returns `None` if nothing live is registered there.
    #[must_use = "dropping the removed Block releases it"]
    pub fn remove(&mut self, ptr: NonNull<u8>) -> Option<Block> {
        let block = match &mut self.repr {
            Repr::HashMap(table) => table.take(ptr),
            Repr::LinkList(chain) => chain.take(ptr),
            Repr::Vla(array) => array.take(ptr),
        };

        if block.is_none() {
            trace!("{ptr:p} is not registered in {}, nothing to remove", self.kind());
        }
        block
    }

    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        match &self.repr {
            Repr::HashMap(table) => table.contains(ptr),
            _ => self.iter().any(|block| block.as_ptr() == ptr),
        }
    }

    /// Live blocks in a fixed order: bucket then chain order for the hash
    /// table, newest first for the list, insertion order for the array.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Block> + '_> {
        match &self.repr {
            Repr::HashMap(table) => Box::new(table.buckets.iter().flat_map(Chain::iter)),
            Repr::LinkList(chain) => Box::new(chain.iter()),
            Repr::Vla(array) => Box::new(array.slots.iter().flatten()),
        }
    }

    pub fn for_each(&self, mut visit: impl FnMut(NonNull<u8>)) {
        self.iter().for_each(|block| visit(block.as_ptr()));
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Slot capacity of a growable array.
    pub fn capacity(&self) -> Option<usize> {
        match &self.repr {
            Repr::Vla(array) => Some(array.capacity),
            _ => None,
        }
    }

    pub fn bucket_count(&self) -> Option<usize> {
        match &self.repr {
            Repr::HashMap(table) => Some(table.buckets.len()),
            _ => None,
        }
    }

    /// Releases every block still registered and the container itself.
    /// Returns how many blocks were released.
    pub fn destroy(self) -> usize {
        let released = self.len();
        trace!("Releasing {released} block(s) from {}", self.kind());
        released
    }
}

impl fmt::Debug for PointerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointerMap")
            .field("kind", &self.kind())
            .field("len", &self.len())
            .finish()
    }
}

fn holds(slot: &Option<Block>, ptr: NonNull<u8>) -> bool {
    slot.as_ref().is_some_and(|block| block.as_ptr() == ptr)
}
