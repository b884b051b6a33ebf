use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeError {
    #[error("no lifetime scope is open")]
    NoActiveScope,
    #[error("cannot lay out a block of {size} bytes")]
    InvalidBlockSize { size: usize },
}
