use thiserror::Error;

/// Errors raised by a frame pool, parameterized over the backing
/// store's own error type
#[derive(Debug, Error)]
pub enum PoolError<E>
where
    E: std::error::Error + 'static,
{
    #[error("pool is empty and the store has no canonical entity to load")]
    EmptyUnloadable,

    #[error("entity {0} does not exist in the backing store")]
    NotFound(u64),

    #[error(transparent)]
    Store(#[from] E),
}

pub type PoolResult<T, E> = Result<T, PoolError<E>>;
