use crate::errors::SpaceError;
use std::future::Future;
use std::pin::Pin;

// Type aliases for common types
pub type ActorResult<T> = Result<T, SpaceError>;
pub type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
