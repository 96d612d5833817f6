mod error;
mod fetch;
mod stop;

pub use error::ErrorKind;
pub use fetch::FetchResult;
pub use stop::{StopListener, StopSignal};

/// The result of `fetchpool_lib` operations.
pub type Result<T> = std::result::Result<T, ErrorKind>;
