//! Runtime adapters: the tokio timer driver and a tokio-backed dispatcher.

pub mod driver;
pub mod tokio_dispatcher;

pub use driver::handle;
pub use tokio_dispatcher::TokioDispatcher;
