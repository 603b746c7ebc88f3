//! Table synchronization: remote API seam, synchronizer and coordinator.

mod cancel;
mod coordinator;
mod deserializer;
mod model;
mod page;
mod progress;
mod remote;
mod synchronizer;

pub use cancel::*;
pub use coordinator::*;
pub use deserializer::*;
pub use model::*;
pub use page::*;
pub use progress::*;
pub use remote::*;
pub use synchronizer::TableSynchronizer;
