//! Error types shared across the TabRelay workspace.

mod broker;
mod frame;
mod registry;
mod transport;

pub use broker::*;
pub use frame::*;
pub use registry::*;
pub use transport::*;
