//! Analysis registry, dispatcher and the aggregation primitives the domain
//! analyses are built from.

pub mod aggregator;
pub mod dispatcher;
pub mod registry;

pub use dispatcher::{dispatch, dispatch_concurrent, DispatchOptions};
pub use registry::Registry;
