pub mod adapter;
pub mod pubsub;

pub use adapter::*;
