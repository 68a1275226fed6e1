pub mod event;
pub mod schema;

pub use event::*;
pub use schema::*;
