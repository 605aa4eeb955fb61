pub mod client;
pub mod model;
pub mod project;
pub mod selection;
pub mod tag;

pub use client::*;
pub use model::*;
pub use project::*;
pub use selection::*;
pub use tag::*;
