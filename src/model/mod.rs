pub mod common;
pub mod project;
pub mod results;
pub mod schema;
pub mod table;
pub mod tree;

pub use common::*;
pub use project::*;
pub use results::*;
pub use schema::*;
pub use table::*;
pub use tree::*;
