pub mod chunk;
pub mod decode;
pub mod encode;
pub mod hash;
pub mod index_map;
pub mod results;
pub mod validate;

pub use chunk::*;
pub use decode::*;
pub use encode::*;
pub use hash::*;
pub use index_map::*;
pub use results::*;
pub use validate::*;
