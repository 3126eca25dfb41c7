mod block;
mod delta;
mod document;
mod error;
mod registry;
mod tree;
mod value;
mod verse;

pub use crate::block::LineBlock;
pub use crate::delta::*;
pub use crate::document::*;
pub use crate::error::*;
pub use crate::registry::*;
pub use crate::tree::*;
pub use crate::value::*;
pub use crate::verse::*;
