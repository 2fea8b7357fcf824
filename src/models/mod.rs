pub mod chunk;
pub mod document;
pub mod result;
pub mod token;
pub mod turn;

pub use chunk::*;
pub use document::*;
pub use result::*;
pub use token::*;
pub use turn::*;
