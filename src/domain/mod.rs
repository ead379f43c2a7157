pub mod battery;
pub mod generation;
pub mod grid;
pub mod load;
pub mod types;

pub use battery::*;
pub use generation::*;
pub use grid::*;
pub use load::*;
pub use types::*;
