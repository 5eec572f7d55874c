//! Mathematical utilities and decisions.

mod coord;
pub use coord::*;

mod cube;
pub use cube::Cube;

mod grid_aab;
pub use grid_aab::{GridAab, GridIter};
