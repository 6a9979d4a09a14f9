//! Priority-weighted pool aggregation.
//!
//! A [`Splitter`] presents several backend pools as a single `CloudPool`:
//! a desired size set on the splitter is divided among the children
//! according to their configured priorities, and observations are the union
//! of the children's observations. Typical use is spreading one logical
//! pool across availability zones or providers.

mod distribution;
mod splitter;

pub use distribution::calculate_distribution;
pub use splitter::{ChildPool, Splitter, SplitterSettings};
