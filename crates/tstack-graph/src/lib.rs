//! Computation graph and the Zipper rewrite pass.
//!
//! - `Bubble`: operator descriptor carried by each node
//! - `Graph`: arena of immutable nodes addressed by `NodeId`
//! - `Zipper`: memoized bottom-up rewriting driven by `ZipperOption`s

pub mod bubble;
pub mod graph;
pub mod options;
pub mod zipper;

pub use bubble::Bubble;
pub use graph::{Graph, Node, NodeId};
pub use options::{default_options, Conv2dWinogradOption};
pub use zipper::{ZipStats, Zipper, ZipperOption};
