//! QR decompositions.
//!
//! [`tiled`] factorizes a matrix tile by tile, with the tile kernels scheduled as a task graph.

pub mod tiled;
