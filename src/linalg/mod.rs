//! Linear algebra module.
//!
//! Contains the Householder primitives, the tile kernels built on them, and the tiled QR
//! factorization.
//!
//! # Memory allocation
//! Kernels never allocate. The temporary space they need for intermediate computations is taken
//! from a [`stack: PodStack`](dyn_stack::PodStack) parameter, a thin wrapper over a slice of
//! memory bytes. The functions taking a [`PodStack`](dyn_stack::PodStack) parameter have a
//! corresponding function with a similar name ending in `_req` that returns the memory
//! requirements of the algorithm. For example:
//! [`householder::apply_block_householder_on_the_left_in_place`] and
//! [`householder::apply_block_householder_on_the_left_in_place_req`].
//!
//! Requirements can be combined with [`dyn_stack::StackReq::try_all_of`] and
//! [`dyn_stack::StackReq::try_any_of`]. The scheduler allocates one
//! [`dyn_stack::GlobalPodBuffer`] per worker, sized by [`kernels::scratch_req`], and reuses it
//! for every task the worker runs.

pub mod householder;
pub mod kernels;
pub mod qr;
