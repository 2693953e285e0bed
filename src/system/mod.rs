//! Live site sharing and background optimization.
//!
//! The UI side owns a [`SharedSite`] and an [`OptimizerHandle`]. A run works
//! on a private snapshot and periodically copies accepted parameters into
//! the live site under the write lock.

mod optimizer_handle;
pub mod shared_state;

pub use optimizer_handle::OptimizerHandle;
pub use shared_state::{RunFlags, SharedSite, shared_site};
