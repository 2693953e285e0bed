//! Reading and writing site files.

pub mod site_file;

pub use site_file::{load_site, save_site};
