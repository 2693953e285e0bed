pub mod geometry;
pub mod io;
pub mod optimizer;
pub mod params;
pub mod projection;
pub mod site;
pub mod system;
