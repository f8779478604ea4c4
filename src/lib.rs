pub mod aggregate;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod geo;
pub mod geometry;
pub mod layout;
pub mod pipeline;
pub mod sink;
pub mod taxonomy;
pub mod tree;

#[cfg(feature = "cli")]
pub use cli::run;
pub use error::{BuildError, LayoutError};
pub use pipeline::{BuildOptions, BuildReport, build, build_with};
