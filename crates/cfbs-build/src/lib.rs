//! Downloading modules and running their build steps.

pub mod download;
pub mod fetch;
pub mod fsutil;
pub mod process;
pub mod steps;

pub use download::{download_dependencies, DownloadOptions, StagedModule};
pub use steps::{init_out_folder, perform_build};
