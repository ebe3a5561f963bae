//! Core logic and data model of cfbs, the CFEngine Build System.
//!
//! This crate defines the project file (`cfbs.json`), modules, the module
//! index, build step grammar, validation and the JSON style cfbs writes.

pub mod constants;
pub mod error;
pub mod http;
pub mod index;
pub mod input;
pub mod json;
pub mod module;
pub mod pretty;
pub mod project;
pub mod settings;
pub mod step;
pub mod validate;

pub use error::CfbsError;
pub use index::{Index, IndexSpec, VersionIndex};
pub use module::{Module, ModuleRef};
pub use project::{AddReport, CfbsJson, Project, SearchIn};
pub use settings::Settings;
pub use step::{BuildStep, StepKind};
