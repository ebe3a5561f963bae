//! One module per `cfbs` subcommand.

pub mod add;
pub mod build;
pub mod clean;
pub mod info;
pub mod init;
pub mod input;
pub mod pretty;
pub mod remove;
pub mod search;
pub mod status;
pub mod update;
pub mod validate;
