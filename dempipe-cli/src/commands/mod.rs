//! CLI subcommands.

pub mod common;
pub mod graph;
pub mod init;
pub mod run;
