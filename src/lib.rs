pub mod cleanup;
pub mod commands;
pub mod config;
pub mod delivery;
pub mod http;
pub mod index;
pub mod lock;
pub mod package;
pub mod packager;
pub mod process;
pub mod runtime;
