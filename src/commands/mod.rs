//! Command implementations behind the CLI.
//!
//! Each command drives one or more [`Packager`](crate::packager::Packager)
//! sessions and prints a one-line outcome per package.

mod auto_upgrade;
mod check;
mod install;
mod list;
mod package;
pub mod services;
mod uninstall;

pub use auto_upgrade::auto_upgrade;
pub use check::check;
pub use install::install;
pub use list::{installed_packages, list};
pub use package::package;
pub use uninstall::uninstall;
