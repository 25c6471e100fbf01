//! Package records
//!
//! Version metadata persisted per package, and the entry points a package exports.

mod entry_points;
mod meta;

pub use entry_points::{
    entry_points_path, load_list, parse_console_scripts, removed_entry_points_path, save_list,
    wheel_entry_points,
};
pub use meta::{MetaRole, MetaSource, PackagerInfo, VersionMeta, now_epoch};
