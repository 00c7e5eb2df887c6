//! Command implementations for the CLI.

mod info;
mod intensity;
mod power;
mod rename;
mod scan;

pub use info::cmd_info;
pub use intensity::cmd_intensity;
pub use power::cmd_power;
pub use rename::cmd_rename;
pub use scan::cmd_scan;
