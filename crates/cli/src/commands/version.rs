//! The `version` command - shows version information.

use appfuse::ProtocolVersion;
use clap::Args;

#[derive(Args)]
pub struct VersionArgs {}

pub fn run(_args: VersionArgs) {
    println!("appfuse {}", env!("CARGO_PKG_VERSION"));
    println!("FUSE protocol {}", ProtocolVersion::CURRENT);
}
