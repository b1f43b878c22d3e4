// CLI module
// Command-line interface and argument parsing

mod args;

pub use args::{CliArgs, GatewayKind};

use clap::Parser;

/// Parse command-line arguments using clap
///
/// On invalid arguments, a missing required argument or `--help`, clap
/// prints the message itself and exits the process.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
