pub mod args;

use clap::Parser;
pub use args::{Accuracy, Arguments, BasecallArgs, Commands, Device, FilterArgs, GType, RemoraArgs};

pub fn parse() -> Arguments {
    Arguments::parse()
}
