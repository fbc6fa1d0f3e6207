//! Command-line driver for material flow simulations.
//!
//! The kernel is input-format agnostic; this binary wires up a built-in
//! source/sink scenario from command-line parameters and streams the
//! recorded output as JSON lines.

use clap::Parser;

mod io;
pub use io::*;

mod scenario;
pub use scenario::*;

// The top-level arguments -- presently just which subcommand to execute
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct BaseArgs {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the built-in source/sink scenario and emit the datum stream
    Run {
        #[command(flatten)]
        scenario: ScenarioArgs,
        #[command(flatten)]
        io: IoArgs,
    },
}

impl BaseArgs {
    pub fn evaluate(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Run { scenario, io } => {
                let output = io.write()?;
                let mut sim = scenario.build(output)?;
                sim.run()?;
            }
        }
        Ok(())
    }
}
