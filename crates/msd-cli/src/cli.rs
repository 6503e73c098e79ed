use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    name = "msd",
    version,
    about = "msd - Metropolis Monte Carlo simulations of multilayer molecular spintronic devices.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel sweeps.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Equilibrate a device, then measure it with recording and print a summary.
    Run(RunArgs),
    /// Run independent chains over a range of one parameter, in parallel.
    Sweep(SweepArgs),
    /// Compile or inspect molecule description files.
    Molecule(MoleculeArgs),
    /// Serve the line protocol on stdin/stdout for a controlling process.
    Worker,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path to the run configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Override `simulation.steps`, the number of measured Metropolis steps.
    #[arg(short = 'n', long, value_name = "INT")]
    pub steps: Option<u64>,

    /// Override `simulation.burn-in`, the number of unrecorded equilibration steps.
    #[arg(short, long, value_name = "INT")]
    pub burn_in: Option<u64>,

    /// Override `simulation.record-frequency`, the steps between recorded samples.
    #[arg(short, long, value_name = "INT")]
    pub freq: Option<u64>,

    /// Override `simulation.seed`.
    #[arg(short, long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Print the summary as JSON instead of a table.
    #[arg(long)]
    pub json: bool,

    /// Set a specific configuration value, overriding the config file and flags.
    /// Can be used multiple times. Example: -S parameters.kT=0.5
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `sweep` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct SweepArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Override `sweep.slots`, the number of chains run at once.
    #[arg(long, value_name = "INT")]
    pub slots: Option<usize>,
}

/// Arguments for the `molecule` subcommand.
#[derive(Args, Debug)]
pub struct MoleculeArgs {
    #[command(subcommand)]
    pub command: MoleculeCommands,
}

#[derive(Subcommand, Debug)]
pub enum MoleculeCommands {
    /// Compile a TOML molecule description into the binary format.
    Compile {
        /// The TOML description to read.
        #[arg(required = true, value_name = "PATH")]
        input: PathBuf,
        /// Where to write the binary molecule.
        #[arg(short, long, required = true, value_name = "PATH")]
        output: PathBuf,
    },
    /// Print a molecule file of either format as a TOML description.
    Show {
        #[arg(required = true, value_name = "PATH")]
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_overrides_and_repeated_sets() {
        let cli = Cli::parse_from([
            "msd", "-vv", "run", "-c", "device.toml", "--steps", "500", "--seed", "7", "-S",
            "parameters.kT=0.5", "-S", "geometry.width=9",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config, PathBuf::from("device.toml"));
        assert_eq!(args.steps, Some(500));
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.set_values, ["parameters.kT=0.5", "geometry.width=9"]);
    }

    #[test]
    fn sweep_flattens_run_arguments() {
        let cli = Cli::parse_from(["msd", "sweep", "-c", "device.toml", "--slots", "3", "-f", "10"]);
        let Commands::Sweep(args) = cli.command else {
            panic!("expected sweep");
        };
        assert_eq!(args.slots, Some(3));
        assert_eq!(args.run.freq, Some(10));
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["msd", "-q", "-v", "worker"]).is_err());
    }
}
