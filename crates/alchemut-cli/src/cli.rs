use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "Alchemut CLI - Prepares and validates hybrid systems for relative free-energy calculations of protein point mutations.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build hybrid systems for a single point mutation, with and without a bound ligand.
    Mutate(MutateArgs),
}

/// Arguments for the `mutate` subcommand.
#[derive(Args, Debug)]
pub struct MutateArgs {
    // --- Inputs and outputs ---
    /// Path to the biomolecule structure (.pdb or .cif).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub protein: PathBuf,

    /// Path to a bound small molecule (.pdb, .cif or .sdf); enables the complex phase.
    #[arg(short, long, value_name = "PATH")]
    pub ligand: Option<PathBuf>,

    /// Zero-based entry of a multi-structure SDF ligand file.
    #[arg(long, value_name = "INT", default_value_t = 0)]
    pub ligand_index: usize,

    /// Residue name given to an SDF ligand.
    #[arg(long, value_name = "NAME", default_value = "MOL")]
    pub ligand_name: String,

    /// Path to the configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory receiving the endpoint structures and the run summary.
    #[arg(short, long, required = true, value_name = "DIR")]
    pub output: PathBuf,

    // --- Mutation overrides ---
    /// Chain identifier of the residue to mutate.
    #[arg(long, value_name = "ID")]
    pub chain: Option<String>,

    /// Residue number (with optional insertion code) of the residue to mutate.
    #[arg(long, value_name = "ID")]
    pub residue: Option<String>,

    /// Three-letter code of the residue to mutate into.
    #[arg(short, long, value_name = "RES")]
    pub target: Option<String>,

    /// Rename the residue before parametrization (e.g. HIS to HID).
    #[arg(long, value_name = "RES")]
    pub old_residue: Option<String>,

    // --- Pipeline overrides ---
    /// Force-field file; may be given several times and replaces the configured list.
    #[arg(long = "forcefield", value_name = "PATH")]
    pub forcefield_files: Vec<PathBuf>,

    /// Solvent box shape: cube, octahedron or dodecahedron.
    #[arg(long, value_name = "SHAPE")]
    pub box_shape: Option<String>,

    /// Seed of the geometry proposal.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Skip endstate validation of the built hybrid systems.
    #[arg(long)]
    pub no_validation: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S hybrid.w-lifting=0.4
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}
