use clap::{Parser, Subcommand};
use lattice_core::LatticeType;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lattice")]
#[command(version, about = "Classify planar lattices and derive reciprocal-space data")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log at debug level
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Engine configuration file (JSON)
    #[arg(long, global = true, env = "LATTICE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify the lattice spanned by two in-plane vectors
    Classify {
        #[command(flatten)]
        basis: PlanarBasis,
    },

    /// Check two in-plane vectors against an expected lattice family
    Validate {
        #[command(flatten)]
        basis: PlanarBasis,

        /// Expected family (quadratic, rectangular, triangular, rhombic, oblique, custom)
        #[arg(long)]
        expect: LatticeType,

        /// Print a corrected vector pair when validation fails
        #[arg(long)]
        suggest: bool,
    },

    /// Derive reciprocal vectors and transformation matrices
    Reciprocal {
        #[command(flatten)]
        basis: PlanarBasis,

        /// Per-axis basis scaling
        #[arg(
            long,
            num_args = 3,
            value_names = ["SX", "SY", "SZ"],
            default_values_t = vec![1.0, 1.0, 1.0]
        )]
        size: Vec<f64>,
    },

    /// Store a lattice, embed it in a project and synchronize an edit
    Demo {
        /// SQLite database path (in-memory when omitted)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Report drift between lattice back-references and scenes
    Reconcile {
        /// SQLite database path
        #[arg(long)]
        db: PathBuf,

        /// Remove stale back-references after reporting
        #[arg(long)]
        prune: bool,
    },
}

#[derive(clap::Args, Clone, Copy)]
pub struct PlanarBasis {
    #[arg(allow_negative_numbers = true)]
    pub a1x: f64,
    #[arg(allow_negative_numbers = true)]
    pub a1y: f64,
    #[arg(allow_negative_numbers = true)]
    pub a2x: f64,
    #[arg(allow_negative_numbers = true)]
    pub a2y: f64,
}
