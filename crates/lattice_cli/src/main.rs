//! Command-line front end for the lattice engine.
//!
//! # Responsibility
//! - Expose classification, validation and reciprocal derivation on raw vectors.
//! - Drive the document store and scene synchronizer against a SQLite file.
//!
//! # Invariants
//! - Errors are printed once and mapped to a non-zero exit code.

use clap::Parser;
use lattice_core::logging::LoggingError;
use lattice_core::{
    classify, default_log_level, init_stderr_logging, open_db, open_db_in_memory,
    suggest_corrections, validate, ConfigError, DbError, EngineConfig, LatticeDraft,
    LatticePatch, MeepLattice, ProjectDraft, ReciprocalCalculator, SqliteStorage, StorageError,
    Vec3, Workspace,
};
use log::info;
use nalgebra::{Matrix3, Vector3};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::process::ExitCode;

mod cli;

use cli::{Cli, Commands, PlanarBasis};

#[derive(Debug)]
enum CliError {
    Config(ConfigError),
    Logging(LoggingError),
    Db(DbError),
    Storage(StorageError),
    Geometry(lattice_core::GeometryError),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Logging(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Geometry(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LoggingError> for CliError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<StorageError> for CliError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<lattice_core::GeometryError> for CliError {
    fn from(value: lattice_core::GeometryError) -> Self {
        Self::Geometry(value)
    }
}

type CliResult<T> = Result<T, CliError>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or(default_log_level())
    };
    init_stderr_logging(level)?;

    match cli.command {
        Commands::Classify { basis } => run_classify(&config, basis),
        Commands::Validate {
            basis,
            expect,
            suggest,
        } => run_validate(&config, basis, expect, suggest),
        Commands::Reciprocal { basis, size } => run_reciprocal(&config, basis, &size),
        Commands::Demo { db } => run_demo(&config, db.as_deref()),
        Commands::Reconcile { db, prune } => run_reconcile(&config, &db, prune),
    }
}

fn planar(basis: PlanarBasis) -> (Vector3<f64>, Vector3<f64>) {
    (
        Vector3::new(basis.a1x, basis.a1y, 0.0),
        Vector3::new(basis.a2x, basis.a2y, 0.0),
    )
}

fn run_classify(config: &EngineConfig, basis: PlanarBasis) -> CliResult<()> {
    let (a1, a2) = planar(basis);
    let result = classify(&a1, &a2, &config.tolerances);
    println!("type={} confidence={:.2}", result.lattice_type, result.confidence);
    println!("description={}", result.lattice_type.description());
    if let Some(m) = result.measurements {
        println!(
            "a={:.6} b={:.6} alpha={:.4} ratio={:.6}",
            m.length_a, m.length_b, m.angle_deg, m.length_ratio
        );
    }
    Ok(())
}

fn run_validate(
    config: &EngineConfig,
    basis: PlanarBasis,
    expect: lattice_core::LatticeType,
    suggest: bool,
) -> CliResult<()> {
    let (a1, a2) = planar(basis);
    let report = validate(&a1, &a2, expect, &config.tolerances);
    if report.is_valid() {
        println!("valid type={expect}");
        return Ok(());
    }
    println!("invalid type={expect}");
    for violation in &report.violations {
        println!("  - {violation}");
    }
    if suggest {
        let (v1, v2) = suggest_corrections(&a1, &a2, expect, &config.tolerances);
        println!(
            "suggested a1=({:.6}, {:.6}) a2=({:.6}, {:.6})",
            v1.x, v1.y, v2.x, v2.y
        );
    }
    Ok(())
}

fn run_reciprocal(config: &EngineConfig, basis: PlanarBasis, size: &[f64]) -> CliResult<()> {
    let (a1, a2) = planar(basis);
    let scale = match size {
        [sx, sy, sz] => Vector3::new(*sx, *sy, *sz),
        _ => Vector3::new(1.0, 1.0, 1.0),
    };
    let result = ReciprocalCalculator::new(config).compute(&a1, &a2, None, &scale)?;
    println!("planar={}", result.is_2d);
    for (label, b) in ["b1", "b2", "b3"].iter().zip(result.reciprocal.iter()) {
        println!("{label}=({:.6}, {:.6}, {:.6})", b.x, b.y, b.z);
    }
    print_matrix("MA", &result.transforms.ma);
    print_matrix("MB", &result.transforms.mb);
    print_matrix("realToReciprocal", &result.transforms.real_to_reciprocal);
    Ok(())
}

fn print_matrix(name: &str, matrix: &Matrix3<f64>) {
    println!("{name}:");
    for row in matrix.row_iter() {
        println!("  [{:>10.6} {:>10.6} {:>10.6}]", row[0], row[1], row[2]);
    }
}

fn run_demo(config: &EngineConfig, db: Option<&std::path::Path>) -> CliResult<()> {
    let conn = match db {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    let workspace = Workspace::new(SqliteStorage::new(&conn), config);

    let lattice = workspace.create_lattice(LatticeDraft {
        title: Some("Hexagonal".to_string()),
        meep_lattice: Some(MeepLattice::new(
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.5, 3.0_f64.sqrt() / 2.0, 0.0),
            Vec3::unit_z(),
            Vec3::ones(),
        )),
        ..LatticeDraft::default()
    })?;
    println!(
        "created lattice {} type={} a={:.4} alpha={:.2}",
        lattice.document_id,
        lattice.lattice_type,
        lattice.parameters.a,
        lattice.parameters.alpha
    );

    let project = workspace.create_project(ProjectDraft {
        title: Some("Photonic crystal".to_string()),
        ..ProjectDraft::default()
    })?;
    workspace.embed_lattice(project.document_id, lattice.document_id, "lattice-1")?;

    let updated = workspace.update_lattice(
        lattice.document_id,
        LatticePatch {
            basis_size: Some(Vec3::new(2.0, 2.0, 1.0)),
            ..LatticePatch::default()
        },
    )?;
    if let Some(updated) = &updated {
        println!(
            "updated lattice a={:.4} pending_sync={}",
            updated.parameters.a,
            workspace.pending_sync_tasks()
        );
    }

    for outcome in workspace.run_pending()? {
        info!("event=demo_sync module=cli status=ok outcome={outcome:?}");
        println!("sync {outcome:?}");
    }

    let synced = workspace.project(project.document_id)?;
    for element in synced.scene.lattice_elements() {
        println!(
            "element {} basis1=({:.4}, {:.4}) basis2=({:.4}, {:.4})",
            element.id, element.basis1.x, element.basis1.y, element.basis2.x, element.basis2.y
        );
    }

    let report = workspace.store().reconcile()?;
    println!("consistent={}", report.is_consistent());
    Ok(())
}

fn run_reconcile(config: &EngineConfig, db: &std::path::Path, prune: bool) -> CliResult<()> {
    let conn = open_db(db)?;
    let workspace = Workspace::new(SqliteStorage::new(&conn), config);
    let store = workspace.store();
    let report = store.reconcile()?;

    for dangling in &report.dangling {
        println!(
            "dangling project={} element={} lattice={}",
            dangling.project_id, dangling.element_id, dangling.lattice_id
        );
    }
    for link in &report.missing_links {
        println!("missing_link lattice={} project={}", link.lattice_id, link.project_id);
    }
    for link in &report.stale_links {
        println!("stale_link lattice={} project={}", link.lattice_id, link.project_id);
    }
    println!("consistent={}", report.is_consistent());

    if prune {
        let pruned = store.prune_stale_links()?;
        println!("pruned={pruned}");
    }
    Ok(())
}
