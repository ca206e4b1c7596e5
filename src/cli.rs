//
// cli.rs
// Ceph-Tools-rs
//
// Defines the CLI surface with Clap and dispatches commands to the conversion, assembly and indexing modules.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::Level;

use crate::cephalogram::CephalogramImage;
use crate::config::{sidecar_path, CephalogramConfig, FiducialConfig};
use crate::dicomdir::{FileSetDirectoryBuilder, DICOMDIR_NAME};
use crate::encapsulated::DEFAULT_FRAGMENT_LIMIT;
use crate::fiducial::{FiducialSet, ReferenceCount};
use crate::models::{FiducialReport, InstanceReport, ScanReport, StudySetReport};
use crate::output::{write_cephalogram, StudySetWriter, WriteOptions};
use crate::storage::OutputLayout;
use crate::study::{AssemblyPolicy, StudySetAssembler};
use crate::uid::IdentifierHierarchy;

/// Command-line interface glue code: defines the available verbs and dispatches to modules.
#[derive(Parser)]
#[command(name = "ceph-tools")]
#[command(about = "Builds DICOM cephalogram sets with fiducials and a DICOMDIR", long_about = None)]
pub struct Cli {
    /// Print reports as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert one cephalogram image into a DX for-processing file
    Convert {
        image: PathBuf,
        /// Properties file (defaults to <image stem>.properties next to the image)
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_FRAGMENT_LIMIT)]
        fragment_limit: u32,
    },
    /// Reconstruct fiducial coordinates from a properties file
    Fiducials { config: PathBuf },
    /// Assemble a lateral/frontal pair and a fiducial set into one study
    Set {
        /// First image; a single-reference fiducial set calibrates this one
        image_a: PathBuf,
        image_b: PathBuf,
        #[arg(short, long)]
        fiducials: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        config_a: Option<PathBuf>,
        #[arg(long)]
        config_b: Option<PathBuf>,
        /// Put both images and the fiducial set in a single series
        #[arg(long)]
        shared_series: bool,
        #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=2))]
        fiducial_references: u8,
        #[arg(long)]
        no_dicomdir: bool,
        #[arg(long)]
        file_set_id: Option<String>,
        #[arg(long, default_value_t = DEFAULT_FRAGMENT_LIMIT)]
        fragment_limit: u32,
    },
    /// Index every DICOM file below a directory into a DICOMDIR
    Dicomdir {
        root: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        file_set_id: Option<String>,
    },
}

impl Cli {
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Convert {
            image,
            config,
            output,
            fragment_limit,
        } => {
            let mut ceph = load_image(&image, config.as_deref())?;
            IdentifierHierarchy::default().assign_standalone(&mut ceph);
            let output = output.unwrap_or_else(|| image.with_extension("dcm"));
            let options = WriteOptions {
                fragment_limit,
                ..Default::default()
            };
            let summary = write_cephalogram(&ceph, &output, &options)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            print_report(&InstanceReport::new(&ceph, &output, Some(summary)), json)?;
        }
        Commands::Fiducials { config } => {
            let set = load_fiducials(&config)?;
            print_report(&FiducialReport::from(&set), json)?;
        }
        Commands::Set {
            image_a,
            image_b,
            fiducials,
            output,
            config_a,
            config_b,
            shared_series,
            fiducial_references,
            no_dicomdir,
            file_set_id,
            fragment_limit,
        } => {
            let Some(fiducial_reference_count) = ReferenceCount::from_count(fiducial_references.into()) else {
                bail!("--fiducial-references must be 1 or 2");
            };
            let a = load_image(&image_a, config_a.as_deref())?;
            let b = load_image(&image_b, config_b.as_deref())?;
            let fiducials = load_fiducials(&fiducials)?;

            let policy = AssemblyPolicy {
                shared_series,
                fiducial_reference_count,
            };
            let set = StudySetAssembler::new(policy)
                .assemble(a, b, fiducials)
                .context("Failed to assemble cephalogram set")?;

            let layout = OutputLayout::new(&output)?;
            let options = WriteOptions {
                fragment_limit,
                write_dicomdir: !no_dicomdir,
                file_set_id,
                cancel: None,
            };
            let written = StudySetWriter::new(layout, options)
                .write(set)
                .with_context(|| format!("Failed to write set into {}", output.display()))?;
            print_report(&StudySetReport::from(&written), json)?;
        }
        Commands::Dicomdir {
            root,
            output,
            file_set_id,
        } => {
            let mut builder = FileSetDirectoryBuilder::new(&root)
                .with_context(|| format!("Invalid file-set root {}", root.display()))?;
            if let Some(id) = file_set_id {
                builder = builder.with_file_set_id(id);
            }
            builder.add_instance(&root)?;
            if builder.instance_count() == 0 {
                bail!("No DICOM instances found under {}", root.display());
            }
            let output = output.unwrap_or_else(|| root.join(DICOMDIR_NAME));
            builder
                .write(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            print_report(&ScanReport::new(&builder, &output), json)?;
        }
    }

    Ok(())
}

fn load_image(image: &Path, config: Option<&Path>) -> anyhow::Result<CephalogramImage> {
    let config = config.map_or_else(|| sidecar_path(image), Path::to_path_buf);
    let settings = CephalogramConfig::load(&config)
        .with_context(|| format!("Failed to load settings for {}", image.display()))?;
    let ceph = settings
        .into_image(image)
        .with_context(|| format!("Failed to read image {}", image.display()))?;
    Ok(ceph)
}

fn load_fiducials(config: &Path) -> anyhow::Result<FiducialSet> {
    let settings = FiducialConfig::load(config)?;
    let set = settings
        .into_fiducial_set()
        .with_context(|| format!("Invalid fiducial geometry in {}", config.display()))?;
    Ok(set)
}

fn print_report<T: Serialize + std::fmt::Display>(report: &T, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}
