//
// lib.rs
// Ceph-Tools-rs
//
// Exposes the crate's modules and re-exports the CLI entry point for both binary and library consumers.
//
// Thales Matheus Mendonça Santos - November 2025

// Core model and algorithms
pub mod cephalogram;
pub mod fiducial;
pub mod geometry;
pub mod study;
pub mod uid;

// DICOM encoding and file-set output
pub mod codes;
pub mod dataset;
pub mod dicom_access;
pub mod dicomdir;
pub mod encapsulated;
pub mod metadata;
pub mod output;
pub mod storage;
pub mod stream;

// Ambient plumbing
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;

pub use cli::{run as run_cli, Cli, Commands};
pub use error::{CephError, Result};
