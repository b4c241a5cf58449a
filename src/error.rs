use std::io;
use thiserror::Error;

use crate::plan::PhaseResult;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Unknown test suite kind: {name}")]
    UnknownSuiteKind { name: String },

    #[error("Environment phase failed for module '{module}', aborting run")]
    EnvironmentPhase {
        module: String,
        results: Vec<PhaseResult>,
    },

    #[error("Report generation failed: {0}")]
    ReportError(String),
}

pub type Result<T> = std::result::Result<T, ForgeError>;
