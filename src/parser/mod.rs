//! Manifest parser (verb module)
//!
//! Transforms YAML into a `SemanticManifest`, and optionally straight into a validated
//! `SemanticModel`.

use std::path::Path;

use thiserror::Error;

use crate::semantic_model::{ModelError, SemanticManifest, SemanticModel};

/// Errors that can occur while loading a manifest
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Parse a manifest from a YAML file
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<SemanticManifest, ParseError> {
    let path_str = path.as_ref().display().to_string();
    let contents = std::fs::read_to_string(&path).map_err(|e| ParseError::Io {
        path: path_str,
        source: e,
    })?;
    parse_str(&contents)
}

/// Parse a manifest from a YAML string
pub fn parse_str(yaml: &str) -> Result<SemanticManifest, ParseError> {
    serde_yaml::from_str(yaml).map_err(ParseError::from)
}

/// Parse and validate a model from a YAML file
pub fn load_model_file<P: AsRef<Path>>(path: P) -> Result<SemanticModel, ParseError> {
    Ok(SemanticModel::try_new(parse_file(path)?)?)
}

/// Parse and validate a model from a YAML string
pub fn load_model_str(yaml: &str) -> Result<SemanticModel, ParseError> {
    Ok(SemanticModel::try_new(parse_str(yaml)?)?)
}
