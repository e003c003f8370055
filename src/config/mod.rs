//! Project and profile configuration.
//!
//! A toolkit root holds `projects/<project>/config/project.toml` and one
//! directory per profile with the classifier settings (`nn.toml`, `mlp.toml`)
//! and the trained model files.

mod defaults;
mod errors;
mod reader;
mod types;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

pub use errors::ConfigError;
pub use reader::ConfigReader;
pub use types::{
    ClusterStop, DistanceMetric, FileMode, Linkage, MlpSettings, NnSettings, NumShapes,
    PipelineSettings, ProjectSettings, PrototypeSelection, ResamplingAllocation,
};

/// Filename of the project-wide settings.
pub const PROJECT_CONFIG_FILE_NAME: &str = "project.toml";
/// Filename of the nearest-neighbor classifier settings.
pub const NN_CONFIG_FILE_NAME: &str = "nn.toml";
/// Filename of the MLP classifier settings.
pub const MLP_CONFIG_FILE_NAME: &str = "mlp.toml";

/// `<root>/projects/<project>/config`.
pub fn project_config_dir(root: &Path, project: &str) -> PathBuf {
    root.join("projects").join(project).join("config")
}

/// `<root>/projects/<project>/config/<profile>`.
pub fn profile_dir(root: &Path, project: &str, profile: &str) -> PathBuf {
    project_config_dir(root, project).join(profile)
}

/// Load and validate `project.toml`.
pub fn load_project_settings(root: &Path, project: &str) -> Result<ProjectSettings, ConfigError> {
    let path = project_config_dir(root, project).join(PROJECT_CONFIG_FILE_NAME);
    let settings: ProjectSettings = ConfigReader::from_path(&path)?.settings()?;
    settings.validate()?;
    Ok(settings)
}

/// Load and validate a profile's `nn.toml`, returning the reader for collaborator lookups.
pub fn load_nn_settings(profile: &Path) -> Result<(ConfigReader, NnSettings), ConfigError> {
    let reader = ConfigReader::from_path(&profile.join(NN_CONFIG_FILE_NAME))?;
    let settings: NnSettings = reader.settings()?;
    settings.validate()?;
    Ok((reader, settings))
}

/// Load and validate a profile's `mlp.toml`, returning the reader for collaborator lookups.
pub fn load_mlp_settings(profile: &Path) -> Result<(ConfigReader, MlpSettings), ConfigError> {
    let reader = ConfigReader::from_path(&profile.join(MLP_CONFIG_FILE_NAME))?;
    let settings: MlpSettings = reader.settings()?;
    settings.validate()?;
    Ok((reader, settings))
}
