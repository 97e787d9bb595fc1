//! Entry points for loading a [`PulseConfig`].

use std::path::{Path, PathBuf};

use config::File;
use config::ConfigError;
use tracing::debug;

use crate::config::merge::merge_policy::builder_with_defaults;
use crate::config::sources::{env, global_file, workspace_file};
use crate::config::PulseConfig;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load every layer for a workspace: defaults, user file, workspace
    /// files, then environment.
    pub fn load(workspace_root: &Path) -> Result<PulseConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = env::add_to_builder(builder);
        let config: PulseConfig = builder.build()?.try_deserialize()?;
        debug!(workspace_root = %workspace_root.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load a single file on top of the defaults.
    pub fn load_from_file(path: &Path) -> Result<PulseConfig, ConfigError> {
        builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()))
            .build()?
            .try_deserialize()
    }

    /// Load from `explicit` when given, otherwise the workspace layers.
    pub fn resolve(
        workspace_root: &Path,
        explicit: Option<&Path>,
    ) -> Result<PulseConfig, ConfigError> {
        match explicit {
            Some(path) => Self::load_from_file(path),
            None => Self::load(workspace_root),
        }
    }

    pub fn xdg_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
