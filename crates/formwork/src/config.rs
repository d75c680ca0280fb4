//! # Configuration
//!
//! Naming conventions shared by every form type, loaded with [`confique`].
//!
//! ## Sources
//!
//! Settings are resolved in priority order:
//! 1. **Environment variables**: `FORMWORK_IDENTITY_KEY`, `FORMWORK_DESTROY_KEY`, ...
//! 2. **TOML file**: whatever path the application passes to [`FormConfig::load`].
//! 3. **Compiled defaults**: built-in fallbacks via `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `identity_key` | `id` | Identity field inside nested submissions |
//! | `destroy_key` | `_destroy` | Destroy flag inside nested submissions |
//! | `nested_attributes_suffix` | `_attributes` | Suffix of bulk-assignment keys for collections |
//! | `nested_error_paths` | `collection` | Prefix of child errors: the collection name or the member name |

use crate::error::ConfigurationError;
use confique::Config;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How child form errors are namespaced on the parent.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NestedErrorPaths {
    /// `rooms.room_name`
    #[default]
    Collection,
    /// `<child identity key>.room_name`, e.g. `room.room_name`
    Member,
}

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FormConfig {
    #[config(default = "id", env = "FORMWORK_IDENTITY_KEY")]
    pub identity_key: String,

    #[config(default = "_destroy", env = "FORMWORK_DESTROY_KEY")]
    pub destroy_key: String,

    #[config(default = "_attributes", env = "FORMWORK_NESTED_ATTRIBUTES_SUFFIX")]
    pub nested_attributes_suffix: String,

    #[config(default = "collection", env = "FORMWORK_NESTED_ERROR_PATHS")]
    pub nested_error_paths: NestedErrorPaths,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            identity_key: "id".to_string(),
            destroy_key: "_destroy".to_string(),
            nested_attributes_suffix: "_attributes".to_string(),
            nested_error_paths: NestedErrorPaths::Collection,
        }
    }
}

impl FormConfig {
    /// Load from the environment and, when given, a TOML file.
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = FormConfig::builder().env();
        if let Some(path) = path {
            builder = builder.file(path);
        }
        builder
            .load()
            .map_err(|err| ConfigurationError::Load(err.to_string()))
    }

    /// The bulk-assignment key for a collection, e.g. `rooms_attributes`.
    pub fn nested_attributes_key(&self, collection: &str) -> String {
        format!("{collection}{}", self.nested_attributes_suffix)
    }
}
