//! Process environment setup.

use std::path::{Path, PathBuf};

/// Variables pointing model downloaders at the local model store.
pub const MODEL_CACHE_VARS: [&str; 2] = ["HF_HOME", "MODELSCOPE_CACHE"];

/// Model store directory, relative to the process root.
pub const MODELS_DIR: &str = "models";

/// Redirect model caches to `<root>/models`.
///
/// Must run before any other thread exists: environment mutation is not
/// thread-safe.
pub fn redirect_model_caches(root: &Path) -> PathBuf {
    let models = root.join(MODELS_DIR);
    for var in MODEL_CACHE_VARS {
        std::env::set_var(var, &models);
    }
    models
}
