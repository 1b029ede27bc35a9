// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./promptd.toml` > `~/.config/promptd/promptd.toml` >
//! `/etc/promptd/promptd.toml`, with environment variable overrides via `PROMPTD_`.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::PromptdConfig;

const SYSTEM_CONFIG: &str = "/etc/promptd/promptd.toml";
const LOCAL_CONFIG: &str = "promptd.toml";

/// Config files consulted by [`load_config`], lowest priority first.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("promptd/promptd.toml"));
    }
    paths.push(PathBuf::from(LOCAL_CONFIG));
    paths
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/promptd/promptd.toml`
/// 3. `~/.config/promptd/promptd.toml`
/// 4. `./promptd.toml`
/// 5. `PROMPTD_*` environment variables
pub fn load_config() -> Result<PromptdConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<PromptdConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PromptdConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<PromptdConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PromptdConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the layered Figment before extraction.
pub fn build_figment() -> Figment {
    search_paths().into_iter().fold(
        Figment::new().merge(Serialized::defaults(PromptdConfig::default())),
        |figment, path| figment.merge(Toml::file(path)),
    )
    .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// `Env::split("_")` would turn `PROMPTD_BACKEND_BASE_URL` into
/// `backend.base.url`; only the first underscore after the section name is a
/// separator.
fn env_provider() -> Env {
    Env::prefixed("PROMPTD_").map(|key| {
        let key_str = key.as_str();
        ["daemon", "server", "backend", "storage", "metrics"]
            .iter()
            .find_map(|section| {
                key_str
                    .strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or_else(|| key_str.to_string())
            .into()
    })
}
