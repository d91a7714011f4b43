// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./engram.toml` > `~/.config/engram/engram.toml`
//! > `/etc/engram/engram.toml` with environment overrides via the
//! `ENGRAM_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::EngramConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/engram/engram.toml` (system-wide)
/// 3. `~/.config/engram/engram.toml` (user XDG config)
/// 4. `./engram.toml` (local directory)
/// 5. `ENGRAM_*` environment variables
pub fn load_config() -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::file("/etc/engram/engram.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("engram/engram.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("engram.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `ENGRAM_CACHE_TTL_SECS` must map to
/// `cache.ttl_secs`, not `cache.ttl.secs`.
fn env_provider() -> Env {
    Env::prefixed("ENGRAM_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("storage_", "storage.", 1)
            .replacen("embedding_", "embedding.", 1)
            .replacen("cache_", "cache.", 1)
            .replacen("dedup_", "dedup.", 1)
            .replacen("ranking_", "ranking.", 1)
            .replacen("indexer_", "indexer.", 1);
        mapped.into()
    })
}
