//! On-disk credential profiles.
//!
//! One JSON document per profile. A profile directory holds documents at its
//! top level and in per-type subdirectories:
//!
//! ```text
//! credentials/
//!   basic/admin.json
//!   bearer/staging.json
//!   oauth2/partner_api.json
//! ```
//!
//! A document inside a type subdirectory may omit its `type` field.

use super::{CredentialError, CredentialProfile};
use log::{debug, info};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Subdirectories scanned by [`load_profiles`], one per profile type.
pub const TYPE_DIRS: &[&str] = &["basic", "bearer", "apikey", "oauth1", "oauth2"];

/// Loads a single profile document.
///
/// A missing `label` defaults to the file stem.
pub fn load_profile(path: &Path) -> Result<CredentialProfile, CredentialError> {
    load_typed(path, None)
}

fn load_typed(path: &Path, type_hint: Option<&str>) -> Result<CredentialProfile, CredentialError> {
    let content = fs::read_to_string(path)
        .map_err(|e| CredentialError::IoError(format!("{}: {}", path.display(), e)))?;
    let mut raw: Value = serde_json::from_str(&content)
        .map_err(|e| CredentialError::ParseError(format!("{}: {}", path.display(), e)))?;

    let obj = raw.as_object_mut().ok_or_else(|| {
        CredentialError::ParseError(format!("{}: root must be a JSON object", path.display()))
    })?;
    if let Some(hint) = type_hint {
        obj.entry("type").or_insert_with(|| Value::String(hint.to_string()));
    }

    let mut profile: CredentialProfile = serde_json::from_value(raw)
        .map_err(|e| CredentialError::ParseError(format!("{}: {}", path.display(), e)))?;

    if profile.label.trim().is_empty() {
        profile.label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    debug!(
        "Loaded {} credential profile '{}' from {}",
        profile.type_name(),
        profile.label,
        path.display()
    );
    Ok(profile)
}

/// Loads every profile in a directory and its type subdirectories.
///
/// Files are read in name order, top level first. A missing directory yields
/// no profiles; any malformed document fails the whole load.
pub fn load_profiles(dir: &Path) -> Result<Vec<CredentialProfile>, CredentialError> {
    let mut profiles = Vec::new();
    if !dir.is_dir() {
        return Ok(profiles);
    }

    for path in json_files(dir)? {
        profiles.push(load_typed(&path, None)?);
    }
    for type_dir in TYPE_DIRS {
        let sub = dir.join(type_dir);
        if !sub.is_dir() {
            continue;
        }
        for path in json_files(&sub)? {
            profiles.push(load_typed(&path, Some(type_dir))?);
        }
    }

    info!(
        "Loaded {} credential profile(s) from {}",
        profiles.len(),
        dir.display()
    );
    Ok(profiles)
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>, CredentialError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Writes a profile to `<dir>/<type>/<label>.json`.
///
/// # Returns
///
/// The path written.
pub fn save_profile(dir: &Path, profile: &CredentialProfile) -> Result<PathBuf, CredentialError> {
    let type_dir = dir.join(profile.type_name());
    fs::create_dir_all(&type_dir)?;

    let path = type_dir.join(format!("{}.json", file_slug(&profile.label)));
    let json = serde_json::to_string_pretty(profile)?;
    fs::write(&path, json)?;

    debug!("Saved credential profile '{}' to {}", profile.label, path.display());
    Ok(path)
}

fn file_slug(label: &str) -> String {
    let slug: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if slug.is_empty() {
        "profile".to_string()
    } else {
        slug
    }
}
