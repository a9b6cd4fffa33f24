use std::path::Path;

use ck_domain::error::Result;
use ck_domain::model::SpecialistDescriptor;

use crate::manifest;

/// Load a single `specialist.toml` from a specialist directory.
pub fn load_descriptor(dir: &Path) -> Result<SpecialistDescriptor> {
    let toml_path = dir.join("specialist.toml");
    let content = std::fs::read_to_string(&toml_path)?;
    let descriptor = manifest::parse(&content)
        .map_err(|e| ck_domain::error::Error::Internal(format!("invalid specialist manifest: {e}")))?;

    if !manifest::is_valid_specialist_name(&descriptor.name) {
        return Err(ck_domain::error::Error::Internal(format!(
            "invalid specialist name '{}': must match ^[a-z0-9]+(-[a-z0-9]+)*$",
            descriptor.name
        )));
    }

    Ok(descriptor)
}

/// Scan the specialists root directory and load every manifest found.
///
/// A directory without a `specialist.toml` is silently skipped; a
/// directory with a malformed one is skipped with a warning so one bad
/// manifest doesn't take down the whole catalogue.
pub fn scan_specialists(specialists_root: &Path) -> Result<Vec<SpecialistDescriptor>> {
    let mut entries = Vec::new();
    if !specialists_root.exists() {
        return Ok(entries);
    }

    for entry in std::fs::read_dir(specialists_root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if !path.join("specialist.toml").exists() {
            continue;
        }
        match load_descriptor(&path) {
            Ok(descriptor) => entries.push(descriptor),
            Err(e) => {
                tracing::warn!(
                    dir = %path.display(),
                    error = %e,
                    "skipping specialist directory with invalid manifest"
                );
            }
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
