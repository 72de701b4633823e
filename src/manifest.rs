use std::fs;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    scripts: serde_json::Map<String, serde_json::Value>,
}

/// Looks for the nearest ancestor `package.json` starting at `dir` and
/// returns the name of the first script whose value is the literal `next`.
///
/// This only ever feeds a hint appended to an error message, so every
/// failure (no manifest, unreadable file, malformed JSON, non-string
/// script values) collapses to `None`.
pub fn find_next_script(dir: &Path) -> Option<String> {
    let manifest_path = dir
        .ancestors()
        .map(|ancestor| ancestor.join("package.json"))
        .find(|candidate| candidate.is_file())?;

    let raw = fs::read_to_string(&manifest_path).ok()?;
    let manifest: PackageManifest = serde_json::from_str(&raw).ok()?;

    manifest
        .scripts
        .iter()
        .find(|(_, value)| value.as_str() == Some("next"))
        .map(|(name, _)| name.clone())
}
