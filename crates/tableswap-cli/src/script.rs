//! Script files - numbered, dependency-tagged plans on disk.
//!
//! Scripts live under `<root>/<namespace>/<NNNN>_<label>.json`. Numbers
//! increase per namespace; each script depends on the one before it.

use crate::error::CliError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tableswap_core::MigrationPlan;
use tracing::info;

/// Reference to a script by namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRef {
    /// Namespace directory.
    pub namespace: String,
    /// Script name without extension (`NNNN_label`).
    pub name: String,
}

/// A persisted plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Script name (`NNNN_label`).
    pub name: String,
    /// Namespace the script belongs to.
    pub namespace: String,
    /// Scripts that must run first.
    #[serde(default)]
    pub dependencies: Vec<ScriptRef>,
    /// The plan to execute.
    pub plan: MigrationPlan,
}

impl Script {
    /// Load a script file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| CliError::InvalidScript {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Number of a script file name, if it follows the `NNNN_label.json` pattern.
fn script_number(file_name: &str) -> Option<(u32, String)> {
    let stem = file_name.strip_suffix(".json")?;
    let (number, _) = stem.split_once('_')?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((number.parse().ok()?, stem.to_string()))
}

/// Writes scripts into a directory tree.
pub struct ScriptWriter {
    root: PathBuf,
}

impl ScriptWriter {
    /// Create a writer rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(namespace)
    }

    /// Existing scripts of a namespace, ordered by number.
    pub fn scripts(&self, namespace: &str) -> Result<Vec<(u32, String)>, CliError> {
        let dir = self.namespace_dir(namespace);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut scripts = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(parsed) = entry.file_name().to_str().and_then(script_number) {
                scripts.push(parsed);
            }
        }
        scripts.sort();
        Ok(scripts)
    }

    /// Latest script of a namespace.
    pub fn latest(&self, namespace: &str) -> Result<Option<ScriptRef>, CliError> {
        Ok(self.scripts(namespace)?.pop().map(|(_, name)| ScriptRef {
            namespace: namespace.to_string(),
            name,
        }))
    }

    /// Write `plan` as the next script of `namespace`.
    ///
    /// The script depends on the previous script of its namespace and on the
    /// latest script of every namespace in `related`.
    pub fn write(
        &self,
        namespace: &str,
        label: &str,
        plan: MigrationPlan,
        related: &[String],
    ) -> Result<(PathBuf, Script), CliError> {
        let existing = self.scripts(namespace)?;
        let number = existing.last().map_or(1, |(n, _)| n + 1);
        let name = format!("{:04}_{}", number, label);

        let mut dependencies = Vec::new();
        if let Some((_, previous)) = existing.last() {
            dependencies.push(ScriptRef {
                namespace: namespace.to_string(),
                name: previous.clone(),
            });
        }
        for other in related.iter().filter(|ns| ns.as_str() != namespace) {
            dependencies.extend(self.latest(other)?);
        }

        let script = Script {
            name: name.clone(),
            namespace: namespace.to_string(),
            dependencies,
            plan,
        };

        let dir = self.namespace_dir(namespace);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", name));
        fs::write(&path, serde_json::to_string_pretty(&script)?)?;

        info!(path = %path.display(), dependencies = script.dependencies.len(), "wrote script");
        Ok((path, script))
    }
}
