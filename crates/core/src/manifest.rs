//! Desired-state manifest.
//!
//! A manifest declares every managed CODEOWNERS file as a `[[file]]` table:
//!
//! ```toml
//! [[file]]
//! repository_owner = "acme"
//! repository_name = "widgets"
//! branch = "main"
//!
//! [[file.rules]]
//! pattern = "*"
//! usernames = ["@acme/core"]
//! ```
//!
//! Expanding a manifest entry strips `@` prefixes and sorts usernames;
//! flattening a [`CodeownersFile`] back writes the same canonical form.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ManifestError;
use crate::models::{CodeownersFile, FileId};
use crate::ruleset::{normalize_username, Rule, Ruleset};

/// Starter manifest written by `codeowners-sync init`.
pub const EXAMPLE_MANIFEST: &str = r#"[[file]]
repository_owner = "acme"
repository_name = "widgets"
branch = ""

[[file.rules]]
pattern = "*"
usernames = ["acme/maintainers"]

[[file.rules]]
pattern = "docs/**"
usernames = ["acme/docs", "octocat"]
"#;

/// One rule as written in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub pattern: String,
    #[serde(default)]
    pub usernames: Vec<String>,
}

/// One managed file as written in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub repository_owner: String,
    pub repository_name: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl FileSpec {
    pub fn id(&self) -> FileId {
        FileId::new(&self.repository_owner, &self.repository_name, &self.branch)
    }

    /// Convert to the domain model: usernames lose their `@` and are sorted.
    pub fn expand(&self) -> CodeownersFile {
        let ruleset: Ruleset = self
            .rules
            .iter()
            .map(|r| Rule::new(r.pattern.clone(), &r.usernames))
            .collect();
        CodeownersFile::new(self.id(), ruleset.sorted())
    }

    /// Inverse of [`expand`](Self::expand).
    pub fn flatten(file: &CodeownersFile) -> Self {
        let rules = file
            .ruleset
            .sorted()
            .iter()
            .map(|rule| RuleSpec {
                pattern: rule.pattern.clone(),
                usernames: rule.usernames.clone(),
            })
            .collect();
        Self {
            repository_owner: file.id.owner.clone(),
            repository_name: file.id.name.clone(),
            branch: file.id.branch.clone(),
            rules,
        }
    }

    fn validate(&self, index: usize) -> Result<(), ManifestError> {
        let field = |name: &str| format!("file[{}].{}", index, name);

        if self.repository_owner.trim().is_empty() {
            return Err(invalid(field("repository_owner"), "must not be empty"));
        }
        if self.repository_name.trim().is_empty() {
            return Err(invalid(field("repository_name"), "must not be empty"));
        }
        for (i, rule) in self.rules.iter().enumerate() {
            let rule_field = |name: &str| field(&format!("rules[{}].{}", i, name));
            if rule.pattern.is_empty() {
                return Err(invalid(rule_field("pattern"), "must not be empty"));
            }
            if rule.pattern.chars().any(char::is_whitespace) {
                return Err(invalid(rule_field("pattern"), "must not contain whitespace"));
            }
            if rule.pattern.starts_with('#') {
                return Err(invalid(rule_field("pattern"), "must not start with '#'"));
            }
            for username in &rule.usernames {
                let canonical = normalize_username(username);
                if canonical.is_empty() {
                    return Err(invalid(rule_field("usernames"), "usernames must not be empty"));
                }
                if canonical.chars().any(char::is_whitespace) {
                    return Err(invalid(
                        rule_field("usernames"),
                        &format!("username '{}' contains whitespace", username),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn invalid(field: String, detail: &str) -> ManifestError {
    ManifestError::InvalidValue {
        field,
        detail: detail.to_string(),
    }
}

/// The full desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "file")]
    pub files: Vec<FileSpec>,
}

impl Manifest {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading manifest");

        if !path.exists() {
            return Err(ManifestError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let manifest = Self::from_toml_str(&contents)?;
        debug!(files = manifest.files.len(), "manifest parsed");
        Ok(manifest)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ManifestError> {
        toml::from_str(s).map_err(|e| ManifestError::ParseError(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, ManifestError> {
        toml::to_string_pretty(self).map_err(|e| ManifestError::ParseError(e.to_string()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ManifestError> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Check every entry and reject duplicate file ids.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();
        for (index, spec) in self.files.iter().enumerate() {
            spec.validate(index)?;
            let id = spec.id();
            if !seen.insert(id.to_string()) {
                return Err(ManifestError::DuplicateFile(id.to_string()));
            }
        }
        Ok(())
    }

    /// Validate and convert every entry to the domain model.
    pub fn expand(&self) -> Result<Vec<CodeownersFile>, ManifestError> {
        self.validate()?;
        Ok(self.files.iter().map(FileSpec::expand).collect())
    }

    pub fn find(&self, id: &FileId) -> Option<&FileSpec> {
        self.files.iter().find(|f| &f.id() == id)
    }

    /// Insert or replace the entry for `file.id`.
    pub fn upsert(&mut self, file: &CodeownersFile) {
        let spec = FileSpec::flatten(file);
        match self.files.iter_mut().find(|f| f.id() == file.id) {
            Some(existing) => *existing = spec,
            None => self.files.push(spec),
        }
    }

    /// Remove the entry for `id`, returning whether it existed.
    pub fn remove(&mut self, id: &FileId) -> bool {
        let before = self.files.len();
        self.files.retain(|f| &f.id() != id);
        self.files.len() != before
    }
}
