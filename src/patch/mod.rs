// src/patch/mod.rs

//! Text patching of one decoded container entry plus file overlay
//!
//! Rules run top to bottom against the designated entry. A rule whose anchor
//! is missing does nothing. A rule whose effect is already visible in the
//! text (the prepended line already leads the file, or the replacement is
//! already present) is reported as [`RuleOutcome::AlreadyApplied`] and left
//! alone, so patching an already patched tree changes nothing.

mod rules;

pub use rules::default_rules;

use crate::error::{Error, Result};
use crate::filesystem::ops::copy_dir_all;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// A single substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchRule {
    /// Insert text at the start of the entry
    Prepend(String),
    /// Replace the first occurrence of `anchor`
    ReplaceFirst { anchor: String, replacement: String },
}

impl PatchRule {
    pub fn prepend(text: impl Into<String>) -> Self {
        Self::Prepend(text.into())
    }

    /// Replace the first `anchor` with `replacement`
    ///
    /// When `replacement` embeds `anchor`, its presence marks the rule as
    /// applied. Otherwise a remaining anchor is always replaced, and the rule
    /// only counts as applied once the anchor is gone and the replacement is
    /// present, so the anchor should occur once in the entry.
    pub fn replace_first(anchor: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self::ReplaceFirst {
            anchor: anchor.into(),
            replacement: replacement.into(),
        }
    }

    /// Apply to `text`, returning the outcome
    fn apply(&self, text: &mut String) -> RuleOutcome {
        match self {
            Self::Prepend(line) => {
                if text.starts_with(line.as_str()) {
                    RuleOutcome::AlreadyApplied
                } else {
                    text.insert_str(0, line);
                    RuleOutcome::Applied
                }
            }
            Self::ReplaceFirst {
                anchor,
                replacement,
            } => {
                let embeds_anchor = replacement.contains(anchor.as_str());
                if embeds_anchor && text.contains(replacement.as_str()) {
                    RuleOutcome::AlreadyApplied
                } else if let Some(pos) = text.find(anchor.as_str()) {
                    text.replace_range(pos..pos + anchor.len(), replacement);
                    RuleOutcome::Applied
                } else if text.contains(replacement.as_str()) {
                    RuleOutcome::AlreadyApplied
                } else {
                    RuleOutcome::AnchorMissing
                }
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Prepend(line) => format!("prepend {:?}", line.trim_end()),
            Self::ReplaceFirst { anchor, .. } => format!("replace {anchor:?}"),
        }
    }
}

/// What a rule did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Applied,
    AlreadyApplied,
    AnchorMissing,
}

/// Result of patching one tree
#[derive(Debug, Clone, Default)]
pub struct PatchReport {
    pub outcomes: Vec<RuleOutcome>,
    /// Files copied by the overlay step
    pub overlay_files: u64,
}

impl PatchReport {
    pub fn applied(&self) -> usize {
        self.count(RuleOutcome::Applied)
    }

    pub fn count(&self, outcome: RuleOutcome) -> usize {
        self.outcomes.iter().filter(|o| **o == outcome).count()
    }
}

/// Ordered rule set bound to one entry of the decoded tree
#[derive(Debug, Clone)]
pub struct PatchTransform {
    entry: String,
    rules: Vec<PatchRule>,
}

impl PatchTransform {
    pub fn new(entry: impl Into<String>, rules: Vec<PatchRule>) -> Self {
        Self {
            entry: entry.into(),
            rules,
        }
    }

    /// The stock rule set against `entry`
    pub fn with_default_rules(entry: impl Into<String>) -> Self {
        Self::new(entry, default_rules())
    }

    /// Run every rule against `text`
    pub fn apply_to_text(&self, text: &str) -> (String, Vec<RuleOutcome>) {
        let mut patched = text.to_string();
        let outcomes = self
            .rules
            .iter()
            .map(|rule| {
                let outcome = rule.apply(&mut patched);
                match outcome {
                    RuleOutcome::AnchorMissing => warn!("Patch anchor not found: {}", rule.describe()),
                    RuleOutcome::AlreadyApplied => debug!("Already patched: {}", rule.describe()),
                    RuleOutcome::Applied => debug!("Patched: {}", rule.describe()),
                }
                outcome
            })
            .collect();
        (patched, outcomes)
    }

    /// Patch the designated entry inside a decoded tree
    pub fn apply(&self, tree: &Path) -> Result<PatchReport> {
        let path = tree.join(&self.entry);
        let original = fs::read_to_string(&path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {e}", path.display()))
        })?;

        let (patched, outcomes) = self.apply_to_text(&original);
        if patched != original {
            fs::write(&path, patched.as_bytes()).map_err(|e| {
                Error::IoError(format!("Failed to write {}: {e}", path.display()))
            })?;
        }

        let report = PatchReport {
            outcomes,
            overlay_files: 0,
        };
        info!(
            "Patched {}: {} applied, {} already present, {} anchors missing",
            self.entry,
            report.applied(),
            report.count(RuleOutcome::AlreadyApplied),
            report.count(RuleOutcome::AnchorMissing)
        );
        Ok(report)
    }

    /// Patch the entry, then overlay `overlay_dir` (if given) onto the tree
    pub fn apply_with_overlay(&self, tree: &Path, overlay_dir: Option<&Path>) -> Result<PatchReport> {
        let mut report = self.apply(tree)?;
        if let Some(dir) = overlay_dir {
            report.overlay_files = overlay(dir, tree)?;
        }
        Ok(report)
    }
}

/// Copy every file under `source` into `tree`, overwriting collisions
pub fn overlay(source: &Path, tree: &Path) -> Result<u64> {
    if !source.is_dir() {
        return Err(Error::NotFoundError(format!(
            "Overlay directory {} does not exist",
            source.display()
        )));
    }
    let copied = copy_dir_all(source, tree)?;
    info!("Overlaid {} files from {}", copied, source.display());
    Ok(copied)
}
