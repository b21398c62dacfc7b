//! Multi-document manifest files.
//!
//! A manifest is split on `---` lines into documents. Every separator and
//! every byte between separators is kept, so a manifest whose documents are
//! all left alone is written back byte for byte.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::analyzer::audit::{AuditContext, Checker, audit_all, run_checks};
use crate::analyzer::fix::fix;
use crate::analyzer::merge::merge_yaml;
use crate::analyzer::overrides::NamespaceLabels;
use crate::analyzer::resource::Resource;
use crate::analyzer::types::AuditResult;
use crate::config::AuditConfig;
use crate::error::ManifestError;

/// What a single document turned out to be.
#[derive(Debug, Clone)]
pub enum Parsed {
    /// Only comments and blank lines.
    CommentOnly,
    Resource(Resource),
    /// Not a decodable object; kept verbatim.
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct ManifestDocument {
    pub index: usize,
    /// The `---` line before the document, with its newline. Empty for a
    /// first document without a separator.
    pub separator: String,
    pub text: String,
    pub parsed: Parsed,
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub documents: Vec<ManifestDocument>,
}

/// Outcome of fixing one manifest.
#[derive(Debug, Clone)]
pub struct Autofixed {
    pub text: String,
    /// Audit results the fixes were computed from.
    pub results: Vec<AuditResult>,
    /// Number of documents whose content changed.
    pub changed: usize,
}

fn is_separator(line: &str) -> bool {
    let line = line.trim_end();
    line == "---" || line.starts_with("--- #")
}

fn is_comment_only(text: &str) -> bool {
    text.lines().all(|line| {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed.starts_with('#')
    })
}

/// Split `text` into `(separator, body)` pairs that concatenate back to it.
pub fn split_documents(text: &str) -> Vec<(String, String)> {
    let mut chunks = vec![(String::new(), String::new())];
    for line in text.split_inclusive('\n') {
        if is_separator(line) {
            chunks.push((line.to_string(), String::new()));
        } else if let Some((_, body)) = chunks.last_mut() {
            body.push_str(line);
        }
    }
    if chunks.len() > 1 && chunks[0].1.is_empty() {
        chunks.remove(0);
    }
    chunks
}

impl Manifest {
    pub fn parse(text: &str) -> Self {
        let documents = split_documents(text)
            .into_iter()
            .enumerate()
            .map(|(index, (separator, text))| {
                let parsed = if is_comment_only(&text) {
                    Parsed::CommentOnly
                } else {
                    match Resource::from_yaml(&text) {
                        Ok(resource) => Parsed::Resource(resource),
                        Err(err) => {
                            let err = ManifestError::Resource { index, source: err };
                            warn!("Skipping invalid {err}");
                            Parsed::Invalid(err.to_string())
                        }
                    }
                };
                ManifestDocument {
                    index,
                    separator,
                    text,
                    parsed,
                }
            })
            .collect();
        Self { documents }
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.documents.iter().filter_map(|doc| match &doc.parsed {
            Parsed::Resource(resource) => Some(resource),
            _ => None,
        })
    }

    /// Labels of the Namespace objects defined in this manifest.
    pub fn namespace_labels(&self) -> NamespaceLabels {
        self.resources()
            .filter_map(|resource| match resource {
                Resource::Unsupported(object) if object.kind == "Namespace" => {
                    Some((object.name.clone(), object.labels.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Reassemble the manifest from its documents.
    pub fn render(&self) -> String {
        self.documents
            .iter()
            .map(|doc| format!("{}{}", doc.separator, doc.text))
            .collect()
    }

    /// Audit, fix and merge every resource document.
    ///
    /// Comment-only, invalid, unsupported and compliant documents are kept
    /// byte for byte. A document whose original text cannot be aligned with
    /// its fix aborts the whole manifest.
    pub fn autofix(
        &self,
        checkers: &[&dyn Checker],
        ctx: &AuditContext<'_>,
    ) -> Result<Autofixed, ManifestError> {
        let mut out = String::new();
        let mut results = Vec::new();
        let mut changed = 0;

        for doc in &self.documents {
            out.push_str(&doc.separator);
            let Parsed::Resource(resource) = &doc.parsed else {
                out.push_str(&doc.text);
                continue;
            };
            let result = run_checks(resource, checkers, ctx);
            let fixed = fix(resource, &result);
            results.push(result);
            if fixed == *resource {
                out.push_str(&doc.text);
                continue;
            }

            let serialized = fixed.to_yaml().map_err(|source| ManifestError::Resource {
                index: doc.index,
                source,
            })?;
            let crlf = doc.text.contains("\r\n");
            let original = if crlf {
                doc.text.replace("\r\n", "\n")
            } else {
                doc.text.clone()
            };
            let mut merged =
                merge_yaml(&original, &serialized).map_err(|source| ManifestError::Merge {
                    index: doc.index,
                    source,
                })?;
            if !original.ends_with('\n') && merged.ends_with('\n') {
                merged.pop();
            }
            if crlf {
                merged = merged.replace('\n', "\r\n");
            }
            debug!("Document {} of kind {} remediated", doc.index, resource.kind());
            changed += 1;
            out.push_str(&merged);
        }

        Ok(Autofixed {
            text: out,
            results,
            changed,
        })
    }
}

/// Audit every resource in `text`. Namespace labels come from Namespace
/// documents in the same manifest.
pub fn audit_text(
    text: &str,
    checkers: &[&dyn Checker],
    config: &AuditConfig,
) -> Vec<AuditResult> {
    let manifest = Manifest::parse(text);
    let namespaces = manifest.namespace_labels();
    let ctx = AuditContext::new(config, &namespaces);
    let resources: Vec<Resource> = manifest.resources().cloned().collect();
    audit_all(&resources, checkers, &ctx)
}

/// Fix every resource in `text`.
pub fn autofix_text(
    text: &str,
    checkers: &[&dyn Checker],
    config: &AuditConfig,
) -> Result<Autofixed, ManifestError> {
    let manifest = Manifest::parse(text);
    let namespaces = manifest.namespace_labels();
    let ctx = AuditContext::new(config, &namespaces);
    manifest.autofix(checkers, &ctx)
}

fn is_manifest_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}

/// Expand directories into the manifest files below them, sorted by path.
pub fn discover(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("Skipping unreadable entry under {}: {err}", path.display());
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_manifest_file(entry.path()))
            .map(|entry| entry.into_path())
            .collect();
        found.sort();
        debug!("Found {} manifest(s) under {}", found.len(), path.display());
        files.extend(found);
    }
    files
}
