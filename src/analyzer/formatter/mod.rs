//! Output formatters for audit results.

pub mod json;
pub mod plain;

use std::io::{self, Write};

use crate::analyzer::types::{AuditResult, Severity};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable, colored text.
    #[default]
    Plain,
    /// One JSON object per occurrence.
    Json,
}

impl OutputFormat {
    /// Parse from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Some(Self::Plain),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Receives audit results as they are produced.
pub trait Reporter {
    fn report(&mut self, result: &AuditResult) -> io::Result<()>;

    /// Called once after the last result.
    fn finish(&mut self) -> io::Result<()>;
}

/// Running totals of reported occurrences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub resources: usize,
    pub errors: usize,
    pub warnings: usize,
    pub other: usize,
}

impl Totals {
    pub fn add(&mut self, result: &AuditResult, min: Severity) {
        self.resources += 1;
        for occurrence in result.at_least(min) {
            match occurrence.severity {
                Severity::Error => self.errors += 1,
                Severity::Warning => self.warnings += 1,
                Severity::Info | Severity::Debug => self.other += 1,
            }
        }
    }
}

/// Build the reporter for `format`, writing to `writer`.
pub fn reporter<'w>(
    format: OutputFormat,
    min_severity: Severity,
    writer: Box<dyn Write + 'w>,
) -> Box<dyn Reporter + 'w> {
    match format {
        OutputFormat::Plain => Box::new(plain::PlainReporter::new(writer, min_severity)),
        OutputFormat::Json => Box::new(json::JsonReporter::new(writer, min_severity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("text"), Some(OutputFormat::Plain));
        assert_eq!(OutputFormat::parse("sarif"), None);
    }
}
