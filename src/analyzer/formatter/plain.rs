//! Plain text formatter.

use std::io::{self, Write};

use colored::Colorize;

use super::{Reporter, Totals};
use crate::analyzer::types::{AuditResult, Occurrence, Severity};

fn severity_label(severity: Severity) -> String {
    let label = format!("[{}]", severity.as_str().to_uppercase());
    match severity {
        Severity::Error => label.red().bold().to_string(),
        Severity::Warning => label.yellow().to_string(),
        Severity::Info => label.blue().to_string(),
        Severity::Debug => label.dimmed().to_string(),
    }
}

/// Format one occurrence as a line of text.
pub fn format_occurrence(result: &AuditResult, occurrence: &Occurrence) -> String {
    let subject = occurrence
        .subject
        .as_ref()
        .map(|s| format!(" ({s})"))
        .unwrap_or_default();
    let mut line = format!(
        "{} {}{} {} - {}",
        severity_label(occurrence.severity),
        result.resource.to_string().bold(),
        subject,
        occurrence.code.as_str().cyan(),
        occurrence.message,
    );
    for (key, value) in &occurrence.metadata {
        line.push_str(&format!("\n    {key}: {value}"));
    }
    line
}

pub struct PlainReporter<W: Write> {
    writer: W,
    min_severity: Severity,
    totals: Totals,
}

impl<W: Write> PlainReporter<W> {
    pub fn new(writer: W, min_severity: Severity) -> Self {
        Self {
            writer,
            min_severity,
            totals: Totals::default(),
        }
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }
}

impl<W: Write> Reporter for PlainReporter<W> {
    fn report(&mut self, result: &AuditResult) -> io::Result<()> {
        self.totals.add(result, self.min_severity);
        for occurrence in result.at_least(self.min_severity) {
            writeln!(self.writer, "{}", format_occurrence(result, occurrence))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        let Totals {
            resources,
            errors,
            warnings,
            other,
        } = self.totals;
        if errors + warnings + other == 0 {
            writeln!(self.writer, "All {resources} resource(s) passed.")?;
        } else {
            writeln!(
                self.writer,
                "\nAudited {resources} resource(s): {} error(s), {} warning(s), {other} other.",
                errors.to_string().red(),
                warnings.to_string().yellow(),
            )?;
        }
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::types::{Code, ResourceId};

    fn result() -> AuditResult {
        let mut result = AuditResult::new(ResourceId {
            kind: "Pod".to_string(),
            namespace: Some("prod".to_string()),
            name: "web".to_string(),
        });
        result.push(Occurrence::new(Code::PrivilegedTrue, "privileged set to true").with_subject("app"));
        result.push(Occurrence::new(Code::LimitsNotSet, "Resource limits not set").with_subject("app"));
        result
    }

    #[test]
    fn test_plain_output_respects_min_severity() {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        {
            let mut reporter = PlainReporter::new(&mut buffer, Severity::Error);
            reporter.report(&result()).unwrap();
            reporter.finish().unwrap();
            assert_eq!(reporter.totals().errors, 1);
        }
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("[ERROR] Pod/prod/web (app) PrivilegedTrue - privileged set to true"));
        assert!(!text.contains("LimitsNotSet"));
    }
}
