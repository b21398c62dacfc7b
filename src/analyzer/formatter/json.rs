//! JSON formatter: one object per line for each occurrence.

use std::collections::BTreeMap;
use std::io::{self, Write};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use super::Reporter;
use crate::analyzer::types::{AuditResult, Severity};

#[derive(Serialize)]
struct JsonOccurrence<'a> {
    time: String,
    level: &'a str,
    code: &'a str,
    msg: &'a str,
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    #[serde(flatten)]
    metadata: &'a BTreeMap<String, String>,
}

/// Format every occurrence of `result` at or above `min` as JSON lines.
pub fn format(result: &AuditResult, min: Severity) -> String {
    let time = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    result
        .at_least(min)
        .map(|occurrence| {
            let line = JsonOccurrence {
                time: time.clone(),
                level: occurrence.severity.as_str(),
                code: occurrence.code.as_str(),
                msg: &occurrence.message,
                kind: &result.resource.kind,
                namespace: result.resource.namespace.as_deref(),
                name: &result.resource.name,
                subject: occurrence.subject.as_deref(),
                metadata: &occurrence.metadata,
            };
            serde_json::to_string(&line).unwrap_or_else(|_| "{}".to_string()) + "\n"
        })
        .collect()
}

pub struct JsonReporter<W: Write> {
    writer: W,
    min_severity: Severity,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(writer: W, min_severity: Severity) -> Self {
        Self {
            writer,
            min_severity,
        }
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn report(&mut self, result: &AuditResult) -> io::Result<()> {
        self.writer
            .write_all(format(result, self.min_severity).as_bytes())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::types::{Code, Occurrence, ResourceId, meta};

    #[test]
    fn test_json_lines() {
        let mut result = AuditResult::new(ResourceId {
            kind: "Deployment".to_string(),
            namespace: None,
            name: "api".to_string(),
        });
        result.push(
            Occurrence::new(Code::PrivilegedAllowed, "allowed")
                .with_subject("app")
                .with_metadata(meta::OVERRIDE_REASON, "gpu"),
        );
        result.push(Occurrence::new(Code::ImageTagLatest, "latest"));

        let text = format(&result, Severity::Warning);
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["code"], "PrivilegedAllowed");
        assert_eq!(lines[0]["level"], "warning");
        assert_eq!(lines[0]["OverrideReason"], "gpu");
        assert!(lines[0].get("namespace").is_none());
        assert!(chrono::DateTime::parse_from_rfc3339(lines[0]["time"].as_str().unwrap()).is_ok());
    }
}
