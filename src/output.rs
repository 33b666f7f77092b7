//! Rendering of command results.
//!
//! With `--json` every command prints one envelope:
//!
//! ```text
//! { "schema_version": "revsel.v1", "command": "select", "status": "success",
//!   "data": { ... }, "warnings": [...], "next_steps": [...] }
//! ```
//!
//! A failed command prints the same envelope with `"status": "error"` and an
//! `error` object in place of `data`. Without `--json` the report goes to
//! stdout as text and warnings go to stderr, so `--quiet` silences the
//! report but never a warning.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

pub const SCHEMA_VERSION: &str = "revsel.v1";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Text report of one command, also the source of the envelope's
/// `warnings` and `next_steps`.
#[derive(Debug, Clone, Default)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Self::default()
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    /// One line per listed item (candidate, reference, build).
    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Header, aligned summary, indented details, then `next:` lines; blocks
/// are separated by a blank line and empty blocks are left out.
impl fmt::Display for HumanOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header)?;

        let width = self.summary.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        let summary: Vec<String> = self
            .summary
            .iter()
            .map(|(key, value)| format!("  {key:<width$}  {value}").trim_end().to_string())
            .collect();
        let details: Vec<String> = self.details.iter().map(|line| format!("  {line}")).collect();
        let next: Vec<String> = self.next_steps.iter().map(|step| format!("next: {step}")).collect();

        for block in [summary, details, next] {
            if !block.is_empty() {
                write!(f, "\n\n{}", block.join("\n"))?;
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    #[serde(flatten)]
    body: Body<'a, T>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    next_steps: &'a [String],
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Body<'a, T: Serialize> {
    Success { data: &'a T },
    Error { error: ErrorBody },
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: &HumanOutput,
) -> Result<()> {
    if options.json {
        return print_json(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            body: Body::Success { data },
            warnings: &human.warnings,
            next_steps: &human.next_steps,
        });
    }

    for warning in &human.warnings {
        eprintln!("warning: {warning}");
    }
    if !options.quiet {
        println!("{human}");
    }
    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let next_steps: Vec<String> = err.hint().into_iter().map(str::to_string).collect();
    if json {
        return print_json(&Envelope::<()> {
            schema_version: SCHEMA_VERSION,
            command,
            body: Body::Error {
                error: ErrorBody {
                    message: err.to_string(),
                    code: err.exit_code(),
                    kind: err.kind(),
                    details: err.details(),
                },
            },
            warnings: &[],
            next_steps: &next_steps,
        });
    }

    eprintln!("error: {err}");
    for step in &next_steps {
        eprintln!("hint: {step}");
    }
    Ok(())
}

fn print_json<T: Serialize>(envelope: &Envelope<'_, T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_is_tagged_by_status() {
        let mut human = HumanOutput::new("Nothing to build");
        human.push_warning("nothing new");
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            command: "select",
            body: Body::Success { data: &[1, 2] },
            warnings: &human.warnings,
            next_steps: &human.next_steps,
        };
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"][1], 2);
        assert_eq!(json["warnings"][0], "nothing new");
        assert!(json.get("next_steps").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn error_envelope_carries_kind_and_hint() {
        let err = Error::RefNotFound("origin/gone".to_string());
        let hint: Vec<String> = err.hint().into_iter().map(str::to_string).collect();
        let envelope = Envelope::<()> {
            schema_version: SCHEMA_VERSION,
            command: "record",
            body: Body::Error {
                error: ErrorBody {
                    message: err.to_string(),
                    code: err.exit_code(),
                    kind: err.kind(),
                    details: err.details(),
                },
            },
            warnings: &[],
            next_steps: &hint,
        };
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["kind"], "repository_failed");
        assert_eq!(json["error"]["details"]["reference"], "origin/gone");
        assert_eq!(json["next_steps"][0], "revsel refs");
        assert!(json.get("data").is_none());
    }
}
