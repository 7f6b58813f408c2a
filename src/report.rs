//! Final report of a harness run.
//!
//! The report goes to the host's stderr so that it is neither mixed into the
//! entry point's stdout nor swallowed by stream suppression.

use std::error::Error as StdError;
use std::io::{self, Write};
use std::time::Duration;

use crate::error::HarnessError;

/// Which launch strategy a run used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    Command,
}

impl Strategy {
    fn label(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Command => "command",
        }
    }
}

/// Outcome of one run, as reported.
#[derive(Debug)]
pub struct RunSummary<'a> {
    pub group: &'a str,
    pub strategy: Strategy,
    pub duration: Duration,
    pub outcome: Result<(), &'a HarnessError>,
}

impl RunSummary<'_> {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Writes the summary, followed by the cause chain of a failure.
pub fn write_summary(out: &mut impl Write, summary: &RunSummary<'_>) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Run Summary:")?;
    writeln!(out, "  Group:    {}", summary.group)?;
    writeln!(out, "  Strategy: {}", summary.strategy.label())?;
    writeln!(out, "  Duration: {:?}", summary.duration)?;
    writeln!(out)?;

    match summary.outcome {
        Ok(()) => writeln!(out, "{}", console::style("Entry point completed.").for_stderr().green().bold()),
        Err(error) => write_failure(out, error),
    }
}

/// Writes a harness error and its causes.
pub fn write_failure(out: &mut impl Write, error: &HarnessError) -> io::Result<()> {
    let headline = if error.is_preflight() {
        "Entry point could not be started:"
    } else {
        "Entry point failed:"
    };
    writeln!(out, "{} {}", console::style(headline).for_stderr().red().bold(), error)?;

    let mut source = error.source();
    while let Some(cause) = source {
        writeln!(out, "  {} {}", console::style("caused by:").for_stderr().dim(), cause)?;
        source = cause.source();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::CapturedFailure;

    fn render(summary: &RunSummary<'_>) -> String {
        let mut out = Vec::new();
        write_summary(&mut out, summary).unwrap();
        console::strip_ansi_codes(&String::from_utf8(out).unwrap()).into_owned()
    }

    #[test]
    fn test_success_summary() {
        let text = render(&RunSummary {
            group: "app",
            strategy: Strategy::Direct,
            duration: Duration::from_millis(5),
            outcome: Ok(()),
        });

        assert!(text.contains("  Group:    app"));
        assert!(text.contains("  Strategy: direct"));
        assert!(text.ends_with("Entry point completed.\n"));
    }

    #[test]
    fn test_failure_lists_causes() {
        let failure = CapturedFailure::from_error("main", anyhow::anyhow!("exit code 3"));
        let error = HarnessError::Execution(failure);
        let text = render(&RunSummary {
            group: "app",
            strategy: Strategy::Command,
            duration: Duration::ZERO,
            outcome: Err(&error),
        });

        assert!(text.contains("Entry point failed: unable to execute the requested entry point"));
        assert!(text.contains("  caused by: thread `main` failed"));
        assert!(text.contains("  caused by: exit code 3"));
    }

    #[test]
    fn test_preflight_failure_headline() {
        let error = HarnessError::Configuration("entry point `svc` is not static".to_string());
        let mut out = Vec::new();
        write_failure(&mut out, &error).unwrap();
        let text = console::strip_ansi_codes(&String::from_utf8(out).unwrap()).into_owned();

        assert_eq!(
            text,
            "Entry point could not be started: entry point `svc` is not static\n"
        );
    }
}
