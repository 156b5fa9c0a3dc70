use std::io::{self, IsTerminal, Write};

use crossterm::style::{StyledContent, Stylize};
use serde::Serialize;

use crate::app::{
    FileListResult, FilesResult, NormalizeResult, ProgressEvent, ProgressSink, TemplateResult,
    ValidateResult,
};
use crate::normalize::Normalized;
use crate::report::{Report, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_validate(result: &ValidateResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_files(result: &FilesResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_template(result: &TemplateResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_file_list(result: &FileListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_normalize(result: &NormalizeResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Styled terminal output; falls back to plain text when stdout is redirected.
pub struct HumanOutput {
    styled: bool,
}

impl Default for HumanOutput {
    fn default() -> Self {
        Self {
            styled: io::stdout().is_terminal(),
        }
    }
}

impl HumanOutput {
    pub fn print_validate(&self, result: &ValidateResult) -> io::Result<()> {
        self.print_report(&result.report)
    }

    pub fn print_files(&self, result: &FilesResult) -> io::Result<()> {
        self.print_report(&result.report)
    }

    pub fn print_template(&self, result: &TemplateResult) -> io::Result<()> {
        let mut stdout = io::stdout();
        for set in &result.read_sets {
            let layout = set.layout().to_string();
            writeln!(
                stdout,
                "{} {} {}",
                self.paint(layout.clone().cyan(), &layout),
                set.sample,
                set.first.display()
            )?;
            if let Some(second) = &set.second {
                writeln!(stdout, "         {}", second.display())?;
            }
        }
        self.print_report(&result.report)
    }

    pub fn print_file_list(&self, result: &FileListResult) -> io::Result<()> {
        let mut stdout = io::stdout();
        let verb = if result.written { "wrote" } else { "would write" };
        writeln!(
            stdout,
            "{verb} {} file(s) to {}",
            result.files.len(),
            result.output.display()
        )?;
        Ok(())
    }

    pub fn print_normalize(&self, result: &NormalizeResult) -> io::Result<()> {
        let mut stdout = io::stdout();
        match &result.outcome {
            Normalized::Unchanged { value } => {
                writeln!(stdout, "{} {value}", self.paint("ok".green(), "ok"))?
            }
            Normalized::Rewritten { value, note } => {
                writeln!(stdout, "{} {value}", self.paint("fixed".yellow(), "fixed"))?;
                if let Some(note) = note {
                    writeln!(stdout, "  note: {note}")?;
                }
            }
            Normalized::Invalid { reason } => {
                writeln!(stdout, "{} {reason}", self.paint("invalid".red(), "invalid"))?
            }
        }
        Ok(())
    }

    pub fn print_report(&self, report: &Report) -> io::Result<()> {
        let mut stdout = io::stdout();
        if !self.styled {
            stdout.write_all(report.render_text().as_bytes())?;
            return Ok(());
        }

        writeln!(stdout, "{}", "SRA metadata validation report".bold())?;
        for (key, value) in &report.contact {
            writeln!(stdout, "  {}: {value}", key.as_str().dim())?;
        }
        for (table, by_severity) in report.grouped() {
            let title = table.map(|kind| kind.as_str()).unwrap_or("cross-check");
            writeln!(stdout, "\n{}", format!("== {title} ==").bold())?;
            for (severity, issues) in by_severity {
                let label = format!("{severity} ({})", issues.len());
                writeln!(stdout, "{}", severity_style(severity, label))?;
                for issue in issues {
                    writeln!(stdout, "  - {issue}")?;
                }
            }
        }
        if !report.written.is_empty() {
            writeln!(stdout, "\n{}", "Written:".bold())?;
            for path in &report.written {
                writeln!(stdout, "  {}", path.display())?;
            }
        }
        let summary = &report.summary;
        writeln!(
            stdout,
            "\nSummary: {}, {}, {}, {} info",
            severity_style(Severity::Error, format!("{} error(s)", summary.errors)),
            severity_style(Severity::Warning, format!("{} warning(s)", summary.warnings)),
            severity_style(Severity::Fix, format!("{} fix(es)", summary.fixes)),
            summary.infos
        )?;
        Ok(())
    }

    fn paint(&self, styled: StyledContent<impl std::fmt::Display>, plain: &str) -> String {
        if self.styled {
            styled.to_string()
        } else {
            plain.to_string()
        }
    }
}

fn severity_style(severity: Severity, text: String) -> StyledContent<String> {
    match severity {
        Severity::Error => text.red().bold(),
        Severity::Warning => text.yellow(),
        Severity::Fix => text.green(),
        Severity::Info => text.dim(),
    }
}

impl ProgressSink for HumanOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} [{:.2}s]", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}
