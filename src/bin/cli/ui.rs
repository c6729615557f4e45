use std::fmt::{Display, Write as _};
use std::io::{self, IsTerminal, Write as _};
use std::sync::mpsc::Receiver;

use nu_ansi_term::{Color, Style};
use penumbra::check::{Finding, Severity};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

/// Role of a piece of text; the theme decides how it looks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Tone {
    Heading,
    Key,
    Value,
    Info,
    Good,
    Warn,
    Error,
    Critical,
}

impl From<Severity> for Tone {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Warning => Tone::Warn,
            Severity::Error => Tone::Error,
            Severity::Critical => Tone::Critical,
        }
    }
}

impl Theme {
    fn style(self, tone: Tone) -> Style {
        let base = Style::new();
        match (self, tone) {
            (Theme::Plain, _) => base,
            (Theme::Light, Tone::Heading) => base.fg(Color::Blue).bold(),
            (Theme::Light, Tone::Key) => base.fg(Color::Black).bold(),
            (Theme::Light, Tone::Value) => base.fg(Color::Black),
            (Theme::Light, Tone::Info) => base.fg(Color::Purple),
            (Theme::Light, Tone::Good) => base.fg(Color::Green).bold(),
            (Theme::Light, Tone::Critical) => base.fg(Color::Red).bold().underline(),
            (_, Tone::Heading) => base.fg(Color::Purple).bold(),
            (_, Tone::Key) => base.fg(Color::LightBlue).bold(),
            (_, Tone::Value) => base.fg(Color::White),
            (_, Tone::Info) => base.fg(Color::LightCyan),
            (_, Tone::Good) => base.fg(Color::LightGreen).bold(),
            (_, Tone::Warn) => base.fg(Color::Yellow).bold(),
            (_, Tone::Error) => base.fg(Color::LightRed),
            (_, Tone::Critical) => base.fg(Color::Red).bold(),
        }
    }
}

/// Human-readable output for the `check` and `ids` commands.
///
/// Status lines about trouble go to stderr so stdout stays a clean report.
pub struct Ui {
    theme: Theme,
    paint: bool,
    quiet: bool,
}

impl Ui {
    pub fn new(theme: Theme, quiet: bool) -> Self {
        let paint = theme != Theme::Plain && !quiet && std::io::stdout().is_terminal();
        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }
        Self {
            theme,
            paint,
            quiet,
        }
    }

    /// Prints a titled block of aligned `key: value` rows. Empty blocks are
    /// skipped.
    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        print!("{}", self.render_section(title, rows));
    }

    /// Prints findings as workers report them, listing at most `limit`.
    /// Returns once every sender is gone.
    pub fn stream_findings(
        &self,
        title: &str,
        findings: Receiver<Finding>,
        limit: usize,
    ) -> io::Result<()> {
        self.write_findings(&mut io::stdout(), title, findings, limit)
    }

    pub fn list<I>(&self, title: &str, entries: I)
    where
        I: IntoIterator<Item = String>,
    {
        let entries: Vec<String> = entries.into_iter().collect();
        if entries.is_empty() {
            return;
        }
        let mut out = self.heading(title);
        for entry in entries {
            let _ = writeln!(out, "  - {entry}");
        }
        print!("{out}");
    }

    pub fn success(&self, message: &str) {
        println!("{}", self.status(Tone::Good, "✔", message));
    }

    pub fn warn(&self, message: &str) {
        eprintln!("{}", self.status(Tone::Warn, "⚠", message));
    }

    fn render_section<'a, I, V>(&self, title: &str, rows: I) -> String
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        let rows: Vec<(&str, String)> = rows
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();
        if rows.is_empty() {
            return String::new();
        }
        let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        let mut out = self.heading(title);
        for (key, value) in rows {
            let key = format!("{key:>width$}:");
            let _ = writeln!(
                out,
                "  {} {}",
                self.paint(Tone::Key, &key),
                self.paint(Tone::Value, &value)
            );
        }
        out
    }

    fn write_findings<W, I>(
        &self,
        out: &mut W,
        title: &str,
        findings: I,
        limit: usize,
    ) -> io::Result<()>
    where
        W: io::Write,
        I: IntoIterator<Item = Finding>,
    {
        let mark = if self.paint { "●" } else { "-" };
        let mut shown = 0usize;
        let mut hidden = 0usize;
        for finding in findings {
            if shown == limit {
                hidden += 1;
                continue;
            }
            if shown == 0 {
                out.write_all(self.heading(title).as_bytes())?;
            }
            writeln!(
                out,
                "  {} {finding}",
                self.paint(finding.severity.into(), mark)
            )?;
            out.flush()?;
            shown += 1;
        }
        if hidden > 0 {
            let note = format!(
                "{hidden} more findings not shown; use --format json for the full list"
            );
            writeln!(out, "{}", self.status(Tone::Info, "ℹ", &note))?;
        }
        Ok(())
    }

    fn heading(&self, title: &str) -> String {
        if self.quiet {
            format!("{title}\n")
        } else {
            format!("{}\n", self.paint(Tone::Heading, &format!("▸ {title}")))
        }
    }

    fn status(&self, tone: Tone, icon: &str, message: &str) -> String {
        if self.quiet {
            message.to_string()
        } else {
            format!("{} {message}", self.paint(tone, icon))
        }
    }

    fn paint(&self, tone: Tone, text: &str) -> String {
        if self.paint {
            self.theme.style(tone).paint(text).to_string()
        } else {
            text.to_string()
        }
    }
}
