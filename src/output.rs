//! Console output with style tags.
//!
//! Messages are written as tagged lines (`<info>..</info>`,
//! `<comment>..</comment>`, `<error>..</error>`). Sinks decide how tags are
//! shown: [`BufferedOutput`] keeps them verbatim, [`ConsoleOutput`] turns
//! them into ANSI colors or strips them.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use crate::error::Result;
use crossterm::style::Stylize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, IsTerminal, Stdout, Write};
use std::str::FromStr;

/// Line sink used by commands and the runner.
pub trait Output {
    /// Write one line.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying writer fails.
    fn write_line(&mut self, line: &str) -> Result<()>;
}

impl<T: Output + ?Sized> Output for &mut T {
    fn write_line(&mut self, line: &str) -> Result<()> {
        (**self).write_line(line)
    }
}

impl<T: Output + ?Sized> Output for Box<T> {
    fn write_line(&mut self, line: &str) -> Result<()> {
        (**self).write_line(line)
    }
}

/// Named style of a tagged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Info,
    Comment,
    Error,
}

impl Style {
    /// Tag name used in markup.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Comment => "comment",
            Self::Error => "error",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "info" => Some(Self::Info),
            "comment" => Some(Self::Comment),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Wrap `message` in this style's tags.
    #[must_use]
    pub fn wrap(self, message: &str) -> String {
        let tag = self.tag();
        format!("<{tag}>{message}</{tag}>")
    }

    fn paint(self, text: &str) -> String {
        match self {
            Self::Info => text.green().to_string(),
            Self::Comment => text.yellow().to_string(),
            Self::Error => text.white().on_red().to_string(),
        }
    }
}

/// When to emit ANSI colors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Color when stdout is a terminal and `NO_COLOR` is unset.
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorMode {
    /// Decide whether output should be decorated.
    #[must_use]
    pub const fn decorated(self, is_terminal: bool, no_color: bool) -> bool {
        match self {
            Self::Auto => is_terminal && !no_color,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

impl FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown color mode '{other}' (expected auto, always or never)")),
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Always => "always",
            Self::Never => "never",
        })
    }
}

enum Tag {
    Open(Style),
    Close(Style),
    CloseAny,
}

impl Tag {
    fn parse(name: &str) -> Option<Self> {
        match name.strip_prefix('/') {
            Some("") => Some(Self::CloseAny),
            Some(closing) => Style::from_tag(closing).map(Self::Close),
            None => Style::from_tag(name).map(Self::Open),
        }
    }
}

/// Render style tags in `line`.
///
/// Decorated output replaces tags with ANSI sequences, plain output drops
/// them. Unknown or unbalanced tags are kept as literal text.
#[must_use]
pub fn render(line: &str, decorated: bool) -> String {
    let mut out = String::with_capacity(line.len());
    let mut stack: Vec<Style> = Vec::new();
    let mut rest = line;

    let push_text = |out: &mut String, text: &str, style: Option<Style>| {
        if text.is_empty() {
            return;
        }
        match style {
            Some(style) if decorated => out.push_str(&style.paint(text)),
            _ => out.push_str(text),
        }
    };

    while let Some(open) = rest.find('<') {
        let (text, tail) = rest.split_at(open);
        push_text(&mut out, text, stack.last().copied());

        let tag = tail.find('>').and_then(|close| {
            tail.get(1..close)
                .and_then(Tag::parse)
                .map(|tag| (tag, close))
        });

        let consumed = match tag {
            Some((Tag::Open(style), close)) => {
                stack.push(style);
                Some(close)
            }
            Some((Tag::Close(style), close)) if stack.last() == Some(&style) => {
                stack.pop();
                Some(close)
            }
            Some((Tag::CloseAny, close)) if !stack.is_empty() => {
                stack.pop();
                Some(close)
            }
            _ => None,
        };

        rest = match consumed {
            Some(close) => tail.get(close.saturating_add(1)..).unwrap_or_default(),
            None => {
                push_text(&mut out, "<", stack.last().copied());
                tail.get(1..).unwrap_or_default()
            }
        };
    }
    push_text(&mut out, rest, stack.last().copied());

    out
}

/// Collects raw tagged lines in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferedOutput {
    lines: Vec<String>,
}

impl BufferedOutput {
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Lines written so far.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// All lines joined with `\n`.
    #[must_use]
    pub fn contents(&self) -> String {
        self.lines.join("\n")
    }
}

impl Output for BufferedOutput {
    fn write_line(&mut self, line: &str) -> Result<()> {
        self.lines.push(line.to_string());
        Ok(())
    }
}

/// Writes rendered lines to a terminal or any other writer.
#[derive(Debug)]
pub struct ConsoleOutput<W: Write = Stdout> {
    writer: W,
    decorated: bool,
}

impl ConsoleOutput<Stdout> {
    /// Console output on stdout, resolving `mode` against the terminal.
    #[must_use]
    pub fn stdout(mode: ColorMode) -> Self {
        let stdout = io::stdout();
        let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        let decorated = mode.decorated(stdout.is_terminal(), no_color);
        Self::new(stdout, decorated)
    }
}

impl<W: Write> ConsoleOutput<W> {
    pub const fn new(writer: W, decorated: bool) -> Self {
        Self { writer, decorated }
    }

    #[must_use]
    pub const fn is_decorated(&self) -> bool {
        self.decorated
    }

    /// Consume the output and return the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Output for ConsoleOutput<W> {
    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{}", render(line, self.decorated))?;
        Ok(())
    }
}
