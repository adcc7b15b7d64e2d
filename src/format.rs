//! Printf-style message formatting with typed arguments.
//!
//! Directives follow `%[argnum$][flags][width][.precision]specifier`:
//!
//! - flags: `-` left-align, `+` always print the sign, `0` pad with zeros
//! - specifiers: `s` `d` `u` `f` `F` `e` `x` `X` `o` `b` `c`, plus `%%`
//!
//! Arguments coerce the way a loosely typed printf does: a string printed
//! with `%d` uses its leading numeric prefix (or 0), a float printed with
//! `%s` uses its shortest representation.
//!
//! ```
//! use runguard::format::{vsprintf, FormatArg};
//!
//! let line = vsprintf("Hello %s, you are %d", &["Bob".into(), FormatArg::Int(5)]);
//! assert_eq!(line.ok().as_deref(), Some("Hello Bob, you are 5"));
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use crate::error::{Error, Result};
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

/// Default number of decimals for `%f` and `%e`.
const DEFAULT_FLOAT_PRECISION: usize = 6;

/// A single substitution value.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatArg {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl FormatArg {
    fn as_i64(&self) -> i64 {
        match self {
            Self::Str(s) => leading_int(s),
            Self::Int(i) => *i,
            Self::UInt(u) => i64::try_from(*u).unwrap_or(i64::MAX),
            #[allow(clippy::cast_possible_truncation)] // saturating by definition of `as`
            Self::Float(f) => *f as i64,
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Self::Str(s) => leading_float(s),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => *i as f64,
            #[allow(clippy::cast_precision_loss)]
            Self::UInt(u) => *u as f64,
            Self::Float(f) => *f,
        }
    }
}

impl fmt::Display for FormatArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::UInt(u) => write!(f, "{u}"),
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<&str> for FormatArg {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FormatArg {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for FormatArg {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i32> for FormatArg {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for FormatArg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for FormatArg {
    fn from(value: u32) -> Self {
        Self::UInt(u64::from(value))
    }
}

impl From<u64> for FormatArg {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<usize> for FormatArg {
    fn from(value: usize) -> Self {
        Self::UInt(u64::try_from(value).unwrap_or(u64::MAX))
    }
}

impl From<f64> for FormatArg {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Substitute `args` into `format`.
///
/// # Errors
///
/// Returns [`Error::Format`] when a directive has no matching argument,
/// uses an unknown specifier, or is left unterminated.
pub fn vsprintf(format: &str, args: &[FormatArg]) -> Result<String> {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next_arg = 0_usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.next_if_eq(&'%').is_some() {
            out.push('%');
            continue;
        }

        let directive = Directive::parse(&mut chars)?;
        let index = match directive.argnum {
            Some(n) => n
                .checked_sub(1)
                .ok_or_else(|| Error::Format("argument number must be greater than zero".into()))?,
            None => {
                let index = next_arg;
                next_arg = next_arg.saturating_add(1);
                index
            }
        };
        let arg = args.get(index).ok_or_else(|| {
            Error::Format(format!(
                "{} arguments are required, {} given",
                index.saturating_add(1),
                args.len()
            ))
        })?;

        out.push_str(&directive.render(arg)?);
    }

    Ok(out)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Directive {
    argnum: Option<usize>,
    left_align: bool,
    plus_sign: bool,
    zero_pad: bool,
    width: usize,
    precision: Option<usize>,
    specifier: char,
}

impl Directive {
    /// Parse everything after a `%` up to and including the specifier.
    fn parse(chars: &mut Peekable<Chars<'_>>) -> Result<Self> {
        let mut directive = Self::default();

        let mut body = String::new();
        while let Some(c) = chars.next_if(|c| c.is_ascii_digit() || "$-+. ".contains(*c)) {
            body.push(c);
        }
        directive.specifier = chars
            .next()
            .ok_or_else(|| Error::Format("missing format specifier".into()))?;

        let mut rest = body.as_str();
        if let Some((argnum, after)) = rest.split_once('$') {
            directive.argnum = Some(parse_number(argnum)?);
            rest = after;
        }

        loop {
            match rest.chars().next() {
                Some('-') => directive.left_align = true,
                Some('+') => directive.plus_sign = true,
                Some('0') => directive.zero_pad = true,
                Some(' ') => {}
                _ => break,
            }
            rest = rest.get(1..).unwrap_or_default();
        }

        let (width, precision) = match rest.split_once('.') {
            Some((width, precision)) => (width, Some(precision)),
            None => (rest, None),
        };
        if !width.is_empty() {
            directive.width = parse_number(width)?;
        }
        if let Some(precision) = precision {
            directive.precision = Some(if precision.is_empty() {
                0
            } else {
                parse_number(precision)?
            });
        }

        Ok(directive)
    }

    fn render(&self, arg: &FormatArg) -> Result<String> {
        let body = match self.specifier {
            's' => {
                let text = arg.to_string();
                match self.precision {
                    Some(max) => text.chars().take(max).collect(),
                    None => text,
                }
            }
            'd' => self.signed(arg.as_i64().to_string(), arg.as_i64() >= 0),
            #[allow(clippy::cast_sign_loss)] // two's complement reinterpretation
            'u' => (arg.as_i64() as u64).to_string(),
            'f' | 'F' => {
                let value = arg.as_f64();
                let precision = self.precision.unwrap_or(DEFAULT_FLOAT_PRECISION);
                self.signed(format!("{value:.precision$}"), value >= 0.0)
            }
            'e' => {
                let value = arg.as_f64();
                let precision = self.precision.unwrap_or(DEFAULT_FLOAT_PRECISION);
                let text = format!("{value:.precision$e}");
                let text = match text.split_once('e') {
                    Some((mantissa, exp)) if !exp.starts_with('-') => {
                        format!("{mantissa}e+{exp}")
                    }
                    _ => text,
                };
                self.signed(text, value >= 0.0)
            }
            #[allow(clippy::cast_sign_loss)]
            'x' => format!("{:x}", arg.as_i64() as u64),
            #[allow(clippy::cast_sign_loss)]
            'X' => format!("{:X}", arg.as_i64() as u64),
            #[allow(clippy::cast_sign_loss)]
            'o' => format!("{:o}", arg.as_i64() as u64),
            #[allow(clippy::cast_sign_loss)]
            'b' => format!("{:b}", arg.as_i64() as u64),
            'c' => u32::try_from(arg.as_i64())
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .ok_or_else(|| Error::Format(format!("'{arg}' is not a valid character code")))?,
            other => {
                return Err(Error::Format(format!("unknown format specifier \"{other}\"")));
            }
        };

        Ok(self.pad(body))
    }

    fn signed(&self, text: String, non_negative: bool) -> String {
        if self.plus_sign && non_negative {
            format!("+{text}")
        } else {
            text
        }
    }

    fn pad(&self, body: String) -> String {
        let len = body.chars().count();
        if len >= self.width {
            return body;
        }
        let fill_len = self.width.saturating_sub(len);
        let fill_char = if self.zero_pad { '0' } else { ' ' };
        let fill: String = std::iter::repeat_n(fill_char, fill_len).collect();

        if self.left_align {
            return format!("{body}{fill}");
        }

        let numeric = matches!(self.specifier, 'd' | 'f' | 'F' | 'e');
        match body.chars().next() {
            Some(sign @ ('-' | '+')) if self.zero_pad && numeric => {
                format!("{sign}{fill}{}", body.get(1..).unwrap_or_default())
            }
            _ => format!("{fill}{body}"),
        }
    }
}

fn parse_number(digits: &str) -> Result<usize> {
    digits
        .parse()
        .map_err(|_| Error::Format(format!("invalid number \"{digits}\" in directive")))
}

/// Leading integer of a string, 0 when there is none.
fn leading_int(s: &str) -> i64 {
    let trimmed = s.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['-', '+']));
    let digits_len = trimmed
        .get(sign_len..)
        .map_or(0, |rest| rest.chars().take_while(char::is_ascii_digit).count());
    trimmed
        .get(..sign_len.saturating_add(digits_len))
        .and_then(|prefix| prefix.parse().ok())
        .unwrap_or(0)
}

/// Leading float of a string, 0.0 when there is none.
fn leading_float(s: &str) -> f64 {
    let trimmed = s.trim_start();
    let candidate_len = trimmed
        .chars()
        .take_while(|c| c.is_ascii_digit() || "+-.eE".contains(*c))
        .count();
    (1..=candidate_len)
        .rev()
        .find_map(|len| trimmed.get(..len).and_then(|prefix| prefix.parse().ok()))
        .unwrap_or(0.0)
}
