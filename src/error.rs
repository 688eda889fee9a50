//! Diagnósticos.
//!
//! Cada fase define su propio tipo de error. Aquí se unifican en
//! [`Diagnostic`], con severidad y clase, y se presentan en el formato
//! orientado a líneas que consumen las herramientas que envuelven al
//! transpilador:
//!
//! ```text
//! error: unknown call `arduino.Blink`
//!   --> main.go:4:5
//!    |
//!  4 |     arduino.Blink(13)
//!    |     ^^^^^^^^^^^^^
//! ```

use crate::{
    lex::LexerError,
    parse::{ParserError, UnsupportedError},
    source::{Located, Location, Position},
};

use std::{
    error::Error,
    fmt::{self, Display},
};

/// Severidad. Solo los errores abortan la emisión.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Display for Severity {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => fmt.write_str("error"),
            Severity::Warning => fmt.write_str("warning"),
        }
    }
}

/// Clase de un diagnóstico, según la fase y la naturaleza del fallo.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Class {
    Lex,
    Parse,
    Unsupported,
    Resolution,
    Invariant,
    Config,

    /// SDK, compilador o enlazador, en `tsuki-flash`.
    Toolchain,

    /// Puerto serie o programador, en `tsuki-flash`.
    Device,
}

/// Clasificación de un tipo de error.
pub trait Classify {
    fn class(&self) -> Class;

    fn severity(&self) -> Severity {
        Severity::Error
    }
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    severity: Severity,
    class: Class,
    message: String,
    location: Option<Location>,
}

impl Diagnostic {
    /// Construye un diagnóstico a partir de un error cualquiera.
    pub fn new<E>(error: &E, location: Option<Location>) -> Self
    where
        E: Error + Classify,
    {
        Diagnostic {
            severity: error.severity(),
            class: error.class(),
            message: error.to_string(),
            location,
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl<E: Error + Classify> From<Located<E>> for Diagnostic {
    fn from(error: Located<E>) -> Self {
        let (location, error) = error.split();
        Diagnostic::new(&error, Some(location))
    }
}

/// Colección ordenada de diagnósticos de una ejecución.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push<D: Into<Diagnostic>>(&mut self, diagnostic: D) {
        self.entries.push(diagnostic.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.len() - self.error_count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

impl<D: Into<Diagnostic>> Extend<D> for Diagnostics {
    fn extend<I: IntoIterator<Item = D>>(&mut self, iter: I) {
        self.entries.extend(iter.into_iter().map(Into::into));
    }
}

impl<D: Into<Diagnostic>> FromIterator<D> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = D>>(iter: I) -> Self {
        let mut diagnostics = Diagnostics::default();
        diagnostics.extend(iter);
        diagnostics
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.entries {
            write!(fmt, "{}", diagnostic)?;
        }

        let errors = self.error_count();
        if errors > 0 {
            let error_or_errors = if errors == 1 { "error" } else { "errors" };
            writeln!(fmt, "Transpile failed with {} {}", errors, error_or_errors)?;
        }

        Ok(())
    }
}

impl Display for Diagnostic {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(fmt, "{}: {}", self.severity, self.message)?;

        let location = match &self.location {
            Some(location) => location,
            None => return writeln!(fmt),
        };

        writeln!(fmt, "  --> {}", location)?;

        let start = location.start();
        let line = match location.source().line(start.line()) {
            Some(line) => expand_tabs(line),
            None => return writeln!(fmt),
        };

        let number = start.line().to_string();
        let digits = number.len();
        writeln!(fmt, " {:digits$} |", "", digits = digits)?;
        writeln!(fmt, " {} | {}", number, line)?;

        let skip = (start.column() - 1) as usize;
        let end = location.end();
        let highlight = if end.line() == start.line() {
            end.column().saturating_sub(start.column()) as usize
        } else {
            line.chars().count().saturating_sub(skip)
        };

        writeln!(
            fmt,
            " {:digits$} | {:skip$}{:^<highlight$}",
            "",
            "",
            "",
            digits = digits,
            skip = skip,
            highlight = highlight.max(1)
        )?;

        writeln!(fmt)
    }
}

/// Expande tabuladores con las mismas reglas que [`Position`], para
/// que las columnas del marcador coincidan.
fn expand_tabs(line: &str) -> String {
    let mut expanded = String::with_capacity(line.len());
    let mut position = Position::default();

    for c in line.chars() {
        let next = position.advance(c);
        match c {
            '\t' => {
                let width = (next.column() - position.column()) as usize;
                expanded.extend(std::iter::repeat(' ').take(width));
            }

            _ => expanded.push(c),
        }

        position = next;
    }

    expanded
}

impl Classify for LexerError {
    fn class(&self) -> Class {
        Class::Lex
    }
}

impl Classify for ParserError {
    fn class(&self) -> Class {
        match self {
            ParserError::Unsupported(_) => Class::Unsupported,
            _ => Class::Parse,
        }
    }
}

impl Classify for UnsupportedError {
    fn class(&self) -> Class {
        Class::Unsupported
    }
}
