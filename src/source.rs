//! Archivos de entrada y ubicaciones dentro de ellos.
//!
//! Tokens, nodos del AST y diagnósticos cargan un [`Location`] que
//! apunta al archivo Go original. Con él se reportan errores como
//! `main.go:3:7` y se emiten las directivas `#line` de `--source-map`.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::Range,
    rc::Rc,
};

/// Las columnas avanzan a la siguiente parada múltiplo de 4 tras un `\t`.
const TAB_STOP: u32 = 4;

/// Un valor junto con el lugar del archivo Go del que salió.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    pub fn val(&self) -> &T {
        &self.value
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }

    /// Conserva la ubicación al convertir, por ejemplo, un error de una
    /// fase en un diagnóstico.
    pub fn map<U, F>(self, map: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: map(self.value),
            location: self.location,
        }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Rango `[inicio, fin)` dentro de un archivo.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Ubicación vacía al inicio de un archivo.
    pub fn start_of(source: &Rc<Source>) -> Self {
        Location {
            from: Rc::clone(source),
            position: Position::default()..Position::default(),
        }
    }

    /// Construye una ubicación a partir de un rango de posiciones.
    pub fn new(source: &Rc<Source>, position: Range<Position>) -> Self {
        Location {
            from: Rc::clone(source),
            position,
        }
    }

    /// Desde el inicio de `from` hasta el fin de `to`, ambos del mismo archivo.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            from: from.from,
            position: from.position.start..to.position.end,
        }
    }

    pub fn start(&self) -> Position {
        self.position.start
    }

    pub fn end(&self) -> Position {
        self.position.end
    }

    /// Archivo de origen.
    pub fn source(&self) -> &Source {
        &self.from
    }

    /// Texto original cubierto por esta ubicación.
    pub fn text(&self) -> &str {
        let Range { start, end } = &self.position;
        self.from.text.get(start.offset..end.offset).unwrap_or("")
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.from.name, self.position.start)
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}-{}", self.from.name, self.position.start, self.position.end)
    }
}

/// Línea y columna, ambas desde 1.
///
/// También se conserva el desplazamiento en bytes, necesario para
/// recuperar el texto original de nodos no soportados.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Position {
    line: u32,
    column: u32,
    offset: usize,
}

impl Position {
    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    /// Bytes desde el inicio del archivo.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Avanza sobre un carácter cualquiera.
    pub fn advance(self, c: char) -> Position {
        let offset = self.offset + c.len_utf8();
        match c {
            '\n' => Position {
                line: self.line + 1,
                column: 1,
                offset,
            },

            '\t' => Position {
                line: self.line,
                column: 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP,
                offset,
            },

            _ => Position {
                line: self.line,
                column: self.column + 1,
                offset,
            },
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Nombre de origen y texto completo de un archivo.
pub struct Source {
    name: String,
    text: String,
    lines: Vec<usize>,
}

impl Source {
    /// Construye un origen compartido a partir del texto de un archivo.
    pub fn new<N, T>(name: N, text: T) -> Rc<Self>
    where
        N: Into<String>,
        T: Into<String>,
    {
        let text = text.into();
        let lines = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(index, _)| index + 1))
            .collect();

        Rc::new(Source {
            name: name.into(),
            text,
            lines,
        })
    }

    /// Nombre del archivo, tal como se reporta en diagnósticos.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Texto completo.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Obtiene una línea por número (desde 1), sin el salto de línea.
    pub fn line(&self, number: u32) -> Option<&str> {
        let index = (number as usize).checked_sub(1)?;
        let start = *self.lines.get(index)?;
        let end = self
            .lines
            .get(index + 1)
            .copied()
            .unwrap_or(self.text.len());

        self.text
            .get(start..end)
            .map(|line| line.trim_end_matches(&['\n', '\r'][..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn positions_follow_lines_and_tabs() {
        let mut position = Position::default();
        let mut seen = Vec::new();
        for c in "ab\n\tc".chars() {
            seen.push((c, position.line(), position.column(), position.offset()));
            position = position.advance(c);
        }

        assert_eq!(
            seen,
            vec![
                ('a', 1, 1, 0),
                ('b', 1, 2, 1),
                ('\n', 1, 3, 2),
                ('\t', 2, 1, 3),
                ('c', 2, 5, 4),
            ]
        );
    }

    #[test]
    fn lines_are_recovered_without_terminators() {
        let source = Source::new("main.go", "package main\r\n\nfunc setup() {}");
        assert_eq!(source.line(1), Some("package main"));
        assert_eq!(source.line(2), Some(""));
        assert_eq!(source.line(3), Some("func setup() {}"));
        assert_eq!(source.line(4), None);
        assert_eq!(source.line(0), None);
    }

    #[test]
    fn location_text_is_a_byte_slice() {
        let source = Source::new("main.go", "go blink(13)\n");
        let mut end = Position::default();
        for c in "go blink(13)".chars() {
            end = end.advance(c);
        }

        let location = Location::new(&source, Position::default()..end);
        assert_eq!(location.text(), "go blink(13)");
        assert_eq!(location.to_string(), "main.go:1:1");
    }
}
