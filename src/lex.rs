//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del transpilador. Descompone el texto de un
//! [`Source`] en unidades léxicas denominadas tokens. Los espacios
//! en blanco y los comentarios se descartan durante esta operación. Cada
//! token emitido esta asociado a una ubicación en el código fuente original,
//! lo cual permite rastrear errores en tanto los mismos como constructos
//! más elevados de fases posteriores, y emitir pragmas `#line`.
//!
//! # Contenido de un token
//! Operadores, puntuación y palabras clave se identifican por el hecho de
//! lo que son y no incluyen lexemas. Los identificadores incluyen su lexema
//! original. Las constantes enteras, de cadena y de runa se resuelven a sus
//! valores; las constantes flotantes conservan su texto para no perder
//! precisión ni forma al ser reemitidas como C++.
//!
//! # Punto y coma implícito
//! Al igual que en Go, un salto de línea después de un identificador, una
//! constante, `return`, `break`, `continue`, `fallthrough`, `++`, `--`, `)`,
//! `]` o `}` produce un [`Token::Semicolon`]. El parser nunca ve saltos de
//! línea.
//!
//! # Errores
//! El lexer nunca falla. Un carácter desconocido o una constante mal formada
//! produce un [`Token::Error`] con el texto original, y el análisis continúa
//! en el siguiente carácter (o en la siguiente línea para constantes sin
//! terminar). Es el parser quien decide qué tan grave es cada error.

use crate::source::{Located, Location, Position, Source};
use std::{
    borrow::Borrow,
    fmt::{self, Display},
    iter::Peekable,
    rc::Rc,
    str::{Chars, FromStr},
};

use thiserror::Error;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("unexpected character {0:?}")]
    BadChar(char),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unterminated rune literal")]
    UnterminatedRune,

    #[error("rune literal must contain exactly one character")]
    BadRune,

    #[error("unterminated block comment")]
    UnterminatedComment,

    #[error("unknown escape sequence `\\{0}`")]
    BadEscape(char),

    #[error("malformed number literal `{0}`")]
    BadNumber(String),

    /// Una constante entera se encuentra fuera de rango.
    #[error("integer literal `{0}` overflows 64 bits")]
    IntOverflow(String),
}

/// Un identificador.
///
/// Los identificadores de Go distinguen mayúsculas de minúsculas, por lo
/// que se comparan byte a byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Rc<str>);

impl Identifier {
    pub fn new(name: &str) -> Self {
        Identifier(Rc::from(name))
    }

    /// El identificador vacío `_`.
    pub fn is_blank(&self) -> bool {
        &*self.0 == "_"
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Constante entera, junto con la base en que fue escrita.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IntLiteral {
    pub value: u64,
    pub radix: u32,
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    Int(IntLiteral),

    /// Literal flotante, sin separadores `_`.
    Float(String),

    /// Literal de cadena ya interpretado.
    Str(String),

    /// Literal de runa.
    Rune(char),

    /// Operador aritmético, lógico, de bits, de comparación o de asignación.
    Op(Op),

    /// `;`, explícito o insertado al final de una línea.
    Semicolon,

    /// `,`
    Comma,

    /// `.`
    Period,

    /// `:`
    Colon,

    /// `...`
    Ellipsis,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,

    /// `[`
    OpenSquare,

    /// `]`
    CloseSquare,

    /// Secuencia que no forma un token válido.
    Error { error: LexerError, raw: String },

    /// Fin del archivo. Se emite exactamente una vez.
    Eof,
}

impl Token {
    /// Determina si un salto de línea posterior a este token termina
    /// la sentencia actual.
    fn ends_statement(&self) -> bool {
        use Keyword::*;

        match self {
            Token::Id(_)
            | Token::Int(_)
            | Token::Float(_)
            | Token::Str(_)
            | Token::Rune(_)
            | Token::Error { .. }
            | Token::CloseParen
            | Token::CloseSquare
            | Token::CloseCurly => true,

            Token::Keyword(keyword) => matches!(keyword, Break | Continue | Fallthrough | Return),
            Token::Op(op) => matches!(op, Op::Inc | Op::Dec),
            _ => false,
        }
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            Int(integer) => write!(fmt, "literal `{}`", integer.value),
            Float(float) => write!(fmt, "literal `{}`", float),
            Str(string) => write!(fmt, "literal {:?}", string),
            Rune(rune) => write!(fmt, "literal {:?}", rune),
            Op(op) => write!(fmt, "`{}`", op),
            Semicolon => fmt.write_str("`;` or newline"),
            Comma => fmt.write_str("`,`"),
            Period => fmt.write_str("`.`"),
            Colon => fmt.write_str("`:`"),
            Ellipsis => fmt.write_str("`...`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenCurly => fmt.write_str("`{`"),
            CloseCurly => fmt.write_str("`}`"),
            OpenSquare => fmt.write_str("`[`"),
            CloseSquare => fmt.write_str("`]`"),
            Error { raw, .. } => write!(fmt, "invalid token `{}`", raw),
            Eof => fmt.write_str("end of file"),
        }
    }
}

/// Operadores.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    AndNot,
    LogicalAnd,
    LogicalOr,
    Arrow,
    Inc,
    Dec,
    Eq,
    Lt,
    Gt,
    Assign,
    Not,
    Ne,
    Le,
    Ge,
    Define,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShlAssign,
    ShrAssign,
    AndNotAssign,
}

/// Tabla de operadores. Todo prefijo de un operador es también un token,
/// incluyendo `:` como prefijo de `:=`.
const OPERATORS: &[(&str, Op)] = &[
    ("+", Op::Add),
    ("-", Op::Sub),
    ("*", Op::Mul),
    ("/", Op::Div),
    ("%", Op::Rem),
    ("&", Op::And),
    ("|", Op::Or),
    ("^", Op::Xor),
    ("<<", Op::Shl),
    (">>", Op::Shr),
    ("&^", Op::AndNot),
    ("&&", Op::LogicalAnd),
    ("||", Op::LogicalOr),
    ("<-", Op::Arrow),
    ("++", Op::Inc),
    ("--", Op::Dec),
    ("==", Op::Eq),
    ("<", Op::Lt),
    (">", Op::Gt),
    ("=", Op::Assign),
    ("!", Op::Not),
    ("!=", Op::Ne),
    ("<=", Op::Le),
    (">=", Op::Ge),
    (":=", Op::Define),
    ("+=", Op::AddAssign),
    ("-=", Op::SubAssign),
    ("*=", Op::MulAssign),
    ("/=", Op::DivAssign),
    ("%=", Op::RemAssign),
    ("&=", Op::AndAssign),
    ("|=", Op::OrAssign),
    ("^=", Op::XorAssign),
    ("<<=", Op::ShlAssign),
    (">>=", Op::ShrAssign),
    ("&^=", Op::AndNotAssign),
];

impl Display for Op {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = OPERATORS
            .iter()
            .find(|(_, op)| op == self)
            .map(|(symbol, _)| *symbol)
            .unwrap_or("?");

        fmt.write_str(symbol)
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Break,
    Case,
    Chan,
    Const,
    Continue,
    Default,
    Defer,
    Else,
    Fallthrough,
    For,
    Func,
    Go,
    Goto,
    If,
    Import,
    Interface,
    Map,
    Package,
    Range,
    Return,
    Select,
    Struct,
    Switch,
    Type,
    Var,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("break",       Keyword::Break),
    ("case",        Keyword::Case),
    ("chan",        Keyword::Chan),
    ("const",       Keyword::Const),
    ("continue",    Keyword::Continue),
    ("default",     Keyword::Default),
    ("defer",       Keyword::Defer),
    ("else",        Keyword::Else),
    ("fallthrough", Keyword::Fallthrough),
    ("for",         Keyword::For),
    ("func",        Keyword::Func),
    ("go",          Keyword::Go),
    ("goto",        Keyword::Goto),
    ("if",          Keyword::If),
    ("import",      Keyword::Import),
    ("interface",   Keyword::Interface),
    ("map",         Keyword::Map),
    ("package",     Keyword::Package),
    ("range",       Keyword::Range),
    ("return",      Keyword::Return),
    ("select",      Keyword::Select),
    ("struct",      Keyword::Struct),
    ("switch",      Keyword::Switch),
    ("type",        Keyword::Type),
    ("var",         Keyword::Var),
];

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = KEYWORDS
            .iter()
            .find(|(_, keyword)| keyword == self)
            .map(|(name, _)| *name)
            .unwrap_or("?");

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<'a> {
    from: &'a Rc<Source>,
    chars: Peekable<Chars<'a>>,
    state: State,
    start: Position,
    next: Position,
    semicolon: bool,
    done: bool,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado de completitud; siempre emite el token incluido
    /// y pasa a [`State::Start`].
    Complete(Token),

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),

    /// Constante numérica, validada al terminar.
    Number(String),

    /// Se encontró `.`, que puede iniciar `...` o un flotante.
    Dot,

    /// Se encontró `..`.
    DotDot,

    /// Operador posiblemente incompleto.
    Operator(String),

    /// Se encontró `/`: división, `/=` o comentario.
    Slash,

    /// Comentario de línea, termina antes de `'\n'`.
    LineComment,

    /// Comentario de bloque.
    BlockComment { star: bool, newline: bool },

    /// Cadena interpretada, sin secuencias de escape resueltas.
    StrLit { raw: String, escape: bool },

    /// Cadena cruda entre acentos graves.
    RawStr(String),

    /// Literal de runa.
    RuneLit { raw: String, escape: bool },
}

impl<'a> Lexer<'a> {
    /// Crea un lexer en estado inicial sobre un archivo.
    pub fn new(source: &'a Rc<Source>) -> Self {
        Lexer {
            from: source,
            chars: source.text().chars().peekable(),
            state: State::Start,
            start: Position::default(),
            next: Position::default(),
            semicolon: false,
            done: false,
        }
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Option<Token> {
        use {State::*, Token::*};

        let token = loop {
            let next_char = self.chars.peek().copied();

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                self.start = self.next;
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                (Start, None) => {
                    if std::mem::take(&mut self.semicolon) {
                        break Semicolon;
                    } else if self.done {
                        return None;
                    }

                    self.done = true;
                    break Eof;
                }

                (Start, Some('\n')) if self.semicolon => self.state = Complete(Semicolon),
                (Start, Some(c)) if c.is_whitespace() => (),

                // Tokens triviales
                (Start, Some(',')) => self.state = Complete(Comma),
                (Start, Some(';')) => self.state = Complete(Semicolon),
                (Start, Some('(')) => self.state = Complete(OpenParen),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('{')) => self.state = Complete(OpenCurly),
                (Start, Some('}')) => self.state = Complete(CloseCurly),
                (Start, Some('[')) => self.state = Complete(OpenSquare),
                (Start, Some(']')) => self.state = Complete(CloseSquare),
                (Start, Some('.')) => self.state = Dot,
                (Start, Some('/')) => self.state = Slash,
                (Start, Some('"')) => {
                    self.state = StrLit {
                        raw: String::new(),
                        escape: false,
                    }
                }
                (Start, Some('`')) => self.state = RawStr(String::new()),
                (Start, Some('\'')) => {
                    self.state = RuneLit {
                        raw: String::new(),
                        escape: false,
                    }
                }

                (Start, Some(c)) if c.is_alphabetic() || c == '_' => self.state = Word(c.to_string()),
                (Start, Some(c)) if c.is_ascii_digit() => self.state = Number(c.to_string()),
                (Start, Some(c)) if is_operator_prefix(&c.to_string()) => {
                    self.state = Operator(c.to_string())
                }

                // Se consume el carácter para que forme parte del texto
                // original del token de error
                (Start, Some(c)) => self.state = Complete(self.error(LexerError::BadChar(c), c)),

                // Emisión retardada de tokens cualesquiera
                (Complete(token), _) => break std::mem::replace(token, Eof),

                // Extensión de términos
                (Word(word), Some(c)) if c.is_alphanumeric() || c == '_' => word.push(c),
                (Word(word), _) => {
                    let word = std::mem::take(word);
                    match self::Keyword::from_str(&word) {
                        Ok(keyword) => break Keyword(keyword),
                        Err(()) => break Id(Identifier::new(&word)),
                    }
                }

                (Number(text), Some(c)) if continues_number(text, c) => text.push(c),
                (Number(text), _) => {
                    let text = std::mem::take(text);
                    break number(&text).unwrap_or_else(|error| self.error_token(error));
                }

                (Dot, Some(c)) if c.is_ascii_digit() => {
                    self.state = Number(String::from("."));
                    continue;
                }
                (Dot, Some('.')) => self.state = DotDot,
                (Dot, _) => break Period,
                (DotDot, Some('.')) => self.state = Complete(Ellipsis),
                (DotDot, _) => break self.error_token(LexerError::BadChar('.')),

                (Operator(text), Some(c)) if is_operator_prefix(&format!("{}{}", text, c)) => {
                    text.push(c)
                }
                (Operator(text), _) => {
                    let text = std::mem::take(text);
                    break operator(&text).unwrap_or_else(|| {
                        self.error_token(LexerError::BadChar(text.chars().next().unwrap_or('?')))
                    });
                }

                // `/` puede iniciar un comentario o ser un operador
                (Slash, Some('/')) => self.state = LineComment,
                (Slash, Some('*')) => {
                    self.state = BlockComment {
                        star: false,
                        newline: false,
                    }
                }
                (Slash, _) => {
                    self.state = Operator(String::from("/"));
                    continue;
                }

                // Los comentarios de línea descartan el resto de la línea,
                // pero el salto de línea se deja para inserción de `;`
                (LineComment, Some('\n')) | (LineComment, None) => {
                    self.state = Start;
                    continue;
                }
                (LineComment, Some(_)) => (),

                (BlockComment { star: true, newline }, Some('/')) => {
                    self.state = if *newline && self.semicolon {
                        Complete(Semicolon)
                    } else {
                        Start
                    };
                }
                (BlockComment { star, newline }, Some(c)) => {
                    *star = c == '*';
                    *newline |= c == '\n';
                }
                (BlockComment { .. }, None) => break self.error_token(LexerError::UnterminatedComment),

                // Una cadena sin terminar se corta en el fin de línea
                (StrLit { raw, escape: false }, Some('"')) => {
                    let raw = std::mem::take(raw);
                    self.state = Complete(
                        unescape(&raw, '"')
                            .map(Str)
                            .unwrap_or_else(|error| self.error(error, '"')),
                    );
                }
                (StrLit { .. }, Some('\n')) | (StrLit { .. }, None) => {
                    break self.error_token(LexerError::UnterminatedString)
                }
                (StrLit { raw, escape }, Some(c)) => {
                    raw.push(c);
                    *escape = !*escape && c == '\\';
                }

                (RawStr(raw), Some('`')) => {
                    let raw = std::mem::take(raw).replace('\r', "");
                    self.state = Complete(Str(raw));
                }
                (RawStr(_), None) => break self.error_token(LexerError::UnterminatedString),
                (RawStr(raw), Some(c)) => raw.push(c),

                (RuneLit { raw, escape: false }, Some('\'')) => {
                    let raw = std::mem::take(raw);
                    let rune = unescape(&raw, '\'').and_then(|text| {
                        let mut chars = text.chars();
                        match (chars.next(), chars.next()) {
                            (Some(rune), None) => Ok(rune),
                            _ => Err(LexerError::BadRune),
                        }
                    });

                    self.state = Complete(rune.map(Rune).unwrap_or_else(|error| self.error(error, '\'')));
                }
                (RuneLit { .. }, Some('\n')) | (RuneLit { .. }, None) => {
                    break self.error_token(LexerError::UnterminatedRune)
                }
                (RuneLit { raw, escape }, Some(c)) => {
                    raw.push(c);
                    *escape = !*escape && c == '\\';
                }
            }

            // Si no hubo `continue` o `break`, aquí se consume el carácter
            // que se observó con lookahead anteriormente
            if let Some(c) = self.chars.next() {
                self.next = self.next.advance(c);
            }
        };

        self.state = State::Start;
        self.semicolon = token.ends_statement();

        Some(token)
    }

    /// Construye un token de error cuyo texto original incluye un último
    /// carácter aún no consumido.
    fn error(&self, error: LexerError, last: char) -> Token {
        let mut raw = self.raw().to_owned();
        raw.push(last);

        Token::Error { error, raw }
    }

    /// Construye un token de error con el texto consumido hasta ahora.
    fn error_token(&self, error: LexerError) -> Token {
        Token::Error {
            error,
            raw: self.raw().to_owned(),
        }
    }

    fn raw(&self) -> &'a str {
        let text: &'a str = self.from.text();
        text.get(self.start.offset()..self.next.offset()).unwrap_or("")
    }
}

impl Iterator for Lexer<'_> {
    type Item = Located<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.lex()?;
        let location = Location::new(self.from, self.start..self.next);

        Some(Located::at(token, location))
    }
}

/// Descompone un archivo completo, incluyendo el token [`Token::Eof`] final.
pub fn tokenize(source: &Rc<Source>) -> Vec<Located<Token>> {
    Lexer::new(source).collect()
}

fn is_operator_prefix(text: &str) -> bool {
    text == ":" || OPERATORS.iter().any(|(symbol, _)| symbol.starts_with(text))
}

fn operator(text: &str) -> Option<Token> {
    if text == ":" {
        return Some(Token::Colon);
    }

    OPERATORS
        .iter()
        .find(|(symbol, _)| *symbol == text)
        .map(|&(_, op)| Token::Op(op))
}

/// Determina si un carácter extiende una constante numérica.
fn continues_number(text: &str, c: char) -> bool {
    let hex = text.starts_with("0x") || text.starts_with("0X");
    match c {
        '+' | '-' => !hex && text.ends_with(&['e', 'E'][..]),
        '.' => !text.contains('.'),
        _ => c.is_ascii_alphanumeric() || c == '_',
    }
}

/// Valida y resuelve una constante numérica.
fn number(text: &str) -> Result<Token, LexerError> {
    let bad = || LexerError::BadNumber(text.to_owned());
    let clean: String = text.chars().filter(|&c| c != '_').collect();
    if text.ends_with('_') || text.contains("__") {
        return Err(bad());
    }

    let lower = clean.to_ascii_lowercase();
    let (digits, radix) = if let Some(hex) = lower.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(binary) = lower.strip_prefix("0b") {
        (binary, 2)
    } else if let Some(octal) = lower.strip_prefix("0o") {
        (octal, 8)
    } else if lower.contains(&['.', 'e'][..]) {
        return match clean.parse::<f64>() {
            Ok(_) => Ok(Token::Float(clean)),
            Err(_) => Err(bad()),
        };
    } else if lower.len() > 1 && lower.starts_with('0') {
        (&lower[1..], 8)
    } else {
        (lower.as_str(), 10)
    };

    if digits.is_empty() {
        return Err(bad());
    }

    let mut value: u64 = 0;
    for digit in digits.chars() {
        let digit = digit.to_digit(radix).ok_or_else(bad)?;
        value = value
            .checked_mul(radix as u64)
            .and_then(|n| n.checked_add(digit as u64))
            .ok_or_else(|| LexerError::IntOverflow(text.to_owned()))?;
    }

    Ok(Token::Int(IntLiteral { value, radix }))
}

/// Resuelve secuencias de escape dentro de una cadena o runa.
fn unescape(raw: &str, quote: char) -> Result<String, LexerError> {
    let mut output = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            output.push(c);
            continue;
        }

        let escaped = chars.next().ok_or(LexerError::BadEscape(' '))?;
        let resolved = match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'a' => '\u{07}',
            'b' => '\u{08}',
            'f' => '\u{0c}',
            'v' => '\u{0b}',
            '\\' => '\\',
            c if c == quote => c,

            'x' | 'u' | 'U' => {
                let width = match escaped {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };

                let digits: String = chars.by_ref().take(width).collect();
                u32::from_str_radix(&digits, 16)
                    .ok()
                    .filter(|_| digits.len() == width)
                    .and_then(char::from_u32)
                    .ok_or(LexerError::BadEscape(escaped))?
            }

            '0'..='7' => {
                let rest: String = chars.by_ref().take(2).collect();
                let digits = format!("{}{}", escaped, rest);
                u32::from_str_radix(&digits, 8)
                    .ok()
                    .filter(|_| digits.len() == 3)
                    .and_then(char::from_u32)
                    .ok_or(LexerError::BadEscape(escaped))?
            }

            other => return Err(LexerError::BadEscape(other)),
        };

        output.push(resolved);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(text: &str) -> Vec<Token> {
        let source = Source::new("test.go", text);
        tokenize(&source).into_iter().map(Located::into_inner).collect()
    }

    fn id(name: &str) -> Token {
        Token::Id(Identifier::new(name))
    }

    fn int(value: u64) -> Token {
        Token::Int(IntLiteral { value, radix: 10 })
    }

    #[test]
    fn keywords_identifiers_and_semicolons() {
        assert_eq!(
            tokens("package main\n\nfunc setup() {\n\treturn\n}\n"),
            vec![
                Token::Keyword(Keyword::Package),
                id("main"),
                Token::Semicolon,
                Token::Keyword(Keyword::Func),
                id("setup"),
                Token::OpenParen,
                Token::CloseParen,
                Token::OpenCurly,
                Token::Keyword(Keyword::Return),
                Token::Semicolon,
                Token::CloseCurly,
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn semicolon_is_inserted_at_end_of_file() {
        assert_eq!(tokens("x++"), vec![id("x"), Token::Op(Op::Inc), Token::Semicolon, Token::Eof]);
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(
            tokens("a &^= b <<= 2 := c &^ d <- e ..."),
            vec![
                id("a"),
                Token::Op(Op::AndNotAssign),
                id("b"),
                Token::Op(Op::ShlAssign),
                int(2),
                Token::Op(Op::Define),
                id("c"),
                Token::Op(Op::AndNot),
                id("d"),
                Token::Op(Op::Arrow),
                id("e"),
                Token::Ellipsis,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn number_literals() {
        assert_eq!(
            tokens("0xFF 0b101 0o17 017 1_000 1.5 1e9 .25"),
            vec![
                Token::Int(IntLiteral { value: 255, radix: 16 }),
                Token::Int(IntLiteral { value: 5, radix: 2 }),
                Token::Int(IntLiteral { value: 15, radix: 8 }),
                Token::Int(IntLiteral { value: 15, radix: 8 }),
                int(1000),
                Token::Float(String::from("1.5")),
                Token::Float(String::from("1e9")),
                Token::Float(String::from(".25")),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn integer_overflow_is_an_error_token() {
        let lexed = tokens("99999999999999999999999");
        assert!(matches!(
            &lexed[0],
            Token::Error { error: LexerError::IntOverflow(_), .. }
        ));
    }

    #[test]
    fn strings_runes_and_escapes() {
        assert_eq!(
            tokens(r#""a\tb\"c" `raw\n` 'x' '\n' '\x41'"#),
            vec![
                Token::Str(String::from("a\tb\"c")),
                Token::Str(String::from("raw\\n")),
                Token::Rune('x'),
                Token::Rune('\n'),
                Token::Rune('A'),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_discarded() {
        assert_eq!(
            tokens("a // comment\n/* block\n */ b /* inline */ c"),
            vec![id("a"), Token::Semicolon, id("b"), id("c"), Token::Semicolon, Token::Eof]
        );
    }

    #[test]
    fn unterminated_string_recovers_on_next_line() {
        let source = Source::new("test.go", "var msg = \"hello\nx := 1\n");
        let lexed = tokenize(&source);

        let (location, error) = lexed[3].clone().split();
        assert_eq!(
            error,
            Token::Error {
                error: LexerError::UnterminatedString,
                raw: String::from("\"hello"),
            }
        );
        assert_eq!((location.start().line(), location.start().column()), (1, 11));

        let rest: Vec<_> = lexed[4..].iter().map(|token| token.val().clone()).collect();
        assert_eq!(
            rest,
            vec![Token::Semicolon, id("x"), Token::Op(Op::Define), int(1), Token::Semicolon, Token::Eof]
        );
    }

    #[test]
    fn bad_characters_do_not_stop_the_lexer() {
        assert_eq!(
            tokens("a @ b"),
            vec![
                id("a"),
                Token::Error {
                    error: LexerError::BadChar('@'),
                    raw: String::from("@"),
                },
                id("b"),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn locations_cover_token_text() {
        let source = Source::new("test.go", "arduino.DigitalWrite(13)");
        let lexed = tokenize(&source);
        let texts: Vec<_> = lexed.iter().map(|token| token.location().text()).collect();

        assert_eq!(texts, vec!["arduino", ".", "DigitalWrite", "(", "13", ")", "", ""]);
    }

    #[test]
    fn relexing_is_deterministic() {
        let source = Source::new("test.go", "for i := 0; i < 10; i++ { x += i }");
        assert_eq!(tokenize(&source).len(), tokenize(&source).len());
        assert_eq!(
            tokenize(&source).into_iter().map(Located::into_inner).collect::<Vec<_>>(),
            tokenize(&source).into_iter().map(Located::into_inner).collect::<Vec<_>>()
        );
    }
}
