//! Análisis sintáctico.
//!
//! Parser de descenso recursivo con un token de lookahead, extendido a
//! dos o tres tokens solo donde la gramática es ambigua (parámetros con
//! nombre, claves de literales compuestos, parámetros genéricos). Las
//! expresiones binarias se resuelven por precedencia al estilo Pratt.
//!
//! # Recuperación
//! Un error dentro de una declaración de primer nivel descarta tokens hasta
//! la siguiente palabra clave `func`, `var`, `const` o `type` que no esté
//! anidada entre llaves, de manera que un solo error no oculte a los demás.
//!
//! Los tokens de error léxico en posición de expresión se convierten en
//! [`Expr::Invalid`]. En cualquier otra posición provocan un error de
//! sintaxis que no se reporta, pues el lexer ya lo hizo.

use std::{mem, rc::Rc};
use thiserror::Error;

use crate::{
    ast::*,
    lex::{Identifier, Keyword, Op, Token},
    source::{Located, Location, Source},
};

#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ParserError {
    #[error("expected {expected}, found {found}")]
    Unexpected { expected: String, found: Token },

    #[error("mixed named and unnamed parameters")]
    MixedParameters,

    #[error("non-name on left side of `:=`")]
    BadDefine,

    #[error("expected 1 expression, found {0}")]
    ExpressionList(usize),

    #[error("expected a condition")]
    ExpectedCondition,

    #[error("missing value in constant declaration")]
    MissingConstValue,

    #[error("labels are not supported")]
    Labels,

    #[error("local type declarations are not supported")]
    LocalType,

    #[error("embedded fields are not supported")]
    EmbeddedField,

    #[error("function `{0}` has no body")]
    MissingBody(Identifier),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedError),
}

impl ParserError {
    /// Determina si el error se debe a un token léxico inválido.
    pub fn is_lexical(&self) -> bool {
        matches!(
            self,
            ParserError::Unexpected {
                found: Token::Error { .. },
                ..
            }
        )
    }
}

/// Constructos rechazados de forma definitiva: no tienen traducción
/// correcta a un microcontrolador sin sistema operativo.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnsupportedError {
    #[error("channel types and operations are not supported on bare-metal targets")]
    Channel,

    #[error("`select` statements are not supported on bare-metal targets")]
    Select,

    #[error("generic type parameters are not supported")]
    Generics,

    #[error("map types require a heap and are not supported")]
    Map,

    #[error("function literals (closures) are not supported")]
    Closure,

    #[error("function types are not supported")]
    FuncType,

    #[error("variadic parameters and arguments are not supported")]
    Variadic,

    #[error("`goto` is not supported")]
    Goto,

    #[error("type assertions and type switches are not supported")]
    TypeAssertion,

    #[error("slice expressions are not supported")]
    SliceExpr,

    #[error("interface values are not supported; interfaces may only be declared")]
    InterfaceValue,

    #[error("anonymous struct types are not supported")]
    AnonymousStruct,
}

/// Construye el AST de un archivo.
///
/// Se reportan todos los errores de sintaxis encontrados en una sola
/// pasada. La lista de errores puede estar vacía si todos los fallos se
/// debieron a tokens léxicos inválidos, los cuales ya fueron reportados.
pub fn parse(source: &Rc<Source>, tokens: &[Located<Token>]) -> Result<Ast, Vec<Located<ParserError>>> {
    if !matches!(tokens.last().map(Located::val), Some(Token::Eof)) {
        let error = ParserError::Unexpected {
            expected: String::from("end of file"),
            found: Token::Eof,
        };

        return Err(vec![Located::at(error, Location::start_of(source))]);
    }

    let mut depth = 0;
    let depths: Vec<u32> = tokens
        .iter()
        .map(|token| match token.val() {
            Token::OpenCurly => {
                depth += 1;
                depth - 1
            }

            Token::CloseCurly => {
                depth = u32::saturating_sub(depth, 1);
                depth
            }

            _ => depth,
        })
        .collect();

    let mut parser = Parser {
        tokens,
        depths: &depths,
        cursor: 0,
        last_known: Location::start_of(source),
        composites: true,
    };

    parser.program()
}

#[derive(Clone)]
struct Parser<'a> {
    tokens: &'a [Located<Token>],
    depths: &'a [u32],
    cursor: usize,
    last_known: Location,

    /// Falso en encabezados de `if`, `for` y `switch`, donde `T {`
    /// inicia un bloque y no un literal compuesto.
    composites: bool,
}

enum Failure {
    Weak(Located<ParserError>),
    Strict(Located<ParserError>),
}

impl Failure {
    fn coerce(self) -> Located<ParserError> {
        match self {
            Failure::Weak(error) => error,
            Failure::Strict(error) => error,
        }
    }
}

type Parse<T> = Result<T, Failure>;

/// Sentencia simple, o la cláusula de un `for ... range`.
enum Simple {
    Stmt(Located<Stmt>),
    Range {
        key: Option<Located<Identifier>>,
        value: Option<Located<Identifier>>,
        define: bool,
        iterable: Located<Expr>,
    },
}

impl<'a> Parser<'a> {
    fn program(&mut self) -> Result<Ast, Vec<Located<ParserError>>> {
        let mut errors = Vec::new();
        let mut failed = false;
        let mut record = |failure: Failure| {
            failed = true;

            let error = failure.coerce();
            if !error.as_ref().is_lexical() {
                errors.push(error);
            }
        };

        let package = match self.package_clause() {
            Ok(package) => Some(package),
            Err(failure) => {
                record(failure);
                self.synchronize(0);
                None
            }
        };

        let mut imports = Vec::new();
        loop {
            self.skip_semicolons();
            if !self.at(&Token::Keyword(Keyword::Import)) {
                break;
            }

            let start = self.cursor;
            match self.import_decl() {
                Ok(mut group) => imports.append(&mut group),
                Err(failure) => {
                    record(failure);
                    self.synchronize(start);
                }
            }
        }

        let mut decls = Vec::new();
        loop {
            self.skip_semicolons();
            if self.at(&Token::Eof) {
                break;
            }

            let start = self.cursor;
            match self.top_level() {
                Ok(mut group) => decls.append(&mut group),
                Err(failure) => {
                    record(failure);
                    self.synchronize(start);
                }
            }
        }

        match package {
            Some(package) if !failed => Ok(Ast {
                package,
                imports,
                decls,
            }),

            _ => Err(errors),
        }
    }

    /// Descarta tokens hasta la siguiente frontera de primer nivel.
    fn synchronize(&mut self, start: usize) {
        self.composites = true;
        self.cursor = self.cursor.max(start + 1).min(self.tokens.len() - 1);

        while !self.at(&Token::Eof) {
            let boundary = self.depths[self.cursor] == 0
                && matches!(
                    self.peek(),
                    Token::Keyword(Keyword::Func | Keyword::Var | Keyword::Const | Keyword::Type)
                );

            if boundary {
                break;
            }

            self.cursor += 1;
        }
    }

    fn package_clause(&mut self) -> Parse<Located<Identifier>> {
        self.skip_semicolons();
        self.keyword(Keyword::Package)?;
        let name = self.id()?;
        self.terminator()?;

        Ok(name)
    }

    fn import_decl(&mut self) -> Parse<Vec<Import>> {
        self.keyword(Keyword::Import)?;

        let imports = if self.eat(&Token::OpenParen) {
            let mut imports = Vec::new();
            self.group(|s| {
                imports.push(s.import_spec()?);
                Ok(())
            })?;

            imports
        } else {
            vec![self.import_spec()?]
        };

        self.terminator()?;
        Ok(imports)
    }

    fn import_spec(&mut self) -> Parse<Import> {
        let alias = match self.peek() {
            Token::Id(_) => Some(self.id()?),
            _ => None,
        };

        match self.peek() {
            Token::Str(path) => {
                let path = path.clone();
                let (location, _) = self.next().split();

                Ok(Import {
                    alias,
                    path: Located::at(path, location),
                })
            }

            _ => self.unexpected("import path"),
        }
    }

    fn top_level(&mut self) -> Parse<Vec<Decl>> {
        let decls = match self.peek() {
            Token::Keyword(Keyword::Func) => vec![Decl::Func(self.func_decl()?)],

            Token::Keyword(Keyword::Var) => {
                let (location, specs) = self.var_decl()?;
                vec![Decl::Var(Located::at(specs, location))]
            }

            Token::Keyword(Keyword::Const) => {
                let (location, specs) = self.const_decl()?;
                vec![Decl::Const(Located::at(specs, location))]
            }

            Token::Keyword(Keyword::Type) => self.type_decl()?,
            Token::Keyword(Keyword::Import) => return self.unexpected("declaration after imports"),
            _ => return self.unexpected("`func`, `var`, `const` or `type`"),
        };

        self.terminator()?;
        Ok(decls)
    }

    fn func_decl(&mut self) -> Parse<FuncDecl> {
        let start = self.keyword(Keyword::Func)?;

        let receiver = if self.at(&Token::OpenParen) {
            Some(self.receiver()?)
        } else {
            None
        };

        let name = self.id()?;
        if self.at(&Token::OpenSquare) {
            return self.unsupported(UnsupportedError::Generics);
        }

        let params = self.parameters()?;
        let results = self.results(&name, receiver.as_ref())?;

        if !self.at(&Token::OpenCurly) {
            return self.fail(ParserError::MissingBody(name.into_inner()));
        }

        let body = self.block()?;

        Ok(FuncDecl {
            name,
            receiver,
            params,
            results,
            body,
            location: self.since(&start),
        })
    }

    fn receiver(&mut self) -> Parse<Receiver> {
        self.expect(Token::OpenParen)?;

        let name = match (self.peek(), self.peek_at(1)) {
            (Token::Id(_), Token::CloseParen) => None,
            (Token::Id(_), _) => Some(self.id()?),
            _ => None,
        };

        let pointer = self.eat(&Token::Op(Op::Mul));
        let typ = self.id()?;
        if self.at(&Token::OpenSquare) {
            return self.unsupported(UnsupportedError::Generics);
        }

        self.expect(Token::CloseParen)?;
        Ok(Receiver { name, typ, pointer })
    }

    fn parameters(&mut self) -> Parse<Vec<Param>> {
        self.expect(Token::OpenParen)?;

        let mut entries = Vec::new();
        let mut named = false;

        while !self.at(&Token::CloseParen) {
            if self.at(&Token::Ellipsis) {
                return self.unsupported(UnsupportedError::Variadic);
            }

            let entry = match self.peek() {
                Token::Id(_) if starts_type(self.peek_at(1)) || self.peek_at(1) == &Token::Ellipsis => {
                    let name = self.id()?;
                    if self.at(&Token::Ellipsis) {
                        return self.unsupported(UnsupportedError::Variadic);
                    }

                    named = true;
                    (Some(name), self.typ()?)
                }

                _ => (None, self.typ()?),
            };

            entries.push(entry);
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        self.expect(Token::CloseParen)?;

        if !named {
            let params = entries
                .into_iter()
                .map(|(_, typ)| Param { name: None, typ })
                .collect();

            return Ok(params);
        }

        // `a, b int` agrupa nombres: los identificadores sueltos toman
        // el tipo de la siguiente entrada con nombre
        let mut params = Vec::new();
        let mut pending = Vec::new();

        for (name, typ) in entries {
            match name {
                Some(name) => {
                    for pending in pending.drain(..) {
                        params.push(Param {
                            name: Some(pending),
                            typ: typ.clone(),
                        });
                    }

                    params.push(Param {
                        name: Some(name),
                        typ,
                    });
                }

                None => match typ.split() {
                    (location, Type::Named(id)) => pending.push(Located::at(id, location)),
                    _ => return self.fail(ParserError::MixedParameters),
                },
            }
        }

        if !pending.is_empty() {
            return self.fail(ParserError::MixedParameters);
        }

        Ok(params)
    }

    fn results(&mut self, name: &Located<Identifier>, receiver: Option<&Receiver>) -> Parse<Results> {
        if !self.at(&Token::OpenParen) {
            return Ok(match self.optional(Parser::typ)? {
                Some(typ) => Results::Single(Param { name: None, typ }),
                None => Results::Void,
            });
        }

        let mut params = self.parameters()?;
        let results = match params.len() {
            0 => Results::Void,
            1 => Results::Single(params.remove(0)),

            _ => {
                let named = params[0].name.is_some();
                let fields = params
                    .into_iter()
                    .enumerate()
                    .map(|(index, param)| {
                        let name = param.name.unwrap_or_else(|| {
                            let synthesized = Identifier::new(&format!("ret{}", index));
                            Located::at(synthesized, param.typ.location().clone())
                        });

                        Field {
                            name,
                            typ: param.typ,
                        }
                    })
                    .collect();

                let receiver = receiver.map(|receiver| receiver.typ.as_ref().as_ref());
                let name = Aggregate::name_for(name.as_ref().as_ref(), receiver);

                Results::Multiple(Aggregate {
                    name,
                    fields,
                    named,
                })
            }
        };

        Ok(results)
    }

    fn var_decl(&mut self) -> Parse<(Location, Vec<VarSpec>)> {
        let start = self.keyword(Keyword::Var)?;

        let specs = if self.eat(&Token::OpenParen) {
            let mut specs = Vec::new();
            self.group(|s| {
                specs.push(s.var_spec()?);
                Ok(())
            })?;

            specs
        } else {
            vec![self.var_spec()?]
        };

        Ok((self.since(&start), specs))
    }

    fn var_spec(&mut self) -> Parse<VarSpec> {
        let names = self.id_list()?;
        let typ = if self.at(&Token::Op(Op::Assign)) {
            None
        } else {
            Some(self.typ()?)
        };

        let values = if self.eat(&Token::Op(Op::Assign)) {
            self.expr_list()?
        } else {
            Vec::new()
        };

        Ok(VarSpec { names, typ, values })
    }

    fn const_decl(&mut self) -> Parse<(Location, Vec<ConstSpec>)> {
        let start = self.keyword(Keyword::Const)?;

        let specs = if self.eat(&Token::OpenParen) {
            let mut specs: Vec<ConstSpec> = Vec::new();
            self.group(|s| {
                let previous = specs.last();
                let spec = s.const_spec(previous, specs.len() as u64)?;

                specs.push(spec);
                Ok(())
            })?;

            specs
        } else {
            vec![self.const_spec(None, 0)?]
        };

        Ok((self.since(&start), specs))
    }

    /// Una especificación sin valor repite el tipo y las expresiones
    /// de la anterior, con su propio valor de `iota`.
    fn const_spec(&mut self, previous: Option<&ConstSpec>, iota: u64) -> Parse<ConstSpec> {
        let names = self.id_list()?;
        let typ = match self.peek() {
            Token::Op(Op::Assign) | Token::Semicolon | Token::CloseParen => None,
            _ => Some(self.typ()?),
        };

        let (typ, values) = if self.eat(&Token::Op(Op::Assign)) {
            (typ, self.expr_list()?)
        } else {
            match (typ, previous) {
                (None, Some(previous)) => (previous.typ.clone(), previous.values.clone()),
                _ => return self.fail(ParserError::MissingConstValue),
            }
        };

        Ok(ConstSpec {
            names,
            typ,
            values,
            iota,
        })
    }

    fn type_decl(&mut self) -> Parse<Vec<Decl>> {
        self.keyword(Keyword::Type)?;

        if self.eat(&Token::OpenParen) {
            let mut decls = Vec::new();
            self.group(|s| {
                decls.push(s.type_spec()?);
                Ok(())
            })?;

            Ok(decls)
        } else {
            Ok(vec![self.type_spec()?])
        }
    }

    fn type_spec(&mut self) -> Parse<Decl> {
        let name = self.id()?;

        // `type A[T any]` frente a `type A [N]int`
        let generic = self.at(&Token::OpenSquare)
            && matches!(self.peek_at(1), Token::Id(_))
            && !matches!(self.peek_at(2), Token::CloseSquare);

        if generic {
            return self.unsupported(UnsupportedError::Generics);
        }

        self.eat(&Token::Op(Op::Assign));

        let decl = match self.peek() {
            Token::Keyword(Keyword::Struct) => {
                self.next();
                let fields = self.struct_fields()?;

                Decl::Struct(StructDecl { name, fields })
            }

            Token::Keyword(Keyword::Interface) => {
                self.next();
                let methods = self.interface_methods()?;

                Decl::Interface(InterfaceDecl { name, methods })
            }

            _ => {
                let typ = self.typ()?;
                Decl::Type(TypeDecl { name, typ })
            }
        };

        Ok(decl)
    }

    fn struct_fields(&mut self) -> Parse<Vec<Field>> {
        self.expect(Token::OpenCurly)?;

        let mut fields = Vec::new();
        loop {
            self.skip_semicolons();
            if self.at(&Token::CloseCurly) {
                break;
            }

            let embedded = matches!(self.peek(), Token::Op(Op::Mul))
                || matches!(
                    (self.peek(), self.peek_at(1)),
                    (Token::Id(_), Token::Semicolon | Token::CloseCurly | Token::Period | Token::Str(_))
                );

            if embedded {
                return self.fail(ParserError::EmbeddedField);
            }

            let names = self.id_list()?;
            let typ = self.typ()?;

            // Las etiquetas de campo se descartan
            if let Token::Str(_) = self.peek() {
                self.next();
            }

            for name in names {
                fields.push(Field {
                    name,
                    typ: typ.clone(),
                });
            }

            if !self.at(&Token::CloseCurly) {
                self.expect(Token::Semicolon)?;
            }
        }

        self.expect(Token::CloseCurly)?;
        Ok(fields)
    }

    fn interface_methods(&mut self) -> Parse<Vec<Located<Identifier>>> {
        self.expect(Token::OpenCurly)?;

        let mut methods = Vec::new();
        loop {
            self.skip_semicolons();
            if self.at(&Token::CloseCurly) {
                break;
            }

            let name = self.id()?;
            if self.at(&Token::OpenParen) {
                self.parameters()?;
                self.results(&name, None)?;
                methods.push(name);
            } else if self.eat(&Token::Period) {
                // Interfaz incrustada de otro paquete, sin métodos propios
                self.id()?;
            }

            if !self.at(&Token::CloseCurly) {
                self.expect(Token::Semicolon)?;
            }
        }

        self.expect(Token::CloseCurly)?;
        Ok(methods)
    }

    fn block(&mut self) -> Parse<Block> {
        self.expect(Token::OpenCurly)?;
        let composites = mem::replace(&mut self.composites, true);

        let mut statements = Vec::new();
        loop {
            self.skip_semicolons();
            if self.at(&Token::CloseCurly) {
                break;
            }

            statements.push(self.statement()?);
            if !self.at(&Token::CloseCurly) {
                self.expect(Token::Semicolon)?;
            }
        }

        self.expect(Token::CloseCurly)?;
        self.composites = composites;

        Ok(statements)
    }

    fn statement(&mut self) -> Parse<Located<Stmt>> {
        let start = self.here();

        let statement = match self.peek() {
            Token::Keyword(Keyword::Var) => Stmt::Var(self.var_decl()?.1),
            Token::Keyword(Keyword::Const) => Stmt::Const(self.const_decl()?.1),
            Token::Keyword(Keyword::Type) => return self.fail(ParserError::LocalType),

            Token::Keyword(Keyword::Return) => {
                self.next();
                let values = match self.peek() {
                    Token::Semicolon | Token::CloseCurly => Vec::new(),
                    _ => self.expr_list()?,
                };

                Stmt::Return(values)
            }

            Token::Keyword(Keyword::If) => Stmt::If(self.if_statement()?.into_inner()),
            Token::Keyword(Keyword::For) => self.for_statement()?,
            Token::Keyword(Keyword::Switch) => Stmt::Switch(self.switch_statement()?),
            Token::Keyword(Keyword::Break) => self.branch(Stmt::Break)?,
            Token::Keyword(Keyword::Continue) => self.branch(Stmt::Continue)?,
            Token::Keyword(Keyword::Fallthrough) => self.branch(Stmt::Fallthrough)?,
            Token::Keyword(Keyword::Go) => self.deferred(Unsupported::Go),
            Token::Keyword(Keyword::Defer) => self.deferred(Unsupported::Defer),
            Token::Keyword(Keyword::Goto) => return self.unsupported(UnsupportedError::Goto),
            Token::Keyword(Keyword::Select) => return self.unsupported(UnsupportedError::Select),
            Token::OpenCurly => Stmt::Block(self.block()?),

            _ => return self.simple_statement(),
        };

        Ok(Located::at(statement, self.since(&start)))
    }

    fn branch(&mut self, statement: Stmt) -> Parse<Stmt> {
        self.next();
        if let Token::Id(_) = self.peek() {
            return self.fail(ParserError::Labels);
        }

        Ok(statement)
    }

    /// `go` y `defer` se conservan como texto hasta el final de la
    /// sentencia, sin interpretar su contenido.
    fn deferred(&mut self, kind: Unsupported) -> Stmt {
        let start = self.here();
        self.next();

        let mut depth = 0usize;
        loop {
            match self.peek() {
                Token::Eof => break,
                Token::Semicolon | Token::CloseCurly if depth == 0 => break,
                Token::OpenParen | Token::OpenCurly | Token::OpenSquare => depth += 1,
                Token::CloseParen | Token::CloseCurly | Token::CloseSquare => {
                    depth = depth.saturating_sub(1)
                }

                _ => (),
            }

            self.next();
        }

        let text = self.since(&start).text().to_owned();
        Stmt::Unsupported { kind, text }
    }

    fn simple_statement(&mut self) -> Parse<Located<Stmt>> {
        match self.simple(false)? {
            Simple::Stmt(statement) => Ok(statement),
            Simple::Range { iterable, .. } => {
                let error = ParserError::Unexpected {
                    expected: String::from("statement"),
                    found: Token::Keyword(Keyword::Range),
                };

                Err(Failure::Strict(Located::at(error, iterable.location().clone())))
            }
        }
    }

    fn simple(&mut self, range: bool) -> Parse<Simple> {
        let start = self.here();

        if range && self.eat(&Token::Keyword(Keyword::Range)) {
            return Ok(Simple::Range {
                key: None,
                value: None,
                define: false,
                iterable: self.expr()?,
            });
        }

        let mut lhs = self.expr_list()?;
        let statement = match self.peek() {
            Token::Op(op @ (Op::Define | Op::Assign)) => {
                let define = *op == Op::Define;
                self.next();

                if range && self.eat(&Token::Keyword(Keyword::Range)) {
                    let iterable = self.expr()?;
                    return self.range_clause(lhs, define, iterable);
                }

                let values = self.expr_list()?;
                if define {
                    let names = lhs
                        .into_iter()
                        .map(|expr| match expr.split() {
                            (location, Expr::Ident(id)) => Ok(Located::at(id, location)),
                            (location, _) => Err(Failure::Strict(Located::at(ParserError::BadDefine, location))),
                        })
                        .collect::<Parse<Vec<_>>>()?;

                    Stmt::Define { names, values }
                } else {
                    Stmt::Assign {
                        targets: lhs,
                        op: None,
                        values,
                    }
                }
            }

            Token::Op(op) if BinOp::from_assign(*op).is_some() => {
                let op = BinOp::from_assign(*op);
                self.next();

                if lhs.len() != 1 {
                    return self.fail(ParserError::ExpressionList(lhs.len()));
                }

                Stmt::Assign {
                    targets: lhs,
                    op,
                    values: vec![self.expr()?],
                }
            }

            Token::Op(op @ (Op::Inc | Op::Dec)) => {
                let increment = *op == Op::Inc;
                self.next();

                if lhs.len() != 1 {
                    return self.fail(ParserError::ExpressionList(lhs.len()));
                }

                Stmt::IncDec {
                    target: lhs.remove(0),
                    increment,
                }
            }

            Token::Op(Op::Arrow) => return self.unsupported(UnsupportedError::Channel),
            Token::Colon if lhs.len() == 1 => return self.fail(ParserError::Labels),

            _ if lhs.len() == 1 => Stmt::Expr(lhs.remove(0)),
            _ => return self.fail(ParserError::ExpressionList(lhs.len())),
        };

        Ok(Simple::Stmt(Located::at(statement, self.since(&start))))
    }

    fn range_clause(&mut self, lhs: Vec<Located<Expr>>, define: bool, iterable: Located<Expr>) -> Parse<Simple> {
        if lhs.len() > 2 {
            return self.fail(ParserError::ExpressionList(lhs.len()));
        }

        let mut names = Vec::new();
        for expr in lhs {
            match expr.split() {
                (location, Expr::Ident(id)) => names.push(Located::at(id, location)),
                (location, _) => {
                    return Err(Failure::Strict(Located::at(ParserError::BadDefine, location)));
                }
            }
        }

        let mut names = names.into_iter();
        Ok(Simple::Range {
            key: names.next(),
            value: names.next(),
            define,
            iterable,
        })
    }

    fn if_statement(&mut self) -> Parse<Located<If>> {
        let start = self.keyword(Keyword::If)?;
        let composites = mem::replace(&mut self.composites, false);

        let first = self.simple_statement()?;
        let (init, condition) = if self.eat(&Token::Semicolon) {
            (Some(Box::new(first)), self.expr()?)
        } else {
            (None, self.condition_of(first)?)
        };

        self.composites = composites;
        let then = self.block()?;

        let otherwise = if self.eat(&Token::Keyword(Keyword::Else)) {
            if self.at(&Token::Keyword(Keyword::If)) {
                Some(Else::If(Box::new(self.if_statement()?)))
            } else {
                Some(Else::Block(self.block()?))
            }
        } else {
            None
        };

        let statement = If {
            init,
            condition,
            then,
            otherwise,
        };

        Ok(Located::at(statement, self.since(&start)))
    }

    fn for_statement(&mut self) -> Parse<Stmt> {
        self.keyword(Keyword::For)?;
        let composites = mem::replace(&mut self.composites, false);

        let mut init = None;
        let mut condition = None;
        let mut post = None;

        if !self.at(&Token::OpenCurly) {
            let header = if self.at(&Token::Semicolon) {
                None
            } else {
                Some(self.simple(true)?)
            };

            match header {
                Some(Simple::Range {
                    key,
                    value,
                    define,
                    iterable,
                }) => {
                    self.composites = composites;
                    let body = self.block()?;

                    return Ok(Stmt::ForRange {
                        key,
                        value,
                        define,
                        iterable,
                        body,
                    });
                }

                Some(Simple::Stmt(statement)) if self.at(&Token::OpenCurly) => {
                    condition = Some(self.condition_of(statement)?);
                }

                header => {
                    if let Some(Simple::Stmt(statement)) = header {
                        init = Some(Box::new(statement));
                    }

                    self.expect(Token::Semicolon)?;
                    if !self.at(&Token::Semicolon) {
                        condition = Some(self.expr()?);
                    }

                    self.expect(Token::Semicolon)?;
                    if !self.at(&Token::OpenCurly) {
                        post = Some(Box::new(self.simple_statement()?));
                    }
                }
            }
        }

        self.composites = composites;
        let body = self.block()?;

        Ok(Stmt::ForClassic {
            init,
            condition,
            post,
            body,
        })
    }

    fn switch_statement(&mut self) -> Parse<Switch> {
        self.keyword(Keyword::Switch)?;
        let outer = mem::replace(&mut self.composites, false);

        let mut init = None;
        let mut tag = None;

        if !self.at(&Token::OpenCurly) {
            let first = if self.at(&Token::Semicolon) {
                None
            } else {
                Some(self.simple_statement()?)
            };

            if self.eat(&Token::Semicolon) {
                init = first.map(Box::new);
                if !self.at(&Token::OpenCurly) {
                    tag = Some(self.expr()?);
                }
            } else if let Some(first) = first {
                tag = Some(self.condition_of(first)?);
            }
        }

        self.expect(Token::OpenCurly)?;
        self.composites = true;

        let ends_case = |token: &Token| {
            matches!(
                token,
                Token::CloseCurly | Token::Keyword(Keyword::Case) | Token::Keyword(Keyword::Default)
            )
        };

        let mut cases = Vec::new();
        loop {
            self.skip_semicolons();
            if self.at(&Token::CloseCurly) {
                break;
            }

            let start = self.here();
            let values = match self.peek() {
                Token::Keyword(Keyword::Case) => {
                    self.next();
                    self.expr_list()?
                }

                Token::Keyword(Keyword::Default) => {
                    self.next();
                    Vec::new()
                }

                _ => return self.unexpected("`case` or `default`"),
            };

            self.expect(Token::Colon)?;
            let location = self.since(&start);

            let mut body = Vec::new();
            loop {
                self.skip_semicolons();
                if ends_case(self.peek()) {
                    break;
                }

                body.push(self.statement()?);
                if !ends_case(self.peek()) {
                    self.expect(Token::Semicolon)?;
                }
            }

            cases.push(Case {
                values,
                body,
                location,
            });
        }

        self.expect(Token::CloseCurly)?;
        self.composites = outer;

        Ok(Switch { init, tag, cases })
    }

    fn condition_of(&self, statement: Located<Stmt>) -> Parse<Located<Expr>> {
        match statement.split() {
            (_, Stmt::Expr(condition)) => Ok(condition),
            (location, _) => Err(Failure::Strict(Located::at(ParserError::ExpectedCondition, location))),
        }
    }

    fn expr_list(&mut self) -> Parse<Vec<Located<Expr>>> {
        let mut list = vec![self.expr()?];
        while self.eat(&Token::Comma) {
            list.push(self.expr()?);
        }

        Ok(list)
    }

    fn expr(&mut self) -> Parse<Located<Expr>> {
        self.binary(1)
    }

    fn binary(&mut self, min: u8) -> Parse<Located<Expr>> {
        let mut lhs = self.unary()?;

        loop {
            let op = match self.peek() {
                Token::Op(op) => BinOp::from_op(*op),
                _ => None,
            };

            match op {
                Some(op) if op.precedence() >= min => {
                    self.next();

                    let rhs = self.binary(op.precedence() + 1)?;
                    let location = Location::span(lhs.location().clone(), rhs.location());
                    lhs = Located::at(Expr::Binary(Box::new(lhs), op, Box::new(rhs)), location);
                }

                _ => break Ok(lhs),
            }
        }
    }

    fn unary(&mut self) -> Parse<Located<Expr>> {
        let start = self.here();

        let op = match self.peek() {
            Token::Op(Op::Sub) => UnOp::Neg,
            Token::Op(Op::Add) => UnOp::Plus,
            Token::Op(Op::Not) => UnOp::Not,
            Token::Op(Op::Xor) => UnOp::BitNot,
            Token::Op(Op::Mul) => UnOp::Deref,
            Token::Op(Op::And) => UnOp::Addr,
            Token::Op(Op::Arrow) => return self.unsupported(UnsupportedError::Channel),
            _ => return self.primary(),
        };

        self.next();
        let operand = self.unary()?;

        Ok(Located::at(Expr::Unary(op, Box::new(operand)), self.since(&start)))
    }

    fn primary(&mut self) -> Parse<Located<Expr>> {
        let start = self.here();
        let mut expr = self.operand()?;

        loop {
            let next = match self.peek() {
                Token::Period => {
                    self.next();
                    if self.at(&Token::OpenParen) {
                        return self.unsupported(UnsupportedError::TypeAssertion);
                    }

                    Expr::Selector {
                        operand: Box::new(expr),
                        member: self.id()?,
                    }
                }

                Token::OpenParen => {
                    self.next();
                    let composites = mem::replace(&mut self.composites, true);

                    let mut args = Vec::new();
                    while !self.at(&Token::CloseParen) {
                        args.push(self.expr()?);
                        if self.at(&Token::Ellipsis) {
                            return self.unsupported(UnsupportedError::Variadic);
                        }

                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }

                    self.expect(Token::CloseParen)?;
                    self.composites = composites;

                    Expr::Call {
                        callee: Box::new(expr),
                        args,
                    }
                }

                Token::OpenSquare => {
                    self.next();
                    let composites = mem::replace(&mut self.composites, true);

                    if self.at(&Token::Colon) {
                        return self.unsupported(UnsupportedError::SliceExpr);
                    }

                    let index = self.expr()?;
                    if self.at(&Token::Colon) {
                        return self.unsupported(UnsupportedError::SliceExpr);
                    }

                    self.expect(Token::CloseSquare)?;
                    self.composites = composites;

                    Expr::Index {
                        operand: Box::new(expr),
                        index: Box::new(index),
                    }
                }

                Token::OpenCurly if self.composites => match type_name(&expr) {
                    Some(typ) => {
                        let typ = Located::at(typ, expr.location().clone());
                        self.composite(Some(typ))?
                    }

                    None => break Ok(expr),
                },

                _ => break Ok(expr),
            };

            expr = Located::at(next, self.since(&start));
        }
    }

    fn operand(&mut self) -> Parse<Located<Expr>> {
        let start = self.here();

        let expr = match self.peek() {
            Token::Int(int) => Expr::Int(*int),
            Token::Float(float) => Expr::Float(float.clone()),
            Token::Str(string) => Expr::Str(string.clone()),
            Token::Rune(rune) => Expr::Rune(*rune),
            Token::Id(id) => Expr::Ident(id.clone()),
            Token::Error { .. } => Expr::Invalid,

            Token::OpenParen => {
                self.next();
                let composites = mem::replace(&mut self.composites, true);
                let inner = self.expr()?;

                self.expect(Token::CloseParen)?;
                self.composites = composites;

                return Ok(Located::at(Expr::Paren(Box::new(inner)), self.since(&start)));
            }

            Token::OpenSquare => {
                let typ = self.typ()?;
                let expr = if self.at(&Token::OpenCurly) {
                    self.composite(Some(typ))?
                } else if self.eat(&Token::OpenParen) {
                    let value = self.expr()?;
                    self.expect(Token::CloseParen)?;

                    Expr::Conversion {
                        typ,
                        value: Box::new(value),
                    }
                } else {
                    return self.unexpected("`{` or `(`");
                };

                return Ok(Located::at(expr, self.since(&start)));
            }

            Token::Keyword(Keyword::Func) => return self.unsupported(UnsupportedError::Closure),
            Token::Keyword(Keyword::Chan) => return self.unsupported(UnsupportedError::Channel),
            Token::Keyword(Keyword::Map) => return self.unsupported(UnsupportedError::Map),
            Token::Keyword(Keyword::Struct) => return self.unsupported(UnsupportedError::AnonymousStruct),
            Token::Keyword(Keyword::Interface) => return self.unsupported(UnsupportedError::InterfaceValue),

            _ => return self.weak_unexpected("expression"),
        };

        self.next();
        Ok(Located::at(expr, self.since(&start)))
    }

    fn composite(&mut self, typ: Option<Located<Type>>) -> Parse<Expr> {
        self.expect(Token::OpenCurly)?;
        let composites = mem::replace(&mut self.composites, true);

        let mut elements = Vec::new();
        loop {
            self.skip_semicolons();
            if self.at(&Token::CloseCurly) {
                break;
            }

            let key = self.optional(|s| {
                let key = s.id().map_err(|failure| Failure::Weak(failure.coerce()))?;
                match s.peek() {
                    Token::Colon => {
                        s.next();
                        Ok(key)
                    }

                    _ => s.weak_unexpected("`:`"),
                }
            })?;

            let value = if self.at(&Token::OpenCurly) {
                let start = self.here();
                let nested = self.composite(None)?;
                Located::at(nested, self.since(&start))
            } else {
                self.expr()?
            };

            elements.push(Element { key, value });
            if !self.eat(&Token::Comma) {
                self.skip_semicolons();
                break;
            }
        }

        self.expect(Token::CloseCurly)?;
        self.composites = composites;

        Ok(Expr::Composite { typ, elements })
    }

    fn typ(&mut self) -> Parse<Located<Type>> {
        let start = self.here();

        let typ = match self.peek() {
            Token::Id(_) => {
                let name = self.id()?.into_inner();
                if self.eat(&Token::Period) {
                    Type::Qualified {
                        package: name,
                        name: self.id()?.into_inner(),
                    }
                } else if self.at(&Token::OpenSquare) && matches!(self.peek_at(1), Token::Id(_)) {
                    return self.unsupported(UnsupportedError::Generics);
                } else {
                    Type::Named(name)
                }
            }

            Token::Op(Op::Mul) => {
                self.next();
                Type::Pointer(Box::new(self.typ()?.into_inner()))
            }

            Token::OpenSquare => {
                self.next();

                if self.eat(&Token::CloseSquare) {
                    Type::Slice(Box::new(self.typ()?.into_inner()))
                } else {
                    let len = match self.peek() {
                        Token::Ellipsis => ArrayLen::Inferred,
                        Token::Int(int) => ArrayLen::Literal(int.value),
                        Token::Id(id) => ArrayLen::Const(id.clone()),
                        _ => return self.unexpected("array length"),
                    };

                    self.next();
                    self.expect(Token::CloseSquare)?;

                    Type::Array {
                        len,
                        elem: Box::new(self.typ()?.into_inner()),
                    }
                }
            }

            Token::OpenParen => {
                self.next();
                let inner = self.typ()?.into_inner();
                self.expect(Token::CloseParen)?;

                inner
            }

            Token::Keyword(Keyword::Chan) | Token::Op(Op::Arrow) => {
                return self.unsupported(UnsupportedError::Channel)
            }

            Token::Keyword(Keyword::Map) => return self.unsupported(UnsupportedError::Map),
            Token::Keyword(Keyword::Func) => return self.unsupported(UnsupportedError::FuncType),
            Token::Keyword(Keyword::Interface) => return self.unsupported(UnsupportedError::InterfaceValue),
            Token::Keyword(Keyword::Struct) => return self.unsupported(UnsupportedError::AnonymousStruct),

            _ => return self.weak_unexpected("type"),
        };

        Ok(Located::at(typ, self.since(&start)))
    }

    fn group<F>(&mut self, mut item: F) -> Parse<()>
    where
        F: FnMut(&mut Self) -> Parse<()>,
    {
        loop {
            self.skip_semicolons();
            if self.at(&Token::CloseParen) {
                break;
            }

            item(self)?;
            if !self.at(&Token::CloseParen) {
                self.expect(Token::Semicolon)?;
            }
        }

        self.expect(Token::CloseParen)?;
        Ok(())
    }

    fn id_list(&mut self) -> Parse<Vec<Located<Identifier>>> {
        let mut ids = vec![self.id()?];
        while self.eat(&Token::Comma) {
            ids.push(self.id()?);
        }

        Ok(ids)
    }

    fn optional<T, F>(&mut self, rule: F) -> Parse<Option<T>>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        match self.attempt(rule) {
            Err(Failure::Weak(_)) => Ok(None),
            result => Ok(Some(result?)),
        }
    }

    fn attempt<T, F>(&mut self, rule: F) -> Parse<T>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        let mut fork = self.clone();

        let result = rule(&mut fork);
        if result.is_ok() {
            *self = fork;
        }

        result
    }

    fn terminator(&mut self) -> Parse<()> {
        if !self.at(&Token::Eof) {
            self.expect(Token::Semicolon)?;
        }

        Ok(())
    }

    fn skip_semicolons(&mut self) {
        while self.eat(&Token::Semicolon) {}
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        match self.peek() {
            Token::Id(id) => {
                let id = id.clone();
                let (location, _) = self.next().split();

                Ok(Located::at(id, location))
            }

            _ => self.unexpected("identifier"),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<Location> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Parse<Location> {
        if *self.peek() == token {
            let (location, _) = self.next().split();
            Ok(location)
        } else {
            self.unexpected(&token.to_string())
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        let found = self.at(token);
        if found {
            self.next();
        }

        found
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn peek(&self) -> &'a Token {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &'a Token {
        let tokens: &'a [Located<Token>] = self.tokens;
        let index = (self.cursor + ahead).min(tokens.len() - 1);

        tokens[index].val()
    }

    /// Consume el siguiente token. El token de fin de archivo nunca se
    /// consume.
    fn next(&mut self) -> Located<Token> {
        let token = self.tokens[self.cursor].clone();
        if !matches!(token.val(), Token::Eof) {
            self.cursor += 1;
        }

        self.last_known = token.location().clone();
        token
    }

    fn here(&self) -> Location {
        self.tokens[self.cursor].location().clone()
    }

    fn since(&self, start: &Location) -> Location {
        Location::span(start.clone(), &self.last_known)
    }

    fn unexpected<T>(&self, expected: &str) -> Parse<T> {
        Err(Failure::Strict(self.unexpected_error(expected)))
    }

    fn weak_unexpected<T>(&self, expected: &str) -> Parse<T> {
        Err(Failure::Weak(self.unexpected_error(expected)))
    }

    fn unexpected_error(&self, expected: &str) -> Located<ParserError> {
        let error = ParserError::Unexpected {
            expected: expected.to_owned(),
            found: self.peek().clone(),
        };

        Located::at(error, self.here())
    }

    fn unsupported<T>(&self, error: UnsupportedError) -> Parse<T> {
        Err(Failure::Strict(Located::at(error.into(), self.here())))
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Failure::Strict(Located::at(error, self.last_known.clone())))
    }
}

/// Determina si un token puede iniciar un tipo.
fn starts_type(token: &Token) -> bool {
    matches!(
        token,
        Token::Id(_)
            | Token::Op(Op::Mul | Op::Arrow)
            | Token::OpenSquare
            | Token::OpenParen
            | Token::Keyword(Keyword::Chan | Keyword::Map | Keyword::Func | Keyword::Struct | Keyword::Interface)
    )
}

/// Interpreta una expresión como nombre de tipo, para literales compuestos.
fn type_name(expr: &Located<Expr>) -> Option<Type> {
    match expr.val() {
        Expr::Ident(id) => Some(Type::Named(id.clone())),
        Expr::Selector { operand, member } => match operand.val() {
            Expr::Ident(package) => Some(Type::Qualified {
                package: package.clone(),
                name: member.as_ref().clone(),
            }),

            _ => None,
        },

        _ => None,
    }
}
