//! Generación de C++ para Arduino.
//!
//! El archivo de salida tiene un orden fijo: encabezado, `#include`,
//! constantes de tipos predeclarados, definiciones de tipos, agregados de
//! retorno múltiple, el resto de constantes, variables globales,
//! prototipos y definiciones de funciones. Dentro de cada sección se
//! respeta el orden del código fuente, de modo que la misma entrada
//! produce siempre los mismos bytes.
//!
//! Los errores no detienen el recorrido. Se acumulan junto con las
//! advertencias y el llamador descarta el texto si hubo alguno.

mod expr;
mod scope;
mod stmt;

use std::{collections::BTreeSet, fmt};

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use crate::{
    ast::{Ast, ConstSpec, Decl, FuncDecl, Results, StructDecl, Type, TypeDecl, VarSpec},
    board::Board,
    error::{Class, Classify, Severity},
    intrinsics::{self, Package},
    pkgmap::{PackageMap, PackageSet},
    source::{Located, Location},
};

use self::scope::{builtin_type, mangle, Binding, Ty};

const INDENT: &str = "    ";

#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum CodegenError {
    #[error("unknown call `{call}`{}", hint(.suggestion))]
    UnresolvedCall {
        call: String,
        suggestion: Option<String>,
    },

    #[error("undefined: `{name}`{}", hint(.suggestion))]
    UnresolvedName {
        name: String,
        suggestion: Option<String>,
    },

    #[error("unknown package `{0}` (not built in and no package map provides it)")]
    UnknownPackage(String),

    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("struct `{structure}` has no field `{field}`")]
    UnknownField { structure: String, field: String },

    #[error("interface `{0}` cannot be used as a value type")]
    InterfaceValue(String),

    #[error("array type `{0}` cannot be used here")]
    ArrayValue(String),

    #[error("methods are only supported on struct types, `{0}` is not a struct")]
    MethodReceiver(String),

    #[error("assignment mismatch: {targets} variable(s) but {values} value(s)")]
    Mismatch { targets: usize, values: usize },

    #[error("cannot range over `{0}`")]
    Range(String),

    #[error("length of slice parameter `{0}` is unknown")]
    SliceLength(String),

    #[error("`fallthrough` is only supported in switches over integer constants")]
    Fallthrough,

    #[error(
        "template for `{call}` expects {} argument(s), found {found}",
        expected_count(.expected, .variadic)
    )]
    Placeholders {
        call: String,
        expected: usize,
        variadic: bool,
        found: usize,
    },

    #[error("`{0}` has no equivalent without a scheduler, emitted as a comment")]
    Unsupported(&'static str),
}

fn hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(suggestion) => format!("; did you mean `{}`?", suggestion),
        None => String::new(),
    }
}

fn expected_count(expected: &usize, variadic: &bool) -> String {
    if *variadic {
        format!("at least {}", expected)
    } else {
        expected.to_string()
    }
}

impl Classify for CodegenError {
    fn class(&self) -> Class {
        use CodegenError::*;

        match self {
            UnresolvedCall { .. } | UnresolvedName { .. } | UnknownPackage(_) | UnknownType(_) | UnknownField { .. } => {
                Class::Resolution
            }

            Placeholders { .. } => Class::Invariant,
            Mismatch { .. } => Class::Parse,

            InterfaceValue(_) | ArrayValue(_) | MethodReceiver(_) | Range(_) | SliceLength(_) | Fallthrough
            | Unsupported(_) => Class::Unsupported,
        }
    }

    fn severity(&self) -> Severity {
        match self {
            CodegenError::Unsupported(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// Parámetros de una generación.
pub struct Options<'a> {
    pub board: &'a Board,
    pub packages: &'a PackageSet,

    /// Emite `#line` antes de cada sentencia.
    pub source_map: bool,
}

/// Genera el C++ de un archivo.
///
/// Retorna el texto junto con todos los diagnósticos. El texto solo es
/// utilizable si ninguno de ellos es un error.
pub fn generate<'a>(ast: &'a Ast, options: &'a Options<'a>) -> (String, Vec<Located<CodegenError>>) {
    let mut generator = Generator::new(ast, options);

    generator.collect(ast);
    generator.file(ast);

    debug!(
        bytes = generator.out.len(),
        diagnostics = generator.errors.len(),
        "code generation finished"
    );

    (generator.out, generator.errors)
}

/// Origen de un paquete importado.
#[derive(Copy, Clone)]
enum Import<'a> {
    Intrinsic(&'static Package),
    Mapped(&'a PackageMap),
}

type Gen<T> = Result<T, Located<CodegenError>>;

/// Destino de un `break` dentro del cuerpo actual.
enum BreakTarget {
    Native,

    /// `switch` traducido a cadena de `if`. El `break` salta a una
    /// etiqueta que solo se emite si se usó.
    Label { name: String, used: bool },
}

struct Generator<'a> {
    options: &'a Options<'a>,
    file: &'a str,
    out: String,
    depth: usize,
    errors: Vec<Located<CodegenError>>,

    imports: FxHashMap<&'a str, Import<'a>>,
    headers: BTreeSet<&'a str>,
    libraries: BTreeSet<&'a str>,

    structs: FxHashMap<&'a str, &'a StructDecl>,
    typedefs: FxHashMap<&'a str, &'a TypeDecl>,
    interfaces: FxHashSet<&'a str>,
    funcs: FxHashMap<&'a str, &'a FuncDecl>,
    methods: FxHashMap<(&'a str, &'a str), &'a FuncDecl>,
    ordered_methods: Vec<&'a FuncDecl>,
    globals: FxHashMap<&'a str, Binding<'a>>,

    /// Valores de constantes enteras conocidas, para `iota`, longitudes y
    /// la elección entre `int` y `long`.
    values: FxHashMap<&'a str, i128>,

    scopes: Vec<FxHashMap<&'a str, Binding<'a>>>,
    breaks: Vec<BreakTarget>,
    results: Option<&'a Results>,
    iota: Option<u64>,
    temps: usize,

    /// `main` se emite como `setup`.
    entry: bool,
}

impl<'a> Generator<'a> {
    fn new(ast: &'a Ast, options: &'a Options<'a>) -> Self {
        Generator {
            options,
            file: ast.package.location().source().name(),
            out: String::new(),
            depth: 0,
            errors: Vec::new(),
            imports: Default::default(),
            headers: BTreeSet::new(),
            libraries: BTreeSet::new(),
            structs: Default::default(),
            typedefs: Default::default(),
            interfaces: Default::default(),
            funcs: Default::default(),
            methods: Default::default(),
            ordered_methods: Vec::new(),
            globals: Default::default(),
            values: Default::default(),
            scopes: Vec::new(),
            breaks: Vec::new(),
            results: None,
            iota: None,
            temps: 0,
            entry: false,
        }
    }

    /// Emite una línea con la sangría actual.
    fn line(&mut self, args: fmt::Arguments<'_>) {
        let text = args.to_string();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(INDENT);
            }

            self.out.push_str(&text);
        }

        self.out.push('\n');
    }

    /// Separa secciones con una línea en blanco.
    fn gap(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    /// Marcador de línea de origen para `--source-map`.
    fn mark(&mut self, location: &Location) {
        if self.options.source_map {
            let file = self.file.replace('\\', "\\\\").replace('"', "\\\"");
            self.out
                .push_str(&format!("#line {} \"{}\"\n", location.start().line(), file));
        }
    }

    fn record(&mut self, result: Gen<()>) {
        if let Err(error) = result {
            self.errors.push(error);
        }
    }

    fn temp(&mut self, kind: &str) -> String {
        let name = format!("_tsuki_{}{}", kind, self.temps);
        self.temps += 1;
        name
    }

    /// Registra importaciones y declaraciones de nivel superior.
    fn collect(&mut self, ast: &'a Ast) {
        for import in &ast.imports {
            let local = import.local_name();
            let name = import.package_name();

            let resolved = match intrinsics::package(name) {
                Some(package) => {
                    self.headers.extend(package.header);
                    Import::Intrinsic(package)
                }

                None => match self.options.packages.get(name) {
                    Some(mapped) => {
                        self.headers.extend(mapped.header());
                        self.libraries.extend(mapped.native_library());
                        Import::Mapped(mapped)
                    }

                    None => {
                        let error = CodegenError::UnknownPackage(import.path.val().clone());
                        self.errors.push(Located::at(error, import.path.location().clone()));
                        continue;
                    }
                },
            };

            if local != "_" {
                self.imports.insert(local, resolved);
            }
        }

        for decl in &ast.decls {
            match decl {
                Decl::Func(func) if func.receiver.is_none() => {
                    self.funcs.insert(func.name.val().as_ref(), func);
                }

                Decl::Struct(decl) => {
                    self.structs.insert(decl.name.val().as_ref(), decl);
                }

                Decl::Type(decl) => {
                    self.typedefs.insert(decl.name.val().as_ref(), decl);
                }

                Decl::Interface(decl) => {
                    self.interfaces.insert(decl.name.val().as_ref());
                }

                _ => (),
            }
        }

        for decl in &ast.decls {
            let (func, receiver) = match decl {
                Decl::Func(func) => match &func.receiver {
                    Some(receiver) => (func, receiver),
                    None => continue,
                },

                _ => continue,
            };

            let typ = receiver.typ.val().as_ref();
            if self.structs.contains_key(typ) {
                self.methods.insert((typ, func.name.val().as_ref()), func);
                self.ordered_methods.push(func);
            } else {
                let error = CodegenError::MethodReceiver(typ.to_owned());
                self.errors.push(Located::at(error, receiver.typ.location().clone()));
            }
        }

        self.entry = self.funcs.contains_key("main") && !self.funcs.contains_key("setup");

        // Constantes primero: la inferencia de variables puede depender de ellas
        for decl in &ast.decls {
            if let Decl::Const(specs) = decl {
                for spec in specs.val() {
                    self.register_const(spec);
                }
            }
        }

        for decl in &ast.decls {
            if let Decl::Var(specs) = decl {
                for spec in specs.val() {
                    self.register_var(spec);
                }
            }
        }
    }

    fn register_const(&mut self, spec: &'a ConstSpec) {
        self.iota = Some(spec.iota);

        for (name, value) in spec.names.iter().zip(&spec.values) {
            let ty = match &spec.typ {
                Some(typ) => Ty::Go(typ.val().clone()),
                None => self.type_of(value),
            };

            if let Some(value) = self.const_int(value) {
                self.values.insert(name.val().as_ref(), value);
            }

            self.bind(name.val().as_ref(), ty, true);
        }

        self.iota = None;
    }

    fn register_var(&mut self, spec: &'a VarSpec) {
        for (index, name) in spec.names.iter().enumerate() {
            let ty = match (&spec.typ, spec.values.len()) {
                (Some(typ), _) => Ty::Go(typ.val().clone()),
                (None, 1) if spec.names.len() > 1 => match self.type_of(&spec.values[0]) {
                    Ty::Aggregate(aggregate) => aggregate
                        .fields
                        .get(index)
                        .map_or(Ty::Unknown, |field| Ty::Go(field.typ.val().clone())),

                    _ => Ty::Unknown,
                },

                (None, _) => spec.values.get(index).map_or(Ty::Unknown, |value| self.declared_type(value)),
            };

            self.bind(name.val().as_ref(), ty, false);
        }
    }

    fn file(&mut self, ast: &'a Ast) {
        self.banner();

        let consts: Vec<&'a ConstSpec> = ast
            .decls
            .iter()
            .filter_map(|decl| match decl {
                Decl::Const(specs) => Some(specs.val()),
                _ => None,
            })
            .flatten()
            .collect();

        let (late, early): (Vec<_>, Vec<_>) = consts.into_iter().partition(|spec| self.user_typed(*spec));

        if !early.is_empty() {
            self.gap();
            for spec in early {
                let result = self.const_spec(spec);
                self.record(result);
            }
        }

        self.types(ast);
        self.aggregates(ast);

        if !late.is_empty() {
            self.gap();
            for spec in late {
                let result = self.const_spec(spec);
                self.record(result);
            }
        }

        let vars: Vec<&'a VarSpec> = ast
            .decls
            .iter()
            .filter_map(|decl| match decl {
                Decl::Var(specs) => Some(specs.val()),
                _ => None,
            })
            .flatten()
            .collect();

        if !vars.is_empty() {
            self.gap();
            for spec in vars {
                let result = self.var_spec(spec);
                self.record(result);
            }
        }

        self.prototypes(ast);

        for decl in &ast.decls {
            if let Decl::Func(func) = decl {
                let orphan = func.receiver.as_ref().map_or(false, |receiver| {
                    !self.structs.contains_key(receiver.typ.val().as_ref())
                });

                if !orphan {
                    self.function(func);
                }
            }
        }

        if !self.has_setup() {
            self.gap();
            emit!(self, "void setup() {{}}");
        }

        if !self.funcs.contains_key("loop") {
            self.gap();
            emit!(self, "void loop() {{}}");
        }
    }

    fn has_setup(&self) -> bool {
        self.entry || self.funcs.contains_key("setup")
    }

    fn banner(&mut self) {
        let version = env!("CARGO_PKG_VERSION");
        let board = self.options.board;
        let file = self.file;

        emit!(self, "// Generated by tsuki {} from {} for {}", version, file, board);
        emit!(self, "// Do not edit by hand.");

        if !self.libraries.is_empty() {
            let libraries: Vec<_> = self.libraries.iter().copied().collect();
            emit!(self, "// Requires: {}", libraries.join(", "));
        }

        emit!(self);
        emit!(self, "#include <Arduino.h>");

        let headers: Vec<&'a str> = self.headers.iter().copied().collect();
        for header in headers {
            if header == "Arduino.h" || header == "<Arduino.h>" {
                continue;
            }

            if header.starts_with('<') || header.starts_with('"') {
                emit!(self, "#include {}", header);
            } else {
                emit!(self, "#include <{}>", header);
            }
        }
    }

    /// Determina si una constante usa un tipo definido en el archivo o en
    /// un paquete, por lo que debe emitirse después de los tipos.
    fn user_typed(&self, spec: &'a ConstSpec) -> bool {
        let ty = match (&spec.typ, spec.values.first()) {
            (Some(typ), _) => Ty::Go(typ.val().clone()),
            (None, Some(value)) => self.type_of(value),
            (None, None) => Ty::Unknown,
        };

        match ty {
            Ty::Go(Type::Named(name)) => builtin_type(name.as_ref()).is_none(),
            Ty::Go(_) => true,
            _ => false,
        }
    }

    /// Estructuras y tipos definidos, ordenados de modo que cada uno
    /// aparezca después de los tipos que contiene.
    fn types(&mut self, ast: &'a Ast) {
        let named: Vec<&'a Decl> = ast
            .decls
            .iter()
            .filter(|decl| matches!(decl, Decl::Struct(_) | Decl::Type(_)))
            .collect();

        if named.is_empty() {
            return;
        }

        self.gap();

        let structs: Vec<&'a str> = named
            .iter()
            .filter_map(|decl| match decl {
                Decl::Struct(decl) => Some(decl.name.val().as_ref()),
                _ => None,
            })
            .collect();

        for name in &structs {
            emit!(self, "struct {};", mangle(name));
        }

        for decl in dependency_order(&named) {
            let result = match decl {
                Decl::Struct(decl) => {
                    self.gap();
                    self.structure(decl)
                }

                Decl::Type(decl) => self.typedef(decl),
                _ => Ok(()),
            };

            self.record(result);
        }
    }

    fn structure(&mut self, decl: &'a StructDecl) -> Gen<()> {
        let name = decl.name.val().as_ref();

        let mut fields = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            let field_name = mangle(field.name.val().as_ref());
            fields.push(self.declarator(field.typ.val(), &field_name, field.typ.location())?);
        }

        let mut methods = Vec::new();
        for &method in &self.ordered_methods {
            let receiver = method.receiver.as_ref().map(|receiver| receiver.typ.val().as_ref());
            if receiver == Some(name) {
                methods.push(self.signature(method, false)?);
            }
        }

        emit!(self, "struct {} {{", mangle(name));
        self.depth += 1;

        for field in fields {
            emit!(self, "{};", field);
        }

        if !methods.is_empty() {
            if !decl.fields.is_empty() {
                emit!(self);
            }

            for method in methods {
                emit!(self, "{};", method);
            }
        }

        self.depth -= 1;
        emit!(self, "}};");

        Ok(())
    }

    fn typedef(&mut self, decl: &'a TypeDecl) -> Gen<()> {
        let name = mangle(decl.name.val().as_ref());
        let declarator = self.declarator(decl.typ.val(), &name, decl.typ.location())?;

        emit!(self, "typedef {};", declarator);
        Ok(())
    }

    /// Tipos sintéticos de las funciones con retorno múltiple.
    fn aggregates(&mut self, ast: &'a Ast) {
        for decl in &ast.decls {
            let aggregate = match decl {
                Decl::Func(FuncDecl {
                    results: Results::Multiple(aggregate),
                    ..
                }) => aggregate,

                _ => continue,
            };

            let mut fields = Vec::with_capacity(aggregate.fields.len());
            for field in &aggregate.fields {
                let name = mangle(field.name.val().as_ref());
                match self.declarator(field.typ.val(), &name, field.typ.location()) {
                    Ok(field) => fields.push(field),
                    Err(error) => self.errors.push(error),
                }
            }

            self.gap();
            emit!(self, "struct {} {{", aggregate.name);
            self.depth += 1;

            for field in fields {
                emit!(self, "{};", field);
            }

            self.depth -= 1;
            emit!(self, "}};");
        }
    }

    fn prototypes(&mut self, ast: &'a Ast) {
        let mut prototypes = Vec::new();

        for decl in &ast.decls {
            if let Decl::Func(func) = decl {
                if func.receiver.is_none() {
                    match self.signature(func, false) {
                        Ok(signature) => prototypes.push(signature),
                        Err(error) => self.errors.push(error),
                    }
                }
            }
        }

        if !self.has_setup() {
            prototypes.push(String::from("void setup()"));
        }

        if !self.funcs.contains_key("loop") {
            prototypes.push(String::from("void loop()"));
        }

        self.gap();
        for prototype in prototypes {
            emit!(self, "{};", prototype);
        }
    }

    /// Nombre de C++ de una función libre o método.
    fn function_name(&self, func: &FuncDecl) -> String {
        let name = func.name.val().as_ref();
        if self.entry && func.receiver.is_none() && name == "main" {
            String::from("setup")
        } else {
            mangle(name).into_owned()
        }
    }

    /// Firma de una función. Con `qualified`, los métodos llevan el
    /// prefijo de su estructura para definirse fuera de ella.
    fn signature(&self, func: &'a FuncDecl, qualified: bool) -> Gen<String> {
        let result = match &func.results {
            Results::Void => String::from("void"),
            Results::Single(param) => self.cpp_type(param.typ.val(), param.typ.location())?,
            Results::Multiple(aggregate) => aggregate.name.clone(),
        };

        let mut params = Vec::with_capacity(func.params.len());
        for param in &func.params {
            let name = match &param.name {
                Some(name) if !name.val().is_blank() => mangle(name.val().as_ref()).into_owned(),
                _ => String::new(),
            };

            params.push(self.parameter(param.typ.val(), &name, param.typ.location())?);
        }

        let name = match (&func.receiver, qualified) {
            (Some(receiver), true) => {
                format!("{}::{}", mangle(receiver.typ.val().as_ref()), self.function_name(func))
            }

            _ => self.function_name(func),
        };

        Ok(format!("{} {}({})", result, name, params.join(", ")))
    }

    fn function(&mut self, func: &'a FuncDecl) {
        let signature = match self.signature(func, true) {
            Ok(signature) => signature,
            Err(error) => {
                self.errors.push(error);
                return;
            }
        };

        self.gap();
        self.mark(&func.location);
        emit!(self, "{} {{", signature);

        self.depth += 1;
        self.enter();
        self.results = Some(&func.results);

        if let Some(receiver) = &func.receiver {
            if let Some(name) = receiver.name.as_ref().filter(|name| !name.val().is_blank()) {
                let typ = mangle(receiver.typ.val().as_ref());
                let reference = if receiver.pointer { "&" } else { "" };

                emit!(self, "{}{} {} = *this;", typ, reference, mangle(name.val().as_ref()));
                self.bind(name.val().as_ref(), Ty::Go(Type::Named(receiver.typ.val().clone())), false);
            }
        }

        for param in &func.params {
            if let Some(name) = param.name.as_ref().filter(|name| !name.val().is_blank()) {
                self.bind(name.val().as_ref(), Ty::Go(param.typ.val().clone()), false);
            }
        }

        let result = self.named_results(&func.results);
        self.record(result);

        self.statements(&func.body);

        self.results = None;
        self.leave();
        self.depth -= 1;

        emit!(self, "}}");
    }

    /// Declara los resultados nombrados como variables locales con su
    /// valor cero.
    fn named_results(&mut self, results: &'a Results) -> Gen<()> {
        let named: Vec<_> = match results {
            Results::Single(param) => param.name.iter().map(|name| (name, &param.typ)).collect(),
            Results::Multiple(aggregate) if aggregate.named => {
                aggregate.fields.iter().map(|field| (&field.name, &field.typ)).collect()
            }

            _ => Vec::new(),
        };

        for (name, typ) in named {
            if name.val().is_blank() {
                continue;
            }

            let declarator = self.declarator(typ.val(), &mangle(name.val().as_ref()), typ.location())?;
            emit!(self, "{}{{}};", declarator);
            self.bind(name.val().as_ref(), Ty::Go(typ.val().clone()), false);
        }

        Ok(())
    }
}

/// Orden topológico estable por dependencias entre tipos nombrados.
fn dependency_order<'a>(named: &[&'a Decl]) -> Vec<&'a Decl> {
    fn name(decl: &Decl) -> &str {
        match decl {
            Decl::Struct(decl) => decl.name.val().as_ref(),
            Decl::Type(decl) => decl.name.val().as_ref(),
            _ => "",
        }
    }

    fn dependencies<'t>(typ: &'t Type, into: &mut Vec<&'t str>) {
        match typ {
            Type::Named(name) => into.push(name.as_ref()),
            Type::Array { elem, .. } | Type::Slice(elem) | Type::Pointer(elem) => dependencies(elem, into),
            Type::Qualified { .. } => (),
        }
    }

    fn visit<'a>(
        index: usize,
        named: &[&'a Decl],
        positions: &FxHashMap<&str, usize>,
        state: &mut [u8],
        order: &mut Vec<&'a Decl>,
    ) {
        if state[index] != 0 {
            return;
        }

        state[index] = 1;

        let mut needs = Vec::new();
        match named[index] {
            Decl::Struct(decl) => {
                for field in &decl.fields {
                    dependencies(field.typ.val(), &mut needs);
                }
            }

            Decl::Type(decl) => dependencies(decl.typ.val(), &mut needs),
            _ => (),
        }

        for need in needs {
            if let Some(&other) = positions.get(need) {
                visit(other, named, positions, state, order);
            }
        }

        state[index] = 2;
        order.push(named[index]);
    }

    let positions: FxHashMap<&str, usize> = named
        .iter()
        .enumerate()
        .map(|(index, decl)| (name(decl), index))
        .collect();

    let mut state = vec![0; named.len()];
    let mut order = Vec::with_capacity(named.len());

    for index in 0..named.len() {
        visit(index, named, &positions, &mut state, &mut order);
    }

    order
}

#[cfg(test)]
mod tests;
