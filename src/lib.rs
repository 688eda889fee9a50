//! Transpilador de un subconjunto de Go a C++ para tarjetas Arduino.
//!
//! # Front end
//! Cada ejecución traduce un único archivo de código fuente. Este
//! archivo se somete primero a análisis léxico en [`lex`], de lo cual se
//! obtiene un flujo de tokens. El flujo de tokens se dispone en un AST
//! por medio de análisis sintáctico en [`parse`]. Los errores de ambas
//! fases se acumulan en lugar de detener el proceso, de modo que una
//! sola pasada reporta tantos como sea posible.
//!
//! # Back end
//! El generador en [`codegen`] recorre el AST y resuelve cada llamada
//! contra la tabla fija de [`intrinsics`] y luego contra los mapas de
//! paquetes externos de [`pkgmap`]. El único dato de la tarjeta que
//! afecta la salida es el ancho de `int`, tomado de [`board`].
//!
//! La emisión es todo o nada: si algún diagnóstico es un error, no se
//! produce texto. La compilación y el flasheo del resultado viven en el
//! crate `tsuki-flash`.

#[macro_use]
mod macros;

pub mod ast;
pub mod board;
pub mod codegen;
pub mod error;
pub mod intrinsics;
pub mod lex;
pub mod parse;
pub mod pkgmap;
pub mod source;

use std::{rc::Rc, sync::Once};

use tracing::debug;

use crate::{
    error::Diagnostics,
    lex::Token,
    source::{Located, Source},
};

pub use crate::codegen::Options;

/// Resultado de transpilar un archivo.
#[derive(Debug)]
pub struct Outcome {
    /// C++ generado. Ausente si hubo al menos un error.
    pub output: Option<String>,

    /// Errores y advertencias de todas las fases, en orden de fase.
    pub diagnostics: Diagnostics,
}

/// Ejecuta las fases de análisis léxico, sintáctico y generación.
pub fn transpile(source: &Rc<Source>, options: &Options<'_>) -> Outcome {
    let mut diagnostics = Diagnostics::default();

    let tokens = lex::tokenize(source);
    for token in &tokens {
        if let Token::Error { error, .. } = token.val() {
            diagnostics.push(Located::at(error.clone(), token.location().clone()));
        }
    }

    debug!(file = source.name(), tokens = tokens.len(), "lexing finished");

    let ast = match parse::parse(source, &tokens) {
        Ok(ast) => ast,
        Err(errors) => {
            // Los tokens inválidos ya se reportaron arriba
            diagnostics.extend(errors.into_iter().filter(|error| !error.val().is_lexical()));
            debug!(diagnostics = diagnostics.len(), "parsing failed");

            return Outcome {
                output: None,
                diagnostics,
            };
        }
    };

    debug!(decls = ast.decls.len(), "parsing finished");

    let (text, errors) = codegen::generate(&ast, options);
    diagnostics.extend(errors);

    let output = if diagnostics.has_errors() { None } else { Some(text) };
    Outcome { output, diagnostics }
}

static TRACING: Once = Once::new();

/// Instala el suscriptor de `tracing` sobre stderr.
///
/// El filtro se toma de `TSUKI_LOG` y, si no existe, de `default`. Las
/// llamadas posteriores a la primera no tienen efecto.
pub fn init_tracing(default: &str) {
    TRACING.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = EnvFilter::try_from_env("TSUKI_LOG").unwrap_or_else(|_| EnvFilter::new(default));
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(filter)
            .try_init()
            .ok();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        board::Board,
        error::{Class, Diagnostic, Severity},
        pkgmap::PackageSet,
    };
    use pretty_assertions::assert_eq;

    fn run(text: &str) -> Outcome {
        let packages = PackageSet::default();
        let options = Options {
            board: Board::find("uno").unwrap(),
            packages: &packages,
            source_map: false,
        };

        transpile(&Source::new("main.go", text), &options)
    }

    #[test]
    fn clean_files_produce_output() {
        let outcome = run("package main\n\nimport \"arduino\"\n\nfunc loop() {\n\tarduino.Delay(1)\n}\n");

        assert!(outcome.diagnostics.is_empty());
        assert!(outcome.output.unwrap().contains("    delay(1);\n"));
    }

    #[test]
    fn lexical_and_resolution_errors_are_reported_together() {
        let outcome = run(
            "package main\n\nimport \"arduino\"\n\nfunc main() {\n\tarduino.Blink(13)\n\tvar label = \"oops\n}\n",
        );

        let classes: Vec<_> = outcome.diagnostics.iter().map(Diagnostic::class).collect();
        assert_eq!(classes, vec![Class::Lex, Class::Resolution]);
        assert_eq!(outcome.diagnostics.error_count(), 2);
        assert!(outcome.output.is_none());
    }

    #[test]
    fn syntax_errors_skip_generation() {
        let outcome = run("package main\n\nfunc main() {\n\tx := \n}\n\nfunc loop( {\n}\n");

        assert!(outcome.output.is_none());
        assert!(outcome.diagnostics.iter().all(|diagnostic| diagnostic.class() == Class::Parse));
        assert!(outcome.diagnostics.error_count() >= 1);
    }

    #[test]
    fn warnings_keep_the_output() {
        let outcome = run("package main\n\nfunc blink() {}\n\nfunc loop() {\n\tdefer blink()\n}\n");

        assert_eq!(outcome.diagnostics.warning_count(), 1);
        assert_eq!(
            outcome.diagnostics.iter().next().map(Diagnostic::severity),
            Some(Severity::Warning)
        );

        assert!(outcome.output.unwrap().contains("// TSUKI-UNSUPPORTED: defer blink()"));
    }

    #[test]
    fn tracing_can_be_initialized_twice() {
        init_tracing("warn");
        init_tracing("debug");
        tracing::debug!("still alive");
    }
}
