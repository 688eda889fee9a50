//! Punto de entrada ("driver").
//!
//! Este módulo carga los mapas de paquetes, invoca al transpilador y
//! escribe el resultado. Los diagnósticos se imprimen en stderr y
//! cualquier error termina el proceso con código 1.

use anyhow::{self, bail, Context};
use clap::{self, crate_version, Arg, ArgMatches, Command};
use tracing::{debug, info};

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process,
};

use tempfile::NamedTempFile;

use tsuki::{
    board::Board,
    error::{Diagnostic, Diagnostics},
    pkgmap::{self, PackageSet},
    source::Source,
    Options,
};

fn main() -> anyhow::Result<()> {
    let args = cli().get_matches();
    tsuki::init_tracing("warn");

    if let Some(("boards", _)) = args.subcommand() {
        list_boards();
        return Ok(());
    }

    let input = args.value_of("input").context("No input file")?;
    let board = Board::find(args.value_of("board").unwrap_or("uno"))?;
    let check = args.is_present("check");
    let quiet = args.is_present("quiet");
    let output = args.value_of("output").map(Path::new);

    // Los conflictos entre paquetes son errores de configuración, pero
    // se reportan junto con los del archivo
    let mut diagnostics = Diagnostics::default();
    let packages = match load_packages(&args)? {
        Ok((packages, collisions)) => {
            diagnostics.extend(collisions.iter().map(|error| Diagnostic::new(error, None)));
            packages
        }

        Err(error) => {
            diagnostics.push(Diagnostic::new(&error, None));
            fail(&diagnostics);
        }
    };

    let text = fs::read_to_string(input).with_context(|| format!("Failed to read: {}", input))?;
    let source = Source::new(input, text);

    let options = Options {
        board,
        packages: &packages,
        source_map: args.is_present("source-map"),
    };

    info!(file = input, board = board.id, "transpiling");
    let outcome = tsuki::transpile(&source, &options);
    diagnostics.extend(outcome.diagnostics.iter().cloned());

    if diagnostics.has_errors() {
        fail(&diagnostics);
    } else if !diagnostics.is_empty() {
        eprint!("{}", diagnostics);
    }

    let text = match outcome.output {
        Some(text) => text,
        None => bail!("Transpiler produced no output"),
    };

    match (check, output) {
        (true, _) => debug!("check only, nothing written"),

        (false, Some(path)) => {
            write_atomically(path, &text)?;
            if !quiet {
                eprintln!("ok  {}", path.display());
            }
        }

        (false, None) => {
            let mut stdout = io::stdout();
            stdout
                .write_all(text.as_bytes())
                .and_then(|()| stdout.flush())
                .context("Failed to write to stdout")?;
        }
    }

    Ok(())
}

fn cli() -> Command<'static> {
    Command::new("tsuki")
        .version(crate_version!())
        .about("Go-to-C++ transpiler for Arduino boards")
        .args_conflicts_with_subcommands(true)
        .subcommand_negates_reqs(true)
        .arg(
            Arg::new("input")
                .required(true)
                .value_name("INPUT")
                .help("Go source file"),
        )
        .arg(
            Arg::new("output")
                .value_name("OUTPUT")
                .help("Output C++ file (stdout if omitted)"),
        )
        .arg(
            Arg::new("board")
                .short('b')
                .long("board")
                .value_name("BOARD")
                .takes_value(true)
                .default_value("uno")
                .help("Target board, see `tsuki boards`"),
        )
        .arg(
            Arg::new("source-map")
                .long("source-map")
                .help("Emit #line directives"),
        )
        .arg(
            Arg::new("libs-dir")
                .long("libs-dir")
                .value_name("DIR")
                .takes_value(true)
                .env("TSUKI_LIBS_DIR")
                .help("Directory holding package maps"),
        )
        .arg(
            Arg::new("packages")
                .short('p')
                .long("packages")
                .value_name("NAMES")
                .takes_value(true)
                .help("Comma-separated package maps to load"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("Report diagnostics without writing output"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Do not print the success line"),
        )
        .subcommand(Command::new("boards").about("List supported boards"))
}

fn list_boards() {
    for board in Board::catalog() {
        println!(
            "{:<14}{:<28}{:<24}{:>5} KB flash {:>4} KB RAM",
            board.id, board.name, board.fqbn, board.flash_kb, board.ram_kb
        );
    }
}

/// Carga los paquetes pedidos en `--packages` o, si no se nombra
/// ninguno, todos los instalados.
///
/// El resultado externo reporta fallos de la CLI; el interno, errores de
/// configuración que se muestran como diagnósticos.
fn load_packages(
    args: &ArgMatches,
) -> anyhow::Result<Result<(PackageSet, Vec<pkgmap::LoadError>), pkgmap::LoadError>> {
    let names: Vec<String> = args
        .value_of("packages")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect();

    let libs_dir = match args.value_of("libs-dir") {
        Some(dir) => PathBuf::from(dir),
        None => match dirs::data_dir() {
            Some(data) => data.join("tsuki").join("libs"),
            None if names.is_empty() => return Ok(Ok((PackageSet::default(), Vec::new()))),
            None => bail!("No libs directory, pass --libs-dir"),
        },
    };

    let loaded = if names.is_empty() {
        debug!(libs_dir = %libs_dir.display(), "loading every installed package");
        pkgmap::load_installed(&libs_dir)
    } else {
        debug!(libs_dir = %libs_dir.display(), ?names, "loading packages");
        pkgmap::load_packages(&libs_dir, &names)
    };

    Ok(loaded.map(PackageSet::new))
}

/// Escribe en un temporal junto al destino y luego lo renombra.
fn write_atomically(path: &Path, text: &str) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    fs::create_dir_all(dir).with_context(|| format!("Failed to create: {}", dir.display()))?;

    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to open temporary file in: {}", dir.display()))?;

    file.write_all(text.as_bytes())
        .with_context(|| format!("Failed to write: {}", path.display()))?;

    file.persist(path)
        .with_context(|| format!("Failed to rename into: {}", path.display()))?;

    Ok(())
}

fn fail(diagnostics: &Diagnostics) -> ! {
    eprint!("{}", diagnostics);
    process::exit(1)
}
