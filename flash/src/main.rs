//! Punto de entrada de `tsuki-flash`.
//!
//! El progreso y los reportes de tamaño van a stderr; stdout queda para
//! los listados (`boards`, `detect`, `sdk-info`).

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{self, bail, Context};
use clap::{self, crate_version, Arg, ArgMatches, Command};

use tsuki::board::Board;
use tsuki_flash::{
    compile::{self, Build},
    detect,
    flash::{self, Uploaded},
    link::LinkOptions,
    sdk,
};

fn main() -> anyhow::Result<()> {
    let args = cli().get_matches();

    let level = if args.is_present("verbose") {
        "debug"
    } else if args.is_present("quiet") {
        "error"
    } else {
        "warn"
    };

    tsuki::init_tracing(level);
    let quiet = args.is_present("quiet");

    match args.subcommand() {
        Some(("compile", args)) => {
            let board = board(args)?;
            report_build(&build(args, board)?, quiet);
        }

        Some(("upload", args)) => {
            let board = board(args)?;
            let request = upload_request(args, args.value_of("name").map(String::from))?;
            report_upload(&upload(&request, board, quiet)?, quiet);
        }

        Some(("run", args)) => {
            let board = board(args)?;
            let build = build(args, board)?;
            report_build(&build, quiet);

            let request = upload_request(args, Some(sketch_name(args)))?;
            report_upload(&upload(&request, board, quiet)?, quiet);
        }

        Some(("detect", _)) => list_ports(),
        Some(("boards", _)) => list_boards(),

        Some(("sdk-info", args)) => {
            let board = board(args)?;
            sdk_info(board)?;
        }

        _ => bail!("No subcommand, see `tsuki-flash --help`"),
    }

    Ok(())
}

fn cli() -> Command<'static> {
    let board = Arg::new("board")
        .short('b')
        .long("board")
        .value_name("BOARD")
        .takes_value(true)
        .required(true)
        .help("Target board, see `tsuki-flash boards`");

    let build_dir = Arg::new("build-dir")
        .long("build-dir")
        .value_name("DIR")
        .takes_value(true)
        .required(true)
        .help("Directory for objects, cache and firmware");

    let name = Arg::new("name")
        .long("name")
        .value_name("NAME")
        .takes_value(true)
        .help("Base name of the firmware files");

    let compile_args = [
        Arg::new("sketch")
            .long("sketch")
            .value_name("DIR")
            .takes_value(true)
            .required(true)
            .help("Directory holding the sketch sources"),
        Arg::new("cpp-std")
            .long("cpp-std")
            .value_name("STD")
            .takes_value(true)
            .default_value("c++11")
            .help("C++ standard"),
        Arg::new("include")
            .long("include")
            .value_name("DIR")
            .takes_value(true)
            .multiple_occurrences(true)
            .use_value_delimiter(true)
            .help("Library directory to include and compile"),
        Arg::new("strip")
            .long("strip")
            .help("Strip debug symbols from the ELF"),
    ];

    let upload_args = [
        Arg::new("port")
            .short('p')
            .long("port")
            .value_name("PORT")
            .takes_value(true)
            .help("Serial port (detected if omitted)"),
        Arg::new("baud")
            .long("baud")
            .value_name("RATE")
            .takes_value(true)
            .help("Override the board's upload baud rate"),
    ];

    Command::new("tsuki-flash")
        .version(crate_version!())
        .about("Compile and upload tsuki sketches without arduino-cli")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .help("Log every tool invocation"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .conflicts_with("verbose")
                .help("Only report errors"),
        )
        .subcommand(
            Command::new("compile")
                .about("Compile a sketch into firmware")
                .arg(board.clone())
                .arg(build_dir.clone())
                .arg(name.clone().help("Base name of the firmware files [default: sketch directory name]"))
                .args(&compile_args),
        )
        .subcommand(
            Command::new("upload")
                .about("Upload compiled firmware to a connected board")
                .arg(board.clone())
                .arg(build_dir.clone())
                .arg(name.clone())
                .args(&upload_args),
        )
        .subcommand(
            Command::new("run")
                .about("Compile, then upload")
                .arg(board.clone())
                .arg(build_dir)
                .arg(name)
                .args(&compile_args)
                .args(&upload_args),
        )
        .subcommand(Command::new("detect").about("List serial ports and the boards behind them"))
        .subcommand(Command::new("boards").about("List supported boards"))
        .subcommand(
            Command::new("sdk-info")
                .about("Show the SDK resolved for a board")
                .arg(
                    Arg::new("board")
                        .value_name("BOARD")
                        .default_value("uno")
                        .help("Board id"),
                ),
        )
}

fn board(args: &ArgMatches) -> anyhow::Result<&'static Board> {
    Ok(Board::find(args.value_of("board").unwrap_or("uno"))?)
}

/// Nombre del sketch: `--name` o el nombre de su directorio.
fn sketch_name(args: &ArgMatches) -> String {
    if let Some(name) = args.value_of("name") {
        return name.to_owned();
    }

    args.value_of("sketch")
        .map(Path::new)
        .map(|sketch| sketch.canonicalize().unwrap_or_else(|_| sketch.to_owned()))
        .and_then(|sketch| sketch.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| String::from("sketch"))
}

fn build(args: &ArgMatches, board: &'static Board) -> anyhow::Result<Build> {
    let request = compile::Request {
        sketch_dir: PathBuf::from(args.value_of("sketch").context("No sketch directory")?),
        build_dir: PathBuf::from(args.value_of("build-dir").context("No build directory")?),
        name: sketch_name(args),
        cpp_std: args.value_of("cpp-std").unwrap_or("c++11").to_owned(),
        includes: args.values_of("include").into_iter().flatten().map(PathBuf::from).collect(),
    };

    let mut options = LinkOptions::default();
    options.set(LinkOptions::STRIP, args.is_present("strip"));

    if !args.is_present("quiet") {
        eprintln!("compiling {} for {}", request.name, board);
    }

    let start = Instant::now();
    let build = compile::compile(&request, board, options)?;

    if !args.is_present("quiet") {
        eprintln!("compiled in {:.2} s", start.elapsed().as_secs_f64());
    }

    Ok(build)
}

fn upload_request(args: &ArgMatches, name: Option<String>) -> anyhow::Result<flash::Request> {
    let baud = match args.value_of("baud") {
        Some(baud) => Some(baud.parse().with_context(|| format!("Invalid baud rate: {}", baud))?),
        None => None,
    };

    Ok(flash::Request {
        build_dir: PathBuf::from(args.value_of("build-dir").context("No build directory")?),
        name,
        port: args.value_of("port").map(String::from),
        baud,
        verbose: args.is_present("verbose"),
    })
}

fn upload(request: &flash::Request, board: &'static Board, quiet: bool) -> anyhow::Result<Uploaded> {
    if !quiet {
        eprintln!("uploading to {}", board);
    }

    Ok(flash::upload(request, board)?)
}

fn report_build(build: &Build, quiet: bool) {
    if quiet {
        return;
    }

    eprintln!(
        "  units: {} compiled, {} cached",
        build.units.compiled, build.units.cached
    );
    eprintln!("  image: {}", build.firmware.image.display());

    if let Some(size) = &build.firmware.size {
        eprintln!("\n{}", size);
    }
}

fn report_upload(uploaded: &Uploaded, quiet: bool) {
    if !quiet {
        eprintln!("ok  {} -> {}", uploaded.firmware.display(), uploaded.port);
    }
}

fn list_ports() {
    let ports = detect::scan();
    if ports.is_empty() {
        eprintln!("no serial ports found");
        return;
    }

    println!("{:<24}{:<12}{:<12}NAME", "PORT", "BOARD", "VID:PID");
    for port in &ports {
        let device = port.device();
        let id = port.id.map(|id| id.to_string()).unwrap_or_else(|| String::from("-"));

        println!(
            "{:<24}{:<12}{:<12}{}",
            port.path,
            device.map_or("unknown", |device| device.board),
            id,
            device.map_or("-", |device| device.name)
        );
    }
}

fn list_boards() {
    for board in Board::catalog() {
        println!(
            "{:<14}{:<28}{:<9}{:>5} KB flash {:>4} KB RAM",
            board.id,
            board.name,
            board.arch(),
            board.flash_kb,
            board.ram_kb
        );
    }
}

fn sdk_info(board: &'static Board) -> anyhow::Result<()> {
    let sdk = sdk::resolve(board)?;
    let show = |path: &Option<PathBuf>, missing: &str| {
        path.as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| missing.to_owned())
    };

    println!("board      {}", board);
    println!("version    {}", sdk.version);
    println!("root       {}", sdk.root.display());
    println!("core       {}", sdk.core_dir.display());
    println!("variant    {}", sdk.variant_dir.display());
    println!("toolchain  {}", show(&sdk.toolchain_bin, "(from PATH)"));
    println!("libraries  {}", show(&sdk.libraries_dir, "(none)"));
    println!("tools      {}", show(&sdk.tools_dir, "(none)"));

    Ok(())
}
