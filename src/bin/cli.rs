// Exiting on unrecoverable errors is fine for a CLI.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::io;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use serde_json::json;

use hostscript::diagnostics::StreamPrinter;
use hostscript::host::{catalog, HostModule, HostType, HostTypeKind, TypeSig};
use hostscript::options::Platform;
use hostscript::persist;
use hostscript::{
    BuildOutput, CompilationOptions, CompiledModule, RuntimeError, Session, StartOptions, TargetKind, Value,
};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "hostscript-cli", about = "Compile and run hostscript sources", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    /// Log pipeline stages (overrides RUST_LOG's default level)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile source files into a unit
    Build(BuildArgs),
    /// Print a persisted image
    Inspect { image: PathBuf },
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Source files, compiled in order
    files: Vec<PathBuf>,

    /// Options file (JSON); flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Produce an executable (requires a static Main)
    #[arg(long)]
    exe: bool,

    /// Output file name (defaults to the first source's stem)
    #[arg(long)]
    out: Option<String>,

    /// Directory for persisted images
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Write the image to disk instead of keeping it in memory only
    #[arg(long)]
    persist: bool,

    /// Emit debug info (line tables, source checksums)
    #[arg(long)]
    debug: bool,

    /// Treat warnings as errors
    #[arg(long)]
    warnaserror: bool,

    /// Define a conditional compilation symbol
    #[arg(long = "define", value_name = "SYM")]
    defines: Vec<String>,

    /// Import a host module from the catalog
    #[arg(long = "reference", value_name = "MOD")]
    references: Vec<String>,

    /// Import the whole System module (Console, Math, ...)
    #[arg(long)]
    stdlib: bool,

    /// Restrict the entry point search to this type
    #[arg(long)]
    main: Option<String>,

    /// Target platform
    #[arg(long, value_parser = parse_platform)]
    platform: Option<Platform>,

    /// Run the entry point after a successful build
    #[arg(long)]
    run: bool,
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    match s.to_ascii_lowercase().as_str() {
        "anycpu" => Ok(Platform::AnyCpu),
        "anycpu32bitpreferred" => Ok(Platform::AnyCpu32BitPreferred),
        "x86" => Ok(Platform::X86),
        "x64" => Ok(Platform::X64),
        other => Err(format!("unknown platform `{other}'")),
    }
}

// ── Sample host module ───────────────────────────────────────────

/// `Sample.MyStruct`, available through `--reference Sample`.
fn sample_module() -> HostModule {
    HostModule::new(
        "Sample",
        vec![HostType::builder("MyStruct")
            .namespace("Sample")
            .kind(HostTypeKind::Struct)
            .field("Message", TypeSig::String)
            .constructor(vec![], |_| Ok(Value::Null))
            .method("ToString", vec![], TypeSig::String, |call| call.this_field("Message"))],
    )
}

// ── Build ────────────────────────────────────────────────────────

fn options_for(args: &BuildArgs) -> CompilationOptions {
    let mut options = match &args.config {
        Some(path) => CompilationOptions::load(path).unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            process::exit(2);
        }),
        None => CompilationOptions {
            load_default_library: true,
            ..CompilationOptions::default()
        },
    };
    if args.exe {
        options.target = TargetKind::Executable;
    }
    if args.out.is_some() {
        options.output_name.clone_from(&args.out);
    }
    if let Some(dir) = &args.out_dir {
        options.output_dir.clone_from(dir);
    }
    if args.persist {
        options.in_memory = false;
    }
    options.generate_debug_info |= args.debug;
    options.warnings_as_errors |= args.warnaserror;
    options.load_default_library |= args.stdlib;
    options.references.extend(args.references.iter().cloned());
    if args.main.is_some() {
        options.main_type.clone_from(&args.main);
    }
    if let Some(platform) = args.platform {
        options.platform = platform;
    }
    options
}

fn build(args: &BuildArgs, raw: bool) -> BuildOutput {
    let mut start = StartOptions::new(options_for(args));
    if !raw {
        start = start.printer(StreamPrinter::new(io::stderr()));
    }
    let mut session = Session::start(start);
    for file in &args.files {
        session.add_from_file(file);
    }
    for symbol in &args.defines {
        session.add_conditional_symbol(symbol.clone());
    }
    session.build()
}

fn module_json(success: bool, module: &CompiledModule) -> serde_json::Value {
    let types: Vec<_> = module
        .types()
        .iter()
        .map(|t| {
            json!({
                "name": t.full_name(),
                "public": t.is_public(),
                "methods": t.method_names(),
                "nested": t.nested_types().iter().map(|n| n.full_name().to_string()).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({
        "success": success,
        "errors": module.error_count(),
        "warnings": module.warning_count(),
        "diagnostics": module.diagnostics(),
        "types": types,
    })
}

fn run_main(module: &CompiledModule) -> i32 {
    match module.run_main() {
        Ok(Value::Int(code)) => i32::try_from(code).unwrap_or(1),
        Ok(_) => 0,
        Err(RuntimeError::NoEntryPoint) => {
            eprintln!("Error: the unit has no entry point (build with --exe)");
            2
        }
        Err(e) => {
            eprintln!("Unhandled: {e}");
            1
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    catalog::register(sample_module());

    match &cli.command {
        Commands::Build(args) => {
            let output = build(args, cli.json);
            let module = &output.module;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&module_json(output.success, module)).unwrap());
            } else if output.success {
                eprintln!("Succeeded. {} warning(s).", module.warning_count());
            } else {
                eprintln!(
                    "Failed. {} error(s). {} warning(s).",
                    module.error_count(),
                    module.warning_count()
                );
            }
            if !output.success {
                process::exit(1);
            }
            if args.run {
                process::exit(run_main(module));
            }
        }
        Commands::Inspect { image } => match persist::load_image(image) {
            Ok(image) => {
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&image).unwrap());
                } else {
                    println!("{} (format v{})", image.name, image.version);
                    for ty in &image.types {
                        let methods: Vec<&str> = ty.methods.iter().map(|m| m.name.as_str()).collect();
                        println!("  {:?} {} [{}]", ty.kind, ty.full_name, methods.join(", "));
                    }
                    if !image.host_types.is_empty() {
                        println!("  host types: {}", image.host_types.join(", "));
                    }
                }
            }
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(2);
            }
        },
    }
}
