//! luawasm CLI entry point.
//!
//! `run` executes a Lua script with the `wasm_core` table preloaded;
//! `inspect` prints the exports of a module without instantiating it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use mlua::Lua;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use luawasm_common::ConfigFile;
use luawasm_core::{CompiledModule, ExportKind, ValueKind, WasmEngine};

#[derive(Parser)]
#[command(name = "luawasm", version, about = "Run WebAssembly from Lua scripts")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, short, global = true, env = "LUAWASM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Lua script with the operation table available to `require`.
    Run {
        /// Path to the script.
        script: PathBuf,

        /// Arguments exposed to the script as `arg[1]`, `arg[2]`, ...
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// List the exports of a module (binary or text format).
    Inspect {
        /// Path to the module.
        module: PathBuf,

        /// Print descriptors as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,luawasm=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run { script, args } => run(&config, &script, &args),
        Command::Inspect { module, json } => inspect(&config, &module, json),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ConfigFile> {
    let Some(path) = path else {
        return Ok(ConfigFile::default());
    };
    let config = ConfigFile::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    info!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

fn run(config: &ConfigFile, script: &Path, args: &[String]) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read script {}", script.display()))?;

    let lua = Lua::new();
    luawasm_lua::preload(&lua, &config.runtime, &config.script.module_name)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", config.script.module_name))?;

    let script_name = script.display().to_string();
    let set_args = || -> mlua::Result<()> {
        let arg = lua.create_table()?;
        arg.raw_set(0, script_name.as_str())?;
        for (i, value) in args.iter().enumerate() {
            arg.raw_set(i + 1, value.as_str())?;
        }
        lua.globals().set("arg", arg)
    };
    set_args().map_err(|e| anyhow::anyhow!("Failed to set arg: {e}"))?;

    info!(script = %script_name, args = args.len(), "Running script");

    lua.load(source)
        .set_name(format!("@{script_name}"))
        .exec()
        .map_err(|e| anyhow::anyhow!("{e}"))
}

fn inspect(config: &ConfigFile, path: &Path, json: bool) -> anyhow::Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read module {}", path.display()))?;

    let engine = WasmEngine::new(&config.runtime.engine)?;
    let module = CompiledModule::from_bytes(engine.inner(), &bytes)?;
    let exports = module.exports()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&exports)?);
        return Ok(());
    }

    println!(
        "{} ({}, {} imports, {} exports, hash {})",
        path.display(),
        if module.is_binary() { "binary" } else { "text" },
        module.import_count(),
        exports.len(),
        module.content_hash()
    );
    for export in &exports {
        match &export.kind {
            ExportKind::Func { params, results } => println!(
                "  func    {} ({}) -> ({})",
                export.name,
                join_kinds(params),
                join_kinds(results)
            ),
            ExportKind::Memory { min, max } => match max {
                Some(max) => println!("  memory  {} {min}..{max} pages", export.name),
                None => println!("  memory  {} {min}.. pages", export.name),
            },
            other => println!("  {:<7} {}", other.type_name(), export.name),
        }
    }

    Ok(())
}

fn join_kinds(kinds: &[ValueKind]) -> String {
    kinds
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
