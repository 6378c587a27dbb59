//! patchlang: check, export and dry-run patch files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use patchlang::expr::ParamValues;
use patchlang::{Compiler, Generator, PatchConfig, PitchBend, Player, Rack};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Compile and audition synthesizer patch files
#[derive(Parser)]
#[command(name = "patchlang")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.patchlang/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Wavetable JSON file, overriding the config
    #[arg(long, global = true)]
    wavetables: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a patch and report errors and warnings
    Check { file: PathBuf },

    /// Write the compiled patch as JSON
    Ir {
        file: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Dry-run one voice and print each module's schedule
    Play {
        file: PathBuf,

        #[arg(long, default_value_t = 440.0)]
        pitch: f64,

        #[arg(long, default_value_t = 0.8)]
        level: f64,

        /// Fixed note length in seconds; held for one second otherwise
        #[arg(long)]
        duration: Option<f64>,

        /// Bend every oscillator toward this voice pitch
        #[arg(long)]
        bend: Option<f64>,

        /// Parameter override, e.g. --set cutoff=0.4
        #[arg(long = "set", value_parser = parse_assignment)]
        set: Vec<(String, f64)>,
    },
}

fn parse_assignment(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    Ok((name.trim().to_string(), value))
}

fn load_rack(cli: &Cli) -> CliResult<Rack> {
    let mut config = match &cli.config {
        Some(path) => PatchConfig::load_from(path)?,
        None => PatchConfig::load()?,
    };
    if let Some(path) = &cli.wavetables {
        config.wavetables = Some(path.clone());
    }
    let rack = Rack::load(config)?;
    Ok(rack)
}

fn compile(file: &Path, rack: &Rack) -> CliResult<Generator> {
    let source = std::fs::read_to_string(file)?;
    let generator = Compiler::compile(&source, rack)
        .map_err(|e| format!("{}: {e}", file.display()))?;
    for warning in generator.warnings() {
        warn!("{warning}");
    }
    Ok(generator)
}

fn report_errors(file: &Path, generator: &Generator) -> bool {
    for error in generator.errors() {
        eprintln!("{}: error: {error}", file.display());
    }
    generator.is_valid()
}

fn run(cli: Cli) -> CliResult<ExitCode> {
    let rack = load_rack(&cli)?;

    match cli.command {
        Commands::Check { file } => {
            let generator = compile(&file, &rack)?;
            if !report_errors(&file, &generator) {
                return Ok(ExitCode::FAILURE);
            }
            println!(
                "{}: ok ({} modules, {} patches, {} envelopes, {} tweaks, {} warnings)",
                file.display(),
                generator.modules().len(),
                generator.patches().len(),
                generator.envelopes().len(),
                generator.tweaks().len(),
                generator.warnings().len(),
            );
        }
        Commands::Ir { file, output } => {
            let generator = compile(&file, &rack)?;
            let json = generator.to_json()?;
            match output {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{json}"),
            }
            if !generator.is_valid() {
                report_errors(&file, &generator);
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Play {
            file,
            pitch,
            level,
            duration,
            bend,
            set,
        } => {
            let generator = compile(&file, &rack)?;
            if !report_errors(&file, &generator) {
                return Ok(ExitCode::FAILURE);
            }

            let mut overrides = ParamValues::from([
                ("pitch".to_string(), pitch),
                ("level".to_string(), level),
            ]);
            overrides.extend(set);

            let mut player = Player::new(Arc::new(generator), &overrides, &rack)?;
            let bend = bend.map(|to| PitchBend { to, time: None });
            player.start(0.0, duration, bend);
            let teardown = player.stop_after_release(duration.unwrap_or(1.0));

            println!("{:<12} {:<12} {:>8} {:>8}", "module", "type", "start", "stop");
            for (id, instance) in player.instances() {
                let lifetime = instance.lifetime();
                let fmt = |t: Option<f64>| t.map_or("-".to_string(), |t| format!("{t:.3}"));
                println!(
                    "{:<12} {:<12} {:>8} {:>8}",
                    id,
                    instance.kind().tag(),
                    fmt(lifetime.started),
                    fmt(lifetime.stopped),
                );
            }
            println!("teardown at {teardown:.3}s");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("patchlang: {e}");
            ExitCode::FAILURE
        }
    }
}
