//! CLI tool for inferbench
//!
//! Lists GPU adapters, then times repeated inference calls on a model at
//! several inter-call delays and writes `<delay_ms> <duration_ms>` lines to
//! the durations file.

use clap::{CommandFactory, Parser};
use colored::Colorize;
use inferbenchlib::bench::{LatencySample, Sweep, SweepEvent};
use inferbenchlib::config::BenchConfig;
use inferbenchlib::inference::{
    DeadlineRunner, DevicePreference, InferenceSession, OrtBackend, Runner,
};
use inferbenchlib::{gpu, report};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "inferbench")]
#[command(about = "Inference latency benchmark under varying delays between calls", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the model file (ONNX)
    model: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Timed calls per delay value
    #[arg(short = 'n', long)]
    iterations: Option<usize>,

    /// Comma-separated delays between calls in milliseconds
    #[arg(short, long, value_delimiter = ',')]
    delays: Option<Vec<u64>>,

    /// Durations output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Intra-op thread override (0 = engine default)
    #[arg(short, long)]
    threads: Option<u32>,

    /// Device kind: default, cpu, directx, directx-high-performance, directx-min-power
    #[arg(long)]
    device: Option<DevicePreference>,

    /// Adapter index used for DirectX device kinds
    #[arg(long)]
    adapter_index: Option<u32>,

    /// Per-call deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Re-attempts of a call after a transient device error
    #[arg(long)]
    transient_retries: Option<u32>,

    /// Summary output format (text or json)
    #[arg(short = 'f', long, default_value = "text")]
    summary_format: String,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let Some(model) = cli.model.clone() else {
        eprintln!("{}", Cli::command().render_usage());
        std::process::exit(1);
    };

    if let Err(e) = run(&cli, &model) {
        eprintln!("{} {}", "error:".red(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli, model: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;

    let devices = gpu::enumerate_devices().unwrap_or_else(|e| {
        log::warn!("GPU enumeration failed: {}", e);
        Vec::new()
    });
    let gpu_available = gpu::display_inventory(&mut std::io::stdout().lock(), &devices)?;
    let session_config = config.session_config(gpu_available);
    let device = session_config.device;

    let mut session = InferenceSession::with_config(OrtBackend::new(), model, session_config)?;
    println!(
        "{} {} on {}: input {:?}, output {:?}",
        "[*]".cyan(),
        model.display(),
        device,
        session.input_shape(),
        session.output_shape()
    );

    let sweep = config.sweep();
    let samples = match config.timeout() {
        Some(timeout) => {
            let mut runner = DeadlineRunner::new(session, timeout)?;
            run_with_progress(&sweep, &mut runner)?
        }
        None => run_with_progress(&sweep, &mut session)?,
    };

    report::write_durations(&config.output, &samples)?;
    println!(
        "{} Durations written to: {}",
        "[+]".green(),
        config.output.display()
    );

    let summary = report::summarize(&samples);
    match cli.summary_format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print!("{}", report::format_summary_table(&summary)),
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<BenchConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::from_toml_file(path)?,
        None => BenchConfig::default(),
    };

    if let Some(iterations) = cli.iterations {
        config.iterations = iterations;
    }
    if let Some(delays) = &cli.delays {
        config.delays_ms = delays.clone();
    }
    if let Some(output) = &cli.output {
        config.output = output.clone();
    }
    if let Some(threads) = cli.threads {
        config.intra_op_threads = threads;
    }
    if cli.device.is_some() {
        config.device = cli.device;
    }
    if let Some(index) = cli.adapter_index {
        config.adapter_index = index;
    }
    if cli.timeout_ms.is_some() {
        config.timeout_ms = cli.timeout_ms;
    }
    if let Some(retries) = cli.transient_retries {
        config.transient_retries = retries;
    }

    config.validate()?;
    Ok(config)
}

fn run_with_progress<R: Runner + ?Sized>(
    sweep: &Sweep,
    runner: &mut R,
) -> inferbenchlib::Result<Vec<LatencySample>> {
    let stdout = std::io::stdout();
    sweep.run_observed(runner, |event| {
        let mut out = stdout.lock();
        match event {
            SweepEvent::DelayStarted { delay } => {
                writeln!(out, "-------------------------------- {}", delay.as_millis())
            }
            SweepEvent::Sample(sample) => writeln!(out, "{}", sample.duration.as_millis()),
            SweepEvent::Retry {
                attempt, error, ..
            } => {
                eprintln!("{} retry {} after: {}", "[!]".yellow(), attempt, error);
                Ok(())
            }
        }
        .ok();
    })
}
