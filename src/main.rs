use anyhow::{bail, Context};
use clap::Parser;
use corebench::config::load_or_builtin;
use corebench::hardware::{cpu_brand_and_clocks, AffinityController};
use corebench::log_collector::default_log_dir;
use corebench::models::{CoreClass, EventState};
use corebench::{
    BenchmarkOrchestrator, DeviceTier, EventBus, LogCollector, ScoreSummary, SuiteConfig,
    SuiteStatus,
};
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// corebench command line
#[derive(Parser, Debug)]
#[command(name = "corebench")]
#[command(author, version, about = "CPU benchmark for heterogeneous multi-core processors")]
struct Cli {
    /// Workload tier: slow, mid or flagship
    #[arg(long, default_value = "mid", value_parser = parse_tier)]
    tier: DeviceTier,

    /// Skip the warm-up pass
    #[arg(long)]
    no_warmup: bool,

    /// Scoring reference (.toml or .json); defaults to the user override or the built-in table
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the score summary as JSON to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for the run log
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Echo debug-level log records to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Print the detected core topology and exit
    #[arg(long)]
    topology: bool,
}

fn parse_tier(raw: &str) -> Result<DeviceTier, String> {
    let tier = raw.parse::<DeviceTier>()?;
    if tier.is_measured() {
        Ok(tier)
    } else {
        Err("the test tier is reserved for warm-up".to_string())
    }
}

fn print_topology(orchestrator: &BenchmarkOrchestrator) {
    let topology = orchestrator.topology();
    let (brand, clocks) = cpu_brand_and_clocks();

    println!("CPU: {}", brand);
    println!("Present cores: {}", topology.present_count);
    if topology.is_unknown() {
        println!("Core classes: unknown (no frequency data)");
    } else {
        println!(
            "Core classes: {} BIG / {} MID / {} LITTLE",
            topology.count_class(CoreClass::Big),
            topology.count_class(CoreClass::Mid),
            topology.count_class(CoreClass::Little)
        );
        for core in &topology.cores {
            let current = clocks
                .get(core.id)
                .map(|mhz| format!("{} MHz", mhz))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  cpu{:<3} {:>6}  max {:>5} MHz  now {:>9}{}",
                core.id,
                core.core_class.to_string(),
                core.max_frequency_hz / 1_000_000,
                current,
                if core.online { "" } else { "  (offline)" }
            );
        }
    }

    let affinity: &AffinityController = orchestrator.affinity();
    println!("Affinity: {:?}", affinity.capability());
    match affinity.target_core() {
        Some(core) => println!("Single-core pin target: cpu{}", core),
        None => println!("Single-core pin target: none"),
    }
    if let Ok(mask) = affinity.current_affinity() {
        println!("Current affinity mask: {:?}", mask);
    }
}

fn print_summary(summary: &ScoreSummary) {
    println!();
    println!("{:<34} {:>16} {:>10} {:>10}", "Kernel", "ops/s", "ms", "score");
    for (score, result) in summary.kernel_scores.iter().zip(&summary.per_kernel_results) {
        let status = match (&result.error, score.ratio) {
            (Some(error), _) => format!("  [failed: {}]", error),
            (None, None) => "  [excluded]".to_string(),
            (None, Some(_)) => String::new(),
        };
        println!(
            "{:<34} {:>16.0} {:>10.1} {:>10.1}{}",
            score.name, score.ops_per_second, result.execution_time_ms, score.score, status
        );
    }
    println!();
    println!("Single-core score: {:.1}", summary.single_core_score);
    println!("Multi-core score:  {:.1}", summary.multi_core_score);
    println!("Core ratio:        {:.2}x", summary.core_ratio);
    println!("Final score:       {:.1} ({})", summary.final_score, summary.rating);
    println!("Reference:         {}", summary.reference_version);
    if summary.status != SuiteStatus::Completed {
        println!("Status:            {:?}", summary.status);
    }
    if let Some(failure) = &summary.failure {
        println!("Failure:           {}", failure);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let console_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let log_dir = cli.log_dir.clone().unwrap_or_else(default_log_dir);
    let collector = LogCollector::new(&log_dir, console_level).map_err(anyhow::Error::msg)?;
    if let Err(e) = collector.install(LevelFilter::Debug) {
        eprintln!("[Main] WARNING: {}", e);
    }
    log::info!("corebench {} starting", corebench::VERSION);

    let config = load_or_builtin(cli.config.as_deref()).context("loading scoring reference")?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let bus = Arc::new(EventBus::new());
    let orchestrator = BenchmarkOrchestrator::new(config)
        .with_event_sink(bus.clone())
        .with_cancellation(cancel_rx);

    if cli.topology {
        print_topology(&orchestrator);
        let _ = collector.wait_for_empty();
        return Ok(());
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current kernel...");
            let _ = cancel_tx.send(true);
        }
    });

    let mut events = bus.subscribe();
    let printer = tokio::spawn(async move {
        while events.changed().await.is_ok() {
            let Some(event) = events.borrow_and_update().clone() else {
                continue;
            };
            match event.state {
                EventState::Started => eprintln!("[{:?}] {} ...", event.mode, event.test_name),
                EventState::Completed => eprintln!(
                    "[{:?}] {} done in {:.1} ms",
                    event.mode,
                    event.test_name,
                    event.time_ms
                ),
            }
        }
    });

    let suite = SuiteConfig {
        tier: cli.tier,
        warmup: !cli.no_warmup,
    };
    let summary = orchestrator.run(&suite).await;
    drop(orchestrator);
    drop(bus);
    let _ = printer.await;

    print_summary(&summary);

    if let Some(path) = &cli.output {
        summary
            .write_json(path)
            .with_context(|| format!("writing summary to {}", path.display()))?;
        println!("Summary written to {}", path.display());
    }

    log::info!("Run log: {}", collector.session_path().display());
    if let Err(e) = collector.wait_for_empty() {
        eprintln!("[Main] WARNING: Failed to flush run log: {}", e);
    }

    if summary.status == SuiteStatus::Failed {
        bail!(
            "benchmark suite failed: {}",
            summary.failure.as_deref().unwrap_or("unknown cause")
        );
    }
    Ok(())
}
