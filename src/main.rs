use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use hef_sim::config::Config;
use hef_sim::engine;
use hef_sim::events::{CancelToken, EventKind, EventSink, SimEvent, Watchdog};
use hef_sim::mc;
use hef_sim::output;
use hef_sim::report;
use hef_sim::risk::StressShock;

#[derive(Parser)]
#[command(name = "hef-sim", about = "Monte Carlo simulator for a home-equity investment fund")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file and exit
    Validate {
        /// Config JSON file; defaults to the smoke preset
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run a single simulation path
    Run {
        /// Config JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Built-in preset when no config file is given (smoke, fund100m)
        #[arg(long, default_value = "smoke")]
        preset: String,

        /// Override the config seed
        #[arg(long)]
        seed: Option<u64>,

        /// Output directory
        #[arg(long, default_value = "output/run")]
        output: String,

        /// Abort the run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Run the Monte Carlo fan-out
    Mc {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "smoke")]
        preset: String,

        /// Number of inner paths
        #[arg(long, default_value = "100")]
        paths: usize,

        /// Worker threads (1 = serial)
        #[arg(long, default_value = "4")]
        workers: usize,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value = "output/mc")]
        output: String,
    },

    /// Run a named stress shock (or "all")
    Stress {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "smoke")]
        preset: String,

        /// Shock name from the catalogue, or "all"
        #[arg(long, default_value = "all")]
        name: String,

        #[arg(long, default_value = "output/stress")]
        output: String,
    },
}

/// Drives the CLI progress bar from the engine's event stream.
struct BarSink {
    bar: ProgressBar,
}

impl EventSink for BarSink {
    fn emit(&self, event: SimEvent) {
        match event.kind {
            EventKind::ModuleStarted { module } => self.bar.set_message(module),
            EventKind::ModuleCompleted { .. } => self.bar.inc(1),
            EventKind::Error { error, module } => {
                self.bar
                    .println(format!("  error in {}: {}", module.unwrap_or("?"), error));
            }
            _ => {}
        }
    }
}

/// Counts completed paths during an MC run.
struct PathBarSink {
    bar: ProgressBar,
}

impl EventSink for PathBarSink {
    fn emit(&self, event: SimEvent) {
        if let EventKind::Progress {
            module: "monte_carlo",
            fraction,
            ..
        } = event.kind
        {
            self.bar.set_position((fraction * self.bar.length().unwrap_or(1) as f64) as u64);
        }
    }
}

fn load_config(path: &Option<PathBuf>, preset: &str) -> Result<Config, String> {
    match path {
        Some(p) => Config::from_json_file(p).map_err(|e| e.to_string()),
        None => match preset {
            "smoke" => Ok(Config::smoke_10m()),
            "fund100m" => Ok(Config::fund_100m()),
            other => Err(format!("unknown preset `{other}` (smoke, fund100m)")),
        },
    }
}

fn stage_bar(stages: u64) -> ProgressBar {
    let bar = ProgressBar::new(stages);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("  [{bar:40}] {pos}/{len} {msg}")
            .expect("progress template"),
    );
    bar
}

fn print_summary(result: &engine::SimulationResult) {
    let ctx = &result.context;
    if let Some(ledger) = &ctx.cashflows {
        let s = &ledger.summary;
        println!(
            "  loans={}, irr={}, tvpi={}, distributions=${:.0}",
            ctx.loans.len(),
            s.irr.map(|r| format!("{:.2}%", r * 100.0)).unwrap_or_else(|| "n/a".into()),
            s.tvpi.map(|x| format!("{x:.2}x")).unwrap_or_else(|| "n/a".into()),
            s.total_distributions,
        );
    }
    if let Some(report) = &ctx.guardrail_report {
        let worst = report
            .worst_level()
            .map(|s| s.label())
            .unwrap_or("NONE");
        println!("  guardrails: {} breaches, worst={}", report.breaches.len(), worst);
    }
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            match load_config(&config, "smoke").and_then(|c| c.validate().map_err(|e| e.to_string()))
            {
                Ok(()) => println!("Config OK"),
                Err(e) => {
                    eprintln!("Config invalid: {e}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Run {
            config,
            preset,
            seed,
            output,
            timeout_secs,
        } => {
            let config = match load_config(&config, &preset) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return;
                }
            };
            let seed = seed.unwrap_or(config.seed);

            println!(
                "Running single path: ${:.0} fund, {}y term, seed {} ({})",
                config.fund.fund_size,
                config.fund.term_years,
                seed,
                Local::now().format("%Y-%m-%d %H:%M"),
            );

            let token = CancelToken::new();
            let _watchdog = timeout_secs
                .map(|t| Watchdog::spawn(token.clone(), Duration::from_secs(t)));
            let sink = BarSink {
                bar: stage_bar(13),
            };

            match engine::run(&config, seed, &token, &sink) {
                Ok(result) => {
                    sink.bar.finish_and_clear();
                    println!("Status: {:?}", result.status);
                    print_summary(&result);

                    let dir = PathBuf::from(&output);
                    match output::save_all(&config, &result.context, &dir) {
                        Ok(()) => println!("Outputs saved to {}", dir.display()),
                        Err(e) => eprintln!("Error saving outputs: {e}"),
                    }
                }
                Err(e) => eprintln!("Error: {e}"),
            }
        }

        Commands::Mc {
            config,
            preset,
            paths,
            workers,
            seed,
            output,
        } => {
            let config = match load_config(&config, &preset) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return;
                }
            };
            let seed = seed.unwrap_or(config.seed);

            println!(
                "Monte Carlo: {} paths x {} workers, seed {}",
                paths, workers, seed
            );

            let token = CancelToken::new();
            let bar = ProgressBar::new(paths as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("  [{bar:40}] {pos}/{len} paths ({eta})")
                    .expect("progress template"),
            );
            let sink = PathBarSink { bar };

            match mc::run_mc(&config, seed, paths, workers, &token, &sink) {
                Ok(result) => {
                    sink.bar.finish_and_clear();
                    let completed =
                        result.path_summaries.iter().filter(|p| p.completed).count();
                    println!("Completed {}/{} paths", completed, result.n_paths);

                    if let Some(irr) = &result.distributions.irr {
                        println!(
                            "  IRR: mean={:.2}% median={:.2}% p5={:.2}% p95={:.2}%",
                            irr.mean * 100.0,
                            irr.median * 100.0,
                            irr.p5 * 100.0,
                            irr.p95 * 100.0,
                        );
                    }
                    if let Some(p) = result.hurdle_clear_probability {
                        println!("  P(IRR >= hurdle) = {:.1}%", p * 100.0);
                    }
                    println!(
                        "  guardrail fail rate = {:.1}%",
                        result.guardrail_fail_rate * 100.0
                    );

                    let dir = PathBuf::from(&output);
                    match output::save_mc_distributions_csv(
                        &result,
                        &dir.join("distributions.csv"),
                    ) {
                        Ok(()) => println!("Distributions saved to {}", dir.display()),
                        Err(e) => eprintln!("Error saving distributions: {e}"),
                    }
                }
                Err(e) => eprintln!("Error: {e}"),
            }
        }

        Commands::Stress {
            config,
            preset,
            name,
            output,
        } => {
            let base = match load_config(&config, &preset) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return;
                }
            };

            let catalogue = StressShock::standard_catalogue();
            let selected: Vec<StressShock> = if name == "all" {
                catalogue
            } else {
                match catalogue.into_iter().find(|s| s.name == name) {
                    Some(s) => vec![s],
                    None => {
                        eprintln!("Unknown stress shock `{name}`");
                        return;
                    }
                }
            };

            println!("Running {} stress shock(s):", selected.len());
            let token = CancelToken::new();

            for shock in selected {
                let mut variant = base.clone();
                let shock_name = shock.name.clone();
                variant.applied_shock = Some(shock);
                variant.risk.run_stress_tests = false;

                let sink = BarSink {
                    bar: stage_bar(13),
                };
                match engine::run(&variant, variant.seed, &token, &sink) {
                    Ok(result) => {
                        sink.bar.finish_and_clear();
                        println!("  [{}]", shock_name);
                        print_summary(&result);

                        let dir = PathBuf::from(&output).join(&shock_name);
                        if let Some(bundle) = &result.context.report {
                            let html = report::render_html(
                                bundle,
                                result.context.guardrail_report.as_ref(),
                            );
                            let _ = report::save_report(&html, &dir.join("report.html"));
                        }
                        let _ = output::save_all(&variant, &result.context, &dir);
                    }
                    Err(e) => eprintln!("  [{shock_name}] error: {e}"),
                }
            }
        }
    }
}
