use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use glossa_core::{
    AnalysisOptions, AnalysisResult, AssemblyOptions, Orchestrator, OrchestratorConfig,
    VisualMode, check_service, config::parse_seconds, format_result_readable, get_cache_dir,
    get_result_path, get_root_cache_dir, load_result, save_result, to_srt,
    types::{DEFAULT_FRAME_INTERVAL, DEFAULT_LANGUAGE},
    wait_until_ready,
};
use tokio::fs;
use tracing_subscriber::EnvFilter;

mod progress;

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

/// CLI wrapper for VisualMode (needed for clap ValueEnum)
#[derive(Clone, Copy, Default, ValueEnum)]
enum CliVisualMode {
    #[default]
    All,
    Ocr,
    Scene,
}

impl From<CliVisualMode> for VisualMode {
    fn from(cli: CliVisualMode) -> Self {
        match cli {
            CliVisualMode::All => VisualMode::All,
            CliVisualMode::Ocr => VisualMode::Ocr,
            CliVisualMode::Scene => VisualMode::Scene,
        }
    }
}

#[derive(Parser)]
#[command(name = "glossa")]
#[command(about = "Turn a video URL into subtitles, on-screen text, scene descriptions and a glossary")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subtitle service base URL (overrides GLOSSA_SUBTITLE_URL)
    #[arg(long, global = true)]
    subtitle_url: Option<String>,

    /// Analysis service base URL (overrides GLOSSA_ANALYSIS_URL)
    #[arg(long, global = true)]
    analysis_url: Option<String>,

    /// Seconds between status polls
    #[arg(long, global = true)]
    poll_interval: Option<String>,

    /// Seconds a job may take before it is reported as timed out
    #[arg(long, global = true)]
    time_budget: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a video
    Analyze(AnalyzeArgs),
    /// Check that both services are up
    Check(CheckArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Keep probing for up to this many seconds before giving up
    #[arg(long)]
    wait: Option<String>,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Video URL (YouTube, Bilibili, Vimeo or a direct media file)
    url: String,

    /// Skip frame analysis; subtitles only
    #[arg(long)]
    no_visual: bool,

    /// What the frame analysis extracts
    #[arg(long, default_value = "all")]
    visual_mode: CliVisualMode,

    /// Seconds between analyzed frames
    #[arg(long, default_value_t = DEFAULT_FRAME_INTERVAL)]
    frame_interval: f64,

    /// Subtitle language
    #[arg(short, long, default_value = DEFAULT_LANGUAGE)]
    lang: String,

    /// Leave the subtitle track out of the output
    #[arg(long)]
    no_captions: bool,

    /// Force re-processing even if a cached result exists
    #[arg(short, long)]
    force: bool,

    /// Also write the subtitles as an SRT file
    #[arg(long)]
    srt: Option<PathBuf>,

    /// Print the result as JSON instead of readable text
    #[arg(long)]
    json: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "glossa=debug,glossa_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<OrchestratorConfig> {
    let mut config = OrchestratorConfig::from_env().context("invalid environment configuration")?;

    if let Some(url) = &cli.subtitle_url {
        config.subtitle_service_url = url.clone();
    }
    if let Some(url) = &cli.analysis_url {
        config.analysis_service_url = url.clone();
    }
    if let Some(value) = &cli.poll_interval {
        config.poll_interval = parse_seconds("--poll-interval", value)?;
    }
    if let Some(value) = &cli.time_budget {
        config.time_budget = parse_seconds("--time-budget", value)?;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            return Ok(ExitCode::FAILURE);
        }
    };

    match cli.command {
        Command::Analyze(args) => analyze(args, config).await,
        Command::Check(args) => check(args, &config).await,
    }
}

async fn analyze(args: AnalyzeArgs, config: OrchestratorConfig) -> Result<ExitCode> {
    let options = AnalysisOptions {
        include_visual_analysis: !args.no_visual,
        visual_mode: args.visual_mode.into(),
        frame_interval: args.frame_interval,
        language: args.lang.clone(),
    };
    let assembly = AssemblyOptions {
        captions_enabled: !args.no_captions,
    };

    let cache_dir = get_cache_dir(&get_root_cache_dir(), &args.url);
    let result_path = get_result_path(&cache_dir, &options);

    // stdout carries only the document in --json mode
    let chatty = !args.json;
    if chatty {
        println!(
            "\n{}  {}\n",
            style("glossa").cyan().bold(),
            style("Video Analyzer").dim()
        );
        println!("{}", style("─".repeat(60)).dim());
    }

    let total_start = Instant::now();

    let cached = if args.force {
        None
    } else {
        load_cached(&result_path).await
    };

    let result = if let Some(mut result) = cached {
        if !assembly.captions_enabled {
            result.subtitles.clear();
        }
        if chatty {
            println!(
                "{} Analysis loaded {}",
                style("✓").green().bold(),
                style("(cached)").dim()
            );
        }
        result
    } else {
        match run_job(&args.url, options, assembly, config).await? {
            Some(result) => {
                if chatty {
                    println!(
                        "{} Analysis complete via {}",
                        style("✓").green().bold(),
                        style(
                            result
                                .subtitle_source
                                .map(|s| s.name())
                                .unwrap_or("unknown source")
                        )
                        .yellow()
                    );
                }
                // a caption-less result would poison the cache for later runs
                if assembly.captions_enabled {
                    save_result(&result, &result_path).await?;
                }
                result
            }
            None => return Ok(ExitCode::FAILURE),
        }
    };

    if let Some(path) = &args.srt {
        fs::write(path, to_srt(&result.subtitles))
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if chatty {
        println!(
            "\n{} {}\n",
            style("Total time:").dim(),
            style(format_duration(total_start.elapsed())).cyan().bold()
        );
        if let Some(path) = &args.srt {
            println!(
                "{} {}",
                style("Subtitles:").dim(),
                style(path.display()).cyan()
            );
        }
        if assembly.captions_enabled {
            println!(
                "{} {}\n",
                style("Saved:").dim(),
                style(result_path.display()).cyan()
            );
        }
        println!("{}", style("─".repeat(60)).dim());
    }

    print_result(&result, args.json)?;
    Ok(ExitCode::SUCCESS)
}

/// Cached result at `path`, if there is a usable one. An unreadable file is
/// reported and treated as a cache miss.
async fn load_cached(path: &Path) -> Option<AnalysisResult> {
    if !path.exists() {
        return None;
    }
    match load_result(path).await {
        Ok(result) => Some(result),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable cached result");
            None
        }
    }
}

/// Drive one job with a live progress bar. `None` means the job failed and
/// the failure was already reported.
async fn run_job(
    url: &str,
    options: AnalysisOptions,
    assembly: AssemblyOptions,
    config: OrchestratorConfig,
) -> Result<Option<AnalysisResult>> {
    let orchestrator = Orchestrator::from_config(config)?;
    let handle = match orchestrator.submit(url, options, assembly) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            return Ok(None);
        }
    };

    tracing::debug!(trace_id = %handle.trace_id(), url, "job submitted");

    let progress = progress::follow(handle.subscribe());
    let report = handle.finish().await;
    progress.await?;

    match report.outcome {
        Ok(result) => Ok(Some(result)),
        Err(failed) => {
            eprintln!(
                "{} {} {}",
                style("✗").red().bold(),
                style(failed.kind).red(),
                failed.message
            );
            Ok(None)
        }
    }
}

fn print_result(result: &AnalysisResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{}", format_result_readable(result));
    }
    Ok(())
}

async fn check(args: CheckArgs, config: &OrchestratorConfig) -> Result<ExitCode> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;
    let wait = args
        .wait
        .as_deref()
        .map(|value| parse_seconds("--wait", value))
        .transpose()?;

    let mut all_ready = true;
    for (name, base) in [
        ("subtitle", &config.subtitle_service_url),
        ("analysis", &config.analysis_service_url),
    ] {
        let spinner = progress::create_spinner(&format!("Checking {} service...", name));
        let readiness = match wait {
            Some(timeout) => {
                wait_until_ready(&client, base, config.poll_interval, timeout).await
            }
            None => check_service(&client, base).await,
        };
        let mark = if readiness.is_ready() {
            style("✓").green().bold()
        } else {
            all_ready = false;
            style("✗").red().bold()
        };
        spinner.finish_with_message(format!(
            "{} {} service {} {}",
            mark,
            name,
            readiness,
            style(format!("({})", base)).dim()
        ));
    }

    Ok(if all_ready {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_analyze_flags() {
        let cli = Cli::try_parse_from([
            "glossa",
            "analyze",
            "https://youtu.be/dQw4w9WgXcQ",
            "--no-visual",
            "--lang",
            "en",
            "--srt",
            "out.srt",
            "--verbose",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert!(args.no_visual);
        assert_eq!(args.lang, "en");
        assert_eq!(args.frame_interval, DEFAULT_FRAME_INTERVAL);
        assert_eq!(args.srt, Some(PathBuf::from("out.srt")));
    }

    #[tokio::test]
    async fn corrupt_cache_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("analysis_zh_audio.json");
        assert!(load_cached(&path).await.is_none());

        fs::write(&path, "{ not json").await.unwrap();
        assert!(load_cached(&path).await.is_none());

        let result = AnalysisResult {
            summary: Some("cached".into()),
            ..Default::default()
        };
        save_result(&result, &path).await.unwrap();
        assert_eq!(load_cached(&path).await, Some(result));
    }

    #[test]
    fn durations_read_naturally() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }
}
