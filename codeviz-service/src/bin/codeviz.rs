//! Code Visualizer CLI - trace, scan and time pasted code with an LLM
//!
//! Usage:
//!   codeviz analyze <FILE> [--task trace|errors|complexity] [--json]
//!   codeviz step <FILE>
//!   codeviz normalize <REPLY_FILE> [--task ...]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use codeviz::analyzer::{AnalysisRequest, Analyzer};
use codeviz::normalize::{ComplexityReport, ErrorReport, Normalizer};
use codeviz::session::{Outcome, Session};
use codeviz::view::{ViewState, frame, render_frame};
use codeviz::{AnalysisRecord, CodevizConfig, NormalizedTrace, TaskKind};
use colored::Colorize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_CONFIG: &str = "codeviz.toml";

#[derive(Parser)]
#[command(name = "codeviz", version)]
#[command(about = "Step through LLM-generated execution traces of your code")]
struct Cli {
    /// Config file (default: codeviz.toml if present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one analysis and print the result
    Analyze {
        /// Source file to analyze
        file: PathBuf,

        /// Language tag (default: from the file extension)
        #[arg(long, short = 'l')]
        language: Option<String>,

        /// trace, errors or complexity
        #[arg(long, short = 't', default_value = "trace")]
        task: TaskKind,

        /// Print the normalized record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Trace a file and step through it interactively
    Step {
        file: PathBuf,

        #[arg(long, short = 'l')]
        language: Option<String>,
    },

    /// Normalize a saved model reply without calling the service
    Normalize {
        /// File holding the raw reply text
        reply_file: PathBuf,

        #[arg(long, short = 't', default_value = "trace")]
        task: TaskKind,

        /// Language used when the reply omits one
        #[arg(long, short = 'l', default_value = "python")]
        language: String,
    },
}

fn load_config(path: Option<&Path>) -> Result<CodevizConfig> {
    match path {
        Some(path) => CodevizConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => CodevizConfig::load(DEFAULT_CONFIG)
            .with_context(|| format!("Failed to load config: {}", DEFAULT_CONFIG)),
        None => Ok(CodevizConfig::default()),
    }
}

fn language_for(path: &Path) -> String {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "py" => "python",
        "js" | "mjs" => "javascript",
        "ts" => "typescript",
        "rs" => "rust",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        _ => "text",
    }
    .to_string()
}

fn read_source(file: &Path, language: Option<String>) -> Result<(String, String)> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let language = language.unwrap_or_else(|| language_for(file));
    Ok((source, language))
}

fn build_analyzer(config: CodevizConfig) -> Result<Analyzer> {
    let provider = config
        .build_provider()
        .context("Failed to create LLM provider")?;
    let credentials = Arc::new(config.credential_chain());
    let analyzer = Analyzer::new(config, provider, credentials);
    if !analyzer.credential_available() {
        bail!(
            "No API key found. Set {} (or add it to {})",
            analyzer.config().provider.api_key_env,
            analyzer.config().provider.secrets_file.display()
        );
    }
    Ok(analyzer)
}

fn print_trace(trace: &NormalizedTrace) {
    println!("{} {}", "Language:".dimmed(), trace.language);
    if !trace.summary.is_empty() {
        println!("{} {}", "Summary:".dimmed(), trace.summary);
    }
    println!("{}", format!("{} steps", trace.steps.len()).bold());
    for step in &trace.steps {
        let line = step
            .line
            .map(|l| format!("line {l}"))
            .unwrap_or_else(|| "line ?".to_string());
        println!(
            "  {:>3}. {} {}  {}",
            step.step,
            format!("[{line}]").cyan(),
            step.operation.yellow(),
            step.explanation
        );
        if !step.outputs.is_empty() {
            println!("       {} {}", "output:".dimmed(), step.outputs.green());
        }
    }
}

fn print_issues(report: &ErrorReport) {
    if report.issues.is_empty() {
        println!("{}", "No issues found".green().bold());
    }
    for issue in &report.issues {
        let kind = match issue.kind.as_str() {
            "syntax" | "runtime" => issue.kind.red(),
            "logic" => issue.kind.yellow(),
            _ => issue.kind.cyan(),
        };
        println!(
            "{} {} {}",
            format!("line {:>3}", issue.line).dimmed(),
            format!("[{kind}]"),
            issue.title.bold()
        );
        if !issue.explanation.is_empty() {
            println!("          {}", issue.explanation);
        }
        if !issue.suggestion.is_empty() {
            println!("          {} {}", "fix:".green(), issue.suggestion);
        }
    }
    if !report.corrected_code.is_empty() {
        println!("\n{}", "Corrected code:".bold());
        println!("{}", report.corrected_code);
    }
}

fn print_complexity(report: &ComplexityReport) {
    for function in &report.functions {
        println!(
            "{}  time {}  space {}",
            function.name.bold(),
            function.time_complexity.yellow(),
            function.space_complexity.cyan()
        );
        if !function.notes.is_empty() {
            println!("  {}", function.notes.dimmed());
        }
        for l in &function.loops {
            println!("  loop {}: {} {}", l.location, l.complexity.yellow(), l.explanation);
        }
        for r in &function.recursions {
            println!("  recursion {}: {} = {}", r.location, r.recurrence, r.solution.yellow());
        }
    }
}

fn print_record(record: &AnalysisRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }
    match record {
        AnalysisRecord::Trace(trace) => print_trace(trace),
        AnalysisRecord::ErrorScan(report) => print_issues(report),
        AnalysisRecord::Complexity(report) => print_complexity(report),
    }
    Ok(())
}

fn draw(trace: &NormalizedTrace, source: &str, view: &ViewState) {
    print!("\x1B[2J\x1B[H");
    if !trace.summary.is_empty() {
        println!("{}\n", trace.summary.bold());
    }
    for line in render_frame(&frame(trace, source, view)).lines() {
        if line.starts_with('>') {
            println!("{}", line.on_blue().white());
        } else if line.starts_with("Step ") {
            println!("{}", line.green());
        } else {
            println!("{line}");
        }
    }
    println!(
        "\n{}",
        "[n]ext  [p]rev  [space/enter] play/pause  [r]eset  [q]uit".dimmed()
    );
    let _ = std::io::stdout().flush();
}

async fn step_loop(session: &mut Session, interval: Duration) -> Result<()> {
    let (Some(trace), Some(request)) = (session.trace().cloned(), session.request().cloned())
    else {
        bail!("No trace to step through");
    };
    if trace.steps.is_empty() {
        println!("{}", "The model returned no steps".yellow());
        return Ok(());
    }

    let stdin = std::io::stdin();
    let mut input = String::new();
    loop {
        let Some(view) = session.view() else {
            return Ok(());
        };
        draw(&trace, request.source_code(), &view);

        input.clear();
        if stdin.lock().read_line(&mut input)? == 0 {
            return Ok(());
        }
        match input.trim_end_matches(['\r', '\n']) {
            "n" => session.update_view(ViewState::next),
            "p" => session.update_view(ViewState::prev),
            "r" => session.update_view(ViewState::reset),
            "q" => return Ok(()),
            "" | " " => {
                // Play one pass through the trace, then pause
                session.update_view(|v| v.toggle_play(Instant::now()));
                let start = view.cursor();
                loop {
                    tokio::time::sleep(interval).await;
                    session.update_view(|v| v.tick(Instant::now(), interval));
                    let Some(view) = session.view() else {
                        return Ok(());
                    };
                    draw(&trace, request.source_code(), &view);
                    if view.cursor() == start {
                        session.update_view(|v| v.toggle_play(Instant::now()));
                        break;
                    }
                }
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let level = match cli.verbose {
        0 => Level::from(config.log_level),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Analyze {
            file,
            language,
            task,
            json,
        } => {
            let (source, language) = read_source(&file, language)?;
            let analyzer = build_analyzer(config)?;
            eprintln!(
                "{} {} ({}, {})",
                "Analyzing".bold(),
                file.display(),
                language,
                task
            );
            let record = analyzer
                .run(&AnalysisRequest::new(source, language, task))
                .await?;
            print_record(&record, json)?;
        }
        Command::Step { file, language } => {
            let (source, language) = read_source(&file, language)?;
            let interval = Duration::from_millis(config.server.autoplay_interval_ms);
            let analyzer = build_analyzer(config)?;

            let mut session = Session::new();
            let request = AnalysisRequest::new(source, language, TaskKind::Trace);
            let ticket = session.begin(request.clone());
            eprintln!("{}", "Tracing...".dimmed());
            let result = analyzer.run(&request).await;
            match session.finish(ticket, result) {
                Outcome::Applied => step_loop(&mut session, interval).await?,
                Outcome::Failed(message) => bail!(message),
                Outcome::Discarded => {}
            }
        }
        Command::Normalize {
            reply_file,
            task,
            language,
        } => {
            let raw = std::fs::read_to_string(&reply_file)
                .with_context(|| format!("Failed to read file: {}", reply_file.display()))?;
            let normalizer = Normalizer::new(config.limits.max_steps);
            let parsed = normalizer.parse(&raw)?;
            eprintln!("{} {:?}", "Parse stage:".dimmed(), parsed.stage);
            let record = normalizer.normalize(task, &raw, &language)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}
