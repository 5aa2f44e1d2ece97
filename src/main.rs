use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;
use zharness::aggregator::Aggregator;
use zharness::config::{load_config, Cli, Commands, ListArgs, OutputFormat, RunArgs};
use zharness::discovery::{discover, DiscoveryResult};
use zharness::junit::JunitReporter;
use zharness::reporter::{HumanReporter, JsonReporter, MultiReporter, Reporter};
use zharness::runner::{RunEnv, Runner};
use zharness::{logging, signals};

/// Exit code when ZFiles reference tests that cannot be run
const EXIT_DISCOVERY: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<u8> {
    match &cli.command {
        None | Some(Commands::Report) => report(cli),
        Some(Commands::List(args)) => list(args),
        Some(Commands::Run(args)) => run_tests(cli, args),
    }
}

fn build_reporter(cli: &Cli) -> Box<dyn Reporter> {
    let primary: Box<dyn Reporter> = match cli.format {
        OutputFormat::Human => Box::new(HumanReporter::stdout()),
        OutputFormat::Json => Box::new(JsonReporter::stdout()),
    };
    match &cli.junit_xml {
        Some(path) => Box::new(MultiReporter::new(vec![
            primary,
            Box::new(JunitReporter::new(path.clone())),
        ])),
        None => primary,
    }
}

/// Aggregate stdin.
fn report(cli: &Cli) -> Result<u8> {
    let aggregator = Aggregator::with_reporter(build_reporter(cli));
    let report = aggregator
        .scan(io::stdin().lock())
        .context("reading Z stream from stdin")?;
    Ok(exit_code(report.exit_code()))
}

fn discover_entries(args: &ListArgs) -> Result<DiscoveryResult> {
    let result = discover(&args.root, &args.filter())
        .with_context(|| format!("discovering tests under {}", args.root.display()))?;
    for issue in &result.issues {
        tracing::error!("{}", issue);
    }
    Ok(result)
}

fn list(args: &ListArgs) -> Result<u8> {
    let result = discover_entries(args)?;

    let mut out = io::stdout().lock();
    for entry in &result.entries {
        writeln!(out, "{}", entry)?;
    }
    out.flush()?;

    Ok(if result.is_clean() { 0 } else { EXIT_DISCOVERY })
}

fn run_tests(cli: &Cli, args: &RunArgs) -> Result<u8> {
    let config = load_config(&cli.config)?;
    signals::install_signal_handlers().context("installing signal handlers")?;

    let result = discover_entries(&args.list)?;
    tracing::info!("running {} test(s)", result.test_count());

    let env = RunEnv {
        modes: args.mode.clone(),
        tag_skip: args.list.tag_skip.clone(),
    };
    let runner = Runner::new(&config, env).echo(args.echo);

    let mut aggregator = Aggregator::with_reporter(build_reporter(cli));
    let stats = runner.run(&result.entries, &mut aggregator)?;
    let report = aggregator.finish();

    let code = if !result.is_clean() {
        EXIT_DISCOVERY
    } else if stats.has_runner_failures() {
        1
    } else {
        exit_code(report.exit_code())
    };
    Ok(code)
}

fn exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
