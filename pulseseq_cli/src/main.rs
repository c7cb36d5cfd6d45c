use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail};
use pulseseq_core::config::ProcConfig;
use tracing::Level;

mod scenario;
mod tester;

use scenario::{Scenario, read_program};

/// Run programs on a model of the pulse-sequencing processor
#[derive(Parser, Debug)]
#[command(version, about)]
struct Arguments {
    /// Log more (-v info, -vv debug, -vvv every control state)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Run(RunArgs),
    Test(TestArgs),
    Disasm(DisasmArgs),
    /// Print an example expected-state file
    Example,
}

/// Run a scenario and print the strobes and final core states as JSON
#[derive(Args, Debug)]
#[command(about)]
struct RunArgs {
    scenario: PathBuf,

    /// Maximum number of clock cycles to simulate, overriding the scenario
    #[arg(short, long)]
    max_cycles: Option<u64>,
}

/// Run a scenario and compare the final core states against an expectation.
/// Mismatching values are written next to the expectation as `<name>_diff.json`.
#[derive(Args, Debug)]
#[command(about)]
struct TestArgs {
    scenario: PathBuf,
    expected: PathBuf,

    /// Maximum number of clock cycles to simulate, overriding the scenario
    #[arg(short, long)]
    max_cycles: Option<u64>,
}

/// Decode every word of a hex program
#[derive(Args, Debug)]
#[command(about)]
struct DisasmArgs {
    program: PathBuf,

    /// JSON processor configuration giving the field widths
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Arguments::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Run(run_args) => run(run_args),
        Command::Test(test_args) => test(test_args),
        Command::Disasm(disasm_args) => disasm(disasm_args),
        Command::Example => {
            println!("{}", tester::EXAMPLE_JSON.trim());
            Ok(())
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let report = scenario.run(args.max_cycles)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).wrap_err("Couldn't serialize run report")?
    );
    Ok(())
}

fn test(args: TestArgs) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let expected = tester::read_expected(&args.expected)?;
    let report = scenario.run(args.max_cycles)?;

    let diff = tester::compare(&expected, &report.cores);
    tester::write_diff(&args.expected, diff.as_ref())?;
    match diff {
        None => {
            println!("Passed after {} cycles", report.cycles);
            Ok(())
        }
        Some(diff) => {
            let failed: Vec<usize> = diff
                .cores
                .iter()
                .enumerate()
                .filter(|(_, core)| !core.is_empty())
                .map(|(index, _)| index)
                .collect();
            bail!("Cores {failed:?} differ from {}", args.expected.display())
        }
    }
}

fn disasm(args: DisasmArgs) -> Result<()> {
    let config: ProcConfig = match &args.config {
        Some(path) => {
            let file = std::fs::File::open(path)
                .wrap_err_with(|| format!("Failed to open config {}", path.display()))?;
            serde_json::from_reader(file).wrap_err("Failed to parse processor configuration")?
        }
        None => ProcConfig::default(),
    };
    let layout = config.layout().wrap_err("Invalid processor configuration")?;
    let program = read_program(&args.program, &layout)?;

    let digits = layout.widths.instr.div_ceil(4) as usize;
    for (addr, instr) in program.iter().enumerate() {
        println!(
            "{addr:4}: {:0digits$x}  {}",
            instr.raw(),
            instr.decode(&layout)
        );
    }
    Ok(())
}
