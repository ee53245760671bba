use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand};
use ecmachine::evaluator;
use ecmachine::machine::{make_machine, ControllerEntry, Machine, MachineConfig, Operand, Statistics};
use ecmachine::syntax::SyntaxTree;
use ecmachine::value::{Pointer, Value};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "ecm", version, about = "Register-machine simulator and explicit-control evaluator")]
struct Cli {
    /// More log output: -v for debug, -vv for trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Pairs per semi-space of the pair heap
    #[arg(long, global = true)]
    heap_capacity: Option<usize>,

    /// Log every executed instruction (needs -vv to show)
    #[arg(long, global = true)]
    trace: bool,

    /// JSON file with machine settings; flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a syntax tree given as JSON and print the value
    Eval {
        tree: PathBuf,
        /// Print the result and statistics as JSON
        #[arg(long)]
        json: bool,
        /// Print machine statistics to stderr
        #[arg(long)]
        stats: bool,
    },
    /// Run a controller program given as JSON
    Machine {
        controller: PathBuf,
        /// Seed a register before the run, e.g. --reg a=206
        #[arg(long = "reg", value_name = "NAME=VALUE")]
        registers: Vec<String>,
        /// Register to print after the run (default: all)
        #[arg(long = "print", value_name = "NAME")]
        print: Vec<String>,
        /// Print machine statistics to stderr
        #[arg(long)]
        stats: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    if let Err(e) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("warning: logger not installed: {}", e);
    }

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::Eval { tree, json, stats } => eval(&tree, &config, json, stats),
        Command::Machine { controller, registers, print, stats } => {
            machine(&controller, &config, &registers, &print, stats)
        }
    }
}

fn load_config(cli: &Cli) -> CliResult<MachineConfig> {
    let mut config = match &cli.config {
        Some(path) => serde_json::from_str(&read(path)?)
            .map_err(|e| format!("{}: {}", path.display(), e))?,
        None => MachineConfig::default(),
    };
    if let Some(capacity) = cli.heap_capacity {
        config.heap_capacity = capacity;
    }
    config.trace |= cli.trace;
    Ok(config)
}

fn read(path: &Path) -> CliResult<String> {
    std::fs::read_to_string(path).map_err(|e| format!("reading {}: {}", path.display(), e).into())
}

fn print_stats(stats: &Statistics) {
    eprintln!("instructions:    {}", stats.instructions);
    eprintln!("stack pushes:    {}", stats.stack_pushes);
    eprintln!("max stack depth: {}", stats.max_stack_depth);
    eprintln!("pairs allocated: {}", stats.gc.pairs_allocated);
    eprintln!("collections:     {}", stats.gc.collections);
    eprintln!("pairs copied:    {}", stats.gc.pairs_copied);
}

fn eval(path: &Path, config: &MachineConfig, json: bool, stats: bool) -> CliResult<()> {
    let tree = SyntaxTree::from_json_str(&read(path)?)?;
    let mut machine = evaluator::make_evaluator_machine(config)?;
    let value = evaluator::run(&mut machine, &tree)?;

    if json {
        let out = serde_json::json!({
            "value": value.to_json(),
            "display": evaluator::describe(&machine, &value),
            "stats": machine.statistics(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", evaluator::describe(&machine, &value));
    }
    if stats {
        print_stats(&machine.statistics());
    }
    Ok(())
}

/// Registers named anywhere in the program, in order of first mention.
fn controller_registers(controller: &[ControllerEntry]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for entry in controller {
        if let ControllerEntry::Instruction(instruction) = entry {
            for operand in &instruction.operands {
                if let Operand::Reg(name) = operand {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }
    }
    names
}

/// `name=value`, where the value is a JSON scalar; anything that does not
/// parse as JSON is taken as a string.
fn parse_assignment(text: &str) -> CliResult<(String, Pointer)> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", text))?;
    let json = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((name.to_string(), Pointer::wrap_json(&json)?))
}

fn machine(
    path: &Path,
    config: &MachineConfig,
    assignments: &[String],
    print: &[String],
    stats: bool,
) -> CliResult<()> {
    let controller: Vec<ControllerEntry> =
        serde_json::from_str(&read(path)?).map_err(|e| format!("{}: {}", path.display(), e))?;
    let seeds = assignments
        .iter()
        .map(|a| parse_assignment(a))
        .collect::<CliResult<Vec<_>>>()?;

    let mut names = controller_registers(&controller);
    for (name, _) in &seeds {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }

    let mut machine: Machine = make_machine(names.iter().map(String::as_str), [], &controller)?;
    machine.configure(config);
    for (name, value) in seeds {
        machine.set_register_contents(&name, value)?;
    }
    machine.start()?;

    let shown: Vec<String> = if print.is_empty() { names } else { print.to_vec() };
    for name in &shown {
        let contents = machine.get_register_contents(name)?;
        let text = match contents {
            Value::Ptr(p) => evaluator::describe(&machine, p),
            other => other.to_string(),
        };
        println!("{} = {}", name, text);
    }
    if stats {
        print_stats(&machine.statistics());
    }
    Ok(())
}
