use std::{
    fs,
    io::{self, Read},
};

use clap::{Parser, Subcommand, ValueEnum};

use quill::compile::Pipeline;
use quill::compile::ir::optimize::{OptimizerConfig, Pass};
use quill::compile::report::Phase;
use quill::infra::{ExitCode, QuillError};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Print a progress line per finished phase to stderr
    #[arg(long, global = true)]
    verbose: bool,

    /// Maximum nesting of function calls before the program is stopped
    #[arg(long, global = true, default_value_t = quill::interp::DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interpret a program
    Run {
        /// Source file, or `-` for standard input
        src: String,
    },
    /// Show the report of every compiler phase
    Phases {
        src: String,

        /// Only show this phase
        #[arg(long, value_enum)]
        phase: Option<PhaseArg>,

        /// Skip an optimization pass (repeatable)
        #[arg(long, value_enum)]
        disable: Vec<PassArg>,

        /// Generate code even when semantic analysis reports errors
        #[arg(long)]
        keep_going: bool,
    },
    /// Fold constants and prune literal branches, then print the source
    Simplify { src: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PhaseArg {
    Lexical,
    Syntax,
    Semantic,
    Ir,
    Optimization,
    Codegen,
}

impl From<PhaseArg> for Phase {
    fn from(value: PhaseArg) -> Self {
        match value {
            PhaseArg::Lexical => Phase::Lexical,
            PhaseArg::Syntax => Phase::Syntax,
            PhaseArg::Semantic => Phase::Semantic,
            PhaseArg::Ir => Phase::Ir,
            PhaseArg::Optimization => Phase::Optimization,
            PhaseArg::Codegen => Phase::Codegen,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PassArg {
    ConstantFolding,
    CopyPropagation,
    CommonSubexpression,
    LoopInvariant,
    DeadCode,
}

impl From<PassArg> for Pass {
    fn from(value: PassArg) -> Self {
        match value {
            PassArg::ConstantFolding => Pass::ConstantFolding,
            PassArg::CopyPropagation => Pass::CopyPropagation,
            PassArg::CommonSubexpression => Pass::CommonSubexpression,
            PassArg::LoopInvariant => Pass::LoopInvariant,
            PassArg::DeadCode => Pass::DeadCode,
        }
    }
}

fn read_source(path: &str) -> Result<String, QuillError> {
    if path == "-" {
        let mut src = String::new();
        io::stdin().read_to_string(&mut src)?;
        return Ok(src);
    }

    Ok(fs::read_to_string(path)?)
}

fn execute(args: Args) -> Result<(), QuillError> {
    let mut pipeline = Pipeline::new();
    pipeline.max_call_depth(args.max_call_depth);

    match args.command {
        Command::Run { src } => {
            let src = read_source(&src)?;
            let execution = pipeline.run(&src);

            print!("{}", execution.output);
            if args.verbose {
                for diagnostic in execution.diagnostics() {
                    eprintln!("[quill] recovered: {diagnostic}");
                }
            }

            match execution.result {
                Ok(_) => Ok(()),
                Err(QuillError::SyntaxError(err)) => {
                    eprint!("{}", err.report(&src));
                    Err(err.into())
                }
                Err(QuillError::RuntimeError(err)) => {
                    eprint!("{}", err.report(&src));
                    Err(err.into())
                }
                Err(err) => Err(err),
            }
        }
        Command::Phases {
            src,
            phase,
            disable,
            keep_going,
        } => {
            let src = read_source(&src)?;

            let mut config = OptimizerConfig::default();
            for pass in disable {
                config.disable(pass.into());
            }

            let report = pipeline
                .optimizations(config)
                .stop_on_semantic_errors(!keep_going)
                .analyze_phases(&src);

            if args.verbose {
                for phase in Phase::ALL {
                    match report.summary(phase) {
                        Some(summary) => eprintln!("[quill] {phase} done: {summary}"),
                        None => eprintln!("[quill] {phase}: not completed"),
                    }
                }
            }

            match phase {
                Some(phase) => println!("{}", report.section(phase.into())),
                None => print!("{report}"),
            }

            match report.error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
        Command::Simplify { src } => {
            let src = read_source(&src)?;

            match pipeline.simplify(&src) {
                Ok(simplified) => {
                    print!("{simplified}");
                    Ok(())
                }
                Err(err) => {
                    eprint!("{}", err.report(&src));
                    Err(err.into())
                }
            }
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let verbose = args.verbose;

    let Err(err) = execute(args) else {
        return ExitCode::SUCCESS;
    };

    // syntax and runtime errors were already shown with their source snippet
    match &err {
        QuillError::IOError(_) | QuillError::FmtError(_) => eprintln!("{err}"),
        _ if verbose => eprintln!("[quill] {err}"),
        _ => {}
    }

    err.into()
}
