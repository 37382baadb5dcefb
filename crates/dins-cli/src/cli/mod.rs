mod commands;

use clap::Parser;
use dins_core::ReductionError;

pub fn run_from_env() -> i32 {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();
    match run(args) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{err}");
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(name = "dins-rs", about = "Iterative neutron Compton profile reduction")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Run the iterative time-of-flight reduction
    Reduce(commands::ReduceArgs),
}

fn dispatch(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Reduce(args) => commands::run_reduce_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Io(String),
    #[error(transparent)]
    Reduction(#[from] ReductionError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    /// 0 success, 2 usage/configuration, 3 I/O, 4 computation.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_)
            | Self::Reduction(ReductionError::Config(_) | ReductionError::Table(_)) => 2,
            Self::Io(_) => 3,
            Self::Reduction(_) | Self::Internal(_) => 4,
        }
    }
}
