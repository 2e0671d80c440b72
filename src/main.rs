use std::process;

use structopt::StructOpt;

mod authors;
mod commands;
mod cvs;
mod export;
mod git;
mod progress;
mod scanner;

use commands::{clone::Clone, fetch::Fetch, init::Init, pull::Pull};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "git-cvs-import",
    about = "incrementally import a local CVS repository into Git"
)]
struct Opt {
    #[structopt(
        short,
        long,
        global = true,
        parse(from_occurrences),
        help = "increase logging verbosity (-v, -vv)"
    )]
    verbose: u8,

    #[structopt(short, long, global = true, help = "only report warnings and errors")]
    quiet: bool,

    #[structopt(subcommand)]
    command: Command,
}

/// The command registry. Each subcommand is a struct carrying its own
/// options; summary and usage metadata live in the structopt attributes.
#[derive(Debug, StructOpt)]
enum Command {
    #[structopt(about = "initialise a Git repository that tracks a CVS repository")]
    Init(Init),

    #[structopt(about = "clone a CVS repository or module into a new Git repository")]
    Clone(Clone),

    #[structopt(about = "import new CVS changes onto the tracking ref")]
    Fetch(Fetch),

    #[structopt(about = "import new CVS changes and fast-forward the current branch")]
    Pull(Pull),
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    let spec = if opt.quiet {
        "warn"
    } else {
        match opt.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    // The handle has to stay alive for the duration of the program, or
    // logging stops.
    let _logger = match flexi_logger::Logger::try_with_env_or_str(spec)
        .and_then(|logger| logger.start())
    {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("cannot initialise logging: {}", e);
            None
        }
    };

    let result = match opt.command {
        Command::Init(command) => command.run().await,
        Command::Clone(command) => command.run().await,
        Command::Fetch(command) => command.run().await,
        Command::Pull(command) => command.run().await,
    };

    // Commands report their exit code; termination caused by signal N uses
    // the POSIX convention of 128 + N.
    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            log::error!("{:#}", e);
            process::exit(1);
        }
    }
}
