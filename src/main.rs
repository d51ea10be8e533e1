use argh::FromArgs;
use script_shell::Interpreter;
use script_shell::cancel::Cancel;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// A scriptable command shell.
struct Args {
    #[argh(option, short = 'c')]
    /// run one command line and exit with its level.
    command: Option<String>,

    #[argh(option)]
    /// cancel the command line after this many seconds.
    timeout: Option<u64>,

    #[argh(switch, short = 'v')]
    /// log at debug level unless RUST_LOG says otherwise.
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    let default_level = if args.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut sh = Interpreter::default();
    if let Some(secs) = args.timeout {
        sh.set_cancel(Cancel::with_timeout(Duration::from_secs(secs)));
    }

    match args.command {
        Some(line) => {
            let code = sh.execute_line(&line)?;
            std::process::exit(code);
        }
        None => sh.repl(),
    }
}
