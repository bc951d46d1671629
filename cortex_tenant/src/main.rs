use cortex_tenant_clap_blocks::{
    logging::{LogDestination, LogFormat, LoggingConfig},
    tokio::TokioIoConfig,
};
use dotenvy::dotenv;
use tracing_subscriber::{EnvFilter, fmt::writer::BoxMakeWriter};

mod commands {
    pub(crate) mod serve;
}

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "cortex-tenant",
    version,
    about = "Prometheus remote-write proxy that splits writes by tenant",
    long_about = r#"Prometheus remote-write proxy that splits writes by tenant

Each series pushed to the proxy is assigned a tenant from one of its labels and forwarded to a
Cortex-compatible endpoint with the tenant in a header.

Examples:
    # Forward to a local Cortex, routing on the `__tenant__` label
    cortex-tenant serve --target http://127.0.0.1:9009/api/v1/push

    # Route on the `org` label and strip it before forwarding
    cortex-tenant serve --target http://cortex/api/v1/push --tenant-label org --tenant-label-remove

    # Run with debug logging
    cortex-tenant serve -vv --target http://127.0.0.1:9009/api/v1/push
"#
)]
struct Config {
    #[clap(flatten)]
    runtime_config: TokioIoConfig,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
enum Command {
    /// Run the proxy
    Serve(commands::serve::Config),
}

fn main() -> Result<(), std::io::Error> {
    load_dotenv();

    let config: Config = clap::Parser::parse();

    let tokio_runtime = config.runtime_config.builder().build()?;

    tokio_runtime.block_on(async move {
        match config.command {
            None => println!("command required, -h/--help for help"),
            Some(Command::Serve(config)) => {
                if let Err(e) = init_logs(&config.logging_config) {
                    eprintln!("Initializing logs failed: {e}");
                    std::process::exit(ReturnCode::Failure as _);
                }
                if let Err(e) = commands::serve::command(config).await {
                    eprintln!("Serve command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
        }
    });

    Ok(())
}

/// Source the .env file before initialising the Config struct - this sets
/// any envs in the file, which the Config struct then uses.
///
/// Precedence is given to existing env variables.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // Ignore this - a missing env file is not an error, defaults will
            // be applied when initialising the Config struct.
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(ReturnCode::Failure as _);
        }
    };
}

fn init_logs(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_new(config.filter_directive())?;

    let writer = match config.log_destination {
        LogDestination::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogDestination::Stderr => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);

    match config.log_format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}
