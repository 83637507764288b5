use std::process::ExitStatus;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vmpilot::cli::Cli;
use vmpilot::completion::CompletionClient;
use vmpilot::console::{ConsoleChannel, ConsoleError};
use vmpilot::prompt::BpeCounter;
use vmpilot::session::{Outcome, PromptSettings, Session};
use vmpilot::telemetry::init_logging;
use vmpilot::vm::{spawn_qemu, LaunchError};

/// QEMU binds the serial console on the loopback interface
const CONSOLE_HOST: &str = "localhost";
/// How often QEMU is checked while the console is not up yet
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What ended the wait for the console
enum Startup {
    Connected(Result<ConsoleChannel, ConsoleError>),
    VmExited(std::io::Result<ExitStatus>),
    Interrupted,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    init_logging()?;

    // Ctrl-C only flips the token; the loop notices it and shuts down
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => interrupt.cancel(),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    let config = cli.into_config()?;
    let counter = BpeCounter::for_engine(config.engine)?;

    let mut vm = spawn_qemu(&config.vm)?;
    let port = vm.console_port;

    let startup = tokio::select! {
        biased;
        _ = cancel.cancelled() => Startup::Interrupted,
        exited = vm.wait_for_exit(EXIT_POLL_INTERVAL) => Startup::VmExited(exited),
        channel = ConsoleChannel::connect(CONSOLE_HOST, port, config.connect_policy) => {
            Startup::Connected(channel)
        }
    };
    let channel = match startup {
        Startup::Connected(channel) => channel?.with_idle_timeout(config.idle_timeout),
        Startup::VmExited(exited) => {
            let status = exited?;
            return Err(LaunchError::EarlyExit {
                code: status.code(),
            }
            .into());
        }
        Startup::Interrupted => {
            info!("Interrupted before the console came up");
            vm.shutdown().await;
            return Ok(());
        }
    };

    let completer = CompletionClient::from_config(&config);
    let mut session = Session::new(
        channel,
        completer,
        counter,
        PromptSettings::from(&config),
        std::io::stdout(),
    )
    .with_vm(vm);

    match session.run(&cancel).await {
        Ok(Outcome::Interrupted) => {
            session.shutdown().await?;
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Session failed");
            session.teardown().await;
            Err(e.into())
        }
    }
}
