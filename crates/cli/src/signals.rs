//! Interrupt handling for a running sync.

use std::sync::atomic::Ordering;

use tracing::{info, warn};

use compsync_core::remote::{cancel_flag, CancelFlag};

use crate::prompt;

/// What a received signal does to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    /// Raise the cancel flag and let the run wind down.
    Cancel,
    /// Leave immediately with the interrupted exit code.
    Exit,
}

/// Create a cancel flag and register OS signal handlers.
///
/// The first SIGTERM or SIGINT (Ctrl+C) raises the flag; the blocking run
/// polls it between and during transfers. A second signal, or one arriving
/// while the operator is being asked a question, exits the process with
/// code 130 since a blocked terminal read never sees the flag.
pub fn setup_signal_handlers() -> CancelFlag {
    let flag = cancel_flag();
    tokio::spawn(listen(flag.clone()));
    flag
}

fn decide(flag: &CancelFlag, prompt_open: bool) -> SignalAction {
    let already_cancelled = flag.swap(true, Ordering::SeqCst);
    if already_cancelled || prompt_open {
        SignalAction::Exit
    } else {
        SignalAction::Cancel
    }
}

fn on_signal(flag: &CancelFlag, name: &str) {
    match decide(flag, prompt::is_open()) {
        SignalAction::Cancel => {
            info!(signal = name, "cancelling run, repeat to exit immediately");
        }
        SignalAction::Exit => {
            warn!(signal = name, "interrupted, exiting");
            std::process::exit(i32::from(crate::EXIT_CANCELLED));
        }
    }
}

#[cfg(unix)]
async fn listen(flag: CancelFlag) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) =
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "failed to register signal handlers, using Ctrl+C only");
                return listen_ctrl_c(flag).await;
            }
        };

    loop {
        let name = tokio::select! {
            Some(()) = sigint.recv() => "SIGINT",
            Some(()) = sigterm.recv() => "SIGTERM",
            else => return,
        };
        on_signal(&flag, name);
    }
}

#[cfg(not(unix))]
async fn listen(flag: CancelFlag) {
    listen_ctrl_c(flag).await
}

async fn listen_ctrl_c(flag: CancelFlag) {
    while tokio::signal::ctrl_c().await.is_ok() {
        on_signal(&flag, "Ctrl+C");
    }
}
