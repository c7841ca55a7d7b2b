//! Process interrupts that cancel outstanding requests
//!
//! A listener task waits for Ctrl-C or SIGTERM and publishes which one
//! arrived. Callers holding a receiver react by cancelling their requests;
//! the requests themselves then settle with `Cancelled`.

use std::fmt;

use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Which interrupt stopped the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    CtrlC,
    Terminate,
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::CtrlC => write!(f, "Ctrl-C"),
            Interrupt::Terminate => write!(f, "SIGTERM"),
        }
    }
}

pub struct InterruptListener {
    interrupts: broadcast::Sender<Interrupt>,
}

impl InterruptListener {
    pub fn new(interrupts: broadcast::Sender<Interrupt>) -> Self {
        Self { interrupts }
    }

    /// Start listening; the task publishes the first interrupt and exits
    ///
    /// If one source cannot be installed only the other is watched.
    pub fn spawn(&self) -> JoinHandle<()> {
        let interrupts = self.interrupts.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    warn!("Ctrl-C will not cancel requests: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        warn!("SIGTERM will not cancel requests: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            let interrupt = tokio::select! {
                _ = ctrl_c => Interrupt::CtrlC,
                _ = terminate => Interrupt::Terminate,
            };

            info!("{} received, cancelling outstanding requests", interrupt);
            let _ = interrupts.send(interrupt);
        })
    }
}

pub fn interrupt_channel() -> (broadcast::Sender<Interrupt>, broadcast::Receiver<Interrupt>) {
    broadcast::channel(1)
}

/// Next published interrupt, or `None` once no listener can publish one
pub async fn next_interrupt(mut interrupts: broadcast::Receiver<Interrupt>) -> Option<Interrupt> {
    loop {
        match interrupts.recv().await {
            Ok(interrupt) => return Some(interrupt),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
