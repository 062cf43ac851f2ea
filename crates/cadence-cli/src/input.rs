//! Terminal input shared by the REPL and command confirmation

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, mpsc, watch};

/// Lines from stdin, read by one background task.
///
/// Every consumer (the prompt loop, the command approver) takes lines from
/// the same channel, so a reader that is dropped mid-wait leaves the next
/// line in place for whoever asks after it.
#[derive(Clone)]
pub struct LineReader {
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl LineReader {
    /// Start reading stdin line by line until EOF
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        });
        Self::from_receiver(rx)
    }

    pub fn from_receiver(rx: mpsc::Receiver<String>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next line without its terminator, `None` at EOF
    pub async fn next_line(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}

/// Ctrl-C presses, caught by one listener that lives as long as the process
pub struct Interrupts {
    rx: watch::Receiver<u64>,
}

impl Interrupts {
    pub fn listen() -> Self {
        let (tx, rx) = watch::channel(0u64);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                tx.send_modify(|presses| *presses += 1);
            }
        });
        Self { rx }
    }

    /// Wait for the next press. Presses made while nobody was waiting are ignored.
    pub async fn next(&mut self) {
        self.rx.borrow_and_update();
        if self.rx.changed().await.is_err() {
            // Listener failed to install: never fires
            std::future::pending::<()>().await;
        }
    }
}
