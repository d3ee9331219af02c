//! Child-process connector: launches the native host and speaks framed JSON over its
//! stdin/stdout, the way a browser services `connectNative`.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use super::{BoxFuture, Connector, Port};
use crate::discovery::{locate_manifest, validate_host_name, Browser, Scope};
use crate::error::{HostError, Result};
use crate::framing::{read_message, write_message, MAX_FROM_HOST};

/// How to find the host executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostLauncher {
    /// Resolve through the host manifest a browser would use.
    Manifest { browser: Browser, scope: Scope },
    /// Run this program directly.
    Program(PathBuf),
}

/// Connector that runs the host as a child process.
#[derive(Debug, Clone)]
pub struct ProcessConnector {
    launcher: HostLauncher,
    args: Vec<String>,
}

impl ProcessConnector {
    pub fn from_manifest(browser: Browser, scope: Scope) -> Self {
        Self {
            launcher: HostLauncher::Manifest { browser, scope },
            args: Vec::new(),
        }
    }

    pub fn program(path: impl Into<PathBuf>) -> Self {
        Self {
            launcher: HostLauncher::Program(path.into()),
            args: Vec::new(),
        }
    }

    /// Extra argument for the host, e.g. the calling extension's origin.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn launcher(&self) -> &HostLauncher {
        &self.launcher
    }

    fn resolve(&self, host_name: &str) -> Result<PathBuf> {
        match &self.launcher {
            HostLauncher::Manifest { browser, scope } => {
                let (manifest_path, manifest) = locate_manifest(host_name, *browser, *scope)?;
                manifest.executable(&manifest_path)
            }
            HostLauncher::Program(path) => Ok(path.clone()),
        }
    }

    fn spawn(&self, host_name: &str) -> Result<Port> {
        validate_host_name(host_name)?;
        let program = self.resolve(host_name)?;
        let connect_err = |reason: String| HostError::Connect {
            host_name: host_name.to_string(),
            reason,
        };

        let mut child = Command::new(&program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| connect_err(format!("failed to start {}: {e}", program.display())))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| connect_err("host stdin unavailable".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| connect_err("host stdout unavailable".to_string()))?;
        tracing::info!(host = host_name, program = %program.display(), pid = ?child.id(), "native host started");

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<serde_json::Value>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = write_message(&mut stdin, &message).await {
                    tracing::warn!("native host write failed: {e}");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            loop {
                match read_message(&mut stdout, MAX_FROM_HOST).await {
                    Ok(Some(message)) => {
                        if inbound_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("native host closed stdout");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("native host read failed: {e}");
                        break;
                    }
                }
            }
        });

        // Either an explicit close or the port being dropped stops the child.
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => tracing::debug!(?status, "native host exited"),
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        tracing::debug!("native host kill failed: {e}");
                    }
                }
            }
        });

        Ok(Port::new(outbound, inbound).on_close(move || {
            let _ = kill_tx.send(());
        }))
    }
}

impl Connector for ProcessConnector {
    fn open<'a>(&'a self, host_name: &'a str) -> BoxFuture<'a, Result<Port>> {
        Box::pin(async move { self.spawn(host_name) })
    }
}
