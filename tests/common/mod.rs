#![allow(dead_code)]

use native_integration::transport::HostEnd;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    env,
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Env guard that restores previous env vars on drop.
pub struct EnvGuard {
    old: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn set(vars: &[(&str, String)]) -> Self {
        let mut old = HashMap::new();
        for (k, v) in vars {
            old.insert((*k).to_string(), env::var(k).ok());
            env::set_var(k, v);
        }
        Self { old }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (k, prev) in self.old.drain() {
            match prev {
                Some(v) => env::set_var(k, v),
                None => env::remove_var(k),
            }
        }
    }
}

/// Create a temp sandbox and point the profile env vars into it, so manifest lookups
/// never touch the real profile.
pub fn sandbox_env() -> (TempDir, EnvGuard) {
    let td = TempDir::new().expect("tempdir");
    let root = td.path().to_path_buf();

    let home = root.join("home");
    let appdata = root.join("appdata_roaming");
    let localappdata = root.join("appdata_local");
    let programdata = root.join("programdata");

    for dir in [&home, &appdata, &localappdata, &programdata] {
        std::fs::create_dir_all(dir).unwrap();
    }

    let guard = EnvGuard::set(&[
        ("HOME", home.to_string_lossy().to_string()),
        ("APPDATA", appdata.to_string_lossy().to_string()),
        ("LOCALAPPDATA", localappdata.to_string_lossy().to_string()),
        ("PROGRAMDATA", programdata.to_string_lossy().to_string()),
    ]);

    (td, guard)
}

/// What the fake host does with one request.
pub enum Reply {
    /// `result: ok` with these parameters.
    Ok(Option<Value>),
    /// Any result code.
    Result(&'static str, Option<Value>),
    /// Send the inner reply after a delay.
    After(Duration, Box<Reply>),
    /// Push a notification, then the inner reply.
    Notify(Value, Box<Reply>),
    /// Never answer.
    Silent,
    /// Drop this port.
    Hangup,
    /// Send the inner reply, then drop this port.
    Close(Box<Reply>),
}

pub fn handshake_ok() -> Reply {
    Reply::Ok(Some(json!({"apiVersion": "1", "isValidatedOnHost": true})))
}

/// Every request any port received, in arrival order.
#[derive(Clone, Default)]
pub struct HostLog {
    requests: Arc<Mutex<Vec<Value>>>,
}

impl HostLog {
    pub fn count(&self, ty: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r["type"] == ty)
            .count()
    }

    pub fn ids(&self, ty: &str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r["type"] == ty)
            .filter_map(|r| r["id"].as_str().map(str::to_string))
            .collect()
    }
}

fn deliver(host: &HostEnd, request: &Value, reply: Reply) {
    match reply {
        Reply::Ok(parameters) => {
            host.respond(request, "ok", parameters);
        }
        Reply::Result(code, parameters) => {
            host.respond(request, code, parameters);
        }
        Reply::Notify(message, then) => {
            host.send(message);
            deliver(host, request, *then);
        }
        Reply::After(..) | Reply::Silent | Reply::Hangup | Reply::Close(_) => {}
    }
}

/// Serve every port the connector opens with `handler`.
pub fn spawn_host<F>(mut hosts: mpsc::UnboundedReceiver<HostEnd>, handler: F) -> HostLog
where
    F: Fn(&Value) -> Reply + Send + Sync + 'static,
{
    let log = HostLog::default();
    let handler = Arc::new(handler);
    let served = log.clone();
    tokio::spawn(async move {
        while let Some(mut host) = hosts.recv().await {
            let handler = Arc::clone(&handler);
            let log = served.clone();
            tokio::spawn(async move {
                let (delayed_tx, mut delayed_rx) = mpsc::unbounded_channel::<(Value, Reply)>();
                loop {
                    tokio::select! {
                        request = host.recv() => {
                            let Some(request) = request else { break };
                            log.requests.lock().unwrap().push(request.clone());
                            match handler(&request) {
                                Reply::Hangup => break,
                                Reply::Close(then) => {
                                    deliver(&host, &request, *then);
                                    break;
                                }
                                Reply::After(delay, then) => {
                                    let tx = delayed_tx.clone();
                                    tokio::spawn(async move {
                                        tokio::time::sleep(delay).await;
                                        let _ = tx.send((request, *then));
                                    });
                                }
                                reply => deliver(&host, &request, reply),
                            }
                        }
                        Some((request, reply)) = delayed_rx.recv() => deliver(&host, &request, reply),
                    }
                }
            });
        }
    });
    log
}
