// Copyright (c) The Diem Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Supervision of a single validator process.

use crate::{
    config::NodeConfig,
    local::output::{shared_sink, ColorPicker, PrefixedWriter, SharedSink},
};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    io,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::{oneshot, watch},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;

const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// A node process. Starts out not started, is started at most once and eventually exits.
#[async_trait]
pub trait NodeProcess: Send + Sync {
    /// Spawns the process. Must be called from within a tokio runtime.
    fn start(&mut self) -> Result<()>;

    /// Waits for the process to exit. An unsuccessful exit status is an error.
    async fn wait(&self) -> Result<()>;

    /// Kills the process and waits for it to go away. Succeeds if it already exited.
    async fn stop(&self) -> Result<()>;
}

/// Creates the process for a node given its config and the full set of command line flags.
pub trait NodeProcessCreator: Send + Sync {
    fn new_node_process(&self, config: &NodeConfig, flags: &[String])
        -> Result<Box<dyn NodeProcess>>;
}

/// The implementation-specific part of a [`NodeConfig`] for nodes run as local processes.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalNodeConfig {
    /// Path to the validator binary
    pub binary_path: PathBuf,
    /// Tag the node's stdout with its name and forward it to the network's stdout sink
    #[serde(default)]
    pub redirect_stdout: bool,
    #[serde(default)]
    pub redirect_stderr: bool,
}

impl LocalNodeConfig {
    pub fn new<P: Into<PathBuf>>(binary_path: P) -> Self {
        Self {
            binary_path: binary_path.into(),
            ..Default::default()
        }
    }

    pub fn from_node_config(config: &NodeConfig) -> Result<Self> {
        let value = config
            .impl_specific_config
            .clone()
            .ok_or_else(|| anyhow!("node {} lacks an implementation-specific config", config.name))?;
        serde_json::from_value(value).with_context(|| {
            format!(
                "implementation-specific config of node {} is not a local node config",
                config.name
            )
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "binaryPath": self.binary_path,
            "redirectStdout": self.redirect_stdout,
            "redirectStderr": self.redirect_stderr,
        })
    }
}

/// Spawns node processes on the local host. Output of nodes asking for redirection goes to the
/// shared sinks, each node tagged in the next color of the palette.
pub struct LocalNodeProcessCreator {
    stdout: SharedSink,
    stderr: SharedSink,
    color_picker: Mutex<ColorPicker>,
}

impl LocalNodeProcessCreator {
    pub fn new(stdout: SharedSink, stderr: SharedSink) -> Self {
        Self {
            stdout,
            stderr,
            color_picker: Mutex::new(ColorPicker::new()),
        }
    }
}

impl Default for LocalNodeProcessCreator {
    fn default() -> Self {
        Self::new(shared_sink(io::stdout()), shared_sink(io::stderr()))
    }
}

impl NodeProcessCreator for LocalNodeProcessCreator {
    fn new_node_process(
        &self,
        config: &NodeConfig,
        flags: &[String],
    ) -> Result<Box<dyn NodeProcess>> {
        let local_config = LocalNodeConfig::from_node_config(config)?;
        let color = self.color_picker.lock().next_color();

        let mut command = Command::new(&local_config.binary_path);
        command.args(flags).stdin(Stdio::null()).kill_on_drop(true);

        let stdout = if local_config.redirect_stdout {
            command.stdout(Stdio::piped());
            Some(PrefixedWriter::new(&config.name, color, self.stdout.clone())?)
        } else {
            command.stdout(Stdio::null());
            None
        };
        let stderr = if local_config.redirect_stderr {
            command.stderr(Stdio::piped());
            Some(PrefixedWriter::new(&config.name, color, self.stderr.clone())?)
        } else {
            command.stderr(Stdio::null());
            None
        };

        Ok(Box::new(LocalNodeProcess {
            name: config.name.clone(),
            binary_path: local_config.binary_path,
            command: Some(command),
            stdout,
            stderr,
            kill: Mutex::new(None),
            exit: None,
        }))
    }
}

#[derive(Clone, Debug)]
enum ProcessExit {
    Exited(ExitStatus),
    Killed,
    Failed(String),
}

pub struct LocalNodeProcess {
    name: String,
    binary_path: PathBuf,
    // Taken on start
    command: Option<Command>,
    stdout: Option<PrefixedWriter>,
    stderr: Option<PrefixedWriter>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
    exit: Option<watch::Receiver<Option<ProcessExit>>>,
}

impl LocalNodeProcess {
    async fn exit(&self) -> Result<ProcessExit> {
        let mut exit = self
            .exit
            .clone()
            .ok_or_else(|| anyhow!("node {} was never started", self.name))?;
        loop {
            let current = exit.borrow().clone();
            if let Some(outcome) = current {
                return Ok(outcome);
            }
            exit.changed()
                .await
                .map_err(|_| anyhow!("lost track of node {} process", self.name))?;
        }
    }
}

#[async_trait]
impl NodeProcess for LocalNodeProcess {
    fn start(&mut self) -> Result<()> {
        let mut command = self
            .command
            .take()
            .ok_or_else(|| anyhow!("node {} already started", self.name))?;
        let mut child = command.spawn().with_context(|| {
            format!(
                "Error launching node process with binary: {:?}",
                self.binary_path
            )
        })?;
        info!(
            "Started node {} (pid {:?}) from {:?}",
            self.name,
            child.id(),
            self.binary_path
        );

        let close_output = CancellationToken::new();
        let mut forwarders = Vec::with_capacity(2);
        if let (Some(stream), Some(writer)) = (child.stdout.take(), self.stdout.take()) {
            forwarders.push(spawn_forwarder(stream, writer, close_output.clone()));
        }
        if let (Some(stream), Some(writer)) = (child.stderr.take(), self.stderr.take()) {
            forwarders.push(spawn_forwarder(stream, writer, close_output.clone()));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(supervise(
            self.name.clone(),
            child,
            kill_rx,
            Output {
                forwarders,
                close: close_output,
            },
            exit_tx,
        ));
        *self.kill.lock() = Some(kill_tx);
        self.exit = Some(exit_rx);
        Ok(())
    }

    async fn wait(&self) -> Result<()> {
        match self.exit().await? {
            ProcessExit::Exited(status) if status.success() => Ok(()),
            ProcessExit::Exited(status) => bail!("node {} exited with {}", self.name, status),
            ProcessExit::Killed => Ok(()),
            ProcessExit::Failed(e) => bail!("failed waiting on node {}: {}", self.name, e),
        }
    }

    async fn stop(&self) -> Result<()> {
        if self.exit.is_none() {
            return Ok(());
        }
        if let Some(kill) = self.kill.lock().take() {
            // Fails if the process already exited, which is fine.
            let _ = kill.send(());
        }
        match self.exit().await? {
            ProcessExit::Failed(e) => bail!("failed stopping node {}: {}", self.name, e),
            _ => Ok(()),
        }
    }
}

/// The tasks forwarding a child's output, and the token making them give up on it
struct Output {
    forwarders: Vec<JoinHandle<()>>,
    close: CancellationToken,
}

/// Owns the child until it exits, killing it when asked to (or when the process handle goes
/// away), then publishes how it exited.
///
/// After a natural exit all output is forwarded before the exit is published, unless a kill
/// request arrives meanwhile. After a kill, or such a late request, the forwarders get
/// `OUTPUT_DRAIN_GRACE` to finish: the child's pipes may be held open by processes it spawned.
async fn supervise(
    name: String,
    mut child: Child,
    mut kill: oneshot::Receiver<()>,
    output: Output,
    exit: watch::Sender<Option<ProcessExit>>,
) {
    let (outcome, killed) = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => (ProcessExit::Exited(status), false),
            Err(e) => (ProcessExit::Failed(e.to_string()), false),
        },
        _ = &mut kill => {
            debug!("Killing node {}", name);
            if let Err(e) = child.start_kill() {
                warn!("Failed to signal node {}: {}", name, e);
            }
            match child.wait().await {
                Ok(_) => (ProcessExit::Killed, true),
                Err(e) => (ProcessExit::Failed(e.to_string()), true),
            }
        }
    };

    let mut drain = Box::pin(join_all(output.forwarders));
    let drained = !killed
        && tokio::select! {
            _ = &mut drain => true,
            _ = &mut kill => false,
        };
    if !drained && timeout(OUTPUT_DRAIN_GRACE, &mut drain).await.is_err() {
        warn!("Output of node {} still open after exit, dropping it", name);
        output.close.cancel();
        drain.await;
    }

    info!("Node {} process exited: {:?}", name, outcome);
    let _ = exit.send(Some(outcome));
}

fn spawn_forwarder<R>(
    stream: R,
    writer: PrefixedWriter,
    close: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = tokio::select! {
                read = reader.read_until(b'\n', &mut line) => read,
                _ = close.cancelled() => break,
            };
            match read {
                Ok(0) => break,
                Ok(_) => {
                    if let Err(e) = writer.write_line(&line) {
                        warn!("Failed to forward node output: {}", e);
                    }
                }
                Err(e) => {
                    warn!("Failed to read node output: {}", e);
                    break;
                }
            }
        }
    })
}
