//! Local registry proxy lifecycle
//!
//! The proxy's boot time depends on the machine, so readiness is taken from
//! its own log output: the supervisor blocks until a [`ReadinessProbe`]
//! accepts a line. After that a relay task keeps forwarding the proxy's
//! output to the reporter until the proxy is stopped.

use super::message::MessageSource;
use super::process::{ManagedProcess, OutputLine, ProcessEvent, ProcessExit, ProcessSpec};
use super::reporter::SharedReporter;
use super::relay_output;
use crate::config::schema::RegistryConfig;
use crate::error::{CachepackError, CachepackResult};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound on waiting for relayed output after the proxy is killed
const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Decides whether an output line means the proxy is ready to serve
pub trait ReadinessProbe: Send + Sync {
    fn is_ready(&self, line: &OutputLine) -> bool;
}

impl<F> ReadinessProbe for F
where
    F: Fn(&OutputLine) -> bool + Send + Sync,
{
    fn is_ready(&self, line: &OutputLine) -> bool {
        self(line)
    }
}

/// Ready once any output line contains a fixed substring
#[derive(Debug, Clone)]
pub struct MarkerProbe {
    marker: String,
}

impl MarkerProbe {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl ReadinessProbe for MarkerProbe {
    fn is_ready(&self, line: &OutputLine) -> bool {
        line.text.contains(&self.marker)
    }
}

/// Boots the registry proxy and waits for it to become ready
pub struct RegistrySupervisor {
    spec: ProcessSpec,
    probe: Box<dyn ReadinessProbe>,
    boot_timeout: Option<Duration>,
}

impl RegistrySupervisor {
    pub fn new(spec: ProcessSpec, probe: Box<dyn ReadinessProbe>) -> Self {
        Self {
            spec,
            probe,
            boot_timeout: None,
        }
    }

    /// Build a supervisor that runs `<program> <args..> --config <config_path>`
    pub fn from_config(config: &RegistryConfig) -> Self {
        let spec = ProcessSpec::new(&config.program)
            .args(config.args.iter().cloned())
            .arg("--config")
            .arg(config.config_path.display().to_string());

        let boot_timeout =
            (config.boot_timeout_secs > 0).then(|| Duration::from_secs(config.boot_timeout_secs));

        Self::new(spec, Box::new(MarkerProbe::new(&config.ready_marker)))
            .with_boot_timeout(boot_timeout)
    }

    /// Fail the boot if the proxy is not ready within `timeout`
    pub fn with_boot_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.boot_timeout = timeout;
        self
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// Start the proxy and wait until it reports readiness.
    ///
    /// If the proxy exits (or the boot timeout expires) first, the process
    /// tree is killed and a boot error is returned.
    pub async fn start(&self, reporter: &SharedReporter) -> CachepackResult<RegistryHandle> {
        let mut process =
            ManagedProcess::spawn(&self.spec).map_err(|e| CachepackError::RegistryBoot {
                reason: describe(&e),
            })?;

        let outcome = match self.boot_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.wait_ready(&mut process, reporter)).await {
                    Ok(result) => result,
                    Err(_) => Err(CachepackError::RegistryBootTimeout { timeout: limit }),
                }
            }
            None => self.wait_ready(&mut process, reporter).await,
        };

        if let Err(e) = outcome {
            warn!("Registry boot failed: {}", e);
            if let Err(kill_err) = process.kill_tree().await {
                warn!("Could not kill failed registry: {}", kill_err);
            }
            return Err(e);
        }

        info!("Registry ready (pid {:?})", process.pid());

        let relay = process.take_output().map(|mut rx| {
            let reporter = reporter.clone();
            tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    relay_output(reporter.as_ref(), MessageSource::Registry, &line);
                }
            })
        });

        Ok(RegistryHandle { process, relay })
    }

    async fn wait_ready(
        &self,
        process: &mut ManagedProcess,
        reporter: &SharedReporter,
    ) -> CachepackResult<()> {
        while let Some(event) = process.next_event().await? {
            match event {
                ProcessEvent::Output(line) => {
                    relay_output(reporter.as_ref(), MessageSource::Registry, &line);
                    if self.probe.is_ready(&line) {
                        return Ok(());
                    }
                }
                ProcessEvent::Exited(exit) => {
                    return Err(CachepackError::RegistryBoot {
                        reason: format!(
                            "`{}` exited with {} before reporting readiness",
                            process.command(),
                            exit
                        ),
                    });
                }
            }
        }

        Err(CachepackError::RegistryBoot {
            reason: format!("`{}` stopped producing events", process.command()),
        })
    }
}

/// A running, ready registry proxy.
///
/// Dropping the handle kills the process tree; [`stop`](Self::stop) does the
/// same but also waits for the exit and drains the remaining output.
pub struct RegistryHandle {
    process: ManagedProcess,
    relay: Option<JoinHandle<()>>,
}

impl RegistryHandle {
    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.process.state(), super::process::ProcessState::Running)
    }

    /// Kill the proxy's process tree and wait for the OS to confirm the exit.
    ///
    /// Calling this again returns the same exit.
    pub async fn stop(&mut self) -> CachepackResult<ProcessExit> {
        let exit = self.process.kill_tree().await?;
        debug!("Registry stopped with {}", exit);

        if let Some(mut relay) = self.relay.take() {
            if tokio::time::timeout(RELAY_DRAIN_TIMEOUT, &mut relay)
                .await
                .is_err()
            {
                warn!("Registry output still open after kill, dropping the rest");
                relay.abort();
            }
        }

        Ok(exit)
    }
}

impl Drop for RegistryHandle {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }
    }
}

fn describe(err: &CachepackError) -> String {
    match std::error::Error::source(err) {
        Some(source) => format!("{}: {}", err, source),
        None => err.to_string(),
    }
}
