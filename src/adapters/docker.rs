//! Container runtime driven through the `docker` (or `podman`) CLI.

use crate::config::RuntimeConfig;
use crate::domain::model::Network;
use crate::domain::ports::{
    ContainerFile, ContainerHandle, ContainerRuntime, ContainerSpec, ReadinessSignal,
};
use crate::utils::error::{Result, StackError};
use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::Instant;

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(500);
const PROBE_READ_TIMEOUT: Duration = Duration::from_millis(250);
const LOG_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct DockerRuntime {
    binary: String,
    host: String,
    readiness_timeout: Duration,
    stop_timeout: Duration,
}

impl DockerRuntime {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            host: config.host.clone(),
            readiness_timeout: config.readiness_timeout(),
            stop_timeout: config.stop_timeout(),
        }
    }

    /// Run one CLI command and return its trimmed stdout.
    async fn run(&self, args: &[String]) -> Result<String> {
        let command = format!("{} {}", self.binary, args.join(" "));
        tracing::debug!("Running {}", command);

        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StackError::RuntimeError {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(StackError::RuntimeError {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// stdout and stderr of the container, interleaved by stream.
    async fn logs(&self, container: &ContainerHandle) -> Result<String> {
        let args = args(["logs", container.id.as_str()]);
        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| StackError::RuntimeError {
                command: format!("{} logs {}", self.binary, container.id),
                message: e.to_string(),
            })?;

        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    async fn is_running(&self, container: &ContainerHandle) -> Result<bool> {
        let state = self
            .run(&args([
                "inspect",
                "--format",
                "{{.State.Running}}",
                container.id.as_str(),
            ]))
            .await?;
        Ok(state == "true")
    }

    async fn copy_file(&self, container_id: &str, file: &ContainerFile) -> Result<()> {
        let mut staged = tempfile::NamedTempFile::new()?;
        staged.write_all(&file.contents)?;
        staged.flush()?;
        set_mode(staged.path(), file.mode)?;

        let source = staged.path().to_string_lossy().into_owned();
        let target = format!("{}:{}", container_id, file.container_path);
        self.run(&args(["cp", source.as_str(), target.as_str()])).await?;
        Ok(())
    }

    /// Files and start, after `create` succeeded.
    async fn provision(&self, id: &str, spec: &ContainerSpec) -> Result<()> {
        for file in &spec.files {
            self.copy_file(id, file).await?;
        }
        self.run(&args(["start", id])).await?;
        Ok(())
    }

    async fn signal_observed(
        &self,
        container: &ContainerHandle,
        signal: &ReadinessSignal,
    ) -> Result<bool> {
        match signal {
            ReadinessSignal::LogLine(line) => Ok(self.logs(container).await?.contains(line.as_str())),
            ReadinessSignal::ListeningPort(port) => {
                let host_port = self.mapped_port(container, *port).await?;
                Ok(port_accepts(&self.host, host_port).await)
            }
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_network(&self) -> Result<Network> {
        let name = unique_name("otelstack-network");
        let id = self.run(&args(["network", "create", name.as_str()])).await?;
        Ok(Network::new(id, name))
    }

    async fn remove_network(&self, network: &Network) -> Result<()> {
        self.run(&args(["network", "rm", network.name.as_str()])).await?;
        tracing::info!("Removed network {}", network.name);
        Ok(())
    }

    async fn start_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        let name = unique_name(&spec.name_prefix);
        let id = self.run(&create_args(&name, spec)).await?;

        if let Err(e) = self.provision(&id, spec).await {
            if let Err(cleanup) = self.run(&args(["rm", "-f", "-v", id.as_str()])).await {
                tracing::warn!("Could not remove half-started {}: {}", name, cleanup);
            }
            return Err(e);
        }

        Ok(ContainerHandle { id, name })
    }

    async fn wait_ready(&self, container: &ContainerHandle, signal: &ReadinessSignal) -> Result<()> {
        let deadline = Instant::now() + self.readiness_timeout;

        loop {
            if !self.is_running(container).await? {
                let logs = self.logs(container).await.unwrap_or_default();
                return Err(StackError::RuntimeError {
                    command: format!("wait for {}", container.name),
                    message: format!("container exited before becoming ready:\n{}", tail(&logs)),
                });
            }

            if self.signal_observed(container, signal).await? {
                tracing::debug!("{} observed {:?}", container.name, signal);
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(StackError::RuntimeError {
                    command: format!("wait for {}", container.name),
                    message: format!(
                        "{:?} not observed within {:?}",
                        signal, self.readiness_timeout
                    ),
                });
            }

            tokio::time::sleep(READINESS_POLL_INTERVAL).await;
        }
    }

    async fn mapped_port(&self, container: &ContainerHandle, port: u16) -> Result<u16> {
        let output = self
            .run(&args(["port", container.id.as_str(), format!("{}/tcp", port).as_str()]))
            .await?;
        parse_port_output(&output).ok_or_else(|| StackError::RuntimeError {
            command: format!("{} port {} {}/tcp", self.binary, container.id, port),
            message: format!("unexpected output {:?}", output),
        })
    }

    async fn remove_container(&self, container: &ContainerHandle) -> Result<()> {
        let timeout = self.stop_timeout.as_secs().to_string();
        if let Err(e) = self.run(&args(["stop", "-t", timeout.as_str(), container.id.as_str()])).await {
            tracing::debug!("Stop of {} failed, forcing removal: {}", container.name, e);
        }
        self.run(&args(["rm", "-f", "-v", container.id.as_str()])).await?;
        tracing::info!("Removed container {}", container.name);
        Ok(())
    }

    fn host(&self) -> &str {
        &self.host
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn unique_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &id[..8])
}

fn create_args(name: &str, spec: &ContainerSpec) -> Vec<String> {
    let mut args = args(["create", "--name", name, "--network", spec.network.as_str()]);

    for port in &spec.exposed_ports {
        args.push("-p".into());
        args.push(port.to_string());
    }

    for (key, value) in &spec.env {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }

    args.push(spec.image.clone());
    args
}

/// First host port in `docker port` output such as `0.0.0.0:49153\n[::]:49153`.
fn parse_port_output(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit(':').next())
        .find_map(|port| port.parse().ok())
}

/// The userland proxy accepts connections before the container listens and
/// then closes them at once; an open connection that stays silent means
/// something is listening.
async fn port_accepts(host: &str, port: u16) -> bool {
    let mut stream = match TcpStream::connect((host, port)).await {
        Ok(stream) => stream,
        Err(_) => return false,
    };

    let mut buf = [0u8; 1];
    match tokio::time::timeout(PROBE_READ_TIMEOUT, stream.read(&mut buf)).await {
        Err(_) => true,
        Ok(Ok(n)) => n > 0,
        Ok(Err(_)) => false,
    }
}

fn tail(logs: &str) -> String {
    let lines: Vec<&str> = logs.lines().collect();
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(unix)]
fn set_mode(path: &std::path::Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &std::path::Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name_prefix: "otelstack-seq".to_string(),
            image: "datalust/seq:2024.3".to_string(),
            network: "otelstack-network-1a2b3c4d".to_string(),
            exposed_ports: vec![80, 5341],
            env: vec![("ACCEPT_EULA".to_string(), "Y".to_string())],
            files: Vec::new(),
        }
    }

    #[test]
    fn test_create_args() {
        let args = create_args("otelstack-seq-12345678", &spec());

        assert_eq!(
            args,
            vec![
                "create",
                "--name",
                "otelstack-seq-12345678",
                "--network",
                "otelstack-network-1a2b3c4d",
                "-p",
                "80",
                "-p",
                "5341",
                "-e",
                "ACCEPT_EULA=Y",
                "datalust/seq:2024.3",
            ]
        );
    }

    #[test]
    fn test_parse_port_output() {
        assert_eq!(parse_port_output("0.0.0.0:49153\n[::]:49153"), Some(49153));
        assert_eq!(parse_port_output("[::]:32768"), Some(32768));
        assert_eq!(parse_port_output(""), None);
        assert_eq!(parse_port_output("Error: no public port"), None);
    }

    #[test]
    fn test_unique_name_keeps_prefix() {
        let a = unique_name("otelstack-jaeger");
        let b = unique_name("otelstack-jaeger");

        assert!(a.starts_with("otelstack-jaeger-"));
        assert_eq!(a.len(), "otelstack-jaeger-".len() + 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        let logs: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let tail = tail(&logs);

        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[tokio::test]
    async fn test_port_accepts_silent_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(socket);
        });

        assert!(port_accepts("127.0.0.1", port).await);
        accept.abort();
    }

    #[tokio::test]
    async fn test_port_accepts_rejects_closed_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(!port_accepts("127.0.0.1", port).await);
    }
}
