// src/executors/docker.rs
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, HostConfig, ResourcesUlimits};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    CreateImageOptions as BollardCreateImageOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    StatsOptions as BollardStatsOptionsQuery,
    StopContainerOptions as BollardStopContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::scratch::ScratchDir;
use super::{IsolationBackend, RawRunResult};
use crate::core_types::{ExecutionEnvironment, ExecutionLanguage, ResourceLimits};
use crate::errors::BackendError;

const CONTAINER_WORK_DIR: &str = "/workspace";
const CPU_PERIOD_US: i64 = 100_000;
// nobody:nogroup, so code never runs as the container's root user.
const SANDBOX_USER: &str = "65534:65534";

/// Translates a host path into the form the container engine expects for a
/// volume bind. Returning `None` means the hook cannot translate this path.
pub type PathTranslator = dyn Fn(&Path) -> Option<String> + Send + Sync;

/// Container-based isolation backend built on the Docker Engine API.
pub struct DockerBackend {
    docker: Docker,
    path_translator: Option<Arc<PathTranslator>>,
}

impl DockerBackend {
    pub fn new() -> Result<Self, BackendError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self {
            docker,
            path_translator: None,
        })
    }

    /// Install a host-path translation hook (e.g. for cross-OS volume
    /// mounts). Invoked before every bind spec is built.
    pub fn with_path_translator(mut self, translator: Arc<PathTranslator>) -> Self {
        self.path_translator = Some(translator);
        self
    }

    fn host_bind_path(&self, path: &Path) -> String {
        if let Some(translate) = &self.path_translator {
            if let Some(translated) = translate(path) {
                return translated;
            }
            log::warn!(
                "Path translation declined for {}; falling back to the untranslated path",
                path.display()
            );
        }
        path.to_string_lossy().into_owned()
    }

    fn container_spec(
        &self,
        env: &ExecutionEnvironment,
        limits: &ResourceLimits,
        scratch: &ScratchDir,
    ) -> ContainerCreateBody {
        let script_in_container = format!("{}/{}", CONTAINER_WORK_DIR, scratch.script_name());
        let mut cmd: Vec<String> = env
            .language
            .interpreter()
            .iter()
            .map(|s| s.to_string())
            .collect();
        cmd.push(script_in_container);

        let env_strings: Vec<String> = env
            .env_vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let mut tmpfs = HashMap::new();
        tmpfs.insert(
            "/tmp".to_string(),
            format!("rw,noexec,size={}m", limits.max_disk_mb),
        );

        let host_config = HostConfig {
            binds: Some(vec![format!(
                "{}:{}",
                self.host_bind_path(scratch.path()),
                CONTAINER_WORK_DIR
            )]),
            auto_remove: Some(true),
            memory: Some((limits.max_memory_mb * 1024 * 1024) as i64),
            // Swap equal to memory means no swap headroom: the container
            // OOMs instead of thrashing.
            memory_swap: Some((limits.max_memory_mb * 1024 * 1024) as i64),
            cpu_period: Some(CPU_PERIOD_US),
            cpu_quota: Some((limits.max_cpu_percent as i64 * CPU_PERIOD_US) / 100),
            pids_limit: Some(limits.max_processes as i64),
            ulimits: Some(vec![ResourcesUlimits {
                name: Some("nofile".to_string()),
                soft: Some(limits.max_file_descriptors as i64),
                hard: Some(limits.max_file_descriptors as i64),
            }]),
            tmpfs: Some(tmpfs),
            ..Default::default()
        };

        ContainerCreateBody {
            image: Some(env.image().to_string()),
            cmd: Some(cmd),
            working_dir: Some(CONTAINER_WORK_DIR.to_string()),
            user: Some(SANDBOX_USER.to_string()),
            env: Some(env_strings),
            network_disabled: Some(env.network_isolated),
            host_config: Some(host_config),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        }
    }

    /// Sample the stats stream while the container runs, tracking peak
    /// memory (bytes) and peak CPU percentage.
    fn spawn_stats_sampler(
        &self,
        container_id: &str,
        peak_memory: Arc<AtomicU64>,
        peak_cpu: Arc<Mutex<f64>>,
    ) -> tokio::task::JoinHandle<()> {
        let docker = self.docker.clone();
        let id = container_id.to_string();
        tokio::spawn(async move {
            let mut stream = docker.stats(
                &id,
                Some(BollardStatsOptionsQuery {
                    stream: true,
                    ..Default::default()
                }),
            );
            while let Some(Ok(stats)) = stream.next().await {
                if let Some(usage) = stats.memory_stats.as_ref().and_then(|m| m.usage) {
                    peak_memory.fetch_max(usage, Ordering::Relaxed);
                }
                if let Some(pct) = cpu_percent(&stats) {
                    let mut peak = peak_cpu.lock().unwrap();
                    if pct > *peak {
                        *peak = pct;
                    }
                }
            }
        })
    }

    async fn collect_logs(&self, container_id: &str) -> Result<(String, String), BackendError> {
        let mut output_stream = self.docker.logs(
            container_id,
            Some(BollardLogsOptionsQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(log_result) = output_stream.next().await {
            match log_result {
                Ok(LogOutput::StdOut { message }) => {
                    stdout.push_str(std::str::from_utf8(&message)?)
                }
                Ok(LogOutput::StdErr { message }) => {
                    stderr.push_str(std::str::from_utf8(&message)?)
                }
                Ok(_) => {}
                Err(e) => return Err(BackendError::Docker(e)),
            }
        }
        Ok((stdout, stderr))
    }

    async fn stop(&self, container_id: &str) {
        if let Err(e) = self
            .docker
            .stop_container(container_id, None::<BollardStopContainerOptionsQuery>)
            .await
        {
            log::debug!("Stopping container {} failed: {}", container_id, e);
        }
    }
}

#[async_trait]
impl IsolationBackend for DockerBackend {
    async fn run(
        &self,
        code: &str,
        env: &ExecutionEnvironment,
        limits: &ResourceLimits,
        cancel: CancellationToken,
    ) -> Result<RawRunResult, BackendError> {
        let scratch = ScratchDir::for_execution(env, code).await?;
        let config = self.container_spec(env, limits, &scratch);

        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(format!("runcell-{}", Uuid::new_v4())),
            ..Default::default()
        });

        let started = Instant::now();
        let container = self.docker.create_container(options, config).await?;
        self.docker
            .start_container(&container.id, None::<BollardStartContainerOptionsQuery>)
            .await?;

        let peak_memory = Arc::new(AtomicU64::new(0));
        let peak_cpu = Arc::new(Mutex::new(0.0_f64));
        let sampler =
            self.spawn_stats_sampler(&container.id, peak_memory.clone(), peak_cpu.clone());

        let mut wait_stream = self
            .docker
            .wait_container(&container.id, None::<BollardWaitContainerOptionsQuery>);
        let deadline = tokio::time::sleep(limits.timeout());
        tokio::pin!(deadline);

        let wait_outcome = tokio::select! {
            res = wait_stream.next() => res,
            _ = &mut deadline => {
                log::warn!("Execution timed out for container {}", container.id);
                sampler.abort();
                self.stop(&container.id).await;
                return Err(BackendError::Timeout);
            }
            _ = cancel.cancelled() => {
                log::info!("Execution cancelled for container {}", container.id);
                sampler.abort();
                self.stop(&container.id).await;
                return Err(BackendError::Cancelled);
            }
        };
        sampler.abort();

        let exit_code = match wait_outcome {
            Some(Ok(response)) => response.status_code,
            // A non-zero exit surfaces as a wait error carrying the code.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(BackendError::Docker(e)),
            None => {
                return Err(BackendError::Unavailable(
                    "container wait stream ended unexpectedly".to_string(),
                ))
            }
        };

        let (stdout, stderr) = self.collect_logs(&container.id).await?;
        let (files_created, files_modified) = scratch.changed_files();
        let cpu_usage_percent = *peak_cpu.lock().unwrap();

        Ok(RawRunResult {
            stdout,
            stderr,
            exit_code,
            duration: started.elapsed(),
            memory_peak_mb: peak_memory.load(Ordering::Relaxed) as f64 / (1024.0 * 1024.0),
            cpu_usage_percent,
            files_created,
            files_modified,
        })
    }

    async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    async fn install_dependencies(
        &self,
        language: ExecutionLanguage,
        packages: &[String],
    ) -> Result<(), BackendError> {
        if packages.is_empty() {
            return Ok(());
        }
        let mut cmd: Vec<String> = match language {
            ExecutionLanguage::Python => vec!["pip".to_string(), "install".to_string()],
            ExecutionLanguage::NodeJs | ExecutionLanguage::JavaScript => {
                vec!["npm".to_string(), "install".to_string(), "-g".to_string()]
            }
            ExecutionLanguage::TypeScript | ExecutionLanguage::Bash => {
                return Err(BackendError::Unsupported(format!(
                    "dependency installation is not defined for {}",
                    language.as_str()
                )))
            }
        };
        cmd.extend(packages.iter().cloned());

        let image = language.container_image();
        // Best-effort pull; a pre-provisioned image makes this a no-op.
        let mut pull = self.docker.create_image(
            Some(BollardCreateImageOptionsQuery {
                from_image: Some(image.to_string()),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(info) = pull.next().await {
            match info {
                Ok(info) => log::debug!("Pulling image: {:?}", info),
                Err(e) => log::debug!("Image pull for {} reported: {}", image, e),
            }
        }

        let config = ContainerCreateBody {
            image: Some(image.to_string()),
            cmd: Some(cmd),
            host_config: Some(HostConfig {
                auto_remove: Some(true),
                ..Default::default()
            }),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(format!("runcell-install-{}", Uuid::new_v4())),
            ..Default::default()
        });

        let container = self.docker.create_container(options, config).await?;
        self.docker
            .start_container(&container.id, None::<BollardStartContainerOptionsQuery>)
            .await?;

        let mut wait_stream = self
            .docker
            .wait_container(&container.id, None::<BollardWaitContainerOptionsQuery>);
        let status_code = match wait_stream.next().await {
            Some(Ok(response)) => response.status_code,
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(BackendError::Docker(e)),
            None => 0,
        };

        if status_code != 0 {
            let (_, stderr) = self.collect_logs(&container.id).await.unwrap_or_default();
            return Err(BackendError::Unavailable(format!(
                "dependency installation exited with {}: {}",
                status_code, stderr
            )));
        }
        log::info!(
            "Installed {} package(s) for {}",
            packages.len(),
            language.as_str()
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "docker"
    }
}

fn cpu_percent(stats: &bollard::models::ContainerStatsResponse) -> Option<f64> {
    let cpu = stats.cpu_stats.as_ref()?;
    let pre = stats.precpu_stats.as_ref()?;
    let total = cpu.cpu_usage.as_ref()?.total_usage?;
    let pre_total = pre.cpu_usage.as_ref()?.total_usage?;
    let system = cpu.system_cpu_usage?;
    let pre_system = pre.system_cpu_usage?;
    let cpu_delta = total.checked_sub(pre_total)? as f64;
    let system_delta = system.checked_sub(pre_system)? as f64;
    if system_delta <= 0.0 {
        return None;
    }
    let online = cpu.online_cpus.unwrap_or(1) as f64;
    Some(cpu_delta / system_delta * online * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::ExecutionLanguage;

    #[tokio::test]
    async fn container_spec_encodes_limits() {
        let backend = match DockerBackend::new() {
            Ok(b) => b,
            // No daemon socket on this host; nothing to assert against.
            Err(_) => return,
        };
        let env = ExecutionEnvironment::new(ExecutionLanguage::Python);
        let limits = ResourceLimits::default();
        let scratch = ScratchDir::for_execution(&env, "print('hi')").await.unwrap();
        let spec = backend.container_spec(&env, &limits, &scratch);

        assert_eq!(spec.image.as_deref(), Some("python:3.11-slim"));
        assert_eq!(spec.network_disabled, Some(true));
        assert_eq!(spec.user.as_deref(), Some(SANDBOX_USER));
        let host = spec.host_config.unwrap();
        assert_eq!(host.memory, Some(512 * 1024 * 1024));
        assert_eq!(host.memory, host.memory_swap);
        assert_eq!(host.cpu_quota, Some(50_000));
        assert_eq!(host.pids_limit, Some(10));
        assert_eq!(host.auto_remove, Some(true));
    }

    #[tokio::test]
    async fn smoke_python_hello() {
        let backend = match DockerBackend::new() {
            Ok(b) => b,
            Err(_) => return,
        };
        if !backend.is_available().await {
            return;
        }
        let env = ExecutionEnvironment::new(ExecutionLanguage::Python);
        let limits = ResourceLimits::default();
        let result = backend
            .run("print('hi')", &env, &limits, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hi"));
    }
}
