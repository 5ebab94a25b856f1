//! Container-backed services.
//!
//! The [`ContainerRuntime`] trait abstracts the Docker API so production code
//! uses [`BollardRuntime`] while tests use an in-memory runtime.
//!
//! ```text
//! ContainerService --> ContainerRuntime (trait)
//!                          |        |
//!                       Bollard    Mock
//!                          |
//!                    Docker daemon
//! ```
//!
//! Containers are addressed by name (`gantry-<scenario>-<service>`), so a
//! container whose creation half-failed can still be removed on stop.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use gantry_core::process::ProcessRunner;
use gantry_core::scenario::PortMapping;
use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::readiness::{Probe, check_command, check_tcp};
use crate::service::{DependencyService, Readiness, ServiceState};

/// Docker container names: `[a-zA-Z0-9][a-zA-Z0-9_.-]*`, at most 128 chars.
pub fn validate_container_name(name: &str) -> Result<(), ServiceError> {
    if name.is_empty() || name.len() > 128 {
        return Err(ServiceError::DockerApi(format!(
            "invalid container name: length {} (must be 1-128)",
            name.len()
        )));
    }
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err(ServiceError::DockerApi(format!(
            "invalid container name '{name}': must match [a-zA-Z0-9][a-zA-Z0-9_.-]*"
        )));
    }
    Ok(())
}

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRequest {
    pub name: String,
    pub image: String,
    pub ports: Vec<PortMapping>,
    pub env: BTreeMap<String, String>,
}

/// Observed container state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub running: bool,
    /// `None` when the image defines no healthcheck.
    pub healthy: Option<bool>,
}

/// Docker operations used by [`ContainerService`].
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Pull `image` unless it is already present locally.
    fn ensure_image(&self, image: &str) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Create and start a container; returns its id.
    fn run_container(
        &self,
        request: &ContainerRequest,
    ) -> impl Future<Output = Result<String, ServiceError>> + Send;

    /// Inspect a container by id or name.
    fn status(&self, id: &str) -> impl Future<Output = Result<ContainerStatus, ServiceError>> + Send;

    /// Stop with a grace period, then force-remove with volumes.
    /// A container that does not exist is [`ServiceError::ContainerNotFound`].
    fn remove_container(
        &self,
        id: &str,
        grace_secs: u64,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

/// Production runtime over `bollard`.
pub struct BollardRuntime {
    docker: Arc<bollard::Docker>,
}

impl BollardRuntime {
    /// Connect using the platform's default socket (honours `DOCKER_HOST`).
    pub fn connect_local() -> Result<Self, ServiceError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            ServiceError::DockerConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    pub fn connect_with_socket(socket_path: &str) -> Result<Self, ServiceError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    ServiceError::DockerConnection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Socket from config, or the platform default.
    pub fn connect(socket_path: Option<&str>) -> Result<Self, ServiceError> {
        match socket_path {
            Some(path) => Self::connect_with_socket(path),
            None => Self::connect_local(),
        }
    }
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

impl ContainerRuntime for BollardRuntime {
    async fn ensure_image(&self, image: &str) -> Result<(), ServiceError> {
        use bollard::image::CreateImageOptions;

        match self.docker.inspect_image(image).await {
            Ok(_) => return Ok(()),
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(ServiceError::DockerApi(format!("inspect image failed: {e}"))),
        }

        info!(image, "pulling image");
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut progress = std::pin::pin!(self.docker.create_image(Some(options), None, None));
        while let Some(step) = progress.next().await {
            step.map_err(|e| ServiceError::DockerApi(format!("pull {image} failed: {e}")))?;
        }
        Ok(())
    }

    async fn run_container(&self, request: &ContainerRequest) -> Result<String, ServiceError> {
        use bollard::container::{Config, CreateContainerOptions, StartContainerOptions};
        use bollard::models::{HostConfig, PortBinding};

        validate_container_name(&request.name)?;

        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();
        for port in &request.ports {
            let key = format!("{}/tcp", port.container);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: Some("127.0.0.1".to_owned()),
                    host_port: Some(port.host.to_string()),
                }]),
            );
        }
        let env: Vec<String> = request.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let config = Config {
            image: Some(request.image.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: request.name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| ServiceError::DockerApi(format!("create container failed: {e}")))?;
        for warning in &created.warnings {
            warn!(container = %request.name, warning = warning.as_str(), "docker warning");
        }

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ServiceError::DockerApi(format!("start container failed: {e}")))?;
        Ok(created.id)
    }

    async fn status(&self, id: &str) -> Result<ContainerStatus, ServiceError> {
        use bollard::models::HealthStatusEnum;

        let details = self.docker.inspect_container(id, None).await.map_err(|e| {
            if is_not_found(&e) {
                ServiceError::ContainerNotFound(id.to_owned())
            } else {
                ServiceError::DockerApi(format!("inspect container failed: {e}"))
            }
        })?;

        let state = details.state.unwrap_or_default();
        let healthy = state
            .health
            .and_then(|h| h.status)
            .and_then(|status| match status {
                HealthStatusEnum::HEALTHY => Some(true),
                HealthStatusEnum::STARTING | HealthStatusEnum::UNHEALTHY => Some(false),
                HealthStatusEnum::NONE | HealthStatusEnum::EMPTY => None,
            });
        Ok(ContainerStatus {
            running: state.running.unwrap_or(false),
            healthy,
        })
    }

    async fn remove_container(&self, id: &str, grace_secs: u64) -> Result<(), ServiceError> {
        use bollard::container::{RemoveContainerOptions, StopContainerOptions};

        let grace = i64::try_from(grace_secs).unwrap_or(i64::MAX);
        if let Err(e) = self
            .docker
            .stop_container(id, Some(StopContainerOptions { t: grace }))
            .await
        {
            if is_not_found(&e) {
                return Err(ServiceError::ContainerNotFound(id.to_owned()));
            }
            // Already stopped is fine; removal below is forced anyway.
            debug!(container = id, error = %e, "stop before remove failed");
        }

        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    ServiceError::ContainerNotFound(id.to_owned())
                } else {
                    ServiceError::DockerApi(format!("remove container failed: {e}"))
                }
            })
    }
}

/// A service backed by one container.
pub struct ContainerService<D, R> {
    name: String,
    request: ContainerRequest,
    probe: Option<Probe>,
    runtime: Arc<D>,
    runner: Arc<R>,
    grace_secs: u64,
    container_id: Option<String>,
    state: ServiceState,
}

impl<D: ContainerRuntime, R: ProcessRunner> ContainerService<D, R> {
    /// `runner` executes command probes.
    pub fn new(
        name: impl Into<String>,
        request: ContainerRequest,
        runtime: Arc<D>,
        runner: Arc<R>,
    ) -> Self {
        Self {
            name: name.into(),
            request,
            probe: None,
            runtime,
            runner,
            grace_secs: 10,
            container_id: None,
            state: ServiceState::Created,
        }
    }

    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_stop_timeout(mut self, grace_secs: u64) -> Self {
        self.grace_secs = grace_secs;
        self
    }

    /// Id once started, else the container name.
    fn target(&self) -> &str {
        self.container_id.as_deref().unwrap_or(&self.request.name)
    }

    async fn check_container(&self) -> Readiness {
        match self.runtime.status(self.target()).await {
            Ok(ContainerStatus { running: false, .. }) => {
                Readiness::NotReady("container is not running".to_owned())
            }
            Ok(ContainerStatus {
                healthy: Some(false),
                ..
            }) => Readiness::NotReady("container is not healthy yet".to_owned()),
            Ok(_) => Readiness::Ready,
            Err(e) => Readiness::NotReady(e.to_string()),
        }
    }
}

impl<D: ContainerRuntime, R: ProcessRunner> DependencyService
    for ContainerService<D, R>
{
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ServiceState {
        self.state
    }

    async fn start(&mut self) -> Result<(), ServiceError> {
        info!(
            service = %self.name,
            image = %self.request.image,
            container = %self.request.name,
            "starting container"
        );
        let started = async {
            self.runtime.ensure_image(&self.request.image).await?;
            self.runtime.run_container(&self.request).await
        }
        .await;
        match started {
            Ok(id) => {
                debug!(service = %self.name, container_id = %id, "container started");
                self.container_id = Some(id);
                self.state = ServiceState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = ServiceState::Failed;
                Err(ServiceError::StartFailed {
                    service: self.name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn check_ready(&self) -> Readiness {
        match &self.probe {
            None => Readiness::Ready,
            Some(Probe::Container) => self.check_container().await,
            Some(Probe::Tcp(address)) => check_tcp(address).await,
            Some(Probe::Command(command)) => check_command(self.runner.as_ref(), command).await,
        }
    }

    async fn stop(&mut self) -> Result<(), ServiceError> {
        if self.state == ServiceState::Stopped {
            return Ok(());
        }
        info!(service = %self.name, container = self.target(), "removing container");
        let result = self.runtime.remove_container(self.target(), self.grace_secs).await;
        self.state = ServiceState::Stopped;
        match result {
            Ok(()) | Err(ServiceError::ContainerNotFound(_)) => Ok(()),
            Err(e) => Err(ServiceError::StopFailed {
                service: self.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;

    use super::*;

    /// In-memory runtime recording every call.
    #[derive(Default)]
    pub struct MockRuntime {
        pub calls: Mutex<Vec<String>>,
        pub containers: Mutex<HashMap<String, ContainerStatus>>,
        pub fail_run: bool,
        /// Health reported right after start.
        pub initial_health: Option<bool>,
    }

    impl MockRuntime {
        fn record(&self, call: String) {
            self.calls.lock().expect("lock").push(call);
        }
    }

    impl ContainerRuntime for MockRuntime {
        async fn ensure_image(&self, image: &str) -> Result<(), ServiceError> {
            self.record(format!("ensure_image {image}"));
            Ok(())
        }

        async fn run_container(&self, request: &ContainerRequest) -> Result<String, ServiceError> {
            validate_container_name(&request.name)?;
            self.record(format!("run {}", request.name));
            if self.fail_run {
                return Err(ServiceError::DockerApi("mock failure".to_owned()));
            }
            self.containers.lock().expect("lock").insert(
                request.name.clone(),
                ContainerStatus {
                    running: true,
                    healthy: self.initial_health,
                },
            );
            Ok(request.name.clone())
        }

        async fn status(&self, id: &str) -> Result<ContainerStatus, ServiceError> {
            self.containers
                .lock()
                .expect("lock")
                .get(id)
                .cloned()
                .ok_or_else(|| ServiceError::ContainerNotFound(id.to_owned()))
        }

        async fn remove_container(&self, id: &str, _grace_secs: u64) -> Result<(), ServiceError> {
            self.record(format!("remove {id}"));
            self.containers
                .lock()
                .expect("lock")
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| ServiceError::ContainerNotFound(id.to_owned()))
        }
    }
}
