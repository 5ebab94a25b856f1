//! Service provisioning.
//!
//! A [`ServiceProvider`] turns a scenario's [`ServiceSpec`] into a
//! not-yet-started [`DynService`]. Commands, probe arguments and container
//! environment are rendered with the run's [`Substitutions`], so
//! `{output_dir}` and `${VAR}` work there too.

use std::sync::Arc;

use gantry_core::config::ServiceConfig;
use gantry_core::process::{CommandSpec, ProcessRunner};
use gantry_core::scenario::{ProbeKind, ServiceKind, ServiceSpec};
use gantry_core::template::Substitutions;

use crate::command::CommandService;
use crate::container::{BollardRuntime, ContainerRequest, ContainerService};
use crate::error::ServiceError;
use crate::readiness::Probe;
use crate::service::DynService;

/// Builds dependency services for scenarios.
pub trait ServiceProvider: Send + Sync + 'static {
    fn provision(
        &self,
        scenario: &str,
        spec: &ServiceSpec,
        subs: &Substitutions<'_>,
    ) -> Result<Box<dyn DynService>, ServiceError>;
}

/// Command services through a [`ProcessRunner`], container services through Docker.
pub struct DefaultServiceProvider<R> {
    runner: Arc<R>,
    config: ServiceConfig,
}

impl<R: ProcessRunner> DefaultServiceProvider<R> {
    pub fn new(runner: Arc<R>, config: ServiceConfig) -> Self {
        Self { runner, config }
    }
}

/// Name of the container managed for `service` in `scenario`.
pub fn container_name(scenario: &str, service: &str) -> String {
    format!("gantry-{scenario}-{service}")
}

fn render_command(
    tokens: &[String],
    subs: &Substitutions<'_>,
) -> Result<CommandSpec, ServiceError> {
    Ok(CommandSpec::from_rendered(subs.render_all(tokens)?)?)
}

/// Render a scenario's probe, if any.
pub fn render_probe(
    spec: &ServiceSpec,
    subs: &Substitutions<'_>,
) -> Result<Option<Probe>, ServiceError> {
    let Some(readiness) = &spec.readiness else {
        return Ok(None);
    };
    let probe = match readiness.kind {
        ProbeKind::Command => Probe::Command(render_command(&readiness.command, subs)?),
        ProbeKind::Tcp => {
            let address = readiness
                .address
                .as_deref()
                .ok_or_else(|| ServiceError::InvalidSpec {
                    service: spec.name.clone(),
                    reason: "tcp probe needs an address".to_owned(),
                })?;
            Probe::Tcp(subs.render(address)?.value)
        }
        ProbeKind::Container => Probe::Container,
    };
    Ok(Some(probe))
}

impl<R: ProcessRunner> ServiceProvider for DefaultServiceProvider<R> {
    fn provision(
        &self,
        scenario: &str,
        spec: &ServiceSpec,
        subs: &Substitutions<'_>,
    ) -> Result<Box<dyn DynService>, ServiceError> {
        let probe = render_probe(spec, subs)?;
        let mut env = Vec::with_capacity(spec.env.len());
        for (key, value) in &spec.env {
            env.push((key.clone(), subs.render(value)?.value));
        }

        match spec.kind {
            ServiceKind::Command => {
                let start = render_command(&spec.start, subs)?.envs(env.clone());
                let stop = render_command(&spec.stop, subs)?.envs(env);
                let mut service =
                    CommandService::new(spec.name.clone(), start, stop, self.runner.clone())
                        .with_stop_timeout(self.config.stop_timeout_secs);
                if let Some(probe) = probe {
                    service = service.with_probe(probe)?;
                }
                Ok(Box::new(service))
            }
            ServiceKind::Container => {
                let image = spec.image.clone().ok_or_else(|| ServiceError::InvalidSpec {
                    service: spec.name.clone(),
                    reason: "container service needs an image".to_owned(),
                })?;
                let ports = spec
                    .port_mappings()
                    .map_err(|reason| ServiceError::InvalidSpec {
                        service: spec.name.clone(),
                        reason,
                    })?;
                let request = ContainerRequest {
                    name: container_name(scenario, &spec.name),
                    image,
                    ports,
                    env: env.into_iter().collect(),
                };
                let runtime = Arc::new(BollardRuntime::connect(
                    self.config.docker_socket.as_deref(),
                )?);
                let mut service =
                    ContainerService::new(spec.name.clone(), request, runtime, self.runner.clone())
                        .with_stop_timeout(self.config.stop_timeout_secs);
                if let Some(probe) = probe {
                    service = service.with_probe(probe);
                }
                Ok(Box::new(service))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use gantry_core::env::EnvSnapshot;
    use gantry_core::process::TokioProcessRunner;
    use gantry_core::scenario::ReadinessSpec;

    use super::*;
    use crate::service::ServiceState;

    fn command_spec() -> ServiceSpec {
        ServiceSpec {
            name: "opensearch".to_owned(),
            kind: ServiceKind::Command,
            start: vec![
                "scripts/opensearch/create.sh".to_owned(),
                "--password".to_owned(),
                "${OPENSEARCH_PASSWORD}".to_owned(),
            ],
            stop: vec!["docker".to_owned(), "compose".to_owned(), "down".to_owned()],
            image: None,
            ports: vec![],
            env: Default::default(),
            readiness: Some(ReadinessSpec {
                kind: ProbeKind::Tcp,
                command: vec![],
                address: Some("127.0.0.1:9200".to_owned()),
                attempts: None,
                interval_ms: None,
            }),
        }
    }

    #[test]
    fn container_names_are_namespaced_by_scenario() {
        assert_eq!(container_name("mongodb-dest", "mongo"), "gantry-mongodb-dest-mongo");
    }

    #[test]
    fn command_service_is_provisioned_with_rendered_commands() {
        let env = EnvSnapshot::from_pairs([("OPENSEARCH_PASSWORD", "hunter2")]);
        let subs = Substitutions::new(&env);
        let provider =
            DefaultServiceProvider::new(Arc::new(TokioProcessRunner), ServiceConfig::default());

        let service = provider
            .provision("opensearch-src", &command_spec(), &subs)
            .expect("should provision");
        assert_eq!(service.name(), "opensearch");
        assert_eq!(service.state(), ServiceState::Created);
    }

    #[test]
    fn missing_secret_fails_provisioning() {
        let env = EnvSnapshot::default();
        let subs = Substitutions::new(&env);
        let provider =
            DefaultServiceProvider::new(Arc::new(TokioProcessRunner), ServiceConfig::default());
        let result = provider.provision("opensearch-src", &command_spec(), &subs);
        assert!(matches!(result, Err(ServiceError::Process(_))));
    }

    #[test]
    fn probe_is_rendered() {
        let env = EnvSnapshot::default();
        let subs = Substitutions::new(&env).bind("name", "os");
        let mut spec = command_spec();
        spec.readiness = Some(ReadinessSpec {
            kind: ProbeKind::Command,
            command: vec!["check.sh".to_owned(), "{name}".to_owned()],
            address: None,
            attempts: None,
            interval_ms: None,
        });
        match render_probe(&spec, &subs).unwrap() {
            Some(Probe::Command(cmd)) => assert_eq!(cmd.args, vec!["os"]),
            other => panic!("unexpected probe: {other:?}"),
        }
    }
}
