//! Command-service lifecycle against real processes.
//!
//! - start/stop commands run through `TokioProcessRunner`
//! - readiness polling over a command probe and a TCP probe

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use gantry_core::config::ServiceConfig;
use gantry_core::env::EnvSnapshot;
use gantry_core::process::TokioProcessRunner;
use gantry_core::scenario::{ProbeKind, ReadinessSpec, ServiceKind, ServiceSpec};
use gantry_core::template::Substitutions;
use gantry_service::{
    DefaultServiceProvider, ReadinessPolicy, ServiceError, ServiceProvider, ServiceState,
    wait_until_ready,
};

fn sh(script: String) -> Vec<String> {
    vec!["sh".to_owned(), "-c".to_owned(), script]
}

fn fast_policy(attempts: u32) -> ReadinessPolicy {
    ReadinessPolicy {
        attempts,
        interval: Duration::from_millis(20),
        probe_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn marker_file_service_starts_becomes_ready_and_stops() {
    // Given: a service whose start creates a marker file and whose stop removes it
    let dir = tempfile::TempDir::new().expect("should create temp dir");
    let marker = dir.path().join("up");
    let marker_str = marker.display().to_string();
    let spec = ServiceSpec {
        name: "marker".to_owned(),
        kind: ServiceKind::Command,
        start: sh(format!("touch '{marker_str}'")),
        stop: sh(format!("rm -f '{marker_str}'")),
        image: None,
        ports: vec![],
        env: Default::default(),
        readiness: Some(ReadinessSpec {
            kind: ProbeKind::Command,
            command: sh(format!("test -f '{marker_str}'")),
            address: None,
            attempts: None,
            interval_ms: None,
        }),
    };
    let env = EnvSnapshot::default();
    let subs = Substitutions::new(&env);
    let provider =
        DefaultServiceProvider::new(Arc::new(TokioProcessRunner), ServiceConfig::default());

    // When: the service is provisioned, started and polled
    let mut service = provider
        .provision("marker-scenario", &spec, &subs)
        .expect("should provision");
    service.start().await.expect("start should succeed");
    let attempts = wait_until_ready(service.as_ref(), fast_policy(5))
        .await
        .expect("should become ready");

    // Then: it was ready on the first check and the stop removes the marker
    assert_eq!(attempts, 1);
    assert!(marker.exists());
    service.stop().await.expect("stop should succeed");
    assert_eq!(service.state(), ServiceState::Stopped);
    assert!(!marker.exists());
}

#[tokio::test]
async fn tcp_probe_that_never_connects_exhausts_attempts() {
    // Given: a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let address = listener.local_addr().expect("should have addr").to_string();
    drop(listener);

    let spec = ServiceSpec {
        name: "ghost".to_owned(),
        kind: ServiceKind::Command,
        start: vec!["true".to_owned()],
        stop: vec!["true".to_owned()],
        image: None,
        ports: vec![],
        env: Default::default(),
        readiness: Some(ReadinessSpec {
            kind: ProbeKind::Tcp,
            command: vec![],
            address: Some(address),
            attempts: Some(3),
            interval_ms: Some(10),
        }),
    };
    let env = EnvSnapshot::default();
    let subs = Substitutions::new(&env);
    let config = ServiceConfig::default();
    let provider = DefaultServiceProvider::new(Arc::new(TokioProcessRunner), config.clone());
    let mut service = provider
        .provision("ghost-scenario", &spec, &subs)
        .expect("should provision");

    // When
    service.start().await.expect("start should succeed");
    let policy = ReadinessPolicy::resolve(spec.readiness.as_ref(), &config);
    let err = wait_until_ready(service.as_ref(), policy)
        .await
        .expect_err("should not become ready");

    // Then
    assert!(matches!(err, ServiceError::NotReady { attempts: 3, .. }));
    service.stop().await.expect("stop should still succeed");
}

#[tokio::test]
async fn start_commands_see_rendered_env() {
    let dir = tempfile::TempDir::new().expect("should create temp dir");
    let out = dir.path().join("token");
    let spec = ServiceSpec {
        name: "envcheck".to_owned(),
        kind: ServiceKind::Command,
        start: sh(format!("printf %s \"$SERVICE_TOKEN\" > '{}'", out.display())),
        stop: vec!["true".to_owned()],
        image: None,
        ports: vec![],
        env: [("SERVICE_TOKEN".to_owned(), "${API_TOKEN}".to_owned())]
            .into_iter()
            .collect(),
        readiness: None,
    };
    let env = EnvSnapshot::from_pairs([("API_TOKEN", "tok-42")]);
    let subs = Substitutions::new(&env);
    let provider =
        DefaultServiceProvider::new(Arc::new(TokioProcessRunner), ServiceConfig::default());

    let mut service = provider
        .provision("envcheck", &spec, &subs)
        .expect("should provision");
    service.start().await.expect("start should succeed");
    service.stop().await.expect("stop should succeed");

    let written = std::fs::read_to_string(&out).expect("start should write token");
    assert_eq!(written, "tok-42");
}
