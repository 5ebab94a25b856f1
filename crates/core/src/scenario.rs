//! Scenario descriptors -- one named end-to-end test case.
//!
//! Scenarios are data. A catalog entry looks like:
//!
//! ```toml
//! [[scenario]]
//! name = "opensearch-source"
//! connector = "opensearch"
//! required_env = ["UNS_API_KEY"]
//! args = [
//!     "opensearch",
//!     "--num-processes", "{max_processes}",
//!     "--output-dir", "{output_dir}",
//!     "--work-dir", "{work_dir}",
//!     "--download-dir", "{download_dir}",
//!     "--api-key", "${UNS_API_KEY}",
//! ]
//!
//! [scenario.service]
//! name = "opensearch"
//! kind = "command"
//! start = ["scripts/opensearch/create-and-check.sh"]
//! stop = ["docker", "compose", "-f", "scripts/opensearch/docker-compose.yml", "down", "-v"]
//!
//! [scenario.service.readiness]
//! kind = "tcp"
//! address = "127.0.0.1:9200"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::env::EnvSnapshot;
use crate::error::CatalogError;
use crate::template::secret_references;
use crate::workspace::{DownloadRetention, is_safe_component};

// ─── ConnectorKind ───────────────────────────────────────────────────

/// Connector exercised by a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectorKind {
    Local,
    OpenSearch,
    Azure,
    AzureCognitiveSearch,
    SharePoint,
    VertexAiEmbedding,
    OctoAiEmbedding,
    S3,
    DeltaTable,
    LanceDb,
    MongoDb,
    Discord,
    Confluence,
    GitHub,
    Vectara,
    /// Any connector without a dedicated variant.
    Custom(String),
}

impl ConnectorKind {
    /// Canonical kebab-case name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Local => "local",
            Self::OpenSearch => "opensearch",
            Self::Azure => "azure",
            Self::AzureCognitiveSearch => "azure-cognitive-search",
            Self::SharePoint => "sharepoint",
            Self::VertexAiEmbedding => "vertexai-embedding",
            Self::OctoAiEmbedding => "octoai-embedding",
            Self::S3 => "s3",
            Self::DeltaTable => "delta-table",
            Self::LanceDb => "lancedb",
            Self::MongoDb => "mongodb",
            Self::Discord => "discord",
            Self::Confluence => "confluence",
            Self::GitHub => "github",
            Self::Vectara => "vectara",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for ConnectorKind {
    fn from(value: &str) -> Self {
        match value {
            "local" => Self::Local,
            "opensearch" => Self::OpenSearch,
            "azure" => Self::Azure,
            "azure-cognitive-search" => Self::AzureCognitiveSearch,
            "sharepoint" => Self::SharePoint,
            "vertexai-embedding" => Self::VertexAiEmbedding,
            "octoai-embedding" => Self::OctoAiEmbedding,
            "s3" => Self::S3,
            "delta-table" => Self::DeltaTable,
            "lancedb" => Self::LanceDb,
            "mongodb" => Self::MongoDb,
            "discord" => Self::Discord,
            "confluence" => Self::Confluence,
            "github" => Self::GitHub,
            "vectara" => Self::Vectara,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl From<String> for ConnectorKind {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ConnectorKind> for String {
    fn from(kind: ConnectorKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Dependency service ──────────────────────────────────────────────

/// How a dependency service is controlled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// Arbitrary start and stop commands.
    Command,
    /// A Docker container created from `image` and removed on stop.
    Container,
}

/// Readiness probe flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeKind {
    /// Ready once `command` exits 0.
    Command,
    /// Ready once a TCP connection to `address` succeeds.
    Tcp,
    /// Ready once the managed container runs and is healthy.
    Container,
}

/// Readiness polling contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessSpec {
    pub kind: ProbeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Overrides `service.readiness_attempts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    /// Overrides `service.readiness_interval_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

/// A host-to-container TCP port mapping such as `9200:9200`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl std::str::FromStr for PortMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, container) = s
            .split_once(':')
            .ok_or_else(|| format!("port mapping '{s}' must be HOST:CONTAINER"))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u16>()
                .map_err(|e| format!("port mapping '{s}': {e}"))
        };
        Ok(Self {
            host: parse(host)?,
            container: parse(container)?,
        })
    }
}

/// An external process or container a scenario needs before invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub kind: ServiceKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub start: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// `HOST:CONTAINER` TCP port mappings (container services).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    /// Environment for the container, or for start/stop commands.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ReadinessSpec>,
}

impl ServiceSpec {
    /// Parsed port mappings. Call after [`Scenario::validate`].
    pub fn port_mappings(&self) -> Result<Vec<PortMapping>, String> {
        self.ports.iter().map(|p| p.parse()).collect()
    }

    fn validate(&self, scenario: &str) -> Result<(), CatalogError> {
        let invalid = |reason: String| CatalogError::InvalidScenario {
            name: scenario.to_owned(),
            reason,
        };

        if !is_safe_component(&self.name) {
            return Err(invalid(format!(
                "service name '{}' must be alphanumeric with '-', '_' or '.'",
                self.name
            )));
        }

        match self.kind {
            ServiceKind::Command => {
                if self.start.is_empty() {
                    return Err(invalid("command service needs a start command".to_owned()));
                }
                if self.stop.is_empty() {
                    return Err(invalid("command service needs a stop command".to_owned()));
                }
            }
            ServiceKind::Container => {
                if self.image.as_deref().is_none_or(str::is_empty) {
                    return Err(invalid("container service needs an image".to_owned()));
                }
                self.port_mappings().map_err(invalid)?;
            }
        }

        if let Some(readiness) = &self.readiness {
            match readiness.kind {
                ProbeKind::Command if readiness.command.is_empty() => {
                    return Err(invalid("command probe needs a command".to_owned()));
                }
                ProbeKind::Tcp if readiness.address.as_deref().is_none_or(str::is_empty) => {
                    return Err(invalid("tcp probe needs an address".to_owned()));
                }
                ProbeKind::Container if self.kind != ServiceKind::Container => {
                    return Err(invalid(
                        "container probe is only valid for container services".to_owned(),
                    ));
                }
                _ => {}
            }
            if readiness.attempts == Some(0) {
                return Err(invalid("readiness attempts must be at least 1".to_owned()));
            }
        }
        Ok(())
    }

    fn tokens(&self) -> impl Iterator<Item = &String> {
        let probe = self
            .readiness
            .iter()
            .flat_map(|r| r.command.iter().chain(r.address.iter()));
        self.start
            .iter()
            .chain(self.stop.iter())
            .chain(self.env.values())
            .chain(probe)
    }
}

// ─── Verification ────────────────────────────────────────────────────

/// How a scenario's output is checked after the CLI succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum VerifySpec {
    /// The external diff-checker with `--output-folder-name <name>`.
    #[default]
    DiffChecker,
    /// Native comparison against `<expected_root>/<name>`.
    Fixtures {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_num_files: Option<usize>,
        /// Excluded in addition to `verify.exclude_fields`.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        exclude_fields: Vec<String>,
    },
    /// An arbitrary checker command.
    Command { command: Vec<String> },
    /// No verification; the CLI exit code decides.
    #[serde(rename = "none")]
    Disabled,
}

impl VerifySpec {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DiffChecker => "diff-checker",
            Self::Fixtures { .. } => "fixtures",
            Self::Command { .. } => "command",
            Self::Disabled => "none",
        }
    }
}

// ─── Scenario ────────────────────────────────────────────────────────

/// One named end-to-end test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Identifier and output-folder key.
    pub name: String,
    pub connector: ConnectorKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Variables that must be set and non-empty for the scenario to run.
    #[serde(default)]
    pub required_env: BTreeSet<String>,
    /// Ingestion CLI tokens, appended after `ingest.base_args`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the CLI child.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceSpec>,
    #[serde(default)]
    pub verify: VerifySpec,
    /// Overrides `retention.download`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_retention: Option<DownloadRetention>,
}

impl Scenario {
    /// Minimal scenario with no arguments, used by tests and builders.
    pub fn new(name: impl Into<String>, connector: ConnectorKind) -> Self {
        Self {
            name: name.into(),
            connector,
            description: String::new(),
            required_env: BTreeSet::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
            service: None,
            verify: VerifySpec::default(),
            download_retention: None,
        }
    }

    /// Required variables that are unset or empty in `env`, sorted.
    pub fn missing_env(&self, env: &EnvSnapshot) -> Vec<String> {
        self.required_env
            .iter()
            .filter(|var| env.get_non_empty(var).is_none())
            .cloned()
            .collect()
    }

    /// Every `${VAR}` referenced anywhere in the scenario.
    pub fn secret_references(&self) -> BTreeSet<String> {
        let verify_tokens: &[String] = match &self.verify {
            VerifySpec::Command { command } => command,
            _ => &[],
        };
        self.args
            .iter()
            .chain(self.env.values())
            .chain(verify_tokens)
            .chain(self.service.iter().flat_map(ServiceSpec::tokens))
            .flat_map(|token| secret_references(token))
            .collect()
    }

    /// Structural checks applied when a catalog is loaded.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |reason: String| CatalogError::InvalidScenario {
            name: self.name.clone(),
            reason,
        };

        if !is_safe_component(&self.name) {
            return Err(invalid(
                "name must be non-empty and contain only alphanumerics, '-', '_' or '.'"
                    .to_owned(),
            ));
        }

        let undeclared: Vec<String> = self
            .secret_references()
            .into_iter()
            .filter(|var| !self.required_env.contains(var))
            .collect();
        if !undeclared.is_empty() {
            return Err(invalid(format!(
                "referenced variables missing from required_env: {}",
                undeclared.join(", ")
            )));
        }

        if let VerifySpec::Command { command } = &self.verify
            && command.is_empty()
        {
            return Err(invalid("command verification needs a command".to_owned()));
        }

        if let Some(service) = &self.service {
            service.validate(&self.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(toml_str: &str) -> Scenario {
        toml::from_str(toml_str).expect("scenario should parse")
    }

    #[test]
    fn connector_kind_roundtrips_known_and_custom_names() {
        assert_eq!(ConnectorKind::from("sharepoint"), ConnectorKind::SharePoint);
        assert_eq!(
            ConnectorKind::from("vertexai-embedding").to_string(),
            "vertexai-embedding"
        );
        let custom = ConnectorKind::from("kafka");
        assert_eq!(custom, ConnectorKind::Custom("kafka".to_owned()));
        assert_eq!(custom.as_str(), "kafka");
    }

    #[test]
    fn minimal_scenario_defaults_to_diff_checker() {
        let s = scenario("name = \"local\"\nconnector = \"local\"\n");
        assert_eq!(s.verify, VerifySpec::DiffChecker);
        assert!(s.service.is_none());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn missing_env_reports_unset_and_empty() {
        let mut s = Scenario::new("sp", ConnectorKind::SharePoint);
        s.required_env = ["SP_CLIENT_ID", "SP_CLIENT_SECRET", "SP_SITE"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        let env = EnvSnapshot::from_pairs([("SP_CLIENT_ID", "id"), ("SP_SITE", "")]);
        assert_eq!(s.missing_env(&env), vec!["SP_CLIENT_SECRET", "SP_SITE"]);
    }

    #[test]
    fn undeclared_secret_is_rejected() {
        let s = scenario(
            r#"
name = "vertex"
connector = "vertexai-embedding"
args = ["local", "--embedding-api-key", "${GCP_INGEST_SERVICE_KEY}"]
"#,
        );
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("GCP_INGEST_SERVICE_KEY"));
    }

    #[test]
    fn secrets_in_service_and_verify_count_as_references() {
        let s = scenario(
            r#"
name = "delta"
connector = "delta-table"
required_env = ["AWS_ACCESS_KEY_ID"]

[verify]
kind = "command"
command = ["python", "check.py", "--key", "${AWS_SECRET_ACCESS_KEY}"]

[service]
name = "minio"
kind = "command"
start = ["start.sh", "${AWS_ACCESS_KEY_ID}"]
stop = ["stop.sh"]
"#,
        );
        let refs = s.secret_references();
        assert!(refs.contains("AWS_ACCESS_KEY_ID"));
        assert!(refs.contains("AWS_SECRET_ACCESS_KEY"));
        assert!(s.validate().is_err());
    }

    #[test]
    fn command_service_requires_both_commands() {
        let s = scenario(
            r#"
name = "os"
connector = "opensearch"

[service]
name = "opensearch"
kind = "command"
start = ["up.sh"]
"#,
        );
        assert!(s.validate().unwrap_err().to_string().contains("stop command"));
    }

    #[test]
    fn container_service_parses_ports_and_probe() {
        let s = scenario(
            r#"
name = "mongo"
connector = "mongodb"

[service]
name = "mongo"
kind = "container"
image = "mongo:7"
ports = ["27017:27017"]

[service.readiness]
kind = "tcp"
address = "127.0.0.1:27017"
attempts = 10
"#,
        );
        s.validate().expect("container scenario should be valid");
        let service = s.service.as_ref().unwrap();
        assert_eq!(
            service.port_mappings().unwrap(),
            vec![PortMapping {
                host: 27017,
                container: 27017
            }]
        );
    }

    #[test]
    fn container_probe_on_command_service_is_rejected() {
        let s = scenario(
            r#"
name = "os"
connector = "opensearch"

[service]
name = "opensearch"
kind = "command"
start = ["up.sh"]
stop = ["down.sh"]

[service.readiness]
kind = "container"
"#,
        );
        assert!(s.validate().is_err());
    }

    #[test]
    fn bad_port_mapping_is_rejected() {
        assert!("9200".parse::<PortMapping>().is_err());
        assert!("x:9200".parse::<PortMapping>().is_err());
        assert!("70000:1".parse::<PortMapping>().is_err());
    }

    #[test]
    fn verify_variants_parse() {
        let s = scenario(
            r#"
name = "s3"
connector = "s3"
verify = { kind = "fixtures", expected_num_files = 3 }
"#,
        );
        assert_eq!(
            s.verify,
            VerifySpec::Fixtures {
                expected_num_files: Some(3),
                exclude_fields: Vec::new()
            }
        );
        let s = scenario("name = \"x\"\nconnector = \"local\"\nverify = { kind = \"none\" }\n");
        assert_eq!(s.verify, VerifySpec::Disabled);
    }

    #[test]
    fn unsafe_name_is_rejected() {
        let s = Scenario::new("../escape", ConnectorKind::Local);
        assert!(s.validate().is_err());
    }
}
