//! The policy document consulted on every admission.
//!
//! The document is re-read for each request so that edits to a mounted
//! ConfigMap take effect without restarting the webhook.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyConfig {
    /// Node ports that `NodePort` services may not claim.
    pub rejective_ports: RejectedPorts,

    /// Hosts that may only be served by ingresses in a specific namespace.
    pub ingress_validate: Vec<IngressBinding>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IngressBinding {
    pub namespace: String,
    pub host: String,
}

/// Rejected node ports, kept as the literal strings they were configured
/// with.
///
/// Entries are compared verbatim against formatted node ports, so an entry
/// such as `" 30080"` never matches anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawPorts")]
pub struct RejectedPorts(Vec<String>);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read policy file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Accepted spellings of `rejectivePorts`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPorts {
    Empty,
    List(String),
    Port(i64),
    Many(Vec<RawPort>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPort {
    Str(String),
    Num(i64),
}

/// Reads and parses the policy document at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<PolicyConfig, ConfigError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let sha256 = format!("{:x}", Sha256::digest(&data));
    info!(path = %path.display(), %sha256, "New configuration");

    parse(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse(data: &[u8]) -> Result<PolicyConfig, serde_yaml::Error> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(PolicyConfig::default());
    }
    serde_yaml::from_slice(data)
}

// === impl RejectedPorts ===

impl RejectedPorts {
    /// Splits a comma-separated list without trimming its entries.
    pub fn from_list(list: &str) -> Self {
        Self(list.split(',').map(str::to_string).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<RawPorts> for RejectedPorts {
    fn from(raw: RawPorts) -> Self {
        match raw {
            RawPorts::Empty => Self::default(),
            RawPorts::List(list) => Self::from_list(&list),
            RawPorts::Port(port) => Self(vec![port.to_string()]),
            RawPorts::Many(ports) => Self(
                ports
                    .into_iter()
                    .map(|port| match port {
                        RawPort::Str(s) => s,
                        RawPort::Num(n) => n.to_string(),
                    })
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write temp file");
        file
    }

    fn ports(config: &PolicyConfig) -> Vec<&str> {
        config.rejective_ports.iter().collect()
    }

    #[test]
    fn loads_comma_separated_ports_and_bindings() {
        let file = write_config(
            r#"
rejectivePorts: "30001,30080"
ingressValidate:
  - namespace: prod
    host: app.example.com
  - namespace: hep-saas
    host: dev.example.com
"#,
        );
        let config = load_config(file.path()).expect("config must load");
        assert_eq!(ports(&config), ["30001", "30080"]);
        assert_eq!(
            config.ingress_validate,
            vec![
                IngressBinding {
                    namespace: "prod".to_string(),
                    host: "app.example.com".to_string(),
                },
                IngressBinding {
                    namespace: "hep-saas".to_string(),
                    host: "dev.example.com".to_string(),
                },
            ]
        );
    }

    #[test]
    fn unquoted_list_is_a_string() {
        let file = write_config("rejectivePorts: 30001,30080\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(ports(&config), ["30001", "30080"]);
    }

    #[test]
    fn accepts_integers() {
        let file = write_config("rejectivePorts: 30001\n");
        assert_eq!(ports(&load_config(file.path()).unwrap()), ["30001"]);

        let file = write_config("rejectivePorts: [30001, \"30080\"]\n");
        assert_eq!(ports(&load_config(file.path()).unwrap()), ["30001", "30080"]);
    }

    #[test]
    fn entries_are_not_trimmed() {
        let file = write_config("rejectivePorts: \"30001, 30080,abc\"\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(ports(&config), ["30001", " 30080", "abc"]);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let file = write_config("unrelated: true\n");
        let config = load_config(file.path()).unwrap();
        assert!(config.rejective_ports.is_empty());
        assert!(config.ingress_validate.is_empty());

        let file = write_config("  \n");
        assert_eq!(load_config(file.path()).unwrap(), PolicyConfig::default());

        let file = write_config("rejectivePorts: ~\n");
        assert!(load_config(file.path()).unwrap().rejective_ports.is_empty());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path().join("config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }), "{err}");
    }

    #[test]
    fn invalid_document_is_a_parse_error() {
        let file = write_config("ingressValidate: {namespace: [\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{err}");

        let file = write_config("ingressValidate: not-a-list\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{err}");
    }

    #[test]
    fn changes_are_observed_on_the_next_load() {
        let file = write_config("rejectivePorts: \"30001\"\n");
        assert_eq!(ports(&load_config(file.path()).unwrap()), ["30001"]);

        std::fs::write(file.path(), "rejectivePorts: \"30002\"\n").unwrap();
        assert_eq!(ports(&load_config(file.path()).unwrap()), ["30002"]);
    }
}
