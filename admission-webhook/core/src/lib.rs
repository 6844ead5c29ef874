#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod config;
pub mod ingress;
pub mod service;
mod verdict;

pub use self::{
    config::{load_config, ConfigError, IngressBinding, PolicyConfig, RejectedPorts},
    verdict::Verdict,
};
use serde::Deserialize;
use thiserror::Error;

/// The resource kinds that have a validating rule.
///
/// Anything else is admitted without looking at the object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Service,
    Ingress,
    Other(String),
}

/// The object under review could not be read as the kind it claims to be.
#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("admission request missing 'object'")]
    Missing,

    #[error("failed to decode {kind}: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

// === impl ResourceKind ===

impl ResourceKind {
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "Service" => Self::Service,
            "Ingress" => Self::Ingress,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Service => "Service",
            Self::Ingress => "Ingress",
            Self::Other(kind) => kind,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies the validating rule for `kind` to the raw `object`.
///
/// The object is only decoded for kinds that have a rule, so unsupported
/// kinds are admitted even when no object is present.
pub fn validate(
    kind: &ResourceKind,
    object: Option<&serde_json::Value>,
    config: &PolicyConfig,
) -> Result<Verdict, ObjectError> {
    match kind {
        ResourceKind::Service => {
            let svc = decode::<service::ServiceView>("Service", object)?;
            Ok(service::validate(&svc, &config.rejective_ports))
        }
        ResourceKind::Ingress => {
            let ingress = decode::<ingress::IngressView>("Ingress", object)?;
            Ok(ingress::validate(&ingress, &config.ingress_validate))
        }
        ResourceKind::Other(kind) => {
            tracing::debug!(%kind, "No policy for kind");
            Ok(Verdict::allow())
        }
    }
}

/// The mutating webhook never rejects and never patches.
pub fn mutate() -> Verdict {
    Verdict::allow()
}

fn decode<'a, T: Deserialize<'a>>(
    kind: &'static str,
    object: Option<&'a serde_json::Value>,
) -> Result<T, ObjectError> {
    let object = object.ok_or(ObjectError::Missing)?;
    T::deserialize(object).map_err(|source| ObjectError::Decode { kind, source })
}
