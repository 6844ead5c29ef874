use crate::{IngressBinding, Verdict};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;
use tracing::info;

/// The parts of an `Ingress` that the host binding rule reads.
///
/// Both `networking.k8s.io/v1` and the older `extensions/v1beta1` objects
/// decode into this view since only rule hosts are inspected.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct IngressView {
    pub metadata: ObjectMeta,
    pub spec: IngressSpec,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct IngressSpec {
    pub rules: Vec<IngressRule>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct IngressRule {
    pub host: Option<String>,
}

// === impl IngressView ===

impl IngressView {
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    fn hosts(&self) -> impl Iterator<Item = &str> + '_ {
        self.spec
            .rules
            .iter()
            .map(|rule| rule.host.as_deref().unwrap_or_default())
    }
}

/// Checks an ingress against the configured host bindings.
///
/// Bindings are walked in order, and for each binding the ingress's rule
/// hosts are walked in order:
///
/// - a rule host that differs from the binding's host admits the ingress
///   immediately, even if a later binding names that host;
/// - a matching host requested from the bound namespace admits the ingress;
/// - a matching host requested from any other namespace is noted and the
///   walk continues.
///
/// The ingress is denied only if the walk ends after noting at least one
/// illegal host. No bindings, or no rules, means there is nothing to check.
pub fn validate(ingress: &IngressView, bindings: &[IngressBinding]) -> Verdict {
    let name = ingress.name();
    let namespace = ingress.namespace();

    let mut illegal = false;
    for binding in bindings {
        for host in ingress.hosts() {
            if host != binding.host {
                info!(%host, %name, %namespace, "Skip validation for unbound host");
                return Verdict::allow();
            }

            if namespace == binding.namespace {
                info!(%host, %name, %namespace, "Skip validation for host in its bound namespace");
                return Verdict::allow();
            }

            info!(%host, %name, %namespace, bound = %binding.namespace, "Illegal host");
            illegal = true;
        }
    }

    info!(%name, %namespace, required = illegal, "Validation policy");
    if !illegal {
        return Verdict::allow();
    }

    Verdict::deny(format!(
        "Illegal host, {name} for it's in special namespace:{namespace} is not allowed"
    ))
}
