use crate::{RejectedPorts, Verdict};
use serde::Deserialize;
use tracing::{debug, info};

/// The parts of a `Service` that the node port rule reads.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServiceView {
    pub spec: ServiceSpec,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServiceSpec {
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub ports: Vec<ServicePort>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServicePort {
    pub node_port: Option<i32>,
}

const NODE_PORT: &str = "NodePort";

/// Denies `NodePort` services that claim a rejected node port.
///
/// Ports are checked in declaration order and the first rejected one
/// decides the reason. Services of any other type are allowed.
pub fn validate(svc: &ServiceView, rejected: &RejectedPorts) -> Verdict {
    let svc_type = svc.spec.type_.as_deref().unwrap_or_default();
    info!(%svc_type, "Service Type");
    if svc_type != NODE_PORT {
        return Verdict::allow();
    }

    for port in &svc.spec.ports {
        let node_port = port.node_port.unwrap_or_default().to_string();
        for rejected in rejected.iter() {
            debug!(%node_port, %rejected, "Comparing node port");
            if node_port == rejected {
                let reason = format!("nodePort {rejected} is not allowed");
                info!("{reason}");
                return Verdict::deny(reason);
            }
        }
    }

    Verdict::allow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service(svc_type: &str, node_ports: &[i32]) -> ServiceView {
        let ports = node_ports
            .iter()
            .map(|p| json!({ "port": 80, "targetPort": 8080, "nodePort": p }))
            .collect::<Vec<_>>();
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": "web", "namespace": "default" },
            "spec": { "type": svc_type, "ports": ports, "selector": { "app": "web" } }
        }))
        .expect("service must decode")
    }

    #[test]
    fn denies_rejected_node_port() {
        let verdict = validate(
            &service("NodePort", &[30080]),
            &RejectedPorts::from_list("30001,30080"),
        );
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason.as_deref(), Some("nodePort 30080 is not allowed"));
    }

    #[test]
    fn allows_unlisted_node_ports() {
        let verdict = validate(
            &service("NodePort", &[30002, 30003]),
            &RejectedPorts::from_list("30001,30080"),
        );
        assert_eq!(verdict, Verdict::allow());
    }

    #[test]
    fn first_rejected_port_in_declaration_order_wins() {
        let verdict = validate(
            &service("NodePort", &[30002, 30080, 30001]),
            &RejectedPorts::from_list("30001,30080"),
        );
        assert_eq!(verdict, Verdict::deny("nodePort 30080 is not allowed"));
    }

    #[test]
    fn other_service_types_are_allowed() {
        let rejected = RejectedPorts::from_list("30080");
        for svc_type in ["ClusterIP", "LoadBalancer", "ExternalName", "nodeport"] {
            let verdict = validate(&service(svc_type, &[30080]), &rejected);
            assert_eq!(verdict, Verdict::allow(), "{svc_type}");
        }

        let untyped: ServiceView =
            serde_json::from_value(json!({ "spec": { "ports": [{ "nodePort": 30080 }] } }))
                .unwrap();
        assert_eq!(validate(&untyped, &rejected), Verdict::allow());
    }

    #[test]
    fn empty_rejection_list_allows_everything() {
        let verdict = validate(&service("NodePort", &[30080]), &RejectedPorts::default());
        assert_eq!(verdict, Verdict::allow());
    }

    #[test]
    fn entries_are_compared_as_literal_strings() {
        let rejected = RejectedPorts::from_list("30001, 30080,030080");
        let verdict = validate(&service("NodePort", &[30080]), &rejected);
        assert_eq!(verdict, Verdict::allow());
    }

    #[test]
    fn unset_node_port_formats_as_zero() {
        let svc: ServiceView = serde_json::from_value(json!({
            "spec": { "type": "NodePort", "ports": [{ "port": 80 }] }
        }))
        .unwrap();
        assert_eq!(
            validate(&svc, &RejectedPorts::from_list("30080")),
            Verdict::allow()
        );
        assert_eq!(
            validate(&svc, &RejectedPorts::from_list("0")),
            Verdict::deny("nodePort 0 is not allowed")
        );
    }
}
