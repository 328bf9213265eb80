//! Static catalog of workflow node kinds
//!
//! [`NodeKind`] is a closed set: every consumer matches on it exhaustively,
//! so adding a kind forces construction, validation and presentation code
//! to handle it. Provider sub-types are plain string keys listed per kind.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Kind of a workflow node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, EnumString, EnumIter)]
#[derive(Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Root of every workflow
    Start,
    /// Head of a branch chain, carries the chain's condition config
    Condition,
    /// Apply for or renew a certificate through a DNS provider
    Apply,
    /// Deploy a certificate to a target
    Deploy,
    /// Send a notification
    Notify,
    /// Container holding two or more parallel chains
    Branch,
}

/// A provider sub-type selectable for a provider-parameterized kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub key: &'static str,
    pub name: &'static str,
}

const fn provider(key: &'static str, name: &'static str) -> ProviderInfo {
    ProviderInfo { key, name }
}

const DNS_PROVIDERS: &[ProviderInfo] = &[
    provider("aliyun-dns", "Alibaba Cloud DNS"),
    provider("tencentcloud-dns", "Tencent Cloud DNSPod"),
    provider("huaweicloud-dns", "Huawei Cloud DNS"),
    provider("aws-route53", "AWS Route 53"),
    provider("cloudflare", "Cloudflare"),
    provider("godaddy", "GoDaddy"),
    provider("namesilo", "NameSilo"),
    provider("powerdns", "PowerDNS"),
    provider("acmehttpreq", "ACME HTTP request"),
];

const DEPLOY_TARGETS: &[ProviderInfo] = &[
    provider("aliyun-cas-deploy", "Alibaba Cloud CAS deployment"),
    provider("aliyun-cdn", "Alibaba Cloud CDN"),
    provider("aliyun-oss", "Alibaba Cloud OSS"),
    provider("aliyun-clb", "Alibaba Cloud CLB"),
    provider("tencentcloud-cdn", "Tencent Cloud CDN"),
    provider("tencentcloud-clb", "Tencent Cloud CLB"),
    provider("huaweicloud-cdn", "Huawei Cloud CDN"),
    provider("qiniu-cdn", "Qiniu CDN"),
    provider("1panel-ssl", "1Panel certificate"),
    provider("1panel-site", "1Panel website"),
    provider("local", "Local file"),
    provider("ssh", "SSH"),
    provider("webhook", "Webhook"),
    provider("k8s-secret", "Kubernetes secret"),
];

impl NodeKind {
    /// Human readable name, used as the default node name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Condition => "Condition",
            Self::Apply => "Apply",
            Self::Deploy => "Deploy",
            Self::Notify => "Notify",
            Self::Branch => "Branch",
        }
    }

    /// Whether nodes of this kind perform one unit of work
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        match self {
            Self::Apply | Self::Deploy | Self::Notify => true,
            Self::Start | Self::Condition | Self::Branch => false,
        }
    }

    /// Whether nodes of this kind hold ordered chains
    #[must_use]
    pub fn is_container(&self) -> bool {
        match self {
            Self::Branch => true,
            Self::Start | Self::Condition | Self::Apply | Self::Deploy | Self::Notify => false,
        }
    }

    /// Whether a `provider_type` must be set on nodes of this kind
    #[must_use]
    pub fn requires_provider(&self) -> bool {
        !self.providers().is_empty()
    }

    /// Whether users may splice nodes of this kind into a chain.
    ///
    /// Start only exists as the root and Condition only as a chain head,
    /// both are created by the graph itself.
    #[must_use]
    pub fn is_insertable(&self) -> bool {
        match self {
            Self::Apply | Self::Deploy | Self::Notify | Self::Branch => true,
            Self::Start | Self::Condition => false,
        }
    }

    /// Provider sub-types available for this kind, empty when the kind is
    /// not provider-parameterized
    pub fn providers(&self) -> &'static [ProviderInfo] {
        match self {
            Self::Apply => DNS_PROVIDERS,
            Self::Deploy => DEPLOY_TARGETS,
            Self::Start | Self::Condition | Self::Notify | Self::Branch => &[],
        }
    }

    pub fn find_provider(&self, key: &str) -> Option<&'static ProviderInfo> {
        self.providers().iter().find(|p| p.key == key)
    }
}

pub fn is_leaf(kind: NodeKind) -> bool {
    kind.is_leaf()
}

pub fn requires_provider(kind: NodeKind) -> bool {
    kind.requires_provider()
}

/// One entry of the presentation catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub kind: NodeKind,
    pub name: &'static str,
    /// Flat entry when true, group of `children` otherwise
    pub leaf: bool,
    pub children: Vec<ProviderInfo>,
}

/// Ordered, hierarchical list of the kinds a user can pick from
pub fn catalog() -> Vec<CatalogEntry> {
    NodeKind::iter()
        .filter(|kind| kind.is_insertable())
        .map(|kind| CatalogEntry {
            kind,
            name: kind.display_name(),
            leaf: !kind.requires_provider(),
            children: kind.providers().to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_kinds_round_trip_through_strings() {
        for kind in NodeKind::iter() {
            assert_eq!(NodeKind::from_str(kind.as_ref()).unwrap(), kind);
        }
        assert!(NodeKind::from_str("upload").is_err());
    }

    #[test]
    fn test_catalog_groups_provider_kinds() {
        let entries = catalog();
        let kinds: Vec<_> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Apply, NodeKind::Deploy, NodeKind::Notify, NodeKind::Branch]
        );

        let deploy = &entries[1];
        assert!(!deploy.leaf);
        assert!(deploy.children.iter().any(|p| p.key == "aliyun-cas-deploy"));

        let branch = &entries[3];
        assert!(branch.leaf);
        assert!(branch.children.is_empty());
    }

    #[test]
    fn test_predicates() {
        assert!(is_leaf(NodeKind::Apply));
        assert!(!is_leaf(NodeKind::Branch));
        assert!(requires_provider(NodeKind::Deploy));
        assert!(!requires_provider(NodeKind::Notify));
        assert!(NodeKind::Branch.is_container());
        assert_eq!(
            NodeKind::Apply.find_provider("aws-route53").map(|p| p.name),
            Some("AWS Route 53")
        );
        assert!(NodeKind::Notify.find_provider("aws-route53").is_none());
    }
}
