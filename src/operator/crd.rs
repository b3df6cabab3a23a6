use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Group every Capsule user must belong to when nothing else is configured.
pub const DEFAULT_USER_GROUP: &str = "capsule.clastix.io";

// ==================== CapsuleConfiguration CRD ====================

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "capsule.clastix.io",
    version = "v1alpha1",
    kind = "CapsuleConfiguration",
    plural = "capsuleconfigurations",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleConfigurationSpec {
    /// Groups whose members are considered Capsule users
    #[serde(default = "default_user_groups")]
    pub user_groups: Vec<String>,

    /// Require Namespace names to be prefixed with the Tenant name
    #[serde(default)]
    pub force_tenant_prefix: bool,

    /// Namespaces matching this pattern cannot be claimed by a Tenant
    #[serde(
        rename = "protectedNamespaceRegex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub protected_namespace_regex: Option<String>,
}

fn default_user_groups() -> Vec<String> {
    vec![DEFAULT_USER_GROUP.to_string()]
}

impl Default for CapsuleConfigurationSpec {
    fn default() -> Self {
        Self {
            user_groups: default_user_groups(),
            force_tenant_prefix: false,
            protected_namespace_regex: None,
        }
    }
}
