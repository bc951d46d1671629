//! Config for deriving the tenant of a series.

/// The label name Cortex tooling conventionally uses to carry a tenant in-band.
pub const DEFAULT_TENANT_LABEL: &str = "__tenant__";

/// The header Cortex, Mimir and Loki read the tenant from.
pub const DEFAULT_TENANT_HEADER: &str = "X-Scope-OrgID";

/// CLI config for tenant routing.
#[derive(Debug, Clone, PartialEq, Eq, clap::Parser)]
pub struct TenantConfig {
    /// Name of the label whose value identifies the tenant of a series.
    ///
    /// When a series carries this label more than once, the first occurrence wins.
    #[clap(
        long = "tenant-label",
        env = "CORTEX_TENANT_LABEL",
        default_value = DEFAULT_TENANT_LABEL,
        action
    )]
    pub label: String,

    /// Name of the header the tenant is sent downstream in.
    #[clap(
        long = "tenant-header",
        env = "CORTEX_TENANT_HEADER",
        default_value = DEFAULT_TENANT_HEADER,
        action
    )]
    pub header: String,

    /// Tenant assigned to series that do not carry the tenant label, or carry it with an
    /// empty value.
    #[clap(
        long = "tenant-default",
        env = "CORTEX_TENANT_DEFAULT",
        default_value = "default",
        action
    )]
    pub default: String,

    /// Remove the tenant label from series before forwarding them.
    #[clap(long = "tenant-label-remove", env = "CORTEX_TENANT_LABEL_REMOVE", action)]
    pub label_remove: bool,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_TENANT_LABEL.to_string(),
            header: DEFAULT_TENANT_HEADER.to_string(),
            default: "default".to_string(),
            label_remove: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = TenantConfig::try_parse_from(["server"]).unwrap();
        assert_eq!(cfg, TenantConfig::default());
    }

    #[test]
    fn test_overrides() {
        let cfg = TenantConfig::try_parse_from([
            "server",
            "--tenant-label",
            "org",
            "--tenant-header",
            "X-Org",
            "--tenant-default",
            "unknown",
            "--tenant-label-remove",
        ])
        .unwrap();

        assert_eq!(cfg.label, "org");
        assert_eq!(cfg.header, "X-Org");
        assert_eq!(cfg.default, "unknown");
        assert!(cfg.label_remove);
    }
}
