//! Agent pool names and provider IDs
//!
//! Agent pool VMs carry provider IDs of the form
//! `azure:///subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Compute/virtualMachineScaleSets/aks-{pool}-{hash}-vmss/virtualMachines/{n}`.

use crate::error::ProviderError;
use regex::Regex;
use std::sync::LazyLock;

/// Agent pool name constraint: a lowercase letter then up to 11 lowercase alphanumerics
pub const AGENT_POOL_NAME_PATTERN: &str = "^[a-z][a-z0-9]{0,11}$";

static AGENT_POOL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used, reason = "pattern is a compile-time constant")]
    Regex::new(AGENT_POOL_NAME_PATTERN).unwrap()
});

static VMSS_PROVIDER_ID: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used, reason = "pattern is a compile-time constant")]
    Regex::new(
        r"azure:///subscriptions/(.*)/resourceGroups/(.*)/providers/Microsoft.Compute/virtualMachineScaleSets/(.*)/virtualMachines/(.*)",
    )
    .unwrap()
});

/// Whether `name` is a valid agent pool name
pub fn is_valid_agent_pool_name(name: &str) -> bool {
    AGENT_POOL_NAME.is_match(name)
}

/// Reject names that cannot be used as agent pool names
pub fn validate_agent_pool_name(name: &str) -> Result<(), ProviderError> {
    if is_valid_agent_pool_name(name) {
        Ok(())
    } else {
        Err(ProviderError::InvalidName(name.to_string()))
    }
}

/// Extract the agent pool name from a VM scale set provider ID
pub fn parse_agent_pool_name_from_id(id: &str) -> Result<String, ProviderError> {
    let captures = VMSS_PROVIDER_ID.captures(id).ok_or_else(|| {
        ProviderError::InvalidId(format!(
            "id does not match the regex for ParseAgentPoolNameFromID {}",
            id
        ))
    })?;

    let vmss_name = captures.get(3).map_or("", |m| m.as_str());
    let parts: Vec<&str> = vmss_name.split('-').collect();
    match parts.get(1) {
        Some(name) if !name.is_empty() => Ok((*name).to_string()),
        _ => Err(ProviderError::InvalidId(format!(
            "cannot parse agentpool name for ParseAgentPoolNameFromID {}",
            id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_id(vmss: &str) -> String {
        format!(
            "azure:///subscriptions/sub-1/resourceGroups/mc_rg/providers/Microsoft.Compute/virtualMachineScaleSets/{}/virtualMachines/0",
            vmss
        )
    }

    #[test]
    fn test_valid_names() {
        for name in ["a", "testpool", "gpu1", "abcdefghijkl", "z0000000000"] {
            assert!(is_valid_agent_pool_name(name), "{} should be valid", name);
            assert!(validate_agent_pool_name(name).is_ok());
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "Gpu", "gpu-pool", "gpu_pool", "abcdefghijklm", "1gpu", "gpu pool"] {
            assert!(!is_valid_agent_pool_name(name), "{:?} should be invalid", name);
            assert!(matches!(
                validate_agent_pool_name(name),
                Err(ProviderError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_parse_agent_pool_name() {
        for pool in ["a", "gpu1", "testpool", "abcdefghijkl"] {
            let id = provider_id(&format!("aks-{}-12345678-vmss", pool));
            assert_eq!(parse_agent_pool_name_from_id(&id).unwrap(), pool);
        }
    }

    #[test]
    fn test_parse_does_not_match() {
        let wrong_provider = "azure:///subscriptions/sub-1/resourceGroups/mc_rg/providers/Microsoft.Network/virtualMachineScaleSets/aks-gpu1-12345678-vmss/virtualMachines/0";
        for id in ["", "gpu1", wrong_provider] {
            let err = parse_agent_pool_name_from_id(id).unwrap_err();
            assert!(err.to_string().contains("does not match"), "{}", err);
        }
    }

    #[test]
    fn test_parse_cannot_parse() {
        for id in [
            provider_id("aks"),
            provider_id("aks--12345678-vmss"),
            "azure:///subscriptions/sub-1/resourceGroups/mc_rg/providers/Microsoft.Compute/virtualMachineScaleSets//virtualMachines/0".to_string(),
        ] {
            let err = parse_agent_pool_name_from_id(&id).unwrap_err();
            assert!(err.to_string().contains("cannot parse"), "{}", err);
        }
    }
}
