//! Process-wide registry of spaces by domain name.
//!
//! A domain names at most one live space at a time. Unregistering closes the
//! space, which returns its blocks and invalidates outstanding handles.

use crate::config::SpaceConfig;
use crate::error::{Error, Result};
use crate::vfs::Space;
use parking_lot::{const_mutex, Mutex};
use std::collections::BTreeMap;
use tracing::info;

static REGISTRY: Mutex<BTreeMap<String, Space>> = const_mutex(BTreeMap::new());

/// Create a space under `domain`.
pub fn register(domain: &str, config: SpaceConfig) -> Result<Space> {
    let mut registry = REGISTRY.lock();
    if registry.contains_key(domain) {
        return Err(Error::DomainInUse(domain.to_string()));
    }
    let space = Space::new(config)?;
    registry.insert(domain.to_string(), space.clone());
    info!(domain, "domain registered");
    Ok(space)
}

/// The space registered under `domain`.
pub fn get(domain: &str) -> Result<Space> {
    REGISTRY
        .lock()
        .get(domain)
        .cloned()
        .ok_or_else(|| Error::UnknownDomain(domain.to_string()))
}

/// Remove `domain` and close its space.
pub fn unregister(domain: &str) -> Result<()> {
    let space = REGISTRY
        .lock()
        .remove(domain)
        .ok_or_else(|| Error::UnknownDomain(domain.to_string()))?;
    space.close();
    info!(domain, "domain unregistered");
    Ok(())
}

/// Registered domains in order.
pub fn domains() -> Vec<String> {
    REGISTRY.lock().keys().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SpaceConfig {
        SpaceConfig::new(16, 4)
    }

    #[test]
    fn test_register_and_get() {
        let space = register("registry-test-get", small()).unwrap();
        space.write_file("/f", b"x").unwrap();

        let again = get("registry-test-get").unwrap();
        assert_eq!(again.read_file("/f").unwrap(), b"x");
        assert!(domains().contains(&"registry-test-get".to_string()));

        unregister("registry-test-get").unwrap();
    }

    #[test]
    fn test_domain_conflict() {
        register("registry-test-conflict", small()).unwrap();
        assert!(matches!(
            register("registry-test-conflict", small()),
            Err(Error::DomainInUse(_))
        ));
        unregister("registry-test-conflict").unwrap();
        register("registry-test-conflict", small()).unwrap();
        unregister("registry-test-conflict").unwrap();
    }

    #[test]
    fn test_unregister_closes() {
        let space = register("registry-test-close", small()).unwrap();
        unregister("registry-test-close").unwrap();
        assert!(space.is_closed());
        assert!(matches!(
            get("registry-test-close"),
            Err(Error::UnknownDomain(_))
        ));
        assert!(matches!(
            unregister("registry-test-close"),
            Err(Error::UnknownDomain(_))
        ));
    }

    #[test]
    fn test_invalid_config_not_registered() {
        assert!(register("registry-test-invalid", SpaceConfig::new(3, 1)).is_err());
        assert!(get("registry-test-invalid").is_err());
    }
}
