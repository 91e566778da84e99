//! Process-wide registry of host modules.
//!
//! `references` in [`crate::CompilationOptions`] and
//! [`crate::Session::import_namespace`] resolve through here. The `System`
//! module is always present.

use std::sync::LazyLock;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::{system, HostModule, HostType};

static CATALOG: LazyLock<RwLock<IndexMap<String, HostModule>>> = LazyLock::new(|| {
    let mut modules = IndexMap::new();
    let system = system::module();
    modules.insert(system.name().to_string(), system);
    RwLock::new(modules)
});

/// Register a module under its name, returning the module it replaced.
pub fn register(module: HostModule) -> Option<HostModule> {
    tracing::debug!(module = module.name(), types = module.types().len(), "registering host module");
    CATALOG.write().insert(module.name().to_string(), module)
}

pub fn unregister(name: &str) -> Option<HostModule> {
    CATALOG.write().shift_remove(name)
}

pub fn find(name: &str) -> Option<HostModule> {
    CATALOG.read().get(name).cloned()
}

pub fn modules() -> Vec<HostModule> {
    CATALOG.read().values().cloned().collect()
}

/// Every type in every registered module whose namespace is exactly `ns`.
pub fn types_in_namespace(ns: &str) -> Vec<HostType> {
    CATALOG
        .read()
        .values()
        .flat_map(|m| m.types().iter())
        .filter(|t| t.namespace() == Some(ns))
        .cloned()
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn system_is_always_registered() {
        assert!(find(system::MODULE_NAME).is_some());
    }

    #[test]
    fn register_and_enumerate_namespace() {
        let module = HostModule::new(
            "CatalogTestWidgets",
            vec![
                HostType::builder("Dial").namespace("CatalogTest.Ui"),
                HostType::builder("Slider").namespace("CatalogTest.Ui"),
                HostType::builder("Hidden").namespace("CatalogTest.Other"),
            ],
        );
        register(module);
        let names: Vec<String> = types_in_namespace("CatalogTest.Ui")
            .iter()
            .map(HostType::full_name)
            .collect();
        assert_eq!(names, vec!["CatalogTest.Ui.Dial", "CatalogTest.Ui.Slider"]);
        assert!(unregister("CatalogTestWidgets").is_some());
        assert!(types_in_namespace("CatalogTest.Ui").is_empty());
    }
}
