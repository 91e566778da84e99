//! The type import bridge: which host types a compilation may see.

use indexmap::{IndexMap, IndexSet};

use crate::host::{catalog, HostModule, HostType, HostTypeId, Primitive};

/// Result of importing a single descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported,
    AlreadyImported,
    NotPublic,
    /// A different descriptor with the same full name was imported first.
    NameTaken,
}

/// Insertion-ordered set of public host types, unique by id, together with
/// the name index the compiler engine resolves against.
#[derive(Debug, Default, Clone)]
pub struct ImportSet {
    types: IndexMap<HostTypeId, HostType>,
    by_full_name: IndexMap<String, HostType>,
    namespaces: IndexSet<String>,
}

impl ImportSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import(&mut self, ty: &HostType) -> ImportOutcome {
        if !ty.is_public() {
            tracing::debug!(ty = %ty.full_name(), "skipping non-public host type");
            return ImportOutcome::NotPublic;
        }
        if self.types.contains_key(&ty.id()) {
            return ImportOutcome::AlreadyImported;
        }
        let full = ty.full_name();
        if let Some(existing) = self.by_full_name.get(&full) {
            tracing::warn!(ty = %full, kept = ?existing, "host type name already imported; keeping first");
            return ImportOutcome::NameTaken;
        }
        self.types.insert(ty.id(), ty.clone());
        self.register_name(full, ty);
        ImportOutcome::Imported
    }

    /// Import a batch, returning how many were newly added.
    pub fn import_all<'a>(&mut self, types: impl IntoIterator<Item = &'a HostType>) -> usize {
        types
            .into_iter()
            .filter(|ty| self.import(ty) == ImportOutcome::Imported)
            .count()
    }

    pub fn import_module(&mut self, module: &HostModule) -> usize {
        let added = self.import_all(module.types());
        tracing::debug!(module = module.name(), added, "imported host module");
        added
    }

    /// Import every catalog type whose namespace is exactly `ns`.
    pub fn import_namespace(&mut self, ns: &str) -> usize {
        let types = catalog::types_in_namespace(ns);
        let added = self.import_all(&types);
        tracing::debug!(namespace = ns, added, "imported host namespace");
        added
    }

    pub fn contains(&self, id: HostTypeId) -> bool {
        self.types.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostType> {
        self.types.values()
    }

    pub fn lookup_full(&self, full_name: &str) -> Option<&HostType> {
        self.by_full_name.get(full_name)
    }

    /// Look up `name` inside `ns`, or among namespace-less types when `ns`
    /// is `None`.
    pub fn lookup_in(&self, ns: Option<&str>, name: &str) -> Option<&HostType> {
        match ns {
            Some(ns) => self.by_full_name.get(&format!("{ns}.{name}")),
            None => self.by_full_name.get(name).filter(|t| t.namespace().is_none()),
        }
    }

    /// True when some imported type lives in `ns` or below it.
    pub fn is_namespace(&self, ns: &str) -> bool {
        self.namespaces.contains(ns)
    }

    pub fn primitive(&self, p: Primitive) -> Option<&HostType> {
        self.types.values().find(|t| t.primitive() == Some(p))
    }

    fn register_name(&mut self, full: String, ty: &HostType) {
        self.by_full_name.insert(full, ty.clone());
        if let Some(ns) = ty.namespace() {
            let mut prefix = String::new();
            for part in ns.split('.') {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(part);
                self.namespaces.insert(prefix.clone());
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::host::system;

    #[test]
    fn reimport_is_a_noop() {
        let ty = HostType::builder("Gauge").namespace("Plant.Sensors").build();
        let mut set = ImportSet::new();
        assert_eq!(set.import(&ty), ImportOutcome::Imported);
        assert_eq!(set.import(&ty), ImportOutcome::AlreadyImported);
        assert_eq!(set.import_all([&ty, &ty]), 0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn non_public_types_are_rejected() {
        let hidden = HostType::builder("Secret").internal().build();
        let mut set = ImportSet::new();
        assert_eq!(set.import(&hidden), ImportOutcome::NotPublic);
        assert!(set.is_empty());
    }

    #[test]
    fn name_index_and_namespace_prefixes() {
        let ty = HostType::builder("Gauge").namespace("Plant.Sensors").build();
        let bare = HostType::builder("Loose").build();
        let mut set = ImportSet::new();
        set.import_all([&ty, &bare]);
        assert!(set.lookup_full("Plant.Sensors.Gauge").is_some());
        assert!(set.lookup_in(Some("Plant.Sensors"), "Gauge").is_some());
        assert!(set.lookup_in(None, "Loose").is_some());
        assert!(set.is_namespace("Plant"));
        assert!(set.is_namespace("Plant.Sensors"));
        assert!(!set.is_namespace("Sensors"));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut set = ImportSet::new();
        set.import_module(&system::module());
        let first: Vec<String> = set.iter().take(3).map(HostType::full_name).collect();
        assert_eq!(first, vec!["System.Object", "System.ValueType", "System.Int64"]);
        assert!(set.primitive(Primitive::Float).is_some());
    }

    #[test]
    fn namespace_import_uses_catalog() {
        let mut set = ImportSet::new();
        let added = set.import_namespace("System");
        assert_eq!(added, system::module().types().len());
        assert_eq!(set.import_namespace("System"), 0);
    }

    #[test]
    fn same_name_keeps_the_first_descriptor() {
        let first = HostType::builder("Gauge").namespace("Plant").build();
        let second = HostType::builder("Gauge").namespace("Plant").build();
        let mut set = ImportSet::new();
        assert_eq!(set.import(&first), ImportOutcome::Imported);
        assert_eq!(set.import(&second), ImportOutcome::NameTaken);
        assert_eq!(set.len(), 1);
        assert!(!set.contains(second.id()));
        assert_eq!(set.lookup_full("Plant.Gauge"), Some(&first));
    }
}
