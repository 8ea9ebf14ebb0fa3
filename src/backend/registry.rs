//! The fixed-capacity backend array and its lookup/iteration surface.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{Backend, Protocol, Role};

/// Stable handle into the registry; plain index rather than a pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(pub u32);

/// Owns all `Backend` records for one proxy instance. Backends are only
/// ever appended — `add` returns a new id, and existing ids stay valid for
/// the registry's whole lifetime, matching "never freed while referenced
/// by a live connection".
#[derive(Debug, Default)]
pub struct Registry {
    backends: RwLock<Vec<Arc<Backend>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            backends: RwLock::new(Vec::new()),
        }
    }

    pub fn add(
        &self,
        host: impl Into<String>,
        port: u16,
        weight: u32,
        role: Role,
        protocol: Protocol,
    ) -> BackendId {
        let mut backends = self.backends.write();
        let id = BackendId(backends.len() as u32);
        backends.push(Arc::new(Backend::new(id, host, port, weight, role, protocol)));
        id
    }

    pub fn find(&self, id: BackendId) -> Option<Arc<Backend>> {
        self.backends.read().get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.backends.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of every backend, in registry order. Selection
    /// algorithms read this snapshot and are otherwise pure with respect
    /// to it, per §4.D.
    pub fn snapshot(&self) -> Vec<Arc<Backend>> {
        self.backends.read().clone()
    }

    /// Backends matching `role`, filtered to the currently healthy subset.
    /// `None` means "any role".
    pub fn iter_healthy(&self, role: Option<Role>) -> Vec<Arc<Backend>> {
        self.backends
            .read()
            .iter()
            .filter(|b| b.is_healthy())
            .filter(|b| role.map(|r| b.role() == r).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn iter_all(&self) -> Vec<Arc<Backend>> {
        self.backends.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_returns_increasing_ids() {
        let reg = Registry::new();
        let a = reg.add("127.0.0.1", 9001, 1, Role::Generic, Protocol::Tcp);
        let b = reg.add("127.0.0.1", 9002, 1, Role::Generic, Protocol::Tcp);
        assert_eq!(a, BackendId(0));
        assert_eq!(b, BackendId(1));
    }

    #[test]
    fn find_is_stable_after_more_adds() {
        let reg = Registry::new();
        let a = reg.add("127.0.0.1", 9001, 1, Role::Generic, Protocol::Tcp);
        for i in 0..100 {
            reg.add("127.0.0.1", 9100 + i, 1, Role::Generic, Protocol::Tcp);
        }
        assert_eq!(reg.find(a).unwrap().port(), 9001);
    }

    #[test]
    fn iter_healthy_filters_by_role_and_liveness() {
        let reg = Registry::new();
        let p = reg.add("127.0.0.1", 5432, 1, Role::Primary, Protocol::Postgres);
        let r = reg.add("127.0.0.1", 5433, 1, Role::Replica, Protocol::Postgres);
        reg.find(p).unwrap().record_probe(true, 1, 1, 1);
        reg.find(r).unwrap().record_probe(true, 1, 1, 1);

        let replicas = reg.iter_healthy(Some(Role::Replica));
        assert_eq!(replicas.len(), 1);
        assert_eq!(replicas[0].id(), r);

        let any = reg.iter_healthy(None);
        assert_eq!(any.len(), 2);
    }
}
