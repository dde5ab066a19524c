use std::collections::HashMap;
use std::sync::Arc;

use crate::kernel::registry::{Binding, BindingId, RegistryError};
use crate::service::ServiceType;

/// The bindings of every service, in registration order.
#[derive(Debug, Default)]
pub struct BindingMap {
    bindings: HashMap<ServiceType, Vec<Arc<Binding>>>,
    count: usize,
}

impl BindingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next id to `binding` and stores it. Fails if `binding` is
    /// a default binding and its service already has one.
    pub fn insert(&mut self, mut binding: Binding) -> Result<Arc<Binding>, RegistryError> {
        let service = binding.service();
        let bindings = self.bindings.entry(service).or_default();
        if binding.is_default() && bindings.iter().any(|b| b.is_default()) {
            return Err(RegistryError::DuplicateDefault { service });
        }

        self.count += 1;
        binding.set_id(BindingId(self.count));
        let binding = Arc::new(binding);
        bindings.push(Arc::clone(&binding));
        Ok(binding)
    }

    pub fn get(&self, service: ServiceType) -> &[Arc<Binding>] {
        self.bindings
            .get(&service)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn default_of(&self, service: ServiceType) -> Option<&Arc<Binding>> {
        self.get(service).iter().find(|binding| binding.is_default())
    }

    /// Every binding, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Binding>> {
        let mut all: Vec<_> = self.bindings.values().flatten().collect();
        all.sort_by_key(|binding| binding.id());
        all.into_iter()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
