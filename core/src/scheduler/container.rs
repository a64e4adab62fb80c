//! In-memory container registry

use stagecoach_common::{Container, ContainerId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::scheduler::context::ContainerRegistry;

/// All containers the application has been granted, keyed by id.
#[derive(Debug, Default)]
pub struct ContainerMap {
    containers: RwLock<HashMap<ContainerId, Container>>,
}

impl ContainerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContainerRegistry for ContainerMap {
    fn get(&self, id: &ContainerId) -> Option<Container> {
        self.containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn add_if_new(&self, container: Container) -> bool {
        let mut containers = self
            .containers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if containers.contains_key(&container.id) {
            return false;
        }
        debug!(container = %container.id, host = %container.node_host, "registering container");
        containers.insert(container.id.clone(), container);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagecoach_common::{Priority, Resource};

    #[test]
    fn test_add_if_new() {
        let map = ContainerMap::new();
        let container = Container::new(
            ContainerId::new("container_1"),
            "node-a",
            Resource::new(1024, 1),
            Priority(1),
        );
        assert!(map.add_if_new(container.clone()));
        assert!(!map.add_if_new(container.clone()));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&container.id), Some(container));
        assert!(map.get(&ContainerId::new("container_2")).is_none());
    }
}
