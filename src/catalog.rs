use std::collections::HashMap;

use crate::model::Resource;

/// Static registry of bookable resources. Read-only once built.
#[derive(Debug, Clone)]
pub struct Catalog {
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    DuplicateResource(String),
    ZeroCapacity(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::DuplicateResource(id) => write!(f, "duplicate resource id: {id}"),
            CatalogError::ZeroCapacity(id) => write!(f, "resource {id} has zero capacity"),
        }
    }
}

impl std::error::Error for CatalogError {}

impl Catalog {
    pub fn new(resources: Vec<Resource>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(resources.len());
        for (pos, r) in resources.iter().enumerate() {
            if r.capacity == 0 {
                return Err(CatalogError::ZeroCapacity(r.id.clone()));
            }
            if index.insert(r.id.clone(), pos).is_some() {
                return Err(CatalogError::DuplicateResource(r.id.clone()));
            }
        }
        Ok(Self { resources, index })
    }

    /// All resources in registration order.
    pub fn list(&self) -> &[Resource] {
        &self.resources
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.index.get(id).map(|&pos| &self.resources[pos])
    }

    /// Registration position, used as the global lock order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl Default for Catalog {
    /// The five rooms of the stock deployment.
    fn default() -> Self {
        let rooms = vec![
            Resource::new("room1", "Conference Room A", 10),
            Resource::new("room2", "Conference Room B", 8),
            Resource::new("room3", "Meeting Room 1", 6),
            Resource::new("room4", "Meeting Room 2", 4),
            Resource::new("room5", "Board Room", 12),
        ];
        Self {
            index: rooms
                .iter()
                .enumerate()
                .map(|(pos, r)| (r.id.clone(), pos))
                .collect(),
            resources: rooms,
        }
    }
}
