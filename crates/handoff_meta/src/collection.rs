//! Collection and partition load metadata.

use handoff_protocol::{CollectionId, FieldId, IndexId, PartitionId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Load state of a collection or partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoadStatus {
    /// Not loaded.
    #[default]
    Invalid,
    /// Load in progress.
    Loading,
    /// Fully loaded and served.
    Loaded,
}

/// A loaded collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Collection ID.
    pub collection_id: CollectionId,
    /// Number of replicas serving the collection.
    #[serde(default = "default_replica_number")]
    pub replica_number: i32,
    /// Load state.
    pub status: LoadStatus,
    /// Index required on each vector field.
    #[serde(default)]
    pub field_index_id: BTreeMap<FieldId, IndexId>,
}

fn default_replica_number() -> i32 {
    1
}

impl Collection {
    /// Creates a loaded collection with no index requirement.
    pub fn loaded(collection_id: CollectionId) -> Self {
        Self {
            collection_id,
            replica_number: 1,
            status: LoadStatus::Loaded,
            field_index_id: BTreeMap::new(),
        }
    }

    /// Requires `index_id` on `field_id`.
    #[must_use]
    pub fn with_field_index(mut self, field_id: FieldId, index_id: IndexId) -> Self {
        self.field_index_id.insert(field_id, index_id);
        self
    }

    /// Sets the load state.
    #[must_use]
    pub fn with_status(mut self, status: LoadStatus) -> Self {
        self.status = status;
        self
    }
}

/// A partition loaded on its own, without its whole collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Owning collection.
    pub collection_id: CollectionId,
    /// Partition ID.
    pub partition_id: PartitionId,
    /// Number of replicas serving the partition.
    #[serde(default = "default_replica_number")]
    pub replica_number: i32,
    /// Load state.
    pub status: LoadStatus,
}

impl Partition {
    /// Creates a loaded partition.
    pub fn loaded(collection_id: CollectionId, partition_id: PartitionId) -> Self {
        Self {
            collection_id,
            partition_id,
            replica_number: 1,
            status: LoadStatus::Loaded,
        }
    }
}

#[derive(Default)]
struct MetaInner {
    collections: HashMap<CollectionId, Collection>,
    partitions: HashMap<(CollectionId, PartitionId), Partition>,
}

/// Load metadata for collections and partitions.
///
/// A collection is either loaded as a whole (a [`Collection`] record) or
/// partition by partition ([`Partition`] records only).
#[derive(Default)]
pub struct Meta {
    inner: RwLock<MetaInner>,
}

impl Meta {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a collection record.
    pub fn put_collection(&self, collection: Collection) {
        tracing::debug!(
            collection_id = collection.collection_id,
            status = ?collection.status,
            "put collection"
        );
        self.inner
            .write()
            .collections
            .insert(collection.collection_id, collection);
    }

    /// Inserts or replaces a partition record.
    pub fn put_partition(&self, partition: Partition) {
        self.inner
            .write()
            .partitions
            .insert((partition.collection_id, partition.partition_id), partition);
    }

    /// Returns the collection record, if any.
    pub fn get_collection(&self, collection_id: CollectionId) -> Option<Collection> {
        self.inner.read().collections.get(&collection_id).cloned()
    }

    /// Returns the partition record, if any.
    pub fn get_partition(
        &self,
        collection_id: CollectionId,
        partition_id: PartitionId,
    ) -> Option<Partition> {
        self.inner
            .read()
            .partitions
            .get(&(collection_id, partition_id))
            .cloned()
    }

    /// Updates the load state of a collection. Returns false if unknown.
    pub fn set_collection_status(&self, collection_id: CollectionId, status: LoadStatus) -> bool {
        match self.inner.write().collections.get_mut(&collection_id) {
            Some(collection) => {
                collection.status = status;
                true
            }
            None => false,
        }
    }

    /// Removes a collection and all of its partition records.
    pub fn remove_collection(&self, collection_id: CollectionId) {
        let mut inner = self.inner.write();
        inner.collections.remove(&collection_id);
        inner
            .partitions
            .retain(|(collection, _), _| *collection != collection_id);
    }

    /// Removes one partition record.
    pub fn remove_partition(&self, collection_id: CollectionId, partition_id: PartitionId) {
        self.inner
            .write()
            .partitions
            .remove(&(collection_id, partition_id));
    }

    /// Returns true if the partition is served: either its collection is
    /// loaded as a whole, or the partition itself is.
    pub fn is_partition_loaded(&self, collection_id: CollectionId, partition_id: PartitionId) -> bool {
        let inner = self.inner.read();
        if let Some(collection) = inner.collections.get(&collection_id) {
            return collection.status == LoadStatus::Loaded;
        }
        inner
            .partitions
            .get(&(collection_id, partition_id))
            .is_some_and(|partition| partition.status == LoadStatus::Loaded)
    }

    /// Returns the index IDs the collection currently requires.
    ///
    /// Collections loaded partition by partition carry no requirement.
    pub fn required_index_ids(&self, collection_id: CollectionId) -> BTreeSet<IndexId> {
        self.inner
            .read()
            .collections
            .get(&collection_id)
            .map(|collection| collection.field_index_id.values().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaded_collection_covers_all_partitions() {
        let meta = Meta::new();
        meta.put_collection(Collection::loaded(100));
        assert!(meta.is_partition_loaded(100, 10));
        assert!(meta.is_partition_loaded(100, 11));
        assert!(!meta.is_partition_loaded(101, 10));
    }

    #[test]
    fn loading_collection_is_not_loaded() {
        let meta = Meta::new();
        meta.put_collection(Collection::loaded(100).with_status(LoadStatus::Loading));
        assert!(!meta.is_partition_loaded(100, 10));

        assert!(meta.set_collection_status(100, LoadStatus::Loaded));
        assert!(meta.is_partition_loaded(100, 10));
        assert!(!meta.set_collection_status(5, LoadStatus::Loaded));
    }

    #[test]
    fn partition_records_are_independent() {
        let meta = Meta::new();
        meta.put_partition(Partition::loaded(111, 1));
        assert!(meta.is_partition_loaded(111, 1));
        assert!(!meta.is_partition_loaded(111, 2));

        meta.remove_partition(111, 1);
        assert!(!meta.is_partition_loaded(111, 1));
    }

    #[test]
    fn remove_collection_drops_partitions() {
        let meta = Meta::new();
        meta.put_collection(Collection::loaded(1));
        meta.put_partition(Partition::loaded(1, 2));
        meta.put_partition(Partition::loaded(3, 2));

        meta.remove_collection(1);
        assert!(meta.get_collection(1).is_none());
        assert!(meta.get_partition(1, 2).is_none());
        assert!(meta.get_partition(3, 2).is_some());
    }

    #[test]
    fn required_index_ids() {
        let meta = Meta::new();
        meta.put_collection(
            Collection::loaded(100)
                .with_field_index(1, 7)
                .with_field_index(2, 8),
        );
        assert_eq!(
            meta.required_index_ids(100).into_iter().collect::<Vec<_>>(),
            vec![7, 8]
        );
        assert!(meta.required_index_ids(200).is_empty());
    }
}
