//! Directory table management
//!
//! A directory occupies a chain of clusters, each holding one
//! `DirectoryTable`. The head cluster's self entry carries the
//! authoritative entry count for the whole chain; continuation clusters
//! only extend slot capacity.

use crate::core::structures::{
    DirectoryEntry, DirectoryTable, ATTR_SUBDIRECTORY_CHILD, CLUSTER_SIZE,
};

impl DirectoryTable {
    /// Fresh head table for a new directory.
    ///
    /// The self entry records the directory's own name, the parent's
    /// cluster number, a single-cluster size, and an entry count of one
    /// (the self entry counts itself).
    pub fn new(name: [u8; 8], parent_cluster: u32) -> Self {
        let mut table = Self::default();
        let self_entry = &mut table.table[0];
        self_entry.name = name;
        self_entry.set_cluster(parent_cluster);
        self_entry.filesize = CLUSTER_SIZE as u32;
        self_entry.n_of_entries = 1;
        table
    }

    /// Fresh continuation table extending an existing directory
    pub fn new_continuation(name: [u8; 8], parent_cluster: u32) -> Self {
        let mut table = Self::new(name, parent_cluster);
        table.table[0].attribute = ATTR_SUBDIRECTORY_CHILD;
        table
    }

    pub fn self_entry(&self) -> &DirectoryEntry {
        &self.table[0]
    }

    pub fn self_entry_mut(&mut self) -> &mut DirectoryEntry {
        &mut self.table[0]
    }

    /// Whether this cluster is a continuation of another directory table
    pub fn is_continuation(&self) -> bool {
        self.table[0].attribute == ATTR_SUBDIRECTORY_CHILD
    }

    /// Parent cluster recorded in the self entry
    pub fn parent_cluster(&self) -> u32 {
        self.table[0].cluster()
    }

    /// Entry count from the self entry. Authoritative on head clusters only.
    pub fn entry_count(&self) -> u8 {
        self.table[0].n_of_entries
    }

    pub fn increment_entry_count(&mut self) {
        self.table[0].n_of_entries += 1;
    }

    pub fn decrement_entry_count(&mut self) {
        self.table[0].n_of_entries -= 1;
    }

    /// A directory is empty when only the self entry remains
    pub fn is_empty_directory(&self) -> bool {
        self.entry_count() == 1
    }

    /// Index of the first free content slot in this cluster, if any
    pub fn find_free_slot(&self) -> Option<usize> {
        self.table[1..]
            .iter()
            .position(|entry| !entry.is_occupied())
            .map(|index| index + 1)
    }

    /// Occupied content entries in this cluster, self entry excluded
    pub fn occupied_entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.table[1..].iter().filter(|entry| entry.is_occupied())
    }
}
