//! B+Tree over directory entry names
//!
//! Fixed-capacity arena tree backing the `whereis` lookup. Keys are the
//! 8-byte names stored in directory entries, compared bytewise; the value
//! for a key is the set of volume locations carrying that name. Leaves are
//! chained left to right so the key population can be walked in order.

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Arena capacity, for tree nodes and location records alike
pub const MAX_NODES: usize = 256;

/// Locations remembered per name
pub const MAX_LOCATIONS_PER_KEY: usize = 5;

/// Maximum children of an internal node
const ORDER: usize = 5;

/// Maximum keys per node
const MAX_KEYS: usize = ORDER - 1;

/// Index key: an entry name exactly as packed on disk
pub type IndexKey = [u8; 8];

type NodeId = u16;

/// Sentinel for absent node and record links
const NO_NODE: NodeId = u16::MAX;

// ============================================================================
// ERRORS
// ============================================================================

/// Index capacity errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    /// Node or record arena exhausted
    OutOfNodes,
    /// A name already carries the maximum number of locations
    RecordFull,
}

// ============================================================================
// LOCATION RECORDS
// ============================================================================

/// Every place a name appears: the head cluster of the directory holding
/// the entry, and the entry's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationSet {
    parent_clusters: [u32; MAX_LOCATIONS_PER_KEY],
    extensions: [[u8; 3]; MAX_LOCATIONS_PER_KEY],
    count: u8,
}

impl LocationSet {
    const EMPTY: Self = Self {
        parent_clusters: [0; MAX_LOCATIONS_PER_KEY],
        extensions: [[0; 3]; MAX_LOCATIONS_PER_KEY],
        count: 0,
    };

    /// Number of recorded locations
    pub fn count(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Location by position: directory head cluster and extension
    pub fn get(&self, index: usize) -> Option<(u32, [u8; 3])> {
        if index < self.count as usize {
            Some((self.parent_clusters[index], self.extensions[index]))
        } else {
            None
        }
    }

    /// All locations in insertion order
    pub fn entries(&self) -> impl Iterator<Item = (u32, [u8; 3])> + '_ {
        (0..self.count as usize).map(move |i| (self.parent_clusters[i], self.extensions[i]))
    }

    fn push(&mut self, parent_cluster: u32, ext: [u8; 3]) -> bool {
        if self.count as usize >= MAX_LOCATIONS_PER_KEY {
            return false;
        }
        self.parent_clusters[self.count as usize] = parent_cluster;
        self.extensions[self.count as usize] = ext;
        self.count += 1;
        true
    }
}

impl Default for LocationSet {
    fn default() -> Self {
        Self::EMPTY
    }
}

// ============================================================================
// TREE NODES
// ============================================================================

/// One arena node. In a leaf, `children[..key_count]` are record ids and
/// `children[ORDER - 1]` links to the next leaf; in an internal node the
/// children are node ids.
#[derive(Clone, Copy)]
struct Node {
    keys: [IndexKey; MAX_KEYS],
    children: [NodeId; ORDER],
    parent: NodeId,
    key_count: u8,
    is_leaf: bool,
}

impl Node {
    const EMPTY: Self = Self {
        keys: [[0; 8]; MAX_KEYS],
        children: [NO_NODE; ORDER],
        parent: NO_NODE,
        key_count: 0,
        is_leaf: false,
    };
}

// ============================================================================
// SEARCH TREE
// ============================================================================

/// B+tree mapping names to their location sets.
///
/// Nodes and records live in bump-allocated arenas; there is no per-key
/// removal. The index is refreshed by clearing and reinserting, so a
/// failed insert leaves the caller to clear and start over.
pub struct SearchTree {
    nodes: [Node; MAX_NODES],
    records: [LocationSet; MAX_NODES],
    node_count: usize,
    record_count: usize,
    root: NodeId,
}

impl SearchTree {
    pub fn new() -> Self {
        Self {
            nodes: [Node::EMPTY; MAX_NODES],
            records: [LocationSet::EMPTY; MAX_NODES],
            node_count: 0,
            record_count: 0,
            root: NO_NODE,
        }
    }

    /// Drop every key and record
    pub fn clear(&mut self) {
        self.node_count = 0;
        self.record_count = 0;
        self.root = NO_NODE;
    }

    /// Number of distinct names in the tree
    pub fn len(&self) -> usize {
        if self.root == NO_NODE {
            return 0;
        }
        let mut id = self.root;
        while !self.nodes[id as usize].is_leaf {
            id = self.nodes[id as usize].children[0];
        }

        let mut total = 0;
        let mut steps = 0;
        loop {
            let leaf = &self.nodes[id as usize];
            total += leaf.key_count as usize;
            match leaf.children[ORDER - 1] {
                NO_NODE => break,
                next => id = next,
            }
            steps += 1;
            if steps > MAX_NODES {
                break;
            }
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.root == NO_NODE
    }

    /// Locations recorded for `name`, if any
    pub fn find(&self, name: &IndexKey) -> Option<&LocationSet> {
        self.find_record_id(name)
            .map(|record_id| &self.records[record_id as usize])
    }

    /// Record one occurrence of `name`.
    ///
    /// A name already present gains another location; a new name claims a
    /// record and a key slot, splitting nodes on the way up as needed.
    pub fn insert(
        &mut self,
        name: IndexKey,
        ext: [u8; 3],
        parent_cluster: u32,
    ) -> Result<(), IndexError> {
        if let Some(record_id) = self.find_record_id(&name) {
            if !self.records[record_id as usize].push(parent_cluster, ext) {
                return Err(IndexError::RecordFull);
            }
            return Ok(());
        }

        let record_id = self.alloc_record(parent_cluster, ext)?;

        if self.root == NO_NODE {
            let root_id = self.alloc_node(true)?;
            let root = &mut self.nodes[root_id as usize];
            root.keys[0] = name;
            root.children[0] = record_id;
            root.key_count = 1;
            self.root = root_id;
            return Ok(());
        }

        let leaf_id = self.find_leaf(&name);
        if (self.nodes[leaf_id as usize].key_count as usize) < MAX_KEYS {
            self.insert_into_leaf(leaf_id, name, record_id);
            return Ok(());
        }
        self.insert_into_leaf_after_splitting(leaf_id, name, record_id)
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Descend to the leaf that would hold `key`. Equal keys send the
    /// descent right, matching the promotion of a split leaf's first key.
    fn find_leaf(&self, key: &IndexKey) -> NodeId {
        let mut current = self.root;
        while !self.nodes[current as usize].is_leaf {
            let node = &self.nodes[current as usize];
            let mut i = 0;
            while i < node.key_count as usize && *key >= node.keys[i] {
                i += 1;
            }
            current = node.children[i];
        }
        current
    }

    fn find_record_id(&self, key: &IndexKey) -> Option<NodeId> {
        if self.root == NO_NODE {
            return None;
        }
        let leaf = &self.nodes[self.find_leaf(key) as usize];
        for i in 0..leaf.key_count as usize {
            if leaf.keys[i] == *key {
                return Some(leaf.children[i]);
            }
        }
        None
    }

    // ========================================================================
    // ARENA ALLOCATION
    // ========================================================================

    fn alloc_node(&mut self, is_leaf: bool) -> Result<NodeId, IndexError> {
        if self.node_count >= MAX_NODES {
            return Err(IndexError::OutOfNodes);
        }
        let id = self.node_count as NodeId;
        self.node_count += 1;
        self.nodes[id as usize] = Node {
            is_leaf,
            ..Node::EMPTY
        };
        Ok(id)
    }

    fn alloc_record(&mut self, parent_cluster: u32, ext: [u8; 3]) -> Result<NodeId, IndexError> {
        if self.record_count >= MAX_NODES {
            return Err(IndexError::OutOfNodes);
        }
        let id = self.record_count as NodeId;
        self.record_count += 1;
        let mut record = LocationSet::EMPTY;
        record.push(parent_cluster, ext);
        self.records[id as usize] = record;
        Ok(id)
    }

    // ========================================================================
    // INSERTION
    // ========================================================================

    fn insert_into_leaf(&mut self, leaf_id: NodeId, key: IndexKey, record_id: NodeId) {
        let leaf = &mut self.nodes[leaf_id as usize];
        let mut insertion_point = 0;
        while insertion_point < leaf.key_count as usize && leaf.keys[insertion_point] < key {
            insertion_point += 1;
        }

        let mut i = leaf.key_count as usize;
        while i > insertion_point {
            leaf.keys[i] = leaf.keys[i - 1];
            leaf.children[i] = leaf.children[i - 1];
            i -= 1;
        }
        leaf.keys[insertion_point] = key;
        leaf.children[insertion_point] = record_id;
        leaf.key_count += 1;
    }

    /// Split a full leaf around the new key. The left leaf keeps the
    /// smaller half, the right takes the rest, and a copy of the right's
    /// first key is promoted.
    fn insert_into_leaf_after_splitting(
        &mut self,
        leaf_id: NodeId,
        key: IndexKey,
        record_id: NodeId,
    ) -> Result<(), IndexError> {
        let new_leaf_id = self.alloc_node(true)?;

        let mut temp_keys = [[0u8; 8]; ORDER];
        let mut temp_children = [NO_NODE; ORDER];
        {
            let leaf = &self.nodes[leaf_id as usize];
            let mut insertion_index = 0;
            while insertion_index < MAX_KEYS && leaf.keys[insertion_index] < key {
                insertion_index += 1;
            }
            let mut j = 0;
            for i in 0..leaf.key_count as usize {
                if j == insertion_index {
                    j += 1;
                }
                temp_keys[j] = leaf.keys[i];
                temp_children[j] = leaf.children[i];
                j += 1;
            }
            temp_keys[insertion_index] = key;
            temp_children[insertion_index] = record_id;
        }

        let split = ORDER / 2;
        {
            let leaf = &mut self.nodes[leaf_id as usize];
            leaf.key_count = 0;
            for i in 0..split {
                leaf.keys[i] = temp_keys[i];
                leaf.children[i] = temp_children[i];
                leaf.key_count += 1;
            }
            for i in split..MAX_KEYS {
                leaf.keys[i] = [0; 8];
                leaf.children[i] = NO_NODE;
            }
        }
        {
            let new_leaf = &mut self.nodes[new_leaf_id as usize];
            let mut j = 0;
            for i in split..ORDER {
                new_leaf.keys[j] = temp_keys[i];
                new_leaf.children[j] = temp_children[i];
                j += 1;
            }
            new_leaf.key_count = j as u8;
        }

        // Chain the leaves and share the parent
        let old_next = self.nodes[leaf_id as usize].children[ORDER - 1];
        self.nodes[new_leaf_id as usize].children[ORDER - 1] = old_next;
        self.nodes[leaf_id as usize].children[ORDER - 1] = new_leaf_id;
        self.nodes[new_leaf_id as usize].parent = self.nodes[leaf_id as usize].parent;

        let promoted = self.nodes[new_leaf_id as usize].keys[0];
        self.insert_into_parent(leaf_id, promoted, new_leaf_id)
    }

    fn insert_into_parent(
        &mut self,
        left_id: NodeId,
        key: IndexKey,
        right_id: NodeId,
    ) -> Result<(), IndexError> {
        let parent_id = self.nodes[left_id as usize].parent;
        if parent_id == NO_NODE {
            return self.insert_into_new_root(left_id, key, right_id);
        }

        let left_index = self.child_index(parent_id, left_id);
        if (self.nodes[parent_id as usize].key_count as usize) < MAX_KEYS {
            self.insert_into_node(parent_id, left_index, key, right_id);
            return Ok(());
        }
        self.insert_into_node_after_splitting(parent_id, left_index, key, right_id)
    }

    /// Position of `child_id` among the parent's children
    fn child_index(&self, parent_id: NodeId, child_id: NodeId) -> usize {
        let parent = &self.nodes[parent_id as usize];
        let mut index = 0;
        while index <= parent.key_count as usize && parent.children[index] != child_id {
            index += 1;
        }
        index
    }

    fn insert_into_node(
        &mut self,
        node_id: NodeId,
        left_index: usize,
        key: IndexKey,
        right_id: NodeId,
    ) {
        let node = &mut self.nodes[node_id as usize];
        let mut i = node.key_count as usize;
        while i > left_index {
            node.keys[i] = node.keys[i - 1];
            node.children[i + 1] = node.children[i];
            i -= 1;
        }
        node.keys[left_index] = key;
        node.children[left_index + 1] = right_id;
        node.key_count += 1;
    }

    /// Split a full internal node. The middle key moves up instead of
    /// being copied, and the right node's children are reparented.
    fn insert_into_node_after_splitting(
        &mut self,
        old_id: NodeId,
        left_index: usize,
        key: IndexKey,
        right_id: NodeId,
    ) -> Result<(), IndexError> {
        let mut temp_keys = [[0u8; 8]; ORDER];
        let mut temp_children = [NO_NODE; ORDER + 1];
        {
            let old = &self.nodes[old_id as usize];
            let mut j = 0;
            for i in 0..old.key_count as usize + 1 {
                if j == left_index + 1 {
                    j += 1;
                }
                temp_children[j] = old.children[i];
                j += 1;
            }
            let mut j = 0;
            for i in 0..old.key_count as usize {
                if j == left_index {
                    j += 1;
                }
                temp_keys[j] = old.keys[i];
                j += 1;
            }
            temp_keys[left_index] = key;
            temp_children[left_index + 1] = right_id;
        }

        let split = (ORDER + 1) / 2;
        let old_parent = self.nodes[old_id as usize].parent;
        {
            let old = &mut self.nodes[old_id as usize];
            old.key_count = 0;
            for i in 0..split - 1 {
                old.keys[i] = temp_keys[i];
                old.children[i] = temp_children[i];
                old.key_count += 1;
            }
            old.children[split - 1] = temp_children[split - 1];
            for i in split - 1..MAX_KEYS {
                old.keys[i] = [0; 8];
            }
            for i in split..ORDER {
                old.children[i] = NO_NODE;
            }
        }

        let k_prime = temp_keys[split - 1];
        let new_id = self.alloc_node(false)?;
        {
            let new_node = &mut self.nodes[new_id as usize];
            let mut j = 0;
            for i in split..ORDER {
                new_node.keys[j] = temp_keys[i];
                new_node.children[j] = temp_children[i];
                j += 1;
            }
            new_node.children[j] = temp_children[ORDER];
            new_node.key_count = j as u8;
            new_node.parent = old_parent;
        }
        for i in 0..=self.nodes[new_id as usize].key_count as usize {
            let child = self.nodes[new_id as usize].children[i];
            self.nodes[child as usize].parent = new_id;
        }

        self.insert_into_parent(old_id, k_prime, new_id)
    }

    fn insert_into_new_root(
        &mut self,
        left_id: NodeId,
        key: IndexKey,
        right_id: NodeId,
    ) -> Result<(), IndexError> {
        let root_id = self.alloc_node(false)?;
        {
            let root = &mut self.nodes[root_id as usize];
            root.keys[0] = key;
            root.children[0] = left_id;
            root.children[1] = right_id;
            root.key_count = 1;
        }
        self.nodes[left_id as usize].parent = root_id;
        self.nodes[right_id as usize].parent = root_id;
        self.root = root_id;
        Ok(())
    }
}

impl Default for SearchTree {
    fn default() -> Self {
        Self::new()
    }
}
