use parking_lot::Mutex;

/// Destinations of every node in one host's node range, one lock per node.
///
/// Worker threads and the receive loop append concurrently; each append
/// holds exactly one node's lock.
pub struct LocalAdjacency {
    first_node: u64,
    dests: Vec<Mutex<Vec<u32>>>,
}

impl LocalAdjacency {
    /// Empty buffer for nodes `[first, end)`.
    pub fn new((first, end): (u64, u64)) -> Self {
        assert!(first <= end, "reversed node range {first}..{end}");
        LocalAdjacency {
            first_node: first,
            dests: (first..end).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    pub fn first_node(&self) -> u64 {
        self.first_node
    }

    pub fn num_nodes(&self) -> usize {
        self.dests.len()
    }

    pub fn local_index(&self, global: u64) -> usize {
        let end = self.first_node + self.dests.len() as u64;
        assert!(
            global >= self.first_node && global < end,
            "node {global} is not local to range {}..{end}",
            self.first_node
        );
        (global - self.first_node) as usize
    }

    pub fn push(&self, global_src: u64, dst: u32) {
        let local = self.local_index(global_src);
        self.dests[local].lock().push(dst);
    }

    pub fn extend(&self, global_src: u64, dsts: &[u32]) {
        let local = self.local_index(global_src);
        self.dests[local].lock().extend_from_slice(dsts);
    }

    pub fn num_edges(&self) -> u64 {
        self.dests.iter().map(|d| d.lock().len() as u64).sum()
    }

    /// Destinations of global node `node`, copied out.
    pub fn neighbors(&self, node: u64) -> Vec<u32> {
        self.dests[self.local_index(node)].lock().clone()
    }

    pub fn into_inner(self) -> Vec<Vec<u32>> {
        self.dests.into_iter().map(Mutex::into_inner).collect()
    }
}
