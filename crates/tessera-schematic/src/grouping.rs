//! Partitioning captured entities into restoration groups.
//!
//! Entity `i` depends on entity `j` when one of `i`'s patches references
//! `j`. Entities that reach each other through references must be created
//! together, because each needs the other's new id before its patches can be
//! applied. One-way references only constrain order.
//!
//! [`group_dependencies`] builds the partition in two passes over a
//! union-find:
//!
//! 1. every directly mutual pair is merged;
//! 2. cycles that span more than two groups are found with Tarjan's
//!    strongly-connected-components pass over the group graph and merged too.
//!
//! [`GroupScheduler`] then hands groups out in an order where each group's
//! external dependencies are already loaded, forcing the rest once no such
//! group is left.
//!
//! All indices here are 0-based positions in the schematic's entity list.

use std::collections::{BinaryHeap, HashMap, HashSet};

// ---------------------------------------------------------------------------
// DisjointSet
// ---------------------------------------------------------------------------

/// Union-find with path compression and union by rank.
#[derive(Debug, Clone)]
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// One restoration group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Member entities, ascending.
    pub members: Vec<usize>,
    /// Dependencies of the members that lie outside the group, ascending.
    /// May include indices that name no entity; those are never satisfied.
    pub external: Vec<usize>,
}

impl Group {
    /// The highest member index.
    pub fn max_member(&self) -> usize {
        self.members.last().copied().unwrap_or(0)
    }
}

/// A partition of the schematic's entities into groups.
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    groups: Vec<Group>,
    group_of: Vec<usize>,
}

impl Grouping {
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, group: usize) -> Option<&Group> {
        self.groups.get(group)
    }

    /// The group containing `entity`.
    pub fn group_of(&self, entity: usize) -> Option<usize> {
        self.group_of.get(entity).copied()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn entity_count(&self) -> usize {
        self.group_of.len()
    }
}

/// Partition entities `0..deps.len()` so that mutually reachable entities
/// share a group.
///
/// Self references and references to indices `>= deps.len()` never cause a
/// merge.
pub fn group_dependencies(deps: &[Vec<usize>]) -> Grouping {
    let n = deps.len();
    let mut sets = DisjointSet::new(n);

    // Pass 1: direct mutual references.
    let dep_sets: Vec<HashSet<usize>> = deps.iter().map(|d| d.iter().copied().collect()).collect();
    for (i, row) in deps.iter().enumerate() {
        for &j in row {
            if j < n && j != i && dep_sets[j].contains(&i) {
                sets.union(i, j);
            }
        }
    }

    // Pass 2: longer cycles across the groups formed so far.
    let mut roots: Vec<usize> = (0..n).map(|i| sets.find(i)).collect();
    let mut node_of_root: HashMap<usize, usize> = HashMap::new();
    let mut root_of_node: Vec<usize> = Vec::new();
    for &root in &roots {
        node_of_root.entry(root).or_insert_with(|| {
            root_of_node.push(root);
            root_of_node.len() - 1
        });
    }
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); root_of_node.len()];
    for (i, row) in deps.iter().enumerate() {
        let from = node_of_root[&roots[i]];
        for &j in row {
            if j < n {
                let to = node_of_root[&roots[j]];
                if to != from {
                    adjacency[from].push(to);
                }
            }
        }
    }
    for component in strongly_connected(&adjacency) {
        if let Some((&first, rest)) = component.split_first() {
            for &other in rest {
                sets.union(root_of_node[first], root_of_node[other]);
            }
        }
    }

    // Build groups, numbered by their lowest member.
    roots = (0..n).map(|i| sets.find(i)).collect();
    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    let mut group_of = vec![0; n];
    for (i, &root) in roots.iter().enumerate() {
        let group = *group_of_root.entry(root).or_insert_with(|| {
            groups.push(Group {
                members: Vec::new(),
                external: Vec::new(),
            });
            groups.len() - 1
        });
        groups[group].members.push(i);
        group_of[i] = group;
    }
    for (index, group) in groups.iter_mut().enumerate() {
        let mut external: Vec<usize> = group
            .members
            .iter()
            .flat_map(|&m| deps[m].iter().copied())
            .filter(|&d| d >= n || group_of[d] != index)
            .collect();
        external.sort_unstable();
        external.dedup();
        group.external = external;
    }

    Grouping { groups, group_of }
}

const UNVISITED: usize = usize::MAX;

/// Tarjan's SCC, iterative so deep reference chains cannot overflow the
/// stack.
fn strongly_connected(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0;
    let mut components = Vec::new();

    for start in 0..n {
        if index[start] != UNVISITED {
            continue;
        }
        index[start] = next_index;
        low[start] = next_index;
        next_index += 1;
        stack.push(start);
        on_stack[start] = true;
        let mut calls: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(frame) = calls.last_mut() {
            let v = frame.0;
            if frame.1 < adjacency[v].len() {
                let w = adjacency[v][frame.1];
                frame.1 += 1;
                if index[w] == UNVISITED {
                    index[w] = next_index;
                    low[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    calls.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
                continue;
            }

            calls.pop();
            if let Some(&(parent, _)) = calls.last() {
                low[parent] = low[parent].min(low[v]);
            }
            if low[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }
    components
}

// ---------------------------------------------------------------------------
// GroupScheduler
// ---------------------------------------------------------------------------

/// A group handed out by [`GroupScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledGroup {
    pub group: usize,
    /// Whether the group was released with dependencies still unloaded.
    pub forced: bool,
}

/// Yields every group exactly once, dependencies first.
///
/// Among ready groups the one with the highest member goes first. When no
/// group is ready (an external dependency names an entity that does not
/// exist), the remaining group with the highest member is forced out.
/// A group counts as loaded as soon as it is yielded.
#[derive(Debug, Clone)]
pub struct GroupScheduler {
    grouping: Grouping,
    loaded: Vec<bool>,
    /// Unloaded external dependencies per group.
    pending: Vec<usize>,
    /// Groups depending on each entity.
    dependents: Vec<Vec<usize>>,
    ready: BinaryHeap<(usize, usize)>,
    /// All groups, highest member first, for forcing.
    by_priority: Vec<usize>,
    force_cursor: usize,
    remaining: usize,
}

impl GroupScheduler {
    pub fn new(grouping: Grouping) -> Self {
        let n = grouping.entity_count();
        let count = grouping.len();
        let mut pending = vec![0; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut ready = BinaryHeap::new();
        for (index, group) in grouping.groups().iter().enumerate() {
            pending[index] = group.external.len();
            for &dep in &group.external {
                if dep < n {
                    dependents[dep].push(index);
                }
            }
            if pending[index] == 0 {
                ready.push((group.max_member(), index));
            }
        }
        let mut by_priority: Vec<usize> = (0..count).collect();
        by_priority.sort_by_key(|&g| std::cmp::Reverse(grouping.groups()[g].max_member()));

        Self {
            grouping,
            loaded: vec![false; count],
            pending,
            dependents,
            ready,
            by_priority,
            force_cursor: 0,
            remaining: count,
        }
    }

    pub fn grouping(&self) -> &Grouping {
        &self.grouping
    }

    /// Groups not yet handed out.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Whether every member of `group` has been handed out.
    pub fn is_loaded(&self, group: usize) -> bool {
        self.loaded.get(group).copied().unwrap_or(false)
    }

    fn mark_loaded(&mut self, group: usize) {
        self.loaded[group] = true;
        self.remaining -= 1;
        let members = self.grouping.groups[group].members.clone();
        for member in members {
            for &dependent in &self.dependents[member] {
                self.pending[dependent] -= 1;
                if self.pending[dependent] == 0 && !self.loaded[dependent] {
                    let priority = self.grouping.groups[dependent].max_member();
                    self.ready.push((priority, dependent));
                }
            }
        }
    }
}

impl Iterator for GroupScheduler {
    type Item = ScheduledGroup;

    fn next(&mut self) -> Option<ScheduledGroup> {
        while let Some((_, group)) = self.ready.pop() {
            if !self.loaded[group] {
                self.mark_loaded(group);
                return Some(ScheduledGroup {
                    group,
                    forced: false,
                });
            }
        }
        while self.force_cursor < self.by_priority.len() {
            let group = self.by_priority[self.force_cursor];
            self.force_cursor += 1;
            if !self.loaded[group] {
                self.mark_loaded(group);
                return Some(ScheduledGroup {
                    group,
                    forced: true,
                });
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn members(grouping: &Grouping) -> Vec<Vec<usize>> {
        grouping.groups().iter().map(|g| g.members.clone()).collect()
    }

    fn order(grouping: Grouping) -> Vec<(Vec<usize>, bool)> {
        let groups = grouping.groups().to_vec();
        GroupScheduler::new(grouping)
            .map(|s| (groups[s.group].members.clone(), s.forced))
            .collect()
    }

    #[test]
    fn independent_entities_stay_alone() {
        let grouping = group_dependencies(&[vec![], vec![], vec![]]);
        assert_eq!(members(&grouping), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn mutual_pair_merges_one_way_does_not() {
        // 0 <-> 2, 1 -> 0
        let grouping = group_dependencies(&[vec![2], vec![0], vec![0]]);
        assert_eq!(members(&grouping), vec![vec![0, 2], vec![1]]);
        assert_eq!(grouping.groups()[1].external, vec![0]);
        assert!(grouping.groups()[0].external.is_empty());
    }

    #[test]
    fn three_cycle_is_one_group() {
        let grouping = group_dependencies(&[vec![1], vec![2], vec![0], vec![]]);
        assert_eq!(members(&grouping), vec![vec![0, 1, 2], vec![3]]);
    }

    #[test]
    fn self_and_out_of_range_refs_never_merge() {
        let grouping = group_dependencies(&[vec![0], vec![9]]);
        assert_eq!(members(&grouping), vec![vec![0], vec![1]]);
        assert_eq!(grouping.groups()[1].external, vec![9]);
    }

    #[test]
    fn scheduler_respects_one_way_order() {
        // 2 -> 1 -> 0: 0 first, despite having the lowest index.
        let grouping = group_dependencies(&[vec![], vec![0], vec![1]]);
        assert_eq!(
            order(grouping),
            vec![(vec![0], false), (vec![1], false), (vec![2], false)]
        );
    }

    #[test]
    fn scheduler_prefers_highest_ready_group() {
        let grouping = group_dependencies(&[vec![], vec![], vec![]]);
        assert_eq!(
            order(grouping),
            vec![(vec![2], false), (vec![1], false), (vec![0], false)]
        );
    }

    #[test]
    fn unsatisfiable_dependency_is_forced_last() {
        // 1 depends on an entity that does not exist; 0 depends on 1.
        let grouping = group_dependencies(&[vec![1], vec![7], vec![]]);
        assert_eq!(
            order(grouping),
            vec![(vec![2], false), (vec![1], true), (vec![0], false)]
        );
    }

    #[test]
    fn deep_chain_does_not_recurse() {
        let n = 50_000;
        let deps: Vec<Vec<usize>> = (0..n).map(|i| vec![(i + 1) % n]).collect();
        let grouping = group_dependencies(&deps);
        assert_eq!(grouping.len(), 1);
        assert_eq!(grouping.groups()[0].members.len(), n);
    }
}
