/*!
# Source grouping.

Sources whose data ranges overlap cannot have their amplitude responses measured in the same
projection pass. [`independent_groups`] clusters sources that share data with a seed source;
no data is shared *between* clusters. [`batch_slots`] then transposes the clusters: slot `i`
holds the `i`-th member of every cluster, and all members of a slot can be activated together
in one forward/backward evaluation.

The clustering is a single greedy pass. A source joins a cluster only if it touches a range of
that cluster's seed, so chains of overlaps (A–B, B–C, but not A–C) can still put B and C into
different clusters. That case is rare for well separated catalogs and is accepted.
*/

use crate::dof::Dof;
use crate::scan::ScanData;

/// Greedy clusters of sources sharing data ranges.
pub fn independent_groups<S: ScanData>(scan: &S) -> Vec<Vec<usize>> {
    let n = scan.n_src();
    let mut assigned = vec![false; n];
    let mut groups = Vec::new();
    for seed in 0..n {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut marked = vec![false; scan.n_ranges()];
        for &ri in scan.source_ranges(seed) {
            marked[ri] = true;
        }
        let mut group = vec![seed];
        for si in seed + 1..n {
            if !assigned[si] && scan.source_ranges(si).iter().any(|&ri| marked[ri]) {
                assigned[si] = true;
                group.push(si);
            }
        }
        groups.push(group);
    }
    groups
}

/// Slot `i` holds the `i`-th member of every group that has one.
pub fn batch_slots(groups: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let depth = groups.iter().map(Vec::len).max().unwrap_or(0);
    (0..depth)
        .map(|i| groups.iter().filter_map(|g| g.get(i).copied()).collect())
        .collect()
}

/// Flat DOF indices of every group's masked entries, source-major then component-minor.
/// Groups with no masked entries are dropped.
pub fn groups_to_dof(groups: &[Vec<usize>], dof: &Dof) -> Vec<Vec<usize>> {
    let index = dof.index_map();
    groups
        .iter()
        .map(|g| {
            g.iter()
                .flat_map(|&si| index.row(si).iter().flatten().copied().collect::<Vec<_>>())
                .collect::<Vec<_>>()
        })
        .filter(|g| !g.is_empty())
        .collect()
}

/// Whether sources `a` and `b` contribute to a common range.
pub fn shares_range<S: ScanData>(scan: &S, a: usize, b: usize) -> bool {
    let ra = scan.source_ranges(a);
    scan.source_ranges(b).iter().any(|ri| ra.contains(ri))
}
