use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Directed edge between two layout boxes, by id.
pub(super) type RankEdge = (String, String);

pub(super) fn order_rank_nodes(
    rank_nodes: &mut [Vec<String>],
    edges: &[RankEdge],
    node_order: &HashMap<String, usize>,
    passes: usize,
) {
    if rank_nodes.len() <= 1 {
        return;
    }
    let mut incoming: HashMap<String, Vec<String>> = HashMap::new();
    let mut outgoing: HashMap<String, Vec<String>> = HashMap::new();

    for (from, to) in edges {
        outgoing.entry(from.clone()).or_default().push(to.clone());
        incoming.entry(to.clone()).or_default().push(from.clone());
    }

    let mut positions: HashMap<String, usize> = HashMap::new();
    let update_positions = |rank_nodes: &mut [Vec<String>],
                            positions: &mut HashMap<String, usize>| {
        positions.clear();
        for bucket in rank_nodes.iter() {
            for (idx, node_id) in bucket.iter().enumerate() {
                positions.insert(node_id.clone(), idx);
            }
        }
    };

    update_positions(rank_nodes, &mut positions);

    let sort_bucket = |bucket: &mut Vec<String>,
                       neighbors: &HashMap<String, Vec<String>>,
                       positions: &HashMap<String, usize>| {
        let current_positions: HashMap<String, usize> = bucket
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();
        let declared = |id: &str| node_order.get(id).copied().unwrap_or(usize::MAX);
        bucket.sort_by(|a, b| {
            let a_score = median_position(a, neighbors, positions, &current_positions);
            let b_score = median_position(b, neighbors, positions, &current_positions);
            a_score
                .total_cmp(&b_score)
                .then_with(|| current_positions.get(a).cmp(&current_positions.get(b)))
                .then_with(|| declared(a).cmp(&declared(b)))
        });
    };

    for _ in 0..passes.max(1) {
        for rank in 1..rank_nodes.len() {
            if rank_nodes[rank].len() <= 1 {
                continue;
            }
            sort_bucket(&mut rank_nodes[rank], &incoming, &positions);
            update_positions(rank_nodes, &mut positions);
        }
        for rank in (0..rank_nodes.len().saturating_sub(1)).rev() {
            if rank_nodes[rank].len() <= 1 {
                continue;
            }
            sort_bucket(&mut rank_nodes[rank], &outgoing, &positions);
            update_positions(rank_nodes, &mut positions);
        }
    }
}

pub(super) fn median_position(
    node_id: &str,
    neighbors: &HashMap<String, Vec<String>>,
    positions: &HashMap<String, usize>,
    current_positions: &HashMap<String, usize>,
) -> f32 {
    let fallback = || current_positions.get(node_id).copied().unwrap_or(0) as f32;
    let Some(list) = neighbors.get(node_id) else {
        return fallback();
    };
    let mut values: Vec<f32> = list
        .iter()
        .filter_map(|neighbor| positions.get(neighbor))
        .map(|pos| *pos as f32)
        .collect();
    if values.is_empty() {
        return fallback();
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) * 0.5
    }
}

/// Longest-path ranks over `node_ids`. Cycles are broken at the remaining
/// node that was declared first; its unprocessed incoming edges are ignored.
pub(super) fn compute_ranks(
    node_ids: &[String],
    edges: &[RankEdge],
    node_order: &HashMap<String, usize>,
) -> HashMap<String, usize> {
    let set: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indeg: HashMap<&str, usize> = set.iter().map(|id| (*id, 0)).collect();

    for (from, to) in edges {
        if from == to || !set.contains(from.as_str()) || !set.contains(to.as_str()) {
            continue;
        }
        adj.entry(from.as_str()).or_default().push(to.as_str());
        if let Some(deg) = indeg.get_mut(to.as_str()) {
            *deg += 1;
        }
    }

    let fallback_order: HashMap<&str, usize> = node_ids
        .iter()
        .enumerate()
        .map(|(idx, id)| (id.as_str(), idx))
        .collect();
    let order_key = |id: &str| -> usize {
        node_order
            .get(id)
            .copied()
            .or_else(|| fallback_order.get(id).copied())
            .unwrap_or(usize::MAX)
    };

    let mut ready: BinaryHeap<Reverse<(usize, &str)>> = BinaryHeap::new();
    for id in node_ids {
        if indeg.get(id.as_str()).copied().unwrap_or(0) == 0 {
            ready.push(Reverse((order_key(id), id.as_str())));
        }
    }

    let mut order: Vec<&str> = Vec::with_capacity(set.len());
    let mut processed: HashSet<&str> = HashSet::new();
    loop {
        while let Some(Reverse((_key, id))) = ready.pop() {
            if !processed.insert(id) {
                continue;
            }
            order.push(id);
            for next in adj.get(id).into_iter().flatten() {
                if processed.contains(next) {
                    continue;
                }
                if let Some(deg) = indeg.get_mut(next) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(Reverse((order_key(next), *next)));
                    }
                }
            }
        }

        if processed.len() >= set.len() {
            break;
        }

        let next_source = node_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !processed.contains(id))
            .min_by_key(|id| order_key(id));
        match next_source {
            Some(id) => ready.push(Reverse((order_key(id), id))),
            None => break,
        }
    }

    let order_index: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(idx, id)| (*id, idx))
        .collect();

    let mut ranks: HashMap<String, usize> = HashMap::new();
    for node in &order {
        let rank = *ranks.entry(node.to_string()).or_insert(0);
        let from_idx = order_index.get(node).copied().unwrap_or(0);
        for next in adj.get(node).into_iter().flatten() {
            let to_idx = order_index.get(next).copied().unwrap_or(from_idx);
            if to_idx <= from_idx {
                continue;
            }
            let entry = ranks.entry(next.to_string()).or_insert(0);
            *entry = (*entry).max(rank + 1);
        }
    }

    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn edges(items: &[(&str, &str)]) -> Vec<RankEdge> {
        items
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    fn order_of(node_ids: &[String]) -> HashMap<String, usize> {
        node_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect()
    }

    #[test]
    fn chain_gets_increasing_ranks() {
        let nodes = ids(&["a", "b", "c"]);
        let ranks = compute_ranks(&nodes, &edges(&[("a", "b"), ("b", "c")]), &order_of(&nodes));
        assert_eq!(ranks["a"], 0);
        assert_eq!(ranks["b"], 1);
        assert_eq!(ranks["c"], 2);
    }

    #[test]
    fn longest_path_wins() {
        let nodes = ids(&["a", "b", "c"]);
        let ranks = compute_ranks(
            &nodes,
            &edges(&[("a", "c"), ("a", "b"), ("b", "c")]),
            &order_of(&nodes),
        );
        assert_eq!(ranks["c"], 2);
    }

    #[test]
    fn cycle_is_broken_at_first_declared_node() {
        let nodes = ids(&["a", "b", "c"]);
        let ranks = compute_ranks(
            &nodes,
            &edges(&[("a", "b"), ("b", "c"), ("c", "a")]),
            &order_of(&nodes),
        );
        assert_eq!(ranks.len(), 3);
        assert_eq!(ranks["a"], 0);
        assert_eq!(ranks["c"], 2);
    }

    #[test]
    fn disconnected_nodes_rank_zero() {
        let nodes = ids(&["a", "b"]);
        let ranks = compute_ranks(&nodes, &[], &order_of(&nodes));
        assert_eq!(ranks["a"], 0);
        assert_eq!(ranks["b"], 0);
    }

    #[test]
    fn ordering_reduces_crossings() {
        let nodes = ids(&["a", "b", "x", "y"]);
        let mut buckets = vec![ids(&["a", "b"]), ids(&["y", "x"])];
        order_rank_nodes(
            &mut buckets,
            &edges(&[("a", "x"), ("b", "y")]),
            &order_of(&nodes),
            4,
        );
        assert_eq!(buckets[1], ids(&["x", "y"]));
    }
}
