//! A static 3-D k-d tree for nearest-neighbour queries over face centroids.

/// Nearest-neighbour index over a fixed point set.
///
/// Built once, queried many times; stores indices into the original slice.
#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<[f32; 3]>,
    nodes: Vec<Node>,
    root: Option<usize>,
}

#[derive(Debug, Clone)]
struct Node {
    point: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

impl KdTree {
    pub fn build(points: &[[f32; 3]]) -> Self {
        let mut tree = Self {
            points: points.to_vec(),
            nodes: Vec::with_capacity(points.len()),
            root: None,
        };
        let mut indices: Vec<usize> = (0..points.len()).collect();
        tree.root = tree.build_node(&mut indices, 0);
        tree
    }

    fn build_node(&mut self, indices: &mut [usize], depth: usize) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }
        let axis = depth % 3;
        let points = &self.points;
        indices.sort_unstable_by(|&a, &b| points[a][axis].total_cmp(&points[b][axis]));
        let mid = indices.len() / 2;
        let point = indices[mid];

        let (left_slice, rest) = indices.split_at_mut(mid);
        let right_slice = &mut rest[1..];
        let left = self.build_node(left_slice, depth + 1);
        let right = self.build_node(right_slice, depth + 1);

        self.nodes.push(Node {
            point,
            axis,
            left,
            right,
        });
        Some(self.nodes.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index and squared distance of the point nearest to `query`.
    pub fn nearest(&self, query: [f32; 3]) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        self.search(self.root, query, &mut best);
        best
    }

    fn search(&self, node: Option<usize>, query: [f32; 3], best: &mut Option<(usize, f32)>) {
        let Some(node) = node.map(|i| &self.nodes[i]) else {
            return;
        };
        let p = self.points[node.point];
        let dist = distance_sq(p, query);
        if best.map_or(true, |(_, d)| dist < d) {
            *best = Some((node.point, dist));
        }

        let delta = query[node.axis] - p[node.axis];
        let (near, far) = if delta < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        self.search(near, query, best);
        if best.map_or(true, |(_, d)| delta * delta < d) {
            self.search(far, query, best);
        }
    }
}

pub(crate) fn distance_sq(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::build(&[]);
        assert!(tree.is_empty());
        assert_eq!(tree.nearest([0.0; 3]), None);
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        let points: Vec<[f32; 3]> = (0..300)
            .map(|_| [rng.random(), rng.random(), rng.random()])
            .collect();
        let tree = KdTree::build(&points);
        assert_eq!(tree.len(), 300);

        for _ in 0..50 {
            let query = [rng.random(), rng.random(), rng.random()];
            let (_, got) = tree.nearest(query).unwrap();
            let want = points
                .iter()
                .map(|&p| distance_sq(p, query))
                .fold(f32::INFINITY, f32::min);
            assert_eq!(got, want);
        }
    }
}
