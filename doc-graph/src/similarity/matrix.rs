//! Pairwise score matrix, normalization, thresholding and clustering

use crate::config::MatrixNormalization;
use serde::Serialize;

/// Symmetric N×N score matrix with a unit diagonal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreMatrix {
    paths: Vec<String>,
    scores: Vec<f64>,
}

/// Documents connected by similarity edges at or above a threshold.
///
/// Clustering is transitive: members only need a chain of qualifying edges,
/// not pairwise similarity. `chained` discloses when some member pair scores
/// below the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    /// Sorted
    pub members: Vec<String>,
    pub min_pairwise: f64,
    pub max_pairwise: f64,
    pub chained: bool,
}

impl ScoreMatrix {
    /// Identity matrix over `paths`
    pub fn new(paths: Vec<String>) -> Self {
        let n = paths.len();
        let mut scores = vec![0.0; n * n];
        for i in 0..n {
            scores[i * n + i] = 1.0;
        }
        Self { paths, scores }
    }

    /// Fill the upper triangle with `score(i, j)` and mirror it
    pub fn from_fn(paths: Vec<String>, mut score: impl FnMut(usize, usize) -> f64) -> Self {
        let mut matrix = Self::new(paths);
        let n = matrix.len();
        for i in 0..n {
            for j in (i + 1)..n {
                matrix.set(i, j, score(i, j));
            }
        }
        matrix
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.scores[i * self.len() + j]
    }

    /// Set both `(i, j)` and `(j, i)`; the diagonal stays 1
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        if i == j {
            return;
        }
        let n = self.len();
        let value = value.clamp(0.0, 1.0);
        self.scores[i * n + j] = value;
        self.scores[j * n + i] = value;
    }

    fn off_diagonal(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let n = self.len();
        (0..n).flat_map(move |i| ((i + 1)..n).map(move |j| (i, j, self.get(i, j))))
    }

    /// Rescale off-diagonal scores. Exact duplicates (raw 1.0) stay at 1 so
    /// normalization never demotes them; a constant matrix is returned as is.
    pub fn normalized(&self, mode: MatrixNormalization) -> Self {
        let values: Vec<f64> = self.off_diagonal().map(|(_, _, v)| v).collect();
        if values.is_empty() {
            return self.clone();
        }
        let mut out = self.clone();
        match mode {
            MatrixNormalization::None => {}
            MatrixNormalization::MinMax => {
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if max > min {
                    for (i, j, v) in self.off_diagonal() {
                        let scaled = if v >= 1.0 { 1.0 } else { (v - min) / (max - min) };
                        out.set(i, j, scaled);
                    }
                }
            }
            MatrixNormalization::ZScore => {
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
                if std > 0.0 {
                    for (i, j, v) in self.off_diagonal() {
                        let scaled = if v >= 1.0 {
                            1.0
                        } else {
                            sigmoid((v - mean) / std)
                        };
                        out.set(i, j, scaled);
                    }
                }
            }
        }
        out
    }

    /// Copy with every off-diagonal entry below `cutoff` set to 0
    pub fn thresholded(&self, cutoff: f64) -> Self {
        let mut out = self.clone();
        for (i, j, v) in self.off_diagonal() {
            if v < cutoff {
                out.set(i, j, 0.0);
            }
        }
        out
    }

    /// Connected components over edges scoring `>= threshold`; singletons
    /// are not reported. Clusters are ordered by their first member.
    pub fn clusters(&self, threshold: f64) -> Vec<Cluster> {
        let n = self.len();
        let mut sets = DisjointSets::new(n);
        for (i, j, v) in self.off_diagonal() {
            if v >= threshold {
                sets.union(i, j);
            }
        }

        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n];
        for i in 0..n {
            let root = sets.find(i);
            groups[root].push(i);
        }

        let mut clusters: Vec<Cluster> = groups
            .into_iter()
            .filter(|g| g.len() > 1)
            .map(|members| {
                let mut min = f64::INFINITY;
                let mut max = f64::NEG_INFINITY;
                for (a, &i) in members.iter().enumerate() {
                    for &j in &members[a + 1..] {
                        let v = self.get(i, j);
                        min = min.min(v);
                        max = max.max(v);
                    }
                }
                let mut names: Vec<String> =
                    members.iter().map(|&i| self.paths[i].clone()).collect();
                names.sort();
                Cluster {
                    members: names,
                    min_pairwise: min,
                    max_pairwise: max,
                    chained: min < threshold,
                }
            })
            .collect();
        clusters.sort_by(|a, b| a.members.cmp(&b.members));
        clusters
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Union-find with path halving
#[derive(Debug)]
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Lower index wins so roots are stable
            let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[merge] = keep;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paths(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    /// a~b 0.9, b~c 0.9, a~c 0.5, d isolated
    fn chain() -> ScoreMatrix {
        ScoreMatrix::from_fn(paths(&["a", "b", "c", "d"]), |i, j| match (i, j) {
            (0, 1) | (1, 2) => 0.9,
            (0, 2) => 0.5,
            _ => 0.1,
        })
    }

    #[test]
    fn test_empty_matrix() {
        let m = ScoreMatrix::new(Vec::new());
        assert!(m.is_empty());
        assert!(m.clusters(0.5).is_empty());
        assert_eq!(m.normalized(MatrixNormalization::ZScore), m);
    }

    #[test]
    fn test_symmetric_with_unit_diagonal() {
        let m = chain();
        for i in 0..m.len() {
            assert_eq!(m.get(i, i), 1.0);
            for j in 0..m.len() {
                assert_eq!(m.get(i, j), m.get(j, i));
            }
        }
    }

    #[test]
    fn test_transitive_cluster_is_flagged_chained() {
        let clusters = chain().clusters(0.85);
        assert_eq!(
            clusters,
            vec![Cluster {
                members: paths(&["a", "b", "c"]),
                min_pairwise: 0.5,
                max_pairwise: 0.9,
                chained: true,
            }]
        );
    }

    #[test]
    fn test_threshold_monotonic() {
        let m = chain();
        let mut previous = usize::MAX;
        for threshold in [0.0, 0.1, 0.5, 0.9, 0.95, 1.0] {
            let clustered: usize = m.clusters(threshold).iter().map(|c| c.members.len()).sum();
            assert!(clustered <= previous, "threshold {threshold}");
            previous = clustered;
        }
        assert!(m.clusters(0.95).is_empty());
    }

    #[test]
    fn test_thresholded_zeroes_below_cutoff() {
        let m = chain().thresholded(0.85);
        assert_eq!(m.get(0, 1), 0.9);
        assert_eq!(m.get(0, 2), 0.0);
        assert_eq!(m.get(2, 2), 1.0);
    }

    #[test]
    fn test_min_max_normalization() {
        let m = chain().normalized(MatrixNormalization::MinMax);
        assert_eq!(m.get(0, 1), 1.0);
        assert_eq!(m.get(0, 3), 0.0);
        assert_eq!(m.get(1, 1), 1.0);
    }

    #[test]
    fn test_z_score_normalization_keeps_order_and_duplicates() {
        let m = ScoreMatrix::from_fn(paths(&["a", "b", "c"]), |i, j| match (i, j) {
            (0, 1) => 1.0,
            (0, 2) => 0.6,
            _ => 0.2,
        });
        let z = m.normalized(MatrixNormalization::ZScore);
        assert_eq!(z.get(0, 1), 1.0);
        assert!(z.get(0, 2) > z.get(1, 2));
        for i in 0..3 {
            for j in 0..3 {
                assert!((0.0..=1.0).contains(&z.get(i, j)));
            }
        }
    }

    #[test]
    fn test_constant_matrix_is_unchanged_by_normalization() {
        let m = ScoreMatrix::from_fn(paths(&["a", "b", "c"]), |_, _| 0.4);
        assert_eq!(m.normalized(MatrixNormalization::MinMax), m);
        assert_eq!(m.normalized(MatrixNormalization::ZScore), m);
    }
}
