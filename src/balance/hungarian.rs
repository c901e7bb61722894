//! Exact minimum-cost assignment (Kuhn-Munkres with row/column potentials).
//!
//! Runs in O(n^2 m) for an `n x m` matrix with `n <= m`, which is cubic for the
//! square zone-by-slot matrices the balancer builds.

/// Row-major cost matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct CostMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl CostMatrix {
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        Some(Self {
            rows: rows.len(),
            cols,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Sum of the costs picked by `assignment[row] = col`.
    pub fn total(&self, assignment: &[usize]) -> f64 {
        assignment
            .iter()
            .enumerate()
            .map(|(row, &col)| self.get(row, col))
            .sum()
    }
}

/// Assigns every row to a distinct column minimising the summed cost.
///
/// Returns `assignment[row] = col`, or `None` when no perfect matching of the
/// rows exists: more rows than columns, or a non-finite cost.
pub fn solve(cost: &CostMatrix) -> Option<Vec<usize>> {
    let n = cost.rows();
    let m = cost.cols();
    if n == 0 {
        return Some(Vec::new());
    }
    if n > m || cost.data.iter().any(|c| !c.is_finite()) {
        return None;
    }

    // 1-indexed; row/column 0 is the virtual root of each augmenting search.
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    let mut matched_row = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for row in 1..=n {
        matched_row[0] = row;
        let mut j0 = 0usize;
        let mut min_v = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = matched_row[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost.get(i0 - 1, j - 1) - u[i0] - v[j];
                if reduced < min_v[j] {
                    min_v[j] = reduced;
                    way[j] = j0;
                }
                if min_v[j] < delta {
                    delta = min_v[j];
                    j1 = j;
                }
            }

            if j1 == 0 {
                return None;
            }

            for j in 0..=m {
                if used[j] {
                    u[matched_row[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_v[j] -= delta;
                }
            }

            j0 = j1;
            if matched_row[j0] == 0 {
                break;
            }
        }

        // Flip the alternating path back to the root.
        loop {
            let j1 = way[j0];
            matched_row[j0] = matched_row[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![usize::MAX; n];
    for j in 1..=m {
        if matched_row[j] != 0 {
            assignment[matched_row[j] - 1] = j - 1;
        }
    }

    if assignment.iter().any(|&c| c == usize::MAX) {
        return None;
    }
    Some(assignment)
}
