use super::EngineConfig;
use crate::zone::Position;
use ahash::AHashSet;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Result of one k-means run.
#[derive(Clone, Debug)]
struct Clustering {
    centers: Vec<Position>,
    inertia: f64,
}

/// Finds `k` centers partitioning `points`, best of `config.restarts` seeded
/// k-means runs. Falls back to `k` sampled input points when the data has
/// fewer than `k` distinct positions or clustering yields duplicate centers.
///
/// Requires `points.len() > k >= 1`.
pub fn discover_centers(points: &[Position], k: usize, config: &EngineConfig) -> Vec<Position> {
    let k = k.max(1);
    if distinct_count(points) < k {
        tracing::warn!(
            points = points.len(),
            k,
            "fewer distinct positions than teams, sampling centers from input"
        );
        return sample_centers(points, k, config.seed);
    }

    let restarts = config.restarts.max(1);
    let tolerance = scaled_tolerance(points, config.tolerance);

    let best = (0..restarts)
        .into_par_iter()
        .map(|restart| {
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(restart as u64));
            let clustering = lloyd(points, k, config.max_iterations, tolerance, &mut rng);
            (restart, clustering)
        })
        .collect::<Vec<_>>()
        .into_iter()
        .min_by(|(ra, a), (rb, b)| a.inertia.total_cmp(&b.inertia).then(ra.cmp(rb)));

    match best {
        Some((restart, clustering)) if distinct_count(&clustering.centers) == k => {
            tracing::debug!(restart, inertia = clustering.inertia, "k-means converged");
            clustering.centers
        }
        _ => {
            tracing::warn!(k, "k-means produced duplicate centers, sampling from input");
            sample_centers(points, k, config.seed)
        }
    }
}

/// `k` input positions chosen without replacement.
pub fn sample_centers(points: &[Position], k: usize, seed: u64) -> Vec<Position> {
    let mut rng = StdRng::seed_from_u64(seed);
    let amount = k.min(points.len());
    rand::seq::index::sample(&mut rng, points.len(), amount)
        .into_iter()
        .map(|i| points[i])
        .collect()
}

fn distinct_count(points: &[Position]) -> usize {
    points
        .iter()
        .map(|p| (OrderedFloat(p.x), OrderedFloat(p.y)))
        .collect::<AHashSet<_>>()
        .len()
}

/// Convergence threshold on total squared center shift, relative to the mean
/// per-axis variance of the data.
fn scaled_tolerance(points: &[Position], tolerance: f64) -> f64 {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
    let var_x = points.iter().map(|p| (p.x - mean_x).powi(2)).sum::<f64>() / n;
    let var_y = points.iter().map(|p| (p.y - mean_y).powi(2)).sum::<f64>() / n;
    (var_x + var_y) / 2.0 * tolerance
}

/// k-means++ seeding: first center uniform, then proportional to squared
/// distance from the nearest chosen center.
fn seed_centers(points: &[Position], k: usize, rng: &mut StdRng) -> Vec<Position> {
    let mut centers = Vec::with_capacity(k);
    centers.push(points[rng.random_range(0..points.len())]);

    let mut nearest: Vec<f64> = points.iter().map(|p| p.distance_sq(&centers[0])).collect();

    while centers.len() < k {
        let total: f64 = nearest.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (i, d) in nearest.iter().enumerate() {
                if *d > 0.0 && target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            // Rounding can leave `chosen` on an already-picked point.
            if nearest[chosen] == 0.0 {
                farthest(&nearest)
            } else {
                chosen
            }
        } else {
            rng.random_range(0..points.len())
        };

        let center = points[next];
        for (d, p) in nearest.iter_mut().zip(points) {
            *d = d.min(p.distance_sq(&center));
        }
        centers.push(center);
    }

    centers
}

fn farthest(nearest: &[f64]) -> usize {
    nearest
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn nearest_center(p: &Position, centers: &[Position]) -> (usize, f64) {
    let mut best_cluster = 0;
    let mut best_dist = f64::INFINITY;
    for (j, ctr) in centers.iter().enumerate() {
        let dist = p.distance_sq(ctr);
        if dist < best_dist {
            best_dist = dist;
            best_cluster = j;
        }
    }
    (best_cluster, best_dist)
}

fn lloyd(
    points: &[Position],
    k: usize,
    max_iterations: usize,
    tolerance: f64,
    rng: &mut StdRng,
) -> Clustering {
    let mut centers = seed_centers(points, k, rng);
    let mut assignments = vec![0usize; points.len()];

    for _iter in 0..max_iterations.max(1) {
        for (i, p) in points.iter().enumerate() {
            assignments[i] = nearest_center(p, &centers).0;
        }

        let mut sums = vec![[0.0, 0.0]; k];
        let mut counts = vec![0usize; k];
        for (i, p) in points.iter().enumerate() {
            let cluster = assignments[i];
            sums[cluster][0] += p.x;
            sums[cluster][1] += p.y;
            counts[cluster] += 1;
        }

        let mut new_centers = centers.clone();
        for j in 0..k {
            if counts[j] > 0 {
                new_centers[j] =
                    Position::new(sums[j][0] / counts[j] as f64, sums[j][1] / counts[j] as f64);
            }
        }
        relocate_empty(points, &counts, &mut new_centers);

        let shift: f64 = centers
            .iter()
            .zip(&new_centers)
            .map(|(a, b)| a.distance_sq(b))
            .sum();
        centers = new_centers;

        if shift <= tolerance {
            break;
        }
    }

    let inertia = points.iter().map(|p| nearest_center(p, &centers).1).sum();
    Clustering { centers, inertia }
}

/// Moves centers of empty clusters onto the points worst served by the
/// current centers.
fn relocate_empty(points: &[Position], counts: &[usize], centers: &mut [Position]) {
    let empty: Vec<usize> = (0..counts.len()).filter(|&j| counts[j] == 0).collect();
    if empty.is_empty() {
        return;
    }

    let mut by_distance: Vec<(usize, f64)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, nearest_center(p, centers).1))
        .collect();
    by_distance.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    for (j, (i, _)) in empty.into_iter().zip(by_distance) {
        centers[j] = points[i];
    }
}
