//! Balanced assignment of zones to field teams.
//!
//! Three stages run in order with no feedback: the slot planner fixes how many
//! zones each team receives, k-means finds one geographic center per team, and
//! an exact assignment solve matches every zone to a slot so the quotas hold
//! exactly while the summed zone-to-center distance is minimal for those
//! centers.
//!
//! Positions must already be in a metric projection (see [`crate::projection`]);
//! raw latitude/longitude is not detected.

pub mod centers;
pub mod hungarian;
pub mod report;
pub mod slots;

#[cfg(test)]
mod test_balance;

use crate::zone::{LabeledZone, Position, TeamId, Zone, ZoneId};
use ahash::AHashSet;
use hungarian::CostMatrix;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BalanceError {
    #[error("zone id {id} appears more than once")]
    DuplicateZoneId { id: ZoneId },
    #[error("zone {id} has a non-finite position ({x}, {y})")]
    NonFinitePosition { id: ZoneId, x: f64, y: f64 },
    /// A square zone-by-slot matrix always admits a perfect matching, so this
    /// signals a bug in matrix construction.
    #[error("no perfect matching between {zones} zones and {slots} slots")]
    AssignmentInfeasible { zones: usize, slots: usize },
}

/// Tuning for center discovery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base seed; restart `r` uses `seed + r`.
    pub seed: u64,
    pub restarts: usize,
    pub max_iterations: usize,
    /// Relative center-shift threshold for stopping a k-means run.
    pub tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            restarts: 20,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

/// Which path produced a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    /// At most one zone per team; zones numbered 1..=N in input order.
    Degenerate,
    /// Every zone carried a pre-assigned team.
    Fixed,
    /// Computed by center discovery and optimal assignment.
    Optimized,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssignmentPlan {
    /// Labeled zones, in input order.
    pub zones: Vec<LabeledZone>,
    pub mode: AssignmentMode,
    /// Team centers indexed by team id - 1; empty unless optimized.
    pub centers: Vec<Position>,
    /// Summed zone-to-center distance; zero unless optimized.
    pub total_cost: f64,
}

#[derive(Clone, Debug, Default)]
pub struct BalancedAssigner {
    config: EngineConfig,
}

impl BalancedAssigner {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn assign(&self, zones: Vec<Zone>, team_count: usize) -> Result<Vec<LabeledZone>, BalanceError> {
        self.plan(zones, team_count).map(|plan| plan.zones)
    }

    #[tracing::instrument(name = "balanced_plan", skip(self, zones), fields(zones = zones.len()))]
    pub fn plan(&self, zones: Vec<Zone>, team_count: usize) -> Result<AssignmentPlan, BalanceError> {
        if team_count < 1 {
            tracing::debug!("team count below 1, clamping to a single team");
        }
        let team_count = team_count.max(1);

        validate(&zones)?;

        if zones.len() <= team_count {
            tracing::debug!(team_count, "no more zones than teams, one zone per team");
            let zones = zones
                .into_iter()
                .enumerate()
                .map(|(i, zone)| zone.labeled(i as TeamId + 1))
                .collect();
            return Ok(AssignmentPlan {
                zones,
                mode: AssignmentMode::Degenerate,
                centers: Vec::new(),
                total_cost: 0.0,
            });
        }

        if zones.iter().all(|z| z.fixed_team.is_some()) {
            tracing::debug!("all zones carry a fixed team, skipping optimisation");
            let zones = zones
                .into_iter()
                .map(|zone| {
                    let team = zone.fixed_team.as_ref().map_or(0, |f| f.team_id());
                    zone.labeled(team)
                })
                .collect();
            return Ok(AssignmentPlan {
                zones,
                mode: AssignmentMode::Fixed,
                centers: Vec::new(),
                total_cost: 0.0,
            });
        }

        let positions: Vec<Position> = zones.iter().map(|z| z.position).collect();
        let slot_labels = slots::plan_slots(positions.len(), team_count);
        let centers = centers::discover_centers(&positions, team_count, &self.config);

        let (teams, total_cost) = assign_slots(&positions, &centers, &slot_labels)?;

        tracing::info!(
            zones = positions.len(),
            team_count,
            total_cost,
            "balanced assignment complete"
        );

        Ok(AssignmentPlan {
            zones: zones
                .into_iter()
                .zip(teams)
                .map(|(zone, team)| zone.labeled(team))
                .collect(),
            mode: AssignmentMode::Optimized,
            centers,
            total_cost,
        })
    }
}

/// Convenience wrapper using [`EngineConfig::default`].
pub fn assign_teams(zones: Vec<Zone>, team_count: usize) -> Result<Vec<LabeledZone>, BalanceError> {
    BalancedAssigner::default().assign(zones, team_count)
}

fn validate(zones: &[Zone]) -> Result<(), BalanceError> {
    let mut seen = AHashSet::with_capacity(zones.len());
    for zone in zones {
        if !seen.insert(zone.id) {
            return Err(BalanceError::DuplicateZoneId { id: zone.id });
        }
        if !zone.position.is_finite() {
            return Err(BalanceError::NonFinitePosition {
                id: zone.id,
                x: zone.position.x,
                y: zone.position.y,
            });
        }
    }
    Ok(())
}

/// Matches each position to one slot; slot `j` sits at the center of team
/// `slot_labels[j]`. Returns the team per position and the matched cost.
pub fn assign_slots(
    positions: &[Position],
    centers: &[Position],
    slot_labels: &[TeamId],
) -> Result<(Vec<TeamId>, f64), BalanceError> {
    let infeasible = BalanceError::AssignmentInfeasible {
        zones: positions.len(),
        slots: slot_labels.len(),
    };

    let targets = slot_labels
        .iter()
        .map(|&team| centers.get((team as usize).wrapping_sub(1)).copied())
        .collect::<Option<Vec<Position>>>()
        .ok_or_else(|| infeasible.clone())?;

    let cost = CostMatrix::from_fn(positions.len(), targets.len(), |i, j| {
        positions[i].distance(&targets[j])
    });
    let matching = hungarian::solve(&cost).ok_or(infeasible)?;

    let total = cost.total(&matching);
    let teams = matching.into_iter().map(|slot| slot_labels[slot]).collect();
    Ok((teams, total))
}
