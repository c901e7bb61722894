use crate::zone::TeamId;

/// Number of zones each team receives, indexed by team id - 1.
///
/// The remainder of `zone_count / team_count` goes to the lowest team ids, so
/// sizes differ by at most one and sum to `zone_count`.
pub fn team_sizes(zone_count: usize, team_count: usize) -> Vec<usize> {
    let team_count = team_count.max(1);
    let base = zone_count / team_count;
    let remainder = zone_count % team_count;

    (0..team_count)
        .map(|i| base + usize::from(i < remainder))
        .collect()
}

/// Slot labels for the assignment stage: team 1 repeated `size_1` times,
/// then team 2, and so on. The result always has `zone_count` entries.
pub fn plan_slots(zone_count: usize, team_count: usize) -> Vec<TeamId> {
    team_sizes(zone_count, team_count)
        .into_iter()
        .enumerate()
        .flat_map(|(i, size)| std::iter::repeat_n(i as TeamId + 1, size))
        .collect()
}
