use super::*;
use crate::zone::Zone;
use ahash::AHashMap;
use serde_json::json;

fn zones_from(points: &[(f64, f64)]) -> Vec<Zone> {
    points
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| Zone::new(100 + i as i64, x, y))
        .collect()
}

/// Scattered but deterministic positions in a 20 km square.
fn scattered(n: usize) -> Vec<Zone> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            let x = (t * 7919.0) % 20_000.0;
            let y = (t * 104_729.0 + 3_571.0) % 20_000.0;
            Zone::new(i as i64 + 1, x, y)
        })
        .collect()
}

fn team_counts(zones: &[LabeledZone]) -> AHashMap<TeamId, usize> {
    let mut counts = AHashMap::new();
    for z in zones {
        *counts.entry(z.team_id).or_insert(0) += 1;
    }
    counts
}

#[test]
fn test_toy_case_splits_by_column() {
    let zones = zones_from(&[(0.0, 0.0), (0.0, 1.0), (10.0, 0.0), (10.0, 1.0)]);
    let out = assign_teams(zones, 2).unwrap();

    assert_eq!(out[0].team_id, out[1].team_id);
    assert_eq!(out[2].team_id, out[3].team_id);
    assert_ne!(out[0].team_id, out[2].team_id);
}

#[test]
fn test_nineteen_zones_four_teams() {
    let out = assign_teams(scattered(19), 4).unwrap();
    let mut sizes: Vec<usize> = team_counts(&out).into_values().collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![4, 5, 5, 5]);
}

#[test]
fn test_balance_and_completeness_across_sizes() {
    for n in [5usize, 9, 13, 24, 31] {
        for k in 1..=6 {
            if n <= k {
                continue;
            }
            let input = scattered(n);
            let out = assign_teams(input.clone(), k).unwrap();

            assert_eq!(out.len(), n);
            for (zin, zout) in input.iter().zip(&out) {
                assert_eq!(zin.id, zout.id);
                assert!((1..=k as TeamId).contains(&zout.team_id));
            }

            let mut sizes: Vec<usize> = team_counts(&out).into_values().collect();
            sizes.sort_unstable();
            let mut expected = slots::team_sizes(n, k);
            expected.sort_unstable();
            assert_eq!(sizes, expected, "n={n} k={k}");
        }
    }
}

#[test]
fn test_deterministic() {
    let a = assign_teams(scattered(27), 5).unwrap();
    let b = assign_teams(scattered(27), 5).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_degenerate_numbers_in_input_order() {
    let zones = zones_from(&[(5.0, 5.0), (0.0, 0.0), (9.0, 1.0)]);
    let plan = BalancedAssigner::default().plan(zones, 5).unwrap();
    assert_eq!(plan.mode, AssignmentMode::Degenerate);
    assert!(plan.centers.is_empty());
    let teams: Vec<TeamId> = plan.zones.iter().map(|z| z.team_id).collect();
    assert_eq!(teams, vec![1, 2, 3]);
}

#[test]
fn test_equal_counts_are_degenerate() {
    let plan = BalancedAssigner::default()
        .plan(scattered(4), 4)
        .unwrap();
    assert_eq!(plan.mode, AssignmentMode::Degenerate);
}

#[test]
fn test_empty_input() {
    assert!(assign_teams(Vec::new(), 3).unwrap().is_empty());
}

#[test]
fn test_zero_teams_clamps_to_one() {
    let out = assign_teams(scattered(6), 0).unwrap();
    assert!(out.iter().all(|z| z.team_id == 1));
}

#[test]
fn test_fixed_teams_pass_through() {
    let zones = vec![
        Zone::new(1, 0.0, 0.0).with_fixed_team(3),
        Zone::new(2, 1.0, 0.0).with_fixed_team("2"),
        Zone::new(3, 2.0, 0.0).with_fixed_team(json!(null)),
        Zone::new(4, 3.0, 0.0).with_fixed_team("n/a"),
        Zone::new(5, 4.0, 0.0).with_fixed_team(1.0),
    ];
    let plan = BalancedAssigner::default().plan(zones, 2).unwrap();
    assert_eq!(plan.mode, AssignmentMode::Fixed);
    let teams: Vec<TeamId> = plan.zones.iter().map(|z| z.team_id).collect();
    assert_eq!(teams, vec![3, 2, 0, 0, 1]);
}

#[test]
fn test_few_zones_ignore_fixed_teams() {
    let zones = vec![
        Zone::new(1, 0.0, 0.0).with_fixed_team(4),
        Zone::new(2, 1.0, 0.0).with_fixed_team(4),
        Zone::new(3, 2.0, 0.0).with_fixed_team(2),
    ];
    let plan = BalancedAssigner::default().plan(zones, 3).unwrap();
    assert_eq!(plan.mode, AssignmentMode::Degenerate);
    let teams: Vec<TeamId> = plan.zones.iter().map(|z| z.team_id).collect();
    assert_eq!(teams, vec![1, 2, 3]);
}

#[test]
fn test_partial_fixed_teams_are_optimized() {
    let mut zones = scattered(8);
    zones[0].fixed_team = Some(crate::zone::FixedTeam(json!(7)));
    let plan = BalancedAssigner::default().plan(zones, 2).unwrap();
    assert_eq!(plan.mode, AssignmentMode::Optimized);
    assert!(plan.zones.iter().all(|z| z.team_id == 1 || z.team_id == 2));
}

#[test]
fn test_attributes_preserved() {
    let zones: Vec<Zone> = scattered(7)
        .into_iter()
        .map(|z| {
            let id = z.id;
            z.with_attribute("locality", format!("loc-{id}"))
                .with_attribute("target", json!({ "surveys": id * 3 }))
        })
        .collect();
    let out = assign_teams(zones.clone(), 3).unwrap();
    for (zin, zout) in zones.iter().zip(&out) {
        assert_eq!(zin.attributes, zout.attributes);
        assert_eq!(zin.position, zout.position);
    }
}

#[test]
fn test_duplicate_ids_rejected() {
    let zones = vec![Zone::new(1, 0.0, 0.0), Zone::new(1, 5.0, 5.0), Zone::new(2, 9.0, 9.0)];
    assert_eq!(
        assign_teams(zones, 2),
        Err(BalanceError::DuplicateZoneId { id: 1 })
    );
}

#[test]
fn test_non_finite_position_rejected() {
    let zones = vec![Zone::new(1, 0.0, 0.0), Zone::new(2, f64::NAN, 1.0), Zone::new(3, 9.0, 9.0)];
    assert!(matches!(
        assign_teams(zones, 2),
        Err(BalanceError::NonFinitePosition { id: 2, .. })
    ));
}

#[test]
fn test_coincident_positions_still_balanced() {
    let zones: Vec<Zone> = (0..9).map(|i| Zone::new(i, 50.0, 50.0)).collect();
    let out = assign_teams(zones, 3).unwrap();
    let counts = team_counts(&out);
    assert_eq!(counts.len(), 3);
    assert!(counts.values().all(|&c| c == 3));
}

#[test]
fn test_plan_cost_matches_centers() {
    let plan = BalancedAssigner::default().plan(scattered(15), 3).unwrap();
    assert_eq!(plan.mode, AssignmentMode::Optimized);
    assert_eq!(plan.centers.len(), 3);

    let recomputed: f64 = plan
        .zones
        .iter()
        .map(|z| z.position.distance(&plan.centers[z.team_id as usize - 1]))
        .sum();
    assert!((recomputed - plan.total_cost).abs() < 1e-6);
}

#[test]
fn test_assignment_beats_any_single_swap() {
    let plan = BalancedAssigner::default().plan(scattered(12), 3).unwrap();
    let zones = &plan.zones;
    let cost = |z: &LabeledZone, team: TeamId| z.position.distance(&plan.centers[team as usize - 1]);

    for a in 0..zones.len() {
        for b in (a + 1)..zones.len() {
            let (za, zb) = (&zones[a], &zones[b]);
            if za.team_id == zb.team_id {
                continue;
            }
            let current = cost(za, za.team_id) + cost(zb, zb.team_id);
            let swapped = cost(za, zb.team_id) + cost(zb, za.team_id);
            assert!(current <= swapped + 1e-9);
        }
    }
}

#[test]
fn test_assign_slots_reports_bad_labels() {
    let positions = vec![Position::new(0.0, 0.0), Position::new(1.0, 1.0)];
    let centers = vec![Position::new(0.0, 0.0)];
    assert_eq!(
        assign_slots(&positions, &centers, &[1, 2]),
        Err(BalanceError::AssignmentInfeasible { zones: 2, slots: 2 })
    );
}
