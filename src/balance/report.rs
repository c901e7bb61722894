use crate::ingest::SampleRecord;
use crate::zone::{LabeledZone, Position, TeamId, ZoneId};
use ahash::AHashMap;
use itertools::Itertools;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TeamSummary {
    pub team_id: TeamId,
    pub zone_count: usize,
    /// Mean position of the team's zones.
    pub center: Position,
    /// Sum of distances from each zone to `center`.
    pub spread: f64,
    pub workload: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlanSummary {
    pub teams: Vec<TeamSummary>,
    pub total_zones: usize,
    pub total_workload: f64,
}

impl PlanSummary {
    pub fn team_count(&self) -> usize {
        self.teams.len()
    }

    /// Workload each surveyor carries when the total is split evenly.
    pub fn workload_per_surveyor(&self, surveyors: usize) -> Option<f64> {
        (surveyors > 0).then(|| self.total_workload / surveyors as f64)
    }

    pub fn is_balanced(&self) -> bool {
        match self.teams.iter().map(|t| t.zone_count).minmax().into_option() {
            Some((min, max)) => max - min <= 1,
            None => true,
        }
    }

    pub fn total_spread(&self) -> f64 {
        self.teams.iter().map(|t| t.spread).sum()
    }
}

/// Numeric value of a workload attribute. Numbers and numeric strings count,
/// anything else is zero.
pub fn workload_value(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Per-team totals in ascending team id order.
pub fn summarize(zones: &[LabeledZone], workload_attribute: Option<&str>) -> PlanSummary {
    let by_team = zones.iter().into_group_map_by(|z| z.team_id);

    let teams: Vec<TeamSummary> = by_team
        .into_iter()
        .sorted_by_key(|(team_id, _)| *team_id)
        .map(|(team_id, members)| {
            let n = members.len() as f64;
            let center = Position::new(
                members.iter().map(|z| z.position.x).sum::<f64>() / n,
                members.iter().map(|z| z.position.y).sum::<f64>() / n,
            );
            let spread = members.iter().map(|z| z.position.distance(&center)).sum();
            let workload = workload_attribute
                .map(|key| {
                    members
                        .iter()
                        .map(|z| workload_value(z.attributes.get(key)))
                        .sum()
                })
                .unwrap_or(0.0);

            TeamSummary {
                team_id,
                zone_count: members.len(),
                center,
                spread,
                workload,
            }
        })
        .collect();

    PlanSummary {
        total_zones: zones.len(),
        total_workload: teams.iter().map(|t| t.workload).sum(),
        teams,
    }
}

/// Keeps one team's zones, or all of them when `team` is `None`.
pub fn select_team(zones: Vec<LabeledZone>, team: Option<TeamId>) -> Vec<LabeledZone> {
    match team {
        Some(team) => zones.into_iter().filter(|z| z.team_id == team).collect(),
        None => zones,
    }
}

/// A sample record placed in its section's team.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LocalityDetail {
    pub team_id: TeamId,
    pub section: ZoneId,
    pub locality: String,
    pub surveys: f64,
}

/// Sample records whose section is among `zones`, ordered by team then
/// section. Records of the same section keep their sample order.
pub fn locality_detail(zones: &[LabeledZone], sample: &[SampleRecord]) -> Vec<LocalityDetail> {
    let teams: AHashMap<ZoneId, TeamId> = zones.iter().map(|z| (z.id, z.team_id)).collect();

    sample
        .iter()
        .filter_map(|record| {
            teams.get(&record.section).map(|&team_id| LocalityDetail {
                team_id,
                section: record.section,
                locality: record.locality.clone(),
                surveys: record.surveys,
            })
        })
        .sorted_by_key(|d| (d.team_id, d.section))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::Zone;
    use serde_json::json;

    fn labeled(id: i64, x: f64, y: f64, team: TeamId, surveys: Value) -> LabeledZone {
        Zone::new(id, x, y).with_attribute("meta", surveys).labeled(team)
    }

    #[test]
    fn summarizes_each_team() {
        let zones = vec![
            labeled(1, 0.0, 0.0, 2, json!(10)),
            labeled(2, 0.0, 4.0, 2, json!("5")),
            labeled(3, 10.0, 0.0, 1, json!(null)),
        ];
        let summary = summarize(&zones, Some("meta"));

        assert_eq!(summary.team_count(), 2);
        assert_eq!(summary.teams[0].team_id, 1);
        assert_eq!(summary.teams[0].zone_count, 1);
        assert_eq!(summary.teams[0].spread, 0.0);
        assert_eq!(summary.teams[0].workload, 0.0);

        let second = &summary.teams[1];
        assert_eq!(second.center, Position::new(0.0, 2.0));
        assert_eq!(second.spread, 4.0);
        assert_eq!(second.workload, 15.0);

        assert_eq!(summary.total_zones, 3);
        assert_eq!(summary.total_workload, 15.0);
        assert!(summary.is_balanced());
    }

    #[test]
    fn workload_per_surveyor() {
        let zones = vec![labeled(1, 0.0, 0.0, 1, json!(90))];
        let summary = summarize(&zones, Some("meta"));
        assert_eq!(summary.workload_per_surveyor(30), Some(3.0));
        assert_eq!(summary.workload_per_surveyor(0), None);
    }

    #[test]
    fn detects_imbalance() {
        let zones = vec![
            labeled(1, 0.0, 0.0, 1, json!(0)),
            labeled(2, 0.0, 0.0, 1, json!(0)),
            labeled(3, 0.0, 0.0, 1, json!(0)),
            labeled(4, 0.0, 0.0, 2, json!(0)),
        ];
        assert!(!summarize(&zones, None).is_balanced());
    }

    #[test]
    fn empty_plan() {
        let summary = summarize(&[], Some("meta"));
        assert!(summary.teams.is_empty());
        assert!(summary.is_balanced());
        assert_eq!(summary.total_spread(), 0.0);
    }

    #[test]
    fn team_filter() {
        let zones = vec![
            labeled(1, 0.0, 0.0, 1, json!(1)),
            labeled(2, 0.0, 0.0, 2, json!(1)),
            labeled(3, 0.0, 0.0, 1, json!(1)),
        ];
        let only_one: Vec<i64> = select_team(zones.clone(), Some(1))
            .iter()
            .map(|z| z.id)
            .collect();
        assert_eq!(only_one, vec![1, 3]);
        assert_eq!(select_team(zones.clone(), None), zones);
        assert!(select_team(zones, Some(7)).is_empty());
    }

    #[test]
    fn locality_detail_sorted_by_team_then_section() {
        let zones = vec![
            labeled(2703, 0.0, 0.0, 1, json!(0)),
            labeled(2701, 0.0, 0.0, 2, json!(0)),
            labeled(2702, 0.0, 0.0, 1, json!(0)),
        ];
        let record = |section: i64, locality: &str, surveys: f64| SampleRecord {
            section,
            locality: locality.to_string(),
            surveys,
        };
        let sample = vec![
            record(2701, "Zacatlan", 10.0),
            record(2703, "Jicolapa", 4.0),
            record(2702, "Tepetzintla", 2.0),
            record(2703, "Xonotla", 1.0),
            record(9999, "Fuera", 5.0),
        ];

        let detail = locality_detail(&zones, &sample);
        let order: Vec<(TeamId, i64, &str)> = detail
            .iter()
            .map(|d| (d.team_id, d.section, d.locality.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, 2702, "Tepetzintla"),
                (1, 2703, "Jicolapa"),
                (1, 2703, "Xonotla"),
                (2, 2701, "Zacatlan"),
            ]
        );
    }
}
