//! Campus × document-category compliance aggregation.
//!
//! Turns reporting rows into per-campus statistics, a global rollup,
//! ranked alerts and trend indicators. All stages are pure over their
//! inputs; the trend stage takes its randomness from the caller.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rand::Rng;

use crate::models::{
    Alert, CampusId, CampusStats, CampusStatsSet, GlobalStats, RawStatRow, Severity,
    StatsPayload, TrendDirection, TrendIndicator,
};

/// Maximum number of alerts returned by [`ComplianceAggregator::alert`].
pub const MAX_ALERTS: usize = 10;

/// Campuses below this percentage count as critical in the global rollup.
pub const CRITICAL_CAMPUS_THRESHOLD: u8 = 60;

const CRITICAL_ALERT_THRESHOLD: u8 = 50;
const WARNING_ALERT_THRESHOLD: u8 = 70;
const STABLE_TREND_THRESHOLD: u8 = 80;

// ---

#[derive(Debug, Clone, Default)]
pub struct ComplianceAggregator {
    // ---
    excluded: HashSet<CampusId>,
}

impl ComplianceAggregator {
    // ---
    pub fn new<I>(excluded: I) -> Self
    where
        I: IntoIterator<Item = CampusId>,
    {
        Self {
            excluded: excluded.into_iter().collect(),
        }
    }

    pub fn is_excluded(&self, campus_id: CampusId) -> bool {
        self.excluded.contains(&campus_id)
    }

    /// Group rows by campus and category, then finalize each campus.
    ///
    /// Excluded campuses are dropped before anything else happens. Campuses
    /// missing from `names` get a synthetic `"Campus {id}"` label. The result
    /// keeps the order in which campuses were first seen.
    pub fn normalize(
        &self,
        rows: &[RawStatRow],
        names: &HashMap<CampusId, String>,
    ) -> CampusStatsSet {
        // ---
        let mut campuses = CampusStatsSet::new();

        for row in rows.iter().filter(|r| !self.is_excluded(r.campus_id)) {
            let stats = campuses.get_or_insert_with(row.campus_id, || {
                let name = names
                    .get(&row.campus_id)
                    .cloned()
                    .unwrap_or_else(|| format!("Campus {}", row.campus_id));
                CampusStats::new(row.campus_id, name)
            });
            stats.apply_row(row);
        }

        for stats in campuses.iter_mut() {
            stats.finalize();
        }

        tracing::debug!(
            "Normalized {} rows into {} campuses",
            rows.len(),
            campuses.len()
        );
        campuses
    }

    pub fn summarize(&self, campuses: &CampusStatsSet) -> GlobalStats {
        // ---
        let mut global = GlobalStats::default();
        let mut compliance_sum: u64 = 0;

        for stats in campuses {
            global.total_campuses += 1;
            global.total_documents += stats.total_documents;
            global.total_approved += stats.total_approved;
            global.total_pending += stats.total_pending;
            global.total_expired += stats.total_expired;
            global.total_rejected += stats.total_rejected;
            compliance_sum += u64::from(stats.compliance_percentage);

            if stats.compliance_percentage < CRITICAL_CAMPUS_THRESHOLD {
                global.critical_campus_count += 1;
            }
        }

        if global.total_campuses > 0 {
            let mean = compliance_sum as f64 / global.total_campuses as f64;
            global.average_compliance = mean.round() as u8;
        }

        global
    }

    /// Evaluate the alert rules for one campus; the first matching rule wins.
    pub fn campus_alert(&self, stats: &CampusStats) -> Option<Alert> {
        // ---
        let pct = stats.compliance_percentage;
        let has_documents = stats.total_documents > 0;

        let (severity, message, affected) = if has_documents && pct < CRITICAL_ALERT_THRESHOLD {
            let affected = stats.total_pending + stats.total_expired + stats.total_rejected;
            (
                Severity::Critical,
                format!("Cumplimiento crítico: {pct}% de documentos vigentes"),
                affected,
            )
        } else if has_documents && pct < WARNING_ALERT_THRESHOLD {
            let affected = stats.total_pending + stats.total_expired;
            (
                Severity::Warning,
                format!("Cumplimiento bajo: {pct}% de documentos vigentes"),
                affected,
            )
        } else if stats.total_expired > 0 {
            (
                Severity::Info,
                format!("{} documento(s) caducado(s)", stats.total_expired),
                stats.total_expired,
            )
        } else {
            return None;
        };

        Some(Alert {
            campus_id: stats.campus_id,
            campus_name: stats.campus_name.clone(),
            severity,
            message,
            affected_document_count: affected,
        })
    }

    /// Alerts for every campus, most severe first, at most [`MAX_ALERTS`].
    ///
    /// The sort is stable, so campuses with the same severity keep their
    /// discovery order.
    pub fn alert(&self, campuses: &CampusStatsSet) -> Vec<Alert> {
        // ---
        let mut alerts: Vec<Alert> = campuses
            .iter()
            .filter_map(|stats| self.campus_alert(stats))
            .collect();

        alerts.sort_by(|a, b| b.severity.rank().cmp(&a.severity.rank()));
        alerts.truncate(MAX_ALERTS);
        alerts
    }

    /// Placeholder trend per campus, bucketed by compliance tier.
    ///
    /// There is no historical series behind this yet: the change is drawn
    /// from `rng` inside a range picked by the current tier.
    pub fn trend<R>(&self, campuses: &CampusStatsSet, rng: &mut R) -> Vec<TrendIndicator>
    where
        R: Rng,
    {
        // ---
        campuses
            .iter()
            .map(|stats| {
                let pct = stats.compliance_percentage;
                let (direction, percent_change) = if pct >= STABLE_TREND_THRESHOLD {
                    (TrendDirection::Stable, rng.gen_range(-2..=3))
                } else if pct >= CRITICAL_CAMPUS_THRESHOLD {
                    (TrendDirection::Rising, rng.gen_range(2..=8))
                } else {
                    (TrendDirection::Falling, rng.gen_range(-10..=-2))
                };

                TrendIndicator {
                    campus_id: stats.campus_id,
                    campus_name: stats.campus_name.clone(),
                    direction,
                    percent_change,
                }
            })
            .collect()
    }

    /// Run every stage and assemble the dashboard payload.
    pub fn aggregate<R>(
        &self,
        rows: &[RawStatRow],
        names: &HashMap<CampusId, String>,
        rng: &mut R,
    ) -> StatsPayload
    where
        R: Rng,
    {
        // ---
        let campuses = self.normalize(rows, names);
        let global = self.summarize(&campuses);
        let alerts = self.alert(&campuses);
        let trends = self.trend(&campuses, rng);

        StatsPayload {
            global,
            campuses,
            alerts,
            trends,
            generated_at: Utc::now(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::DocumentCategory;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn raw(
        campus_id: CampusId,
        category: DocumentCategory,
        total: u64,
        pending: u64,
        current: u64,
        rejected: u64,
    ) -> RawStatRow {
        // ---
        RawStatRow {
            campus_id,
            category,
            total,
            pending,
            current,
            rejected,
            expired: 0,
        }
    }

    /// Single fiscal row giving the campus exactly `pct` percent compliance.
    fn campus_at(campus_id: CampusId, pct: u64) -> RawStatRow {
        // ---
        raw(campus_id, DocumentCategory::Fiscal, 100, 100 - pct, pct, 0)
    }

    fn no_names() -> HashMap<CampusId, String> {
        HashMap::new()
    }

    #[test]
    fn test_scenario_fiscal_and_medical_rows() {
        // ---
        let rows = vec![
            raw(1, DocumentCategory::Fiscal, 10, 2, 8, 0),
            raw(1, DocumentCategory::from_source_tag("MEDICINA"), 5, 5, 0, 0),
        ];
        let campuses = ComplianceAggregator::default().normalize(&rows, &no_names());

        let stats = campuses.get(1).unwrap();
        assert_eq!(stats.total_documents, 15);
        assert_eq!(stats.total_approved, 8);
        assert_eq!(stats.compliance_percentage, 53);
        assert!(stats.has_fiscal);
        assert!(stats.has_medical);
    }

    #[test]
    fn test_total_documents_matches_buckets() {
        // ---
        let rows = vec![
            raw(1, DocumentCategory::Fiscal, 7, 1, 6, 0),
            raw(2, DocumentCategory::Medical, 3, 0, 1, 2),
            raw(1, DocumentCategory::Medical, 4, 4, 0, 0),
            raw(3, DocumentCategory::Fiscal, 0, 0, 0, 0),
        ];
        let campuses = ComplianceAggregator::default().normalize(&rows, &no_names());

        assert_eq!(campuses.len(), 3);
        for stats in &campuses {
            assert_eq!(
                stats.total_documents,
                stats.fiscal.total + stats.medical.total
            );
        }
    }

    #[test]
    fn test_zero_documents_means_zero_compliance() {
        // ---
        let rows = vec![raw(8, DocumentCategory::Medical, 0, 0, 0, 0)];
        let campuses = ComplianceAggregator::default().normalize(&rows, &no_names());

        let stats = campuses.get(8).unwrap();
        assert_eq!(stats.total_documents, 0);
        assert_eq!(stats.compliance_percentage, 0);
        assert!(!stats.has_fiscal);
        assert!(stats.has_medical);
    }

    #[test]
    fn test_excluded_campuses_are_dropped() {
        // ---
        let rows = vec![campus_at(1, 90), campus_at(2, 30), campus_at(3, 75)];
        let aggregator = ComplianceAggregator::new([2, 99]);
        let campuses = aggregator.normalize(&rows, &no_names());

        assert!(campuses.get(2).is_none());
        assert_eq!(campuses.len(), 2);
        assert!(aggregator.alert(&campuses).iter().all(|a| a.campus_id != 2));
        assert_eq!(aggregator.summarize(&campuses).total_campuses, 2);
    }

    #[test]
    fn test_duplicate_category_rows_overwrite() {
        // ---
        let rows = vec![
            raw(5, DocumentCategory::Fiscal, 10, 0, 10, 0),
            raw(5, DocumentCategory::Fiscal, 4, 3, 1, 0),
        ];
        let campuses = ComplianceAggregator::default().normalize(&rows, &no_names());

        let stats = campuses.get(5).unwrap();
        assert_eq!(stats.fiscal.total, 4);
        assert_eq!(stats.fiscal.approved, 1);
        assert_eq!(stats.total_documents, 4);
        assert_eq!(stats.compliance_percentage, 25);
    }

    #[test]
    fn test_names_resolved_or_synthetic() {
        // ---
        let names = HashMap::from([(1, "Plantel Norte".to_string())]);
        let rows = vec![campus_at(1, 90), campus_at(42, 90)];
        let campuses = ComplianceAggregator::default().normalize(&rows, &names);

        assert_eq!(campuses.get(1).unwrap().campus_name, "Plantel Norte");
        assert_eq!(campuses.get(42).unwrap().campus_name, "Campus 42");
    }

    #[test]
    fn test_discovery_order_preserved() {
        // ---
        let rows = vec![campus_at(30, 90), campus_at(4, 90), campus_at(17, 90)];
        let campuses = ComplianceAggregator::default().normalize(&rows, &no_names());

        let ids: Vec<CampusId> = campuses.iter().map(|c| c.campus_id).collect();
        assert_eq!(ids, vec![30, 4, 17]);
    }

    #[test]
    fn test_empty_input() {
        // ---
        let aggregator = ComplianceAggregator::default();
        let campuses = aggregator.normalize(&[], &no_names());
        assert!(campuses.is_empty());

        let global = aggregator.summarize(&campuses);
        assert_eq!(global, GlobalStats::default());
        assert_eq!(global.average_compliance, 0);
        assert!(aggregator.alert(&campuses).is_empty());
    }

    #[test]
    fn test_summarize_rollup() {
        // ---
        let rows = vec![
            raw(1, DocumentCategory::Fiscal, 10, 1, 9, 0),
            raw(2, DocumentCategory::Fiscal, 10, 5, 4, 1),
            RawStatRow {
                expired: 2,
                ..raw(3, DocumentCategory::Medical, 10, 1, 7, 0)
            },
        ];
        let aggregator = ComplianceAggregator::default();
        let global = aggregator.summarize(&aggregator.normalize(&rows, &no_names()));

        assert_eq!(global.total_campuses, 3);
        assert_eq!(global.total_documents, 30);
        assert_eq!(global.total_approved, 20);
        assert_eq!(global.total_pending, 7);
        assert_eq!(global.total_rejected, 1);
        assert_eq!(global.total_expired, 2);
        // (90 + 40 + 70) / 3 = 66.67
        assert_eq!(global.average_compliance, 67);
        assert_eq!(global.critical_campus_count, 1);
    }

    #[test]
    fn test_critical_alert_at_45_percent() {
        // ---
        let aggregator = ComplianceAggregator::default();
        let campuses = aggregator.normalize(&[campus_at(1, 45)], &no_names());
        let alerts = aggregator.alert(&campuses);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert!(alerts[0].message.contains("45%"));
        assert_eq!(alerts[0].affected_document_count, 55);
    }

    #[test]
    fn test_warning_alert_at_65_percent() {
        // ---
        let aggregator = ComplianceAggregator::default();
        let rows = vec![RawStatRow {
            expired: 5,
            rejected: 5,
            pending: 25,
            ..campus_at(1, 65)
        }];
        let campuses = aggregator.normalize(&rows, &no_names());
        let alerts = aggregator.alert(&campuses);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].affected_document_count, 30);
    }

    #[test]
    fn test_info_alert_for_expired_only() {
        // ---
        let aggregator = ComplianceAggregator::default();
        let rows = vec![
            RawStatRow {
                expired: 3,
                ..campus_at(1, 95)
            },
            campus_at(2, 95),
        ];
        let campuses = aggregator.normalize(&rows, &no_names());
        let alerts = aggregator.alert(&campuses);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].campus_id, 1);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(alerts[0].affected_document_count, 3);
    }

    #[test]
    fn test_empty_campus_with_expired_is_info() {
        // ---
        let aggregator = ComplianceAggregator::default();
        let stats = CampusStats {
            total_expired: 2,
            ..CampusStats::new(1, "Campus 1".to_string())
        };

        let alert = aggregator.campus_alert(&stats).unwrap();
        assert_eq!(alert.severity, Severity::Info);
    }

    #[test]
    fn test_alerts_sorted_stable_and_truncated() {
        // ---
        let mut rows = Vec::new();
        for id in 1..=6 {
            rows.push(RawStatRow {
                expired: 1,
                ..campus_at(id, 95)
            });
        }
        for id in 7..=10 {
            rows.push(campus_at(id, 65));
        }
        for id in 11..=14 {
            rows.push(campus_at(id, 20));
        }

        let aggregator = ComplianceAggregator::default();
        let campuses = aggregator.normalize(&rows, &no_names());
        let alerts = aggregator.alert(&campuses);

        assert_eq!(alerts.len(), MAX_ALERTS);
        for pair in alerts.windows(2) {
            assert!(pair[0].severity.rank() >= pair[1].severity.rank());
        }

        let ids: Vec<CampusId> = alerts.iter().map(|a| a.campus_id).collect();
        assert_eq!(ids, vec![11, 12, 13, 14, 7, 8, 9, 10, 1, 2]);
    }

    #[test]
    fn test_trend_tiers_with_seeded_rng() {
        // ---
        let rows = vec![campus_at(1, 85), campus_at(2, 70), campus_at(3, 40), campus_at(4, 80)];
        let aggregator = ComplianceAggregator::default();
        let campuses = aggregator.normalize(&rows, &no_names());

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let trends = aggregator.trend(&campuses, &mut rng);
            assert_eq!(trends.len(), 4);

            assert_eq!(trends[0].direction, TrendDirection::Stable);
            assert!((-2..=3).contains(&trends[0].percent_change));
            assert_eq!(trends[1].direction, TrendDirection::Rising);
            assert!((2..=8).contains(&trends[1].percent_change));
            assert_eq!(trends[2].direction, TrendDirection::Falling);
            assert!((-10..=-2).contains(&trends[2].percent_change));
            assert_eq!(trends[3].direction, TrendDirection::Stable);
        }
    }

    #[test]
    fn test_aggregate_assembles_payload() {
        // ---
        let rows = vec![campus_at(1, 45), campus_at(2, 90)];
        let mut rng = StdRng::seed_from_u64(7);
        let payload = ComplianceAggregator::default().aggregate(&rows, &no_names(), &mut rng);

        assert_eq!(payload.campuses.len(), 2);
        assert_eq!(payload.global.total_campuses, 2);
        assert_eq!(payload.alerts.len(), 1);
        assert_eq!(payload.trends.len(), 2);
        assert!(payload.error.is_none());
    }
}
