//! Data models for campus document-compliance statistics.
//!
//! Every type here is transient: rows come from the reporting query, the
//! aggregator derives the rest per request, and nothing is written back.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Campus identifier as stored in the `campuses` table.
pub type CampusId = i64;

// ---

/// Document category as decided by the reporting collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentCategory {
    Fiscal,
    Medical,
}

impl DocumentCategory {
    // ---
    /// `FISCAL` selects the fiscal bucket; every other tag is medical.
    pub fn from_source_tag(tag: &str) -> Self {
        if tag.trim().eq_ignore_ascii_case("FISCAL") {
            Self::Fiscal
        } else {
            Self::Medical
        }
    }
}

/// One reporting row: counts for a single (campus, category) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatRow {
    // ---
    pub campus_id: CampusId,
    pub category: DocumentCategory,
    pub total: u64,
    pub pending: u64,
    pub current: u64,
    pub rejected: u64,
    pub expired: u64,
}

/// Counts for one category of one campus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryBucket {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub expired: u64,
    pub rejected: u64,
}

impl From<&RawStatRow> for CategoryBucket {
    fn from(row: &RawStatRow) -> Self {
        Self {
            total: row.total,
            pending: row.pending,
            approved: row.current,
            expired: row.expired,
            rejected: row.rejected,
        }
    }
}

/// Accumulated statistics for a single campus.
///
/// Built incrementally with [`CampusStats::apply_row`] and then
/// [`CampusStats::finalize`]d once all rows are consumed; the derived
/// `total_*` fields are only meaningful after finalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampusStats {
    // ---
    pub campus_id: CampusId,
    pub campus_name: String,
    pub fiscal: CategoryBucket,
    pub medical: CategoryBucket,
    pub total_documents: u64,
    pub total_approved: u64,
    pub total_expired: u64,
    pub total_pending: u64,
    pub total_rejected: u64,
    pub compliance_percentage: u8,
    pub has_fiscal: bool,
    pub has_medical: bool,
}

impl CampusStats {
    // ---
    pub fn new(campus_id: CampusId, campus_name: String) -> Self {
        // ---
        Self {
            campus_id,
            campus_name,
            fiscal: CategoryBucket::default(),
            medical: CategoryBucket::default(),
            total_documents: 0,
            total_approved: 0,
            total_expired: 0,
            total_pending: 0,
            total_rejected: 0,
            compliance_percentage: 0,
            has_fiscal: false,
            has_medical: false,
        }
    }

    /// Overwrite the bucket for the row's category. A later row for the
    /// same category replaces the earlier one; counts are never summed.
    pub fn apply_row(&mut self, row: &RawStatRow) {
        // ---
        let bucket = CategoryBucket::from(row);
        match row.category {
            DocumentCategory::Fiscal => {
                self.fiscal = bucket;
                self.has_fiscal = true;
            }
            DocumentCategory::Medical => {
                self.medical = bucket;
                self.has_medical = true;
            }
        }
    }

    /// Compute the derived totals and the compliance percentage.
    pub fn finalize(&mut self) {
        // ---
        self.total_documents = self.fiscal.total + self.medical.total;
        self.total_approved = self.fiscal.approved + self.medical.approved;
        self.total_expired = self.fiscal.expired + self.medical.expired;
        self.total_pending = self.fiscal.pending + self.medical.pending;
        self.total_rejected = self.fiscal.rejected + self.medical.rejected;
        self.compliance_percentage = compliance_percentage(self.total_approved, self.total_documents);
    }
}

/// `round(100 * approved / total)`, 0 when there is nothing to measure,
/// capped at 100 when the source reports more approvals than documents.
pub fn compliance_percentage(approved: u64, total: u64) -> u8 {
    // ---
    if total == 0 {
        return 0;
    }
    let pct = (approved as f64 * 100.0 / total as f64).round();
    pct.min(100.0) as u8
}

/// Per-campus statistics kept in first-seen order with id lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampusStatsSet {
    // ---
    entries: Vec<CampusStats>,
    index: HashMap<CampusId, usize>,
}

impl CampusStatsSet {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, campus_id: CampusId) -> Option<&CampusStats> {
        self.index.get(&campus_id).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CampusStats> {
        self.entries.iter()
    }

    /// Return the entry for `campus_id`, creating it with `make` on first sight.
    pub fn get_or_insert_with<F>(&mut self, campus_id: CampusId, make: F) -> &mut CampusStats
    where
        F: FnOnce() -> CampusStats,
    {
        // ---
        let next = self.entries.len();
        let i = *self.index.entry(campus_id).or_insert(next);
        if i == next {
            self.entries.push(make());
        }
        &mut self.entries[i]
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, CampusStats> {
        self.entries.iter_mut()
    }
}

impl<'a> IntoIterator for &'a CampusStatsSet {
    type Item = &'a CampusStats;
    type IntoIter = std::slice::Iter<'a, CampusStats>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Serialized as a JSON object keyed by campus id, in discovery order.
impl Serialize for CampusStatsSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // ---
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for stats in &self.entries {
            map.serialize_entry(&stats.campus_id.to_string(), stats)?;
        }
        map.end()
    }
}

/// System-wide rollup over every campus in a [`CampusStatsSet`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GlobalStats {
    pub total_campuses: u64,
    pub total_documents: u64,
    pub total_approved: u64,
    pub total_pending: u64,
    pub total_expired: u64,
    pub total_rejected: u64,
    pub average_compliance: u8,
    pub critical_campus_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    // ---
    /// Sort rank, higher is more urgent.
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 3,
            Self::Warning => 2,
            Self::Info => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub campus_id: CampusId,
    pub campus_name: String,
    pub severity: Severity,
    pub message: String,
    pub affected_document_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

/// Placeholder trend for a campus; see `ComplianceAggregator::trend`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendIndicator {
    pub campus_id: CampusId,
    pub campus_name: String,
    pub direction: TrendDirection,
    pub percent_change: i32,
}

/// Dashboard response body.
#[derive(Debug, Clone, Serialize)]
pub struct StatsPayload {
    // ---
    #[serde(rename = "estadisticas_generales")]
    pub global: GlobalStats,
    #[serde(rename = "estadisticas_por_campus")]
    pub campuses: CampusStatsSet,
    #[serde(rename = "campus_alertas")]
    pub alerts: Vec<Alert>,
    #[serde(rename = "tendencias")]
    pub trends: Vec<TrendIndicator>,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatsPayload {
    // ---
    /// Empty-but-valid payload returned when the data source fails.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            global: GlobalStats::default(),
            campuses: CampusStatsSet::new(),
            alerts: Vec::new(),
            trends: Vec::new(),
            generated_at: Utc::now(),
            error: Some(reason.into()),
        }
    }
}
