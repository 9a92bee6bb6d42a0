//! Natural-key deduplication. The engine itself never deduplicates; sinks
//! and callers opt in with a domain-specific key field.

use std::collections::HashSet;

use collector_core::Record;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub records: Vec<Record>,
    pub existing: usize,
    pub added: usize,
    pub duplicates_removed: usize,
}

/// Keeps the first record for each value of `key`.
///
/// Records without the key, or with an empty value, cannot be compared and
/// are always kept.
pub fn dedupe_by_key(records: Vec<Record>, key: &str) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| match record.field(key) {
            Some(value) if !value.trim().is_empty() => seen.insert(value.trim().to_string()),
            _ => true,
        })
        .collect()
}

/// Appends `new` to `existing` and drops later duplicates of `key`.
pub fn merge_records(existing: Vec<Record>, new: Vec<Record>, key: &str) -> MergeSummary {
    let existing_count = existing.len();
    let total = existing_count + new.len();
    let mut records = dedupe_by_key(existing, key);
    let kept_existing = records.len();
    records.extend(new);
    let records = dedupe_by_key(records, key);
    let added = records.len() - kept_existing;
    MergeSummary {
        duplicates_removed: total - records.len(),
        existing: existing_count,
        added,
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use collector_core::PageIndex;

    fn rec(page: u32, id: &str) -> Record {
        Record::builder(PageIndex::new(page).unwrap(), Utc::now())
            .field("patent_number", id)
            .build()
            .unwrap()
    }

    #[test]
    fn first_occurrence_wins() {
        let records = vec![rec(1, "A"), rec(2, "B"), rec(2, "A")];
        let kept = dedupe_by_key(records, "patent_number");
        let pages: Vec<u32> = kept.iter().map(|r| r.source_page().get()).collect();
        assert_eq!(pages, vec![1, 2]);
        assert_eq!(kept[0].field("patent_number"), Some("A"));
    }

    #[test]
    fn keyless_records_are_kept() {
        let records = vec![rec(1, ""), rec(1, ""), rec(1, "A")];
        assert_eq!(dedupe_by_key(records, "patent_number").len(), 3);
    }

    #[test]
    fn merge_counts_new_and_duplicate_records() {
        let summary = merge_records(
            vec![rec(1, "A"), rec(1, "B")],
            vec![rec(16, "B"), rec(16, "C")],
            "patent_number",
        );
        assert_eq!(summary.existing, 2);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.duplicates_removed, 1);
        assert_eq!(summary.records.len(), 3);
    }

    #[test]
    fn duplicates_inside_the_existing_dataset_do_not_hide_new_records() {
        let summary = merge_records(
            vec![rec(1, "A"), rec(1, "A")],
            vec![rec(2, "B")],
            "patent_number",
        );
        assert_eq!(summary.existing, 2);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.duplicates_removed, 1);
        let ids: Vec<_> = summary
            .records
            .iter()
            .map(|r| r.field("patent_number"))
            .collect();
        assert_eq!(ids, vec![Some("A"), Some("B")]);
    }
}
