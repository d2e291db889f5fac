use crate::record::{RiskLevel, SpeciesRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SortKey {
    /// Alphabetical by common name
    Name,
    /// Most threatened first
    Risk,
    /// Newest first
    Recent,
}

/// Filter and order a snapshot of the catalog.
///
/// A record passes when the trimmed, case-insensitive `search_term` occurs in
/// `"<name> <scientific name>"` (or the term is empty) and its risk level
/// equals `risk_filter` (or there is none). Sorting is stable; without a key
/// the input order is kept. The input is never modified.
pub fn query<'a>(
    records: &'a [SpeciesRecord],
    search_term: &str,
    risk_filter: Option<RiskLevel>,
    sort_key: Option<SortKey>,
) -> Vec<&'a SpeciesRecord> {
    let term = search_term.trim().to_lowercase();

    let mut filtered: Vec<&SpeciesRecord> = records
        .iter()
        .filter(|record| {
            let matches_search = term.is_empty() || {
                let text = format!("{} {}", record.name, record.scientific_name).to_lowercase();
                text.contains(&term)
            };
            let matches_risk = risk_filter.is_none_or(|risk| record.risk_level == risk);
            matches_search && matches_risk
        })
        .collect();

    match sort_key {
        Some(SortKey::Name) => filtered.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        }),
        Some(SortKey::Risk) => {
            filtered.sort_by(|a, b| b.risk_level.severity().cmp(&a.risk_level.severity()))
        }
        Some(SortKey::Recent) => filtered.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        None => {}
    }

    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_record;

    fn names(records: &[&SpeciesRecord]) -> Vec<String> {
        records.iter().map(|r| r.name.clone()).collect()
    }

    fn catalog() -> Vec<SpeciesRecord> {
        vec![
            sample_record(3, "Tubarao-martelo", RiskLevel::CriticallyEndangered),
            sample_record(1, "Baleia-franca-austral", RiskLevel::Endangered),
            sample_record(2, "Sardinha", RiskLevel::LeastConcern),
            sample_record(5, "Coral-sol", RiskLevel::Overpopulated),
        ]
    }

    #[test]
    fn test_no_filter_keeps_insertion_order() {
        let records = catalog();
        let result = query(&records, "", None, None);
        assert_eq!(
            names(&result),
            vec!["Tubarao-martelo", "Baleia-franca-austral", "Sardinha", "Coral-sol"]
        );
    }

    #[test]
    fn test_search_is_case_insensitive_over_both_names() {
        let records = catalog();
        assert_eq!(
            names(&query(&records, "  FRANCA ", None, Some(SortKey::Name))),
            vec!["Baleia-franca-austral"]
        );
        // Scientific names are searched too.
        assert_eq!(query(&records, "sardinha scientificus", None, None).len(), 1);
        assert!(query(&records, "polvo", None, None).is_empty());
    }

    #[test]
    fn test_risk_filter_is_exact() {
        let records = catalog();
        let result = query(&records, "", Some(RiskLevel::LeastConcern), None);
        assert_eq!(names(&result), vec!["Sardinha"]);
    }

    #[test]
    fn test_sort_by_name() {
        let records = vec![
            sample_record(1, "B", RiskLevel::Vulnerable),
            sample_record(2, "a", RiskLevel::Vulnerable),
            sample_record(3, "A", RiskLevel::Vulnerable),
        ];
        assert_eq!(names(&query(&records, "", None, Some(SortKey::Name))), vec!["A", "a", "B"]);
    }

    #[test]
    fn test_sort_by_risk_puts_most_threatened_first() {
        let records = catalog();
        let result = query(&records, "", None, Some(SortKey::Risk));
        assert_eq!(
            names(&result),
            vec!["Tubarao-martelo", "Baleia-franca-austral", "Sardinha", "Coral-sol"]
        );

        let reversed: Vec<SpeciesRecord> = records.into_iter().rev().collect();
        let result = query(&reversed, "", None, Some(SortKey::Risk));
        assert_eq!(result[0].risk_level, RiskLevel::CriticallyEndangered);
        assert_eq!(result.last().unwrap().risk_level, RiskLevel::Overpopulated);
    }

    #[test]
    fn test_sort_by_recent_is_stable() {
        let mut records = catalog();
        records.push(sample_record(5, "Mero", RiskLevel::Vulnerable));
        let result = query(&records, "", None, Some(SortKey::Recent));
        assert_eq!(
            names(&result),
            vec!["Coral-sol", "Mero", "Tubarao-martelo", "Sardinha", "Baleia-franca-austral"]
        );
        // Input untouched.
        assert_eq!(records[0].name, "Tubarao-martelo");
    }
}
