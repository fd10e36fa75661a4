//! Vendor field names -> canonical P&L line items.
//!
//! Lookup order: the exact alias table, then keyword classification of the humanized
//! name, then the lower-cased name passed through unchanged.

use crate::models::{ExtractedField, RawField};
use crate::normalize::coerce;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalField {
    TotalRevenue,
    CostOfGoodsSold,
    GrossProfit,
    OperatingExpenses,
    NetIncome,
    OtherIncome,
    OtherExpenses,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 7] = [
        CanonicalField::TotalRevenue,
        CanonicalField::CostOfGoodsSold,
        CanonicalField::GrossProfit,
        CanonicalField::OperatingExpenses,
        CanonicalField::NetIncome,
        CanonicalField::OtherIncome,
        CanonicalField::OtherExpenses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::TotalRevenue => "pnl_total_revenue",
            CanonicalField::CostOfGoodsSold => "pnl_cost_of_goods_sold",
            CanonicalField::GrossProfit => "pnl_gross_profit",
            CanonicalField::OperatingExpenses => "pnl_operating_expenses",
            CanonicalField::NetIncome => "pnl_net_income",
            CanonicalField::OtherIncome => "pnl_other_income",
            CanonicalField::OtherExpenses => "pnl_other_expenses",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output key of a mapped field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Canonical(CanonicalField),
    /// Unrecognized vendor field, lower-cased.
    Passthrough(String),
}

impl FieldKey {
    pub fn as_str(&self) -> &str {
        match self {
            FieldKey::Canonical(c) => c.as_str(),
            FieldKey::Passthrough(name) => name,
        }
    }
}

/// How a name was resolved. Ordered so a stronger match compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    Passthrough,
    Keyword,
    Alias,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappedField {
    pub key: FieldKey,
    pub matched_by: MatchKind,
    pub field: ExtractedField,
}

/// Vendor field name -> canonical field. Matched exactly and case-sensitively.
const VENDOR_ALIASES: &[(&str, CanonicalField)] = &[
    ("TotalRevenue", CanonicalField::TotalRevenue),
    ("Revenue", CanonicalField::TotalRevenue),
    ("Sales", CanonicalField::TotalRevenue),
    ("GrossRevenue", CanonicalField::TotalRevenue),
    ("TotalSales", CanonicalField::TotalRevenue),
    ("CostOfGoodsSold", CanonicalField::CostOfGoodsSold),
    ("COGS", CanonicalField::CostOfGoodsSold),
    ("CostOfSales", CanonicalField::CostOfGoodsSold),
    ("GrossProfit", CanonicalField::GrossProfit),
    ("GrossIncome", CanonicalField::GrossProfit),
    ("OperatingExpenses", CanonicalField::OperatingExpenses),
    ("OpEx", CanonicalField::OperatingExpenses),
    ("TotalExpenses", CanonicalField::OperatingExpenses),
    ("NetIncome", CanonicalField::NetIncome),
    ("NetProfit", CanonicalField::NetIncome),
    ("NetEarnings", CanonicalField::NetIncome),
    ("ProfitLoss", CanonicalField::NetIncome),
    ("OtherIncome", CanonicalField::OtherIncome),
    ("OtherRevenue", CanonicalField::OtherIncome),
    ("OtherExpenses", CanonicalField::OtherExpenses),
    ("OtherCosts", CanonicalField::OtherExpenses),
];

/// Label keyword sets, checked in order; the first set with a substring hit wins.
const LABEL_KEYWORDS: &[(CanonicalField, &[&str])] = &[
    (CanonicalField::TotalRevenue, &["revenue", "sales", "income"]),
    (
        CanonicalField::CostOfGoodsSold,
        &["cost of goods", "cogs", "cost of sales"],
    ),
    (CanonicalField::GrossProfit, &["gross profit"]),
    (
        CanonicalField::OperatingExpenses,
        &["operating expense", "total expense"],
    ),
    (
        CanonicalField::NetIncome,
        &["net income", "net profit", "net earnings"],
    ),
];

pub fn alias_lookup(name: &str) -> Option<CanonicalField> {
    VENDOR_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, field)| *field)
}

/// Classify a lower-cased row label or humanized field name. Revenue keywords do not
/// apply to labels mentioning "net".
pub fn classify_label(label: &str) -> Option<CanonicalField> {
    LABEL_KEYWORDS.iter().find_map(|(field, keywords)| {
        if *field == CanonicalField::TotalRevenue && label.contains("net") {
            return None;
        }
        keywords
            .iter()
            .any(|kw| label.contains(kw))
            .then_some(*field)
    })
}

/// `"TotalOperatingExpenses"` -> `"total operating expenses"`, `"COGSTotal"` -> `"cogs total"`,
/// `"net_income"` -> `"net income"`.
pub fn humanize(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c.is_whitespace() {
            if !out.ends_with(' ') && !out.is_empty() {
                out.push(' ');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.ends_with(' ') {
                out.push(' ');
            }
        }
        out.extend(c.to_lowercase());
    }
    out.trim_end().to_string()
}

pub fn resolve_name(name: &str) -> (FieldKey, MatchKind) {
    if let Some(field) = alias_lookup(name) {
        return (FieldKey::Canonical(field), MatchKind::Alias);
    }
    if let Some(field) = classify_label(&humanize(name)) {
        return (FieldKey::Canonical(field), MatchKind::Keyword);
    }
    (FieldKey::Passthrough(name.to_lowercase()), MatchKind::Passthrough)
}

/// Map one vendor field. Total: every input yields exactly one key and one field.
pub fn map_field(name: &str, raw: &RawField) -> MappedField {
    let (key, matched_by) = resolve_name(name);
    MappedField {
        key,
        matched_by,
        field: extract(raw),
    }
}

fn extract(raw: &RawField) -> ExtractedField {
    let confidence = raw.confidence.unwrap_or(0.0);
    let content = raw.content.clone().unwrap_or_default();
    let display = raw
        .content
        .clone()
        .filter(|c| !c.is_empty())
        .or_else(|| raw.value_string.clone())
        .unwrap_or_default();

    match coerce::coerce_field(raw) {
        Ok(value) => {
            let value_string = if display.is_empty() {
                value.to_string()
            } else {
                display
            };
            ExtractedField::currency(value, value_string, confidence, content)
        }
        Err(_) => ExtractedField::text(display, confidence, content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldType, FieldValue};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn content(text: &str) -> RawField {
        RawField {
            content: Some(text.to_string()),
            confidence: Some(0.9),
            ..Default::default()
        }
    }

    #[test]
    fn cogs_alias_maps_to_currency() {
        let mapped = map_field("COGS", &content("$5,000"));
        assert_eq!(mapped.key, FieldKey::Canonical(CanonicalField::CostOfGoodsSold));
        assert_eq!(mapped.key.as_str(), "pnl_cost_of_goods_sold");
        assert_eq!(mapped.matched_by, MatchKind::Alias);
        assert_eq!(mapped.field.field_type, FieldType::Currency);
        assert_eq!(mapped.field.value, FieldValue::Number(5000.0));
        assert_eq!(mapped.field.value_string, "$5,000");
    }

    #[test]
    fn alias_match_is_case_sensitive() {
        assert_eq!(alias_lookup("Revenue"), Some(CanonicalField::TotalRevenue));
        assert_eq!(alias_lookup("revenue"), None);
        assert_eq!(alias_lookup("cogs"), None);
    }

    #[rstest]
    #[case("TotalOperatingExpense", "pnl_operating_expenses", MatchKind::Keyword)]
    #[case("NetIncomeAfterTax", "pnl_net_income", MatchKind::Keyword)]
    #[case("ServiceRevenue", "pnl_total_revenue", MatchKind::Keyword)]
    #[case("InvoiceDate", "invoicedate", MatchKind::Passthrough)]
    #[case("ReportingPeriod", "reportingperiod", MatchKind::Passthrough)]
    #[case("NetProfit", "pnl_net_income", MatchKind::Alias)]
    fn names_resolve(#[case] name: &str, #[case] key: &str, #[case] kind: MatchKind) {
        let (resolved, matched_by) = resolve_name(name);
        assert_eq!(resolved.as_str(), key);
        assert_eq!(matched_by, kind);
    }

    #[test]
    fn every_name_lands_in_closed_set_or_lowercase() {
        for name in ["Revenue", "Whatever", "MiXeD_Case", "", "Gross Profit", "ÄrligSales"] {
            let mapped = map_field(name, &RawField::default());
            let key = mapped.key.as_str().to_string();
            let canonical = CanonicalField::from_name(&key).is_some();
            assert!(canonical || key == name.to_lowercase(), "{name} -> {key}");
        }
    }

    #[test]
    fn non_numeric_content_degrades_to_string() {
        let mapped = map_field("VendorName", &content("Acme Corp"));
        assert_eq!(mapped.key.as_str(), "vendorname");
        assert_eq!(mapped.field.field_type, FieldType::String);
        assert_eq!(mapped.field.value, FieldValue::Text("Acme Corp".into()));
        assert_eq!(mapped.field.confidence, 0.9);
    }

    #[test]
    fn native_number_without_content_uses_number_as_display() {
        let raw = RawField {
            value_number: Some(1250.5),
            ..Default::default()
        };
        let mapped = map_field("Revenue", &raw);
        assert_eq!(mapped.field.value, FieldValue::Number(1250.5));
        assert_eq!(mapped.field.value_string, "1250.5");
        assert_eq!(mapped.field.content, "");
    }

    #[rstest]
    #[case("TotalOperatingExpenses", "total operating expenses")]
    #[case("COGSTotal", "cogs total")]
    #[case("net_income", "net income")]
    #[case("Q4Revenue", "q4 revenue")]
    #[case("COGS", "cogs")]
    fn humanize_splits_words(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(humanize(input), expected);
    }

    #[rstest]
    #[case("total revenue", Some(CanonicalField::TotalRevenue))]
    #[case("net income", Some(CanonicalField::NetIncome))]
    #[case("net sales", None)]
    #[case("cogs", Some(CanonicalField::CostOfGoodsSold))]
    #[case("gross profit", Some(CanonicalField::GrossProfit))]
    #[case("total expenses", Some(CanonicalField::OperatingExpenses))]
    #[case("depreciation", None)]
    #[case("cost of sales", Some(CanonicalField::TotalRevenue))]
    #[case("net cost of sales", Some(CanonicalField::CostOfGoodsSold))]
    fn labels_classify(#[case] label: &str, #[case] expected: Option<CanonicalField>) {
        assert_eq!(classify_label(label), expected);
    }
}
