// src/matching/property_type.rs - Property type normalization with IT/EN synonyms
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::dedup::address::strip_accents;

static TYPE_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let groups: [(&str, &[&str]); 8] = [
        (
            "apartment",
            &[
                "apartment", "appartamento", "flat", "monolocale", "bilocale", "trilocale",
                "quadrilocale", "plurilocale", "attico", "penthouse", "mansarda", "studio",
            ],
        ),
        ("villa", &["villa", "villetta", "villino", "villa a schiera", "villetta a schiera"]),
        (
            "house",
            &["house", "casa", "casa indipendente", "casa semindipendente", "rustico", "casale", "cascina"],
        ),
        ("loft", &["loft", "open space"]),
        ("office", &["office", "ufficio", "studio professionale"]),
        ("commercial", &["commercial", "negozio", "shop", "locale commerciale", "capannone"]),
        ("garage", &["garage", "box", "box auto", "posto auto"]),
        ("land", &["land", "terreno", "terreno edificabile"]),
    ];
    groups
        .iter()
        .flat_map(|(canonical, synonyms)| synonyms.iter().map(move |s| (*s, *canonical)))
        .collect()
});

/// Lower-cases, strips accents and maps known synonyms onto a canonical type.
/// Unknown types are returned in their cleaned form so they still compare exactly.
pub fn normalize_property_type(raw: &str) -> String {
    let cleaned = strip_accents(&raw.to_lowercase())
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    TYPE_SYNONYMS
        .get(cleaned.as_str())
        .map(|canonical| canonical.to_string())
        .unwrap_or(cleaned)
}

pub fn same_property_type(a: &str, b: &str) -> bool {
    normalize_property_type(a) == normalize_property_type(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms_collapse() {
        assert_eq!(normalize_property_type("Appartamento"), "apartment");
        assert_eq!(normalize_property_type("  MONOLOCALE "), "apartment");
        assert_eq!(normalize_property_type("Villetta a schiera"), "villa");
        assert_eq!(normalize_property_type("casa-indipendente"), "house");
        assert!(same_property_type("apartment", "Trilocale"));
        assert!(!same_property_type("apartment", "villa"));
    }

    #[test]
    fn test_unknown_types_compare_by_cleaned_text() {
        assert_eq!(normalize_property_type("Château"), "chateau");
        assert!(same_property_type("Château", "chateau"));
        assert!(!same_property_type("castello", "villa"));
    }
}
