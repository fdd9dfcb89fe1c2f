// src/dedup/address.rs - Address and agency-name normalization (Italian street conventions)
//!
//! The clustering algorithm only ever sees the output of [`normalize_address`]
//! and [`normalize_agency_name`]; locale rules live here and nowhere else.

use once_cell::sync::Lazy;
use regex::Regex;
use strsim::jaro_winkler;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::utils::constants::ADDRESS_STREET_SIMILARITY;

/// Dotted abbreviations, expanded before punctuation is stripped.
static DOTTED_ABBREVIATIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\bv\.\s*le\b", "viale "),
        (r"\bp\.\s*zz?a\b", "piazza "),
        (r"\bp\.\s*le\b", "piazzale "),
        (r"\bc\.\s*so\b", "corso "),
        (r"\bl\.\s*go\b", "largo "),
        (r"\bvic\.", "vicolo "),
        (r"\bstr\.", "strada "),
        (r"\bloc\.", "localita "),
        // A bare "V." is "via" only when it opens the address ("Corso V. Emanuele").
        (r"^\s*v\.", "via "),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

static CIVIC_SUFFIX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d+)\s*/\s*([a-z])\b").ok());
static PROVINCE_TAG: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\(\s*[a-z]{2}\s*\)").ok());
static POSTAL_CODE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\b\d{5}\b").ok());

/// Bare-token abbreviations, applied after punctuation is gone. A lone "v"
/// is handled separately since it is only a street type in first position.
const TOKEN_ABBREVIATIONS: &[(&str, &str)] = &[
    ("vle", "viale"),
    ("pza", "piazza"),
    ("pzza", "piazza"),
    ("ple", "piazzale"),
    ("cso", "corso"),
    ("lgo", "largo"),
    ("vlo", "vicolo"),
    ("str", "strada"),
    ("loc", "localita"),
];

const CIVIC_MARKERS: &[&str] = &["n", "nr", "num", "civico"];
const COUNTRY_NAMES: &[&str] = &["italia", "italy"];

const LEGAL_FORMS: &[&str] = &[
    "srl", "srls", "spa", "sas", "snc", "sapa", "ss", "scarl", "ltd", "llc", "sa",
];

pub fn strip_accents(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn replace_all(re: &Option<Regex>, text: &str, replacement: &str) -> String {
    match re {
        Some(re) => re.replace_all(text, replacement).into_owned(),
        None => text.to_string(),
    }
}

/// Normalizes a street address for grouping. The city (when given), postal
/// codes, province tags and country names are removed so listings that spell
/// the locality differently still land in the same group.
pub fn normalize_address(address: &str, city: Option<&str>) -> String {
    let mut normalized = strip_accents(&address.to_lowercase());

    for (re, replacement) in DOTTED_ABBREVIATIONS.iter() {
        normalized = re.replace_all(&normalized, *replacement).into_owned();
    }
    normalized = replace_all(&CIVIC_SUFFIX, &normalized, "$1$2");
    normalized = replace_all(&PROVINCE_TAG, &normalized, " ");
    normalized = replace_all(&POSTAL_CODE, &normalized, " ");

    let cleaned: String = normalized
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let city_tokens: Vec<String> = city
        .map(|c| normalize_tokens(c))
        .unwrap_or_default();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if !city_tokens.is_empty() {
        tokens = strip_trailing_city(&tokens, &city_tokens);
    }

    let mut output: Vec<String> = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        if COUNTRY_NAMES.contains(token) {
            continue;
        }
        let next_is_number = tokens
            .get(i + 1)
            .map_or(false, |next| next.chars().next().map_or(false, |c| c.is_ascii_digit()));
        if CIVIC_MARKERS.contains(token) && next_is_number {
            continue;
        }
        let expanded = if *token == "v" {
            if output.is_empty() { "via" } else { "v" }
        } else {
            TOKEN_ABBREVIATIONS
                .iter()
                .find(|(abbr, _)| abbr == token)
                .map(|(_, full)| *full)
                .unwrap_or(*token)
        };
        output.push(expanded.to_string());
    }
    output.join(" ")
}

fn normalize_tokens(text: &str) -> Vec<String> {
    strip_accents(&text.to_lowercase())
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Drops the city when it trails the civic number, ignoring a final country
/// name. A city name inside the street ("Via Roma 10" in Roma) is kept.
fn strip_trailing_city<'a>(tokens: &[&'a str], city: &[String]) -> Vec<&'a str> {
    let mut end = tokens.len();
    while end > 0 && COUNTRY_NAMES.contains(&tokens[end - 1]) {
        end -= 1;
    }
    if end <= city.len() {
        return tokens.to_vec();
    }
    let start = end - city.len();
    let after_civic = tokens[start - 1]
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_digit());
    if after_civic && city.iter().zip(&tokens[start..end]).all(|(c, t)| c == t) {
        let mut kept = tokens[..start].to_vec();
        kept.extend_from_slice(&tokens[end..]);
        kept
    } else {
        tokens.to_vec()
    }
}

/// Splits a normalized address into its street part and civic number tokens.
pub fn split_civic(normalized: &str) -> (String, Vec<&str>) {
    let (civic, street): (Vec<&str>, Vec<&str>) = normalized
        .split_whitespace()
        .partition(|token| token.chars().next().map_or(false, |c| c.is_ascii_digit()));
    (street.join(" "), civic)
}

/// Two normalized addresses denote the same building when they are equal, or
/// when their civic numbers agree and the street names differ only by a typo.
pub fn addresses_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (street_a, civic_a) = split_civic(a);
    let (street_b, civic_b) = split_civic(b);
    if civic_a.is_empty() || civic_a != civic_b || street_a.is_empty() || street_b.is_empty() {
        return false;
    }
    jaro_winkler(&street_a, &street_b) >= ADDRESS_STREET_SIMILARITY
}

/// Canonical agency name: accents and punctuation removed, dotted legal forms
/// collapsed ("S.r.l." -> "srl") and then dropped.
pub fn normalize_agency_name(name: &str) -> String {
    let lowered = strip_accents(&name.to_lowercase()).replace('.', "");
    let tokens: Vec<String> = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|token| !LEGAL_FORMS.contains(token))
        .map(str::to_string)
        .collect();
    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_street_abbreviations_expand() {
        assert_eq!(normalize_address("V. Roma 12", None), "via roma 12");
        assert_eq!(normalize_address("V.le Monza, 3", None), "viale monza 3");
        assert_eq!(normalize_address("vle Monza 3", None), "viale monza 3");
        assert_eq!(normalize_address("P.zza Duomo 1", None), "piazza duomo 1");
        assert_eq!(normalize_address("C.so Buenos Aires 20", None), "corso buenos aires 20");
    }

    #[test]
    fn test_accents_city_and_postal_code_removed() {
        assert_eq!(
            normalize_address("Via Università 5, 20121 Milano (MI), Italia", Some("Milano")),
            "via universita 5"
        );
        assert_eq!(
            normalize_address("Piazza della Libertà n. 7 - Reggio Emilia", Some("Reggio Emilia")),
            "piazza della liberta 7"
        );
    }

    #[test]
    fn test_v_means_via_only_at_the_start() {
        assert_eq!(normalize_address("Corso V. Emanuele 5", None), "corso v emanuele 5");
        assert_eq!(normalize_address("Corso V Emanuele 5", None), "corso v emanuele 5");
        assert_eq!(normalize_address("  v Roma 12", None), "via roma 12");
    }

    #[test]
    fn test_city_inside_street_name_is_kept() {
        assert_eq!(normalize_address("Via Roma 10", Some("Roma")), "via roma 10");
        assert_eq!(normalize_address("Via Roma 10, Roma", Some("Roma")), "via roma 10");
        assert_eq!(normalize_address("Corso Milano 4 Milano Italy", Some("Milano")), "corso milano 4");
        assert_eq!(normalize_address("Via Roma", Some("Roma")), "via roma");
    }

    #[test]
    fn test_civic_number_forms() {
        assert_eq!(normalize_address("Via Verdi 12/A", None), "via verdi 12a");
        assert_eq!(normalize_address("Via Verdi, civico 12", None), "via verdi 12");
        assert_eq!(normalize_address("Via Verdi nr. 12", None), "via verdi 12");
    }

    #[test]
    fn test_addresses_match_tolerates_typos_but_not_other_numbers() {
        assert!(addresses_match("via garibaldi 10", "via garibaldi 10"));
        assert!(addresses_match("via garibaldi 10", "via garibladi 10"));
        assert!(!addresses_match("via garibaldi 10", "via garibaldi 12"));
        assert!(!addresses_match("via garibaldi", "via garibaldi 10"));
    }

    #[test]
    fn test_agency_names_collapse_legal_forms() {
        assert_eq!(normalize_agency_name("Tecnocasa S.r.l."), "tecnocasa");
        assert_eq!(normalize_agency_name("tecnocasa srl"), "tecnocasa");
        assert_eq!(normalize_agency_name("Gabetti Agency S.p.A."), "gabetti agency");
        assert_ne!(normalize_agency_name("Tempocasa"), normalize_agency_name("Tecnocasa"));
    }
}
