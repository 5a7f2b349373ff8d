//! Feature-code catalog: specificity and typical extent per GeoNames code.
//!
//! Specificity grows as features get smaller (continent 0 … building 10).
//! Typical radii are used for point features whose real extent is unknown.

/// (code, class, specificity, typical radius km)
const CATALOG: &[(&str, char, u8, f64)] = &[
    // ─── Areas ───
    ("CONT", 'L', 0, 3000.0),
    ("OCN", 'H', 0, 2000.0),
    ("SEA", 'H', 1, 500.0),
    ("GULF", 'H', 2, 200.0),
    ("PCLI", 'A', 1, 500.0),
    ("PCLD", 'A', 1, 200.0),
    ("PCLS", 'A', 1, 100.0),
    ("ADM1", 'A', 2, 200.0),
    ("ADM2", 'A', 3, 30.0),
    ("ADM3", 'A', 4, 10.0),
    ("ADM4", 'A', 5, 5.0),
    ("ADMD", 'A', 4, 10.0),
    ("PRK", 'L', 5, 10.0),
    ("RESV", 'L', 5, 10.0),
    ("AREA", 'L', 4, 20.0),
    ("RGN", 'L', 3, 50.0),
    // ─── Populated places ───
    ("PPLC", 'P', 6, 20.0),
    ("PPLA", 'P', 6, 15.0),
    ("PPLA2", 'P', 7, 8.0),
    ("PPLA3", 'P', 7, 5.0),
    ("PPLA4", 'P', 7, 3.0),
    ("PPL", 'P', 7, 5.0),
    ("PPLL", 'P', 8, 2.0),
    ("PPLX", 'P', 8, 2.0),
    ("PPLH", 'P', 7, 3.0),
    // ─── Hydrographic ───
    ("BAY", 'H', 4, 10.0),
    ("COVE", 'H', 7, 1.0),
    ("LK", 'H', 6, 3.0),
    ("LKS", 'H', 5, 5.0),
    ("RSV", 'H', 6, 3.0),
    ("STM", 'H', 5, 10.0),
    ("SPNG", 'H', 8, 0.5),
    ("SD", 'H', 5, 10.0),
    ("CHN", 'H', 5, 10.0),
    // ─── Terrain and islands ───
    ("ISL", 'T', 6, 5.0),
    ("ISLS", 'T', 5, 20.0),
    ("MT", 'T', 7, 2.0),
    ("MTS", 'T', 4, 50.0),
    ("PK", 'T', 8, 1.0),
    ("HLL", 'T', 8, 1.0),
    ("VLC", 'T', 7, 3.0),
    ("VAL", 'T', 6, 5.0),
    ("CNYN", 'T', 6, 5.0),
    ("CAPE", 'T', 7, 2.0),
    ("PT", 'T', 8, 1.0),
    ("BCH", 'T', 7, 2.0),
    ("DSRT", 'T', 3, 100.0),
    ("PLN", 'T', 4, 30.0),
    // ─── Spots and structures ───
    ("MN", 'S', 9, 0.5),
    ("MNQ", 'S', 9, 0.5),
    ("MNAU", 'S', 9, 0.5),
    ("BLDG", 'S', 10, 0.1),
    ("FRM", 'S', 9, 0.5),
    ("SCH", 'S', 10, 0.2),
    ("RSTN", 'S', 10, 0.2),
    ("RD", 'R', 6, 5.0),
    ("TRL", 'R', 6, 5.0),
    ("FRST", 'V', 5, 10.0),
    ("UNDA", 'U', 3, 50.0),
    // ─── Survey grid ───
    ("PLSS", 'L', 8, 1.0),
];

pub const FEATURE_CLASSES: &[char] = &['A', 'H', 'L', 'P', 'R', 'S', 'T', 'U', 'V'];

const CLASS_EXCLUDED: &[&str] = &["CONT", "OCN"];

const DEFAULT_SPECIFICITY: u8 = 5;
const DEFAULT_RADIUS_KM: f64 = 5.0;

fn entry(code: &str) -> Option<&'static (&'static str, char, u8, f64)> {
    CATALOG.iter().find(|(c, ..)| c.eq_ignore_ascii_case(code))
}

pub fn specificity(code: &str) -> u8 {
    entry(code).map(|e| e.2).unwrap_or(DEFAULT_SPECIFICITY)
}

pub fn typical_radius_km(code: &str) -> f64 {
    entry(code).map(|e| e.3).unwrap_or(DEFAULT_RADIUS_KM)
}

/// Expand single-letter feature classes into their codes.
///
/// Multi-letter codes pass through uppercased. Continents and oceans are
/// left out of class expansions and must be named explicitly. Unknown
/// single letters are rejected. Order is kept and duplicates dropped.
pub fn expand(codes: &[String]) -> Result<Vec<String>, String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |code: String| {
        if !out.contains(&code) {
            out.push(code);
        }
    };
    for raw in codes {
        let code = raw.trim().to_uppercase();
        if code.is_empty() {
            return Err("empty feature code".into());
        }
        let mut chars = code.chars();
        match (chars.next(), chars.next()) {
            (Some(class), None) => {
                if !FEATURE_CLASSES.contains(&class) {
                    return Err(format!("unknown feature class '{}'", class));
                }
                for (c, cls, ..) in CATALOG {
                    if *cls == class && !CLASS_EXCLUDED.contains(c) {
                        push(c.to_string());
                    }
                }
            }
            _ => push(code),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specificity_orders_admin_levels() {
        assert!(specificity("PCLI") < specificity("ADM1"));
        assert!(specificity("ADM1") < specificity("ADM2"));
        assert!(specificity("ADM2") < specificity("PPL"));
        assert_eq!(specificity("ppl"), specificity("PPL"));
    }

    #[test]
    fn test_unknown_code_defaults() {
        assert_eq!(specificity("ZZZZ"), DEFAULT_SPECIFICITY);
        assert_eq!(typical_radius_km("ZZZZ"), DEFAULT_RADIUS_KM);
    }

    #[test]
    fn test_expand_class() {
        let codes = expand(&["P".to_string(), "ADM2".to_string()]).unwrap();
        assert!(codes.contains(&"PPL".to_string()));
        assert!(codes.contains(&"PPLA".to_string()));
        assert_eq!(codes.last().unwrap(), "ADM2");
        assert!(!codes.contains(&"ADM1".to_string()));

        let hydro = expand(&["H".to_string()]).unwrap();
        assert!(hydro.contains(&"SEA".to_string()));
        assert!(!hydro.contains(&"OCN".to_string()));
        assert_eq!(expand(&["OCN".to_string()]).unwrap(), vec!["OCN"]);
    }

    #[test]
    fn test_expand_rejects_unknown_class() {
        assert!(expand(&["Q".to_string()]).is_err());
        assert!(expand(&["".to_string()]).is_err());
    }
}
