//! Public Land Survey System descriptions ("NW 1/4 Sec 12 T5N R3E").

use crate::error::ResolveError;
use crate::gazetteer::{plss_key, StoreKind};
use crate::geometry::Shape;
use crate::hierarchy::Candidate;
use crate::record::{HintField, LocalityRecord};
use crate::uncertainty::{estimate, Strategy};

use super::grammar::{parse_plss, PlssPhrase, Subdivision};
use super::{Citation, MatchResult, Pipe, PipeContext, PipeKind};

/// States surveyed under the PLSS, by postal code.
const PLSS_STATES: &[(&str, &str)] = &[
    ("AL", "alabama"),
    ("AK", "alaska"),
    ("AZ", "arizona"),
    ("AR", "arkansas"),
    ("CA", "california"),
    ("CO", "colorado"),
    ("FL", "florida"),
    ("ID", "idaho"),
    ("IL", "illinois"),
    ("IN", "indiana"),
    ("IA", "iowa"),
    ("KS", "kansas"),
    ("LA", "louisiana"),
    ("MI", "michigan"),
    ("MN", "minnesota"),
    ("MS", "mississippi"),
    ("MO", "missouri"),
    ("MT", "montana"),
    ("NE", "nebraska"),
    ("NV", "nevada"),
    ("NM", "new mexico"),
    ("ND", "north dakota"),
    ("OH", "ohio"),
    ("OK", "oklahoma"),
    ("OR", "oregon"),
    ("SD", "south dakota"),
    ("UT", "utah"),
    ("WA", "washington"),
    ("WI", "wisconsin"),
    ("WY", "wyoming"),
];

fn state_code(value: &str) -> Option<&'static str> {
    let value = value.trim().trim_end_matches('.').to_lowercase();
    PLSS_STATES
        .iter()
        .find(|(code, name)| code.eq_ignore_ascii_case(&value) || *name == value)
        .map(|(code, _)| *code)
}

/// Box as (min_lon, min_lat, max_lon, max_lat).
type Bounds = (f64, f64, f64, f64);

fn bounds(shape: &Shape) -> Option<Bounds> {
    let vertices = shape.vertices();
    if vertices.is_empty() {
        return None;
    }
    Some(vertices.iter().fold(
        (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
        |(x0, y0, x1, y1), p| (x0.min(p.x()), y0.min(p.y()), x1.max(p.x()), y1.max(p.y())),
    ))
}

fn subdivide((x0, y0, x1, y1): Bounds, part: &Subdivision) -> Bounds {
    let (mx, my) = ((x0 + x1) / 2.0, (y0 + y1) / 2.0);
    let dir = part.direction.as_str();
    let (x0, x1) = if dir.contains('E') {
        (mx, x1)
    } else if dir.contains('W') {
        (x0, mx)
    } else {
        (x0, x1)
    };
    let (y0, y1) = if dir.starts_with('N') {
        (my, y1)
    } else if dir.starts_with('S') {
        (y0, my)
    } else {
        (y0, y1)
    };
    (x0, y0, x1, y1)
}

fn check(phrase: &PlssPhrase) -> Result<u32, ResolveError> {
    if phrase.township_digits > 2 || phrase.range_digits > 2 {
        return Err(ResolveError::Malformed(format!(
            "{} {} has too many digits",
            phrase.township_token(),
            phrase.range_token()
        )));
    }
    match phrase.section {
        Some(s) if (1..=36).contains(&s) => Ok(s),
        Some(s) => Err(ResolveError::Malformed(format!("section {} outside 1..36", s))),
        None => Err(ResolveError::Malformed(format!(
            "{} {} names no section",
            phrase.township_token(),
            phrase.range_token()
        ))),
    }
}

pub struct PlssPipe;

impl Pipe for PlssPipe {
    fn kind(&self) -> PipeKind {
        PipeKind::Plss
    }

    fn attempt(&self, record: &LocalityRecord, ctx: &PipeContext) -> Result<Option<MatchResult>, ResolveError> {
        let Some(phrase) = parse_plss(&record.description) else {
            return Ok(None);
        };
        let section = check(&phrase)?;
        let state = record
            .hint(HintField::StateProvince)
            .ok_or_else(|| ResolveError::Malformed("PLSS description without a state".into()))?;
        let code = state_code(state)
            .ok_or_else(|| ResolveError::Malformed(format!("'{}' is not a PLSS state", state)))?;

        let key = plss_key(code, &phrase.township_token(), &phrase.range_token(), section);
        let candidates: Vec<Candidate> = ctx
            .index()
            .lookup(&key, StoreKind::Plss, None)?
            .into_iter()
            .map(|f| Candidate::new(f, StoreKind::Plss))
            .collect();
        if candidates.is_empty() {
            return Err(ResolveError::NoMatch(format!("no PLSS section {}", key)));
        }
        let ranked = ctx.resolver.narrow(candidates, record, &[])?;
        let selected = ctx.resolver.select(&key, ranked)?;

        let section_bounds = bounds(&selected.feature.geometry)
            .ok_or_else(|| ResolveError::InvalidGeometry(format!("{} has no vertices", selected.feature.id)))?;
        let (x0, y0, x1, y1) = phrase.subdivisions.iter().rev().fold(section_bounds, subdivide);
        let geometry = Shape::bbox(x0, y0, x1, y1);
        let radius = estimate(&geometry, &Strategy::Plss, &ctx.params);

        let mut reasoning = String::new();
        for part in &phrase.subdivisions {
            reasoning.push_str(&format!("{} {} ", part.direction, if part.half { "1/2" } else { "1/4" }));
        }
        reasoning.push_str(&format!("of {}", key));
        let citation = Citation {
            store: selected.store,
            feature_id: selected.feature.id.clone(),
            name: selected.feature.name.clone(),
        };
        MatchResult::new(PipeKind::Plss, geometry, radius, &reasoning, vec![citation]).map(Some)
    }
}
