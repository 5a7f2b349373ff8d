//! Finite-pattern grammars for the locality phrases the pipes recognize.
//!
//! Each parser takes the verbatim description and returns a typed phrase
//! or `None`. Nothing here touches the gazetteer.

use regex::Regex;
use std::sync::LazyLock;

use crate::text::clean_phrase;
use crate::uncertainty::distance_precision;

const NUMBER: &str = r"(?:\d+\s+\d+/\d+|\d+/\d+|\d*\.\d+|\d+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty)";
const UNIT: &str = r"(?:kilometers?|kilometres?|kms?|miles?|mi|meters?|metres?|m|feet|foot|ft|yards?|yds?)\.?";
const BEARING: &str = r"(?:north|south|east|west|northeast|northwest|southeast|southwest|north-east|north-west|south-east|south-west|[NS]\.?\s?[NS]?\.?\s?[EW]\.?|[EW]\.?\s?[NS]\.?\s?[EW]\.?|[NS]\.?|[EW]\.?)";

static DIRECTION_BEFORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:(?:about|approx\.?|ca\.?|circa)\s+)?(?P<dist>{n}(?:\s*(?:-|to)\s*{n})?)\s*(?P<unit>{u})\s+(?P<bearing>{b})\s+(?:of|from)\s+(?P<place>.+)$",
        n = NUMBER,
        u = UNIT,
        b = BEARING
    ))
    .unwrap()
});

static DIRECTION_AFTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^(?P<place>[^,]+),\s*(?:(?:about|approx\.?|ca\.?|circa)\s+)?(?P<dist>{n}(?:\s*(?:-|to)\s*{n})?)\s*(?P<unit>{u})\s+(?P<bearing>{b})(?:\s+of)?$",
        n = NUMBER,
        u = UNIT,
        b = BEARING
    ))
    .unwrap()
});

static DIRECTION_UNDIRECTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^(?:just\s+)?(?P<bearing>{b})\s+(?:of|from)\s+(?P<place>.+)$", b = BEARING)).unwrap()
});

static BY_ROUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[\s,]*\(?\bby\s+(?:road|rd\.?|trail|hwy|highway)\b\)?").unwrap());

static RANGE_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s*(?:-|\bto\b)\s*").unwrap());

static BETWEEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:.*?\s)?between\s+(?P<a>.+?)\s+(?:and|&)\s+(?P<b>.+)$").unwrap()
});

static BORDER_OF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:on|near|along)\s+)?(?:the\s+)?(?:border|boundary|line)\s+(?:of|between)\s+(?P<a>.+?)\s+(?:and|&)\s+(?P<b>.+)$",
    )
    .unwrap()
});

static BORDER_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:on|near|along)\s+)?(?:the\s+)?(?P<a>[^/]+?)\s*(?:-|/)\s*(?P<b>.+?)\s+(?:border|boundary|line)$")
        .unwrap()
});

static OFFSHORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:just\s+)?(?:off\s+(?:the\s+)?coast\s+of|offshore\s+(?:of|from)|offshore|off)\s+(?P<place>.+)$",
    )
    .unwrap()
});

static TOWNSHIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bT(?:wp|ownship)?\.?\s*(?P<num>\d+)\s*(?P<dir>[NS])\b").unwrap()
});

static RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bR(?:ng|ange)?\.?\s*(?P<num>\d+)\s*(?P<dir>[EW])\b").unwrap());

static SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:Sec(?:tion)?\.?|S)\s*(?P<num>\d+)(?:[^\d/]|$)").unwrap());

static SUBDIVISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?P<dir>NE|NW|SE|SW|N|S|E|W)\s*(?P<part>1/4|1/2|¼|½)").unwrap()
});

// ─── Distances and bearings ─────────────────────────────────────

/// A stated distance, in km.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance {
    pub min_km: f64,
    pub max_km: f64,
    /// Uncertainty of the stated value.
    pub precision_km: f64,
}

impl Distance {
    pub fn center_km(&self) -> f64 {
        (self.min_km + self.max_km) / 2.0
    }

    /// Bounds of an undirected "N of X".
    pub fn undirected(max_km: f64) -> Self {
        Self {
            min_km: 0.0,
            max_km,
            precision_km: max_km / 2.0,
        }
    }
}

/// Compass bearing of 1–3 letters.
#[derive(Debug, Clone, PartialEq)]
pub struct Bearing {
    pub letters: String,
    pub degrees: f64,
}

impl Bearing {
    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.to_lowercase();
        let letters: String = match lower.replace(|c: char| c == '-' || c == '.' || c.is_whitespace(), "").as_str() {
            "north" => "N".into(),
            "south" => "S".into(),
            "east" => "E".into(),
            "west" => "W".into(),
            "northeast" => "NE".into(),
            "northwest" => "NW".into(),
            "southeast" => "SE".into(),
            "southwest" => "SW".into(),
            other if other.len() <= 3 && other.chars().all(|c| "nsew".contains(c)) => other.to_uppercase(),
            _ => return None,
        };
        let degrees = match letters.as_str() {
            "N" => 0.0,
            "NNE" => 22.5,
            "NE" => 45.0,
            "ENE" => 67.5,
            "E" => 90.0,
            "ESE" => 112.5,
            "SE" => 135.0,
            "SSE" => 157.5,
            "S" => 180.0,
            "SSW" => 202.5,
            "SW" => 225.0,
            "WSW" => 247.5,
            "W" => 270.0,
            "WNW" => 292.5,
            "NW" => 315.0,
            "NNW" => 337.5,
            _ => return None,
        };
        Some(Self { letters, degrees })
    }

    /// Half-width of the compass sector: coarser bearings are wider.
    pub fn half_width_deg(&self) -> f64 {
        match self.letters.len() {
            1 => 45.0,
            2 => 22.5,
            _ => 11.25,
        }
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim().to_lowercase();
    let words = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
        "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen", "nineteen", "twenty",
    ];
    if let Some(n) = words.iter().position(|w| *w == raw) {
        return Some(n as f64);
    }
    let fraction = |s: &str| -> Option<f64> {
        let (num, den) = s.split_once('/')?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        Some(num.trim().parse::<f64>().ok()? / den)
    };
    match raw.split_once(char::is_whitespace) {
        Some((whole, frac)) => Some(whole.parse::<f64>().ok()? + fraction(frac.trim())?),
        None if raw.contains('/') => fraction(&raw),
        None => raw.parse().ok(),
    }
}

fn unit_km(raw: &str) -> Option<f64> {
    let unit = raw.trim_end_matches('.').to_lowercase();
    let factor = match unit.as_str() {
        "km" | "kms" | "kilometer" | "kilometers" | "kilometre" | "kilometres" => 1.0,
        "mi" | "mile" | "miles" => 1.609344,
        "m" | "meter" | "meters" | "metre" | "metres" => 0.001,
        "ft" | "foot" | "feet" => 0.0003048,
        "yd" | "yds" | "yard" | "yards" => 0.0009144,
        _ => return None,
    };
    Some(factor)
}

/// Parse "5", "2 1/2", "5-10", "five to ten" with a unit.
///
/// Ranges carry half their span as precision; single values use the
/// order-of-magnitude rule. Route distances are maxima.
pub fn parse_distance(raw: &str, unit: &str, by_route: bool) -> Option<Distance> {
    let factor = unit_km(unit)?;
    let parts: Vec<&str> = RANGE_SPLIT.split(raw.trim()).filter(|p| !p.is_empty()).collect();
    let (mut min, max, mut precision) = match parts.as_slice() {
        [single] => {
            let d = parse_number(single)?;
            (d, d, distance_precision(d))
        }
        [lo, hi] => {
            let (lo, hi) = (parse_number(lo)?, parse_number(hi)?);
            if hi < lo {
                return None;
            }
            (lo, hi, (hi - lo) / 2.0)
        }
        _ => return None,
    };
    if by_route {
        min /= 2.0;
        precision = precision.max((max - min) / 2.0);
    }
    Some(Distance {
        min_km: min * factor,
        max_km: max * factor,
        precision_km: precision * factor,
    })
}

// ─── Phrases ────────────────────────────────────────────────────

/// "<distance> <bearing> of <place>"
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionPhrase {
    pub place: String,
    pub bearing: Bearing,
    /// `None` for an undirected phrase ("N of X").
    pub distance: Option<Distance>,
    pub by_route: bool,
}

pub fn parse_direction(text: &str) -> Option<DirectionPhrase> {
    let by_route = BY_ROUTE.is_match(text);
    let stripped = BY_ROUTE.replace_all(text, "");
    let text = clean_phrase(&stripped);

    if let Some(caps) = DIRECTION_BEFORE.captures(&text).or_else(|| DIRECTION_AFTER.captures(&text)) {
        let bearing = Bearing::parse(&caps["bearing"])?;
        let distance = parse_distance(&caps["dist"], &caps["unit"], by_route)?;
        return Some(DirectionPhrase {
            place: clean_phrase(&caps["place"]),
            bearing,
            distance: Some(distance),
            by_route,
        });
    }
    let caps = DIRECTION_UNDIRECTED.captures(&text)?;
    Some(DirectionPhrase {
        place: clean_phrase(&caps["place"]),
        bearing: Bearing::parse(&caps["bearing"])?,
        distance: None,
        by_route,
    })
}

/// Two named places, as in "between A and B" or "A/B border".
#[derive(Debug, Clone, PartialEq)]
pub struct PlacePair {
    pub a: String,
    pub b: String,
}

fn strip_article(s: &str) -> String {
    let s = clean_phrase(s);
    match s.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("the ") => s[4..].to_string(),
        _ => s,
    }
}

fn pair(a: &str, b: &str) -> Option<PlacePair> {
    let (a, b) = (strip_article(a), strip_article(b));
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some(PlacePair { a, b })
}

pub fn parse_between(text: &str) -> Option<PlacePair> {
    // "border between A and B" belongs to the border grammar
    if BORDER_OF.is_match(&clean_phrase(text)) {
        return None;
    }
    let caps = BETWEEN.captures(text.trim())?;
    pair(&caps["a"], &caps["b"])
}

pub fn parse_border(text: &str) -> Option<PlacePair> {
    let text = clean_phrase(text);
    let caps = BORDER_OF.captures(&text).or_else(|| BORDER_SUFFIX.captures(&text))?;
    pair(&caps["a"], &caps["b"])
}

/// The place named in "off X", "offshore of X", "off the coast of X".
pub fn parse_offshore(text: &str) -> Option<String> {
    let caps = OFFSHORE.captures(text.trim())?;
    let place = strip_article(&caps["place"]);
    (!place.is_empty()).then_some(place)
}

/// A quarter or half of the enclosing tract.
#[derive(Debug, Clone, PartialEq)]
pub struct Subdivision {
    /// N, S, E, W, NE, NW, SE or SW
    pub direction: String,
    pub half: bool,
}

/// Township/range/section description.
#[derive(Debug, Clone, PartialEq)]
pub struct PlssPhrase {
    pub township: u32,
    pub township_dir: char,
    pub range: u32,
    pub range_dir: char,
    pub section: Option<u32>,
    /// Outermost first, as written ("NW 1/4 SE 1/4" → [NW, SE]).
    pub subdivisions: Vec<Subdivision>,
    /// Raw digit counts, checked by the pipe.
    pub township_digits: usize,
    pub range_digits: usize,
}

impl PlssPhrase {
    pub fn township_token(&self) -> String {
        format!("T{}{}", self.township, self.township_dir)
    }

    pub fn range_token(&self) -> String {
        format!("R{}{}", self.range, self.range_dir)
    }
}

/// Recognized when both a township and a range token are present.
pub fn parse_plss(text: &str) -> Option<PlssPhrase> {
    let twp = TOWNSHIP.captures(text)?;
    let rng = RANGE.captures(text)?;
    let dir = |caps: &regex::Captures, name: &str| caps[name].to_uppercase().chars().next();

    let sec_caps = SECTION.captures(text);
    let section = sec_caps.as_ref().and_then(|c| c["num"].parse().ok());
    let section_start = sec_caps
        .as_ref()
        .and_then(|c| c.get(0))
        .map(|m| m.start())
        .unwrap_or(text.len());

    let subdivisions = SUBDIVISION
        .captures_iter(&text[..section_start])
        .map(|c| Subdivision {
            direction: c["dir"].to_uppercase(),
            half: matches!(&c["part"], "1/2" | "½"),
        })
        .collect();

    Some(PlssPhrase {
        township: twp["num"].parse().ok()?,
        township_dir: dir(&twp, "dir")?,
        range: rng["num"].parse().ok()?,
        range_dir: dir(&rng, "dir")?,
        section,
        subdivisions,
        township_digits: twp["num"].len(),
        range_digits: rng["num"].len(),
    })
}
