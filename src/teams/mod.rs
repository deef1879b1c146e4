//! Single source of truth for team naming.
//!
//! Odds feeds, rating sheets and box scores disagree on how teams are
//! written ("BOS", "Boston", "Boston Celtics", "LA Clippers"). Everything that
//! stores or compares a team name goes through [`canonical_team_name`] first.

use strsim::jaro_winkler;

/// Minimum Jaro-Winkler similarity for a fuzzy match to be accepted.
const FUZZY_THRESHOLD: f64 = 0.95;

// (abbreviation, full name)
pub const NBA_TEAMS: &[(&str, &str)] = &[
    ("ATL", "Atlanta Hawks"),
    ("BOS", "Boston Celtics"),
    ("BKN", "Brooklyn Nets"),
    ("CHA", "Charlotte Hornets"),
    ("CHI", "Chicago Bulls"),
    ("CLE", "Cleveland Cavaliers"),
    ("DAL", "Dallas Mavericks"),
    ("DEN", "Denver Nuggets"),
    ("DET", "Detroit Pistons"),
    ("GSW", "Golden State Warriors"),
    ("HOU", "Houston Rockets"),
    ("IND", "Indiana Pacers"),
    ("LAC", "Los Angeles Clippers"),
    ("LAL", "Los Angeles Lakers"),
    ("MEM", "Memphis Grizzlies"),
    ("MIA", "Miami Heat"),
    ("MIL", "Milwaukee Bucks"),
    ("MIN", "Minnesota Timberwolves"),
    ("NOP", "New Orleans Pelicans"),
    ("NYK", "New York Knicks"),
    ("OKC", "Oklahoma City Thunder"),
    ("ORL", "Orlando Magic"),
    ("PHI", "Philadelphia 76ers"),
    ("PHX", "Phoenix Suns"),
    ("POR", "Portland Trail Blazers"),
    ("SAC", "Sacramento Kings"),
    ("SAS", "San Antonio Spurs"),
    ("TOR", "Toronto Raptors"),
    ("UTA", "Utah Jazz"),
    ("WAS", "Washington Wizards"),
];

// Alternate spellings seen in feeds that the fuzzy pass gets wrong.
const ALIASES: &[(&str, &str)] = &[
    ("BRK", "Brooklyn Nets"),
    ("CHO", "Charlotte Hornets"),
    ("GS", "Golden State Warriors"),
    ("NO", "New Orleans Pelicans"),
    ("NY", "New York Knicks"),
    ("PHO", "Phoenix Suns"),
    ("SA", "San Antonio Spurs"),
    ("UTAH", "Utah Jazz"),
    ("WSH", "Washington Wizards"),
    ("LA Clippers", "Los Angeles Clippers"),
    ("LA Lakers", "Los Angeles Lakers"),
];

/// Look up the full team name for an abbreviation ("BOS" -> "Boston Celtics").
pub fn full_name(abbreviation: &str) -> Option<&'static str> {
    let key = abbreviation.trim().to_uppercase();
    NBA_TEAMS
        .iter()
        .chain(ALIASES.iter())
        .find(|(abbr, _)| abbr.to_uppercase() == key)
        .map(|(_, name)| *name)
}

/// Look up the abbreviation for a full team name.
pub fn abbreviation(name: &str) -> Option<&'static str> {
    let canonical = canonical_team_name(name);
    NBA_TEAMS
        .iter()
        .find(|(_, full)| *full == canonical)
        .map(|(abbr, _)| *abbr)
}

/// Resolve any spelling to the canonical full name.
///
/// Unknown names are returned trimmed but otherwise untouched, so teams
/// outside the table still compare equal to themselves.
pub fn canonical_team_name(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Some(name) = full_name(trimmed) {
        return name.to_string();
    }

    let lowered = normalize(trimmed);
    if let Some((_, name)) = NBA_TEAMS.iter().find(|(_, full)| normalize(full) == lowered) {
        return name.to_string();
    }

    // Nickname only ("Celtics") or city only ("Boston")
    let by_part: Vec<&str> = NBA_TEAMS
        .iter()
        .filter(|(_, full)| {
            let full = normalize(full);
            full.ends_with(&format!(" {}", lowered)) || full.starts_with(&format!("{} ", lowered))
        })
        .map(|(_, full)| *full)
        .collect();
    if by_part.len() == 1 {
        return by_part[0].to_string();
    }

    let best = NBA_TEAMS
        .iter()
        .map(|(_, full)| (*full, jaro_winkler(&normalize(full), &lowered)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    match best {
        Some((name, score)) if score >= FUZZY_THRESHOLD => name.to_string(),
        _ => trimmed.to_string(),
    }
}

/// True when both spellings resolve to the same team.
pub fn names_match(a: &str, b: &str) -> bool {
    canonical_team_name(a) == canonical_team_name(b)
}

fn normalize(s: &str) -> String {
    s.to_lowercase()
        .replace('.', "")
        .replace('-', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviation_lookup() {
        assert_eq!(full_name("BOS"), Some("Boston Celtics"));
        assert_eq!(full_name("gsw"), Some("Golden State Warriors"));
        assert_eq!(full_name("BRK"), Some("Brooklyn Nets"));
        assert_eq!(full_name("XYZ"), None);
        assert_eq!(abbreviation("Denver Nuggets"), Some("DEN"));
    }

    #[test]
    fn test_canonical_names() {
        assert_eq!(canonical_team_name("LA Clippers"), "Los Angeles Clippers");
        assert_eq!(canonical_team_name("boston celtics"), "Boston Celtics");
        assert_eq!(canonical_team_name("Celtics"), "Boston Celtics");
        assert_eq!(canonical_team_name("Philadelphia 76ers"), "Philadelphia 76ers");
        assert_eq!(canonical_team_name("Portland Trailblazers"), "Portland Trail Blazers");
    }

    #[test]
    fn test_ambiguous_city_is_left_alone() {
        // Two Los Angeles teams, so the city alone does not resolve
        assert_eq!(canonical_team_name("Los Angeles"), "Los Angeles");
    }

    #[test]
    fn test_names_match() {
        assert!(names_match("NYK", "New York Knicks"));
        assert!(!names_match("Los Angeles Lakers", "Los Angeles Clippers"));
    }
}
