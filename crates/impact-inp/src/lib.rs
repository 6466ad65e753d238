//! Abaqus-style `.inp` keyword deck reader.
//!
//! A deck is a flat list of cards. Every card starts with a `*KEYWORD` header
//! line carrying optional `KEY=VALUE` parameters, followed by comma-separated
//! data lines up to the next header. Lines starting with `**` are comments.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub keyword: String,
    pub parameters: Vec<Parameter>,
    pub data_lines: Vec<String>,
    pub line_start: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

impl Deck {
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| ParseError::new(0, format!("failed to read {}: {e}", path.display())))?;
        Self::parse_str(&raw)
    }

    pub fn parse_str(raw: &str) -> Result<Self, ParseError> {
        let lines: Vec<&str> = raw.lines().collect();
        let mut cards = Vec::new();
        let mut i = 0usize;

        while i < lines.len() {
            let trimmed = lines[i].trim();
            if is_blank_or_comment(trimmed) {
                i += 1;
                continue;
            }

            let Some(header_text) = trimmed.strip_prefix('*') else {
                return Err(ParseError::new(i + 1, "data line outside of any card"));
            };

            let line_start = i + 1;
            let mut header = header_text.trim().to_string();
            i += 1;

            // A header may continue on following lines that begin with a comma.
            while let Some(next) = lines.get(i).map(|l| l.trim()) {
                if !next.starts_with(',') {
                    break;
                }
                header.push_str(next);
                i += 1;
            }

            let (keyword, parameters) = parse_header(&header, line_start)?;

            let mut data_lines = Vec::new();
            while let Some(candidate) = lines.get(i).map(|l| l.trim()) {
                if candidate.starts_with('*') && !candidate.starts_with("**") {
                    break;
                }
                if !is_blank_or_comment(candidate) {
                    data_lines.push(candidate.to_string());
                }
                i += 1;
            }

            cards.push(Card {
                keyword,
                parameters,
                data_lines,
                line_start,
            });
        }

        Ok(Deck { cards })
    }

    /// All cards with the given keyword, in deck order. Matching ignores case
    /// and embedded spaces.
    pub fn cards_named<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a Card> + 'a {
        let wanted = normalize_keyword(keyword);
        self.cards
            .iter()
            .filter(move |card| normalize_keyword(&card.keyword) == wanted)
    }
}

impl Card {
    /// Value of a `KEY=VALUE` parameter.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(key))
            .and_then(|p| p.value.as_deref())
    }

    /// Whether a bare flag parameter (no value) is present.
    pub fn has_flag(&self, key: &str) -> bool {
        self.parameters
            .iter()
            .any(|p| p.key.eq_ignore_ascii_case(key) && p.value.is_none())
    }

    /// Comma-separated fields of every data line, trimmed, with empty
    /// trailing fields dropped, paired with a line number for diagnostics
    /// (header line plus data-line offset; comment lines are not counted).
    pub fn rows(&self) -> impl Iterator<Item = (usize, Vec<&str>)> + '_ {
        self.data_lines.iter().enumerate().map(|(offset, line)| {
            let fields = line
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .collect();
            (self.line_start + offset + 1, fields)
        })
    }
}

fn is_blank_or_comment(line: &str) -> bool {
    line.is_empty() || line.starts_with("**")
}

fn normalize_keyword(keyword: &str) -> String {
    keyword
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

fn parse_header(header: &str, line: usize) -> Result<(String, Vec<Parameter>), ParseError> {
    let mut parts = header.split(',');
    let keyword = parts.next().unwrap_or_default().trim();
    if keyword.is_empty() {
        return Err(ParseError::new(line, "empty card keyword"));
    }

    let parameters = parts
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.split_once('=') {
            Some((k, v)) => Parameter {
                key: k.trim().to_ascii_uppercase(),
                value: Some(v.trim().to_string()),
            },
            None => Parameter {
                key: item.to_ascii_uppercase(),
                value: None,
            },
        })
        .collect();

    Ok((keyword.to_ascii_uppercase(), parameters))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUBE_CORNER: &str = r#"
** single tetrahedron with a slave set
*HEADING
Impact cube corner
*NODE, NSET=NALL
1, 0.0, 0.0, 0.0
2, 1.0, 0.0, 0.0
3, 0.0, 1.0, 0.0
4, 0.0, 0.0, 1.0
*ELEMENT, TYPE=C3D4, ELSET=EALL
1, 1, 2, 3, 4
*NSET, NSET=SLAVE
1, 2, 3,
"#;

    #[test]
    fn parses_cards_and_data_lines() {
        let deck = Deck::parse_str(CUBE_CORNER).expect("parser should succeed");
        assert_eq!(deck.cards.len(), 4);
        assert_eq!(deck.cards[1].keyword, "NODE");
        assert_eq!(deck.cards[1].data_lines.len(), 4);
        assert_eq!(deck.cards[2].parameter("type"), Some("C3D4"));
    }

    #[test]
    fn rows_drop_trailing_empty_fields() {
        let deck = Deck::parse_str(CUBE_CORNER).unwrap();
        let nset = deck.cards_named("nset").next().unwrap();
        let rows: Vec<_> = nset.rows().collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, vec!["1", "2", "3"]);
        assert_eq!(rows[0].0, nset.line_start + 1);
    }

    #[test]
    fn keyword_lookup_ignores_spaces_and_case() {
        let deck = Deck::parse_str("*Specific Heat\n450.0\n").unwrap();
        assert_eq!(deck.cards_named("SPECIFICHEAT").count(), 1);
    }

    #[test]
    fn parses_header_continuation_and_flags() {
        let src = "*NSET, NSET=WALL\n, GENERATE\n1, 10, 1\n";
        let deck = Deck::parse_str(src).expect("parser should succeed");
        assert_eq!(deck.cards.len(), 1);
        assert!(deck.cards[0].has_flag("generate"));
        assert_eq!(deck.cards[0].parameter("NSET"), Some("WALL"));
    }

    #[test]
    fn comments_between_data_lines_are_skipped() {
        let src = "*NODE\n1, 0, 0, 0\n** note\n2, 1, 0, 0\n";
        let deck = Deck::parse_str(src).unwrap();
        assert_eq!(deck.cards[0].data_lines.len(), 2);
    }

    #[test]
    fn fails_on_orphan_data_before_first_card() {
        let err = Deck::parse_str("1,2,3\n*NODE\n1,0,0,0\n").expect_err("should fail");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn fails_on_empty_keyword() {
        let err = Deck::parse_str("*, NSET=A\n").expect_err("should fail");
        assert!(err.message.contains("empty"));
    }
}
