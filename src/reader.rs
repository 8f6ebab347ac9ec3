//! Plain-text corpus inputs.
//!
//! Token array, one token per line:
//!
//! ```text
//! # word doc toponym stopword [coordinate]
//! 0 0 1 0 1
//! 4 0 0 0
//! ```
//!
//! Toponym regions, `word: r1 r2 ...`; toponym coordinates,
//! `word: lat,long lat,long ...` in degrees. Blank lines and lines starting
//! with `#` are skipped in all three.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::corpus::{CandidacyFilter, CoordinateLexicon, TokenCorpus};
use crate::error::{Error, Result};

fn token_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s+(\d+)\s+(\d+)\s+(\d+)(?:\s+(\d+))?\s*$").expect("token line pattern")
    })
}

fn keyed_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*(\d+)\s*:(.*)$").expect("keyed line pattern"))
}

fn coordinate_pair() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([-+]?\d+(?:\.\d*)?),([-+]?\d+(?:\.\d*)?)$").expect("coordinate pair pattern")
    })
}

/// A token array plus the optional per-token coordinate column.
#[derive(Debug, Clone)]
pub struct TokenFile {
    pub corpus: TokenCorpus,
    pub coordinate_indices: Vec<Option<usize>>,
}

// Yields (1-based line number, trimmed line) for every non-comment line.
fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn parse_error(path: &Path, line: usize, message: impl Into<String>) -> Error {
    Error::Parse {
        path: path.to_path_buf(),
        line,
        message: message.into(),
    }
}

fn parse_id(path: &Path, line: usize, field: &str) -> Result<usize> {
    field
        .parse()
        .map_err(|_| parse_error(path, line, format!("'{}' is not a valid id", field)))
}

pub fn read_token_array(path: impl AsRef<Path>) -> Result<TokenFile> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;

    let mut words = Vec::new();
    let mut documents = Vec::new();
    let mut toponyms = Vec::new();
    let mut stopwords = Vec::new();
    let mut coordinate_indices = Vec::new();

    for (line_number, line) in content_lines(&text) {
        let Some(caps) = token_line().captures(line) else {
            return Err(parse_error(
                path,
                line_number,
                "expected 'word doc toponym stopword [coordinate]'",
            ));
        };
        words.push(parse_id(path, line_number, &caps[1])?);
        documents.push(parse_id(path, line_number, &caps[2])?);
        for (column, flags) in [(3, &mut toponyms), (4, &mut stopwords)] {
            match &caps[column] {
                "0" => flags.push(0),
                "1" => flags.push(1),
                other => {
                    return Err(parse_error(path, line_number, format!("flag must be 0 or 1, got {}", other)));
                }
            }
        }
        let coordinate = match caps.get(5) {
            Some(m) => Some(parse_id(path, line_number, m.as_str())?),
            None => None,
        };
        coordinate_indices.push(coordinate);
    }

    let corpus = TokenCorpus::new(words, documents, toponyms, stopwords)?;
    info!(
        path = %path.display(),
        tokens = corpus.len(),
        words = corpus.vocabulary_size(),
        documents = corpus.document_count(),
        "read token array"
    );
    Ok(TokenFile {
        corpus,
        coordinate_indices,
    })
}

/// Reads a toponym-region filter for a vocabulary of `words`; R is one more
/// than the largest region id mentioned.
pub fn read_toponym_regions(path: impl AsRef<Path>, words: usize) -> Result<CandidacyFilter> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;

    let mut rows = Vec::new();
    let mut regions = 0;
    for (line_number, line) in content_lines(&text) {
        let Some(caps) = keyed_line().captures(line) else {
            return Err(parse_error(path, line_number, "expected 'word: region region ...'"));
        };
        let word = parse_id(path, line_number, &caps[1])?;
        let candidates = caps[2]
            .split_whitespace()
            .map(|field| parse_id(path, line_number, field))
            .collect::<Result<Vec<usize>>>()?;
        if let Some(&max) = candidates.iter().max() {
            regions = regions.max(max + 1);
        }
        rows.push((word, candidates));
    }

    let filter = CandidacyFilter::from_rows(words, regions, rows)?;
    info!(path = %path.display(), regions, "read toponym regions");
    Ok(filter)
}

pub fn read_toponym_coordinates(path: impl AsRef<Path>, words: usize) -> Result<CoordinateLexicon> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;

    let mut lexicon = CoordinateLexicon::new(words);
    let mut count = 0;
    for (line_number, line) in content_lines(&text) {
        let Some(caps) = keyed_line().captures(line) else {
            return Err(parse_error(path, line_number, "expected 'word: lat,long lat,long ...'"));
        };
        let word = parse_id(path, line_number, &caps[1])?;
        for field in caps[2].split_whitespace() {
            let Some(pair) = coordinate_pair().captures(field) else {
                return Err(parse_error(path, line_number, format!("'{}' is not a lat,long pair", field)));
            };
            let latitude: f64 = pair[1]
                .parse()
                .map_err(|_| parse_error(path, line_number, format!("bad latitude '{}'", &pair[1])))?;
            let longitude: f64 = pair[2]
                .parse()
                .map_err(|_| parse_error(path, line_number, format!("bad longitude '{}'", &pair[2])))?;
            lexicon.insert(word, latitude, longitude)?;
            count += 1;
        }
    }

    info!(path = %path.display(), coordinates = count, "read toponym coordinates");
    Ok(lexicon)
}
