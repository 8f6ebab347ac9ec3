use serde::Serialize;

use crate::error::{Error, Result};

/// Parallel token arrays for a whole corpus, in document order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenCorpus {
    words: Vec<usize>,
    documents: Vec<usize>,
    toponyms: Vec<bool>,
    stopwords: Vec<bool>,
    vocabulary_size: usize, // W: max active word id + 1
    document_count: usize,  // D: max document id + 1
}

impl TokenCorpus {
    /// Builds a corpus from 0/1 flag arrays. W is derived from the active
    /// (non-stopword) tokens only, D from every token.
    pub fn new(
        words: Vec<usize>,
        documents: Vec<usize>,
        toponyms: Vec<u8>,
        stopwords: Vec<u8>,
    ) -> Result<Self> {
        let n = words.len();
        if documents.len() != n || toponyms.len() != n || stopwords.len() != n {
            return Err(Error::Corpus(format!(
                "token arrays differ in length: words={} documents={} toponyms={} stopwords={}",
                n,
                documents.len(),
                toponyms.len(),
                stopwords.len()
            )));
        }

        let toponyms = to_flags(toponyms, "toponym")?;
        let stopwords = to_flags(stopwords, "stopword")?;

        if let Some(i) = documents.windows(2).position(|w| w[1] < w[0]) {
            return Err(Error::Corpus(format!(
                "document ids must be non-decreasing: token {} has document {} after {}",
                i + 1,
                documents[i + 1],
                documents[i]
            )));
        }

        let vocabulary_size = words
            .iter()
            .zip(&stopwords)
            .filter(|&(_, &stop)| !stop)
            .map(|(&w, _)| w + 1)
            .max()
            .unwrap_or(0);
        let document_count = documents.last().map(|&d| d + 1).unwrap_or(0);

        Ok(TokenCorpus {
            words,
            documents,
            toponyms,
            stopwords,
            vocabulary_size,
            document_count,
        })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }

    pub fn document_count(&self) -> usize {
        self.document_count
    }

    pub fn word(&self, i: usize) -> usize {
        self.words[i]
    }

    pub fn document(&self, i: usize) -> usize {
        self.documents[i]
    }

    pub fn is_toponym(&self, i: usize) -> bool {
        self.toponyms[i]
    }

    pub fn is_stopword(&self, i: usize) -> bool {
        self.stopwords[i]
    }

    /// Tokens that take part in sampling.
    pub fn active_tokens(&self) -> usize {
        self.stopwords.iter().filter(|&&s| !s).count()
    }

    pub fn active_tokens_per_document(&self) -> Vec<usize> {
        let mut counts = vec![0; self.document_count];
        for (&doc, &stop) in self.documents.iter().zip(&self.stopwords) {
            if !stop {
                counts[doc] += 1;
            }
        }
        counts
    }

    /// Indices of active toponym tokens.
    pub fn toponym_tokens(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&i| self.toponyms[i] && !self.stopwords[i])
    }
}

fn to_flags(values: Vec<u8>, name: &str) -> Result<Vec<bool>> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::Corpus(format!(
                "{} flag of token {} must be 0 or 1, got {}",
                name, i, other
            ))),
        })
        .collect()
}

/// W×R 0/1 matrix of which regions a toponym may refer to, row-major by word.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidacyFilter {
    words: usize,
    regions: usize,
    cells: Vec<u8>,
}

impl CandidacyFilter {
    /// Builds a filter from `(word, candidate regions)` rows. Words without
    /// a row have no candidate region.
    pub fn from_rows<I, R>(words: usize, regions: usize, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, R)>,
        R: IntoIterator<Item = usize>,
    {
        let mut cells = vec![0; words * regions];
        for (word, candidates) in rows {
            if word >= words {
                return Err(Error::Config(format!(
                    "candidacy filter word id {} out of range (W = {})",
                    word, words
                )));
            }
            for region in candidates {
                if region >= regions {
                    return Err(Error::Config(format!(
                        "candidacy filter region id {} for word {} out of range (R = {})",
                        region, word, regions
                    )));
                }
                cells[word * regions + region] = 1;
            }
        }
        Ok(CandidacyFilter {
            words,
            regions,
            cells,
        })
    }

    /// Every word compatible with every region.
    pub fn permissive(words: usize, regions: usize) -> Self {
        CandidacyFilter {
            words,
            regions,
            cells: vec![1; words * regions],
        }
    }

    pub fn regions(&self) -> usize {
        self.regions
    }

    pub fn is_compatible(&self, word: usize, region: usize) -> bool {
        self.cells[word * self.regions + region] == 1
    }

    pub fn row(&self, word: usize) -> &[u8] {
        &self.cells[word * self.regions..(word + 1) * self.regions]
    }

    pub fn candidate_count(&self, word: usize) -> usize {
        self.row(word).iter().filter(|&&c| c == 1).count()
    }

    /// D×R mask of the regions any active toponym in each document may take.
    pub fn active_regions_by_document(&self, corpus: &TokenCorpus) -> Vec<bool> {
        let mut mask = vec![false; corpus.document_count() * self.regions];
        for i in corpus.toponym_tokens() {
            let offset = corpus.document(i) * self.regions;
            for (slot, &cell) in mask[offset..offset + self.regions]
                .iter_mut()
                .zip(self.row(corpus.word(i)))
            {
                *slot |= cell == 1;
            }
        }
        mask
    }

    /// Checks that the filter is shaped for `corpus` and that every active
    /// toponym has at least one candidate region.
    pub fn check_against(&self, corpus: &TokenCorpus) -> Result<()> {
        if self.words != corpus.vocabulary_size() {
            return Err(Error::Config(format!(
                "candidacy filter has {} word rows but the corpus vocabulary has {}",
                self.words,
                corpus.vocabulary_size()
            )));
        }
        if self.regions == 0 {
            return Err(Error::Config("candidacy filter has no regions".to_string()));
        }
        for i in corpus.toponym_tokens() {
            let word = corpus.word(i);
            if self.candidate_count(word) == 0 {
                return Err(Error::Corpus(format!(
                    "toponym token {} (word {}) has no candidate region",
                    i, word
                )));
            }
        }
        Ok(())
    }
}

/// Candidate gazetteer coordinates per toponym word, as (latitude, longitude)
/// in degrees.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoordinateLexicon {
    entries: Vec<Vec<(f64, f64)>>,
}

impl CoordinateLexicon {
    pub fn new(words: usize) -> Self {
        CoordinateLexicon {
            entries: vec![Vec::new(); words],
        }
    }

    pub fn insert(&mut self, word: usize, latitude: f64, longitude: f64) -> Result<()> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::Corpus(format!(
                "coordinate ({}, {}) for word {} is not a valid latitude/longitude",
                latitude, longitude, word
            )));
        }
        if word >= self.entries.len() {
            return Err(Error::Config(format!(
                "coordinate word id {} out of range (W = {})",
                word,
                self.entries.len()
            )));
        }
        self.entries[word].push((latitude, longitude));
        Ok(())
    }

    pub fn candidates(&self, word: usize) -> &[(f64, f64)] {
        self.entries.get(word).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[(f64, f64)])> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(word, coords)| (word, coords.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_corpus() -> TokenCorpus {
        TokenCorpus::new(
            vec![0, 1, 2, 0, 5],
            vec![0, 0, 1, 1, 1],
            vec![1, 0, 0, 1, 0],
            vec![0, 0, 0, 0, 1],
        )
        .unwrap()
    }

    #[test]
    fn test_dimensions_ignore_stopwords() {
        let corpus = small_corpus();
        assert_eq!(corpus.len(), 5);
        assert_eq!(corpus.vocabulary_size(), 3);
        assert_eq!(corpus.document_count(), 2);
        assert_eq!(corpus.active_tokens(), 4);
        assert_eq!(corpus.active_tokens_per_document(), vec![2, 2]);
        assert_eq!(corpus.toponym_tokens().collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn test_rejects_bad_flags_and_order() {
        let err = TokenCorpus::new(vec![0], vec![0], vec![2], vec![0]).unwrap_err();
        assert!(matches!(err, Error::Corpus(_)));

        let err = TokenCorpus::new(vec![0, 0], vec![1, 0], vec![0, 0], vec![0, 0]).unwrap_err();
        assert!(err.to_string().contains("non-decreasing"));

        let err = TokenCorpus::new(vec![0, 0], vec![0], vec![0, 0], vec![0, 0]).unwrap_err();
        assert!(err.to_string().contains("differ in length"));
    }

    #[test]
    fn test_filter_bounds_fail_fast() {
        let err = CandidacyFilter::from_rows(3, 2, vec![(0, vec![2])]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = CandidacyFilter::from_rows(3, 2, vec![(3, vec![0])]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_filter_rows_and_active_mask() {
        let corpus = small_corpus();
        let filter = CandidacyFilter::from_rows(3, 3, vec![(0, vec![0, 2])]).unwrap();
        assert!(filter.is_compatible(0, 2));
        assert!(!filter.is_compatible(0, 1));
        assert_eq!(filter.candidate_count(0), 2);
        assert!(filter.check_against(&corpus).is_ok());

        let mask = filter.active_regions_by_document(&corpus);
        assert_eq!(mask, vec![true, false, true, true, false, true]);
    }

    #[test]
    fn test_toponym_without_candidates_is_rejected() {
        let corpus = small_corpus();
        let filter = CandidacyFilter::from_rows(3, 3, Vec::<(usize, Vec<usize>)>::new()).unwrap();
        assert!(matches!(filter.check_against(&corpus), Err(Error::Corpus(_))));
    }

    #[test]
    fn test_coordinate_lexicon_validates() {
        let mut lexicon = CoordinateLexicon::new(2);
        lexicon.insert(1, 30.27, -97.74).unwrap();
        assert_eq!(lexicon.candidates(1), &[(30.27, -97.74)]);
        assert!(lexicon.candidates(0).is_empty());
        assert!(lexicon.insert(0, 91.0, 0.0).is_err());
        assert!(lexicon.insert(2, 0.0, 0.0).is_err());
    }
}
