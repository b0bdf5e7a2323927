//! Okapi BM25 over catalog display names.

use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    /// Floor for negative idf values, as a fraction of the mean idf.
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75, epsilon: 0.25 }
    }
}

/// Lowercased alphanumeric runs; punctuation and whitespace only separate.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

struct Corpus {
    docs: Vec<HashMap<String, usize>>,
    lengths: Vec<usize>,
    avg_len: f64,
    idf: HashMap<String, f64>,
}

impl Corpus {
    fn build<'a>(names: impl Iterator<Item = &'a str>, params: Bm25Params) -> Self {
        let mut docs = Vec::new();
        let mut lengths = Vec::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for name in names {
            let tokens = tokenize(name);
            lengths.push(tokens.len());
            let mut counts: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *counts.entry(token).or_default() += 1;
            }
            for term in counts.keys() {
                *doc_freq.entry(term.clone()).or_default() += 1;
            }
            docs.push(counts);
        }

        let total_len: usize = lengths.iter().sum();
        let avg_len = if docs.is_empty() { 0.0 } else { total_len as f64 / docs.len() as f64 };

        let doc_count = docs.len() as f64;
        let mut idf = HashMap::with_capacity(doc_freq.len());
        let mut idf_sum = 0.0;
        let mut negative = HashSet::new();
        for (term, freq) in doc_freq {
            let freq = freq as f64;
            let value = ((doc_count - freq + 0.5) / (freq + 0.5)).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.insert(term.clone());
            }
            idf.insert(term, value);
        }
        if !idf.is_empty() {
            let floor = params.epsilon * idf_sum / idf.len() as f64;
            for term in negative {
                idf.insert(term, floor);
            }
        }

        Self { docs, lengths, avg_len, idf }
    }

    fn score(&self, doc: usize, query: &[String], params: Bm25Params) -> f64 {
        let counts = &self.docs[doc];
        let length_ratio =
            if self.avg_len > 0.0 { self.lengths[doc] as f64 / self.avg_len } else { 0.0 };
        let norm = params.k1 * (1.0 - params.b + params.b * length_ratio);

        query
            .iter()
            .map(|term| {
                let tf = counts.get(term).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                let idf = self.idf.get(term).copied().unwrap_or(0.0);
                idf * tf * (params.k1 + 1.0) / (tf + norm)
            })
            .sum()
    }
}

/// Returns up to `k` candidates ordered by descending relevance. Equal scores
/// keep their input order.
pub fn top_k<'a, T>(
    query: &str,
    candidates: &[&'a T],
    k: usize,
    name_of: impl Fn(&T) -> &str,
    params: Bm25Params,
) -> Vec<&'a T> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let corpus = Corpus::build(candidates.iter().map(|candidate| name_of(*candidate)), params);
    let query_terms = tokenize(query);

    let mut scored: Vec<(usize, f64)> = (0..candidates.len())
        .map(|index| (index, corpus.score(index, &query_terms, params)))
        .collect();
    scored.sort_by(|left, right| right.1.total_cmp(&left.1));

    scored.into_iter().take(k).map(|(index, _)| candidates[index]).collect()
}

#[cfg(test)]
mod tests {
    use super::{top_k, tokenize, Bm25Params};

    fn names(hits: Vec<&&str>) -> Vec<String> {
        hits.into_iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn tokenization_ignores_case_and_punctuation() {
        assert_eq!(tokenize("Gordon's  DRY-Gin 750ml"), vec!["gordon", "s", "dry", "gin", "750ml"]);
        assert!(tokenize("  -- ").is_empty());
    }

    #[test]
    fn best_lexical_match_ranks_first() {
        let catalog = ["Vodka Absolut 700ml", "Gin Gordon's 750ml", "Soda Water", "Tonic Water"];
        let candidates: Vec<&&str> = catalog.iter().collect();

        let hits = top_k("gordons gin", &candidates, 2, |name| *name, Bm25Params::default());
        assert_eq!(names(hits)[0], "Gin Gordon's 750ml");
    }

    #[test]
    fn ties_keep_catalog_order() {
        let catalog = ["Beer A", "Beer B", "Beer C"];
        let candidates: Vec<&&str> = catalog.iter().collect();

        let hits = top_k("wine", &candidates, 3, |name| *name, Bm25Params::default());
        assert_eq!(names(hits), vec!["Beer A", "Beer B", "Beer C"]);
    }

    #[test]
    fn empty_candidate_set_returns_empty() {
        let candidates: Vec<&&str> = Vec::new();
        assert!(top_k("gin", &candidates, 5, |name| *name, Bm25Params::default()).is_empty());
    }

    #[test]
    fn k_caps_the_result_size() {
        let catalog = ["Gin 1", "Gin 2", "Gin 3", "Gin 4"];
        let candidates: Vec<&&str> = catalog.iter().collect();
        assert_eq!(top_k("gin", &candidates, 2, |name| *name, Bm25Params::default()).len(), 2);
    }
}
