use fuzzy_matcher::FuzzyMatcher;

/// Case-insensitive substring match scores above any fuzzy score.
const EXACT_BASE_SCORE: i64 = 1000;

/// Search matcher for ledger text fields (name, output, error message).
pub struct FzfMatcher {
    matcher: fuzzy_matcher::skim::SkimMatcherV2,
}

impl FzfMatcher {
    pub fn new() -> Self {
        Self {
            matcher: fuzzy_matcher::skim::SkimMatcherV2::default(),
        }
    }

    /// Skim-style fuzzy score.
    pub fn fuzzy_match(&self, pattern: &str, text: &str) -> Option<i64> {
        self.matcher.fuzzy_match(text, pattern)
    }

    /// Case-insensitive substring match; longer patterns score higher.
    pub fn exact_match(&self, pattern: &str, text: &str) -> Option<i64> {
        if text.to_lowercase().contains(&pattern.to_lowercase()) {
            Some(EXACT_BASE_SCORE + (pattern.len() * 10) as i64)
        } else {
            None
        }
    }

    /// Best score of `pattern` over `fields`.
    ///
    /// Without `fuzzy` only substring matches count. An empty pattern
    /// matches everything with score 0.
    pub fn best_match(&self, pattern: &str, fields: &[&str], fuzzy: bool) -> Option<i64> {
        if pattern.is_empty() {
            return Some(0);
        }

        fields
            .iter()
            .filter_map(|text| {
                self.exact_match(pattern, text).or_else(|| {
                    if fuzzy {
                        self.fuzzy_match(pattern, text)
                    } else {
                        None
                    }
                })
            })
            .max()
    }
}

impl Default for FzfMatcher {
    fn default() -> Self {
        Self::new()
    }
}
