/// Estimates how many backend tokens a piece of text costs.
///
/// Implementations must be monotonic: extending a text never lowers its
/// estimate. The planner relies on this when it searches for cut points.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

impl<F> TokenEstimator for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn estimate(&self, text: &str) -> usize {
        self(text)
    }
}

/// Character-count heuristic tuned for mixed CJK and Latin transcripts
#[derive(Debug, Clone, Copy)]
pub struct HeuristicEstimator {
    /// Characters per token for CJK ideographs
    pub cjk_chars_per_token: f64,
    /// Characters per token for CJK punctuation
    pub cjk_punct_per_token: f64,
    /// Characters per token for everything else
    pub other_chars_per_token: f64,
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self {
            cjk_chars_per_token: 1.3,
            cjk_punct_per_token: 1.0,
            other_chars_per_token: 3.5,
        }
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let mut cjk = 0usize;
        let mut punct = 0usize;
        let mut other = 0usize;
        for c in text.chars() {
            if is_cjk_ideograph(c) {
                cjk += 1;
            } else if is_cjk_punctuation(c) {
                punct += 1;
            } else {
                other += 1;
            }
        }

        let tokens = cjk as f64 / self.cjk_chars_per_token
            + punct as f64 / self.cjk_punct_per_token
            + other as f64 / self.other_chars_per_token;
        (tokens as usize).max(1)
    }
}

fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

fn is_cjk_punctuation(c: char) -> bool {
    ('\u{3000}'..='\u{303f}').contains(&c) || matches!(c, '，' | '！' | '？' | '；' | '：')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_empty_and_minimum() {
        let estimator = HeuristicEstimator::default();
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate("a"), 1);
    }

    #[test]
    fn test_heuristic_cjk_is_denser() {
        let estimator = HeuristicEstimator::default();
        let latin = estimator.estimate("abcdefghijklmn");
        let cjk = estimator.estimate("我们今天讨论项目进度安排问题好");
        assert!(cjk > latin);
    }

    #[test]
    fn test_heuristic_monotonic_on_extension() {
        let estimator = HeuristicEstimator::default();
        let text = "Host: 大家好，今天我们讨论 the quarterly roadmap。";
        let mut previous = 0;
        for (i, c) in text.char_indices() {
            let current = estimator.estimate(&text[..i + c.len_utf8()]);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_closure_estimator() {
        let words = |text: &str| text.split_whitespace().count();
        assert_eq!(words.estimate("one two three"), 3);
    }
}
