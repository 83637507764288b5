//! Line-granular prompt trimming

use super::TokenCounter;

/// Drop leading lines from `text` until it fits in `max_tokens`
///
/// Returns a suffix of `text`. A line is everything up to and including a
/// `\n`. The last remaining line is never cut, so a single line longer than
/// the budget comes back as is.
pub fn trim_to_budget<'a, C>(text: &'a str, max_tokens: usize, counter: &C) -> &'a str
where
    C: TokenCounter + ?Sized,
{
    let mut rest = text;

    while counter.count_tokens(rest) > max_tokens {
        match rest.find('\n') {
            // Only drop if something follows the newline
            Some(idx) if idx + 1 < rest.len() => rest = &rest[idx + 1..],
            _ => break,
        }
    }

    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> usize {
        s.split_whitespace().count()
    }

    fn line_count(s: &str) -> usize {
        s.lines().count()
    }

    /// 50 lines of 100 one-token words each: 5000 tokens
    fn fifty_lines() -> String {
        (0..50)
            .map(|i| {
                let mut line = vec![format!("l{}", i)];
                line.extend((1..100).map(|_| "w".to_string()));
                line.join(" ") + "\n"
            })
            .collect()
    }

    #[test]
    fn test_within_budget_unchanged() {
        let text = "$ ls\nfile.txt\n$ ";
        assert_eq!(trim_to_budget(text, 10, &words), text);
    }

    #[test]
    fn test_idempotent() {
        let text = fifty_lines();
        let once = trim_to_budget(&text, 1000, &words);
        let twice = trim_to_budget(once, 1000, &words);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_codex_budget_scenario() {
        let text = fifty_lines();
        assert_eq!(words(&text), 5000);

        let trimmed = trim_to_budget(&text, 4096 - 128, &words);

        // 39 lines * 100 = 3900 <= 3968 < 4000
        assert_eq!(line_count(trimmed), 39);
        assert!(words(trimmed) <= 3968);
        assert!(trimmed.starts_with("l11 "));
        assert!(text.ends_with(trimmed));
    }

    #[test]
    fn test_never_grows() {
        let text = fifty_lines();
        for budget in [0, 1, 99, 100, 101, 2500, 5000, 6000] {
            let trimmed = trim_to_budget(&text, budget, &words);
            assert!(words(trimmed) <= words(&text));
            assert!(line_count(trimmed) <= line_count(&text));
            assert!(line_count(trimmed) >= 1);
        }
    }

    #[test]
    fn test_single_oversized_line_survives() {
        let text = "a b c d e f g h";
        assert_eq!(trim_to_budget(text, 2, &words), text);

        let with_newline = "a b c d e f g h\n";
        assert_eq!(trim_to_budget(with_newline, 2, &words), with_newline);
    }

    #[test]
    fn test_oversized_last_line_after_trimming() {
        let text = "short\nmuch much much longer line\n";
        assert_eq!(trim_to_budget(text, 2, &words), "much much much longer line\n");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(trim_to_budget("", 0, &words), "");
    }

    #[test]
    fn test_zero_budget_keeps_last_line() {
        let text = "one\ntwo\nthree";
        assert_eq!(trim_to_budget(text, 0, &words), "three");
    }
}
