//! Stateful line filters.
//!
//! A filter is a predicate plus an action kind. Filters are evaluated in
//! insertion order over a line's runes, each folding the running
//! [`FilterResult`]; a line is surfaced iff the final decision is not
//! `Excluded`. See [`Filter::take_action`] for the fold table.

mod spec;

pub use spec::parse_filter_spec;

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter \"{item}\"{} is too short", in_file(.file))]
    TooShort { item: String, file: Option<String> },
    #[error("unknown filter type \"{kind}\"{}", in_file(.file))]
    UnknownKind { kind: char, file: Option<String> },
    #[error("bad filter pattern \"{pattern}\": {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("could not read filter file \"{path}\": {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn in_file(file: &Option<String>) -> String {
    match file {
        Some(f) => format!(" in \"{f}\""),
        None => String::new(),
    }
}

/// How a filter folds into the running decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterAction {
    Intersect,
    Union,
    Exclude,
    Highlight,
}

impl FilterAction {
    /// The prompt/spec glyph for this action.
    pub fn glyph(&self) -> char {
        match self {
            FilterAction::Intersect => '&',
            FilterAction::Union => '+',
            FilterAction::Exclude => '-',
            FilterAction::Highlight => '~',
        }
    }

    pub fn from_glyph(c: char) -> Option<FilterAction> {
        match c {
            '&' => Some(FilterAction::Intersect),
            '+' => Some(FilterAction::Union),
            '-' => Some(FilterAction::Exclude),
            '~' => Some(FilterAction::Highlight),
            _ => None,
        }
    }
}

/// Running pipeline decision. `NoAction` is the state the first filter sees;
/// manual line highlights seed the pipeline with `Highlighted`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterResult {
    #[default]
    NoAction,
    Included,
    Excluded,
    Highlighted,
}

/// Pattern interpretation for searches and filters. Each mode carries a
/// displayable name and the prompt color used while it is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchMode {
    #[default]
    CaseSensitive,
    CaseInsensitive,
    Regex,
}

impl SearchMode {
    pub fn name(&self) -> &'static str {
        match self {
            SearchMode::CaseSensitive => "CaseS",
            SearchMode::CaseInsensitive => "CaseI",
            SearchMode::Regex => "RegEx",
        }
    }

    /// ANSI color code shown in the prompt while this mode is active.
    pub fn color(&self) -> u16 {
        match self {
            SearchMode::CaseSensitive => 32,
            SearchMode::CaseInsensitive => 36,
            SearchMode::Regex => 35,
        }
    }

    /// The next mode in the prompt's cycling order.
    pub fn next(&self) -> SearchMode {
        match self {
            SearchMode::CaseSensitive => SearchMode::CaseInsensitive,
            SearchMode::CaseInsensitive => SearchMode::Regex,
            SearchMode::Regex => SearchMode::CaseSensitive,
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A match predicate over a line's runes: first match as a rune range.
pub type SearchFn = Arc<dyn Fn(&[char]) -> Option<Range<usize>> + Send + Sync>;

/// Builds the match predicate for `pattern` under `mode`.
///
/// An invalid regex yields [`FilterError::BadPattern`] and nothing is built.
pub fn search_fn(mode: SearchMode, pattern: &[char]) -> Result<SearchFn, FilterError> {
    match mode {
        SearchMode::CaseSensitive => {
            let needle: Vec<char> = pattern.to_vec();
            Ok(Arc::new(move |runes: &[char]| {
                core_ansi::index(runes, &needle).map(|at| at..at + needle.len())
            }))
        }
        SearchMode::CaseInsensitive => {
            let needle: Vec<char> = pattern.iter().map(|c| fold_case(*c)).collect();
            Ok(Arc::new(move |runes: &[char]| {
                let folded: Vec<char> = runes.iter().map(|c| fold_case(*c)).collect();
                core_ansi::index(&folded, &needle).map(|at| at..at + needle.len())
            }))
        }
        SearchMode::Regex => {
            let pattern: String = pattern.iter().collect();
            let re = regex::Regex::new(&pattern).map_err(|source| FilterError::BadPattern {
                pattern: pattern.clone(),
                source,
            })?;
            Ok(Arc::new(move |runes: &[char]| {
                let text: String = runes.iter().collect();
                let m = re.find(&text)?;
                Some(byte_to_rune_range(&text, m.start()..m.end()))
            }))
        }
    }
}

/// All non-overlapping matches of `pred` over `runes`, in order. Used by the
/// renderer to reverse-video every on-screen occurrence.
pub fn find_all(pred: &SearchFn, runes: &[char]) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut from = 0;
    while from < runes.len() {
        let Some(m) = pred(&runes[from..]) else {
            break;
        };
        if m.is_empty() {
            break;
        }
        out.push(from + m.start..from + m.end);
        from += m.end;
    }
    out
}

fn fold_case(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn byte_to_rune_range(text: &str, bytes: Range<usize>) -> Range<usize> {
    let start = text[..bytes.start].chars().count();
    let len = text[bytes.start..bytes.end].chars().count();
    start..start + len
}

/// A single user-defined filter: pattern, search mode, action kind and the
/// compiled predicate.
pub struct Filter {
    pattern: String,
    mode: SearchMode,
    pub action: FilterAction,
    pred: SearchFn,
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("pattern", &self.pattern)
            .field("mode", &self.mode)
            .field("action", &self.action)
            .finish()
    }
}

impl Filter {
    pub fn new(
        pattern: &[char],
        action: FilterAction,
        mode: SearchMode,
    ) -> Result<Filter, FilterError> {
        let pred = search_fn(mode, pattern)?;
        Ok(Filter {
            pattern: pattern.iter().collect(),
            mode,
            action,
            pred,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn matches(&self, runes: &[char]) -> Option<Range<usize>> {
        (self.pred)(runes)
    }

    /// Folds this filter into the running decision for one line.
    ///
    /// | action    | rule                                                        |
    /// |-----------|-------------------------------------------------------------|
    /// | Intersect | Excluded stays; else match → Included, no match → Excluded  |
    /// | Union     | Included/Highlighted stay; else match decides               |
    /// | Exclude   | Excluded stays; match → Excluded, no match → Included       |
    /// | Highlight | match → Highlighted unless Excluded; no match → unchanged   |
    pub fn take_action(&self, runes: &[char], current: FilterResult) -> FilterResult {
        let hit = self.matches(runes).is_some();
        match self.action {
            FilterAction::Intersect => match current {
                FilterResult::Excluded => FilterResult::Excluded,
                _ if hit => FilterResult::Included,
                _ => FilterResult::Excluded,
            },
            FilterAction::Union => match current {
                FilterResult::Included | FilterResult::Highlighted => current,
                _ if hit => FilterResult::Included,
                _ => FilterResult::Excluded,
            },
            FilterAction::Exclude => match current {
                FilterResult::Excluded => FilterResult::Excluded,
                _ if hit => FilterResult::Excluded,
                _ => FilterResult::Included,
            },
            FilterAction::Highlight => {
                if hit && current != FilterResult::Excluded {
                    FilterResult::Highlighted
                } else {
                    current
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn runes(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn filter(pattern: &str, action: FilterAction) -> Filter {
        Filter::new(&runes(pattern), action, SearchMode::CaseSensitive).unwrap()
    }

    fn replay(filters: &[Filter], line: &str) -> FilterResult {
        let line = runes(line);
        filters
            .iter()
            .fold(FilterResult::NoAction, |d, f| f.take_action(&line, d))
    }

    #[test]
    fn intersect_keeps_matches_only() {
        let f = vec![filter("foo", FilterAction::Intersect)];
        assert_eq!(replay(&f, "foo"), FilterResult::Included);
        assert_eq!(replay(&f, "foobar"), FilterResult::Included);
        assert_eq!(replay(&f, "bar"), FilterResult::Excluded);
    }

    #[test]
    fn union_widens_an_intersection() {
        let f = vec![
            filter("foo", FilterAction::Intersect),
            filter("baz", FilterAction::Union),
        ];
        assert_eq!(replay(&f, "foo"), FilterResult::Included);
        assert_eq!(replay(&f, "baz"), FilterResult::Included);
        assert_eq!(replay(&f, "bar"), FilterResult::Excluded);
    }

    #[test]
    fn exclude_wins_over_earlier_includes() {
        let f = vec![
            filter("foo", FilterAction::Intersect),
            filter("baz", FilterAction::Union),
            filter("bar", FilterAction::Exclude),
        ];
        assert_eq!(replay(&f, "foo"), FilterResult::Included);
        assert_eq!(replay(&f, "foobar"), FilterResult::Excluded);
    }

    #[test]
    fn exclude_stays_excluded() {
        let f = vec![
            filter("a", FilterAction::Exclude),
            filter("b", FilterAction::Exclude),
        ];
        assert_eq!(replay(&f, "a"), FilterResult::Excluded);
        assert_eq!(replay(&f, "ab"), FilterResult::Excluded);
        assert_eq!(replay(&f, "c"), FilterResult::Included);
    }

    #[test]
    fn highlight_overrides_included_but_not_excluded() {
        let f = vec![
            filter("foo", FilterAction::Intersect),
            filter("oo", FilterAction::Highlight),
        ];
        assert_eq!(replay(&f, "foo"), FilterResult::Highlighted);

        let f = vec![
            filter("bar", FilterAction::Exclude),
            filter("bar", FilterAction::Highlight),
        ];
        assert_eq!(replay(&f, "bar"), FilterResult::Excluded);
    }

    #[test]
    fn highlight_without_match_keeps_decision() {
        let f = vec![filter("zzz", FilterAction::Highlight)];
        assert_eq!(replay(&f, "abc"), FilterResult::NoAction);
    }

    #[test]
    fn highlighted_seed_survives_union() {
        let f = vec![filter("foo", FilterAction::Union)];
        let line = runes("bar");
        // A manually highlighted line stays visible through a union.
        assert_eq!(
            f[0].take_action(&line, FilterResult::Highlighted),
            FilterResult::Highlighted
        );
    }

    #[test]
    fn case_insensitive_literal() {
        let f = Filter::new(
            &runes("WaRn"),
            FilterAction::Intersect,
            SearchMode::CaseInsensitive,
        )
        .unwrap();
        assert!(f.matches(&runes("prefix warning")).is_some());
        assert!(f.matches(&runes("WARN!")).is_some());
        assert!(f.matches(&runes("ok")).is_none());
    }

    #[test]
    fn regex_match_reports_rune_range() {
        let f = Filter::new(&runes("b+"), FilterAction::Intersect, SearchMode::Regex).unwrap();
        assert_eq!(f.matches(&runes("aabbba")), Some(2..5));
        // Multi-byte runes before the match must not skew the range.
        assert_eq!(f.matches(&runes("éébb")), Some(2..4));
    }

    #[test]
    fn bad_regex_is_rejected() {
        let err = Filter::new(&runes("(unclosed"), FilterAction::Intersect, SearchMode::Regex)
            .unwrap_err();
        assert!(matches!(err, FilterError::BadPattern { .. }));
    }

    #[test]
    fn find_all_reports_every_occurrence() {
        let pred = search_fn(SearchMode::CaseSensitive, &runes("ab")).unwrap();
        assert_eq!(find_all(&pred, &runes("ab-ab-ab")), vec![0..2, 3..5, 6..8]);
        assert!(find_all(&pred, &runes("zzz")).is_empty());
    }

    #[test]
    fn mode_cycle_covers_all_modes() {
        let start = SearchMode::CaseSensitive;
        assert_eq!(start.next().next().next(), start);
    }
}
