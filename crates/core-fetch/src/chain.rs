//! The fetcher's active filter state.
//!
//! Snapshotted as an `Arc` at the start of every stream so that decode
//! workers never observe a half-applied mutation; the main loop swaps the
//! snapshot only between streams (the viewport reset is the synchronization
//! boundary).

use core_ansi::Astring;
use core_filter::{Filter, FilterAction, FilterResult};
use std::sync::Arc;

use crate::pos::{Line, LineNo, PosLine};

/// Ordered filter list, manual line highlights, and the global enable flag.
#[derive(Clone)]
pub struct FilterChain {
    pub filters: Vec<Arc<Filter>>,
    /// Manually highlighted lines, sorted for binary search.
    pub highlighted: Vec<LineNo>,
    pub enabled: bool,
}

impl Default for FilterChain {
    fn default() -> Self {
        FilterChain {
            filters: Vec::new(),
            highlighted: Vec::new(),
            enabled: true,
        }
    }
}

impl FilterChain {
    fn is_pass_through(&self) -> bool {
        self.filters.is_empty() && self.highlighted.is_empty()
    }

    /// Decodes one raw line and folds the pipeline over it. `None` means the
    /// final decision was `Excluded` and the line is not surfaced.
    ///
    /// Manual highlights seed the decision as `Highlighted`. When filtering
    /// is disabled, non-Highlight filters are skipped so user color
    /// markings stay visible.
    pub fn surface(&self, pl: &PosLine) -> Option<Line> {
        let text = Astring::from_bytes(&pl.bytes);
        if self.is_pass_through() {
            return Some(Line {
                text,
                pos: pl.pos,
                highlighted: false,
            });
        }

        let mut decision = FilterResult::NoAction;
        if let Some(line) = pl.pos.line {
            if self.highlighted.binary_search(&line).is_ok() {
                decision = FilterResult::Highlighted;
            }
        }
        for filter in &self.filters {
            if self.enabled || filter.action == FilterAction::Highlight {
                decision = filter.take_action(&text.runes, decision);
            }
        }
        match decision {
            FilterResult::Excluded => None,
            FilterResult::Highlighted => Some(Line {
                text,
                pos: pl.pos,
                highlighted: true,
            }),
            _ => Some(Line {
                text,
                pos: pl.pos,
                highlighted: false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_filter::SearchMode;
    use crate::pos::Pos;

    fn raw(line: LineNo, text: &str) -> PosLine {
        PosLine {
            bytes: text.as_bytes().to_vec(),
            pos: Pos::new(line, line * 10),
        }
    }

    fn intersect(pattern: &str) -> Arc<Filter> {
        let runes: Vec<char> = pattern.chars().collect();
        Arc::new(Filter::new(&runes, FilterAction::Intersect, SearchMode::CaseSensitive).unwrap())
    }

    fn highlight(pattern: &str) -> Arc<Filter> {
        let runes: Vec<char> = pattern.chars().collect();
        Arc::new(Filter::new(&runes, FilterAction::Highlight, SearchMode::CaseSensitive).unwrap())
    }

    #[test]
    fn pass_through_keeps_everything_plain() {
        let chain = FilterChain::default();
        let line = chain.surface(&raw(0, "anything")).unwrap();
        assert!(!line.highlighted);
        assert_eq!(line.text.text(), "anything");
    }

    #[test]
    fn excluded_lines_are_elided() {
        let mut chain = FilterChain::default();
        chain.filters.push(intersect("keep"));
        assert!(chain.surface(&raw(0, "keep me")).is_some());
        assert!(chain.surface(&raw(1, "drop me")).is_none());
    }

    #[test]
    fn manual_highlight_seeds_the_pipeline() {
        let chain = FilterChain {
            highlighted: vec![3],
            ..FilterChain::default()
        };
        assert!(chain.surface(&raw(3, "hit")).unwrap().highlighted);
        assert!(!chain.surface(&raw(4, "miss")).unwrap().highlighted);
    }

    #[test]
    fn disabled_chain_still_runs_highlight_filters() {
        let chain = FilterChain {
            filters: vec![intersect("gone"), highlight("mark")],
            enabled: false,
            ..FilterChain::default()
        };
        // The intersect filter is skipped: the line survives.
        let line = chain.surface(&raw(0, "mark this")).unwrap();
        assert!(line.highlighted);
        let line = chain.surface(&raw(1, "plain")).unwrap();
        assert!(!line.highlighted);
    }
}
