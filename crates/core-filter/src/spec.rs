//! The `--filters` spec language.
//!
//! A spec is a semicolon-separated list of items. Each item is either a
//! path to a filter file (one item per line, `#` comments and blank lines
//! ignored) or an inline filter `<kind><pattern>` where the kind glyph is
//! `&` (intersect), `+` (union), `-` (exclude) or `~` (highlight). Inline
//! patterns are case-sensitive literals.

use std::fs;
use std::path::Path;

use crate::{Filter, FilterAction, FilterError, SearchMode};

/// Parses a full spec into an ordered filter list. The first bad item
/// aborts the parse; nothing is applied partially.
pub fn parse_filter_spec(spec: &str) -> Result<Vec<Filter>, FilterError> {
    let mut filters = Vec::new();
    for item in spec.split(';') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if Path::new(item).is_file() {
            parse_filter_file(item, &mut filters)?;
        } else {
            filters.push(parse_item(item, None)?);
        }
    }
    Ok(filters)
}

fn parse_filter_file(path: &str, filters: &mut Vec<Filter>) -> Result<(), FilterError> {
    let text = fs::read_to_string(path).map_err(|source| FilterError::File {
        path: path.to_owned(),
        source,
    })?;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        filters.push(parse_item(line, Some(path))?);
    }
    Ok(())
}

fn parse_item(item: &str, file: Option<&str>) -> Result<Filter, FilterError> {
    let mut chars = item.chars();
    let Some(glyph) = chars.next() else {
        return Err(FilterError::TooShort {
            item: item.to_owned(),
            file: file.map(str::to_owned),
        });
    };
    let pattern: Vec<char> = chars.collect();
    if pattern.is_empty() {
        return Err(FilterError::TooShort {
            item: item.to_owned(),
            file: file.map(str::to_owned),
        });
    }
    let Some(action) = FilterAction::from_glyph(glyph) else {
        return Err(FilterError::UnknownKind {
            kind: glyph,
            file: file.map(str::to_owned),
        });
    };
    Filter::new(&pattern, action, SearchMode::CaseSensitive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_inline_items_in_order() {
        let filters = parse_filter_spec("&foo;+bar;-baz;~qux").unwrap();
        let actions: Vec<FilterAction> = filters.iter().map(|f| f.action).collect();
        assert_eq!(
            actions,
            vec![
                FilterAction::Intersect,
                FilterAction::Union,
                FilterAction::Exclude,
                FilterAction::Highlight,
            ]
        );
        assert_eq!(filters[0].pattern(), "foo");
    }

    #[test]
    fn skips_empty_items() {
        let filters = parse_filter_spec("&foo;;  ;+bar").unwrap();
        assert_eq!(filters.len(), 2);
    }

    #[test]
    fn rejects_unknown_kind_and_short_items() {
        assert!(matches!(
            parse_filter_spec("!foo"),
            Err(FilterError::UnknownKind { kind: '!', .. })
        ));
        assert!(matches!(
            parse_filter_spec("&"),
            Err(FilterError::TooShort { .. })
        ));
    }

    #[test]
    fn reads_filter_files_with_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# keep the good stuff").unwrap();
        writeln!(file, "&good").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "-bad").unwrap();
        file.flush().unwrap();

        let spec = format!("{};+extra", file.path().display());
        let filters = parse_filter_spec(&spec).unwrap();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0].pattern(), "good");
        assert_eq!(filters[1].action, FilterAction::Exclude);
        assert_eq!(filters[2].action, FilterAction::Union);
    }

    #[test]
    fn bad_item_inside_a_file_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "?wat").unwrap();
        file.flush().unwrap();

        let err = parse_filter_spec(&file.path().display().to_string()).unwrap_err();
        match err {
            FilterError::UnknownKind { kind, file } => {
                assert_eq!(kind, '?');
                assert!(file.is_some());
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
