//! Viewport behavior over a real fetcher and temp files.

use std::io::Write;
use std::sync::Arc;

use core_fetch::{Fetcher, Pos};
use core_filter::{SearchMode, search_fn};
use core_spool::GrowthHandle;
use core_view::ViewBuffer;
use tokio_util::sync::CancellationToken;

fn fetcher_over(content: &[u8]) -> (Arc<Fetcher>, tempfile::NamedTempFile) {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(content).unwrap();
    let fetcher = Fetcher::new(
        tmp.reopen().unwrap(),
        GrowthHandle::fixed(),
        CancellationToken::new(),
    )
    .unwrap();
    (fetcher, tmp)
}

fn numbered(count: usize) -> String {
    (0..count).map(|i| format!("line-{i}\n")).collect()
}

async fn view_over(content: &[u8], window: usize) -> (ViewBuffer, tempfile::NamedTempFile) {
    let (fetcher, tmp) = fetcher_over(content);
    let mut view = ViewBuffer::new(fetcher);
    view.set_window(window);
    (view, tmp)
}

fn runes(s: &str) -> Vec<char> {
    s.chars().collect()
}

#[tokio::test]
async fn fill_buffers_three_windows_past_the_cursor() {
    let (mut view, _tmp) = view_over(numbered(100).as_bytes(), 5).await;
    let res = view.fill().await.unwrap();
    assert_eq!(res.new_lines, 15);
    assert_eq!(view.len(), 15);
    assert!(!view.eof_reached());
    assert_eq!(view.current_pos(), Pos::START);
}

#[tokio::test]
async fn fill_marks_eof_on_short_input() {
    let (mut view, _tmp) = view_over(b"a\nb\n", 5).await;
    let res = view.fill().await.unwrap();
    assert_eq!(res.new_lines, 2);
    assert!(view.eof_reached());
}

#[tokio::test]
async fn line_at_triggers_a_fill_and_reports_eof_misses() {
    let (mut view, _tmp) = view_over(b"a\nb\nc\n", 2).await;
    let line = view.line_at(0).await.unwrap().cloned();
    assert_eq!(line.unwrap().text.text(), "a");
    assert!(view.line_at(10).await.unwrap().is_none());
}

#[tokio::test]
async fn shift_down_walks_forward_and_clamps_at_eof() {
    let (mut view, _tmp) = view_over(numbered(30).as_bytes(), 5).await;
    view.shift(7).await.unwrap();
    assert_eq!(view.current_line().unwrap().text.text(), "line-7");
    assert_eq!(view.current_pos().line, Some(7));

    // Page past the end: the cursor clamps to the last line and stays.
    for _ in 0..10 {
        view.shift(5).await.unwrap();
    }
    assert_eq!(view.current_line().unwrap().text.text(), "line-29");
    view.shift(5).await.unwrap();
    assert_eq!(view.current_line().unwrap().text.text(), "line-29");
}

#[tokio::test]
async fn shift_up_back_fills_from_a_deep_position() {
    let (mut view, _tmp) = view_over(numbered(200).as_bytes(), 5).await;
    // Jump deep by resetting to a known position, then walk up.
    let target = {
        let fetcher = view.fetcher().clone();
        let mut stream = fetcher.get(Pos::START).await.unwrap();
        let mut pos = Pos::START;
        for _ in 0..150 {
            pos = stream.next().await.unwrap().pos;
        }
        pos
    };
    view.reset(target);
    view.fill().await.unwrap();
    assert_eq!(view.current_pos().line, Some(149));

    view.shift(-10).await.unwrap();
    assert_eq!(view.current_pos().line, Some(139));
    assert_eq!(view.current_line().unwrap().text.text(), "line-139");
}

#[tokio::test]
async fn shift_up_stops_at_start_of_input() {
    let (mut view, _tmp) = view_over(numbered(10).as_bytes(), 3).await;
    view.fill().await.unwrap();
    view.shift(-5).await.unwrap();
    assert_eq!(view.current_pos(), Pos::START);
}

#[tokio::test]
async fn cumulative_shifts_match_walking_the_fetch_stream() {
    // Walking the viewport by shifts lands on the same positions as
    // walking the fetcher stream by the same cumulative offset.
    let (mut view, _tmp) = view_over(numbered(80).as_bytes(), 4).await;
    view.shift(3).await.unwrap();
    view.shift(9).await.unwrap();
    view.shift(-2).await.unwrap();

    let fetcher = view.fetcher().clone();
    let mut stream = fetcher.get(Pos::START).await.unwrap();
    let mut walked = None;
    for _ in 0..=10 {
        walked = stream.next().await;
    }
    assert_eq!(view.current_pos(), walked.unwrap().pos);
}

#[tokio::test]
async fn head_trim_keeps_the_tail_bounded() {
    let (mut view, _tmp) = view_over(numbered(500).as_bytes(), 5).await;
    for _ in 0..20 {
        view.shift(5).await.unwrap();
    }
    assert_eq!(view.current_pos().line, Some(100));
    // A stable fill trims the run behind the cursor to three windows
    // without losing the current line.
    view.fill().await.unwrap();
    assert!(view.cursor() <= 15);
    assert_eq!(view.current_pos().line, Some(100));
}

#[tokio::test]
async fn back_fill_prepends_and_advances_the_cursor() {
    let (mut view, _tmp) = view_over(numbered(100).as_bytes(), 5).await;
    let target = {
        let fetcher = view.fetcher().clone();
        let mut stream = fetcher.get(Pos::START).await.unwrap();
        let mut pos = Pos::START;
        for _ in 0..50 {
            pos = stream.next().await.unwrap().pos;
        }
        pos
    };
    view.reset(target);
    view.fill().await.unwrap();
    let before = view.current_pos();
    let inserted = view.back_fill().await.unwrap();
    assert_eq!(inserted, 15);
    assert_eq!(view.cursor(), 15);
    // The cursor still points at the same line.
    assert_eq!(view.current_pos(), before);
}

#[tokio::test]
async fn reset_clears_state_and_reopens_eof() {
    let (mut view, _tmp) = view_over(b"a\nb\n", 3).await;
    view.fill().await.unwrap();
    assert!(view.eof_reached());
    view.reset(Pos::START);
    assert_eq!(view.len(), 0);
    assert_eq!(view.cursor(), 0);
    assert!(!view.eof_reached());
}

#[tokio::test]
async fn refresh_keeps_the_current_position() {
    let (mut view, _tmp) = view_over(numbered(40).as_bytes(), 4).await;
    view.shift(6).await.unwrap();
    let pos = view.current_pos();
    view.refresh();
    assert_eq!(view.len(), 0);
    assert_eq!(view.anchor(), pos);
    view.fill().await.unwrap();
    assert_eq!(view.current_pos(), pos);
}

#[tokio::test]
async fn in_buffer_search_scans_both_directions() {
    let (mut view, _tmp) = view_over(b"alpha\nbeta\ngamma\nbeta\nomega\n", 5).await;
    view.fill().await.unwrap();
    view.shift(2).await.unwrap();

    let beta = search_fn(SearchMode::CaseSensitive, &runes("beta")).unwrap();
    assert_eq!(view.search_forward(&beta), Some(1));
    assert_eq!(view.search_back(&beta), Some(1));

    let missing = search_fn(SearchMode::CaseSensitive, &runes("nothing")).unwrap();
    assert_eq!(view.search_forward(&missing), None);
    assert_eq!(view.search_back(&missing), None);
}

#[tokio::test]
async fn filter_change_then_refresh_shows_filtered_stream() {
    use core_filter::{Filter, FilterAction};
    let (mut view, _tmp) = view_over(b"keep 1\ndrop\nkeep 2\n", 3).await;
    view.fill().await.unwrap();
    assert_eq!(view.len(), 3);

    let filter = Filter::new(
        &runes("keep"),
        FilterAction::Intersect,
        SearchMode::CaseSensitive,
    )
    .unwrap();
    view.fetcher().add_filter(filter);
    view.refresh();
    view.fill().await.unwrap();
    assert_eq!(view.len(), 2);
    assert_eq!(view.current_line().unwrap().text.text(), "keep 1");
}
