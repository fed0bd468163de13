//! Prompt history: one entry per line, newest last.
//!
//! The file is append-only in the common case; once it reaches
//! [`HISTORY_LIMIT`] entries it is compacted to the most recent 80% through
//! a rewrite-and-rename, so a crash can never lose the live file.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Entry count that triggers compaction.
pub const HISTORY_LIMIT: usize = 1000;

/// Share of [`HISTORY_LIMIT`] kept by a compaction.
const KEPT_ON_TRIM: usize = HISTORY_LIMIT / 100 * 80;

/// In-memory view of the history file plus a recall cursor.
///
/// `pos` counts from the end: 0 is "before the newest entry", 1 is the
/// newest entry. While recalling, the prompt's in-progress input is stashed
/// so walking forward past the newest entry restores it.
#[derive(Debug)]
pub struct History {
    path: PathBuf,
    entries: Vec<String>,
    pos: usize,
    stashed: String,
    loaded: bool,
}

impl History {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: Vec::new(),
            pos: 0,
            stashed: String::new(),
            loaded: false,
        }
    }

    /// Reads the file once; missing files are an empty history.
    fn load(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        match fs::read_to_string(&self.path) {
            Ok(text) => {
                self.entries = text.lines().map(str::to_owned).collect();
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::debug!(target: "config.history", error = %e, "could not read history");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends an entry and persists it. Empty strings are not recorded.
    /// Persistence is best-effort: failures are logged, the in-memory
    /// history stays usable.
    pub fn add(&mut self, entry: &str) {
        if entry.is_empty() {
            return;
        }
        self.load();
        self.entries.push(entry.to_owned());
        self.pos = 0;
        if let Err(e) = self.append_to_file(entry) {
            tracing::debug!(target: "config.history", error = %e, "could not append history");
            return;
        }
        if self.entries.len() >= HISTORY_LIMIT {
            if let Err(e) = self.trim() {
                tracing::debug!(target: "config.history", error = %e, "could not trim history");
            }
        }
    }

    fn append_to_file(&self, entry: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{entry}")
    }

    /// Compacts to the most recent entries via atomic rewrite-and-rename.
    fn trim(&mut self) -> std::io::Result<()> {
        let keep_from = self.entries.len().saturating_sub(KEPT_ON_TRIM);
        let kept: Vec<String> = self.entries[keep_from..].to_vec();
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = fs::File::create(&tmp_path)?;
            for entry in &kept {
                writeln!(tmp, "{entry}")?;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        self.entries = kept;
        Ok(())
    }

    /// Recalls one entry older. On the first step the in-progress prompt
    /// input is stashed for [`History::recall_forward`].
    pub fn recall_back(&mut self, current: &str) -> Option<&str> {
        self.load();
        if self.pos >= self.entries.len() {
            return None;
        }
        if self.pos == 0 {
            self.stashed = current.to_owned();
        }
        self.pos += 1;
        Some(&self.entries[self.entries.len() - self.pos])
    }

    /// Recalls one entry newer; stepping past the newest entry restores the
    /// stashed in-progress input.
    pub fn recall_forward(&mut self) -> Option<String> {
        if self.pos == 0 {
            return None;
        }
        self.pos -= 1;
        if self.pos == 0 {
            return Some(self.stashed.clone());
        }
        Some(self.entries[self.entries.len() - self.pos].clone())
    }

    /// Ends a recall session (prompt submitted or cancelled).
    pub fn reset_cursor(&mut self) {
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_in(dir: &tempfile::TempDir) -> History {
        History::new(dir.path().join("history"))
    }

    #[test]
    fn add_persists_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = history_in(&dir);
        h.add("&foo");
        h.add("bar");
        h.add("");

        let mut again = history_in(&dir);
        again.load();
        assert_eq!(again.entries, vec!["&foo", "bar"]);
    }

    #[test]
    fn recall_walks_back_and_forward() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = history_in(&dir);
        h.add("one");
        h.add("two");

        assert_eq!(h.recall_back("typed"), Some("two"));
        assert_eq!(h.recall_back("typed"), Some("one"));
        // Past the oldest entry the cursor stays put.
        assert_eq!(h.recall_back("typed"), None);
        assert_eq!(h.recall_forward().as_deref(), Some("two"));
        assert_eq!(h.recall_forward().as_deref(), Some("typed"));
        assert_eq!(h.recall_forward(), None);
    }

    #[test]
    fn trim_keeps_recent_entries_and_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = history_in(&dir);
        for i in 0..HISTORY_LIMIT {
            h.add(&format!("entry-{i}"));
        }
        assert_eq!(h.len(), KEPT_ON_TRIM);
        assert_eq!(h.entries.last().unwrap(), "entry-999");

        let mut again = history_in(&dir);
        again.load();
        assert_eq!(again.len(), KEPT_ON_TRIM);
        assert_eq!(again.entries.first().unwrap(), "entry-200");
    }
}
