//! # Input File Selection
//!
//! Expands user-supplied patterns into an ordered, deduplicated list of
//! regular files to archive.
//!
//! Patterns go through tilde and brace expansion first, then filesystem
//! globbing (`*`, `?`, character classes). A directory matched at the leaf
//! is walked when recursion is on and skipped otherwise. Every matched file
//! is deduplicated on its canonical path, so `a.txt`, `./a.txt` and a
//! symlinked spelling of the same file produce one entry.
//!
//! Case-insensitive selection rewrites each letter of the pattern into a
//! two-character class (`[aA]`) before globbing, which works on
//! case-sensitive filesystems too.
//!
//! A base directory can be threaded in (`--source-dir`); patterns are then
//! resolved beneath it and stored names are relative to it. This replaces
//! changing the process working directory, which would not be safe once
//! worker threads are running.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use glob::MatchOptions;
use walkdir::WalkDir;

/// Pattern-matching behaviour flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchFlags {
    /// Recurse into directories matched by a pattern.
    pub recursive: bool,
    /// Match patterns case-insensitively.
    pub ignore_case: bool,
}

/// One selected file: the name as it will be stored (before manifest
/// normalisation) and the path to open on disk.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub stored: String,
    pub disk: PathBuf,
}

/// The ordered, deduplicated selection.
pub struct FileSet {
    files: Vec<FileEntry>,
    seen: HashSet<PathBuf>,
    base: Option<PathBuf>,
}

impl FileSet {
    pub fn new(base: Option<PathBuf>) -> Self {
        FileSet { files: Vec::new(), seen: HashSet::new(), base }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter()
    }

    /// Expands one pattern and adds everything it matches. Patterns that
    /// match nothing (or fail to parse) are silently ignored; the caller
    /// decides what an overall empty selection means.
    pub fn add_pattern(&mut self, pattern: &str, flags: MatchFlags) {
        for pat in expand_braces(&expand_tilde(pattern)) {
            let mut pat = pat;
            if pat.len() > 1 && pat.ends_with('/') {
                pat.pop();
            }
            if flags.ignore_case {
                pat = icase_pattern(&pat);
            }
            let full = match &self.base {
                Some(base) if !Path::new(&pat).is_absolute() => {
                    base.join(&pat).to_string_lossy().into_owned()
                }
                _ => pat,
            };
            let options = MatchOptions {
                case_sensitive: !flags.ignore_case,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            };
            let paths = match glob::glob_with(&full, options) {
                Ok(paths) => paths,
                Err(_) => continue,
            };
            for path in paths.flatten() {
                let meta = match fs::metadata(&path) {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                if meta.is_dir() {
                    if flags.recursive {
                        self.add_tree(&path);
                    }
                } else if meta.is_file() {
                    self.push(path);
                }
            }
        }
    }

    fn add_tree(&mut self, dir: &Path) {
        for entry in WalkDir::new(dir).sort_by_file_name().into_iter().flatten() {
            if entry.file_type().is_file() {
                self.push(entry.into_path());
            }
        }
    }

    /// Adds one regular file, deduplicating on its canonical path.
    ///
    /// The stored name is the cleaned relative spelling, except that a path
    /// still escaping upward through `..` after cleaning is stored in its
    /// canonical absolute form.
    fn push(&mut self, disk: PathBuf) {
        let canonical = match disk.canonicalize() {
            Ok(c) => c,
            Err(_) => return,
        };
        if !self.seen.insert(canonical.clone()) {
            return;
        }

        let relative = match &self.base {
            Some(base) => disk.strip_prefix(base).unwrap_or(&disk).to_path_buf(),
            None => disk.clone(),
        };
        let cleaned = strip_dot_segments(&relative.to_string_lossy());
        let stored = if escapes_upward(&cleaned) {
            canonical.to_string_lossy().into_owned()
        } else {
            cleaned
        };
        self.files.push(FileEntry { stored, disk });
    }
}

fn escapes_upward(path: &str) -> bool {
    path == ".." || path.starts_with("../") || path.contains("/../") || path.ends_with("/..")
}

/// Drops `.` components: `./a/./b` becomes `a/b`. `..` components survive.
fn strip_dot_segments(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| *s != ".").collect();
    segments.join("/")
}

/// Rewrites every letter into a two-character class: `a.txt` becomes
/// `[aA].[tT][xX][tT]`. Wildcard-free components are otherwise looked up
/// directly on the filesystem, where no case folding happens; the classes
/// force real directory matching at every level.
fn icase_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 4);
    for c in pattern.chars() {
        if c.is_ascii_alphabetic() {
            out.push('[');
            out.push(c.to_ascii_lowercase());
            out.push(c.to_ascii_uppercase());
            out.push(']');
        } else {
            out.push(c);
        }
    }
    out
}

fn expand_tilde(pattern: &str) -> String {
    if pattern == "~" || pattern.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{}{}", home, &pattern[1..]);
        }
    }
    pattern.to_string()
}

/// Expands the first `{a,b,...}` group and recurses; `a{1,2}b` yields
/// `a1b` and `a2b`. Nested groups expand inside out.
fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let bytes = pattern.as_bytes();
    let mut depth = 0usize;
    let mut close = None;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let head = &pattern[..open];
    let body = &pattern[open + 1..close];
    let tail = &pattern[close + 1..];

    let mut alternatives = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, &b) in body.as_bytes().iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            b',' if depth == 0 => {
                alternatives.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    alternatives.push(&body[start..]);

    let mut out = Vec::new();
    for alt in alternatives {
        for expanded in expand_braces(&format!("{head}{alt}{tail}")) {
            out.push(expanded);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap().write_all(b"x").unwrap();
    }

    #[test]
    fn duplicate_spellings_collapse() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a.txt");

        let mut set = FileSet::new(Some(dir.path().to_path_buf()));
        let flags = MatchFlags::default();
        set.add_pattern("a.txt", flags);
        set.add_pattern("./a.txt", flags);
        set.add_pattern("a.txt", flags);
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().stored, "a.txt");
    }

    #[test]
    fn glob_matches_and_sorts() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "b.txt");
        touch(dir.path(), "a.txt");
        touch(dir.path(), "c.bin");

        let mut set = FileSet::new(Some(dir.path().to_path_buf()));
        set.add_pattern("*.txt", MatchFlags::default());
        let names: Vec<_> = set.iter().map(|f| f.stored.clone()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
    }

    #[test]
    fn directories_need_the_recursive_flag() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "sub/inner/deep.txt");
        touch(dir.path(), "sub/top.txt");

        let mut set = FileSet::new(Some(dir.path().to_path_buf()));
        set.add_pattern("sub", MatchFlags::default());
        assert!(set.is_empty());

        set.add_pattern("sub", MatchFlags { recursive: true, ..Default::default() });
        let names: Vec<_> = set.iter().map(|f| f.stored.clone()).collect();
        assert_eq!(names, ["sub/inner/deep.txt", "sub/top.txt"]);
    }

    #[test]
    fn case_insensitive_matching() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "ReadMe.TXT");

        let mut set = FileSet::new(Some(dir.path().to_path_buf()));
        set.add_pattern("readme.txt", MatchFlags::default());
        assert!(set.is_empty());

        set.add_pattern("readme.txt", MatchFlags { ignore_case: true, ..Default::default() });
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn brace_expansion() {
        assert_eq!(expand_braces("a{1,2}b"), ["a1b", "a2b"]);
        assert_eq!(expand_braces("{x,y}{1,2}"), ["x1", "x2", "y1", "y2"]);
        assert_eq!(expand_braces("plain"), ["plain"]);
        assert_eq!(expand_braces("a{b{c,d},e}"), ["abc", "abd", "ae"]);

        let dir = tempdir().unwrap();
        touch(dir.path(), "one.txt");
        touch(dir.path(), "two.bin");
        let mut set = FileSet::new(Some(dir.path().to_path_buf()));
        set.add_pattern("{one.txt,two.bin}", MatchFlags::default());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn dot_segments_are_cleaned() {
        assert_eq!(strip_dot_segments("./a/./b"), "a/b");
        assert_eq!(strip_dot_segments("a/b"), "a/b");
        assert!(escapes_upward("../x"));
        assert!(escapes_upward("a/../x"));
        assert!(!escapes_upward("a..b/x"));
    }
}
