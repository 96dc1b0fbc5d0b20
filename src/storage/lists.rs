//! Whitelist and blacklist files.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// Load a newline-delimited username list. A missing file is an empty set.
///
/// Lines are trimmed, a leading `@` is dropped, and blank lines or lines
/// starting with `#` are ignored.
pub fn load_username_list(path: &Path) -> io::Result<HashSet<String>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e),
    };

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.trim_start_matches('@').to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_list_is_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let list = load_username_list(&temp_dir.path().join("whitelist.txt")).expect("load");
        assert!(list.is_empty());
    }

    #[test]
    fn test_list_parsing() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("blacklist.txt");
        fs::write(&path, "alice\n  bob  \r\n\n# comment\n@carol\n").expect("write list");

        let list = load_username_list(&path).expect("load");
        assert_eq!(list.len(), 3);
        assert!(list.contains("alice"));
        assert!(list.contains("bob"));
        assert!(list.contains("carol"));
    }
}
