//! Parsed units, registered once per run

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A unit's registration: its parsed program or why parsing failed
#[derive(Debug)]
pub enum UnitEntry<U> {
    Parsed(Rc<U>),
    Failed(Rc<str>),
}

impl<U> Clone for UnitEntry<U> {
    fn clone(&self) -> Self {
        match self {
            UnitEntry::Parsed(unit) => UnitEntry::Parsed(Rc::clone(unit)),
            UnitEntry::Failed(message) => UnitEntry::Failed(Rc::clone(message)),
        }
    }
}

/// Every unit seen during a run, keyed by normalized path
#[derive(Debug)]
pub struct FileTable<U> {
    entries: HashMap<PathBuf, UnitEntry<U>>,
    executed: HashSet<PathBuf>,
    parse_count: usize,
}

impl<U> Default for FileTable<U> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            executed: HashSet::new(),
            parse_count: 0,
        }
    }
}

impl<U> FileTable<U> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a unit, parsing it with `parse` the first time it is needed
    pub fn register<P>(&mut self, path: &Path, parse: P) -> UnitEntry<U>
    where
        P: FnOnce(&Path) -> Result<U, String>,
    {
        if let Some(entry) = self.entries.get(path) {
            return entry.clone();
        }
        self.parse_count += 1;
        let entry = match parse(path) {
            Ok(unit) => UnitEntry::Parsed(Rc::new(unit)),
            Err(message) => UnitEntry::Failed(Rc::from(message.as_str())),
        };
        self.entries.insert(path.to_path_buf(), entry.clone());
        entry
    }

    pub fn get(&self, path: &Path) -> Option<&UnitEntry<U>> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Record that a unit ran; false if it had already run
    pub fn mark_executed(&mut self, path: &Path) -> bool {
        self.executed.insert(path.to_path_buf())
    }

    pub fn was_executed(&self, path: &Path) -> bool {
        self.executed.contains(path)
    }

    /// How many times a parser was invoked
    pub fn parse_count(&self) -> usize {
        self.parse_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_parses_once() {
        let mut table: FileTable<String> = FileTable::new();
        let path = Path::new("/app/a.php");

        let first = table.register(path, |_| Ok("program".to_string()));
        let second = table.register(path, |_| panic!("parsed twice"));

        match (first, second) {
            (UnitEntry::Parsed(a), UnitEntry::Parsed(b)) => assert!(Rc::ptr_eq(&a, &b)),
            _ => panic!("expected parsed entries"),
        }
        assert_eq!(table.parse_count(), 1);
    }

    #[test]
    fn test_failures_are_cached() {
        let mut table: FileTable<String> = FileTable::new();
        let path = Path::new("/app/broken.php");
        table.register(path, |_| Err("syntax error".to_string()));
        let again = table.register(path, |_| Ok("never".to_string()));
        assert!(matches!(again, UnitEntry::Failed(ref m) if m.as_ref() == "syntax error"));
        assert_eq!(table.parse_count(), 1);
    }

    #[test]
    fn test_mark_executed() {
        let mut table: FileTable<()> = FileTable::new();
        let path = Path::new("/app/once.php");
        assert!(!table.was_executed(path));
        assert!(table.mark_executed(path));
        assert!(!table.mark_executed(path));
        assert!(table.was_executed(path));
    }
}
