use std::collections::HashSet;

use parking_lot::Mutex;

/// Named reentrancy tracker: processors register the key they are working on
/// so in-flight work is observable and duplicate submissions bounce off.
#[derive(Default)]
pub struct ProcessBook {
    pages: Mutex<HashSet<String>>,
}

impl ProcessBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key`; false means it is already being processed.
    pub fn acquire(&self, key: &str) -> bool {
        self.pages.lock().insert(key.to_string())
    }

    pub fn free_page(&self, key: &str) {
        self.pages.lock().remove(key);
    }

    /// Snapshot of everything currently in flight.
    pub fn pages(&self) -> Vec<String> {
        let mut pages: Vec<String> = self.pages.lock().iter().cloned().collect();
        pages.sort();
        pages
    }

    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_free() {
        let book = ProcessBook::new();
        assert!(book.acquire("slot=12345"));
        assert!(!book.acquire("slot=12345"));
        assert!(book.acquire("epoch=386"));
        assert_eq!(book.pages(), vec!["epoch=386", "slot=12345"]);

        book.free_page("slot=12345");
        assert!(book.acquire("slot=12345"));
        assert_eq!(book.len(), 2);
    }
}
