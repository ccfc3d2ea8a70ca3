//! Capture bookkeeping
//!
//! Pairs the number of shutter releases issued with the picture paths the
//! device has reported so far. Both live behind the session guard and are
//! always read together.

use crate::types::PicturePath;

#[derive(Debug, Default, Clone)]
pub struct CaptureLedger {
    pictures: Vec<PicturePath>,
    trigger_count: usize,
}

impl CaptureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_trigger(&mut self) {
        self.trigger_count += 1;
    }

    /// Append a discovered picture, returning its index
    pub fn record_picture(&mut self, path: PicturePath) -> usize {
        self.pictures.push(path);
        self.pictures.len() - 1
    }

    /// True once every issued trigger has a reported picture
    pub fn is_settled(&self) -> bool {
        self.pictures.len() == self.trigger_count
    }

    pub fn trigger_count(&self) -> usize {
        self.trigger_count
    }

    pub fn len(&self) -> usize {
        self.pictures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pictures.is_empty()
    }

    pub fn pictures(&self) -> &[PicturePath] {
        &self.pictures
    }

    pub fn paths(&self) -> Vec<String> {
        self.pictures.iter().map(|p| p.to_string()).collect()
    }

    pub fn reset(&mut self) {
        self.pictures.clear();
        self.trigger_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_tracks_triggers_and_pictures() {
        let mut ledger = CaptureLedger::new();
        assert!(ledger.is_settled());

        ledger.record_trigger();
        ledger.record_trigger();
        assert!(!ledger.is_settled());

        assert_eq!(ledger.record_picture(PicturePath::new("/DCIM", "B.JPG")), 0);
        assert!(!ledger.is_settled());
        assert_eq!(ledger.record_picture(PicturePath::new("/DCIM", "A.JPG")), 1);
        assert!(ledger.is_settled());

        // Observation order, not name order
        assert_eq!(ledger.paths(), vec!["/DCIM/B.JPG", "/DCIM/A.JPG"]);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut ledger = CaptureLedger::new();
        ledger.record_picture(PicturePath::new("/DCIM", "A.JPG"));
        ledger.record_picture(PicturePath::new("/DCIM", "A.JPG"));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut ledger = CaptureLedger::new();
        ledger.record_trigger();
        ledger.record_picture(PicturePath::new("/DCIM", "A.JPG"));
        ledger.record_trigger();

        ledger.reset();
        assert!(ledger.is_empty());
        assert_eq!(ledger.trigger_count(), 0);
        assert!(ledger.is_settled());
    }
}
