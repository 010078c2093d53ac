// Compaction: keep only entries whose count meets a threshold.

use super::index::Counted;

/// Return the entries with `count >= threshold`, in their original order.
///
/// The source slice is untouched; the result borrows from it.
pub fn compact<T: Counted>(entries: &[T], threshold: u64) -> Vec<&T> {
    entries.iter().filter(|e| e.count() >= threshold).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row(u64);

    impl Counted for Row {
        fn count(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn test_keeps_entries_at_or_above_threshold() {
        let rows = [Row(10), Row(40), Row(41), Row(39)];
        let kept: Vec<u64> = compact(&rows, 40).iter().map(|r| r.0).collect();
        assert_eq!(kept, vec![40, 41]);
    }

    #[test]
    fn test_empty_input() {
        let rows: [Row; 0] = [];
        assert!(compact(&rows, 1).is_empty());
    }

    #[test]
    fn test_zero_threshold_keeps_everything() {
        let rows = [Row(0), Row(5)];
        assert_eq!(compact(&rows, 0).len(), 2);
    }
}
