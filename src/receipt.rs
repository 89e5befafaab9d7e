//! Opaque handles for stored queue payloads.

use std::fmt;

/// A handle to a payload blob stored in the queue.
///
/// Every mutation that refers to a stored payload (associating it with more
/// destinations, cleaning it after delivery) takes a `Receipt` obtained from
/// a previous insert or drain rather than a raw row id.
///
/// Receipts compare, order and hash by the wrapped NID, so two receipts
/// produced by separate drains of the same payload are equal and can be used
/// interchangeably as map keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Receipt {
    nid: i64,
}

impl Receipt {
    /// Wraps a known payload NID.
    ///
    /// No lookup is performed; the caller vouches that the NID came from the
    /// queue itself.
    pub fn new(nid: i64) -> Self {
        Self { nid }
    }

    /// The numeric id of the payload row in `federation_queue_json`.
    pub fn nid(&self) -> i64 {
        self.nid
    }
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receipt#{}", self.nid)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};

    use super::*;

    #[test]
    fn receipts_for_same_nid_are_interchangeable_keys() {
        let mut seen = HashSet::new();
        seen.insert(Receipt::new(7));
        assert!(seen.contains(&Receipt::new(7)));
        assert!(!seen.contains(&Receipt::new(8)));
    }

    #[test]
    fn receipts_order_by_nid() {
        let map: BTreeMap<Receipt, &str> = [(Receipt::new(3), "c"), (Receipt::new(1), "a")]
            .into_iter()
            .collect();
        let nids: Vec<i64> = map.keys().map(Receipt::nid).collect();
        assert_eq!(nids, vec![1, 3]);
    }
}
