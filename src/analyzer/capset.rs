//! Sets of Linux capability names.

use std::collections::BTreeSet;
use std::fmt;

/// A set of capability names, normalized to upper case without the `CAP_` prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapSet(BTreeSet<String>);

pub fn normalize(name: &str) -> String {
    let upper = name.trim().to_uppercase();
    match upper.strip_prefix("CAP_") {
        Some(stripped) => stripped.to_string(),
        None => upper,
    }
}

impl CapSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str) -> bool {
        self.0.insert(normalize(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(&normalize(name))
    }

    pub fn union(&self, other: &CapSet) -> CapSet {
        CapSet(self.0.union(&other.0).cloned().collect())
    }

    /// Members of `self` that are not in `other`.
    pub fn difference(&self, other: &CapSet) -> CapSet {
        CapSet(self.0.difference(&other.0).cloned().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for CapSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        CapSet(iter.into_iter().map(|s| normalize(s.as_ref())).collect())
    }
}

impl fmt::Display for CapSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        f.write_str(&names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_recommended_minus_dropped() {
        let recommended: CapSet = ["A", "B", "C", "D"].into_iter().collect();
        let dropped: CapSet = ["D", "B"].into_iter().collect();
        let missing = recommended.difference(&dropped);
        assert_eq!(missing, ["C", "A"].into_iter().collect::<CapSet>());
        assert_eq!(missing.len(), 2);
    }

    #[test]
    fn test_names_are_normalized() {
        let caps: CapSet = ["cap_net_raw", "SYS_ADMIN"].into_iter().collect();
        assert!(caps.contains("NET_RAW"));
        assert!(caps.contains("cap_sys_admin"));
        assert_eq!(caps.to_string(), "NET_RAW,SYS_ADMIN");
    }

    proptest! {
        #[test]
        fn prop_difference_is_disjoint_and_covered(
            a in proptest::collection::vec("[A-F]", 0..8),
            b in proptest::collection::vec("[A-F]", 0..8),
        ) {
            let a: CapSet = a.into_iter().collect();
            let b: CapSet = b.into_iter().collect();
            let diff = a.difference(&b);
            for name in diff.iter() {
                prop_assert!(a.contains(name));
                prop_assert!(!b.contains(name));
            }
            prop_assert_eq!(diff.union(&b), a.union(&b));
        }
    }
}
