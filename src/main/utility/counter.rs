/*!
A counter for frequencies of a set of string keys. The counter starts with no
keys; incrementing an unknown key inserts it with that value, incrementing a
known key adds to it. The counter renders with the heaviest hitters first,
and serializes as a map for the stats file.
*/

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Maps individual keys to count values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Counter {
    items: HashMap<String, u64>,
}

impl Counter {
    /// A new counter with no keys.
    pub fn new() -> Counter {
        Counter {
            items: HashMap::new(),
        }
    }

    /// Increment the value for `id` by one and return the new value.
    pub fn add_one(&mut self, id: &str) -> u64 {
        self.add_value(id, 1)
    }

    /// Increment the value for `id` by `value` and return the new value.
    pub fn add_value(&mut self, id: &str, value: u64) -> u64 {
        let val = self.items.entry(id.to_string()).or_insert(0);
        *val += value;
        *val
    }

    /// The value for `id`, or 0 if the key was never counted.
    pub fn get_value(&self, id: &str) -> u64 {
        self.items.get(id).copied().unwrap_or(0)
    }

    /// Fold another counter's values into this one.
    pub fn add_counter(&mut self, other: &Counter) {
        for (key, value) in other.items.iter() {
            self.add_value(key, *value);
        }
    }

    /// Keys and values sorted with the heaviest hitters first; ties sort by
    /// key so the output is stable.
    fn sorted_items(&self) -> Vec<(&String, &u64)> {
        let mut items: Vec<_> = self.items.iter().collect();
        items.sort_by(|(ka, va), (kb, vb)| vb.cmp(va).then_with(|| ka.cmp(kb)));
        items
    }
}

impl Display for Counter {
    /// Renders as `{key1:value1, key2:value2, ...}` sorted by value with the
    /// largest value first.
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.sorted_items().into_iter().enumerate() {
            let sep = if i > 0 { ", " } else { "" };
            write!(f, "{sep}{key}:{value}")?;
        }
        write!(f, "}}")
    }
}

impl Serialize for Counter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.items.len()))?;
        for (key, value) in self.sorted_items() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_add() {
        let mut counter = Counter::new();
        assert_eq!(counter.get_value("read"), 0);
        assert_eq!(counter.add_one("read"), 1);
        assert_eq!(counter.add_one("read"), 2);
        assert_eq!(counter.add_value("write", 10), 10);
        assert_eq!(counter.get_value("read"), 2);
        assert_eq!(counter.get_value("write"), 10);
    }

    #[test]
    fn test_counter_merge() {
        let mut a = Counter::new();
        a.add_value("x", 2);
        a.add_value("y", 1);

        let mut b = Counter::new();
        b.add_value("y", 4);
        b.add_value("z", 3);

        a.add_counter(&b);
        assert_eq!(a.get_value("x"), 2);
        assert_eq!(a.get_value("y"), 5);
        assert_eq!(a.get_value("z"), 3);
    }

    #[test]
    fn test_counter_display() {
        let mut counter = Counter::new();
        counter.add_value("b", 2);
        counter.add_value("a", 9);
        counter.add_value("c", 2);
        assert_eq!(counter.to_string(), "{a:9, b:2, c:2}");
    }
}
