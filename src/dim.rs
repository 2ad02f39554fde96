// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock};

/// An interned dimension label.
///
/// `Dim` is a small copy type with fast equality and a stable hash. Two
/// `Dim`s constructed from the same text are equal:
///
/// ```
/// use dimarray::Dim;
///
/// assert_eq!(Dim::new("x"), Dim::new("x"));
/// assert_ne!(Dim::new("x"), Dim::new("y"));
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Dim(u32);

struct Interner {
    names: Vec<&'static str>,
    ids: HashMap<&'static str, u32>,
}

fn interner() -> &'static Mutex<Interner> {
    static TABLE: OnceLock<Mutex<Interner>> = OnceLock::new();
    TABLE.get_or_init(|| {
        // Slot 0 is reserved for the invalid sentinel.
        let mut ids = HashMap::new();
        ids.insert("<invalid>", 0);
        Mutex::new(Interner {
            names: vec!["<invalid>"],
            ids,
        })
    })
}

impl Dim {
    /// Intern `label` and return its `Dim`.
    ///
    /// ***Panics*** if `label` is empty; the empty label is reserved for
    /// the [`invalid`](Dim::invalid) sentinel.
    pub fn new(label: &str) -> Dim {
        assert!(!label.is_empty(), "dimension labels must not be empty");
        let mut table = interner().lock().unwrap();
        if let Some(&id) = table.ids.get(label) {
            return Dim(id);
        }
        let owned: &'static str = Box::leak(label.to_owned().into_boxed_str());
        let id = table.names.len() as u32;
        table.names.push(owned);
        table.ids.insert(owned, id);
        Dim(id)
    }

    /// The invalid sentinel, distinct from every interned label.
    #[inline]
    pub fn invalid() -> Dim {
        Dim(0)
    }

    /// Whether this is the invalid sentinel.
    #[inline]
    pub fn is_invalid(self) -> bool {
        self.0 == 0
    }

    /// Return the textual label.
    pub fn name(self) -> &'static str {
        interner().lock().unwrap().names[self.0 as usize]
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dim({})", self.name())
    }
}

impl From<&str> for Dim {
    fn from(label: &str) -> Dim {
        Dim::new(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_label_same_dim() {
        let a = Dim::new("time");
        let b = Dim::new("time");
        assert_eq!(a, b);
        assert_eq!(a.name(), "time");
    }

    #[test]
    fn invalid_is_distinct() {
        assert!(Dim::invalid().is_invalid());
        assert_ne!(Dim::invalid(), Dim::new("x"));
        assert_eq!(Dim::invalid().name(), "<invalid>");
    }

    #[test]
    #[should_panic]
    fn empty_label_is_rejected() {
        let _ = Dim::new("");
    }
}
