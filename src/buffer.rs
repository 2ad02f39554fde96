// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::sync::Arc;

/// Reference-counted contiguous storage with copy-on-write mutation.
///
/// Cloning a `Buffer` shares the allocation. Reads never copy; a write
/// through [`make_mut`](Buffer::make_mut) copies first unless this handle
/// is the unique owner. The size is fixed at creation.
pub struct Buffer<A> {
    data: Arc<Vec<A>>,
}

impl<A> Buffer<A> {
    /// Take ownership of `v` as a new shared buffer.
    pub fn from_vec(v: Vec<A>) -> Buffer<A> {
        Buffer { data: Arc::new(v) }
    }

    /// The number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read access to the elements.
    #[inline]
    pub fn as_slice(&self) -> &[A] {
        &self.data
    }

    /// Whether two handles share one allocation.
    #[inline]
    pub fn ptr_eq(&self, other: &Buffer<A>) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Whether this handle is the unique owner.
    #[inline]
    pub fn is_unique(&mut self) -> bool {
        Arc::get_mut(&mut self.data).is_some()
    }
}

impl<A: Clone> Buffer<A> {
    /// Write access; copies the allocation first unless uniquely owned.
    #[inline]
    pub fn make_mut(&mut self) -> &mut [A] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// An independent deep copy.
    pub fn deep_copy(&self) -> Buffer<A> {
        Buffer::from_vec(self.data.as_ref().clone())
    }
}

impl<A> Clone for Buffer<A> {
    fn clone(&self) -> Buffer<A> {
        Buffer {
            data: Arc::clone(&self.data),
        }
    }
}

impl<A: PartialEq> PartialEq for Buffer<A> {
    fn eq(&self, other: &Buffer<A>) -> bool {
        self.ptr_eq(other) || self.as_slice() == other.as_slice()
    }
}

impl<A: fmt::Debug> fmt::Debug for Buffer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice().iter()).finish()
    }
}

impl<A> From<Vec<A>> for Buffer<A> {
    fn from(v: Vec<A>) -> Buffer<A> {
        Buffer::from_vec(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_until_written() {
        let mut a = Buffer::from_vec(vec![1, 2, 3]);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        a.make_mut()[0] = 7;
        assert!(!a.ptr_eq(&b));
        assert_eq!(a.as_slice(), &[7, 2, 3]);
        assert_eq!(b.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn unique_owner_writes_in_place() {
        let mut a = Buffer::from_vec(vec![1, 2]);
        assert!(a.is_unique());
        let before = a.as_slice().as_ptr();
        a.make_mut()[1] = 9;
        assert_eq!(a.as_slice().as_ptr(), before);
    }
}
