//! Immutable heap strings.

use ivy_core::hash::hash_str;
use std::fmt;
use std::rc::Rc;

/// String object body. The text is shared with map keys built from it and
/// its hash is computed once at construction.
#[derive(Clone)]
pub struct Str {
    text: Rc<str>,
    hash: u64,
}

impl Str {
    pub fn new(s: &str) -> Self {
        Self {
            text: Rc::from(s),
            hash: hash_str(s),
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    #[inline]
    pub fn hash_code(&self) -> u64 {
        self.hash
    }

    pub(crate) fn shared_text(&self) -> Rc<str> {
        Rc::clone(&self.text)
    }
}

impl fmt::Debug for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.text, f)
    }
}

impl fmt::Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
