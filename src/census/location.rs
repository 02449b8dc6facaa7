//! Source-location atoms.
//!
//! A [`SourceLocation`] identifies a call site by a (file, function, line) triple whose
//! string components are `'static` string literals baked in by [`call_site!`]. The
//! literals are address-stable for the life of the process, so equality, ordering, and
//! hashing all work on pointer bit patterns rather than string contents. Comparing two
//! locations is three integer comparisons, never a string walk.
//!
//! The ordering (file pointer, then function pointer, then line) is arbitrary but total
//! and deterministic within a process run, which is all the birth map needs from its
//! key.
//!
//! [`call_site!`]: crate::call_site

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A pointer-identity call-site identifier.
#[derive(Clone, Copy, Serialize)]
pub struct SourceLocation {
    file: &'static str,
    function: &'static str,
    line: u32,
}

impl SourceLocation {
    /// Intended to be called through [`call_site!`](crate::call_site), which supplies
    /// address-stable literals. Callers constructing locations by hand must uphold the
    /// same contract: the strings live for the life of the process and identical
    /// logical sites reuse identical pointers.
    pub const fn new(file: &'static str, function: &'static str, line: u32) -> Self {
        Self {
            file,
            function,
            line,
        }
    }

    pub fn file(&self) -> &'static str {
        self.file
    }

    pub fn function(&self) -> &'static str {
        self.function
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

impl PartialEq for SourceLocation {
    fn eq(&self, other: &Self) -> bool {
        self.file.as_ptr() == other.file.as_ptr()
            && self.function.as_ptr() == other.function.as_ptr()
            && self.line == other.line
    }
}

impl Eq for SourceLocation {}

impl PartialOrd for SourceLocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SourceLocation {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.file.as_ptr() as usize)
            .cmp(&(other.file.as_ptr() as usize))
            .then_with(|| {
                (self.function.as_ptr() as usize).cmp(&(other.function.as_ptr() as usize))
            })
            .then_with(|| self.line.cmp(&other.line))
    }
}

impl Hash for SourceLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.file.as_ptr() as usize);
        state.write_usize(self.function.as_ptr() as usize);
        state.write_u32(self.line);
    }
}

impl fmt::Debug for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.file, self.line, self.function)
    }
}

/// Expands to the [`SourceLocation`] of the expansion site.
///
/// `file!()` and `module_path!()` expand to single `'static` literals per site, so every
/// execution of the same expansion yields pointer-equal components. The enclosing module
/// path stands in for the function name.
#[macro_export]
macro_rules! call_site {
    () => {
        $crate::census::SourceLocation::new(file!(), module_path!(), line!())
    };
}
