use core::fmt;

/// The error returned when a bulk load cannot start.
///
/// A failed load leaves the tree untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The tree already holds elements. Bulk loading only builds a tree from scratch; clear the
    /// tree first.
    NotEmpty {
        /// The number of elements in the tree.
        len: usize,
    },
    /// The key and value sequences have different lengths.
    LengthMismatch { keys: usize, values: usize },
}

impl fmt::Display for LoadError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEmpty { len } => {
                write!(formatter, "cannot bulk load into a non-empty tree ({len} elements)")
            }
            Self::LengthMismatch { keys, values } => write!(
                formatter,
                "cannot pair {keys} keys with {values} values for a bulk load"
            ),
        }
    }
}

impl std::error::Error for LoadError {}
