//! Sibling conflict resolution contract.

use crate::error::{ClientError, Result};

/// Resolves multiple sibling values returned for a single fetch.
pub trait ConflictResolver<T> {
    /// Reduce the sibling set to at most one value.
    fn resolve(&self, siblings: Vec<T>) -> Result<Option<T>>;
}

/// The fail-fast default: zero or one sibling passes through, more than one
/// is an error rather than an arbitrary pick.
pub struct DefaultResolver;

impl<T> ConflictResolver<T> for DefaultResolver {
    fn resolve(&self, mut siblings: Vec<T>) -> Result<Option<T>> {
        match siblings.len() {
            0 => Ok(None),
            1 => Ok(siblings.pop()),
            n => Err(ClientError::IllegalUsage(format!(
                "fetch returned {n} siblings but no conflict resolver was supplied"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_single_pass_through() {
        assert_eq!(DefaultResolver.resolve(Vec::<i32>::new()).unwrap(), None);
        assert_eq!(DefaultResolver.resolve(vec![42]).unwrap(), Some(42));
    }

    #[test]
    fn siblings_fail_fast() {
        let err = DefaultResolver.resolve(vec![1, 2]).unwrap_err();
        assert!(matches!(err, ClientError::IllegalUsage(_)));
        assert!(err.to_string().contains("2 siblings"));
    }
}
