//! Error taxonomy for contract operations.
//!
//! Only a small set of operations can fail in a well-defined way; everything
//! else is governed by documented preconditions, whose violation panics (see
//! the `# Panics` sections on the individual operations). Drivers should
//! treat every variant except [`ContractError::NumericDivergence`] as a
//! programming error; divergence of the reference-coordinate inversion is a
//! legitimate runtime outcome for points outside a cell's image and must be
//! handled, not crashed on.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// An entity dimension, entity index, sub-element index or subdomain id
    /// was outside its valid range.
    #[error("{what} index {index} out of range (valid range 0..{bound})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        bound: usize,
    },
    /// A caller-supplied buffer does not match the size implied by the
    /// component's declared dimensions.
    #[error("{what} has length {actual}, expected {expected}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Reference-coordinate inversion failed to converge within the bounded
    /// iteration budget.
    #[error("reference coordinate inversion did not converge after {iterations} iterations")]
    NumericDivergence { iterations: usize },
    /// An optional capability is not implemented by this component, e.g.
    /// reference dof coordinates for an element without point-evaluation
    /// dofs.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}

/// Checks that a caller buffer has exactly the expected length.
pub(crate) fn check_buffer_len(
    what: &'static str,
    actual: usize,
    expected: usize,
) -> Result<(), ContractError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ContractError::SizeMismatch {
            what,
            expected,
            actual,
        })
    }
}
