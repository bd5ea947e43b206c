//! Result type alias for dashclone
//!
//! This module provides a convenient Result type alias that uses
//! `DashcloneError` as the error type.

use super::errors::DashcloneError;

/// Result type alias for dashclone operations
///
/// # Examples
///
/// ```
/// use dashclone::domain::result::Result;
/// use dashclone::domain::errors::DashcloneError;
///
/// fn load_something() -> Result<String> {
///     Ok("loaded".to_string())
/// }
///
/// fn reject_something() -> Result<()> {
///     Err(DashcloneError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, DashcloneError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::CopyError;

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }

    #[test]
    fn test_copy_error_propagates_into_result() {
        fn inner() -> Result<()> {
            Err(CopyError::CyclicDependency { cycle: Vec::new() })?;
            Ok(())
        }

        assert!(matches!(
            inner(),
            Err(DashcloneError::Copy(CopyError::CyclicDependency { .. }))
        ));
    }
}
