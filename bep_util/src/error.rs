/// Result type for GenericError types.
pub type GenericResult<T> = Result<T, GenericError>;

/// Enumerates a set of generic errors for data validation.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum GenericError {
    /// An Invalid Length Was Given
    ///
    /// Expected (length) provided
    InvalidLength(usize),
    /// An Invalid Character Was Found
    ///
    /// Expected (index) provided
    InvalidCharacter(usize),
    /// A Check Character Did Not Match
    ///
    /// Expected (group index) provided
    InvalidCheckCharacter(usize),
}
