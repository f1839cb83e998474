//! Compile-time conversions between event representations.

/// Converts one representation into another.
///
/// Implemented by dedicated mapper structs and by any plain
/// `Fn(From) -> To`, so tests can inject closures.
pub trait Mapper<From, To>: Send + Sync {
    /// Convert `input` into the target representation
    fn map(&self, input: From) -> To;
}

impl<F, A, B> Mapper<A, B> for F
where
    F: Fn(A) -> B + Send + Sync,
{
    fn map(&self, input: A) -> B {
        self(input)
    }
}
