//! Error handling foundation for parley.
//!
//! Only the `Result` alias lives here. Each crate defines its own
//! domain-specific error enums in its own `error` module and reports them
//! through rootcause as they cross async boundaries.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    fn fails() -> Result<i32, Boom> {
        Err(Boom.into())
    }

    #[test]
    fn result_alias_carries_report() {
        let ok: Result<i32, Boom> = Ok(42);
        assert_eq!(ok.expect("should be ok"), 42);
        let err = fails().unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
