/// Whether contract violations are detected and reported as panics.
///
/// This is on in any build with `debug_assertions` and in any build with the `checked` feature.
/// In other builds the slab-level preconditions are not checked and violating them is
/// undefined behavior.
pub(crate) const VALIDATED: bool = cfg!(any(debug_assertions, feature = "checked"));

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    #[cfg(debug_assertions)]
    fn debug_builds_are_validated() {
        assert!(VALIDATED);
    }
}
