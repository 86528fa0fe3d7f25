//! Canonical short names for functions

/// Shorten a qualified function name to its canonical short form.
///
/// `Host.Functions.ProcessOrder` becomes `ProcessOrder`. A name without a
/// qualifying prefix is returned unchanged, so applying this twice gives the
/// same result as applying it once.
pub fn short_name(function_name: &str) -> &str {
    match function_name.rfind('.') {
        Some(idx) if idx > 0 => &function_name[idx + 1..],
        _ => function_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: &[&str] = &[
        "Host.Functions.ProcessOrder",
        "Functions.Timer",
        "Timer",
        "",
        ".Hidden",
        "Trailing.",
        "a..b",
        "Nested.Type+Inner.Run",
    ];

    #[test]
    fn test_qualified_name_is_shortened() {
        assert_eq!(short_name("Host.Functions.ProcessOrder"), "ProcessOrder");
        assert_eq!(short_name("Functions.Timer"), "Timer");
        assert_eq!(short_name("a..b"), "b");
    }

    #[test]
    fn test_short_name_is_unchanged() {
        assert_eq!(short_name("Timer"), "Timer");
        assert_eq!(short_name(""), "");
    }

    #[test]
    fn test_leading_dot_is_kept() {
        assert_eq!(short_name(".Hidden"), ".Hidden");
    }

    #[test]
    fn test_trailing_dot_yields_empty_name() {
        assert_eq!(short_name("Trailing."), "");
    }

    #[test]
    fn test_shortening_is_idempotent() {
        for name in NAMES {
            let once = short_name(name);
            assert_eq!(short_name(once), once, "not idempotent for {:?}", name);
        }
    }
}
