use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

/// `FAMLEDGER_QUIET=1` silences informational lines in human mode
pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("FAMLEDGER_QUIET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}
