//! List command handler

use std::fmt::Write as _;
use webapi_tests::CASE_NAMES;

/// Case names, one per line
#[must_use]
pub fn render_case_list() -> String {
    CASE_NAMES.iter().fold(String::new(), |mut out, name| {
        let _ = writeln!(out, "{name}");
        out
    })
}

/// Print the case names
pub fn execute_list() {
    print!("{}", render_case_list());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_every_case() {
        let text = render_case_list();
        assert_eq!(text.lines().count(), CASE_NAMES.len());
        assert!(text.lines().any(|l| l == "notification_simple"));
    }
}
