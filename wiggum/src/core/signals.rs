//! Completion markers and verifier report extraction.
//!
//! Detection is plain substring containment on the trimmed session text. A
//! marker quoted inside code or tool output counts the same as one printed on
//! its own line.

/// Printed by the builder when it believes the task is finished.
pub const BUILDER_DONE: &str = "===WIGGUM_COMPLETE===";
/// Printed by the verifier when every check passes.
pub const VERIFIER_DONE: &str = "===VERIFIER_COMPLETE===";

pub const REPORT_OPEN: &str = "<verifier-report>";
pub const REPORT_CLOSE: &str = "</verifier-report>";

/// True when the builder marker appears anywhere in the trimmed text.
pub fn builder_signaled(text: &str) -> bool {
    text.trim().contains(BUILDER_DONE)
}

/// True when the verifier marker appears anywhere in the trimmed text.
pub fn verifier_signaled(text: &str) -> bool {
    text.trim().contains(VERIFIER_DONE)
}

/// Extract the body of the first `<verifier-report>` block.
///
/// The closing tag is searched for only after the opening tag. Returns `None`
/// when either tag is missing or the block is empty.
pub fn extract_report(text: &str) -> Option<String> {
    let open = text.find(REPORT_OPEN)?;
    let body_start = open + REPORT_OPEN.len();
    let close = text[body_start..].find(REPORT_CLOSE)?;
    if close == 0 {
        return None;
    }
    Some(text[body_start..body_start + close].trim().to_string())
}

/// Report to carry into the next builder prompt.
///
/// Falls back to the full text when no delimited block exists. Blank text
/// yields `None`.
pub fn report_or_full_text(text: &str) -> Option<String> {
    let report = extract_report(text).unwrap_or_else(|| text.to_string());
    let trimmed = report.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_alone_signals_completion() {
        assert!(builder_signaled(BUILDER_DONE));
        assert!(builder_signaled(&format!("\n\n  {BUILDER_DONE}  \n")));
    }

    #[test]
    fn embedded_marker_still_signals_completion() {
        let text = format!("All tests pass.\n{BUILDER_DONE}\nBye");
        assert!(builder_signaled(&text));
        assert!(!verifier_signaled(&text));
    }

    #[test]
    fn markers_are_case_sensitive() {
        assert!(!builder_signaled("===wiggum_complete==="));
        assert!(!verifier_signaled("===Verifier_Complete==="));
    }

    #[test]
    fn extracts_report_between_tags() {
        let text = "preamble <verifier-report>Issue A</verifier-report> trailer";
        assert_eq!(extract_report(text).as_deref(), Some("Issue A"));
    }

    #[test]
    fn report_body_is_trimmed() {
        let text = "<verifier-report>\n  1. tests fail\n</verifier-report>";
        assert_eq!(extract_report(text).as_deref(), Some("1. tests fail"));
    }

    #[test]
    fn open_without_close_yields_none() {
        assert_eq!(extract_report("<verifier-report>Issue A"), None);
    }

    #[test]
    fn close_before_open_is_ignored() {
        let text = "</verifier-report> noise <verifier-report>Issue B</verifier-report>";
        assert_eq!(extract_report(text).as_deref(), Some("Issue B"));
        assert_eq!(extract_report("</verifier-report><verifier-report>"), None);
    }

    #[test]
    fn empty_block_yields_none() {
        assert_eq!(extract_report("<verifier-report></verifier-report>"), None);
    }

    #[test]
    fn missing_tags_fall_back_to_full_text() {
        assert_eq!(
            report_or_full_text("  the build is broken  ").as_deref(),
            Some("the build is broken")
        );
        assert_eq!(report_or_full_text("   "), None);
    }

    #[test]
    fn tagged_report_wins_over_full_text() {
        let text = "chatter\n<verifier-report>Issue A</verifier-report>\nmore chatter";
        assert_eq!(report_or_full_text(text).as_deref(), Some("Issue A"));
    }
}
