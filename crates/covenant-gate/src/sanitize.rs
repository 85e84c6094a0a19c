use covenant_types::Violation;

/// Prepend one warning banner per CRITICAL violation. The original text is
/// kept in full below the banners.
pub fn sanitize(text: &str, violations: &[Violation]) -> String {
    let banners: Vec<String> = violations
        .iter()
        .filter(|v| v.is_critical())
        .map(|v| format!("[COVENANT WARNING: {}] {}", v.kind, v.message))
        .collect();
    if banners.is_empty() {
        return text.to_string();
    }
    format!("{}\n\n{}", banners.join("\n"), text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_types::ViolationKind;

    #[test]
    fn banners_precede_untouched_text() {
        let violations = vec![
            Violation::new(ViolationKind::MissingCitation, "authority claimed without a source"),
            Violation::new(ViolationKind::Hedging, "hedging"),
        ];
        let out = sanitize("The law requires it.", &violations);
        assert_eq!(
            out,
            "[COVENANT WARNING: MISSING_CITATION] authority claimed without a source\n\nThe law requires it."
        );
    }

    #[test]
    fn clean_text_is_unchanged() {
        let out = sanitize("Fine.", &[Violation::new(ViolationKind::Hedging, "maybe")]);
        assert_eq!(out, "Fine.");
    }
}
