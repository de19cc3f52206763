/// Shortest normalized plate the watchlist accepts.
pub const MIN_PLATE_LEN: usize = 4;

/// Canonical plate form: uppercased, then reduced to `[A-Z0-9]`.
///
/// Dashes, spaces and case never matter when comparing plates, so both the
/// watchlist and the recognition results go through this before comparison.
/// Uppercasing is full Unicode (`ß` becomes `SS`) and happens before the
/// strip.
pub fn normalize(text: &str) -> String {
    text.to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_separators_and_uppercases() {
        assert_eq!(normalize("ab-123-cd"), "AB123CD");
        assert_eq!(normalize("1234 AB 75"), "1234AB75");
        assert_eq!(normalize("  fr.ab 123 cd! "), "FRAB123CD");
    }

    #[test]
    fn uppercases_before_stripping() {
        // ß and the ﬁ ligature expand to ASCII capitals; É stays outside [A-Z].
        assert_eq!(normalize("é-12ß"), "12SS");
        assert_eq!(normalize("ﬁ-42"), "FI42");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn is_idempotent() {
        for raw in ["AB-123-CD", "ab 123 cd", "--", "1234 ab 75", "Zz_9*9.9", "ÉCOLE 42"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn output_alphabet_is_upper_alnum() {
        let out = normalize("a!b@c#1$2%3^ x-y_z ~ 9");
        assert!(out
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_eq!(out, "ABC123XYZ9");
    }
}
