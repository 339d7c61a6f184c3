//! Filename sanitization for strings derived from uncontrolled data.
//!
//! Tab titles, URLs, and extension names become directory entries, so they
//! must be legal single path segments on every platform the mountpoint can
//! live on. The rules match the original sanitizer the host-side tooling
//! expects: illegal and control characters become `_`, dot-names and
//! Windows reserved stems are defused, trailing dots and spaces are
//! trimmed, and the result is capped at 200 characters.

const MAX_LEN: usize = 200;

const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn is_illegal(ch: char) -> bool {
    matches!(ch, '/' | '\\' | '?' | '*' | '<' | '>' | ':' | '|' | '"' | ' ')
        || ch.is_control()
        || ('\u{80}'..='\u{9f}').contains(&ch)
}

/// Sanitize one path segment.
pub fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|ch| if is_illegal(ch) { '_' } else { ch })
        .collect();

    // A name that is nothing but dots (including the empty name) can never
    // be a directory entry.
    if out.chars().all(|c| c == '.') {
        return "_".to_string();
    }

    let stem = out.split('.').next().unwrap_or_default();
    if WINDOWS_RESERVED.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
        out.push('_');
    }

    let trimmed = out.trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        return "_".to_string();
    }

    trimmed.chars().take(MAX_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_characters_become_underscores() {
        assert_eq!(sanitize("a/b\\c?d*e<f>g:h|i\"j k"), "a_b_c_d_e_f_g_h_i_j_k");
    }

    #[test]
    fn test_control_characters_become_underscores() {
        assert_eq!(sanitize("a\x07b\x1fc\u{85}d"), "a_b_c_d");
    }

    #[test]
    fn test_dot_names_are_defused() {
        assert_eq!(sanitize("."), "_");
        assert_eq!(sanitize(".."), "_");
        assert_eq!(sanitize(""), "_");
    }

    #[test]
    fn test_windows_reserved_names_get_suffix() {
        assert_eq!(sanitize("con"), "con_");
        assert_eq!(sanitize("COM1"), "COM1_");
        assert_eq!(sanitize("nul.txt"), "nul.txt_");
        assert_eq!(sanitize("console"), "console");
    }

    #[test]
    fn test_trailing_dots_trimmed() {
        assert_eq!(sanitize("name.."), "name");
        assert_eq!(sanitize("trailing."), "trailing");
    }

    #[test]
    fn test_truncated_to_200_chars() {
        let long = "x".repeat(500);
        assert_eq!(sanitize(&long).len(), 200);
    }

    #[test]
    fn test_typical_url() {
        assert_eq!(
            sanitize("https://example.com/page?q=1"),
            "https___example.com_page_q=1"
        );
    }
}
