use tracing::debug;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Folds a server or episode label into the token used in playback addresses.
///
/// Lowercases, strips diacritics (including `đ`), and collapses every run of
/// whitespace or punctuation into a single `-`. Leading and trailing dashes are
/// trimmed. The mapping is lossy, so a token can only be matched against live
/// labels, never turned back into one.
pub fn normalize(label: &str) -> String {
    let folded: String = label
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c == 'đ' { 'd' } else { c })
        .collect();

    let mut result = String::with_capacity(folded.len());
    let mut prev_dash = true;
    for c in folded.chars() {
        if c.is_alphanumeric() {
            result.push(c);
            prev_dash = false;
        } else if !prev_dash {
            result.push('-');
            prev_dash = true;
        }
    }
    result.trim_matches('-').to_string()
}

/// Address tokens for a list of sibling labels, one per label.
///
/// A label whose normalized form is already taken by an earlier sibling gets
/// the first free `-2`, `-3`, ... suffix, so every position stays addressable.
/// Suffixed tokens are themselves normalized.
pub fn unique_tokens<'a>(labels: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for label in labels {
        let base = normalize(label);
        let mut token = base.clone();
        let mut n = 2;
        while tokens.contains(&token) {
            token = if base.is_empty() {
                n.to_string()
            } else {
                format!("{}-{}", base, n)
            };
            n += 1;
        }
        if token != base {
            debug!(label, token = %token, "label collides with an earlier sibling");
        }
        tokens.push(token);
    }
    tokens
}

/// Index of the sibling whose token equals `token`.
pub fn position_of<'a>(labels: impl IntoIterator<Item = &'a str>, token: &str) -> Option<usize> {
    unique_tokens(labels).iter().position(|t| t == token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_vietnamese_episode_labels() {
        assert_eq!(normalize("Tập 01"), "tap-01");
        assert_eq!(normalize("Đặc Biệt"), "dac-biet");
        assert_eq!(normalize("#Hà Nội (Vietsub)"), "ha-noi-vietsub");
    }

    #[test]
    fn collapses_punctuation_and_whitespace() {
        assert_eq!(normalize("  Full  HD -- 1080p "), "full-hd-1080p");
        assert_eq!(normalize("S1"), "s1");
        assert_eq!(normalize("---"), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "Tập 01",
            "Vietsub #1",
            "ĐẶC BIỆT (Thuyết Minh)",
            "İstanbul",
            "ǅemal",
            "Ẩn Danh – Phần 2",
            "  ",
            "",
            "한국어 자막",
            "Full",
            "a.b.c",
            "Ωmega ß",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn position_of_compares_against_token() {
        assert_eq!(position_of(["Tập 01", "Tập 02"], "tap-02"), Some(1));
        assert_eq!(position_of(["Tập 01", "Tập 02"], "tap-2"), None);
    }

    #[test]
    fn colliding_labels_get_distinct_tokens() {
        let tokens = unique_tokens(["Tập 01", "Tap 01", "tap-01-2", "TẬP 01"]);
        assert_eq!(tokens, vec!["tap-01", "tap-01-2", "tap-01-2-2", "tap-01-3"]);
        for token in &tokens {
            assert_eq!(&normalize(token), token);
        }
    }

    #[test]
    fn unique_labels_keep_plain_tokens() {
        assert_eq!(unique_tokens(["S1", "S2"]), vec!["s1", "s2"]);
        assert_eq!(unique_tokens(["", "---"]), vec!["", "2"]);
    }
}
