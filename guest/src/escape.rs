//! Backslash escaping for delimiter-separated wire values.
//!
//! The runtime-flags file is newline-delimited and argument vectors inside
//! it are space-delimited, so values carry their delimiter escaped with a
//! backslash. Only the delimiter byte is ever escaped; backslashes
//! themselves travel verbatim.

/// Escape every occurrence of `delimiter` in `value` with a backslash.
pub fn encode(value: &str, delimiter: u8) -> String {
    let delim = delimiter as char;
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == delim {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Split `text` on every unescaped `delimiter` and unescape the segments.
///
/// A delimiter is unescaped when it is not immediately preceded by a
/// backslash. The trailing segment is yielded even without a terminating
/// delimiter, so the result is never empty. `delimiter` must be ASCII.
pub fn decode(text: &str, delimiter: u8) -> Vec<String> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate() {
        if b == delimiter && !escaped {
            segments.push(unescape(&text[start..i], delimiter));
            start = i + 1;
        }
        escaped = b == b'\\';
    }

    segments.push(unescape(&text[start..], delimiter));
    segments
}

fn unescape(segment: &str, delimiter: u8) -> String {
    let delim = delimiter as char;
    segment.replace(&format!("\\{delim}"), &delim.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &str, delimiter: u8) {
        let encoded = encode(value, delimiter);
        assert_eq!(
            decode(&encoded, delimiter),
            vec![value.to_string()],
            "value {value:?} did not survive the round trip"
        );
    }

    #[test]
    fn test_round_trip() {
        for value in ["", "plain", "two words", "a\nb\nc", "back\\slash", "trailing\\"] {
            round_trip(value, b' ');
            round_trip(value, b'\n');
        }
    }

    #[test]
    fn test_round_trip_backslash_before_delimiter() {
        // The escaped delimiter lands right after a literal backslash.
        round_trip("a\\ b", b' ');
        round_trip("a\\\nb", b'\n');
        round_trip("\\", b' ');
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode("a b", b' '), "a\\ b");
        assert_eq!(encode("a\nb", b'\n'), "a\\\nb");
        assert_eq!(encode("nothing", b' '), "nothing");
    }

    #[test]
    fn test_decode_splits_on_unescaped_delimiter() {
        assert_eq!(decode("a b c", b' '), vec!["a", "b", "c"]);
        assert_eq!(decode("a\\ b c", b' '), vec!["a b", "c"]);
        assert_eq!(decode("one", b' '), vec!["one"]);
    }

    #[test]
    fn test_decode_edge_segments() {
        assert_eq!(decode("", b' '), vec![""]);
        assert_eq!(decode("a ", b' '), vec!["a", ""]);
        assert_eq!(decode(" a", b' '), vec!["", "a"]);
    }
}
