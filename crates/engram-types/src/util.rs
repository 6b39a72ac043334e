/// Clip a string to at most `max_chars` characters on a char boundary.
///
/// Returns the input unchanged (as an owned string) when it already fits.
pub fn clip_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_shorter_input_unchanged() {
        assert_eq!(clip_chars("hello", 10), "hello");
    }

    #[test]
    fn test_clip_exact_boundary() {
        assert_eq!(clip_chars("hello", 5), "hello");
    }

    #[test]
    fn test_clip_long_input() {
        assert_eq!(clip_chars("hello world", 5), "hello");
    }

    #[test]
    fn test_clip_multibyte_safe() {
        let s = "héllo wörld";
        let clipped = clip_chars(s, 6);
        assert_eq!(clipped.chars().count(), 6);
    }
}
