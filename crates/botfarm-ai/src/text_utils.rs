//! Shared text utility functions.

/// Find the largest byte index <= `index` that is a valid char boundary.
pub fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Cut `s` to at most `max_bytes`, marking the cut, for log previews.
pub fn preview(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let cut = floor_char_boundary(s, max_bytes);
    format!("{}…", &s[..cut])
}

/// Collapse a multi-line summary onto one prompt line.
pub fn single_line(s: &str) -> String {
    s.replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii() {
        let s = "hello world";
        assert_eq!(floor_char_boundary(s, 5), 5);
    }

    #[test]
    fn test_multibyte() {
        let s = "你好世界";
        assert_eq!(floor_char_boundary(s, 1), 0);
        assert_eq!(floor_char_boundary(s, 4), 3);
    }

    #[test]
    fn test_preview_marks_cut() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("你好世界", 4), "你…");
    }

    #[test]
    fn test_single_line() {
        assert_eq!(single_line("Bob waved\nhello"), "Bob waved hello");
    }
}
