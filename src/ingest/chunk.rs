/// Split `text` into word chunks of at most `width` characters.
///
/// Every whitespace character becomes one space and runs between words are
/// kept as they are. Whitespace at the start or end of a chunk is dropped. A
/// single word longer than `width` is kept whole as its own chunk.
pub fn chunk_text(text: &str, width: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;
    // Whitespace characters seen since the previous word.
    let mut gap = 0usize;

    for piece in text.split(char::is_whitespace) {
        if piece.is_empty() {
            gap += 1;
            continue;
        }

        let word_chars = piece.chars().count();
        if current_chars > 0 && current_chars + gap + word_chars > width {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if current_chars > 0 {
            current.extend(std::iter::repeat(' ').take(gap));
            current_chars += gap;
        }
        current.push_str(piece);
        current_chars += word_chars;
        // The separator that ended this piece, if another piece follows.
        gap = 1;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packs_words_up_to_width() {
        let chunks = chunk_text("one two three four five", 9);
        assert_eq!(chunks, vec!["one two", "three", "four five"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 9));
    }

    #[test]
    fn test_keeps_inner_whitespace_and_skips_blank() {
        assert_eq!(chunk_text("  a\n\n b\tc  ", 100), vec!["a   b c"]);
        assert!(chunk_text(" \n\t ", 100).is_empty());
    }

    #[test]
    fn test_whitespace_counts_toward_width() {
        // "ab    cd" would be 8 characters.
        assert_eq!(chunk_text("ab    cd", 7), vec!["ab", "cd"]);
        assert_eq!(chunk_text("ab    cd", 8), vec!["ab    cd"]);
    }

    #[test]
    fn test_long_word_kept_whole() {
        let long = "x".repeat(12);
        assert_eq!(chunk_text(&format!("ab {long} cd"), 5), vec!["ab".to_string(), long, "cd".to_string()]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let chunks = chunk_text("été été", 7);
        assert_eq!(chunks, vec!["été été"]);
    }
}
