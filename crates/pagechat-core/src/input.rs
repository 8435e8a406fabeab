/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text input with a character-indexed cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputField {
    value: String,
    cursor: usize,
}

impl InputField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.value.chars().count()
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.char_count() {
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.char_count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.char_count();
    }

    pub fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    pub fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.cursor = self.char_count();
    }

    /// Characters visible in a box `width` wide, scrolled so the cursor stays
    /// in view. Returns the visible text and the cursor column inside it.
    pub fn visible(&self, width: usize) -> (String, usize) {
        let scroll_offset = if width == 0 {
            0
        } else if self.cursor >= width {
            self.cursor - width + 1
        } else {
            0
        };

        let text = self.value.chars().skip(scroll_offset).take(width).collect();
        (text, self.cursor - scroll_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(s: &str) -> InputField {
        let mut input = InputField::new();
        s.chars().for_each(|c| input.insert(c));
        input
    }

    #[test]
    fn test_insert_in_middle() {
        let mut input = typed("hllo");
        input.home();
        input.move_right();
        input.insert('e');
        assert_eq!(input.value(), "hello");
        assert_eq!(input.cursor(), 2);
    }

    #[test]
    fn test_edits_are_utf8_safe() {
        let mut input = typed("añb🦀");
        input.move_left();
        input.backspace();
        assert_eq!(input.value(), "añ🦀");
        input.home();
        input.delete();
        assert_eq!(input.value(), "ñ🦀");
        input.end();
        assert_eq!(input.cursor(), 2);
    }

    #[test]
    fn test_backspace_at_start_and_delete_at_end_are_noops() {
        let mut input = typed("ab");
        input.delete();
        input.home();
        input.backspace();
        assert_eq!(input.value(), "ab");
    }

    #[test]
    fn test_clear_resets_cursor() {
        let mut input = typed("abc");
        input.clear();
        assert!(input.is_empty());
        assert_eq!(input.cursor(), 0);
    }

    #[test]
    fn test_visible_scrolls_with_cursor() {
        let input = typed("abcdefgh");
        let (text, cursor) = input.visible(4);
        assert_eq!(text, "fgh");
        assert_eq!(cursor, 3);

        let (text, cursor) = typed("ab").visible(4);
        assert_eq!(text, "ab");
        assert_eq!(cursor, 2);
    }
}
