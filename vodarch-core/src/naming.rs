use crate::segment::TITLE_DELIMITER;

/// Title and description for one uploaded piece.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputName {
    pub title: String,
    pub description: String,
}

/// The category a recording files under: the explicit field when present,
/// otherwise the token before the first `" | "` in the title, otherwise the
/// whole title.
pub fn derive_category(title: &str, category: &str) -> String {
    if !category.trim().is_empty() {
        return category.trim().to_string();
    }
    title
        .split_once(TITLE_DELIMITER)
        .map(|(head, _)| head)
        .unwrap_or(title)
        .trim()
        .to_string()
}

/// Naming for one time-based segment of a split recording.
pub fn segmented_output(original_title: &str, part_number: u32) -> OutputName {
    OutputName {
        title: format!("{original_title} - Part {part_number}"),
        description: format!(
            "Segment {part_number} of recording: {original_title}. Exported automatically."
        ),
    }
}

/// Naming for a whole continuous-series recording. The part number is
/// spliced after the category token so the series reads
/// "Category 7 | rest"; a title without the delimiter is kept as-is.
pub fn continuous_output(original_title: &str, part_number: u32) -> OutputName {
    let title = match original_title.split_once(TITLE_DELIMITER) {
        Some((head, rest)) => format!("{} {part_number}{TITLE_DELIMITER}{rest}", head.trim_end()),
        None => original_title.to_string(),
    };
    OutputName {
        title,
        description: format!("Full recording: {original_title}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_category_preferred() {
        assert_eq!(derive_category("Chess | blitz arena", "Just Chatting"), "Just Chatting");
    }

    #[test]
    fn category_from_title_prefix() {
        assert_eq!(derive_category("Chess | blitz arena", ""), "Chess");
    }

    #[test]
    fn missing_delimiter_uses_whole_title() {
        assert_eq!(derive_category("StreamHighlights", ""), "StreamHighlights");
    }

    #[test]
    fn segment_naming() {
        let name = segmented_output("Chess | blitz arena", 4);
        assert_eq!(name.title, "Chess | blitz arena - Part 4");
        assert_eq!(
            name.description,
            "Segment 4 of recording: Chess | blitz arena. Exported automatically."
        );
    }

    #[test]
    fn continuous_naming_splices_part_after_category() {
        let name = continuous_output("Just Chatting | morning show", 12);
        assert_eq!(name.title, "Just Chatting 12 | morning show");
        assert_eq!(name.description, "Full recording: Just Chatting | morning show");
    }

    #[test]
    fn continuous_naming_without_delimiter_keeps_title() {
        let name = continuous_output("StreamHighlights", 3);
        assert_eq!(name.title, "StreamHighlights");
    }
}
