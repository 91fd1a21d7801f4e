use crate::domain::{BookDetail, Verse};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayMode {
    #[default]
    Paragraph,
    VerseByVerse,
}

/// What the reader currently shows.
#[derive(Debug, Clone, Default)]
pub struct ReaderState {
    pub selected_book: Option<BookDetail>,
    pub selected_chapter: Option<u32>,
    pub display_mode: DisplayMode,
    pub version_code: Option<String>,
}

impl ReaderState {
    pub fn new(version_code: &str) -> Self {
        Self {
            version_code: Some(version_code.to_string()),
            ..Self::default()
        }
    }

    /// Switching books clears the chapter.
    pub fn select_book(&mut self, book: BookDetail) {
        if self.selected_book.as_ref().map(|b| b.id) != Some(book.id) {
            self.selected_chapter = None;
        }
        self.selected_book = Some(book);
    }

    pub fn select_chapter(&mut self, chapter: u32) {
        self.selected_chapter = Some(chapter);
    }

    pub fn toggle_display_mode(&mut self) {
        self.display_mode = match self.display_mode {
            DisplayMode::Paragraph => DisplayMode::VerseByVerse,
            DisplayMode::VerseByVerse => DisplayMode::Paragraph,
        };
    }

    pub fn current_reference(&self) -> String {
        match (&self.selected_book, self.selected_chapter) {
            (Some(book), Some(chapter)) => format!("{} {}", book.title, chapter),
            _ => "Select Book and Chapter".to_string(),
        }
    }

    /// Render verses in the current mode. `refs` returns the Catechism
    /// paragraphs cited for a verse id.
    pub fn render<'a, F>(&self, verses: &[Verse], refs: F) -> String
    where
        F: Fn(i64) -> Option<&'a [i64]>,
    {
        match self.display_mode {
            DisplayMode::Paragraph => {
                let text = verses
                    .iter()
                    .map(|v| v.content.trim())
                    .collect::<Vec<_>>()
                    .join(" ");
                let cited: Vec<String> = verses
                    .iter()
                    .filter_map(|v| refs(v.id).map(|nums| (v.verse_number, nums)))
                    .map(|(n, nums)| format!("  v{}: CCC {}", n, join_nums(nums)))
                    .collect();
                if cited.is_empty() {
                    text
                } else {
                    format!("{}\n\n{}", text, cited.join("\n"))
                }
            }
            DisplayMode::VerseByVerse => verses
                .iter()
                .map(|v| match refs(v.id) {
                    Some(nums) => format!("{}  [CCC {}]", v.display_line(), join_nums(nums)),
                    None => v.display_line(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

fn join_nums(nums: &[i64]) -> String {
    nums.iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn genesis() -> BookDetail {
        BookDetail {
            id: 1,
            title: "Genèse".into(),
            label: "gen".into(),
        }
    }

    fn verse(id: i64, number: u32, content: &str) -> Verse {
        Verse {
            id,
            book_label: "gen".into(),
            version_code: "CRAMPON".into(),
            chapter_number: 1,
            verse_number: number,
            sort_key: id,
            path: String::new(),
            content: content.into(),
        }
    }

    #[test]
    fn test_reference_placeholder() {
        let mut state = ReaderState::new("CRAMPON");
        assert_eq!(state.current_reference(), "Select Book and Chapter");

        state.select_book(genesis());
        assert_eq!(state.current_reference(), "Select Book and Chapter");

        state.select_chapter(3);
        assert_eq!(state.current_reference(), "Genèse 3");
    }

    #[test]
    fn test_changing_book_clears_chapter() {
        let mut state = ReaderState::default();
        state.select_book(genesis());
        state.select_chapter(2);
        state.select_book(genesis());
        assert_eq!(state.selected_chapter, Some(2));

        state.select_book(BookDetail {
            id: 2,
            title: "Exode".into(),
            label: "ex".into(),
        });
        assert_eq!(state.selected_chapter, None);
    }

    #[test]
    fn test_toggle_display_mode() {
        let mut state = ReaderState::default();
        assert_eq!(state.display_mode, DisplayMode::Paragraph);
        state.toggle_display_mode();
        assert_eq!(state.display_mode, DisplayMode::VerseByVerse);
        state.toggle_display_mode();
        assert_eq!(state.display_mode, DisplayMode::Paragraph);
    }

    #[test]
    fn test_render_modes() {
        let verses = vec![
            verse(101, 1, "Au commencement,"),
            verse(102, 2, "la terre était informe."),
        ];
        let links: HashMap<i64, Vec<i64>> = HashMap::from([(101, vec![279, 290])]);
        let refs = |id: i64| links.get(&id).map(Vec::as_slice);

        let mut state = ReaderState::default();
        assert_eq!(
            state.render(&verses, refs),
            "Au commencement, la terre était informe.\n\n  v1: CCC 279, 290"
        );

        state.toggle_display_mode();
        assert_eq!(
            state.render(&verses, refs),
            "  1  Au commencement,  [CCC 279, 290]\n  2  la terre était informe."
        );
    }
}
