pub mod book;
pub mod testament;
pub mod text;

pub use book::{normalize_label, BookDetail, BookSummary};
pub use testament::{GenreDetail, GenreTranslation, Language, TestamentDetail, TestamentTranslation};
pub use text::{CatechismLinks, Verse, Version};
