use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    #[serde(rename = "lang_id")]
    pub id: i64,
    #[serde(rename = "lang")]
    pub name: String,
}

/// A testament's name and slug in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestamentTranslation {
    pub testament_id: i64,
    pub lang_id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestamentDetail {
    #[serde(rename = "testament_id")]
    pub id: i64,
    pub name: String,
}

/// A book genre (law, prophets, gospels, ...) in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreTranslation {
    pub genre_id: i64,
    #[serde(default)]
    pub lang_id: Option<i64>,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreDetail {
    #[serde(rename = "genre_id")]
    pub id: i64,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_language_from_row() {
        let lang: Language =
            serde_json::from_value(json!({"lang_id": 2, "lang": "English"})).unwrap();
        assert_eq!(lang.id, 2);
        assert_eq!(lang.name, "English");
    }

    #[test]
    fn test_genre_without_lang_column() {
        let genre: GenreTranslation =
            serde_json::from_value(json!({"genre_id": 4, "name": "Gospels", "slug": "gospels"}))
                .unwrap();
        assert_eq!(genre.lang_id, None);
        assert_eq!(genre.slug, "gospels");
    }
}
