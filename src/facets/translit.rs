// src/facets/translit.rs
// =============================================================================
// Turns Cyrillic facet labels into URL path segments.
//
// Example: "Красный гранит" -> "krasnyy-granit"
//
// Rules:
// - lower-case first
// - Cyrillic letters map to a fixed Latin spelling
// - spaces become dashes
// - , . ( ) " ' are dropped
// - everything else passes through untouched
// =============================================================================

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

fn latin(c: char) -> Option<&'static str> {
    let s = match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'ё' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "sch",
        'ъ' | 'ь' => "",
        'ы' => "y",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        ' ' => "-",
        ',' | '.' | '(' | ')' | '"' | '\'' => "",
        _ => return None,
    };
    Some(s)
}

/// Transliterates a label into a path segment.
pub fn transliterate(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        match latin(c) {
            Some(s) => out.push_str(s),
            None => out.push(c),
        }
    }
    out
}

/// Memoizing transliterator; the same labels show up on every page.
#[derive(Debug, Default)]
pub struct Transliterator {
    memo: RwLock<HashMap<String, String>>,
}

impl Transliterator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translit(&self, text: &str) -> String {
        if let Some(hit) = self
            .memo
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(text)
        {
            return hit.clone();
        }

        let result = transliterate(text);
        self.memo
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(text.to_string(), result.clone());
        result
    }
}
