//! Header lookup shared by the spreadsheet and delimited-text parsers.

use std::collections::HashMap;

/// Case- and accent-insensitive header name -> column index.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    index: HashMap<String, usize>,
}

impl HeaderMap {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = HashMap::new();
        for (idx, name) in names.into_iter().enumerate() {
            // First occurrence wins on a repeated header.
            index.entry(normalize_header_name(name)).or_insert(idx);
        }
        Self { index }
    }

    /// Index of the first alias present.
    pub fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases
            .iter()
            .find_map(|a| self.index.get(&normalize_header_name(a)).copied())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&normalize_header_name(name))
    }
}

pub fn normalize_header_name(name: &str) -> String {
    // Excel and other tools sometimes emit UTF-8 CSVs with a BOM prefix on the
    // first header. If we don't strip it, the first column is never found.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_lowercase().chars().map(fold_accent).collect()
}

/// Spanish diacritics on lowercase letters; `ñ` is kept.
fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        other => other,
    }
}
