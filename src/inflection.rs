//! Name derivation for entities: table names (usually plural) to singular
//! registry keys and back. Kept as pure string transforms so the edge cases
//! are enumerable in one place and never leak into entity building.

/// Irregular plural/singular pairs checked before the suffix rules.
const IRREGULAR: &[(&str, &str)] = &[
    ("people", "person"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
    ("feet", "foot"),
    ("teeth", "tooth"),
    ("geese", "goose"),
    ("mice", "mouse"),
];

/// Words with identical singular and plural forms.
const UNINFLECTED: &[&str] = &["series", "species", "sheep", "fish", "deer", "news", "media"];

/// Derive the singular form of a table name.
/// e.g. "pages" -> "page", "categories" -> "category", "boxes" -> "box"
pub fn singularize(name: &str) -> String {
    let lower = name.to_lowercase();
    if UNINFLECTED.contains(&lower.as_str()) {
        return name.to_string();
    }
    for (plural, singular) in IRREGULAR {
        if lower == *plural {
            return (*singular).to_string();
        }
        if let Some(prefix) = lower.strip_suffix(plural) {
            if !prefix.is_empty() {
                return format!("{}{}", &name[..prefix.len()], singular);
            }
        }
    }
    if let Some(stem) = name.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{}y", stem);
        }
    }
    for suffix in ["xes", "ses", "zes", "ches", "shes"] {
        if let Some(stem) = name.strip_suffix(suffix) {
            if !stem.is_empty() {
                // drop only the trailing "es"
                return name[..name.len() - 2].to_string();
            }
        }
    }
    if let Some(stem) = name.strip_suffix("ves") {
        if !stem.is_empty() {
            // wives -> wife, leaves -> leaf; "fe" restores the common case
            return format!("{}fe", stem);
        }
    }
    if lower.ends_with("us") || lower.ends_with("ss") {
        return name.to_string();
    }
    if let Some(stem) = name.strip_suffix('s') {
        if !stem.is_empty() && !stem.ends_with('s') {
            return stem.to_string();
        }
    }
    name.to_string()
}

/// Derive the plural form of a singular entity name.
/// e.g. "page" -> "pages", "category" -> "categories", "box" -> "boxes"
pub fn pluralize(name: &str) -> String {
    let lower = name.to_lowercase();
    if UNINFLECTED.contains(&lower.as_str()) {
        return name.to_string();
    }
    for (plural, singular) in IRREGULAR {
        if lower == *singular {
            return (*plural).to_string();
        }
    }
    if let Some(stem) = name.strip_suffix('y') {
        if !stem.is_empty() && !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{}ies", stem);
        }
    }
    if lower.ends_with(['x', 's', 'z']) || lower.ends_with("ch") || lower.ends_with("sh") {
        return format!("{}es", name);
    }
    if let Some(stem) = name.strip_suffix("fe") {
        return format!("{}ves", stem);
    }
    format!("{}s", name)
}
