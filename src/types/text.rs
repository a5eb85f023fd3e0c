/// Strips `^x` color codes and lower-cases a player name for searching.
#[must_use]
pub fn clean_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars();
    while let Some(c) = chars.next() {
        if c == '^' {
            // A trailing caret has nothing to color and is dropped too.
            chars.next();
            continue;
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Normalizes admin-supplied free text (titles, greetings, personal commands):
/// control characters are removed and trailing whitespace trimmed.
#[must_use]
pub fn sanitize_text(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| !c.is_control()).collect();
    stripped.trim_end().to_string()
}
