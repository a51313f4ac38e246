//! Identifier normalization helpers shared by the schema model, tokenizer and recognizer.

/// Return the identifier without surrounding quotes/backticks/brackets.
pub fn unquote_identifier(ident: &str) -> &str {
    let trimmed = ident.trim();
    for (open, close) in [('"', '"'), ('`', '`'), ('[', ']')] {
        if let Some(inner) = trimmed.strip_prefix(open).and_then(|s| s.strip_suffix(close)) {
            return inner;
        }
    }
    trimmed
}

/// Normalize an identifier for case-insensitive matching.
pub fn normalize_identifier(ident: &str) -> String {
    unquote_identifier(ident).to_ascii_lowercase()
}

/// Naive English singular form: `categories` -> `category`, `boxes` -> `box`, `orders` -> `order`.
pub fn singularize(word: &str) -> String {
    let w = word.to_ascii_lowercase();
    if w.len() > 3 && w.ends_with("ies") {
        return format!("{}y", &w[..w.len() - 3]);
    }
    for suffix in ["sses", "xes", "ches", "shes", "zes"] {
        if w.len() > suffix.len() && w.ends_with(suffix) {
            return w[..w.len() - 2].to_string();
        }
    }
    if w.len() > 2 && w.ends_with('s') && !w.ends_with("ss") && !w.ends_with("us") {
        return w[..w.len() - 1].to_string();
    }
    w
}

/// Naive English plural form: `category` -> `categories`, `box` -> `boxes`, `order` -> `orders`.
pub fn pluralize(word: &str) -> String {
    let w = word.to_ascii_lowercase();
    if w.ends_with('y') && w.len() > 1 {
        let before = w.as_bytes()[w.len() - 2] as char;
        if !"aeiou".contains(before) {
            return format!("{}ies", &w[..w.len() - 1]);
        }
    }
    if w.ends_with('s') || w.ends_with('x') || w.ends_with("ch") || w.ends_with("sh") || w.ends_with('z') {
        return format!("{}es", w);
    }
    format!("{}s", w)
}

/// `unitPrice` -> `unit_price`
pub fn camel_to_snake(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    let mut prev_lower = false;
    for ch in ident.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            out.push(ch);
        }
    }
    out
}

/// `unit_price` / `unitPrice` -> `unit price`
pub fn to_words(ident: &str) -> String {
    camel_to_snake(ident)
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `unit price` -> `unit_price`
pub fn words_to_snake(words: &str) -> String {
    words
        .split_whitespace()
        .map(|w| w.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Every surface form a schema name may take in free text: the name itself, its
/// spaced form, and singular/plural variants of the last word.
pub fn surface_forms(name: &str) -> Vec<String> {
    let base = normalize_identifier(name);
    let words = to_words(&base);
    let mut forms = vec![base.clone()];

    let mut push = |form: String| {
        if !form.is_empty() && !forms.contains(&form) {
            forms.push(form);
        }
    };

    push(camel_to_snake(&base));
    push(words.clone());

    let parts: Vec<&str> = words.split(' ').collect();
    if let Some((last, head)) = parts.split_last() {
        let prefix = head.join(" ");
        for variant in [singularize(last), pluralize(last)] {
            let spaced = if prefix.is_empty() {
                variant.clone()
            } else {
                format!("{} {}", prefix, variant)
            };
            push(words_to_snake(&spaced));
            push(spaced);
        }
    }
    forms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singular_plural() {
        assert_eq!(singularize("orders"), "order");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("address"), "address");
        assert_eq!(pluralize("customer"), "customers");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
    }

    #[test]
    fn test_case_and_word_forms() {
        assert_eq!(camel_to_snake("unitPrice"), "unit_price");
        assert_eq!(to_words("order_items"), "order items");
        assert_eq!(words_to_snake("Unit Price"), "unit_price");
        assert_eq!(normalize_identifier("\"Orders\""), "orders");
    }

    #[test]
    fn test_surface_forms_cover_spaced_and_singular() {
        let forms = surface_forms("order_items");
        assert!(forms.contains(&"order_items".to_string()));
        assert!(forms.contains(&"order items".to_string()));
        assert!(forms.contains(&"order item".to_string()));
        assert!(forms.contains(&"order_item".to_string()));
    }
}
