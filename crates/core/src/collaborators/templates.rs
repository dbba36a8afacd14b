//! Naming helpers and small code templates shared by the scaffold
//! generators.

/// Split a free-form name into lowercase words
fn words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;

    for ch in name.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        // camelCase boundary
        if ch.is_uppercase() && previous_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        previous_lower = ch.is_lowercase() || ch.is_numeric();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// `Purchase order` -> `PurchaseOrder`
pub fn pascal_case(name: &str) -> String {
    let pascal: String = words(name)
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    if pascal.is_empty() {
        "Untitled".to_string()
    } else if pascal.starts_with(|c: char| c.is_ascii_digit()) {
        format!("N{}", pascal)
    } else {
        pascal
    }
}

/// `Purchase order` -> `purchase_order`
pub fn snake_case(name: &str) -> String {
    let snake = words(name).join("_");
    if snake.is_empty() {
        "untitled".to_string()
    } else {
        snake
    }
}

/// `Purchase order` -> `purchase-order`
pub fn kebab_case(name: &str) -> String {
    let kebab = words(name).join("-");
    if kebab.is_empty() {
        "untitled".to_string()
    } else {
        kebab
    }
}

/// `Purchase order` -> `purchaseOrder`
pub fn camel_case(name: &str) -> String {
    let pascal = pascal_case(name);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => pascal,
    }
}

/// First non-empty line of the requirement text, used as a title
pub fn title_from_text(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("Generated Application");
    let title: String = line.chars().take(80).collect();
    title.trim_end_matches('.').to_string()
}

/// Pretty JSON for an artifact body
pub fn to_json<T: serde::Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
