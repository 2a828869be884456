//! Item-name normalization and counting helpers.

/// Canonical name of the gathered wood item.
pub const LOG: &str = "wood log";
/// Canonical name of the synthetic plank intermediate.
pub const PLANK: &str = "wood plank";
/// Canonical name of the synthetic stick intermediate.
pub const STICK: &str = "stick";

/// Items that are placed in the world and used in place rather than borrowed.
pub const PLACED_ITEMS: [&str; 2] = ["crafting table", "furnace"];

const WOOD_SPECIES: [&str; 10] = [
    "oak", "birch", "spruce", "jungle", "acacia", "dark oak", "mangrove", "cherry", "wood",
    "wooden",
];

/// Normalize an item name: lowercase, `_`/`-` to spaces, collapsed whitespace,
/// the last word singularized, wood species folded into [`LOG`]/[`PLANK`].
///
/// `"Oak_Planks"` → `"wood plank"`, `"iron ingots"` → `"iron ingot"`.
pub fn normalize_item(raw: &str) -> String {
    let lowered = raw.to_lowercase().replace(['_', '-'], " ");
    let mut words: Vec<String> = lowered.split_whitespace().map(str::to_string).collect();
    if let Some(last) = words.last_mut() {
        *last = singularize(last);
    }
    let joined = words.join(" ");
    fold_wood_species(&joined).unwrap_or(joined)
}

fn fold_wood_species(name: &str) -> Option<String> {
    if name == "log" {
        return Some(LOG.to_string());
    }
    if name == "plank" {
        return Some(PLANK.to_string());
    }
    let (species, kind) = name.rsplit_once(' ')?;
    if !WOOD_SPECIES.contains(&species) {
        return None;
    }
    match kind {
        "log" => Some(LOG.to_string()),
        "plank" => Some(PLANK.to_string()),
        _ => None,
    }
}

fn singularize(word: &str) -> String {
    if word.len() <= 3 || word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["ches", "shes", "xes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    match word.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => word.to_string(),
    }
}

/// `"stick"` for 1, `"sticks"` otherwise.
pub fn pluralize(item: &str, quantity: u32) -> String {
    if quantity == 1 {
        return item.to_string();
    }
    let consonant_y = item.strip_suffix('y').is_some_and(|stem| {
        stem.chars()
            .last()
            .is_some_and(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
    });
    if consonant_y {
        format!("{}ies", &item[..item.len() - 1])
    } else if ["ch", "sh", "x", "s"].iter().any(|s| item.ends_with(s)) {
        format!("{item}es")
    } else {
        format!("{item}s")
    }
}

/// `"4 wood planks"`, `"1 crafting table"`.
pub fn quantity_phrase(item: &str, quantity: u32) -> String {
    format!("{quantity} {}", pluralize(item, quantity))
}

/// Round `value` up to the next multiple of `batch`; `None` on overflow.
pub fn ceil_to(value: u32, batch: u32) -> Option<u32> {
    value.div_ceil(batch).checked_mul(batch)
}
