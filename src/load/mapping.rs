use crate::utils::non_null;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Numeric,
}

/// Filtered-CSV column → `Product` column.
pub const FIELD_MAP: &[(&str, &str, FieldKind)] = &[
    ("product_name", "name", FieldKind::Text),
    ("brands", "brand", FieldKind::Text),
    ("categories", "categories", FieldKind::Text),
    ("quantity", "quantity", FieldKind::Text),
    ("nutriscore_score", "nutriScoreScore", FieldKind::Numeric),
    ("nova_group", "novaGroup", FieldKind::Numeric),
    ("energy-kcal_100g", "energyKcal_100g", FieldKind::Numeric),
    ("proteins_100g", "proteins_100g", FieldKind::Numeric),
    ("carbohydrates_100g", "carbs_100g", FieldKind::Numeric),
    ("sugars_100g", "sugars_100g", FieldKind::Numeric),
    ("fat_100g", "fat_100g", FieldKind::Numeric),
    ("saturated-fat_100g", "satFat_100g", FieldKind::Numeric),
    ("fiber_100g", "fiber_100g", FieldKind::Numeric),
    ("salt_100g", "salt_100g", FieldKind::Numeric),
    ("sodium_100g", "sodium_100g", FieldKind::Numeric),
    ("countries_tags", "countries", FieldKind::Text),
];

/// `Product` column order as the front-end expects it.
pub const PRODUCT_COLUMNS: &[&str] = &[
    "id",
    "barcode",
    "name",
    "brand",
    "quantity",
    "countries",
    "nutriScore",
    "nutriScoreScore",
    "novaGroup",
    "categories",
    "energyKcal_100g",
    "proteins_100g",
    "carbs_100g",
    "sugars_100g",
    "fat_100g",
    "satFat_100g",
    "fiber_100g",
    "salt_100g",
    "sodium_100g",
];

pub const CODE_COLUMN: &str = "code";
pub const NAME_COLUMN: &str = "product_name";
pub const GRADE_COLUMN: &str = "nutriscore_grade";

/// Source column feeding a `Product` destination column, if any.
pub fn source_for(dest: &str) -> Option<(&'static str, FieldKind)> {
    FIELD_MAP
        .iter()
        .find(|(_, d, _)| *d == dest)
        .map(|(src, _, kind)| (*src, *kind))
}

/// Reduce a raw Nutri-Score grade to a single `A`..=`E` letter.
pub fn normalize_grade(raw: &str) -> Option<char> {
    let first = non_null(raw)?.trim().chars().next()?.to_ascii_uppercase();
    matches!(first, 'A'..='E').then_some(first)
}
