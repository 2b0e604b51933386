//! Core domain model and canonical spreadsheet row types for artcross.

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "artcross-core";

/// Fixed root of the one-level product group hierarchy ("Auto Parts").
pub const ROOT_GROUP_NAME: &str = "Автозапчасти";

/// Group names that must always hang directly under a required parent.
///
/// This is a hardcoded business rule table, not a general hierarchy
/// algorithm: every entry maps a known child name to the name of the parent
/// it has to be re-pointed to whenever it is touched by an import.
pub const GROUP_PARENT_RULES: &[(&str, &str)] = &[
    ("Рулевое управление", ROOT_GROUP_NAME),
    ("Подвеска колеса", ROOT_GROUP_NAME),
];

/// Returns the parent name a group of this name is required to have, if any.
pub fn required_parent_for(name: &str) -> Option<&'static str> {
    GROUP_PARENT_RULES
        .iter()
        .find(|(child, _)| *child == name)
        .map(|(_, parent)| *parent)
}

/// Canonical spreadsheet columns the import understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Brand,
    Article,
    TradingNumbers,
    Description,
    AdditionalName,
    ProductGroupName,
    ProductStatus,
    Specifications,
}

impl CanonicalField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Article => "article",
            Self::TradingNumbers => "trading_numbers",
            Self::Description => "description",
            Self::AdditionalName => "additional_name",
            Self::ProductGroupName => "product_group_name",
            Self::ProductStatus => "product_status",
            Self::Specifications => "specifications",
        }
    }
}

/// Header alias table: spreadsheet header (trimmed, lowercased) to canonical
/// field. Fixed at compile time, not configurable at runtime.
pub const HEADER_ALIASES: &[(&str, CanonicalField)] = &[
    ("бренд", CanonicalField::Brand),
    ("уникальный артикул", CanonicalField::Article),
    ("торговые номера", CanonicalField::TradingNumbers),
    ("описание", CanonicalField::Description),
    ("дополнительное описание", CanonicalField::AdditionalName),
    ("товарная группа", CanonicalField::ProductGroupName),
    ("статус изделия", CanonicalField::ProductStatus),
    ("характеристики", CanonicalField::Specifications),
];

/// Maps one raw header cell onto a canonical field. Matching is whitespace-
/// and case-insensitive; headers outside the alias table map to `None` and
/// their columns are dropped.
pub fn canonical_field_for_header(header: &str) -> Option<CanonicalField> {
    let key = header.trim().to_lowercase();
    HEADER_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, field)| *field)
}

/// One normalized spreadsheet row. `None` means the column was absent from
/// the file; `Some("")` means the cell was present but empty. Cell values
/// are kept raw; only headers get trimmed/lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub brand: Option<String>,
    pub article: Option<String>,
    pub trading_numbers: Option<String>,
    pub description: Option<String>,
    pub additional_name: Option<String>,
    pub product_group_name: Option<String>,
    pub product_status: Option<String>,
    pub specifications: Option<String>,
}

impl CanonicalRow {
    pub fn set(&mut self, field: CanonicalField, value: String) {
        match field {
            CanonicalField::Brand => self.brand = Some(value),
            CanonicalField::Article => self.article = Some(value),
            CanonicalField::TradingNumbers => self.trading_numbers = Some(value),
            CanonicalField::Description => self.description = Some(value),
            CanonicalField::AdditionalName => self.additional_name = Some(value),
            CanonicalField::ProductGroupName => self.product_group_name = Some(value),
            CanonicalField::ProductStatus => self.product_status = Some(value),
            CanonicalField::Specifications => self.specifications = Some(value),
        }
    }
}

/// Category node. Forms a forest via `parent_id`; the import path creates
/// groups lazily and never deletes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductGroup {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
}

/// Persisted product. `article` is the globally unique natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub article: String,
    pub brand: String,
    pub trading_numbers: String,
    pub description: String,
    pub additional_name: String,
    pub product_status: String,
    pub specifications: String,
    pub product_group_id: Option<i64>,
}

/// Sanitized write payload for one create-or-replace keyed on `article`.
/// Every field here overwrites the stored value (full replace, not merge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub article: String,
    pub brand: String,
    pub trading_numbers: String,
    pub description: String,
    pub additional_name: String,
    pub product_status: String,
    pub specifications: String,
    pub product_group_id: Option<i64>,
}

/// Query-API projection of a product: article, brand and its crosses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleCross {
    pub article: String,
    pub brand: String,
    pub trading_numbers: String,
}

/// Partial update payload for the query API. `None` leaves a field untouched,
/// unlike the import path's destructive upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub article: String,
    pub brand: Option<String>,
    pub trading_numbers: Option<String>,
    pub description: Option<String>,
    pub additional_name: Option<String>,
    pub product_status: Option<String>,
    pub specifications: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_matching_is_case_and_whitespace_insensitive() {
        assert_eq!(canonical_field_for_header("Бренд"), Some(CanonicalField::Brand));
        assert_eq!(canonical_field_for_header(" Бренд "), Some(CanonicalField::Brand));
        assert_eq!(canonical_field_for_header("бренд"), Some(CanonicalField::Brand));
        assert_eq!(canonical_field_for_header("БРЕНД"), Some(CanonicalField::Brand));
        assert_eq!(
            canonical_field_for_header("Уникальный Артикул"),
            Some(CanonicalField::Article)
        );
    }

    #[test]
    fn unknown_headers_are_dropped() {
        assert_eq!(canonical_field_for_header("цена"), None);
        assert_eq!(canonical_field_for_header("price"), None);
        assert_eq!(canonical_field_for_header(""), None);
    }

    #[test]
    fn parent_rules_cover_listed_children_only() {
        assert_eq!(required_parent_for("Рулевое управление"), Some(ROOT_GROUP_NAME));
        assert_eq!(required_parent_for("Подвеска колеса"), Some(ROOT_GROUP_NAME));
        assert_eq!(required_parent_for("Тормоза"), None);
        assert_eq!(required_parent_for(ROOT_GROUP_NAME), None);
    }

    #[test]
    fn canonical_row_set_fills_the_named_slot() {
        let mut row = CanonicalRow::default();
        row.set(CanonicalField::Article, "A1".into());
        row.set(CanonicalField::ProductGroupName, "Подвеска колеса".into());
        assert_eq!(row.article.as_deref(), Some("A1"));
        assert_eq!(row.product_group_name.as_deref(), Some("Подвеска колеса"));
        assert!(row.brand.is_none());
    }
}
