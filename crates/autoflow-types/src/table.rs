//! Table schema shapes consumed to enrich row-trigger bindings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub schema: BTreeMap<String, FieldSchema>,
}

/// A single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

/// Column catalogue: (display name, type, subtype). Order matters, the first
/// match wins.
const COLUMN_TYPES: &[(&str, &str, Option<&str>)] = &[
    ("Text", "string", None),
    ("Barcode/QR", "barcodeqr", None),
    ("Long Form Text", "longform", None),
    ("Single select", "options", None),
    ("Multi select", "array", None),
    ("Number", "number", None),
    ("BigInt", "bigint", None),
    ("Boolean", "boolean", None),
    ("Date/Time", "datetime", None),
    ("Single attachment", "attachment_single", None),
    ("Attachment list", "attachment", None),
    ("Signature", "signature_single", None),
    ("Relationship", "link", None),
    ("AI", "ai", None),
    ("Formula", "formula", None),
    ("JSON", "json", None),
    ("User", "bb_reference_single", Some("user")),
    ("User List", "bb_reference", Some("user")),
];

/// Display name of the column type matching `field_type` (and `subtype`
/// where the catalogue entry has one).
pub fn column_display_name(field_type: &str, subtype: Option<&str>) -> Option<&'static str> {
    COLUMN_TYPES
        .iter()
        .find(|(_, ty, sub)| *ty == field_type && sub.is_none_or(|s| Some(s) == subtype))
        .map(|(name, _, _)| *name)
}
