//! Asset file paths: `{prefix}{isbn13}_{asset}.pdf`

use super::{prerequisite_text, ComputationError};
use crate::layers::ComputationSettings;
use crate::record::MetadataRecord;
use crate::strategies::identifiers::normalize_isbn;
use crate::types::FieldValue;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Cover,
    Interior,
    Jacket,
}

impl AssetKind {
    pub const ALL: [AssetKind; 3] = [AssetKind::Cover, AssetKind::Interior, AssetKind::Jacket];

    pub fn suffix(self) -> &'static str {
        match self {
            AssetKind::Cover => "cover",
            AssetKind::Interior => "interior",
            AssetKind::Jacket => "jacket",
        }
    }

    pub fn field_name(self) -> &'static str {
        match self {
            AssetKind::Cover => "cover_path",
            AssetKind::Interior => "interior_path",
            AssetKind::Jacket => "jacket_path",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

pub fn asset_path(
    record: &MetadataRecord,
    settings: &ComputationSettings,
    asset: AssetKind,
) -> Result<FieldValue, ComputationError> {
    let raw = prerequisite_text(record, "isbn")?;
    let isbn = normalize_isbn(&raw);
    if isbn.len() != 13 || !isbn.chars().all(|c| c.is_ascii_digit()) {
        return Err(ComputationError::InvalidPrerequisite {
            field: "isbn".to_string(),
            reason: format!("'{}' is not a 13-digit ISBN", raw),
        });
    }
    Ok(FieldValue::Text(format!(
        "{}{}_{}.pdf",
        settings.asset_path_prefix,
        isbn,
        asset.suffix()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_per_asset() {
        let record = MetadataRecord::new().with_field("isbn", "978-0-306-40615-7");
        let settings = ComputationSettings {
            asset_path_prefix: "assets/".into(),
            ..Default::default()
        };
        assert_eq!(
            asset_path(&record, &settings, AssetKind::Cover).unwrap(),
            FieldValue::Text("assets/9780306406157_cover.pdf".into())
        );
        assert_eq!(
            asset_path(&record, &settings, AssetKind::Jacket)
                .unwrap()
                .render(),
            "assets/9780306406157_jacket.pdf"
        );
    }

    #[test]
    fn test_short_isbn_rejected() {
        let record = MetadataRecord::new().with_field("isbn", "0306406152");
        assert!(asset_path(&record, &ComputationSettings::default(), AssetKind::Interior).is_err());
    }
}
