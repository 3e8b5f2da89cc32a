//! Data model: pipeline stages, per-image artifacts and the final menu.
//!
//! The on-disk shapes are part of the external interface. Cached artifacts
//! are small JSON objects (`{"url": …}`, `{"text": …}`, `{"base64": …}`) and
//! the output document uses the Polish field names the downstream consumers
//! expect (`menu` → `kategoria`/`dania` → `nazwa`/`opis`/`cena`/`waluta`).
//! Rust code uses English names and serde renames at the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One phase of the pipeline.
///
/// Each stage owns a disjoint cache namespace (a subdirectory of the cache
/// root), so identical keys in different stages can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Per-image upscaling towards the target resolution.
    Upscale,
    /// Per-image text recognition on the upscaled image.
    Recognize,
    /// Per-image recompression of the upscaled image under the size budget.
    Compress,
    /// Single batch call turning every image and text into one menu.
    Extract,
}

impl Stage {
    /// The cache subdirectory holding this stage's artifacts.
    pub fn namespace(self) -> &'static str {
        match self {
            Stage::Upscale => "upscaled",
            Stage::Recognize => "ocr",
            Stage::Compress => "compressed",
            Stage::Extract => "menu",
        }
    }

    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [Stage::Upscale, Stage::Recognize, Stage::Compress, Stage::Extract];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Upscale => "Upscale",
            Stage::Recognize => "Recognize",
            Stage::Compress => "Compress",
            Stage::Extract => "Extract",
        };
        f.write_str(name)
    }
}

/// A menu photo discovered in the input directory.
///
/// The file name is the item's identity for the whole run and the basis of
/// its cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageItem {
    /// File name without directory, e.g. `"page-1.jpg"`.
    pub file_name: String,
    /// Local path to the original photo.
    pub path: std::path::PathBuf,
}

impl ImageItem {
    /// The original photo as a source reference (a bare local path).
    pub fn source(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

// ── Stage artifacts ──────────────────────────────────────────────────────

/// Output of the upscale stage: where the upscaled image lives.
///
/// Equals the original path when the photo was already large enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpscaledImage {
    pub url: String,
}

/// Output of the recognize stage: the text found on the image (may be empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedText {
    pub text: String,
}

/// Output of the compress stage: base64 image bytes, normally under the budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedImage {
    pub base64: String,
}

impl CompressedImage {
    /// Infer the mime type from the base64-encoded file signature.
    ///
    /// Under-budget photos are passed through untouched and may still be PNG;
    /// everything the compressor re-encodes is JPEG.
    pub fn mime_type(&self) -> &'static str {
        if self.base64.starts_with("iVBORw0KGgo") {
            "image/png"
        } else {
            "image/jpeg"
        }
    }
}

// ── Final document ───────────────────────────────────────────────────────

/// The structured menu produced by the extraction stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuDocument {
    pub menu: Vec<Category>,
}

/// A named group of dishes, e.g. "Przystawki".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "kategoria")]
    pub name: String,
    #[serde(rename = "dania")]
    pub dishes: Vec<Dish>,
}

/// One orderable position.
///
/// A dish sold in several sizes is several `Dish` records, each with its own
/// size in the description and its own single price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dish {
    #[serde(rename = "nazwa")]
    pub name: String,
    #[serde(rename = "opis")]
    pub description: String,
    #[serde(rename = "cena")]
    pub price: f64,
    #[serde(rename = "waluta")]
    pub currency: String,
}

impl MenuDocument {
    pub fn category_count(&self) -> usize {
        self.menu.len()
    }

    pub fn dish_count(&self) -> usize {
        self.menu.iter().map(|c| c.dishes.len()).sum()
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        for category in &self.menu {
            for dish in &category.dishes {
                if !dish.price.is_finite() {
                    return Err(format!(
                        "dish '{}' in '{}' has a non-finite price",
                        dish.name, category.name
                    ));
                }
            }
        }
        Ok(())
    }
}

/// JSON schema the extraction response must follow.
///
/// Embedded verbatim in the extraction prompt.
pub fn menu_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "menu": {
                "type": "array",
                "description": "List of menu categories.",
                "items": {
                    "type": "object",
                    "properties": {
                        "kategoria": {
                            "type": "string",
                            "description": "Category name, e.g. 'Przystawki'."
                        },
                        "dania": {
                            "type": "array",
                            "description": "Dishes in this category.",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "nazwa": { "type": "string" },
                                    "opis": { "type": "string" },
                                    "cena": { "type": "number" },
                                    "waluta": { "type": "string" }
                                },
                                "required": ["nazwa", "opis", "cena", "waluta"]
                            }
                        }
                    },
                    "required": ["kategoria", "dania"]
                }
            }
        },
        "required": ["menu"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_are_distinct() {
        let mut names: Vec<_> = Stage::ALL.iter().map(|s| s.namespace()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn dish_uses_polish_field_names() {
        let dish = Dish {
            name: "Malbec".into(),
            description: "150 ml".into(),
            price: 24.0,
            currency: "PLN".into(),
        };
        let json = serde_json::to_value(&dish).unwrap();
        assert_eq!(json["nazwa"], "Malbec");
        assert_eq!(json["opis"], "150 ml");
        assert_eq!(json["cena"], 24.0);
        assert_eq!(json["waluta"], "PLN");
    }

    #[test]
    fn dish_requires_all_four_fields() {
        let missing_currency = r#"{"nazwa":"Zupa","opis":"","cena":12}"#;
        assert!(serde_json::from_str::<Dish>(missing_currency).is_err());
    }

    #[test]
    fn list_valued_price_is_rejected() {
        let two_prices = r#"{"nazwa":"Malbec","opis":"150 ml / 750 ml","cena":[24,95],"waluta":"PLN"}"#;
        assert!(serde_json::from_str::<Dish>(two_prices).is_err());
    }

    #[test]
    fn compressed_mime_from_signature() {
        let png = CompressedImage {
            base64: "iVBORw0KGgoAAAANSUhEUg".into(),
        };
        let jpeg = CompressedImage {
            base64: "/9j/4AAQSkZJRg".into(),
        };
        assert_eq!(png.mime_type(), "image/png");
        assert_eq!(jpeg.mime_type(), "image/jpeg");
    }

    #[test]
    fn counts() {
        let doc: MenuDocument = serde_json::from_str(
            r#"{"menu":[{"kategoria":"Zupy","dania":[
                {"nazwa":"Żurek","opis":"","cena":18,"waluta":"PLN"},
                {"nazwa":"Rosół","opis":"","cena":16.5,"waluta":"PLN"}]},
              {"kategoria":"Desery","dania":[]}]}"#,
        )
        .unwrap();
        assert_eq!(doc.category_count(), 2);
        assert_eq!(doc.dish_count(), 2);
        assert!(doc.validate().is_ok());
    }
}
