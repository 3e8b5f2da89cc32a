//! Aggregate extraction: one request for the whole batch, one menu out.
//!
//! Unlike the per-image stages, the unit of work here is the batch. The
//! request carries the prompt (with every OCR transcript) plus every
//! compressed photo, and the parsed menu is cached under a key built from all
//! file names, so adding or removing a photo forces a fresh call even when
//! every per-image artifact is cached.

use crate::cache::{batch_key, ContentCache};
use crate::config::{ExtractionMode, PipelineConfig};
use crate::error::MenuError;
use crate::menu::{CompressedImage, ImageItem, MenuDocument, RecognizedText, Stage};
use crate::pipeline::postprocess::{clean_response, outermost_object, preview};
use crate::prompts::extraction_prompt;
use crate::remote::{with_deadline, ExtractionRequest, MenuExtractor};
use tracing::{debug, info, warn};

/// Characters of the raw response quoted in "no JSON" errors.
const PREVIEW_CHARS: usize = 200;

/// Result of the extraction stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOutcome {
    pub menu: MenuDocument,
    /// `true` when the menu came from the cache and no request was sent.
    pub cached: bool,
}

/// Assemble the multi-part request: prompt text plus images in batch order.
pub fn build_request(
    items: &[ImageItem],
    texts: &[RecognizedText],
    images: &[CompressedImage],
) -> ExtractionRequest {
    ExtractionRequest {
        prompt: extraction_prompt(items, texts),
        images: images.to_vec(),
    }
}

/// Turn a raw model answer into a validated menu.
///
/// The cleaned answer (fences and invisible characters removed) is parsed as
/// a whole first. In [`ExtractionMode::Lenient`] a failure falls back to the
/// outermost `{…}` span; if there is none the error is
/// [`MenuError::NoJsonInResponse`].
pub fn parse_menu(response: &str, mode: ExtractionMode) -> Result<MenuDocument, MenuError> {
    let cleaned = clean_response(response);

    let strict_err = match serde_json::from_str::<MenuDocument>(&cleaned) {
        Ok(menu) => return checked(menu),
        Err(e) => e,
    };

    if mode == ExtractionMode::Strict {
        return Err(MenuError::MalformedMenu {
            detail: format!("response is not a menu document: {strict_err}"),
        });
    }

    debug!("Strict parse failed ({}); scanning for a JSON object", strict_err);
    let span = outermost_object(&cleaned).ok_or_else(|| MenuError::NoJsonInResponse {
        preview: preview(&cleaned, PREVIEW_CHARS),
    })?;
    let menu = serde_json::from_str::<MenuDocument>(span).map_err(|e| MenuError::MalformedMenu {
        detail: e.to_string(),
    })?;
    checked(menu)
}

fn checked(menu: MenuDocument) -> Result<MenuDocument, MenuError> {
    menu.validate()
        .map_err(|detail| MenuError::MalformedMenu { detail })?;
    Ok(menu)
}

/// Run the extraction stage through the cache.
pub async fn extract_stage(
    extractor: &dyn MenuExtractor,
    cache: &ContentCache,
    items: &[ImageItem],
    texts: &[RecognizedText],
    images: &[CompressedImage],
    config: &PipelineConfig,
) -> Result<ExtractOutcome, MenuError> {
    let key = batch_key(items);
    let progress = config.progress_callback.as_ref();
    if let Some(cb) = progress {
        cb.on_stage_start(Stage::Extract, 1);
    }

    if let Some(menu) = cache.get::<MenuDocument>(Stage::Extract, &key).await {
        info!("Extract stage: menu for {} photos served from cache", items.len());
        if let Some(cb) = progress {
            cb.on_item_cached(Stage::Extract, 0, &key);
            cb.on_stage_complete(Stage::Extract);
        }
        return Ok(ExtractOutcome { menu, cached: true });
    }

    let request = build_request(items, texts, images);
    info!(
        "Extract stage: sending {} photos and {} chars of prompt to {}",
        request.images.len(),
        request.prompt.len(),
        config.extraction_model
    );

    let result = match with_deadline(
        "extraction",
        config.extract_timeout_secs,
        extractor.extract(&request),
    )
    .await
    {
        Ok(response) => parse_menu(&response, config.extraction_mode),
        Err(source) => Err(MenuError::ExtractionFailed { source }),
    };

    let menu = match result {
        Ok(menu) => menu,
        Err(e) => {
            warn!("Extract stage failed: {}", e);
            if let Some(cb) = progress {
                cb.on_item_error(Stage::Extract, 0, &key, &e.to_string());
            }
            return Err(e);
        }
    };

    cache.put(Stage::Extract, &key, &menu).await;
    info!(
        "Extract stage complete: {} categories, {} dishes",
        menu.category_count(),
        menu.dish_count()
    );
    if let Some(cb) = progress {
        cb.on_item_complete(Stage::Extract, 0, &key);
        cb.on_stage_complete(Stage::Extract);
    }
    Ok(ExtractOutcome {
        menu,
        cached: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MENU: &str = r#"{"menu":[{"kategoria":"Wina","dania":[
        {"nazwa":"Malbec","opis":"150 ml","cena":18.0,"waluta":"PLN"},
        {"nazwa":"Malbec","opis":"750 ml","cena":85.0,"waluta":"PLN"}]}]}"#;

    #[test]
    fn parses_bare_json() {
        let menu = parse_menu(MENU, ExtractionMode::Strict).unwrap();
        assert_eq!(menu.dish_count(), 2);
    }

    #[test]
    fn variants_are_separate_records() {
        let menu = parse_menu(MENU, ExtractionMode::Lenient).unwrap();
        let wines = &menu.menu[0].dishes;
        assert_eq!(wines[0].name, wines[1].name);
        assert_eq!(wines[0].description, "150 ml");
        assert_eq!(wines[1].price, 85.0);
    }

    #[test]
    fn strict_accepts_fenced_json() {
        let fenced = format!("```json\n{MENU}\n```");
        assert!(parse_menu(&fenced, ExtractionMode::Strict).is_ok());
    }

    #[test]
    fn lenient_recovers_from_chatter() {
        let chatty = format!("Here is the menu you asked for:\n{MENU}\nBon appétit!");
        assert!(parse_menu(&chatty, ExtractionMode::Lenient).is_ok());
        assert!(matches!(
            parse_menu(&chatty, ExtractionMode::Strict),
            Err(MenuError::MalformedMenu { .. })
        ));
    }

    #[test]
    fn no_object_is_a_distinct_error() {
        let err = parse_menu("I could not read any prices.", ExtractionMode::Lenient).unwrap_err();
        match err {
            MenuError::NoJsonInResponse { preview } => assert!(preview.starts_with("I could not")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let err = parse_menu(r#"{"dishes": []}"#, ExtractionMode::Lenient).unwrap_err();
        assert!(matches!(err, MenuError::MalformedMenu { .. }));

        let two_prices = r#"{"menu":[{"kategoria":"Wina","dania":[
            {"nazwa":"Malbec","opis":"","cena":[18, 85],"waluta":"PLN"}]}]}"#;
        assert!(matches!(
            parse_menu(two_prices, ExtractionMode::Lenient),
            Err(MenuError::MalformedMenu { .. })
        ));
    }

    #[test]
    fn request_keeps_batch_order() {
        let items: Vec<ImageItem> = ["a.jpg", "b.jpg"]
            .iter()
            .map(|n| ImageItem {
                file_name: n.to_string(),
                path: n.into(),
            })
            .collect();
        let texts = vec![
            RecognizedText { text: "first".into() },
            RecognizedText { text: "second".into() },
        ];
        let images = vec![
            CompressedImage { base64: "AAA".into() },
            CompressedImage { base64: "BBB".into() },
        ];
        let req = build_request(&items, &texts, &images);
        assert_eq!(req.images, images);
        assert!(req.prompt.find("first").unwrap() < req.prompt.find("second").unwrap());
    }
}
