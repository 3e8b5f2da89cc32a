//! Prompt construction for the aggregate extraction call.
//!
//! The extraction model receives one text part built here plus every
//! compressed photo as an image part. The OCR transcripts are included so the
//! model can cross-check small print it struggles to read in the photos.

use crate::menu::{menu_schema, ImageItem, RecognizedText};

/// Fixed instructions preceding the OCR transcripts, in Polish like the
/// schema field names.
pub const EXTRACTION_INSTRUCTIONS: &str = r#"Twoim jedynym zadaniem jest odczytać i zwrócić wszystkie pozycje z menu, które otrzymujesz. Pozostałe informacje, takie jak powiadomienia czy reklamy, ignorujesz. Zwracasz tylko całe menu w żądanym formacie.

Eliminuj literówki, np.: "Argentyne" -> "Argentyna".

Jeśli dana pozycja ma dwa warianty albo więcej, zduplikuj ją. Np. jeśli wino ma cenę x za 150 ml i cenę y za 750 ml, stwórz dwie pozycje tego samego wina: jedną z "150 ml" w opisie i ceną x, drugą z "750 ml" w opisie i ceną y. Nigdy nie podawaj więcej niż jednej ceny w pozycji.

Jeśli są gramatury lub pojemności, podawaj je w opisach."#;

/// Build the full text part of the extraction request.
///
/// Transcripts are labelled with their 1-based position and file name, in
/// the same order as the attached images.
pub fn extraction_prompt(items: &[ImageItem], texts: &[RecognizedText]) -> String {
    let transcripts = items
        .iter()
        .zip(texts)
        .enumerate()
        .map(|(i, (item, text))| {
            format!("=== ZDJĘCIE {}: {} ===\n{}\n", i + 1, item.file_name, text.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let schema = serde_json::to_string_pretty(&menu_schema()).unwrap_or_default();

    format!(
        "{EXTRACTION_INSTRUCTIONS}\n\n\
         Otrzymujesz {count} zdjęć MENU oraz tekst już wyodrębniony z nich przez inny OCR dla pomocy.\n\n\
         Tekst z OCR ze wszystkich zdjęć:\n---\n{transcripts}\n---\n\n\
         Zwróć odpowiedź WYŁĄCZNIE w formacie JSON, bez żadnych dodatkowych wyjaśnień, markdownu \
         czy tekstu przed lub po JSONie. Struktura JSON musi być zgodna z następującym schematem:\n\n{schema}",
        count = items.len(),
    )
}
