//! PDF text and image extraction
//!
//! Walks each page of a source PDF, concatenating page text into one manual
//! text artifact and saving embedded image XObjects to the volume directory.
//! Image page positions are recovered best-effort from the content stream:
//! the last `cm` matrix seen before an image `Do` gives its placement, and
//! the vertical position is expressed as a percentage from the page top so
//! it stays valid at any rendered size.
//!
//! Only DCT (JPEG) and JPX (JPEG 2000) encoded images are kept; their stream
//! bytes are a complete image file as-is. Images under 1 KiB are dropped as
//! icons or decorative fragments.

use crate::models::{ExtractedContent, ExtractedImage, ImagePosition};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::path::Path;
use stepforge_common::{Error, Result};

/// Minimum size for a kept image; smaller ones are icons/decorations.
const MIN_IMAGE_BYTES: usize = 1024;

/// Fallback page height (US Letter, points) when no MediaBox resolves.
const DEFAULT_PAGE_HEIGHT: f64 = 792.0;

/// Extract text and images from a PDF in the volume directory.
///
/// Output files are named deterministically from the document's hash prefix
/// (`<prefix>-manual.txt`, `<prefix>-raw-NNN.<ext>`), so re-extraction of the
/// same document overwrites rather than accumulates.
pub async fn extract_pdf_content(
    pdf_path: &Path,
    volume_dir: &Path,
    hash_prefix: &str,
) -> Result<ExtractedContent> {
    let pdf_path = pdf_path.to_path_buf();
    let volume_dir = volume_dir.to_path_buf();
    let hash_prefix = hash_prefix.to_string();

    // lopdf parsing is CPU-bound; keep it off the async executor
    tokio::task::spawn_blocking(move || extract_blocking(&pdf_path, &volume_dir, &hash_prefix))
        .await
        .map_err(|e| Error::internal(format!("PDF extraction task failed: {e}")))?
}

fn extract_blocking(
    pdf_path: &Path,
    volume_dir: &Path,
    hash_prefix: &str,
) -> Result<ExtractedContent> {
    let doc = Document::load(pdf_path)
        .map_err(|e| Error::invalid_input(format!("Failed to parse PDF: {e}")))?;

    let pages = doc.get_pages();
    tracing::info!(
        path = %pdf_path.display(),
        pages = pages.len(),
        "Extracting PDF content"
    );

    let mut full_text = String::new();
    let mut images = Vec::new();
    let mut image_counter: usize = 0;

    for (&page_num, &page_id) in &pages {
        // Page text; pages with no text contribute nothing
        match doc.extract_text(&[page_num]) {
            Ok(text) if !text.trim().is_empty() => {
                full_text.push_str(&format!("Page {}:\n{}\n", page_num, text));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(page = page_num, error = %e, "Could not extract page text");
            }
        }

        let xobjects = page_image_xobjects(&doc, page_id);
        if xobjects.is_empty() {
            continue;
        }

        let page_height = page_height(&doc, page_id);
        let positions = image_positions(&doc, page_id, &xobjects, page_height, page_num);

        for (name, object_id) in &xobjects {
            let Some((content, ext)) = image_bytes(&doc, *object_id) else {
                continue;
            };

            if content.len() < MIN_IMAGE_BYTES {
                tracing::debug!(
                    page = page_num,
                    bytes = content.len(),
                    "Skipping small image"
                );
                continue;
            }

            let filename = format!("{hash_prefix}-raw-{image_counter:03}.{ext}");
            let out_path = volume_dir.join(&filename);
            std::fs::write(&out_path, &content)?;

            let position = positions.get(name).copied();
            tracing::debug!(
                page = page_num,
                filename = %filename,
                bytes = content.len(),
                has_position = position.is_some(),
                "Extracted image"
            );

            images.push(ExtractedImage { filename, position });
            image_counter += 1;
        }
    }

    let manual_filename = format!("{hash_prefix}-manual.txt");
    std::fs::write(volume_dir.join(&manual_filename), &full_text)?;

    tracing::info!(
        images = images.len(),
        with_position = images.iter().filter(|i| i.position.is_some()).count(),
        manual = %manual_filename,
        "Extraction complete"
    );

    Ok(ExtractedContent {
        images,
        manual_filename,
    })
}

/// Image XObjects reachable from a page's resources, keyed by resource name.
fn page_image_xobjects(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, ObjectId)> {
    let Some(resources) = inherited_dict_entry(doc, page_id, b"Resources")
        .and_then(|obj| resolve_dict(doc, obj))
    else {
        return Vec::new();
    };

    let Ok(xobjects) = resources.get(b"XObject").and_then(|o| {
        match o {
            Object::Reference(id) => doc.get_object(*id)?.as_dict(),
            other => other.as_dict(),
        }
    }) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for (name, value) in xobjects.iter() {
        let Ok(id) = value.as_reference() else {
            continue;
        };
        let Ok(Object::Stream(stream)) = doc.get_object(id) else {
            continue;
        };
        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(|s| s.as_name())
            .map(|s| s == b"Image")
            .unwrap_or(false);
        if is_image {
            found.push((name.clone(), id));
        }
    }
    found
}

/// Raw stream bytes plus file extension for supported image encodings.
fn image_bytes(doc: &Document, object_id: ObjectId) -> Option<(Vec<u8>, &'static str)> {
    let Ok(Object::Stream(stream)) = doc.get_object(object_id) else {
        return None;
    };

    let filters = stream_filters(doc, &stream.dict);
    let ext = if filters.iter().any(|f| f == b"DCTDecode") {
        "jpg"
    } else if filters.iter().any(|f| f == b"JPXDecode") {
        "jp2"
    } else {
        // Flate/raw sample data is not a standalone image file
        tracing::debug!(?object_id, "Skipping image with unsupported encoding");
        return None;
    };

    Some((stream.content.clone(), ext))
}

/// Filter names on a stream, dereferenced and flattened.
fn stream_filters(doc: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    let Ok(filter) = dict.get(b"Filter") else {
        return Vec::new();
    };
    let filter = match filter {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(obj) => obj,
            Err(_) => return Vec::new(),
        },
        other => other,
    };
    match filter {
        Object::Name(name) => vec![name.clone()],
        Object::Array(items) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Best-effort y-positions for the page's image XObjects.
///
/// Tracks the most recent `cm` matrix in the decoded content stream; when a
/// `Do` invokes a known image XObject, the matrix translation plus vertical
/// scale gives the image's top edge in page space. Nested form XObjects and
/// the `q`/`Q` state stack are not followed; an image placed through one
/// simply reports no position.
fn image_positions(
    doc: &Document,
    page_id: ObjectId,
    xobjects: &[(Vec<u8>, ObjectId)],
    page_height: f64,
    page_num: u32,
) -> HashMap<Vec<u8>, ImagePosition> {
    let mut positions = HashMap::new();

    let content = match doc.get_and_decode_page_content(page_id) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!(page = page_num, error = %e, "Could not decode content stream");
            return positions;
        }
    };

    let known: HashMap<&[u8], ()> = xobjects.iter().map(|(n, _)| (n.as_slice(), ())).collect();
    let mut last_cm: Option<[f64; 6]> = None;

    for op in &content.operations {
        match op.operator.as_str() {
            "cm" if op.operands.len() == 6 => {
                let mut matrix = [0.0; 6];
                let mut ok = true;
                for (i, operand) in op.operands.iter().enumerate() {
                    match number(operand) {
                        Some(v) => matrix[i] = v,
                        None => {
                            ok = false;
                            break;
                        }
                    }
                }
                if ok {
                    last_cm = Some(matrix);
                }
            }
            "Do" => {
                let Some(Object::Name(name)) = op.operands.first() else {
                    continue;
                };
                if !known.contains_key(name.as_slice()) {
                    continue;
                }
                let Some(matrix) = last_cm else {
                    continue;
                };
                // Unit image square scaled by d and translated by f:
                // top edge sits at ty + height
                let top_y = matrix[5] + matrix[3];
                let y_from_top = page_height - top_y;
                let y_percentage = (y_from_top / page_height * 100.0).clamp(0.0, 100.0);

                positions.insert(
                    name.clone(),
                    ImagePosition {
                        page_number: page_num as i64 - 1, // 0-indexed
                        y_percentage,
                    },
                );
            }
            _ => {}
        }
    }

    positions
}

/// Page height from the MediaBox, following Parent inheritance.
fn page_height(doc: &Document, page_id: ObjectId) -> f64 {
    let media_box = inherited_dict_entry(doc, page_id, b"MediaBox")
        .and_then(|obj| match obj {
            Object::Reference(id) => doc.get_object(*id).ok().cloned(),
            other => Some(other.clone()),
        });

    if let Some(Object::Array(values)) = media_box {
        if values.len() == 4 {
            if let (Some(y0), Some(y1)) = (number(&values[1]), number(&values[3])) {
                let height = y1 - y0;
                if height > 0.0 {
                    return height;
                }
            }
        }
    }
    DEFAULT_PAGE_HEIGHT
}

/// Look up a page dictionary entry, walking up the Pages tree when inherited.
fn inherited_dict_entry<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    loop {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
}

/// Dereference an object to a dictionary if possible.
fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        other => other.as_dict().ok(),
    }
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// File extension of an extracted image filename, used when renaming it
/// into the per-step naming scheme.
pub fn image_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((_, "jpeg")) => "jpg",
        Some((_, ext)) if !ext.is_empty() => ext,
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("abc-raw-000.jpg"), "jpg");
        assert_eq!(image_extension("abc-raw-001.jp2"), "jp2");
        assert_eq!(image_extension("abc-raw-002.jpeg"), "jpg");
        assert_eq!(image_extension("noext"), "jpg");
    }

    #[test]
    fn test_number_conversion() {
        assert_eq!(number(&Object::Integer(7)), Some(7.0));
        assert_eq!(number(&Object::Real(2.5)), Some(2.5));
        assert_eq!(number(&Object::Null), None);
    }
}
