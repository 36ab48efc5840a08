//! Read a rendered deck back into titles and bullets.

use deck_core::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Seek};
use zip::ZipArchive;

const BULLET_MARKERS: [&str; 2] = ["• ", "•"];

/// Text content of one slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectedSlide {
    /// 1-based position in presentation order.
    pub number: usize,
    /// Text of the top-most shape.
    pub title: String,
    /// Paragraphs of every other text shape, bullet markers removed.
    pub bullets: Vec<String>,
    pub has_picture: bool,
}

/// Reader for PPTX packages.
#[derive(Debug, Default)]
pub struct PptxInspector;

impl PptxInspector {
    pub fn new() -> Self {
        Self
    }

    /// Inspect every slide of the package in `reader`.
    pub fn inspect<R: Read + Seek>(&self, reader: R) -> Result<Vec<InspectedSlide>> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| Error::ZipError(format!("Failed to open ZIP: {}", e)))?;

        let slide_paths = self.slide_order(&mut archive)?;
        log::debug!("Found {} slides", slide_paths.len());

        slide_paths
            .iter()
            .enumerate()
            .map(|(idx, path)| {
                let content = read_part(&mut archive, path)?;
                Ok(inspect_slide(&content, idx + 1))
            })
            .collect()
    }

    /// Slide part paths in presentation order.
    ///
    /// `sldIdLst` in `presentation.xml` is authoritative. When it is missing
    /// the relationship ids (or target names) give the order.
    fn slide_order<R: Read + Seek>(&self, archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
        let rels = read_part(archive, "ppt/_rels/presentation.xml.rels")?;
        let slides = slide_relationships(&rels)?;

        let listed = match read_part(archive, "ppt/presentation.xml") {
            Ok(presentation) => listed_slide_ids(&presentation)?,
            Err(e) => {
                log::warn!("No readable presentation.xml, ordering by relationship: {}", e);
                Vec::new()
            }
        };

        if !listed.is_empty() {
            let by_id: HashMap<&str, &str> = slides
                .iter()
                .map(|rel| (rel.id.as_str(), rel.path.as_str()))
                .collect();
            return Ok(listed
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).map(|path| path.to_string()))
                .collect());
        }

        let mut ordered: Vec<(String, Option<usize>)> = slides
            .into_iter()
            .map(|rel| {
                let order = extract_slide_number(&rel.id).or_else(|| extract_slide_number(&rel.path));
                (rel.path, order)
            })
            .collect();
        ordered.sort_by(|a, b| match (a.1, b.1) {
            (Some(na), Some(nb)) => na.cmp(&nb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });
        Ok(ordered.into_iter().map(|(path, _)| path).collect())
    }
}

struct SlideRel {
    id: String,
    path: String,
}

fn slide_relationships(xml: &str) -> Result<Vec<SlideRel>> {
    let mut slides = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"Relationship" => {
                let rel_type = attribute(e, b"Type").unwrap_or_default();
                if !rel_type.ends_with("/slide") {
                    continue;
                }
                let (Some(id), Some(target)) = (attribute(e, b"Id"), attribute(e, b"Target")) else {
                    continue;
                };
                let path = match target.strip_prefix('/') {
                    Some(absolute) => absolute.to_string(),
                    None => format!("ppt/{}", target),
                };
                slides.push(SlideRel { id, path });
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!("Error parsing relationships: {}", e)));
            }
            _ => {}
        }
    }

    Ok(slides)
}

/// Relationship ids of `p:sldId` entries, in document order.
fn listed_slide_ids(xml: &str) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if local_name(e.name().as_ref()) == b"sldId" => {
                if let Some(id) = attribute(e, b"r:id") {
                    ids.push(id);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!("Error parsing presentation: {}", e)));
            }
            _ => {}
        }
    }

    Ok(ids)
}

/// A shape with its paragraphs and top-left offset.
#[derive(Debug, Default)]
struct ShapeInfo {
    paragraphs: Vec<String>,
    picture: bool,
    x: i64,
    y: i64,
}

fn inspect_slide(xml: &str, number: usize) -> InspectedSlide {
    let mut shapes = extract_shapes(xml);
    shapes.sort_by_key(|shape| (shape.y, shape.x));

    let has_picture = shapes.iter().any(|shape| shape.picture);
    let mut text_shapes = shapes.into_iter().filter(|shape| !shape.paragraphs.is_empty());

    let title = text_shapes
        .next()
        .map(|shape| shape.paragraphs.join(" "))
        .unwrap_or_default();
    let bullets = text_shapes
        .flat_map(|shape| shape.paragraphs)
        .map(|paragraph| strip_bullet(&paragraph).to_string())
        .filter(|bullet| !bullet.is_empty())
        .collect();

    InspectedSlide {
        number,
        title,
        bullets,
        has_picture,
    }
}

fn extract_shapes(xml: &str) -> Vec<ShapeInfo> {
    let mut shapes = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut current: Option<ShapeInfo> = None;
    let mut paragraph: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"sp" => current = Some(ShapeInfo::default()),
                b"pic" => {
                    current = Some(ShapeInfo {
                        picture: true,
                        ..ShapeInfo::default()
                    })
                }
                b"off" => read_offset(e, current.as_mut()),
                b"p" if current.is_some() => paragraph = Some(String::new()),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if local_name(e.name().as_ref()) == b"off" {
                    read_offset(e, current.as_mut());
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(text) = paragraph.as_mut() {
                    text.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"p" => {
                    if let (Some(text), Some(shape)) = (paragraph.take(), current.as_mut()) {
                        let text = text.trim();
                        if !text.is_empty() {
                            shape.paragraphs.push(text.to_string());
                        }
                    }
                }
                b"sp" | b"pic" => {
                    if let Some(shape) = current.take() {
                        shapes.push(shape);
                    }
                    paragraph = None;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("XML parsing error (continuing): {}", e);
            }
            _ => {}
        }
    }

    shapes
}

/// Record the first offset seen in a shape; later ones belong to children.
fn read_offset(e: &BytesStart<'_>, shape: Option<&mut ShapeInfo>) {
    let Some(shape) = shape else {
        return;
    };
    if shape.x != 0 || shape.y != 0 {
        return;
    }
    if let Some(x) = attribute(e, b"x").and_then(|v| v.parse().ok()) {
        shape.x = x;
    }
    if let Some(y) = attribute(e, b"y").and_then(|v| v.parse().ok()) {
        shape.y = y;
    }
}

fn strip_bullet(text: &str) -> &str {
    BULLET_MARKERS
        .iter()
        .find_map(|marker| text.strip_prefix(marker))
        .unwrap_or(text)
        .trim()
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", path, e)))?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", path, e)))?;

    Ok(content)
}

/// Extract the local name from a potentially namespaced XML element name.
fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Extract a slide number from a string like "rId2" or "slide3.xml".
fn extract_slide_number(s: &str) -> Option<usize> {
    let s = s.trim_end_matches(".xml").trim_end_matches(".rels");
    let start = s.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    s[start..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLIDE: &str = r#"<p:sld xmlns:a="a" xmlns:p="p" xmlns:r="r"><p:cSld><p:spTree>
        <p:sp><p:spPr><a:xfrm><a:off x="914400" y="1645920"/></a:xfrm></p:spPr>
          <p:txBody><a:p><a:r><a:t>• First</a:t></a:r></a:p><a:p><a:r><a:t>• Second &amp; last</a:t></a:r></a:p><a:p/></p:txBody></p:sp>
        <p:sp><p:spPr><a:xfrm><a:off x="914400" y="457200"/></a:xfrm></p:spPr>
          <p:txBody><a:p><a:r><a:t>Heading</a:t></a:r></a:p></p:txBody></p:sp>
        <p:pic><p:spPr><a:xfrm><a:off x="7315200" y="1645920"/></a:xfrm></p:spPr></p:pic>
        </p:spTree></p:cSld></p:sld>"#;

    #[test]
    fn test_title_is_top_most_shape() {
        let slide = inspect_slide(SLIDE, 2);
        assert_eq!(slide.number, 2);
        assert_eq!(slide.title, "Heading");
        assert_eq!(slide.bullets, vec!["First", "Second & last"]);
        assert!(slide.has_picture);
    }

    #[test]
    fn test_empty_slide() {
        let slide = inspect_slide("<p:sld><p:cSld><p:spTree/></p:cSld></p:sld>", 1);
        assert_eq!(slide.title, "");
        assert!(slide.bullets.is_empty());
        assert!(!slide.has_picture);
    }

    #[test]
    fn test_listed_ids_win_over_relationship_numbers() {
        let rels = r#"<Relationships>
            <Relationship Id="rId3" Type="http://x/relationships/slide" Target="slides/slide1.xml"/>
            <Relationship Id="rId4" Type="http://x/relationships/slide" Target="/ppt/slides/slide2.xml"/>
            <Relationship Id="rId1" Type="http://x/relationships/slideMaster" Target="slideMasters/slideMaster1.xml"/>
        </Relationships>"#;
        let slides = slide_relationships(rels).unwrap();
        assert_eq!(slides.len(), 2);
        assert_eq!(slides[1].path, "ppt/slides/slide2.xml");

        let presentation = r#"<p:presentation><p:sldIdLst><p:sldId id="256" r:id="rId4"/><p:sldId id="257" r:id="rId3"/></p:sldIdLst></p:presentation>"#;
        assert_eq!(listed_slide_ids(presentation).unwrap(), vec!["rId4", "rId3"]);
    }

    #[test]
    fn test_not_a_zip_is_error() {
        let result = PptxInspector::new().inspect(std::io::Cursor::new(b"plain text".to_vec()));
        assert!(matches!(result, Err(Error::ZipError(_))));
    }

    #[test]
    fn test_extract_slide_number() {
        assert_eq!(extract_slide_number("rId1"), Some(1));
        assert_eq!(extract_slide_number("rId12"), Some(12));
        assert_eq!(extract_slide_number("slides/slide123.xml"), Some(123));
        assert_eq!(extract_slide_number("nodigits"), None);
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"p:sp"), b"sp");
        assert_eq!(local_name(b"sp"), b"sp");
    }
}
