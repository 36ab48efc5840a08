//! PPTX renderer.
//!
//! Produces a minimal but complete OOXML package: one master, one blank
//! layout, one theme, a title slide and one slide per [`SlideRecord`].

use crate::parts;
use deck_core::{Error, ImageSource, Result, SlideRecord};
use image::ImageFormat;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const EMU_PER_INCH: i64 = 914_400;

const fn inches(tenths: i64) -> i64 {
    EMU_PER_INCH * tenths / 10
}

const MARGIN: i64 = inches(10);
const TOP_MARGIN: i64 = inches(5);
const TITLE_HEIGHT: i64 = inches(10);
const CONTENT_TOP: i64 = inches(18);
const TEXT_WIDTH: i64 = inches(65);
const TEXT_HEIGHT: i64 = inches(50);
const IMAGE_WIDTH: i64 = inches(45);
const IMAGE_MAX_HEIGHT: i64 = inches(50);
const GAP: i64 = inches(5);

/// Title font size in hundredths of a point.
const TITLE_SIZE: u32 = 4000;
const BULLET_SIZE: u32 = 2000;
const COVER_TITLE_SIZE: u32 = 4400;

const BULLET_PREFIX: &str = "• ";

/// Renders validated slides into a `.pptx` file.
#[derive(Default)]
pub struct PptxWriter<'a> {
    images: Option<&'a dyn ImageSource>,
}

impl<'a> PptxWriter<'a> {
    /// A writer that renders text only.
    pub fn new() -> Self {
        Self { images: None }
    }

    /// Download slide images through `source` and embed them.
    pub fn with_image_source(mut self, source: &'a dyn ImageSource) -> Self {
        self.images = Some(source);
        self
    }

    /// Render `slides` after a title slide showing `topic` into `output_path`.
    pub fn render(&self, slides: &[SlideRecord], topic: &str, output_path: impl AsRef<Path>) -> Result<()> {
        let output_path = output_path.as_ref();
        let file = File::create(output_path)?;
        let mut out = self.write(slides, topic, BufWriter::new(file))?;
        out.flush()?;
        log::info!(
            "Wrote {} slides to {}",
            slides.len() + 1,
            output_path.display()
        );
        Ok(())
    }

    /// Write the package to any seekable sink and hand the sink back.
    pub fn write<W: Write + Seek>(&self, slides: &[SlideRecord], topic: &str, out: W) -> Result<W> {
        let slide_count = slides.len() + 1;
        let mut package = Package::new(out);

        package.add("[Content_Types].xml", parts::content_types(slide_count).as_bytes())?;
        package.add("_rels/.rels", parts::PACKAGE_RELS.as_bytes())?;
        package.add("docProps/core.xml", parts::core_properties(topic).as_bytes())?;
        package.add("docProps/app.xml", parts::app_properties(slide_count).as_bytes())?;
        package.add("ppt/presentation.xml", parts::presentation(slide_count).as_bytes())?;
        package.add(
            "ppt/_rels/presentation.xml.rels",
            parts::presentation_rels(slide_count).as_bytes(),
        )?;
        package.add("ppt/slideMasters/slideMaster1.xml", parts::SLIDE_MASTER.as_bytes())?;
        package.add(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            parts::SLIDE_MASTER_RELS.as_bytes(),
        )?;
        package.add("ppt/slideLayouts/slideLayout1.xml", parts::SLIDE_LAYOUT.as_bytes())?;
        package.add(
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            parts::SLIDE_LAYOUT_RELS.as_bytes(),
        )?;
        package.add("ppt/theme/theme1.xml", parts::THEME.as_bytes())?;

        package.add_slide(1, &cover_slide_xml(topic)?, None)?;

        let mut media_count = 0;
        for (offset, slide) in slides.iter().enumerate() {
            let number = offset + 2;
            let picture = slide.image_url().and_then(|url| self.load_picture(url));

            let media_name = match &picture {
                Some(picture) => {
                    media_count += 1;
                    let name = format!("image{}.{}", media_count, picture.extension);
                    package.add(&format!("ppt/media/{}", name), &picture.bytes)?;
                    Some(name)
                }
                None => None,
            };

            let xml = content_slide_xml(slide, picture.as_ref())?;
            package.add_slide(number, &xml, media_name.as_deref())?;
        }

        package.finish()
    }

    /// Download and measure the image at `url`.
    ///
    /// Any failure leaves the slide without a picture.
    fn load_picture(&self, url: &str) -> Option<Picture> {
        let source = self.images?;
        let bytes = match source.fetch(url) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Skipping image {}: {}", url, e);
                return None;
            }
        };

        match Picture::from_bytes(bytes) {
            Ok(picture) => Some(picture),
            Err(reason) => {
                log::warn!("Skipping image {}: {}", url, reason);
                None
            }
        }
    }
}

/// An embeddable image with its on-slide size in EMU.
struct Picture {
    bytes: Vec<u8>,
    extension: &'static str,
    width: i64,
    height: i64,
}

impl Picture {
    fn from_bytes(bytes: Vec<u8>) -> std::result::Result<Self, String> {
        let format = image::guess_format(&bytes).map_err(|e| e.to_string())?;
        let extension = match format {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            other => return Err(format!("unsupported image format {:?}", other)),
        };

        let (pixel_width, pixel_height) = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| e.to_string())?
            .into_dimensions()
            .map_err(|e| e.to_string())?;
        if pixel_width == 0 || pixel_height == 0 {
            return Err("image has no pixels".to_string());
        }

        let (width, height) = fit_picture(pixel_width, pixel_height);
        Ok(Self {
            bytes,
            extension,
            width,
            height,
        })
    }
}

/// Scale to the picture column width, shrinking both sides if too tall.
fn fit_picture(pixel_width: u32, pixel_height: u32) -> (i64, i64) {
    let height = IMAGE_WIDTH * i64::from(pixel_height) / i64::from(pixel_width);
    if height <= IMAGE_MAX_HEIGHT {
        (IMAGE_WIDTH, height)
    } else {
        let width = IMAGE_MAX_HEIGHT * i64::from(pixel_width) / i64::from(pixel_height);
        (width, IMAGE_MAX_HEIGHT)
    }
}

/// Thin wrapper over the zip writer that maps errors into [`Error`].
struct Package<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: FileOptions,
}

impl<W: Write + Seek> Package<W> {
    fn new(out: W) -> Self {
        Self {
            zip: ZipWriter::new(out),
            options: FileOptions::default().compression_method(CompressionMethod::Deflated),
        }
    }

    fn add(&mut self, path: &str, bytes: &[u8]) -> Result<()> {
        self.zip
            .start_file(path, self.options)
            .map_err(|e| Error::ZipError(format!("Failed to add '{}': {}", path, e)))?;
        self.zip.write_all(bytes)?;
        Ok(())
    }

    fn add_slide(&mut self, number: usize, xml: &[u8], media: Option<&str>) -> Result<()> {
        self.add(&format!("ppt/slides/slide{}.xml", number), xml)?;
        self.add(
            &format!("ppt/slides/_rels/slide{}.xml.rels", number),
            parts::slide_rels(media).as_bytes(),
        )
    }

    fn finish(mut self) -> Result<W> {
        self.zip
            .finish()
            .map_err(|e| Error::ZipError(format!("Failed to finish package: {}", e)))
    }
}

/// Streaming builder for one slide's XML.
struct SlideXml {
    writer: Writer<Vec<u8>>,
    next_shape_id: u32,
}

fn xml_err(e: quick_xml::Error) -> Error {
    Error::XmlError(format!("Failed to write slide XML: {}", e))
}

impl SlideXml {
    fn begin() -> Result<Self> {
        let mut slide = Self {
            writer: Writer::new(Vec::new()),
            next_shape_id: 2,
        };
        slide.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        slide.start_with(
            "p:sld",
            &[("xmlns:a", parts::NS_A), ("xmlns:r", parts::NS_R), ("xmlns:p", parts::NS_P)],
        )?;
        slide.start("p:cSld")?;
        slide.start("p:spTree")?;

        slide.start("p:nvGrpSpPr")?;
        slide.empty("p:cNvPr", &[("id", "1"), ("name", "")])?;
        slide.empty("p:cNvGrpSpPr", &[])?;
        slide.empty("p:nvPr", &[])?;
        slide.end("p:nvGrpSpPr")?;
        slide.start("p:grpSpPr")?;
        slide.start("a:xfrm")?;
        slide.empty("a:off", &[("x", "0"), ("y", "0")])?;
        slide.empty("a:ext", &[("cx", "0"), ("cy", "0")])?;
        slide.empty("a:chOff", &[("x", "0"), ("y", "0")])?;
        slide.empty("a:chExt", &[("cx", "0"), ("cy", "0")])?;
        slide.end("a:xfrm")?;
        slide.end("p:grpSpPr")?;
        Ok(slide)
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        self.end("p:spTree")?;
        self.end("p:cSld")?;
        self.start("p:clrMapOvr")?;
        self.empty("a:masterClrMapping", &[])?;
        self.end("p:clrMapOvr")?;
        self.end("p:sld")?;
        Ok(self.writer.into_inner())
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(xml_err)
    }

    fn start(&mut self, name: &str) -> Result<()> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn start_with(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        self.event(Event::Start(BytesStart::new(name).with_attributes(attrs.iter().copied())))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        self.event(Event::Empty(BytesStart::new(name).with_attributes(attrs.iter().copied())))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text(&mut self, text: &str) -> Result<()> {
        self.event(Event::Text(BytesText::new(text)))
    }

    fn shape_id(&mut self) -> String {
        let id = self.next_shape_id;
        self.next_shape_id += 1;
        id.to_string()
    }

    fn transform(&mut self, x: i64, y: i64, cx: i64, cy: i64) -> Result<()> {
        self.start("a:xfrm")?;
        let (x, y, cx, cy) = (x.to_string(), y.to_string(), cx.to_string(), cy.to_string());
        self.empty("a:off", &[("x", x.as_str()), ("y", y.as_str())])?;
        self.empty("a:ext", &[("cx", cx.as_str()), ("cy", cy.as_str())])?;
        self.end("a:xfrm")?;
        self.start_with("a:prstGeom", &[("prst", "rect")])?;
        self.empty("a:avLst", &[])?;
        self.end("a:prstGeom")
    }

    /// A text box with one paragraph per entry of `paragraphs`.
    fn text_box(&mut self, name: &str, frame: (i64, i64, i64, i64), paragraphs: &[Paragraph<'_>]) -> Result<()> {
        let id = self.shape_id();
        self.start("p:sp")?;
        self.start("p:nvSpPr")?;
        self.empty("p:cNvPr", &[("id", id.as_str()), ("name", name)])?;
        self.empty("p:cNvSpPr", &[("txBox", "1")])?;
        self.empty("p:nvPr", &[])?;
        self.end("p:nvSpPr")?;

        self.start("p:spPr")?;
        let (x, y, cx, cy) = frame;
        self.transform(x, y, cx, cy)?;
        self.empty("a:noFill", &[])?;
        self.end("p:spPr")?;

        self.start("p:txBody")?;
        self.empty("a:bodyPr", &[("wrap", "square"), ("rtlCol", "0")])?;
        self.empty("a:lstStyle", &[])?;
        for paragraph in paragraphs {
            self.paragraph(paragraph)?;
        }
        self.end("p:txBody")?;
        self.end("p:sp")
    }

    fn paragraph(&mut self, paragraph: &Paragraph<'_>) -> Result<()> {
        self.start("a:p")?;
        self.start_with("a:pPr", &[("algn", paragraph.align)])?;
        if paragraph.spaced {
            self.start("a:spcBef")?;
            self.empty("a:spcPts", &[("val", "1400")])?;
            self.end("a:spcBef")?;
            self.start("a:spcAft")?;
            self.empty("a:spcPts", &[("val", "400")])?;
            self.end("a:spcAft")?;
        }
        self.end("a:pPr")?;

        self.start("a:r")?;
        let size = paragraph.size.to_string();
        let mut attrs = vec![("lang", "en-US"), ("sz", size.as_str())];
        if paragraph.bold {
            attrs.push(("b", "1"));
        }
        self.empty("a:rPr", &attrs)?;
        self.start("a:t")?;
        self.text(paragraph.text)?;
        self.end("a:t")?;
        self.end("a:r")?;
        self.end("a:p")
    }

    fn picture(&mut self, picture: &Picture) -> Result<()> {
        let id = self.shape_id();
        let left = MARGIN + TEXT_WIDTH + GAP;
        let top = if picture.height < inches(45) {
            CONTENT_TOP + inches(5)
        } else {
            CONTENT_TOP
        };

        self.start("p:pic")?;
        self.start("p:nvPicPr")?;
        self.empty("p:cNvPr", &[("id", id.as_str()), ("name", "Picture")])?;
        self.start("p:cNvPicPr")?;
        self.empty("a:picLocks", &[("noChangeAspect", "1")])?;
        self.end("p:cNvPicPr")?;
        self.empty("p:nvPr", &[])?;
        self.end("p:nvPicPr")?;

        self.start("p:blipFill")?;
        self.empty("a:blip", &[("r:embed", "rId2")])?;
        self.start("a:stretch")?;
        self.empty("a:fillRect", &[])?;
        self.end("a:stretch")?;
        self.end("p:blipFill")?;

        self.start("p:spPr")?;
        self.transform(left, top, picture.width, picture.height)?;
        self.end("p:spPr")?;
        self.end("p:pic")
    }
}

struct Paragraph<'t> {
    text: &'t str,
    size: u32,
    bold: bool,
    align: &'static str,
    spaced: bool,
}

fn cover_slide_xml(topic: &str) -> Result<Vec<u8>> {
    let mut slide = SlideXml::begin()?;
    let frame = (
        MARGIN,
        (parts::SLIDE_HEIGHT - inches(15)) / 2,
        parts::SLIDE_WIDTH - 2 * MARGIN,
        inches(15),
    );
    slide.text_box(
        "Title",
        frame,
        &[Paragraph {
            text: topic,
            size: COVER_TITLE_SIZE,
            bold: true,
            align: "ctr",
            spaced: false,
        }],
    )?;
    slide.finish()
}

fn content_slide_xml(record: &SlideRecord, picture: Option<&Picture>) -> Result<Vec<u8>> {
    let mut slide = SlideXml::begin()?;

    slide.text_box(
        "Title",
        (MARGIN, TOP_MARGIN, parts::SLIDE_WIDTH - 2 * MARGIN, TITLE_HEIGHT),
        &[Paragraph {
            text: &record.title,
            size: TITLE_SIZE,
            bold: true,
            align: "l",
            spaced: false,
        }],
    )?;

    let lines: Vec<String> = record
        .bullets
        .iter()
        .map(|bullet| format!("{}{}", BULLET_PREFIX, bullet))
        .collect();
    let paragraphs: Vec<Paragraph<'_>> = lines
        .iter()
        .map(|line| Paragraph {
            text: line,
            size: BULLET_SIZE,
            bold: false,
            align: "l",
            spaced: true,
        })
        .collect();
    slide.text_box("Content", (MARGIN, CONTENT_TOP, TEXT_WIDTH, TEXT_HEIGHT), &paragraphs)?;

    if let Some(picture) = picture {
        slide.picture(picture)?;
    }

    slide.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PptxInspector;
    use deck_core::{SearchError, SlideImage};
    use std::io::Read;
    use zip::ZipArchive;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    struct FakeImages;

    impl ImageSource for FakeImages {
        fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, SearchError> {
            match url {
                "https://img/wide.png" => Ok(png(200, 100)),
                "https://img/text.txt" => Ok(b"not an image".to_vec()),
                _ => Err(SearchError::Status(404)),
            }
        }
    }

    fn slide(index: usize, title: &str, url: Option<&str>) -> SlideRecord {
        SlideRecord {
            index,
            title: title.to_string(),
            bullets: vec!["First point".to_string(), "R&D <costs>".to_string()],
            image: SlideImage::Settled {
                image_url: url.map(str::to_string),
            },
        }
    }

    fn file_names(bytes: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut content = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_render_text_only_deck() {
        let slides = vec![slide(1, "Intro", None), slide(2, "Details", None)];
        let bytes = PptxWriter::new()
            .write(&slides, "Rust Decks", Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();

        let names = file_names(&bytes);
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "ppt/presentation.xml",
            "ppt/slides/slide1.xml",
            "ppt/slides/slide3.xml",
            "ppt/theme/theme1.xml",
        ] {
            assert!(names.iter().any(|n| n == part), "missing {}", part);
        }
        assert!(!names.iter().any(|n| n.starts_with("ppt/media/")));

        let inspected = PptxInspector::new().inspect(Cursor::new(bytes)).unwrap();
        assert_eq!(inspected.len(), 3);
        assert_eq!(inspected[0].title, "Rust Decks");
        assert!(inspected[0].bullets.is_empty());
        assert_eq!(inspected[1].title, "Intro");
        assert_eq!(inspected[2].title, "Details");
        assert_eq!(inspected[2].bullets, vec!["First point", "R&D <costs>"]);
    }

    #[test]
    fn test_bullet_text_is_escaped() {
        let bytes = PptxWriter::new()
            .write(&[slide(1, "A", None)], "T", Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        let xml = read_part(&bytes, "ppt/slides/slide2.xml");
        assert!(xml.contains("• R&amp;D &lt;costs&gt;"));
        assert!(xml.contains(r#"sz="4000" b="1""#));
    }

    #[test]
    fn test_pictures_are_embedded_with_aspect_ratio() {
        let images = FakeImages;
        let slides = vec![
            slide(1, "Wide", Some("https://img/wide.png")),
            slide(2, "Broken", Some("https://img/missing.png")),
            slide(3, "Text", Some("https://img/text.txt")),
        ];
        let bytes = PptxWriter::new()
            .with_image_source(&images)
            .write(&slides, "Pictures", Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();

        let names = file_names(&bytes);
        let media: Vec<_> = names.iter().filter(|n| n.starts_with("ppt/media/")).collect();
        assert_eq!(media, vec!["ppt/media/image1.png"]);

        let rels = read_part(&bytes, "ppt/slides/_rels/slide2.xml.rels");
        assert!(rels.contains("../media/image1.png"));
        let xml = read_part(&bytes, "ppt/slides/slide2.xml");
        assert!(xml.contains(&format!(r#"cx="{}" cy="{}""#, IMAGE_WIDTH, IMAGE_WIDTH / 2)));

        let inspected = PptxInspector::new().inspect(Cursor::new(bytes)).unwrap();
        assert!(inspected[1].has_picture);
        assert!(!inspected[2].has_picture);
        assert!(!inspected[3].has_picture);
    }

    #[test]
    fn test_without_image_source_urls_are_ignored() {
        let bytes = PptxWriter::new()
            .write(&[slide(1, "A", Some("https://img/wide.png"))], "T", Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        assert!(!file_names(&bytes).iter().any(|n| n.starts_with("ppt/media/")));
    }

    #[test]
    fn test_fit_picture() {
        assert_eq!(fit_picture(100, 100), (IMAGE_WIDTH, IMAGE_WIDTH));
        let (width, height) = fit_picture(100, 400);
        assert_eq!(height, IMAGE_MAX_HEIGHT);
        assert_eq!(width, IMAGE_MAX_HEIGHT / 4);
    }

    #[test]
    fn test_render_to_file() {
        let path = std::env::temp_dir().join(format!("deckgen-writer-{}.pptx", std::process::id()));
        PptxWriter::new()
            .render(&[slide(1, "On disk", None)], "File", &path)
            .unwrap();
        let inspected = PptxInspector::new().inspect(File::open(&path).unwrap()).unwrap();
        assert_eq!(inspected[1].title, "On disk");
        std::fs::remove_file(&path).unwrap();
    }
}
