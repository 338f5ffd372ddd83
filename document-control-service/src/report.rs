//! PDF report assembly.
//!
//! The report is laid out as a flat list of blocks (text lines, images,
//! vertical space) which are then paginated onto A4 pages and written with
//! `lopdf`. Uploaded images are decoded, flattened to RGB, re-encoded as
//! JPEG and embedded as DCT streams; anything that does not decode as an
//! image is listed with a placeholder line instead.

use chrono::{Local, NaiveDateTime};
use image::{DynamicImage, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{
    ALL_ATTACHMENTS_LABEL, DOC_DATED_LABEL, DOC_SIGNED_LABEL, RESPONSIBILITY_LABEL, SessionRecord,
    UploadedFile,
};

pub const REPORT_TITLE: &str = "Controle de Documentos";
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Width every embedded image is drawn at (6 in).
pub const IMAGE_DISPLAY_WIDTH: f32 = 432.0;

const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 72.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const CONTENT_HEIGHT: f32 = PAGE_HEIGHT - 2.0 * MARGIN;

// Average Helvetica glyph width as a fraction of the font size.
const GLYPH_WIDTH: f32 = 0.52;
const LEADING: f32 = 1.2;
const HEADING_SIZE: f32 = 14.0;
// float slack when a block fills the page exactly
const FIT_TOLERANCE: f32 = 0.01;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to encode page content: {0}")]
    Content(String),
    #[error("Failed to write PDF document: {0}")]
    Write(String),
    #[error("Report worker stopped unexpectedly: {0}")]
    Interrupted(String),
}

/// Per-file decode failure. Never escapes the builder: the file is listed
/// with a placeholder line instead.
#[derive(Debug, Error)]
pub enum FileDecodeError {
    #[error("not a decodable image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has no pixels")]
    Empty,
}

/// What ended up in the report for one uploaded file, in upload order.
#[derive(Debug, Clone, PartialEq)]
pub enum FileBlock {
    Image {
        name: String,
        width: f32,
        height: f32,
        pixel_width: u32,
        pixel_height: u32,
    },
    Placeholder {
        name: String,
        content_type: String,
    },
}

impl FileBlock {
    pub fn name(&self) -> &str {
        match self {
            FileBlock::Image { name, .. } | FileBlock::Placeholder { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub bytes: Vec<u8>,
    pub file_blocks: Vec<FileBlock>,
    pub page_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone)]
enum Block {
    Text {
        text: String,
        font: Font,
        size: f32,
    },
    Image {
        index: usize,
        width: f32,
        height: f32,
    },
    Space(f32),
}

impl Block {
    fn paragraph(text: impl Into<String>) -> Self {
        Block::Text {
            text: text.into(),
            font: Font::Regular,
            size: 11.0,
        }
    }

    fn heading(text: impl Into<String>) -> Self {
        Block::Text {
            text: text.into(),
            font: Font::Bold,
            size: HEADING_SIZE,
        }
    }
}

struct EmbeddedImage {
    jpeg: Vec<u8>,
    pixel_width: u32,
    pixel_height: u32,
}

#[derive(Debug, Clone)]
pub struct ReportBuilder {
    title: String,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self {
            title: REPORT_TITLE.to_string(),
        }
    }
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the report stamped with the current local time.
    pub fn build(
        &self,
        record: &SessionRecord,
        files: &[UploadedFile],
    ) -> Result<RenderedReport, RenderError> {
        self.build_at(record, files, Local::now().naive_local())
    }

    pub fn build_at(
        &self,
        record: &SessionRecord,
        files: &[UploadedFile],
        timestamp: NaiveDateTime,
    ) -> Result<RenderedReport, RenderError> {
        let mut blocks = self.header_blocks(record, timestamp);
        let mut images = Vec::new();
        let mut file_blocks = Vec::with_capacity(files.len());

        for file in files {
            let heading = format!("Documento: {}", file.name);
            // the heading is kept on the image's page, so the image gets what is left
            let max_image_height = CONTENT_HEIGHT - text_height(&heading, HEADING_SIZE);
            blocks.push(Block::heading(heading));

            match normalize_image(&file.bytes) {
                Ok(image) => {
                    let (width, height) =
                        display_size(image.pixel_width, image.pixel_height, max_image_height);
                    debug!(file = %file.name, width, height, "Embedding image");
                    blocks.push(Block::Image {
                        index: images.len(),
                        width,
                        height,
                    });
                    file_blocks.push(FileBlock::Image {
                        name: file.name.clone(),
                        width,
                        height,
                        pixel_width: image.pixel_width,
                        pixel_height: image.pixel_height,
                    });
                    images.push(image);
                }
                Err(e) => {
                    debug!(file = %file.name, content_type = %file.mime_type, error = %e, "Listing file without preview");
                    blocks.push(Block::paragraph(format!(
                        "Conteúdo não visualizável: {}",
                        file.mime_type
                    )));
                    file_blocks.push(FileBlock::Placeholder {
                        name: file.name.clone(),
                        content_type: file.mime_type.clone(),
                    });
                }
            }
            blocks.push(Block::Space(20.0));
        }

        let pages = paginate(&blocks);
        let page_count = pages.len();
        let bytes = write_document(&self.title, pages, &images)?;

        info!(
            files = files.len(),
            images = images.len(),
            pages = page_count,
            size = bytes.len(),
            "Report rendered"
        );

        Ok(RenderedReport {
            bytes,
            file_blocks,
            page_count,
        })
    }

    fn header_blocks(&self, record: &SessionRecord, timestamp: NaiveDateTime) -> Vec<Block> {
        let mut blocks = vec![
            Block::Text {
                text: self.title.clone(),
                font: Font::Bold,
                size: 24.0,
            },
            Block::Space(30.0),
            Block::paragraph(format!("Operação: {}", record.operation_name)),
        ];
        if let Some(note) = record.custom_operation_note.as_deref() {
            blocks.push(Block::paragraph(format!("Observação: {note}")));
        }
        blocks.push(Block::Space(20.0));
        blocks.push(Block::paragraph(format!(
            "Data/Hora: {}",
            timestamp.format(TIMESTAMP_FORMAT)
        )));
        blocks.push(Block::Space(30.0));

        blocks.push(Block::heading("Verificação do Documento"));
        for (label, answer) in [
            (DOC_SIGNED_LABEL, record.doc_signed),
            (DOC_DATED_LABEL, record.doc_dated),
            (ALL_ATTACHMENTS_LABEL, record.all_attachments),
        ] {
            blocks.push(Block::paragraph(format!("{label} {}", yes_no(answer))));
        }
        blocks.push(Block::paragraph(format!(
            "{RESPONSIBILITY_LABEL} {}",
            yes_no(record.responsibility_ack)
        )));
        blocks.push(Block::paragraph(format!(
            "Responsável: {}",
            record.responsible_name
        )));
        blocks.push(Block::Space(30.0));
        blocks
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "Sim" } else { "Não" }
}

/// Decode any supported image format, flatten it to RGB and re-encode it as JPEG.
fn normalize_image(bytes: &[u8]) -> Result<EmbeddedImage, FileDecodeError> {
    let decoded = image::load_from_memory(bytes)?;
    let rgb = decoded.to_rgb8();
    let (pixel_width, pixel_height) = rgb.dimensions();
    if pixel_width == 0 || pixel_height == 0 {
        return Err(FileDecodeError::Empty);
    }

    let mut jpeg = Vec::new();
    DynamicImage::ImageRgb8(rgb).write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)?;

    Ok(EmbeddedImage {
        jpeg,
        pixel_width,
        pixel_height,
    })
}

/// Fixed display width, proportional height; images taller than
/// `max_height` are shrunk uniformly so the aspect ratio still holds.
fn display_size(pixel_width: u32, pixel_height: u32, max_height: f32) -> (f32, f32) {
    let ratio = pixel_height as f32 / pixel_width as f32;
    let height = IMAGE_DISPLAY_WIDTH * ratio;
    if height <= max_height {
        (IMAGE_DISPLAY_WIDTH, height)
    } else {
        (max_height / ratio, max_height)
    }
}

fn text_height(text: &str, size: f32) -> f32 {
    wrap_text(text, size, CONTENT_WIDTH).len() as f32 * size * LEADING
}

/// Greedy word wrap using an average glyph width.
fn wrap_text(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let max_chars = ((max_width / (size * GLYPH_WIDTH)).floor() as usize).max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        // words longer than a line are hard-split
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if !current.is_empty() && needed > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Helvetica is a simple font: map text to WinAnsi bytes, replacing anything
/// outside Latin-1 with '?'.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
            0x20AC => 0x80,
            0x2013 => 0x96,
            0x2014 => 0x97,
            0x2018 => 0x91,
            0x2019 => 0x92,
            0x201C => 0x93,
            0x201D => 0x94,
            0x2022 => 0x95,
            _ => b'?',
        })
        .collect()
}

fn real(value: f32) -> Object {
    Object::from(value)
}

fn image_resource_name(index: usize) -> String {
    format!("Im{}", index + 1)
}

/// Lays blocks out top to bottom, opening a new page whenever the next
/// line or image does not fit.
struct PageWriter {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    cursor: f32,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            cursor: PAGE_HEIGHT - MARGIN,
        }
    }

    fn ensure_room(&mut self, height: f32) {
        let page_started = !self.current.is_empty();
        if page_started && self.cursor - height < MARGIN - FIT_TOLERANCE {
            self.pages.push(std::mem::take(&mut self.current));
            self.cursor = PAGE_HEIGHT - MARGIN;
        }
    }

    fn text_line(&mut self, line: &str, font: Font, size: f32) {
        let line_height = size * LEADING;
        self.ensure_room(line_height);
        let baseline = self.cursor - size;
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource_name().into(), real(size)]),
            Operation::new("Td", vec![real(MARGIN), real(baseline)]),
            Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(line))]),
            Operation::new("ET", vec![]),
        ]);
        self.cursor -= line_height;
    }

    fn image(&mut self, index: usize, width: f32, height: f32) {
        self.ensure_room(height);
        let bottom = self.cursor - height;
        self.current.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(width),
                    real(0.0),
                    real(0.0),
                    real(height),
                    real(MARGIN),
                    real(bottom),
                ],
            ),
            Operation::new(
                "Do",
                vec![Object::Name(image_resource_name(index).into_bytes())],
            ),
            Operation::new("Q", vec![]),
        ]);
        self.cursor = bottom;
    }

    fn space(&mut self, height: f32) {
        self.cursor -= height;
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

fn paginate(blocks: &[Block]) -> Vec<Vec<Operation>> {
    let mut writer = PageWriter::new();
    for (position, block) in blocks.iter().enumerate() {
        match block {
            Block::Text { text, font, size } => {
                let lines = wrap_text(text, *size, CONTENT_WIDTH);
                // a file heading stays on the same page as its image
                if let Some(Block::Image { height, .. }) = blocks.get(position + 1) {
                    writer.ensure_room(lines.len() as f32 * size * LEADING + height);
                }
                for line in lines {
                    writer.text_line(&line, *font, *size);
                }
            }
            Block::Image {
                index,
                width,
                height,
            } => writer.image(*index, *width, *height),
            Block::Space(height) => writer.space(*height),
        }
    }
    writer.finish()
}

fn write_document(
    title: &str,
    pages: Vec<Vec<Operation>>,
    images: &[EmbeddedImage],
) -> Result<Vec<u8>, RenderError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut xobjects = Dictionary::new();
    for (index, image) in images.iter().enumerate() {
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.pixel_width as i64,
                "Height" => image.pixel_height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            image.jpeg.clone(),
        );
        let image_id = doc.add_object(stream);
        xobjects.set(image_resource_name(index), image_id);
    }

    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            Font::Regular.resource_name() => regular_id,
            Font::Bold.resource_name() => bold_id,
        },
        "XObject" => xobjects,
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations }
            .encode()
            .map_err(|e| RenderError::Content(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_tree = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
        "Resources" => resources_id,
        "MediaBox" => vec![real(0.0), real(0.0), real(PAGE_WIDTH), real(PAGE_HEIGHT)],
    };
    doc.objects.insert(pages_id, Object::Dictionary(page_tree));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(encode_win_ansi(title)),
        "Producer" => Object::string_literal(env!("CARGO_PKG_NAME")),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| {
        warn!(error = %e, "PDF serialization failed");
        RenderError::Write(e.to_string())
    })?;
    Ok(bytes)
}
