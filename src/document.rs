//! Already-rendered document content handed over by the host.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Text(String),
    Number(f64),
    /// `YYYY-MM-DD`, kept verbatim.
    Date(String),
    List(Vec<String>),
    Checkbox(bool),
}

impl MetadataValue {
    /// Infers the semantic type of a raw front-matter value.
    pub fn infer(raw: &str) -> Self {
        let value = raw.trim();
        if value.eq_ignore_ascii_case("true") {
            return MetadataValue::Checkbox(true);
        }
        if value.eq_ignore_ascii_case("false") {
            return MetadataValue::Checkbox(false);
        }
        if let Some(inner) = value
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            let items = inner
                .split(',')
                .map(|item| unquote(item.trim()).to_string())
                .filter(|item| !item.is_empty())
                .collect();
            return MetadataValue::List(items);
        }
        if is_iso_date(value) {
            return MetadataValue::Date(value.to_string());
        }
        if let Ok(number) = value.parse::<f64>() {
            if number.is_finite() {
                return MetadataValue::Number(number);
            }
        }
        MetadataValue::Text(unquote(value).to_string())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            MetadataValue::Text(_) => "text",
            MetadataValue::Number(_) => "number",
            MetadataValue::Date(_) => "date",
            MetadataValue::List(_) => "list",
            MetadataValue::Checkbox(_) => "checkbox",
        }
    }

    pub fn display(&self) -> String {
        match self {
            MetadataValue::Text(text) | MetadataValue::Date(text) => text.clone(),
            MetadataValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", *n as i64)
            }
            MetadataValue::Number(n) => n.to_string(),
            MetadataValue::List(items) => items.join(", "),
            MetadataValue::Checkbox(true) => "\u{2611}".to_string(),
            MetadataValue::Checkbox(false) => "\u{2610}".to_string(),
        }
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn is_iso_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }
    let digits_ok = bytes
        .iter()
        .enumerate()
        .all(|(idx, b)| idx == 4 || idx == 7 || b.is_ascii_digit());
    if !digits_ok {
        return false;
    }
    let month = (bytes[5] - b'0') * 10 + (bytes[6] - b'0');
    let day = (bytes[8] - b'0') * 10 + (bytes[9] - b'0');
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: MetadataValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Auto-fitted and split into highlight lines.
    Paragraph(String),
    /// Laid out at native size in natural flow.
    Heading { level: u8, text: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub title: String,
    pub front_matter: Vec<MetadataEntry>,
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_paragraph(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Paragraph(text.into()));
        self
    }

    pub fn with_heading(mut self, level: u8, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Heading {
            level: level.clamp(1, 6),
            text: text.into(),
        });
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, raw: &str) -> Self {
        self.front_matter.push(MetadataEntry {
            key: key.into(),
            value: MetadataValue::infer(raw),
        });
        self
    }

    pub fn paragraphs(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Paragraph(text) => Some(text.as_str()),
            Block::Heading { .. } => None,
        })
    }

    /// Reads markdown into blocks. A leading `---` YAML-style block supplies
    /// `key: value` front matter. Inline markup is dropped and only its text
    /// is kept. Each list item becomes its own paragraph.
    pub fn from_markdown(title: impl Into<String>, source: &str) -> Self {
        let options = Options::ENABLE_YAML_STYLE_METADATA_BLOCKS
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TABLES;
        let mut reader = MarkdownReader::new(Document::new(title));
        for event in Parser::new_ext(source, options) {
            reader.event(event);
        }
        reader.finish()
    }
}

struct MarkdownReader {
    doc: Document,
    text: String,
    heading: Option<u8>,
    in_metadata: bool,
}

impl MarkdownReader {
    fn new(doc: Document) -> Self {
        Self {
            doc,
            text: String::new(),
            heading: None,
            in_metadata: false,
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) if self.in_metadata => self.front_matter(&text),
            Event::Text(text) | Event::Code(text) => self.text.push_str(&text),
            Event::SoftBreak | Event::HardBreak => self.text.push(' '),
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::MetadataBlock(_) => self.in_metadata = true,
            Tag::Heading { level, .. } => {
                self.flush();
                self.heading = Some(match level {
                    HeadingLevel::H1 => 1,
                    HeadingLevel::H2 => 2,
                    HeadingLevel::H3 => 3,
                    HeadingLevel::H4 => 4,
                    HeadingLevel::H5 => 5,
                    HeadingLevel::H6 => 6,
                });
            }
            // A nested list ends the text of the item that holds it.
            Tag::Paragraph | Tag::List(_) | Tag::Item | Tag::CodeBlock(_) => self.flush(),
            Tag::TableCell => {
                if !self.text.is_empty() {
                    self.text.push(' ');
                }
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::MetadataBlock(_) => self.in_metadata = false,
            TagEnd::Heading(_)
            | TagEnd::Paragraph
            | TagEnd::Item
            | TagEnd::CodeBlock
            | TagEnd::TableRow
            | TagEnd::TableHead => self.flush(),
            _ => {}
        }
    }

    fn front_matter(&mut self, raw: &str) {
        for line in raw.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            if !key.is_empty() {
                self.doc.front_matter.push(MetadataEntry {
                    key: key.to_string(),
                    value: MetadataValue::infer(value),
                });
            }
        }
    }

    fn flush(&mut self) {
        let heading = self.heading.take();
        let raw = std::mem::take(&mut self.text);
        let text = raw.replace('\n', " ");
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.doc.blocks.push(match heading {
            Some(level) => Block::Heading {
                level,
                text: text.to_string(),
            },
            None => Block::Paragraph(text.to_string()),
        });
    }

    fn finish(mut self) -> Document {
        self.flush();
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_types_are_inferred() {
        assert_eq!(MetadataValue::infer("42").type_name(), "number");
        assert_eq!(MetadataValue::infer(" 2024-02-29 ").type_name(), "date");
        assert_eq!(MetadataValue::infer("2024-13-01").type_name(), "text");
        assert_eq!(MetadataValue::infer("true"), MetadataValue::Checkbox(true));
        assert_eq!(
            MetadataValue::infer("[a, 'b', \"c\"]"),
            MetadataValue::List(vec!["a".into(), "b".into(), "c".into()])
        );
        assert_eq!(
            MetadataValue::infer("\"quoted\""),
            MetadataValue::Text("quoted".into())
        );
    }

    #[test]
    fn metadata_display_is_compact() {
        assert_eq!(MetadataValue::Number(3.0).display(), "3");
        assert_eq!(MetadataValue::Number(2.5).display(), "2.5");
        assert_eq!(
            MetadataValue::List(vec!["x".into(), "y".into()]).display(),
            "x, y"
        );
    }

    #[test]
    fn markdown_reader_splits_front_matter_headings_and_paragraphs() {
        let source = "---\ntags: [quote, daily]\ncreated: 2024-05-01\n---\n\
                      # Title here\n\nFirst line\ncontinues here.\n\nSecond paragraph.\n";
        let doc = Document::from_markdown("note", source);
        assert_eq!(doc.title, "note");
        assert_eq!(doc.front_matter.len(), 2);
        assert_eq!(doc.front_matter[0].key, "tags");
        assert_eq!(doc.front_matter[1].value.type_name(), "date");
        assert_eq!(
            doc.blocks,
            vec![
                Block::Heading {
                    level: 1,
                    text: "Title here".into()
                },
                Block::Paragraph("First line continues here.".into()),
                Block::Paragraph("Second paragraph.".into()),
            ]
        );
        assert_eq!(doc.paragraphs().count(), 2);
    }

    #[test]
    fn hashtags_are_not_headings() {
        let doc = Document::from_markdown("t", "#tag inline");
        assert_eq!(doc.blocks, vec![Block::Paragraph("#tag inline".into())]);
    }

    #[test]
    fn inline_markup_is_reduced_to_text() {
        let source = "Some **bold** and `code` and [link](http://x.y)\n\n- one\n- two\n";
        let doc = Document::from_markdown("n", source);
        assert_eq!(
            doc.blocks,
            vec![
                Block::Paragraph("Some bold and code and link".into()),
                Block::Paragraph("one".into()),
                Block::Paragraph("two".into()),
            ]
        );
    }

    #[test]
    fn nested_list_items_stay_separate() {
        let doc = Document::from_markdown("n", "- outer\n  - inner\n");
        assert_eq!(
            doc.blocks,
            vec![
                Block::Paragraph("outer".into()),
                Block::Paragraph("inner".into()),
            ]
        );
    }

    #[test]
    fn heading_markup_is_stripped() {
        let doc = Document::from_markdown("n", "## A *quiet* title\n\nBody.");
        assert_eq!(
            doc.blocks[0],
            Block::Heading {
                level: 2,
                text: "A quiet title".into()
            }
        );
    }
}
