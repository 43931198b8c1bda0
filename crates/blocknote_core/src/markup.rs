//! Text conversions for blocks: markdown-like import/export and markup
//! rendering.
//!
//! # Invariants
//! - Parsing is line-oriented; the first matching rule wins and blank lines
//!   produce no block.
//! - `order` of parsed blocks counts emitted blocks only, from zero.
//! - Rendered markup escapes block content. `properties.url` is inserted
//!   verbatim for image and bookmark blocks.

use crate::model::block::{Block, BlockType, NewBlock, PROP_CHECKED};
use once_cell::sync::Lazy;
use regex::Regex;

static NUMBERED_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+\. ").expect("valid numbered item regex"));

const DIVIDER_LINE: &str = "---";
const CODE_FENCE: &str = "```";

/// Parses markdown-like text into unsaved blocks.
///
/// Rules, in order: `# `, `## `, `### `, `- [ ] `, `- [x] `, `- `,
/// `<ascii digits>. `, `> `, a leading code fence, a line that is exactly `---`,
/// otherwise paragraph. Lines are trimmed first.
pub fn parse_text_to_blocks(text: &str) -> Vec<NewBlock> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(order, line)| parse_line(line).with_order(order as i64))
        .collect()
}

fn parse_line(line: &str) -> NewBlock {
    if let Some(rest) = line.strip_prefix("# ") {
        return NewBlock::new(BlockType::Heading1, rest);
    }
    if let Some(rest) = line.strip_prefix("## ") {
        return NewBlock::new(BlockType::Heading2, rest);
    }
    if let Some(rest) = line.strip_prefix("### ") {
        return NewBlock::new(BlockType::Heading3, rest);
    }
    if let Some(rest) = line.strip_prefix("- [ ] ") {
        return NewBlock::new(BlockType::ToDo, rest).with_property(PROP_CHECKED, false);
    }
    if let Some(rest) = line.strip_prefix("- [x] ") {
        return NewBlock::new(BlockType::ToDo, rest).with_property(PROP_CHECKED, true);
    }
    if let Some(rest) = line.strip_prefix("- ") {
        return NewBlock::new(BlockType::BulletedListItem, rest);
    }
    if let Some(found) = NUMBERED_ITEM_RE.find(line) {
        return NewBlock::new(BlockType::NumberedListItem, &line[found.end()..]);
    }
    if let Some(rest) = line.strip_prefix("> ") {
        return NewBlock::new(BlockType::Quote, rest);
    }
    if let Some(rest) = line.strip_prefix(CODE_FENCE) {
        return NewBlock::new(BlockType::Code, rest);
    }
    if line == DIVIDER_LINE {
        return NewBlock::new(BlockType::Divider, "");
    }
    NewBlock::new(BlockType::Paragraph, line)
}

/// Renders blocks back to the markdown-like text form, one line per block.
///
/// Numbered items are renumbered from 1 within each consecutive run. Image
/// and bookmark blocks use link syntax, which parses back as paragraphs.
pub fn blocks_to_text(blocks: &[Block]) -> String {
    let mut lines = Vec::with_capacity(blocks.len());
    let mut run = 0usize;

    for block in blocks {
        run = if block.kind == BlockType::NumberedListItem {
            run + 1
        } else {
            0
        };
        let content = block.content.as_str();
        let line = match block.kind {
            BlockType::Paragraph => content.to_string(),
            BlockType::Heading1 => format!("# {content}"),
            BlockType::Heading2 => format!("## {content}"),
            BlockType::Heading3 => format!("### {content}"),
            BlockType::BulletedListItem => format!("- {content}"),
            BlockType::NumberedListItem => format!("{run}. {content}"),
            BlockType::ToDo => {
                let mark = if block.checked() { 'x' } else { ' ' };
                format!("- [{mark}] {content}")
            }
            BlockType::Quote => format!("> {content}"),
            BlockType::Code => format!("{CODE_FENCE}{content}"),
            BlockType::Divider => DIVIDER_LINE.to_string(),
            BlockType::Image => format!("![{content}]({})", block.url().unwrap_or_default()),
            BlockType::Bookmark => format!("[{content}]({})", block.url().unwrap_or_default()),
        };
        lines.push(line);
    }

    lines.join("\n")
}

/// Renders one block as a markup fragment.
pub fn block_to_markup(block: &Block) -> String {
    let content = escape_markup(&block.content);
    // Not escaped.
    let url = block.url().unwrap_or_default();

    match block.kind {
        BlockType::Paragraph => format!(r#"<p class="notion-paragraph">{content}</p>"#),
        BlockType::Heading1 => format!(r#"<h1 class="notion-heading-1">{content}</h1>"#),
        BlockType::Heading2 => format!(r#"<h2 class="notion-heading-2">{content}</h2>"#),
        BlockType::Heading3 => format!(r#"<h3 class="notion-heading-3">{content}</h3>"#),
        BlockType::BulletedListItem => format!(r#"<li class="notion-bullet-item">{content}</li>"#),
        BlockType::NumberedListItem => {
            format!(r#"<li class="notion-numbered-item">{content}</li>"#)
        }
        BlockType::ToDo => {
            let checked = if block.checked() { " checked" } else { "" };
            format!(
                r#"<div class="notion-todo"><input type="checkbox"{checked} disabled> {content}</div>"#
            )
        }
        BlockType::Quote => format!(r#"<blockquote class="notion-quote">{content}</blockquote>"#),
        BlockType::Code => format!(r#"<pre class="notion-code"><code>{content}</code></pre>"#),
        BlockType::Divider => r#"<hr class="notion-divider">"#.to_string(),
        BlockType::Image => format!(r#"<img src="{url}" alt="{content}" class="notion-image">"#),
        BlockType::Bookmark => {
            format!(r#"<a href="{url}" target="_blank" class="notion-link">{content}</a>"#)
        }
    }
}

/// Renders blocks in order, one fragment per line.
pub fn blocks_to_markup(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(block_to_markup)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escapes `& < > " '` for use in element text and attribute values.
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{
        block_to_markup, blocks_to_markup, blocks_to_text, escape_markup, parse_text_to_blocks,
    };
    use crate::model::block::{Block, BlockType, NewBlock};
    use uuid::Uuid;

    fn block(input: NewBlock) -> Block {
        Block::create(Uuid::new_v4(), input, 1).unwrap()
    }

    fn kinds_and_content(blocks: &[NewBlock]) -> Vec<(BlockType, &str)> {
        blocks
            .iter()
            .map(|b| (b.kind, b.content.as_str()))
            .collect()
    }

    #[test]
    fn parses_mixed_document_and_skips_blank_lines() {
        let parsed = parse_text_to_blocks(
            "# Title\n\nSome text\n- item1\n- [ ] todo1\n- [x] todo2\n> quoted\n---\n",
        );
        assert_eq!(
            kinds_and_content(&parsed),
            vec![
                (BlockType::Heading1, "Title"),
                (BlockType::Paragraph, "Some text"),
                (BlockType::BulletedListItem, "item1"),
                (BlockType::ToDo, "todo1"),
                (BlockType::ToDo, "todo2"),
                (BlockType::Quote, "quoted"),
                (BlockType::Divider, ""),
            ]
        );
        assert!(!parsed[3].checked());
        assert!(parsed[4].checked());
        assert_eq!(parsed[3].properties["checked"], serde_json::json!(false));
        let orders: Vec<i64> = parsed.iter().map(|b| b.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn parses_headings_numbered_items_and_code() {
        let parsed = parse_text_to_blocks(
            "## Two\n### Three\n12. twelfth\n\u{0663}. arabic-indic\n```rust\n1.no space",
        );
        assert_eq!(
            kinds_and_content(&parsed),
            vec![
                (BlockType::Heading2, "Two"),
                (BlockType::Heading3, "Three"),
                (BlockType::NumberedListItem, "twelfth"),
                (BlockType::Paragraph, "\u{0663}. arabic-indic"),
                (BlockType::Code, "rust"),
                (BlockType::Paragraph, "1.no space"),
            ]
        );
    }

    #[test]
    fn lines_are_trimmed_and_divider_must_be_exact() {
        let parsed = parse_text_to_blocks("   - spaced  \r\n----\n#nospace");
        assert_eq!(
            kinds_and_content(&parsed),
            vec![
                (BlockType::BulletedListItem, "spaced"),
                (BlockType::Paragraph, "----"),
                (BlockType::Paragraph, "#nospace"),
            ]
        );
    }

    #[test]
    fn markup_escapes_content_for_every_type() {
        for kind in BlockType::ALL {
            if kind == BlockType::Divider {
                continue;
            }
            let rendered = block_to_markup(&block(NewBlock::new(kind, "<b>&</b>")));
            assert!(
                rendered.contains("&lt;b&gt;&amp;&lt;/b&gt;"),
                "{kind:?}: {rendered}"
            );
            assert!(!rendered.contains("<b>"), "{kind:?}: {rendered}");
        }
    }

    #[test]
    fn markup_keeps_url_verbatim_for_image_and_bookmark() {
        let url = r#"https://example.com/?a=1&b="x""#;
        let image = block(NewBlock::new(BlockType::Image, "alt").with_property("url", url));
        let link = block(NewBlock::new(BlockType::Bookmark, "site").with_property("url", url));
        assert_eq!(
            block_to_markup(&image),
            format!(r#"<img src="{url}" alt="alt" class="notion-image">"#)
        );
        assert_eq!(
            block_to_markup(&link),
            format!(r#"<a href="{url}" target="_blank" class="notion-link">site</a>"#)
        );
    }

    #[test]
    fn todo_markup_reflects_checked_state() {
        let done = block(NewBlock::new(BlockType::ToDo, "ship").with_property("checked", true));
        let open = block(NewBlock::new(BlockType::ToDo, "ship"));
        assert_eq!(
            block_to_markup(&done),
            r#"<div class="notion-todo"><input type="checkbox" checked disabled> ship</div>"#
        );
        assert_eq!(
            block_to_markup(&open),
            r#"<div class="notion-todo"><input type="checkbox" disabled> ship</div>"#
        );
    }

    #[test]
    fn divider_ignores_content() {
        let divider = block(NewBlock::new(BlockType::Divider, "ignored"));
        assert_eq!(block_to_markup(&divider), r#"<hr class="notion-divider">"#);
    }

    #[test]
    fn text_export_parses_back_to_same_blocks() {
        let source = "# Plan\nintro\n- a\n1. first\n2. second\n- [x] done\n- [ ] open\n> q\n```sh\n---";
        let blocks: Vec<Block> = parse_text_to_blocks(source)
            .into_iter()
            .map(block)
            .collect();
        let exported = blocks_to_text(&blocks);
        assert_eq!(exported, source);
    }

    #[test]
    fn numbered_items_restart_after_other_blocks() {
        let blocks: Vec<Block> = ["7. a", "9. b", "text", "4. c"]
            .iter()
            .flat_map(|line| parse_text_to_blocks(line))
            .map(block)
            .collect();
        assert_eq!(blocks_to_text(&blocks), "1. a\n2. b\ntext\n1. c");
    }

    #[test]
    fn blocks_to_markup_joins_fragments_in_order() {
        let blocks = vec![
            block(NewBlock::new(BlockType::Heading1, "A")),
            block(NewBlock::new(BlockType::Paragraph, "b")),
        ];
        assert_eq!(
            blocks_to_markup(&blocks),
            "<h1 class=\"notion-heading-1\">A</h1>\n<p class=\"notion-paragraph\">b</p>"
        );
    }

    #[test]
    fn escape_markup_covers_quotes() {
        assert_eq!(escape_markup(r#"a"b'c"#), "a&quot;b&#39;c");
    }
}
