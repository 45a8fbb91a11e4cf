//! Markdown semantic chunker (§4.D)
//!
//! Header-respecting, code-fence-atomic, token-budgeted splitting. Token
//! counting is a whitespace/word heuristic (`words * 1.3`), matching how
//! the corpus estimates tokens when no tokenizer crate is pulled in.

use crate::memory::ChunkMetadata;

#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChunkError {
    #[error("document is empty")]
    EmptyDocument,
}

pub type Result<T> = std::result::Result<T, ChunkError>;

/// A chunk before it is persisted (no `id`/`documentId`/`vectorId` yet —
/// those are assigned by the storage layer).
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub content: String,
    pub token_count: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub metadata: ChunkMetadata,
}

pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    ((words as f32) * 1.3).ceil() as usize
}

#[derive(Debug, Clone)]
struct Line {
    text: String,
    /// 1-based line number in the original document.
    number: usize,
}

#[derive(Debug, Clone, Default)]
struct HeaderStack {
    // index 0 = depth 1, etc.
    levels: Vec<String>,
}

impl HeaderStack {
    fn push(&mut self, depth: usize, text: String) {
        self.levels.truncate(depth - 1);
        self.levels.resize(depth - 1, String::new());
        self.levels.push(text);
    }

    fn headers(&self) -> Vec<String> {
        self.levels.iter().filter(|s| !s.is_empty()).cloned().collect()
    }

    fn level(&self) -> usize {
        self.levels.len()
    }
}

struct Section {
    headers: Vec<String>,
    level: usize,
    lines: Vec<Line>,
    has_code_block: bool,
}

/// Splits `document` into an ordered sequence of chunks per §4.D's seven
/// rules. `max_tokens` bounds a section's size before it is split further
/// by line boundaries.
pub fn chunk_markdown(document: &str, max_tokens: usize) -> Result<Vec<RawChunk>> {
    if document.is_empty() {
        return Err(ChunkError::EmptyDocument);
    }

    let normalized = document.replace("\r\n", "\n");
    let (frontmatter, body, body_line_offset) = extract_frontmatter(&normalized);

    let lines: Vec<Line> = body
        .split('\n')
        .enumerate()
        .map(|(i, text)| Line {
            text: text.to_string(),
            number: body_line_offset + i + 1,
        })
        .collect();

    let sections = split_into_sections(&lines);

    let mut chunks = Vec::new();
    let mut offset = 0usize;
    let mut first_section = true;

    for section in sections {
        let section_text = section.lines.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join("\n");
        let token_count = estimate_tokens(&section_text);

        let pieces = if token_count > max_tokens {
            split_section_by_lines(&section, max_tokens)
        } else {
            vec![section.lines.clone()]
        };

        for piece in pieces {
            if piece.is_empty() {
                continue;
            }
            let content = piece.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join("\n");
            let start_line = piece.first().unwrap().number;
            let end_line = piece.last().unwrap().number;
            let len = content.len();

            let mut full_content = content.clone();
            let has_frontmatter = first_section && frontmatter.is_some();
            if has_frontmatter {
                full_content = format!("{}\n{}", frontmatter.as_deref().unwrap_or(""), content);
            }

            chunks.push(RawChunk {
                token_count: estimate_tokens(&full_content),
                start_offset: offset,
                end_offset: offset + len,
                metadata: ChunkMetadata {
                    headers: section.headers.clone(),
                    level: section.level,
                    start_line,
                    end_line,
                    has_frontmatter,
                    has_code_block: section.has_code_block,
                },
                content: full_content,
            });
            offset += len;
            first_section = false;
        }
    }

    Ok(chunks)
}

/// Rule 1: a `---`-delimited frontmatter block at the very start of the
/// document is preserved intact and excluded from header/section scanning.
fn extract_frontmatter(document: &str) -> (Option<String>, &str, usize) {
    if !document.starts_with("---\n") && document != "---" {
        return (None, document, 0);
    }
    let rest = &document[4.min(document.len())..];
    if let Some(end) = rest.find("\n---") {
        let frontmatter_body = &rest[..end];
        let frontmatter = format!("---\n{frontmatter_body}\n---");
        let consumed_lines = frontmatter.matches('\n').count() + 1;
        let after = &rest[end + 4..];
        let after = after.strip_prefix('\n').unwrap_or(after);
        return (Some(frontmatter), after, consumed_lines);
    }
    (None, document, 0)
}

fn is_fence_delimiter(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

fn header_depth(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let depth = trimmed.chars().take_while(|c| *c == '#').count();
    let rest = trimmed[depth..].trim();
    if depth == 0 || depth > 6 || rest.is_empty() {
        return None;
    }
    Some((depth, rest.to_string()))
}

/// Rules 2, 3, 6: scans line by line, tracking fence state so headers
/// inside fences are never recognized and an unclosed fence swallows the
/// rest of the document as one code block.
fn split_into_sections(lines: &[Line]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack = HeaderStack::default();
    let mut current: Vec<Line> = Vec::new();
    let mut current_has_code_block = false;
    let mut in_fence = false;

    let flush = |sections: &mut Vec<Section>, current: &mut Vec<Line>, stack: &HeaderStack, has_code: &mut bool| {
        if !current.is_empty() {
            sections.push(Section {
                headers: stack.headers(),
                level: stack.level(),
                lines: std::mem::take(current),
                has_code_block: *has_code,
            });
        }
        *has_code = false;
    };

    for line in lines {
        if is_fence_delimiter(&line.text) {
            in_fence = !in_fence;
            current_has_code_block = true;
            current.push(line.clone());
            continue;
        }

        if in_fence {
            current.push(line.clone());
            continue;
        }

        if let Some((depth, text)) = header_depth(&line.text) {
            flush(&mut sections, &mut current, &stack, &mut current_has_code_block);
            stack.push(depth, text);
            current.push(line.clone());
            continue;
        }

        current.push(line.clone());
    }
    flush(&mut sections, &mut current, &stack, &mut current_has_code_block);

    if sections.is_empty() && !lines.is_empty() {
        sections.push(Section {
            headers: vec![],
            level: 0,
            lines: lines.to_vec(),
            has_code_block: false,
        });
    }

    sections
}

/// Rule 4: a section larger than `max_tokens` splits by line boundaries
/// (paragraph breaks preferred), never cutting inside a fenced code block.
/// A blank line is the preferred split point; a stretch of continuous
/// prose with no blank line before the budget is exceeded still gets a
/// hard split at the offending line, so the budget is never silently
/// blown through for lack of a paragraph break.
fn split_section_by_lines(section: &Section, max_tokens: usize) -> Vec<Vec<Line>> {
    let mut pieces = Vec::new();
    let mut current: Vec<Line> = Vec::new();
    let mut in_fence = false;

    for line in &section.lines {
        if is_fence_delimiter(&line.text) {
            in_fence = !in_fence;
            current.push(line.clone());
            continue;
        }

        if in_fence {
            current.push(line.clone());
            continue;
        }

        let would_be = current
            .iter()
            .chain(std::iter::once(line))
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if estimate_tokens(&would_be) > max_tokens && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            if line.text.trim().is_empty() {
                continue;
            }
        }
        current.push(line.clone());
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    if pieces.is_empty() {
        pieces.push(section.lines.clone());
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_an_error() {
        assert!(matches!(chunk_markdown("", 100), Err(ChunkError::EmptyDocument)));
    }

    #[test]
    fn frontmatter_is_attached_to_first_chunk() {
        let doc = "---\ntitle: Foo\n---\n# Heading\nbody text";
        let chunks = chunk_markdown(doc, 1000).unwrap();
        assert!(chunks[0].metadata.has_frontmatter);
        assert!(chunks[0].content.contains("title: Foo"));
    }

    #[test]
    fn code_fence_is_never_split_even_if_over_budget() {
        let doc = format!("# H\n```\n{}\n```\n", "line\n".repeat(50));
        let chunks = chunk_markdown(&doc, 5).unwrap();
        let fenced = chunks.iter().find(|c| c.metadata.has_code_block).unwrap();
        assert!(fenced.content.contains("```"));
        assert_eq!(fenced.content.matches("```").count(), 2);
    }

    #[test]
    fn continuous_paragraph_with_no_blank_line_still_hard_splits() {
        let lines: Vec<String> = (0..40).map(|i| format!("paragraph line number {i} keeps going on")).collect();
        let doc = format!("# H\n{}\n", lines.join("\n"));
        let chunks = chunk_markdown(&doc, 20).unwrap();
        assert!(chunks.len() > 1, "an unbroken paragraph over budget must still be split by line count");
        assert!(chunks.iter().all(|c| c.token_count <= 20 * 2), "no piece should balloon past the budget");
    }

    #[test]
    fn headers_inside_fences_are_not_recognized() {
        let doc = "# Real\n```\n# not a header\n```\nbody";
        let chunks = chunk_markdown(doc, 1000).unwrap();
        assert!(chunks.iter().all(|c| c.metadata.headers == vec!["Real".to_string()]));
    }

    #[test]
    fn sibling_headers_do_not_leak_hierarchy() {
        let doc = "# A\n## B\ntext b\n## C\ntext c\n";
        let chunks = chunk_markdown(doc, 1000).unwrap();
        let c_chunk = chunks.iter().find(|c| c.content.contains("text c")).unwrap();
        assert_eq!(c_chunk.metadata.headers, vec!["A".to_string(), "C".to_string()]);
    }

    #[test]
    fn unclosed_fence_is_tolerated_as_one_code_block() {
        let doc = "# H\n```\nunterminated\nmore code\n";
        let chunks = chunk_markdown(doc, 1000).unwrap();
        assert!(chunks.iter().any(|c| c.metadata.has_code_block));
    }

    #[test]
    fn windows_line_endings_are_normalized() {
        let doc = "# H\r\nbody\r\n";
        let chunks = chunk_markdown(doc, 1000).unwrap();
        assert!(!chunks[0].content.contains('\r'));
    }

    #[test]
    fn line_numbers_are_one_based() {
        let doc = "# H\nfirst\nsecond\n";
        let chunks = chunk_markdown(doc, 1000).unwrap();
        assert_eq!(chunks[0].metadata.start_line, 1);
    }
}
