//! Incremental XML-tag parser for streamed assistant messages.
//!
//! Consumes text chunks as they arrive and maintains a continuously-updated
//! list of [`ContentBlock`]s. Tag vocabularies (tool names and parameter
//! names) are fixed at construction; recreate the parser per turn if the
//! tool set changes.
//!
//! Matching is pure suffix-of-accumulator testing against the registered
//! vocabulary, candidates checked in registration order with the first
//! match winning. A span shaped like a tag whose name is not registered is
//! never opened — it stays literal text. The flip side is that free-text
//! prose which happens to contain a registered tag string will open a
//! block; this best-effort behavior is deliberate and matches how models
//! are prompted to emit tool calls.

use std::collections::HashSet;

use crate::error::{Result, SableError};
use crate::types::{ContentBlock, ToolUse};

/// Hard ceiling on total accumulated stream bytes. Exceeding it fails the
/// parse — bounds memory under a runaway stream.
pub const MAX_ACCUMULATOR_BYTES: usize = 1024 * 1024;

/// Soft ceiling on a single parameter value. Exceeding it abandons the
/// parameter and resumes scanning rather than failing the whole parse.
pub const MAX_PARAM_VALUE_BYTES: usize = 100 * 1024;

/// The parameter name given substring-extraction treatment on tool close,
/// because file payloads routinely contain text that would confuse the
/// incremental scanner. Applies only to tools registered via
/// [`AssistantMessageParser::with_raw_content_tools`].
pub const RAW_CONTENT_PARAM: &str = "content";

#[derive(Debug, Clone)]
struct TagPair {
    name: String,
    open: String,
    close: String,
}

impl TagPair {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            open: format!("<{name}>"),
            close: format!("</{name}>"),
        }
    }
}

#[derive(Debug, Clone)]
enum ParseState {
    /// Scanning free text for a tool open tag.
    Text,
    /// Inside a tool, scanning for a parameter open tag or the tool close.
    InTool {
        block: usize,
        /// Byte offset where the tool body begins (just past the open tag).
        body_start: usize,
    },
    /// Inside a parameter value.
    InParam {
        block: usize,
        body_start: usize,
        param: usize,
        /// Byte offset where the value begins.
        value_start: usize,
    },
}

/// Streaming assistant-message parser.
///
/// [`process_chunk`](Self::process_chunk) may be called repeatedly with
/// disjoint chunks and produces the same blocks as one call with their
/// concatenation.
#[derive(Debug)]
pub struct AssistantMessageParser {
    tools: Vec<TagPair>,
    params: Vec<TagPair>,
    /// Tools whose declared `content` parameter is re-extracted by
    /// substring on tool close.
    raw_content_tools: HashSet<String>,
    accumulator: String,
    /// Byte offset up to which the accumulator has been scanned.
    scanned: usize,
    /// Byte offset where the current text run begins.
    text_start: usize,
    blocks: Vec<ContentBlock>,
    state: ParseState,
    finalized: bool,
}

impl AssistantMessageParser {
    /// Build a parser over fixed tool and parameter name vocabularies.
    ///
    /// Registration order is the tie-break order for suffix matching.
    pub fn new<S: AsRef<str>>(tool_names: &[S], param_names: &[S]) -> Self {
        Self {
            tools: tool_names.iter().map(|n| TagPair::new(n.as_ref())).collect(),
            params: param_names
                .iter()
                .map(|n| TagPair::new(n.as_ref()))
                .collect(),
            raw_content_tools: HashSet::new(),
            accumulator: String::new(),
            scanned: 0,
            text_start: 0,
            blocks: Vec::new(),
            state: ParseState::Text,
            finalized: false,
        }
    }

    /// Register the tools whose `content` parameter carries a raw payload
    /// (file writers and the like). Only these get the substring
    /// re-extraction on tool close; other tools parse `content` like any
    /// other parameter.
    pub fn with_raw_content_tools<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.raw_content_tools = names.iter().map(|n| n.as_ref().to_string()).collect();
        self
    }

    /// Append a chunk and advance the state machine, returning the current
    /// (possibly still-partial) block list.
    pub fn process_chunk(&mut self, chunk: &str) -> Result<&[ContentBlock]> {
        if self.finalized {
            return Err(SableError::InvalidState(
                "parser already finalized; call reset() before reuse".into(),
            ));
        }
        if self.accumulator.len() + chunk.len() > MAX_ACCUMULATOR_BYTES {
            return Err(SableError::Parse(format!(
                "assistant message exceeded the {MAX_ACCUMULATOR_BYTES}-byte stream limit"
            )));
        }
        self.accumulator.push_str(chunk);
        self.scan();
        self.refresh_partial_views();
        Ok(&self.blocks)
    }

    /// Current block list without processing new input.
    pub fn content_blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    /// Mark the stream ended: flush pending text, clear every block's
    /// partial flag, and trim whitespace on text blocks.
    pub fn finalize_content_blocks(&mut self) -> &[ContentBlock] {
        if self.finalized {
            return &self.blocks;
        }
        match self.state.clone() {
            ParseState::Text => self.flush_text(self.accumulator.len()),
            ParseState::InTool { .. } => {}
            ParseState::InParam {
                block,
                param,
                value_start,
                ..
            } => {
                let name = self.params[param].name.clone();
                let value = trim_param_value(&self.accumulator[value_start..]);
                self.tool_mut(block).params.insert(name, value);
            }
        }
        for block in &mut self.blocks {
            match block {
                ContentBlock::Text { content, partial } => {
                    *content = content.trim().to_string();
                    *partial = false;
                }
                ContentBlock::ToolUse(tool) => tool.partial = false,
            }
        }
        self.blocks.retain(|b| match b {
            ContentBlock::Text { content, .. } => !content.is_empty(),
            ContentBlock::ToolUse(_) => true,
        });
        self.finalized = true;
        &self.blocks
    }

    /// Clear all state for reuse.
    pub fn reset(&mut self) {
        self.accumulator.clear();
        self.scanned = 0;
        self.text_start = 0;
        self.blocks.clear();
        self.state = ParseState::Text;
        self.finalized = false;
    }

    /// The raw accumulated assistant text, exactly as streamed.
    pub fn raw_text(&self) -> &str {
        &self.accumulator
    }

    // -- state machine --

    fn scan(&mut self) {
        while self.scanned < self.accumulator.len() {
            // Advance one character; `pos` is the boundary just past it.
            let ch = self.accumulator[self.scanned..]
                .chars()
                .next()
                .expect("scanned is a char boundary");
            let pos = self.scanned + ch.len_utf8();
            self.step(pos);
            self.scanned = pos;
        }
    }

    fn step(&mut self, pos: usize) {
        let seen = &self.accumulator[..pos];
        match self.state.clone() {
            ParseState::Text => {
                let matched = self
                    .tools
                    .iter()
                    .position(|t| seen.ends_with(&t.open));
                if let Some(idx) = matched {
                    let open_len = self.tools[idx].open.len();
                    self.flush_text(pos - open_len);
                    let name = self.tools[idx].name.clone();
                    self.blocks.push(ContentBlock::ToolUse(ToolUse::new(name)));
                    self.state = ParseState::InTool {
                        block: self.blocks.len() - 1,
                        body_start: pos,
                    };
                }
            }
            ParseState::InTool { block, body_start } => {
                let tool_idx = self.tool_index(block);
                if seen.ends_with(&self.tools[tool_idx].close) {
                    self.close_tool(block, body_start, pos - self.tools[tool_idx].close.len());
                    self.state = ParseState::Text;
                    self.text_start = pos;
                    return;
                }
                let matched = self
                    .params
                    .iter()
                    .position(|p| seen.ends_with(&p.open));
                if let Some(idx) = matched {
                    self.state = ParseState::InParam {
                        block,
                        body_start,
                        param: idx,
                        value_start: pos,
                    };
                }
            }
            ParseState::InParam {
                block,
                body_start,
                param,
                value_start,
            } => {
                let close = &self.params[param].close;
                if seen.ends_with(close) {
                    let value =
                        trim_param_value(&self.accumulator[value_start..pos - close.len()]);
                    let name = self.params[param].name.clone();
                    self.tool_mut(block).params.insert(name, value);
                    self.state = ParseState::InTool { block, body_start };
                } else if pos - value_start > MAX_PARAM_VALUE_BYTES {
                    // Oversized value: abandon this parameter, keep the tool.
                    let name = self.params[param].name.clone();
                    self.tool_mut(block).params.remove(&name);
                    self.state = ParseState::InTool { block, body_start };
                }
            }
        }
    }

    /// Close the current text run at `end`, trimming the speculatively
    /// included partial-tag text, and finalize the block.
    fn flush_text(&mut self, end: usize) {
        let start = self.text_start.min(end);
        let content = self.accumulator[start..end].trim().to_string();
        self.remove_pending_text_block();
        if !content.is_empty() {
            self.blocks.push(ContentBlock::Text {
                content,
                partial: false,
            });
        }
    }

    fn close_tool(&mut self, block: usize, body_start: usize, body_end: usize) {
        // A raw content payload commonly contains tag-shaped text; once the
        // tool close is seen, re-extract it by substring between the first
        // open and the last close rather than trusting incremental scanning.
        let is_raw_content_tool = match &self.blocks[block] {
            ContentBlock::ToolUse(tool) => self.raw_content_tools.contains(&tool.name),
            _ => false,
        };
        if is_raw_content_tool {
            let body = &self.accumulator[body_start..body_end];
            let open = format!("<{RAW_CONTENT_PARAM}>");
            let close = format!("</{RAW_CONTENT_PARAM}>");
            if let (Some(open_at), Some(close_at)) = (body.find(&open), body.rfind(&close)) {
                let value_start = open_at + open.len();
                if value_start <= close_at {
                    let value = trim_param_value(&body[value_start..close_at]);
                    self.tool_mut(block)
                        .params
                        .insert(RAW_CONTENT_PARAM.to_string(), value);
                }
            }
        }
        let tool = self.tool_mut(block);
        tool.partial = false;
    }

    /// Update the in-progress text block and accumulating parameter value so
    /// callers see partial content after every chunk.
    fn refresh_partial_views(&mut self) {
        match self.state.clone() {
            ParseState::Text => {
                let pending = self.accumulator[self.text_start..].trim().to_string();
                match self.blocks.last_mut() {
                    Some(ContentBlock::Text { content, partial }) if *partial => {
                        if pending.is_empty() {
                            self.blocks.pop();
                        } else {
                            *content = pending;
                        }
                    }
                    _ => {
                        if !pending.is_empty() {
                            self.blocks.push(ContentBlock::Text {
                                content: pending,
                                partial: true,
                            });
                        }
                    }
                }
            }
            ParseState::InParam {
                block,
                param,
                value_start,
                ..
            } => {
                let value = trim_param_value(&self.accumulator[value_start..]);
                let name = self.params[param].name.clone();
                self.tool_mut(block).params.insert(name, value);
            }
            ParseState::InTool { .. } => {}
        }
    }

    fn remove_pending_text_block(&mut self) {
        if matches!(
            self.blocks.last(),
            Some(ContentBlock::Text { partial: true, .. })
        ) {
            self.blocks.pop();
        }
    }

    fn tool_index(&self, block: usize) -> usize {
        let name = match &self.blocks[block] {
            ContentBlock::ToolUse(tool) => &tool.name,
            _ => unreachable!("state points at a tool block"),
        };
        self.tools
            .iter()
            .position(|t| &t.name == name)
            .expect("open tool came from the registered vocabulary")
    }

    fn tool_mut(&mut self, block: usize) -> &mut ToolUse {
        match &mut self.blocks[block] {
            ContentBlock::ToolUse(tool) => tool,
            _ => unreachable!("state points at a tool block"),
        }
    }
}

/// Names that appear more than once across vocabularies are kept once, in
/// first-seen order.
pub fn dedup_names(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

/// Trim a closed parameter value: exactly one leading and one trailing
/// newline for multi-line payloads, all surrounding whitespace otherwise.
fn trim_param_value(raw: &str) -> String {
    if raw.contains('\n') {
        let s = raw
            .strip_prefix("\r\n")
            .or_else(|| raw.strip_prefix('\n'))
            .unwrap_or(raw);
        let s = s
            .strip_suffix("\r\n")
            .or_else(|| s.strip_suffix('\n'))
            .unwrap_or(s);
        s.to_string()
    } else {
        raw.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parser() -> AssistantMessageParser {
        AssistantMessageParser::new(
            &["read_file", "write_file", "execute_command", "attempt_completion"],
            &["path", "content", "command", "result"],
        )
        .with_raw_content_tools(&["write_file"])
    }

    fn finalize_one_shot(input: &str) -> Vec<ContentBlock> {
        let mut p = parser();
        p.process_chunk(input).unwrap();
        p.finalize_content_blocks().to_vec()
    }

    fn finalize_chunked(input: &str, chunk_size: usize) -> Vec<ContentBlock> {
        let mut p = parser();
        let chars: Vec<char> = input.chars().collect();
        for chunk in chars.chunks(chunk_size) {
            let s: String = chunk.iter().collect();
            p.process_chunk(&s).unwrap();
        }
        p.finalize_content_blocks().to_vec()
    }

    #[test]
    fn plain_text_yields_single_text_block() {
        let blocks = finalize_one_shot("Just thinking out loud here.");
        assert_eq!(
            blocks,
            vec![ContentBlock::Text {
                content: "Just thinking out loud here.".into(),
                partial: false,
            }]
        );
    }

    #[test]
    fn parameter_round_trip() {
        let blocks = finalize_one_shot("<read_file><path>hello\nworld</path></read_file>");
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            ContentBlock::ToolUse(tool) => {
                assert_eq!(tool.name, "read_file");
                assert_eq!(tool.param("path"), Some("hello\nworld"));
                assert!(!tool.partial);
            }
            other => panic!("expected tool use, got {other:?}"),
        }
    }

    #[test]
    fn unregistered_tags_remain_literal_text() {
        let mut p = AssistantMessageParser::new(&["echo"], &["value"]);
        p.process_chunk("<foo>bar</foo>").unwrap();
        let blocks = p.finalize_content_blocks();
        assert_eq!(
            blocks,
            &[ContentBlock::Text {
                content: "<foo>bar</foo>".into(),
                partial: false,
            }]
        );
    }

    #[test]
    fn chunking_invariance_across_partitions() {
        let input = "I'll read that file.\n<read_file><path>src/main.rs</path></read_file>\nDone.";
        let whole = finalize_one_shot(input);
        for size in [1, 2, 3, 5, 7, 11, 64] {
            assert_eq!(finalize_chunked(input, size), whole, "chunk size {size}");
        }
    }

    #[test]
    fn text_before_and_after_tool_becomes_separate_blocks() {
        let blocks =
            finalize_one_shot("before <read_file><path>a</path></read_file> after");
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            blocks[0],
            ContentBlock::Text {
                content: "before".into(),
                partial: false
            }
        );
        assert!(matches!(blocks[1], ContentBlock::ToolUse(_)));
        assert_eq!(
            blocks[2],
            ContentBlock::Text {
                content: "after".into(),
                partial: false
            }
        );
    }

    #[test]
    fn partial_tool_is_marked_partial_until_closed() {
        let mut p = parser();
        let blocks = p.process_chunk("<read_file><path>src/li").unwrap();
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            ContentBlock::ToolUse(tool) => {
                assert!(tool.partial);
                assert_eq!(tool.param("path"), Some("src/li"));
            }
            other => panic!("expected tool use, got {other:?}"),
        }

        let blocks = p.process_chunk("b.rs</path></read_file>").unwrap();
        match &blocks[0] {
            ContentBlock::ToolUse(tool) => {
                assert!(!tool.partial);
                assert_eq!(tool.param("path"), Some("src/lib.rs"));
            }
            other => panic!("expected tool use, got {other:?}"),
        }
    }

    #[test]
    fn at_most_one_block_is_partial() {
        let mut p = parser();
        p.process_chunk("some prose <read_file><path>x").unwrap();
        let partial_count = p
            .content_blocks()
            .iter()
            .filter(|b| b.is_partial())
            .count();
        assert_eq!(partial_count, 1);
    }

    #[test]
    fn content_param_extracted_by_substring_on_close() {
        // The payload contains a premature close tag; the substring fixup
        // on tool close recovers the full value via the last close.
        let payload = "line one\n</content>\nline two";
        let input =
            format!("<write_file><path>x.txt</path><content>\n{payload}\n</content></write_file>");
        let blocks = finalize_one_shot(&input);
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            ContentBlock::ToolUse(tool) => {
                assert_eq!(tool.name, "write_file");
                assert_eq!(tool.param("content"), Some(payload));
            }
            other => panic!("expected tool use, got {other:?}"),
        }
    }

    #[test]
    fn content_fixup_applies_only_to_declaring_tools() {
        // A tool that does not declare a raw content parameter must not
        // grow one just because its body mentions the tag.
        let blocks = finalize_one_shot(
            "<execute_command><command>echo '<content>oops</content>'</command></execute_command>",
        );
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            ContentBlock::ToolUse(tool) => {
                assert_eq!(tool.name, "execute_command");
                assert_eq!(tool.param("command"), Some("echo '<content>oops</content>'"));
                assert_eq!(tool.param("content"), None);
            }
            other => panic!("expected tool use, got {other:?}"),
        }
    }

    #[test]
    fn multiline_content_trims_exactly_one_newline_each_side() {
        let input = "<write_file><path>a</path><content>\n\nbody\n\n</content></write_file>";
        let blocks = finalize_one_shot(input);
        match &blocks[0] {
            ContentBlock::ToolUse(tool) => {
                assert_eq!(tool.param("content"), Some("\nbody\n"));
            }
            other => panic!("expected tool use, got {other:?}"),
        }
    }

    #[test]
    fn single_line_param_trims_all_whitespace() {
        let blocks = finalize_one_shot("<read_file><path>  a.txt  </path></read_file>");
        match &blocks[0] {
            ContentBlock::ToolUse(tool) => assert_eq!(tool.param("path"), Some("a.txt")),
            other => panic!("expected tool use, got {other:?}"),
        }
    }

    #[test]
    fn oversized_param_is_abandoned_not_fatal() {
        let mut p = parser();
        p.process_chunk("<execute_command><command>").unwrap();
        let big = "x".repeat(MAX_PARAM_VALUE_BYTES + 10);
        p.process_chunk(&big).unwrap();
        p.process_chunk("</execute_command>").unwrap();
        let blocks = p.finalize_content_blocks();
        match &blocks[0] {
            ContentBlock::ToolUse(tool) => {
                assert!(!tool.partial);
                assert_eq!(tool.param("command"), None);
            }
            other => panic!("expected tool use, got {other:?}"),
        }
    }

    #[test]
    fn accumulator_ceiling_is_a_hard_error() {
        let mut p = parser();
        let big = "y".repeat(MAX_ACCUMULATOR_BYTES + 1);
        let err = p.process_chunk(&big).unwrap_err();
        assert!(matches!(err, SableError::Parse(_)));
    }

    #[test]
    fn registered_tag_inside_prose_still_opens_a_block() {
        // Documented best-effort behavior: suffix matching cannot tell a
        // discussed tag from an emitted one.
        let mut p = AssistantMessageParser::new(&["echo"], &["value"]);
        p.process_chunk("to call it, write <echo> like that").unwrap();
        let blocks = p.finalize_content_blocks();
        assert_eq!(
            blocks[0],
            ContentBlock::Text {
                content: "to call it, write".into(),
                partial: false
            }
        );
        assert!(matches!(
            &blocks[1],
            ContentBlock::ToolUse(t) if t.name == "echo"
        ));
    }

    #[test]
    fn finalize_trims_and_clears_partial_flags() {
        let mut p = parser();
        p.process_chunk("  trailing thought ").unwrap();
        let blocks = p.finalize_content_blocks();
        assert_eq!(
            blocks,
            &[ContentBlock::Text {
                content: "trailing thought".into(),
                partial: false,
            }]
        );
    }

    #[test]
    fn unterminated_param_keeps_accumulated_value_after_finalize() {
        let mut p = parser();
        p.process_chunk("<read_file><path>src/ma").unwrap();
        let blocks = p.finalize_content_blocks();
        match &blocks[0] {
            ContentBlock::ToolUse(tool) => {
                assert!(!tool.partial);
                assert_eq!(tool.param("path"), Some("src/ma"));
            }
            other => panic!("expected tool use, got {other:?}"),
        }
    }

    #[test]
    fn process_after_finalize_requires_reset() {
        let mut p = parser();
        p.process_chunk("hi").unwrap();
        p.finalize_content_blocks();
        assert!(matches!(
            p.process_chunk("more"),
            Err(SableError::InvalidState(_))
        ));

        p.reset();
        let blocks = p.process_chunk("fresh").unwrap();
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn multiple_tools_in_one_message() {
        let input = "<read_file><path>a</path></read_file><read_file><path>b</path></read_file>";
        let blocks = finalize_one_shot(input);
        assert_eq!(blocks.len(), 2);
        let paths: Vec<_> = blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse(t) => t.param("path"),
                _ => None,
            })
            .collect();
        assert_eq!(paths, vec!["a", "b"]);
    }

    #[test]
    fn raw_text_preserves_exact_stream() {
        let mut p = parser();
        p.process_chunk("abc <read_file>").unwrap();
        p.process_chunk("<path>x</path></read_file>").unwrap();
        assert_eq!(p.raw_text(), "abc <read_file><path>x</path></read_file>");
    }

    #[test]
    fn empty_chunks_are_harmless() {
        let mut p = parser();
        p.process_chunk("").unwrap();
        p.process_chunk("<read_file>").unwrap();
        p.process_chunk("").unwrap();
        p.process_chunk("<path>a</path></read_file>").unwrap();
        let blocks = p.finalize_content_blocks();
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn unicode_text_chunked_at_char_boundaries() {
        let input = "思考中… <read_file><path>日本語.txt</path></read_file>";
        let whole = finalize_one_shot(input);
        assert_eq!(finalize_chunked(input, 1), whole);
    }

    #[test]
    fn dedup_names_keeps_first_seen_order() {
        let names = dedup_names(vec![
            "path".to_string(),
            "content".to_string(),
            "path".to_string(),
        ]);
        assert_eq!(names, vec!["path".to_string(), "content".to_string()]);
    }
}
