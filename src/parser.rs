//! Markdown checklist parser.
//!
//! Turns document text into a flat, line-addressed list of [`ParsedTask`]s.
//! Parsing never fails: anything that does not look like a task becomes a
//! note line, header text or a warning.
//!
//! Task lines look like `<indent>- [ ] <!-- sp:ID --> Title`. The marker is
//! optional, and the legacy bare form `<!--ID-->` is accepted as well.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// Columns per nesting level.
pub const INDENT_WIDTH: usize = 2;

/// Columns a tab counts for when computing depth.
const TAB_WIDTH: usize = 2;

/// Parsing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Deepest level that is still a task (0 = root). Deeper checklist
    /// lines become notes of their enclosing task. `None` parses an
    /// unbounded outline.
    pub max_depth: Option<usize>,
}

impl ParseOptions {
    /// Root tasks plus one level of subtasks, matching the task graph.
    pub fn sync() -> Self {
        Self { max_depth: Some(1) }
    }

    /// Any nesting depth.
    pub fn outline() -> Self {
        Self { max_depth: None }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::sync()
    }
}

/// One checklist task recovered from the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedTask {
    /// 0-based source line
    pub line: usize,
    /// Leading whitespace characters
    pub indent: usize,
    /// Nesting depth implied by the indentation columns
    pub depth: usize,
    pub title: String,
    pub completed: bool,
    /// Identifier from the marker, cleared for later duplicates
    pub id: Option<String>,
    /// Identifier as literally written
    pub original_id: Option<String>,
    /// Identifier of the enclosing task, if it has one
    pub parent_id: Option<String>,
    /// Line of the enclosing task
    pub parent_line: Option<usize>,
    pub is_subtask: bool,
    /// Verbatim lines attached below the task
    pub note_lines: Vec<String>,
}

impl ParsedTask {
    /// Notes joined into a single block, `None` when there are none.
    pub fn notes(&self) -> Option<String> {
        if self.note_lines.is_empty() {
            None
        } else {
            Some(self.note_lines.join("\n"))
        }
    }
}

/// A recoverable oddity found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line + 1, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseResult {
    pub tasks: Vec<ParsedTask>,
    pub warnings: Vec<ParseWarning>,
    /// Text above the first task, lines joined with `\n`
    pub header: Option<String>,
}

fn checkbox_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\s*)- \[(.)\](.*)$").expect("valid checkbox pattern"))
}

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^<!--\s*(?:sp:)?\s*(\S+?)\s*-->(.*)$").expect("valid marker pattern")
    })
}

/// Column width of a run of leading whitespace.
pub fn indent_columns(prefix: &str) -> usize {
    prefix
        .chars()
        .map(|ch| if ch == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

fn leading_whitespace(line: &str) -> &str {
    let end = line
        .char_indices()
        .find(|(_, ch)| !ch.is_whitespace())
        .map(|(idx, _)| idx)
        .unwrap_or(line.len());
    &line[..end]
}

struct Checkbox<'a> {
    indent: &'a str,
    completed: bool,
    rest: &'a str,
}

enum LineKind<'a> {
    Task(Checkbox<'a>),
    UnsupportedCheckbox(char),
    Text,
}

fn classify(line: &str) -> LineKind<'_> {
    let Some(caps) = checkbox_re().captures(line) else {
        return LineKind::Text;
    };
    let indent = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let mark = caps
        .get(2)
        .and_then(|m| m.as_str().chars().next())
        .unwrap_or(' ');
    let rest = caps.get(3).map(|m| m.as_str()).unwrap_or("");
    match mark {
        ' ' => LineKind::Task(Checkbox {
            indent,
            completed: false,
            rest,
        }),
        'x' | 'X' => LineKind::Task(Checkbox {
            indent,
            completed: true,
            rest,
        }),
        other => LineKind::UnsupportedCheckbox(other),
    }
}

/// Split the text after the checkbox into `(marker id, title)`.
fn split_marker(
    rest: &str,
    line: usize,
    warnings: &mut Vec<ParseWarning>,
) -> (Option<String>, String) {
    let trimmed = rest.trim_start();
    if !trimmed.starts_with("<!--") {
        return (None, rest.trim().to_string());
    }
    if let Some(caps) = marker_re().captures(trimmed) {
        let id = caps.get(1).map(|m| m.as_str().to_string());
        let title = caps.get(2).map(|m| m.as_str()).unwrap_or("").trim().to_string();
        return (id, title);
    }
    if !trimmed.contains("-->") {
        warnings.push(ParseWarning {
            line,
            message: "unterminated task id marker, kept as title text".to_string(),
        });
    }
    (None, rest.trim().to_string())
}

/// Parse document text into tasks.
pub fn parse_markdown(content: &str, options: ParseOptions) -> ParseResult {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    if content.is_empty() {
        return ParseResult::default();
    }

    let mut result = ParseResult::default();
    let mut header_lines: Vec<&str> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    // (indent, index into result.tasks) of the open ancestors
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for (line_no, raw) in content.split('\n').enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        let checkbox = match classify(line) {
            LineKind::Task(checkbox) => Some(checkbox),
            LineKind::UnsupportedCheckbox(mark) => {
                result.warnings.push(ParseWarning {
                    line: line_no,
                    message: format!("unsupported checkbox marker '[{mark}]', treated as text"),
                });
                None
            }
            LineKind::Text => None,
        };

        let Some(checkbox) = checkbox else {
            if result.tasks.is_empty() {
                header_lines.push(line);
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            let indent = leading_whitespace(line).chars().count();
            if let Some(last) = result.tasks.last_mut() {
                if indent > last.indent {
                    last.note_lines.push(line.trim_end().to_string());
                }
            }
            continue;
        };

        let indent = checkbox.indent.chars().count();
        let depth = indent_columns(checkbox.indent) / INDENT_WIDTH;

        while stack.last().is_some_and(|(open, _)| *open >= indent) {
            stack.pop();
        }
        let level = stack.len();

        if let (Some(max), Some(&(_, owner))) = (options.max_depth, stack.last()) {
            if depth > max || level > max {
                debug!(line = line_no, "nested checklist line kept as note");
                result.tasks[owner].note_lines.push(line.trim_end().to_string());
                continue;
            }
        }

        let (marker_id, title) = split_marker(checkbox.rest, line_no, &mut result.warnings);
        let id = match &marker_id {
            Some(id) if !seen_ids.insert(id.clone()) => {
                result.warnings.push(ParseWarning {
                    line: line_no,
                    message: format!("duplicate task id '{id}', treated as a new task"),
                });
                None
            }
            other => other.clone(),
        };

        let parent = stack.last().map(|&(_, idx)| &result.tasks[idx]);
        let parent_line = parent.map(|p| p.line);
        let parent_id = parent.and_then(|p| p.id.clone());

        if result.tasks.is_empty() && line_no > 0 {
            result.header = Some(header_lines.join("\n"));
        }

        result.tasks.push(ParsedTask {
            line: line_no,
            indent,
            depth,
            title,
            completed: checkbox.completed,
            id,
            original_id: marker_id,
            parent_id,
            parent_line,
            is_subtask: parent_line.is_some(),
            note_lines: Vec::new(),
        });
        stack.push((indent, result.tasks.len() - 1));
    }

    if result.tasks.is_empty() && !header_lines.is_empty() {
        result.header = Some(header_lines.join("\n"));
    }

    result
}

/// Rewrite a task line so it carries `id`.
///
/// The line must still be a task titled `title`, either without a marker
/// or with the marker `replaces`. Indentation, checkbox state and a
/// trailing `\r` are kept. Returns `None` when the line no longer matches.
pub fn write_id_marker(
    line: &str,
    id: &str,
    title: &str,
    replaces: Option<&str>,
) -> Option<String> {
    let (body, line_end) = match line.strip_suffix('\r') {
        Some(body) => (body, "\r"),
        None => (line, ""),
    };
    let LineKind::Task(checkbox) = classify(body) else {
        return None;
    };
    let rest = checkbox.rest.trim();
    let current = if rest.starts_with("<!--") {
        let caps = marker_re().captures(rest)?;
        let marker = caps.get(1).map(|m| m.as_str());
        if replaces.is_none() || marker != replaces {
            return None;
        }
        caps.get(2).map(|m| m.as_str()).unwrap_or("").trim()
    } else {
        rest
    };
    if current != title {
        return None;
    }

    let mut out = String::with_capacity(line.len() + id.len() + 16);
    out.push_str(checkbox.indent);
    out.push_str(if checkbox.completed { "- [x] " } else { "- [ ] " });
    out.push_str(&crate::serializer::id_marker(id));
    if !current.is_empty() {
        out.push(' ');
        out.push_str(current);
    }
    out.push_str(line_end);
    Some(out)
}
