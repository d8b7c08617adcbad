//! Markdown assembly.
//!
//! The document is:
//!
//! ````text
//! # Repository: owner/repo
//!
//! ## File Structure
//!
//! ```
//! ├── src/
//! │   └── main.rs
//! └── README.md
//! ```
//!
//! ## Files
//!
//! ### `src/main.rs`
//!
//! ```rust
//! ...
//! ```
//! ````
//!
//! Every fence is one backtick longer than the longest backtick run inside the
//! block it delimits (minimum three), so content can never close it early.

use std::fmt::Write;

use crate::contract::RetrievedFile;
use crate::language::language_for;
use crate::tree::TreeNode;

const MIN_FENCE: usize = 3;

/// Render the whole document. Pure: the same tree always gives the same bytes.
pub fn render(title: &str, root: &TreeNode) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Repository: {title}\n");

    out.push_str("## File Structure\n\n");
    let mut lines = Vec::new();
    diagram(root, "", &mut lines);
    let diagram = lines.join("\n");
    let fence = fence_for(&diagram);
    let _ = writeln!(out, "{fence}");
    if !diagram.is_empty() {
        let _ = writeln!(out, "{diagram}");
    }
    let _ = writeln!(out, "{fence}\n");

    out.push_str("## Files\n\n");
    for file in root.files() {
        render_file(&mut out, file);
    }
    out
}

fn diagram(node: &TreeNode, prefix: &str, lines: &mut Vec<String>) {
    let children: Vec<&TreeNode> = node.children().collect();
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let connector = if last { "└── " } else { "├── " };
        if child.is_file() {
            lines.push(format!("{prefix}{connector}{}", child.name));
        } else {
            lines.push(format!("{prefix}{connector}{}/", child.name));
            let extension = if last { "    " } else { "│   " };
            diagram(child, &format!("{prefix}{extension}"), lines);
        }
    }
}

fn render_file(out: &mut String, file: &RetrievedFile) {
    let _ = writeln!(out, "### {}\n", code_span(file.path()));

    let text = match (&file.skip_reason, file.text_content()) {
        (None, Some(text)) => text,
        (Some(reason), _) => {
            let reason = reason.to_string().replace(['\r', '\n'], " ");
            let _ = writeln!(out, "> Skipped: {reason}\n");
            return;
        }
        (None, None) => {
            let _ = writeln!(out, "> Skipped: binary content\n");
            return;
        }
    };

    let fence = fence_for(text);
    let _ = writeln!(out, "{fence}{}", language_for(file.path()).unwrap_or(""));
    out.push_str(text);
    if !text.is_empty() && !text.ends_with('\n') {
        out.push('\n');
    }
    let _ = writeln!(out, "{fence}\n");
}

/// A backtick fence strictly longer than any backtick run in `content`.
pub fn fence_for(content: &str) -> String {
    "`".repeat((longest_backtick_run(content) + 1).max(MIN_FENCE))
}

fn longest_backtick_run(content: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in content.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

// Inline code span that survives backticks in file names.
fn code_span(text: &str) -> String {
    let delimiter = "`".repeat(longest_backtick_run(text) + 1);
    if text.starts_with('`') || text.ends_with('`') {
        format!("{delimiter} {text} {delimiter}")
    } else {
        format!("{delimiter}{text}{delimiter}")
    }
}
