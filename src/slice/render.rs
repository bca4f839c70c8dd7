//! Rendering a statement selection back to source text

use std::collections::HashSet;

use crate::error::{AnalysisError, AnalysisResult};
use crate::source::ast::{BlockStyle, Stmt};
use crate::source::{dedent, MethodBody};

const INDENT: &str = "    ";

/// `header {` + kept statements in source order + `}`
///
/// Compound statements keep their header and only the kept part of their
/// nested blocks.
pub fn render_slice(body: &MethodBody, keep: &HashSet<usize>) -> AnalysisResult<String> {
    let mut out = format!("{} {{\n", body.header);
    for stmt in body.statements.iter().filter(|s| keep.contains(&s.id)) {
        for line in render_stmt(stmt, keep)? {
            out.push_str(INDENT);
            out.push_str(&line);
            out.push('\n');
        }
    }
    out.push('}');
    Ok(out)
}

fn segment(stmt: &Stmt, start: usize, end: usize) -> AnalysisResult<&str> {
    stmt.text.get(start..end).ok_or_else(|| {
        AnalysisError::parse(
            format!("line {}", stmt.line),
            format!("block range {}..{} outside statement text", start, end),
        )
    })
}

/// Push a (possibly multi-line) piece of statement text, one trimmed line
/// at a time; a leading `}` closing a bare block is merged onto it
fn push_text(lines: &mut Vec<String>, text: &str, pending_close: &mut bool) {
    let mut parts = text.lines().map(str::trim).filter(|l| !l.is_empty());
    if *pending_close {
        *pending_close = false;
        match parts.next() {
            Some(first) => lines.push(format!("}} {}", first)),
            None => lines.push("}".to_string()),
        }
    }
    lines.extend(parts.map(str::to_string));
}

fn render_stmt(stmt: &Stmt, keep: &HashSet<usize>) -> AnalysisResult<Vec<String>> {
    if stmt.blocks.is_empty() {
        return Ok(dedent(&stmt.text, stmt.column)
            .lines()
            .map(str::to_string)
            .collect());
    }

    let mut lines = Vec::new();
    let mut cursor = 0;
    let mut pending_close = false;
    for block in &stmt.blocks {
        let before = segment(stmt, cursor, block.start)?;
        push_text(&mut lines, before, &mut pending_close);
        if block.style == BlockStyle::Bare {
            match lines.last_mut() {
                Some(last) => last.push_str(" {"),
                None => lines.push("{".to_string()),
            }
        }
        for child in block.stmts.iter().filter(|s| keep.contains(&s.id)) {
            for line in render_stmt(child, keep)? {
                lines.push(format!("{}{}", INDENT, line));
            }
        }
        pending_close = block.style == BlockStyle::Bare;
        cursor = block.end;
    }
    let tail = segment(stmt, cursor, stmt.text.len())?;
    push_text(&mut lines, tail, &mut pending_close);
    if pending_close {
        lines.push("}".to_string());
    }
    Ok(lines)
}
