//! Placement of synthesized helpers in the output unit.

use crate::inject::DeadFunctionDescriptor;
use crate::literal::decoder_source;
use crate::token::{directive_names, tokenize, TokenKind};

/// Logical line of the unit as far as placement is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line<'a> {
    /// A directive line; `end` is the offset just past its newline.
    Directive { name: Option<&'a str>, end: usize },
    Code,
}

fn lines(text: &str) -> Vec<Line<'_>> {
    let tokens = tokenize(text);
    let names = directive_names(text, &tokens);
    let mut out = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.opens_directive {
            out.push(Line::Directive { name: None, end: token.span.end });
        }
        if token.directive {
            if let Some(Line::Directive { name, end }) = out.last_mut() {
                *end = token.span.end;
                // Known once the token after `#` is seen.
                if name.is_none() {
                    *name = names[i];
                }
            }
        } else if token.is_code() && token.kind != TokenKind::Invalid && out.last() != Some(&Line::Code) {
            out.push(Line::Code);
        }
    }
    out
}

/// Offset where synthesized helpers go: just past the last include line, or
/// past the `#endif`s closing the conditional group that include sits in.
pub fn insertion_offset(text: &str) -> usize {
    let lines = lines(text);
    let is_include = |line: &Line<'_>| {
        matches!(line, Line::Directive { name: Some("include" | "import" | "include_next"), .. })
    };
    let Some(last) = lines.iter().rposition(is_include) else { return 0 };
    let Line::Directive { end, .. } = lines[last] else { return 0 };

    let mut depth: usize = 0;
    for line in &lines[..last] {
        match line {
            Line::Directive { name: Some("if" | "ifdef" | "ifndef"), .. } => depth += 1,
            Line::Directive { name: Some("endif"), .. } => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    let mut offset = end;
    for line in &lines[last + 1..] {
        if depth == 0 {
            break;
        }
        match line {
            Line::Code => break,
            Line::Directive { name: Some("if" | "ifdef" | "ifndef"), .. } => break,
            Line::Directive { name: Some("endif"), end } => {
                depth -= 1;
                offset = *end;
            }
            Line::Directive { .. } => {}
        }
    }
    offset
}

/// The helper block: `<stdlib.h>` and the decoder when literals were
/// encrypted, then every dead function.
pub fn helper_block(decoder: Option<&str>, dead: &[DeadFunctionDescriptor]) -> String {
    let mut parts = Vec::new();
    if let Some(name) = decoder {
        parts.push("#include <stdlib.h>\n".to_string());
        parts.push(decoder_source(name));
    }
    parts.extend(dead.iter().map(|d| d.synthesized_body.clone()));
    parts.join("\n")
}

/// Insert `block` at the helper insertion point of `text`.
pub fn assemble(text: &str, block: &str) -> String {
    if block.is_empty() {
        return text.to_string();
    }
    let offset = insertion_offset(text);
    let (head, tail) = text.split_at(offset);
    let mut out = String::with_capacity(text.len() + block.len() + 2);
    out.push_str(head);
    if !head.is_empty() && !head.ends_with('\n') {
        out.push('\n');
    }
    if !head.is_empty() {
        out.push('\n');
    }
    out.push_str(block);
    if !block.ends_with('\n') {
        out.push('\n');
    }
    if !tail.is_empty() {
        out.push('\n');
    }
    out.push_str(tail);
    tracing::debug!(offset, helper_bytes = block.len(), "assembled helpers");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn after_last_include() {
        let src = "#include <stdio.h>\n#include \"local.h\"\nint x;\n";
        assert_eq!(insertion_offset(src), src.find("int x").unwrap_or(0));
    }

    #[test]
    fn no_includes_means_top() {
        assert_eq!(insertion_offset("int main(void) { return 0; }\n"), 0);
    }

    #[test]
    fn moves_past_closing_endifs() {
        let src = "#ifdef _WIN32\n#include <windows.h>\n#else\n#include <unistd.h>\n/* posix */\n#endif\n\nint x;\n";
        assert_eq!(insertion_offset(src), src.find("\nint x").unwrap_or(0));
    }

    #[test]
    fn stops_at_code_inside_the_group() {
        let src = "#if A\n#include <a.h>\nint inside;\n#endif\n";
        assert_eq!(insertion_offset(src), src.find("int inside").unwrap_or(0));
    }

    #[test]
    fn include_on_last_line_without_newline() {
        let out = assemble("#include <stdio.h>", "static int h;\n");
        assert_eq!(out, "#include <stdio.h>\n\nstatic int h;\n");
    }

    #[test]
    fn block_order_is_stdlib_decoder_dead() {
        let dead = vec![DeadFunctionDescriptor {
            name: "zdead_a".into(),
            synthesized_body: "static void zdead_a(void) { }\n".into(),
        }];
        let block = helper_block(Some("dec_a"), &dead);
        let stdlib = block.find("#include <stdlib.h>").unwrap_or(usize::MAX);
        let decoder = block.find("dec_a(").unwrap_or(usize::MAX);
        let dead_at = block.find("zdead_a").unwrap_or(usize::MAX);
        assert!(stdlib < decoder && decoder < dead_at);
        assert!(!helper_block(None, &dead).contains("stdlib"));
    }
}
