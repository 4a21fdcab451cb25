//! Token-pattern fact extraction, used when no declaration tree is available.
//!
//! Only shapes that are unambiguous at token level are recognized. Anything
//! that could be an expression as well as a declaration is left alone.

use std::collections::BTreeSet;

use crate::lexicon::{self, POINTER_QUALIFIERS};
use crate::token::{BraceKind, CodeView, TokenKind};

use super::SymbolRole;

/// Tokens that may directly follow a declarator name.
const DECLARATOR_FOLLOW: &[&str] = &[";", ",", "=", "[", "(", ")", ":"];
const ATTRIBUTE_WORDS: &[&str] = &["__attribute__", "__attribute", "__asm__", "__asm", "asm"];

/// Declarations found by token patterns, in source order.
pub fn scan(view: &CodeView<'_>) -> Vec<(String, SymbolRole)> {
    let mut scanner = Scanner { view, type_names: BTreeSet::new(), out: Vec::new() };
    scanner.collect_type_names();
    scanner.collect_declarators();
    scanner.out
}

struct Scanner<'v, 'a> {
    view: &'v CodeView<'a>,
    type_names: BTreeSet<&'a str>,
    out: Vec<(String, SymbolRole)>,
}

impl<'v, 'a> Scanner<'v, 'a> {
    fn text(&self, ci: usize) -> &'a str {
        self.view.text(ci)
    }

    fn is_identifier(&self, ci: usize) -> bool {
        self.view.kind(ci) == Some(TokenKind::Identifier)
    }

    fn push(&mut self, ci: usize, role: SymbolRole) {
        self.out.push((self.text(ci).to_string(), role));
    }

    /// Tags of `struct`/`union`/`enum` definitions and typedef names.
    fn collect_type_names(&mut self) {
        let view = self.view;
        for ci in 0..view.len() {
            let text = self.text(ci);
            if matches!(text, "struct" | "union" | "enum")
                && self.is_identifier(ci + 1)
                && view.is_punct(ci + 2, "{")
            {
                self.type_names.insert(self.text(ci + 1));
                self.push(ci + 1, SymbolRole::Type);
            }
            if text == "typedef" && self.is_statement_start(ci) {
                for name_ci in self.typedef_names(ci) {
                    self.type_names.insert(self.text(name_ci));
                    self.push(name_ci, SymbolRole::Type);
                }
            }
        }
    }

    fn is_statement_start(&self, ci: usize) -> bool {
        self.view.scope(ci).is_some_and(|s| s.stmt_start == ci)
    }

    /// Names declared by the typedef statement starting at `start`.
    fn typedef_names(&self, start: usize) -> Vec<usize> {
        let view = self.view;
        let mut names = Vec::new();
        let mut depth = 0i32;
        let mut ci = start + 1;
        while ci < view.len() {
            let text = self.text(ci);
            match text {
                "(" | "[" | "{" => {
                    // `typedef int (*handler)(int);`
                    if text == "("
                        && depth == 0
                        && view.is_punct(ci + 1, "*")
                        && self.is_identifier(ci + 2)
                        && view.is_punct(ci + 3, ")")
                    {
                        names.push(ci + 2);
                    }
                    depth += 1;
                }
                ")" | "]" | "}" => depth -= 1,
                ";" if depth == 0 => break,
                _ => {}
            }
            if depth == 0
                && self.is_identifier(ci)
                && !lexicon::is_keyword(text)
                && matches!(self.text(ci + 1), ";" | "," | "[")
            {
                names.push(ci);
            }
            if depth < 0 {
                break;
            }
            ci += 1;
        }
        names
    }

    fn collect_declarators(&mut self) {
        let view = self.view;
        for ci in 0..view.len() {
            if !self.is_identifier(ci) || lexicon::is_keyword(self.text(ci)) {
                continue;
            }
            let Some(scope) = view.scope(ci).copied() else { continue };
            if scope.restricted || self.statement_starts_with(ci, "typedef") {
                continue;
            }
            if ci > 0 && (view.is_punct(ci - 1, ".") || view.is_punct(ci - 1, "->")) {
                continue;
            }

            if scope.innermost == Some(BraceKind::Enum) {
                if scope.paren_depth == 0
                    && (view.is_punct(ci.wrapping_sub(1), "{") || view.is_punct(ci.wrapping_sub(1), ","))
                    && matches!(self.text(ci + 1), "," | "=" | "}")
                {
                    self.push(ci, SymbolRole::EnumConstant);
                }
                continue;
            }

            if self.is_function_pointer_name(ci) {
                let role = if scope.innermost == Some(BraceKind::Record) {
                    SymbolRole::Field
                } else if scope.paren_depth > 1 {
                    SymbolRole::Parameter
                } else {
                    SymbolRole::Variable
                };
                if role != SymbolRole::Variable || !self.statement_has_extern(ci) {
                    self.push(ci, role);
                }
                continue;
            }

            if !self.follows_declarator(ci) {
                continue;
            }
            let Some(before) = self.skip_pointer_tokens(ci) else { continue };
            let typed = self.is_type_word(before);
            let continued = view.is_punct(before, ",")
                && scope.paren_depth == 0
                && self.statement_has_specifiers(ci);
            if !typed && !continued {
                continue;
            }

            if view.is_punct(ci + 1, "(") {
                if let Some(role) = self.function_role(ci) {
                    self.push(ci, role);
                }
                continue;
            }

            let role = if scope.paren_depth > 0 {
                if self.statement_starts_with(ci, "for") {
                    SymbolRole::Variable
                } else {
                    SymbolRole::Parameter
                }
            } else if scope.innermost == Some(BraceKind::Record) {
                SymbolRole::Field
            } else {
                SymbolRole::Variable
            };
            if role == SymbolRole::Variable && self.statement_has_extern(ci) {
                continue;
            }
            self.push(ci, role);
        }
    }

    /// `name(` is only a candidate when it starts a definition at file scope.
    fn function_role(&self, ci: usize) -> Option<SymbolRole> {
        let view = self.view;
        let scope = view.scope(ci)?;
        if scope.brace_depth != 0 || scope.paren_depth != 0 {
            return None;
        }
        let close = view.matching_close(ci + 1)?;
        let mut next = close + 1;
        while ATTRIBUTE_WORDS.contains(&self.text(next)) && view.is_punct(next + 1, "(") {
            next = view.matching_close(next + 1)? + 1;
        }
        view.is_punct(next, "{").then_some(SymbolRole::Function)
    }

    fn follows_declarator(&self, ci: usize) -> bool {
        let next = self.text(ci + 1);
        DECLARATOR_FOLLOW.contains(&next) || ATTRIBUTE_WORDS.contains(&next)
    }

    /// Code index of the first token before `ci` that is not `*` or a pointer
    /// qualifier.
    fn skip_pointer_tokens(&self, ci: usize) -> Option<usize> {
        let mut at = ci.checked_sub(1)?;
        while self.view.is_punct(at, "*") || POINTER_QUALIFIERS.contains(&self.text(at)) {
            at = at.checked_sub(1)?;
        }
        Some(at)
    }

    fn is_type_word(&self, ci: usize) -> bool {
        let view = self.view;
        let text = self.text(ci);
        if view.kind(ci) == Some(TokenKind::Punct) {
            // `struct { ... } name;`
            return text == "}"
                && view.scope(ci).is_some_and(|s| {
                    matches!(s.innermost, Some(BraceKind::Record | BraceKind::Enum))
                });
        }
        if !self.is_identifier(ci) {
            return false;
        }
        if lexicon::is_type_keyword(text)
            || lexicon::is_library_type(text)
            || text == "__int128"
            || self.type_names.contains(text)
        {
            return true;
        }
        // `struct tag name`
        ci.checked_sub(1).is_some_and(|p| matches!(self.text(p), "struct" | "union" | "enum"))
    }

    /// `( * name )` with a type before the parenthesis.
    fn is_function_pointer_name(&self, ci: usize) -> bool {
        let view = self.view;
        if ci < 3 || !view.is_punct(ci - 1, "*") || !view.is_punct(ci + 1, ")") {
            return false;
        }
        let mut open = ci - 2;
        while view.is_punct(open, "*") {
            match open.checked_sub(1) {
                Some(p) => open = p,
                None => return false,
            }
        }
        if !view.is_punct(open, "(") || !matches!(self.text(ci + 2), "(" | "[") {
            return false;
        }
        open.checked_sub(1)
            .and_then(|p| self.skip_pointer_tokens(p + 1))
            .is_some_and(|p| self.is_type_word(p))
    }

    fn statement_range(&self, ci: usize) -> std::ops::Range<usize> {
        let start = self.view.scope(ci).map(|s| s.stmt_start).unwrap_or(ci);
        start..ci
    }

    fn statement_starts_with(&self, ci: usize, word: &str) -> bool {
        let start = self.statement_range(ci).start;
        self.view.is_ident(start, word)
    }

    fn statement_has_extern(&self, ci: usize) -> bool {
        self.statement_range(ci).any(|i| self.view.is_ident(i, "extern"))
    }

    /// Statement opens with a declaration-specifier sequence.
    fn statement_has_specifiers(&self, ci: usize) -> bool {
        let start = self.statement_range(ci).start;
        start < ci
            && (self.is_type_word(start)
                || matches!(self.text(start), "struct" | "union" | "enum" | "typedef"))
    }
}
