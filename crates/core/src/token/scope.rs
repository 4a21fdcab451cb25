use crate::lexicon::{self, ASM_KEYWORDS, ASM_QUALIFIERS, CONTROL_KEYWORDS, RESTRICTED_PAREN_OWNERS};

use super::{Token, TokenKind};

/// What an opening brace delimits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BraceKind {
    /// Body of a function definition at file scope.
    FunctionBody,
    /// Compound statement nested inside a function body.
    Block,
    /// `struct`/`union` member list.
    Record,
    /// `enum` enumerator list.
    Enum,
    /// Aggregate initializer or compound literal.
    Initializer,
    /// Anything else at file scope (`extern "C" {`, macro blocks, ...).
    Other,
}

/// Nesting state observed at one code token, before the token itself is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeInfo {
    pub brace_depth: usize,
    pub innermost: Option<BraceKind>,
    /// Some enclosing brace is a function body.
    pub in_function: bool,
    pub paren_depth: usize,
    /// Some enclosing parenthesis belongs to `sizeof`, `asm`, `__attribute__`, ...
    pub restricted: bool,
    /// Code index of the first token of the current statement.
    pub stmt_start: usize,
}

impl ScopeInfo {
    /// Token sits directly in a statement list of a function body.
    pub fn in_code_block(&self) -> bool {
        self.in_function
            && self.paren_depth == 0
            && matches!(self.innermost, Some(BraceKind::FunctionBody | BraceKind::Block))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParenOwner {
    /// `name(`: a call or a declarator.
    Name,
    /// `if (`, `while (`, `for (`, `switch (`.
    Control,
    /// `sizeof (`, `__attribute__ (`, ...
    Restricted,
    /// `)(` or `](`: call through an expression.
    Postfix,
    /// Grouping, cast or compound literal.
    Group,
}

/// Code tokens (no whitespace, comments or directive lines) of one unit with
/// their scope information.
pub struct CodeView<'a> {
    pub src: &'a str,
    pub tokens: &'a [Token],
    /// Indices into `tokens` of the code tokens, in order.
    pub code: Vec<usize>,
    /// Scope info parallel to `code`.
    pub scopes: Vec<ScopeInfo>,
}

impl<'a> CodeView<'a> {
    pub fn new(src: &'a str, tokens: &'a [Token]) -> Self {
        let code: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_code() && !t.directive)
            .map(|(i, _)| i)
            .collect();
        let scopes = ScopeBuilder::new(src, tokens, &code).run();
        Self { src, tokens, code, scopes }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Code token at code index `ci`.
    pub fn token(&self, ci: usize) -> Option<&'a Token> {
        self.code.get(ci).map(|&i| &self.tokens[i])
    }

    pub fn text(&self, ci: usize) -> &'a str {
        self.token(ci).map(|t| t.text(self.src)).unwrap_or("")
    }

    pub fn kind(&self, ci: usize) -> Option<TokenKind> {
        self.token(ci).map(|t| t.kind)
    }

    pub fn scope(&self, ci: usize) -> Option<&ScopeInfo> {
        self.scopes.get(ci)
    }

    pub fn is_punct(&self, ci: usize, punct: &str) -> bool {
        self.token(ci).is_some_and(|t| t.is_punct(self.src, punct))
    }

    pub fn is_ident(&self, ci: usize, word: &str) -> bool {
        self.token(ci).is_some_and(|t| t.is_ident(self.src, word))
    }

    /// Code index of the token at raw token index `ti`, if it is a code token.
    pub fn code_index_of(&self, ti: usize) -> Option<usize> {
        self.code.binary_search(&ti).ok()
    }

    /// Code index of the closing bracket matching the opener at `ci`.
    pub fn matching_close(&self, ci: usize) -> Option<usize> {
        let (open, close) = match self.text(ci) {
            "(" => ("(", ")"),
            "[" => ("[", "]"),
            "{" => ("{", "}"),
            _ => return None,
        };
        let mut depth = 0usize;
        for j in ci..self.len() {
            if self.is_punct(j, open) {
                depth += 1;
            } else if self.is_punct(j, close) {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
            }
        }
        None
    }
}

struct ScopeBuilder<'a, 'b> {
    src: &'a str,
    tokens: &'a [Token],
    code: &'b [usize],
    braces: Vec<BraceKind>,
    parens: Vec<ParenOwner>,
    /// Owner of the most recently closed parenthesis.
    last_closed: Option<ParenOwner>,
    /// Paren depth at which each open brace was entered.
    brace_paren_base: Vec<usize>,
}

impl<'a, 'b> ScopeBuilder<'a, 'b> {
    fn new(src: &'a str, tokens: &'a [Token], code: &'b [usize]) -> Self {
        Self {
            src,
            tokens,
            code,
            braces: Vec::new(),
            parens: Vec::new(),
            last_closed: None,
            brace_paren_base: Vec::new(),
        }
    }

    fn text(&self, ci: usize) -> &'a str {
        self.tokens[self.code[ci]].text(self.src)
    }

    fn kind(&self, ci: usize) -> TokenKind {
        self.tokens[self.code[ci]].kind
    }

    fn run(mut self) -> Vec<ScopeInfo> {
        let mut out = Vec::with_capacity(self.code.len());
        let mut stmt_start = 0usize;
        for ci in 0..self.code.len() {
            let paren_base = self.brace_paren_base.last().copied().unwrap_or(0);
            out.push(ScopeInfo {
                brace_depth: self.braces.len(),
                innermost: self.braces.last().copied(),
                in_function: self.braces.contains(&BraceKind::FunctionBody),
                paren_depth: self.parens.len().saturating_sub(paren_base),
                restricted: self.parens.contains(&ParenOwner::Restricted),
                stmt_start,
            });

            let text = self.text(ci);
            let at_statement_level = self.parens.len() == paren_base;
            match (self.kind(ci), text) {
                (TokenKind::Punct, "(") => {
                    let owner = self.paren_owner(ci);
                    self.parens.push(owner);
                }
                (TokenKind::Punct, ")") => {
                    // Unbalanced input: never pop below the enclosing brace.
                    if self.parens.len() > paren_base {
                        self.last_closed = self.parens.pop();
                    }
                }
                (TokenKind::Punct, "{") => {
                    let kind = self.classify_brace(ci);
                    self.braces.push(kind);
                    self.brace_paren_base.push(self.parens.len());
                    stmt_start = ci + 1;
                }
                (TokenKind::Punct, "}") => {
                    if self.braces.pop().is_some() {
                        if let Some(base) = self.brace_paren_base.pop() {
                            self.parens.truncate(base);
                        }
                    }
                    stmt_start = ci + 1;
                }
                (TokenKind::Punct, ";") if at_statement_level => {
                    stmt_start = ci + 1;
                }
                _ => {}
            }
        }
        out
    }

    fn paren_owner(&self, ci: usize) -> ParenOwner {
        let Some(prev) = ci.checked_sub(1) else {
            return ParenOwner::Group;
        };
        let text = self.text(prev);
        match self.kind(prev) {
            TokenKind::Identifier if RESTRICTED_PAREN_OWNERS.contains(&text) => {
                ParenOwner::Restricted
            }
            TokenKind::Identifier
                if ASM_QUALIFIERS.contains(&text) && self.qualifies_asm(prev) =>
            {
                ParenOwner::Restricted
            }
            TokenKind::Identifier if CONTROL_KEYWORDS.contains(&text) => ParenOwner::Control,
            TokenKind::Identifier if lexicon::is_keyword(text) => ParenOwner::Group,
            TokenKind::Identifier => ParenOwner::Name,
            TokenKind::Punct if text == ")" || text == "]" => ParenOwner::Postfix,
            _ => ParenOwner::Group,
        }
    }

    /// `asm volatile goto (`: the qualifier run ending at `ci` follows an `asm` keyword.
    fn qualifies_asm(&self, ci: usize) -> bool {
        let mut at = ci;
        while self.kind(at) == TokenKind::Identifier && ASM_QUALIFIERS.contains(&self.text(at)) {
            let Some(before) = at.checked_sub(1) else { return false };
            at = before;
        }
        self.kind(at) == TokenKind::Identifier && ASM_KEYWORDS.contains(&self.text(at))
    }

    fn classify_brace(&self, ci: usize) -> BraceKind {
        let in_function = self.braces.contains(&BraceKind::FunctionBody);
        if matches!(self.braces.last(), Some(BraceKind::Initializer)) {
            return BraceKind::Initializer;
        }
        let Some(prev) = ci.checked_sub(1) else {
            return BraceKind::Other;
        };
        let prev_text = self.text(prev);
        let prev_kind = self.kind(prev);

        if prev_kind == TokenKind::Punct && prev_text == ")" {
            return match self.last_closed {
                Some(ParenOwner::Name | ParenOwner::Postfix) if !in_function => {
                    BraceKind::FunctionBody
                }
                Some(ParenOwner::Name | ParenOwner::Control | ParenOwner::Postfix) => {
                    BraceKind::Block
                }
                // `(type){...}` compound literal; `__attribute__((x)) {` is rare
                // enough to accept the misclassification.
                _ => BraceKind::Initializer,
            };
        }

        if prev_kind == TokenKind::Identifier {
            if let Some(tag) = self.record_keyword(prev) {
                return tag;
            }
            if matches!(prev_text, "else" | "do") {
                return BraceKind::Block;
            }
        }

        if prev_kind == TokenKind::Punct {
            match prev_text {
                "=" | "," | "]" => return BraceKind::Initializer,
                ";" | "{" | "}" | ":" if in_function => return BraceKind::Block,
                "(" => return BraceKind::Block,
                _ => {}
            }
        }
        if prev_kind == TokenKind::Identifier && prev_text == "return" {
            return BraceKind::Initializer;
        }

        if in_function {
            BraceKind::Block
        } else {
            BraceKind::Other
        }
    }

    /// `struct {`, `struct tag {`, `enum tag {` and friends.
    fn record_keyword(&self, prev: usize) -> Option<BraceKind> {
        let tag_of = |word: &str| match word {
            "struct" | "union" => Some(BraceKind::Record),
            "enum" => Some(BraceKind::Enum),
            _ => None,
        };
        if let Some(kind) = tag_of(self.text(prev)) {
            return Some(kind);
        }
        let before = prev.checked_sub(1)?;
        if self.kind(before) == TokenKind::Identifier {
            return tag_of(self.text(before));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    fn scope_of<'a>(view: &CodeView<'a>, needle: &str) -> ScopeInfo {
        let ci = (0..view.len()).find(|&ci| view.text(ci) == needle).expect("needle present");
        *view.scope(ci).expect("scope")
    }

    #[test]
    fn classifies_function_bodies_records_and_initializers() {
        let src = "struct P { int fx; };\nint tbl[] = { one };\nint f(int a) {\n  if (a) { two; }\n  struct Q { int fq; } q;\n}\n";
        let tokens = tokenize(src);
        let view = CodeView::new(src, &tokens);

        let fx = scope_of(&view, "fx");
        assert_eq!(fx.innermost, Some(BraceKind::Record));
        assert!(!fx.in_function);

        assert_eq!(scope_of(&view, "one").innermost, Some(BraceKind::Initializer));

        let two = scope_of(&view, "two");
        assert_eq!(two.innermost, Some(BraceKind::Block));
        assert!(two.in_code_block());

        let fq = scope_of(&view, "fq");
        assert_eq!(fq.innermost, Some(BraceKind::Record));
        assert!(fq.in_function);
        assert!(!fq.in_code_block());
    }

    #[test]
    fn for_header_semicolons_do_not_start_statements() {
        let src = "void g(void) { for (i = 0; i < n; i++) { body; } }";
        let tokens = tokenize(src);
        let view = CodeView::new(src, &tokens);
        let n = scope_of(&view, "n");
        assert_eq!(n.paren_depth, 1);
        assert!(!n.in_code_block());
        let body = scope_of(&view, "body");
        assert!(body.in_code_block());
    }

    #[test]
    fn braces_in_literals_and_directives_are_ignored() {
        let src = "#define OPEN {\nvoid h(void) { s = \"{{\"; c = '}'; tail; }";
        let tokens = tokenize(src);
        let view = CodeView::new(src, &tokens);
        let tail = scope_of(&view, "tail");
        assert_eq!(tail.brace_depth, 1);
        assert_eq!(tail.innermost, Some(BraceKind::FunctionBody));
    }

    #[test]
    fn qualified_asm_parens_are_restricted() {
        let src = "void k(void) { __asm__ __volatile__(\"nop\"); asm volatile goto (\"jmp %l0\" :::: out); f(volatile_x); }";
        let tokens = tokenize(src);
        let view = CodeView::new(src, &tokens);
        let restricted = |needle: &str| {
            let ci = (0..view.len()).find(|&ci| view.text(ci) == needle).expect("needle present");
            view.scope(ci).expect("scope").restricted
        };
        assert!(restricted("\"nop\""));
        assert!(restricted("\"jmp %l0\""));
        assert!(!restricted("volatile_x"));
    }

    #[test]
    fn sizeof_parens_are_restricted() {
        let src = "void k(void) { n = sizeof(\"abc\"); }";
        let tokens = tokenize(src);
        let view = CodeView::new(src, &tokens);
        let lit = (0..view.len()).find(|&ci| view.text(ci) == "\"abc\"").expect("literal");
        assert!(view.scope(lit).expect("scope").restricted);
    }
}
