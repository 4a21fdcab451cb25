use std::collections::BTreeSet;

use regex::Regex;
use veil_core::literal::decode_until_terminator;
use veil_core::token::{tokenize, TokenKind};
use veil_core::{ObfuscationConfig, Pipeline, Scheme, SourceUnit};

fn token_only(config: ObfuscationConfig) -> Pipeline {
    let mut config = config;
    config.structural.enabled = false;
    Pipeline::new(config).expect("valid config")
}

fn identifiers(text: &str) -> BTreeSet<String> {
    tokenize(text)
        .iter()
        .filter(|t| t.kind == TokenKind::Identifier)
        .map(|t| t.text(text).to_string())
        .collect()
}

/// Evaluates the `+ ^ <<` expressions produced by numeric splitting.
struct Eval<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> Eval<'a> {
    fn new(expr: &'a str) -> Self {
        let re = Regex::new(r"0x[0-9a-fA-F]+|[0-9]+|<<|[-+^()]").expect("regex");
        Self { tokens: re.find_iter(expr).map(|m| m.as_str()).collect(), pos: 0 }
    }

    fn next(&mut self) -> &'a str {
        let t = self.tokens.get(self.pos).copied().unwrap_or("");
        self.pos += 1;
        t
    }

    fn peek(&self) -> &'a str {
        self.tokens.get(self.pos).copied().unwrap_or("")
    }

    fn expr(&mut self) -> i64 {
        let mut value = self.atom();
        loop {
            match self.peek() {
                "+" => {
                    self.next();
                    value += self.atom();
                }
                "^" => {
                    self.next();
                    value ^= self.atom();
                }
                "<<" => {
                    self.next();
                    value <<= self.atom();
                }
                _ => return value,
            }
        }
    }

    fn atom(&mut self) -> i64 {
        match self.next() {
            "(" => {
                let v = self.expr();
                assert_eq!(self.next(), ")");
                v
            }
            "-" => -self.atom(),
            t if t.starts_with("0x") => i64::from_str_radix(&t[2..], 16).expect("hex"),
            t => t.parse().expect("decimal"),
        }
    }
}

#[test]
fn constants_literals_and_names_are_all_rewritten() {
    let src = "#include <stdio.h>\n\nint main(void)\n{\n    int count = 42; char *msg = \"hello\";\n    puts(msg);\n    return count - 1;\n}\n";
    let config = ObfuscationConfig { seed: Some(2024), numeric_probability: 1.0, ..Scheme::Diff.config() };
    let out = token_only(config).run(&SourceUnit::from_text(src)).expect("run");

    // Numeric: no bare 42, and the rewritten initializer still evaluates to 42.
    let tokens = tokenize(&out.text);
    assert!(!tokens.iter().any(|t| t.kind == TokenKind::Number && t.text(&out.text) == "42"));
    let renamed = out.report.renames.get("count").expect("count renamed").clone();
    let init = Regex::new(&format!(r"int {renamed} = ([^;]+);")).expect("regex");
    let expr = init.captures(&out.text).expect("initializer")[1].to_string();
    assert_eq!(Eval::new(&expr).expr(), 42);

    // Literal: replaced by a two-argument decoder call that yields "hello".
    assert!(!out.text.contains("\"hello\""));
    let decoder = out.report.decoder_name.clone().expect("decoder synthesized");
    let call = Regex::new(&format!(r"{decoder}\(\(const unsigned char\[\]\)\{{([^}}]*)\}}, 0x([0-9a-f]{{2}})\)"))
        .expect("regex");
    let caps = call.captures(&out.text).expect("decoder call");
    let bytes: Vec<u8> = caps[1]
        .split(',')
        .map(|b| u8::from_str_radix(b.trim().trim_start_matches("0x"), 16).expect("byte"))
        .collect();
    let key = u8::from_str_radix(&caps[2], 16).expect("key");
    assert_eq!(decode_until_terminator(&bytes, key), b"hello".to_vec());
    assert!(out.text.contains(&format!("static char *{decoder}(")));

    // Rename: declaration and use agree; the original name is gone.
    assert!(out.text.contains(&format!("return {renamed} - 1;")));
    assert!(!identifiers(&out.text).contains("count"));

    // Helpers follow the include.
    let include_end = out.text.find("#include <stdio.h>\n").expect("include") + "#include <stdio.h>\n".len();
    let decoder_at = out.text.find(&format!("static char *{decoder}(")).expect("decoder");
    let main_at = out.text.find("int main(void)").expect("main");
    assert!(include_end <= decoder_at && decoder_at < main_at);
}

#[test]
fn marker_comment_survives_comment_stripping() {
    let src = "/* keep <<$ hint $>> */\n/* drop me */\nint value = 100;\n";
    let config = ObfuscationConfig { seed: Some(9), ..Scheme::Diff.config() };
    let out = token_only(config).run(&SourceUnit::from_text(src)).expect("run");
    assert!(out.text.contains("/* keep <<$ hint $>> */"));
    assert!(!out.text.contains("drop me"));
    assert!(!out.text.contains("__veil_guard_"));
    assert_eq!(out.report.comments_replaced, 1);
}

#[test]
fn markers_in_code_and_literals_are_restored() {
    let src = "int main(void) { const char *s = \"<<$ raw $>>\"; int keep = 7; <<$ opaque\n  span $>> return keep; }\n";
    let config = ObfuscationConfig { seed: Some(4), ..Scheme::Diff.config() };
    let out = token_only(config).run(&SourceUnit::from_text(src)).expect("run");
    assert!(out.text.contains("\"<<$ raw $>>\""));
    assert!(out.text.contains("<<$ opaque\n  span $>>"));
}

#[test]
fn marker_between_concatenated_literals_survives() {
    let src = "#include <stdio.h>\nint main(void) {\n    puts(\"a\" /* <<$ keep $>> */ \"b\");\n    return 0;\n}\n";
    let config = ObfuscationConfig { seed: Some(12), ..Scheme::Diff.config() };
    let out = token_only(config).run(&SourceUnit::from_text(src)).expect("run");
    assert!(out.text.contains("puts(\"a\" /* <<$ keep $>> */ \"b\");"));
    assert!(out.report.literals.is_empty());
}

#[test]
fn asm_templates_are_never_encrypted() {
    let src = "void spin(void) {\n    __asm__ __volatile__(\"nop\");\n    asm volatile (\"pause\" ::: \"memory\");\n}\n";
    let config = ObfuscationConfig { seed: Some(6), ..Scheme::Diff.config() };
    let out = token_only(config).run(&SourceUnit::from_text(src)).expect("run");
    assert!(out.text.contains("__asm__ __volatile__(\"nop\");"));
    assert!(out.text.contains("asm volatile (\"pause\" ::: \"memory\");"));
    assert!(out.report.decoder_name.is_none());
}

#[test]
fn zero_coverage_keeps_every_identifier() {
    let src = "struct node { int value; struct node *next; };\nstatic int sum(struct node *n) {\n    int total = 0;\n    while (n) { total += n->value; n = n->next; }\n    return total;\n}\n";
    let config = ObfuscationConfig { seed: Some(77), rename_coverage_ratio: 0.0, ..Scheme::Diff.config() };
    let out = token_only(config).run(&SourceUnit::from_text(src)).expect("run");
    assert!(out.report.renames.is_empty());
    let before = identifiers(src);
    let after = identifiers(&out.text);
    assert!(before.is_subset(&after), "lost: {:?}", before.difference(&after).collect::<Vec<_>>());
}

#[test]
fn same_seed_same_output() {
    let src = "#include <string.h>\nint width = 640;\nint area(int h) {\n    /* scale */\n    return width * h + (int)strlen(\"abc\");\n}\n";
    let config = ObfuscationConfig { seed: Some(123), ..Scheme::Diff.config() };
    let a = token_only(config.clone()).run(&SourceUnit::from_text(src)).expect("run a");
    let b = token_only(config).run(&SourceUnit::from_text(src)).expect("run b");
    assert_eq!(a.text, b.text);
    assert_eq!(a.report.renames, b.report.renames);
    assert_eq!(a.report.seed, 123);

    let other = ObfuscationConfig { seed: Some(124), ..Scheme::Diff.config() };
    let c = token_only(other).run(&SourceUnit::from_text(src)).expect("run c");
    assert_ne!(a.text, c.text);
}

#[test]
fn opaque_predicates_call_dead_functions() {
    let src = "int main(void) {\n    int a = 1;\n    a++;\n    a--;\n    a += 2;\n    return a;\n}\n";
    let config = ObfuscationConfig {
        seed: Some(31),
        dead_code_count: 2,
        opaque_predicate_count: Some(3),
        ..Scheme::Diff.config()
    };
    let out = token_only(config).run(&SourceUnit::from_text(src)).expect("run");
    assert_eq!(out.report.dead_functions.len(), 2);
    assert_eq!(out.report.opaque_predicates, 3);
    for name in &out.report.dead_functions {
        assert!(out.text.contains(&format!("static void {name}(void)")));
    }
    let calls = out.report.dead_functions.iter().map(|n| out.text.matches(&format!("{n}();")).count()).sum::<usize>();
    assert_eq!(calls, 3);
    // Helpers sit at the top when there is no include.
    assert!(out.text.starts_with("#if defined(__GNUC__) || defined(__clang__)"));
}

#[test]
fn unreadable_input_is_fatal() {
    let config = ObfuscationConfig { seed: Some(1), ..Scheme::Easy.config() };
    let err = token_only(config).run(&SourceUnit::from_text("int a;\0int b;")).unwrap_err();
    assert!(err.to_string().contains("unreadable"));
}

#[test]
fn report_serializes_to_json() {
    let config = ObfuscationConfig { seed: Some(8), ..Scheme::Diff.config() };
    let out = token_only(config).run(&SourceUnit::from_text("int main(void) { return 255; }\n")).expect("run");
    let json = serde_json::to_value(&out.report).expect("json");
    assert_eq!(json["strategy"], "token_based");
    assert_eq!(json["seed"], 8);
    assert_eq!(json["source_sha256"].as_str().map(str::len), Some(64));
    assert!(chrono::DateTime::parse_from_rfc3339(json["started_at"].as_str().unwrap_or("")).is_ok());
}
