//! Structural fact extraction from a declaration tree.
//!
//! `DeclarationParser` is the seam to an external front end. The bundled
//! implementation shells out to `clang -Xclang -ast-dump=json` and converts the
//! JSON AST into a `DeclarationTree` holding only the nodes the extractor can
//! use.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::SymbolRole;

/// Deepest JSON nesting walked before the tree is declared malformed.
const MAX_TREE_DEPTH: usize = 512;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("declaration parser unavailable: {0}")]
    Unavailable(String),
    #[error("declaration parser rejected the unit: {0}")]
    Rejected(String),
    #[error("declaration tree traversal failed: {0}")]
    Traversal(String),
}

/// Declaration kinds the extractor distinguishes. Everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeclKind {
    Function,
    Variable,
    Parameter,
    Field,
    Record,
    Typedef,
    Enum,
    EnumConstant,
    Other,
}

impl DeclKind {
    fn from_clang(kind: &str) -> Self {
        match kind {
            "FunctionDecl" => DeclKind::Function,
            "VarDecl" => DeclKind::Variable,
            "ParmVarDecl" => DeclKind::Parameter,
            "FieldDecl" => DeclKind::Field,
            "RecordDecl" => DeclKind::Record,
            "TypedefDecl" => DeclKind::Typedef,
            "EnumDecl" => DeclKind::Enum,
            "EnumConstantDecl" => DeclKind::EnumConstant,
            _ => DeclKind::Other,
        }
    }

    /// Rename role carried by a declaration of this kind, if any.
    pub fn role(self) -> Option<SymbolRole> {
        match self {
            DeclKind::Function => Some(SymbolRole::Function),
            DeclKind::Variable => Some(SymbolRole::Variable),
            DeclKind::Parameter => Some(SymbolRole::Parameter),
            DeclKind::Field => Some(SymbolRole::Field),
            DeclKind::Record | DeclKind::Typedef | DeclKind::Enum => Some(SymbolRole::Type),
            DeclKind::EnumConstant => Some(SymbolRole::EnumConstant),
            DeclKind::Other => None,
        }
    }
}

/// One node of the declaration tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeclNode {
    pub kind: Option<DeclKind>,
    pub name: Option<String>,
    /// Located in the unit itself rather than an included file.
    pub in_main_file: bool,
    /// Compiler-synthesized declaration.
    pub implicit: bool,
    /// Spelled inside a macro expansion.
    pub from_macro: bool,
    /// Function definition with a body, or a complete record/enum definition.
    pub has_body: bool,
    pub is_extern: bool,
    pub children: Vec<DeclNode>,
}

impl DeclNode {
    pub fn decl_kind(&self) -> DeclKind {
        self.kind.unwrap_or(DeclKind::Other)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeclarationTree {
    pub roots: Vec<DeclNode>,
}

impl DeclarationTree {
    /// Walk every node whose kind is in `kinds` and that belongs to the unit:
    /// located in the main file, not implicit and not produced by a macro.
    pub fn visit<F>(&self, kinds: &[DeclKind], mut visitor: F)
    where
        F: FnMut(&DeclNode),
    {
        fn walk<F: FnMut(&DeclNode)>(node: &DeclNode, kinds: &[DeclKind], visitor: &mut F) {
            if kinds.contains(&node.decl_kind())
                && node.in_main_file
                && !node.implicit
                && !node.from_macro
            {
                visitor(node);
            }
            for child in &node.children {
                walk(child, kinds, visitor);
            }
        }
        for root in &self.roots {
            walk(root, kinds, &mut visitor);
        }
    }

    /// Declarations that name rename candidates: defined functions,
    /// non-`extern` variables, and every named parameter, field, tag, typedef
    /// and enumerator.
    pub fn declarations(&self) -> Vec<(String, SymbolRole)> {
        let mut out = Vec::new();
        self.visit(CANDIDATE_KINDS, |node| {
            let Some(name) = node.name.as_deref().filter(|n| !n.is_empty()) else {
                return;
            };
            let keep = match node.decl_kind() {
                DeclKind::Function => node.has_body,
                DeclKind::Variable => !node.is_extern,
                DeclKind::Record | DeclKind::Enum => node.has_body,
                _ => true,
            };
            if let (true, Some(role)) = (keep, node.decl_kind().role()) {
                out.push((name.to_string(), role));
            }
        });
        out
    }
}

pub const CANDIDATE_KINDS: &[DeclKind] = &[
    DeclKind::Function,
    DeclKind::Variable,
    DeclKind::Parameter,
    DeclKind::Field,
    DeclKind::Record,
    DeclKind::Typedef,
    DeclKind::Enum,
    DeclKind::EnumConstant,
];

/// Per-unit inputs to a parser.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Where the unit came from; its directory is added to the include path.
    pub path: Option<PathBuf>,
    pub args: Vec<String>,
}

/// Capability to turn a unit into a declaration tree.
pub trait DeclarationParser: Send + Sync {
    fn parse(&self, text: &str, options: &ParseOptions) -> Result<DeclarationTree, ParseError>;
    fn name(&self) -> &'static str;
}

/// Build a `DeclarationTree` from a clang `-ast-dump=json` document.
pub fn tree_from_clang_json(body: &str) -> Result<DeclarationTree, ParseError> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| ParseError::Traversal(format!("failed to parse clang JSON: {e}")))?;
    let mut state = LocState::default();
    let node = convert(&root, &mut state, 0)?;
    Ok(DeclarationTree { roots: node.map(|n| n.children).unwrap_or_default() })
}

/// Clang prints a location's file only when it differs from the previously
/// printed one, so the current file has to be carried through the walk in
/// document order.
#[derive(Debug, Default)]
struct LocState {
    in_main_file: bool,
    seen_file: bool,
}

impl LocState {
    fn observe(&mut self, loc: &Value) {
        if let Some(spelling) = loc.get("spellingLoc") {
            self.observe_plain(spelling);
        }
        if let Some(expansion) = loc.get("expansionLoc") {
            self.observe_plain(expansion);
        }
        self.observe_plain(loc);
    }

    fn observe_plain(&mut self, loc: &Value) {
        if loc.get("file").is_some() {
            self.seen_file = true;
            self.in_main_file = loc.get("includedFrom").is_none();
        }
    }

    /// Main-file status of a location after observing it. A location with no
    /// file yet printed belongs to the main file once any offset is present.
    fn main_file_at(&mut self, loc: &Value) -> bool {
        self.observe(loc);
        if self.seen_file {
            self.in_main_file
        } else {
            loc.get("offset").is_some() || loc.get("expansionLoc").is_some()
        }
    }
}

fn convert(value: &Value, state: &mut LocState, depth: usize) -> Result<Option<DeclNode>, ParseError> {
    if depth > MAX_TREE_DEPTH {
        return Err(ParseError::Traversal(format!("tree deeper than {MAX_TREE_DEPTH}")));
    }
    let Some(obj) = value.as_object() else {
        return Ok(None);
    };

    let loc = obj.get("loc").cloned().unwrap_or(Value::Null);
    let in_main_file = state.main_file_at(&loc);
    if let Some(range) = obj.get("range") {
        for end in ["begin", "end"] {
            if let Some(point) = range.get(end) {
                state.observe(point);
            }
        }
    }

    let kind_str = obj.get("kind").and_then(Value::as_str).unwrap_or("");
    let kind = DeclKind::from_clang(kind_str);

    let mut children = Vec::new();
    let mut has_compound_body = false;
    if let Some(inner) = obj.get("inner").and_then(Value::as_array) {
        for child in inner {
            if child.get("kind").and_then(Value::as_str) == Some("CompoundStmt") {
                has_compound_body = true;
            }
            if let Some(node) = convert(child, state, depth + 1)? {
                children.push(node);
            }
        }
    }

    if kind == DeclKind::Other && children.is_empty() {
        return Ok(None);
    }

    let has_body = match kind {
        DeclKind::Function => has_compound_body,
        DeclKind::Record | DeclKind::Enum => {
            obj.get("completeDefinition").and_then(Value::as_bool).unwrap_or(kind == DeclKind::Enum)
        }
        _ => false,
    };

    Ok(Some(DeclNode {
        kind: (kind != DeclKind::Other).then_some(kind),
        name: obj.get("name").and_then(Value::as_str).map(str::to_string),
        in_main_file,
        implicit: obj.get("isImplicit").and_then(Value::as_bool).unwrap_or(false),
        from_macro: loc.get("expansionLoc").is_some(),
        has_body,
        is_extern: obj.get("storageClass").and_then(Value::as_str) == Some("extern"),
        children,
    }))
}

#[cfg(feature = "clang-parser")]
pub use clang::ClangAstParser;

#[cfg(feature = "clang-parser")]
mod clang {
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;
    use std::process::{Command, Stdio};

    use super::{tree_from_clang_json, DeclarationParser, DeclarationTree, ParseError, ParseOptions};

    /// Clang-backed parser: runs `clang -Xclang -ast-dump=json -fsyntax-only`
    /// with the unit on stdin.
    #[derive(Debug, Clone, Default)]
    pub struct ClangAstParser {
        binary: Option<PathBuf>,
    }

    impl ClangAstParser {
        pub fn new(binary: Option<PathBuf>) -> Self {
            Self { binary }
        }

        /// Configured binary, then `VEIL_CLANG_BIN`, then `clang` on `PATH`.
        pub fn binary(&self) -> PathBuf {
            self.binary.clone().unwrap_or_else(resolve_clang_path)
        }
    }

    impl DeclarationParser for ClangAstParser {
        fn parse(&self, text: &str, options: &ParseOptions) -> Result<DeclarationTree, ParseError> {
            // Allow tests to feed a canned AST to avoid needing clang installed.
            if let Some(fake_json) = std::env::var_os("VEIL_CLANG_FAKE_JSON") {
                let body = fs::read_to_string(fake_json).map_err(|e| {
                    ParseError::Unavailable(format!("failed to read VEIL_CLANG_FAKE_JSON: {e}"))
                })?;
                return tree_from_clang_json(&body);
            }
            let json = run_clang_json(&self.binary(), text, options)?;
            tree_from_clang_json(&json)
        }

        fn name(&self) -> &'static str {
            "clang"
        }
    }

    fn resolve_clang_path() -> PathBuf {
        std::env::var_os("VEIL_CLANG_BIN").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("clang"))
    }

    fn run_clang_json(clang: &PathBuf, text: &str, options: &ParseOptions) -> Result<String, ParseError> {
        let mut cmd = Command::new(clang);
        cmd.args(["-Xclang", "-ast-dump=json", "-fsyntax-only"]);
        if let Some(dir) = options.path.as_deref().and_then(|p| p.parent()) {
            if !dir.as_os_str().is_empty() {
                cmd.arg(format!("-I{}", dir.display()));
            }
        }
        cmd.args(&options.args);
        cmd.args(["-x", "c", "-"]);
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ParseError::Unavailable(format!("failed to spawn clang: {e}")))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| ParseError::Unavailable(format!("failed to feed clang: {e}")))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| ParseError::Unavailable(format!("failed to wait for clang: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first = stderr.lines().next().unwrap_or("").trim().to_string();
            return Err(ParseError::Rejected(format!("clang exited with {}: {first}", output.status)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
      "kind": "TranslationUnitDecl",
      "inner": [
        {"kind": "TypedefDecl", "loc": {}, "isImplicit": true, "name": "__int128_t"},
        {"kind": "FunctionDecl", "loc": {"offset": 10, "file": "/usr/include/stdio.h", "line": 3,
                 "includedFrom": {"file": "<stdin>"}},
         "name": "printf"},
        {"kind": "FunctionDecl", "loc": {"offset": 5, "file": "<stdin>", "line": 1},
         "name": "helper",
         "inner": [
           {"kind": "ParmVarDecl", "loc": {"offset": 16}, "name": "count"},
           {"kind": "CompoundStmt", "inner": [
             {"kind": "DeclStmt", "inner": [
               {"kind": "VarDecl", "loc": {"offset": 30}, "name": "total"}
             ]}
           ]}
         ]},
        {"kind": "FunctionDecl", "loc": {"offset": 60}, "name": "proto_only"},
        {"kind": "VarDecl", "loc": {"offset": 80}, "name": "shared", "storageClass": "extern"},
        {"kind": "RecordDecl", "loc": {"offset": 90}, "name": "point", "completeDefinition": true,
         "inner": [{"kind": "FieldDecl", "loc": {"offset": 100}, "name": "px"}]},
        {"kind": "VarDecl", "loc": {"spellingLoc": {"offset": 5, "file": "m.h", "includedFrom": {"file": "<stdin>"}},
          "expansionLoc": {"offset": 120, "file": "<stdin>"}}, "name": "from_macro"}
      ]
    }"#;

    #[test]
    fn keeps_only_unit_declarations_with_bodies() {
        let tree = tree_from_clang_json(SAMPLE).expect("tree");
        let mut names: Vec<(String, SymbolRole)> = tree.declarations();
        names.sort();
        assert_eq!(
            names,
            vec![
                ("count".to_string(), SymbolRole::Parameter),
                ("helper".to_string(), SymbolRole::Function),
                ("point".to_string(), SymbolRole::Type),
                ("px".to_string(), SymbolRole::Field),
                ("total".to_string(), SymbolRole::Variable),
            ]
        );
    }

    #[test]
    fn visitor_filters_by_kind() {
        let tree = tree_from_clang_json(SAMPLE).expect("tree");
        let mut seen = Vec::new();
        tree.visit(&[DeclKind::Field, DeclKind::Parameter], |node| {
            seen.push(node.name.clone().unwrap_or_default());
        });
        assert_eq!(seen, vec!["count".to_string(), "px".to_string()]);
    }

    #[test]
    fn malformed_json_is_a_traversal_error() {
        assert!(matches!(tree_from_clang_json("{not json"), Err(ParseError::Traversal(_))));
    }
}
