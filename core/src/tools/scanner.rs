//! Lightweight lexical scanners used by `files.outline`.
//!
//! Heuristic, line-based symbol detection. Each language gets its own scanner
//! so the rules for one language never leak into another.

use serde::Serialize;
use std::path::Path;

/// Kind of symbol a scanner recognised on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Type,
    Import,
    Module,
}

/// One entry of a file outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineEntry {
    pub line: usize,
    pub kind: SymbolKind,
    pub text: String,
}

/// Classifies individual source lines for one language.
pub trait LexicalScanner: Send + Sync {
    fn language(&self) -> &'static str;

    /// File extensions (without the dot) this scanner handles.
    fn extensions(&self) -> &'static [&'static str];

    /// Classify a single line with leading whitespace already removed.
    fn classify(&self, line: &str) -> Option<SymbolKind>;
}

/// Strip any of the given leading keywords (each followed by whitespace).
fn strip_modifiers<'a>(mut line: &'a str, modifiers: &[&str]) -> &'a str {
    loop {
        let before = line;
        for m in modifiers {
            if let Some(rest) = line.strip_prefix(m) {
                if rest.starts_with(char::is_whitespace) || rest.starts_with('(') {
                    line = rest.trim_start();
                    // pub(crate) and friends
                    if line.starts_with('(') {
                        if let Some(end) = line.find(')') {
                            line = line[end + 1..].trim_start();
                        }
                    }
                }
            }
        }
        if line == before {
            return line;
        }
    }
}

fn starts_with_keyword(line: &str, keyword: &str) -> bool {
    line.strip_prefix(keyword)
        .map(|rest| rest.starts_with(char::is_whitespace))
        .unwrap_or(false)
}

pub struct RustScanner;

impl LexicalScanner for RustScanner {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn classify(&self, line: &str) -> Option<SymbolKind> {
        if starts_with_keyword(line, "use") || line.starts_with("pub use ") {
            return Some(SymbolKind::Import);
        }
        let line = strip_modifiers(line, &["pub", "async", "const", "unsafe", "extern"]);
        if starts_with_keyword(line, "fn") {
            Some(SymbolKind::Function)
        } else if ["struct", "enum", "trait", "type", "union"]
            .iter()
            .any(|k| starts_with_keyword(line, k))
        {
            Some(SymbolKind::Type)
        } else if starts_with_keyword(line, "mod") || starts_with_keyword(line, "impl") {
            Some(SymbolKind::Module)
        } else {
            None
        }
    }
}

pub struct PythonScanner;

impl LexicalScanner for PythonScanner {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn classify(&self, line: &str) -> Option<SymbolKind> {
        if starts_with_keyword(line, "import") || starts_with_keyword(line, "from") {
            Some(SymbolKind::Import)
        } else if starts_with_keyword(line, "def") || line.starts_with("async def ") {
            Some(SymbolKind::Function)
        } else if starts_with_keyword(line, "class") {
            Some(SymbolKind::Type)
        } else {
            None
        }
    }
}

pub struct TypeScriptScanner;

impl LexicalScanner for TypeScriptScanner {
    fn language(&self) -> &'static str {
        "typescript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx", "js", "jsx", "mjs", "cjs"]
    }

    fn classify(&self, line: &str) -> Option<SymbolKind> {
        if starts_with_keyword(line, "import") || line.contains("require(") {
            return Some(SymbolKind::Import);
        }
        let line = strip_modifiers(line, &["export", "default", "declare", "abstract", "async"]);
        if starts_with_keyword(line, "function") || line.starts_with("function*") {
            Some(SymbolKind::Function)
        } else if ["class", "interface", "type", "enum"]
            .iter()
            .any(|k| starts_with_keyword(line, k))
        {
            Some(SymbolKind::Type)
        } else if starts_with_keyword(line, "namespace") || starts_with_keyword(line, "module") {
            Some(SymbolKind::Module)
        } else if (starts_with_keyword(line, "const") || starts_with_keyword(line, "let"))
            && line.contains("=>")
        {
            Some(SymbolKind::Function)
        } else {
            None
        }
    }
}

/// Picks a scanner by file extension.
pub struct ScannerRegistry {
    scanners: Vec<Box<dyn LexicalScanner>>,
}

impl Default for ScannerRegistry {
    fn default() -> Self {
        Self {
            scanners: vec![
                Box::new(RustScanner),
                Box::new(PythonScanner),
                Box::new(TypeScriptScanner),
            ],
        }
    }
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scanner: Box<dyn LexicalScanner>) {
        self.scanners.push(scanner);
    }

    pub fn for_path(&self, path: &Path) -> Option<&dyn LexicalScanner> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.scanners
            .iter()
            .find(|s| s.extensions().contains(&ext.as_str()))
            .map(|s| s.as_ref())
    }

    /// Outline a file's content. Unsupported file types yield no entries.
    pub fn outline(&self, path: &Path, content: &str) -> Vec<OutlineEntry> {
        let Some(scanner) = self.for_path(path) else {
            return Vec::new();
        };

        content
            .lines()
            .enumerate()
            .filter_map(|(i, raw)| {
                let line = raw.trim_start();
                scanner.classify(line).map(|kind| OutlineEntry {
                    line: i + 1,
                    kind,
                    text: line.trim_end().to_string(),
                })
            })
            .collect()
    }
}
