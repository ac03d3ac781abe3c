//! Call-site rewriting for blocking input primitives
//!
//! Submitted code calls a blocking primitive (`prompt(...)`, `input(...)`) that
//! cannot block inside an isolated context. The scanner below finds bare calls
//! of such a primitive outside string literals and comments and turns each one
//! into `await <replacement>(...)`, keeping the argument text as written.
//!
//! Only ASCII bytes are syntactically significant, so the scanner walks bytes
//! and only ever slices at ASCII positions.

/// Lexical flavour of the scanned source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// `'`, `"` and back-tick strings, `//` and `/* */` comments
    JavaScript,
    /// `'`, `"` and triple-quoted strings, `#` comments
    Python,
}

/// Outcome of a rewrite pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub code: String,
    /// Calls whose argument was a single quoted literal
    pub literal_calls: usize,
    /// Calls with any other argument (including none)
    pub expression_calls: usize,
}

impl Rewrite {
    pub fn total(&self) -> usize {
        self.literal_calls + self.expression_calls
    }

    pub fn changed(&self) -> bool {
        self.total() > 0
    }
}

/// Keywords that, directly before the callee, mean this is not a plain call
const BLOCKED_PREFIXES: &[&str] = &["def", "function", "await"];

/// Rewrite every bare `callee(...)` call into `await replacement(...)`
pub fn rewrite_calls(code: &str, syntax: Syntax, callee: &str, replacement: &str) -> Rewrite {
    let bytes = code.as_bytes();
    let mut out = String::with_capacity(code.len());
    let mut literal_calls = 0;
    let mut expression_calls = 0;
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = skip_non_code(bytes, i, syntax) {
            i = end;
            continue;
        }

        let Some(open) = call_site(bytes, i, callee, syntax) else {
            i += 1;
            continue;
        };

        let Some(close) = matching_paren(bytes, open, syntax) else {
            // Unbalanced: leave this occurrence as written.
            i += callee.len();
            continue;
        };

        let args = &code[open + 1..close];
        let args = if is_single_literal(args, syntax) {
            literal_calls += 1;
            args.to_owned()
        } else {
            expression_calls += 1;
            let nested = rewrite_calls(args, syntax, callee, replacement);
            literal_calls += nested.literal_calls;
            expression_calls += nested.expression_calls;
            nested.code
        };

        out.push_str(&code[copied..i]);
        out.push_str("await ");
        out.push_str(replacement);
        out.push('(');
        out.push_str(&args);
        out.push(')');

        i = close + 1;
        copied = i;
    }

    out.push_str(&code[copied..]);
    Rewrite {
        code: out,
        literal_calls,
        expression_calls,
    }
}

/// Top-level module names imported by Python code, in first-seen order
///
/// Relative imports and `__future__` are skipped.
pub fn scan_imports(code: &str) -> Vec<String> {
    let mut modules: Vec<String> = Vec::new();
    let mut add = |name: &str| {
        let root = name.trim().split('.').next().unwrap_or_default();
        if !root.is_empty()
            && root != "__future__"
            && root.bytes().all(is_ident_byte)
            && !modules.iter().any(|m| m == root)
        {
            modules.push(root.to_owned());
        }
    };

    for line in code.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if let Some(rest) = line.strip_prefix("import ") {
            for item in rest.split(',') {
                let name = item.split(" as ").next().unwrap_or_default();
                add(name);
            }
        } else if let Some(rest) = line.strip_prefix("from ") {
            let name = rest.split_whitespace().next().unwrap_or_default();
            if !name.starts_with('.') && rest.contains(" import ") {
                add(name);
            }
        }
    }

    modules
}

/// Wrap Python code as the body of `async def <name>():`
///
/// Every line is indented by four spaces except continuation lines of
/// triple-quoted strings, whose content must not change. An empty submission
/// gets a `pass` body.
pub fn wrap_async(code: &str, name: &str) -> String {
    let spans = triple_quoted_spans(code);
    let mut out = format!("async def {name}():\n");
    let mut has_body = false;
    let mut offset = 0;

    for line in code.split_inclusive('\n') {
        let in_string = spans
            .iter()
            .any(|&(start, end)| start < offset && offset < end);
        offset += line.len();

        if in_string {
            out.push_str(line);
        } else if line.trim().is_empty() {
            out.push('\n');
            continue;
        } else {
            out.push_str("    ");
            out.push_str(line);
            has_body = true;
        }
        if !line.ends_with('\n') {
            out.push('\n');
        }
    }

    if !has_body {
        out.push_str("    pass\n");
    }
    out
}

/// If position `i` starts a string literal or comment, return the index just past it
fn skip_non_code(bytes: &[u8], i: usize, syntax: Syntax) -> Option<usize> {
    match (syntax, bytes[i]) {
        (_, b'\'' | b'"') | (Syntax::JavaScript, b'`') => {
            Some(scan_literal(bytes, i, syntax).end)
        }
        (Syntax::JavaScript, b'/') => match bytes.get(i + 1) {
            Some(b'/') => Some(line_end(bytes, i)),
            Some(b'*') => Some(
                find(bytes, i + 2, b"*/")
                    .map(|pos| pos + 2)
                    .unwrap_or(bytes.len()),
            ),
            _ => None,
        },
        (Syntax::Python, b'#') => Some(line_end(bytes, i)),
        _ => None,
    }
}

struct Literal {
    end: usize,
    terminated: bool,
}

/// Scan a string literal starting at the quote at `start`
fn scan_literal(bytes: &[u8], start: usize, syntax: Syntax) -> Literal {
    let quote = bytes[start];

    if syntax == Syntax::Python && bytes[start..].starts_with(&[quote; 3]) {
        let delimiter = [quote; 3];
        let mut i = start + 3;
        while i < bytes.len() {
            if bytes[i] == b'\\' {
                i += 2;
            } else if bytes[i..].starts_with(&delimiter) {
                return Literal {
                    end: i + 3,
                    terminated: true,
                };
            } else {
                i += 1;
            }
        }
        return Literal {
            end: bytes.len(),
            terminated: false,
        };
    }

    let multiline = quote == b'`';
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if !multiline => {
                return Literal {
                    end: i,
                    terminated: false,
                };
            }
            b if b == quote => {
                return Literal {
                    end: i + 1,
                    terminated: true,
                };
            }
            _ => i += 1,
        }
    }
    Literal {
        end: bytes.len(),
        terminated: false,
    }
}

/// If a bare call of `callee` starts at `i`, return the index of its `(`
fn call_site(bytes: &[u8], i: usize, callee: &str, syntax: Syntax) -> Option<usize> {
    if !bytes[i..].starts_with(callee.as_bytes()) {
        return None;
    }
    if i > 0 && is_word_byte(bytes[i - 1], syntax) {
        return None;
    }

    let mut open = i + callee.len();
    if bytes.get(open).is_some_and(|&b| is_word_byte(b, syntax)) {
        return None;
    }
    while bytes.get(open).is_some_and(|&b| b == b' ' || b == b'\t') {
        open += 1;
    }
    if bytes.get(open) != Some(&b'(') {
        return None;
    }

    let mut before = i;
    while before > 0 && bytes[before - 1].is_ascii_whitespace() {
        before -= 1;
    }
    if before > 0 && bytes[before - 1] == b'.' {
        return None;
    }
    let word_end = before;
    while before > 0 && is_word_byte(bytes[before - 1], syntax) {
        before -= 1;
    }
    let previous = &bytes[before..word_end];
    if BLOCKED_PREFIXES.iter().any(|kw| kw.as_bytes() == previous) {
        return None;
    }

    Some(open)
}

/// Index of the `)` closing the `(` at `open`, skipping strings and comments
fn matching_paren(bytes: &[u8], open: usize, syntax: Syntax) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        if let Some(end) = skip_non_code(bytes, i, syntax) {
            i = end;
            continue;
        }
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn is_single_literal(args: &str, syntax: Syntax) -> bool {
    let trimmed = args.trim();
    let bytes = trimmed.as_bytes();
    let Some(&first) = bytes.first() else {
        return false;
    };
    let is_quote = match syntax {
        Syntax::JavaScript => matches!(first, b'\'' | b'"' | b'`'),
        Syntax::Python => matches!(first, b'\'' | b'"'),
    };
    if !is_quote {
        return false;
    }
    let literal = scan_literal(bytes, 0, syntax);
    literal.terminated && literal.end == bytes.len()
}

fn triple_quoted_spans(code: &str) -> Vec<(usize, usize)> {
    let bytes = code.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if (b == b'\'' || b == b'"') && bytes[i..].starts_with(&[b; 3]) {
            let end = scan_literal(bytes, i, Syntax::Python).end;
            spans.push((i, end));
            i = end;
        } else if let Some(end) = skip_non_code(bytes, i, Syntax::Python) {
            i = end;
        } else {
            i += 1;
        }
    }
    spans
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_word_byte(b: u8, syntax: Syntax) -> bool {
    is_ident_byte(b) || b >= 0x80 || (syntax == Syntax::JavaScript && b == b'$')
}

fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |pos| from + pos)
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| from + pos)
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn code_without_callee_is_unchanged(code in "[a-z0-9 ()'\"#=+\\n]{0,64}") {
            prop_assume!(!code.contains("input"));
            let result = rewrite_calls(&code, Syntax::Python, "input", "async_input");
            prop_assert_eq!(result.total(), 0);
            prop_assert_eq!(&result.code, &code);
        }

        #[test]
        fn rewriting_twice_changes_nothing_more(arg in "[a-z' ]{0,12}") {
            let code = format!("x = input({arg})");
            let once = rewrite_calls(&code, Syntax::Python, "input", "async_input");
            let twice = rewrite_calls(&once.code, Syntax::Python, "input", "async_input");
            prop_assert_eq!(twice.total(), 0);
            prop_assert_eq!(twice.code, once.code);
        }

        #[test]
        fn literal_prompt_is_preserved(text in "[A-Za-z0-9 ?:]{0,20}") {
            let code = format!("prompt('{text}')");
            let result = rewrite_calls(&code, Syntax::JavaScript, "prompt", "__runnrPrompt");
            prop_assert_eq!(result.literal_calls, 1);
            prop_assert_eq!(result.code, format!("await __runnrPrompt('{text}')"));
        }
    }
}
