//! Best-effort structural JSON repair
//!
//! [`StructuralRepair`] walks the candidate once, tracking the open containers and what
//! each one expects next (key, colon, value, comma). Separators are written lazily, so a
//! trailing comma never reaches the output and a missing one is inserted when the next
//! member starts. Anything left open at the end of input is closed.

/// Swappable repair strategy: take almost-JSON, return text that should parse
pub trait JsonRepair: Send + Sync {
    fn repair(&self, text: &str) -> String;
}

/// Default repair strategy
///
/// Handles trailing and missing commas, unquoted keys, single-quoted strings, comments,
/// Python/JavaScript literals, raw control characters and unescaped quotes inside strings,
/// mismatched or missing closers and input truncated mid-token. Text after the first
/// complete top-level value is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralRepair;

impl JsonRepair for StructuralRepair {
    fn repair(&self, text: &str) -> String {
        Repairer::new(text).run()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

impl Container {
    fn closer(self) -> char {
        match self {
            Container::Object => '}',
            Container::Array => ']',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Key,
    Colon,
    Value,
    CommaOrEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Key,
    Value,
}

#[derive(Debug)]
struct Frame {
    container: Container,
    expect: Expect,
    has_items: bool,
}

struct Repairer {
    chars: Vec<char>,
    pos: usize,
    out: String,
    stack: Vec<Frame>,
    done: bool,
}

impl Repairer {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            out: String::with_capacity(text.len() + 16),
            stack: Vec::new(),
            done: false,
        }
    }

    fn run(mut self) -> String {
        while !self.done && self.pos < self.chars.len() {
            let c = self.chars[self.pos];

            // Nothing counts until the first container opens
            if self.stack.is_empty() && c != '{' && c != '[' {
                self.pos += 1;
                continue;
            }

            match c {
                '{' => {
                    self.pos += 1;
                    self.open(Container::Object);
                }
                '[' => {
                    self.pos += 1;
                    self.open(Container::Array);
                }
                '}' => {
                    self.pos += 1;
                    self.close(Container::Object);
                }
                ']' => {
                    self.pos += 1;
                    self.close(Container::Array);
                }
                ':' | '=' => {
                    self.pos += 1;
                    self.colon();
                }
                ',' => {
                    self.pos += 1;
                    self.comma();
                }
                '"' | '\'' => self.string(c),
                '/' => self.comment(),
                '#' => self.skip_line(),
                '-' if self.peek(1).is_some_and(|n| n.is_alphabetic()) => self.word(),
                c if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
                c if c.is_alphabetic() || c == '_' || c == '$' => self.word(),
                _ => self.pos += 1,
            }
        }

        while !self.stack.is_empty() {
            self.close_top();
        }
        self.out
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Role the next scalar or container would play, without writing anything
    fn peek_role(&self) -> Option<Role> {
        match self.stack.last() {
            None if self.done => None,
            None => Some(Role::Value),
            Some(frame) => match (frame.container, frame.expect) {
                (Container::Object, Expect::Key | Expect::CommaOrEnd) => Some(Role::Key),
                (Container::Object, Expect::Colon | Expect::Value) => Some(Role::Value),
                (Container::Array, _) => Some(Role::Value),
            },
        }
    }

    /// Write whatever separator the enclosing container still owes, then return the role
    fn begin(&mut self) -> Option<Role> {
        let role = self.peek_role()?;
        if let Some(frame) = self.stack.last_mut() {
            match (frame.container, frame.expect) {
                (Container::Object, Expect::Key) | (Container::Array, Expect::Value)
                    if frame.has_items =>
                {
                    self.out.push(',')
                }
                (_, Expect::CommaOrEnd) => self.out.push(','),
                (Container::Object, Expect::Colon) => {
                    self.out.push(':');
                    frame.expect = Expect::Value;
                }
                _ => {}
            }
        }
        Some(role)
    }

    fn finish(&mut self, role: Role) {
        match self.stack.last_mut() {
            None => self.done = true,
            Some(frame) => match role {
                Role::Key => frame.expect = Expect::Colon,
                Role::Value => {
                    frame.expect = Expect::CommaOrEnd;
                    frame.has_items = true;
                }
            },
        }
    }

    fn open(&mut self, container: Container) {
        let Some(role) = self.begin() else {
            return;
        };
        if role == Role::Key {
            // A container where a key belongs gets an empty key
            self.out.push_str("\"\":");
        }
        self.out.push(match container {
            Container::Object => '{',
            Container::Array => '[',
        });
        self.stack.push(Frame {
            container,
            expect: match container {
                Container::Object => Expect::Key,
                Container::Array => Expect::Value,
            },
            has_items: false,
        });
    }

    fn close(&mut self, container: Container) {
        let Some(idx) = self.stack.iter().rposition(|f| f.container == container) else {
            return; // stray closer
        };
        while self.stack.len() > idx {
            self.close_top();
        }
    }

    fn close_top(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        if frame.container == Container::Object {
            match frame.expect {
                Expect::Colon => self.out.push_str(":null"),
                Expect::Value => self.out.push_str("null"),
                _ => {}
            }
        }
        self.out.push(frame.container.closer());
        self.finish(Role::Value);
    }

    fn colon(&mut self) {
        if let Some(frame) = self.stack.last_mut()
            && frame.container == Container::Object
            && frame.expect == Expect::Colon
        {
            self.out.push(':');
            frame.expect = Expect::Value;
        }
    }

    fn comma(&mut self) {
        let Some(frame) = self.stack.last_mut() else {
            return;
        };
        match (frame.container, frame.expect) {
            (Container::Object, Expect::CommaOrEnd) => frame.expect = Expect::Key,
            (Container::Array, Expect::CommaOrEnd) => frame.expect = Expect::Value,
            // Key with no value: `{"a",`
            (Container::Object, Expect::Colon) => {
                self.out.push_str(":null");
                frame.expect = Expect::Key;
                frame.has_items = true;
            }
            (Container::Object, Expect::Value) => {
                self.out.push_str("null");
                frame.expect = Expect::Key;
                frame.has_items = true;
            }
            _ => {}
        }
    }

    fn comment(&mut self) {
        match self.peek(1) {
            Some('/') => self.skip_line(),
            Some('*') => {
                self.pos += 2;
                while self.pos < self.chars.len() {
                    if self.chars[self.pos] == '*' && self.peek(1) == Some('/') {
                        self.pos += 2;
                        return;
                    }
                    self.pos += 1;
                }
            }
            _ => self.pos += 1,
        }
    }

    fn skip_line(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
            self.pos += 1;
        }
    }

    /// A quote ends the string only when what follows looks like JSON structure
    fn quote_closes_string(&self, quote_pos: usize) -> bool {
        let mut i = quote_pos + 1;
        while let Some(&c) = self.chars.get(i) {
            match c {
                '\n' | '\r' => return true,
                c if c.is_whitespace() => i += 1,
                ',' | ':' | '}' | ']' => return true,
                _ => return false,
            }
        }
        true
    }

    /// Four hex digits starting at `at`
    fn hex4(&self, at: usize) -> Option<u16> {
        let digits = self.chars.get(at..at + 4)?;
        if !digits.iter().all(char::is_ascii_hexdigit) {
            return None;
        }
        let hex: String = digits.iter().collect();
        u16::from_str_radix(&hex, 16).ok()
    }

    /// Copy a `\u` escape with `pos` on the `u`. Short escapes are dropped and
    /// unpaired surrogates become U+FFFD.
    fn unicode_escape(&mut self, content: &mut String) {
        let Some(code) = self.hex4(self.pos + 1) else {
            self.pos += 1;
            return;
        };
        self.pos += 5;

        match code {
            0xD800..=0xDBFF => {
                let low = (self.peek(0) == Some('\\') && self.peek(1) == Some('u'))
                    .then(|| self.hex4(self.pos + 2))
                    .flatten()
                    .filter(|low| (0xDC00..=0xDFFF).contains(low));
                match low {
                    Some(low) => {
                        content.push_str(&format!("\\u{code:04x}\\u{low:04x}"));
                        self.pos += 6;
                    }
                    None => content.push_str("\\ufffd"),
                }
            }
            0xDC00..=0xDFFF => content.push_str("\\ufffd"),
            _ => content.push_str(&format!("\\u{code:04x}")),
        }
    }

    fn string(&mut self, quote: char) {
        self.pos += 1;
        let mut content = String::new();

        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];

            if c == '\\' {
                self.pos += 1;
                match self.peek(0) {
                    None => break,
                    Some('u') => self.unicode_escape(&mut content),
                    Some(e @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't')) => {
                        content.push('\\');
                        content.push(e);
                        self.pos += 1;
                    }
                    Some(other) => {
                        if other != '\'' {
                            content.push_str("\\\\");
                        }
                        push_escaped(&mut content, other);
                        self.pos += 1;
                    }
                }
                continue;
            }

            if c == quote {
                if self.quote_closes_string(self.pos) {
                    self.pos += 1;
                    break;
                }
                push_escaped(&mut content, c);
                self.pos += 1;
                continue;
            }

            push_escaped(&mut content, c);
            self.pos += 1;
        }

        if let Some(role) = self.begin() {
            self.out.push('"');
            self.out.push_str(&content);
            self.out.push('"');
            self.finish(role);
        }
    }

    fn number(&mut self) {
        let start = self.pos;
        while let Some(c) = self.peek(0) {
            if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-') {
                self.pos += 1;
            } else {
                break;
            }
        }

        // `10px`, `2nd`: not a number after all
        if self.peek(0).is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos = start;
            self.word();
            return;
        }

        let raw: String = self.chars[start..self.pos].iter().collect();
        let Some(number) = normalize_number(&raw) else {
            return; // `...` placeholders and lone signs
        };

        if let Some(role) = self.begin() {
            let valid = serde_json::from_str::<serde_json::Number>(&number).is_ok();
            match role {
                Role::Value if valid => self.out.push_str(&number),
                _ => self.out.push_str(&quote(&raw)),
            }
            self.finish(role);
        }
    }

    fn word(&mut self) {
        let Some(role) = self.peek_role() else {
            return;
        };

        let start = self.pos;
        match role {
            Role::Key => {
                while let Some(c) = self.peek(0) {
                    if c.is_alphanumeric() || matches!(c, '_' | '$' | '-' | '.') {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
            }
            Role::Value => {
                while let Some(c) = self.peek(0) {
                    if matches!(c, ',' | '}' | ']' | '\n' | '\r') {
                        break;
                    }
                    self.pos += 1;
                }
            }
        }
        if self.pos == start {
            self.pos += 1;
            return;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let raw = raw.trim_end();

        if self.begin().is_none() {
            return;
        }
        match role {
            Role::Key => self.out.push_str(&quote(raw)),
            Role::Value => self.out.push_str(&literal(raw)),
        }
        self.finish(role);
    }
}

fn push_escaped(buf: &mut String, c: char) {
    match c {
        '"' => buf.push_str("\\\""),
        '\n' => buf.push_str("\\n"),
        '\r' => buf.push_str("\\r"),
        '\t' => buf.push_str("\\t"),
        c if (c as u32) < 0x20 => buf.push_str(&format!("\\u{:04x}", c as u32)),
        c => buf.push(c),
    }
}

fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if c == '\\' {
            quoted.push_str("\\\\");
        } else {
            push_escaped(&mut quoted, c);
        }
    }
    quoted.push('"');
    quoted
}

/// Bare word in value position: JSON, Python and JavaScript literals map over, anything
/// else becomes a string
fn literal(word: &str) -> String {
    match word {
        "true" | "True" | "TRUE" => "true".to_string(),
        "false" | "False" | "FALSE" => "false".to_string(),
        "null" | "None" | "nil" | "undefined" | "NaN" | "Infinity" | "-Infinity" => {
            "null".to_string()
        }
        other => quote(other),
    }
}

/// Coerce a scanned numeric token toward JSON number syntax; `None` if nothing is left
fn normalize_number(raw: &str) -> Option<String> {
    let mut s = raw.trim_start_matches('+').to_string();
    while s.ends_with(['.', 'e', 'E', '+', '-']) {
        s.pop();
    }
    if s.is_empty() || s == "-" {
        return None;
    }
    if s.starts_with('.') {
        s.insert(0, '0');
    } else if s.starts_with("-.") {
        s.insert(1, '0');
    }
    Some(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn repaired(text: &str) -> Value {
        let fixed = StructuralRepair.repair(text);
        serde_json::from_str(&fixed).unwrap_or_else(|e| panic!("{fixed:?} did not parse: {e}"))
    }

    #[test]
    fn test_valid_json_survives() {
        let text = r#"{"a": [1, 2.5, -3e2], "b": {"c": null, "d": true}, "e": "x\"y\\n"}"#;
        let original: Value = serde_json::from_str(text).unwrap();
        assert_eq!(repaired(text), original);
    }

    #[test]
    fn test_trailing_commas() {
        assert_eq!(repaired(r#"{"a": [1, 2,], }"#), json!({"a": [1, 2]}));
        assert_eq!(repaired("[1,,2]"), json!([1, 2]));
    }

    #[test]
    fn test_single_quotes() {
        assert_eq!(
            repaired("{'name': 'it's fine', 'n': 1}"),
            json!({"name": "it's fine", "n": 1})
        );
    }

    #[test]
    fn test_single_quoted_string_with_double_quote_inside() {
        assert_eq!(repaired(r#"{'say': 'a "b" c'}"#), json!({"say": "a \"b\" c"}));
    }

    #[test]
    fn test_unquoted_keys() {
        assert_eq!(
            repaired(r#"{name: "x", call_stack: ["main"], $id: 2}"#),
            json!({"name": "x", "call_stack": ["main"], "$id": 2})
        );
    }

    #[test]
    fn test_truncated_inside_string() {
        assert_eq!(
            repaired(r#"{"steps": [{"line": 1}, {"line": 2, "operation": "ass"#),
            json!({"steps": [{"line": 1}, {"line": 2, "operation": "ass"}]})
        );
    }

    #[test]
    fn test_truncated_after_key_or_colon() {
        assert_eq!(repaired(r#"{"a": 1, "b""#), json!({"a": 1, "b": null}));
        assert_eq!(repaired(r#"{"a": 1, "b":"#), json!({"a": 1, "b": null}));
        assert_eq!(repaired(r#"{"a": 1, "b": 2."#), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_truncated_escape() {
        assert_eq!(repaired(r#"{"a": "x\"#), json!({"a": "x"}));
    }

    #[test]
    fn test_comments_are_dropped() {
        let text = "{\n  // the answer\n  \"a\": 1, /* inline */ \"b\": 2 # trailing\n}";
        assert_eq!(repaired(text), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_python_and_js_literals() {
        assert_eq!(
            repaired(r#"{"ok": True, "no": False, "v": None, "u": undefined, "n": NaN}"#),
            json!({"ok": true, "no": false, "v": null, "u": null, "n": null})
        );
    }

    #[test]
    fn test_missing_commas_between_members() {
        assert_eq!(
            repaired("{\"a\": 1\n \"b\": \"x\"\n \"c\": [1 2]}"),
            json!({"a": 1, "b": "x", "c": [1, 2]})
        );
    }

    #[test]
    fn test_unescaped_quotes_inside_string() {
        assert_eq!(
            repaired(r#"{"msg": "say "hi" now", "n": 1}"#),
            json!({"msg": "say \"hi\" now", "n": 1})
        );
    }

    #[test]
    fn test_raw_newlines_and_tabs_in_string() {
        assert_eq!(
            repaired("{\"code\": \"def f():\n\treturn 1\"}"),
            json!({"code": "def f():\n\treturn 1"})
        );
    }

    #[test]
    fn test_mismatched_closer() {
        assert_eq!(repaired(r#"{"a": [1, 2}"#), json!({"a": [1, 2]}));
        assert_eq!(repaired(r#"{"a": 1}]}"#), json!({"a": 1}));
    }

    #[test]
    fn test_unquoted_string_values() {
        assert_eq!(
            repaired("{\"time\": O(n log n), \"space\": O(1)\n}"),
            json!({"time": "O(n log n)", "space": "O(1)"})
        );
    }

    #[test]
    fn test_number_oddities() {
        assert_eq!(
            repaired(r#"{"a": .5, "b": +3, "c": -.25, "d": 10px}"#),
            json!({"a": 0.5, "b": 3, "c": -0.25, "d": "10px"})
        );
    }

    #[test]
    fn test_ellipsis_placeholder_is_skipped() {
        assert_eq!(repaired("[1, 2, ...]"), json!([1, 2]));
    }

    #[test]
    fn test_leading_and_trailing_prose_dropped() {
        assert_eq!(
            repaired(r#"Sure! {"a": 1} Let me know if you need more {"b": 2}"#),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_no_json_at_all() {
        assert_eq!(StructuralRepair.repair("I cannot help with that."), "");
    }

    #[test]
    fn test_unicode_escape_kept_and_broken_one_dropped() {
        assert_eq!(repaired(r#"{"a": "é", "b": "x\u12"}"#), json!({"a": "é", "b": "x12"}));
    }

    #[test]
    fn test_cut_after_high_surrogate() {
        assert_eq!(repaired(r#"{"a":"x \ud83d"#), json!({"a": "x \u{fffd}"}));
    }

    #[test]
    fn test_lone_surrogates_replaced() {
        assert_eq!(
            repaired(r#"{"a": "x \ud83d y", "b": "\ude00z", "c": 1"#),
            json!({"a": "x \u{fffd} y", "b": "\u{fffd}z", "c": 1})
        );
    }

    #[test]
    fn test_surrogate_pair_kept() {
        assert_eq!(
            repaired(r#"{"a": "smile \ud83d\ude00", "b": "\u00e9""#),
            json!({"a": "smile 😀", "b": "é"})
        );
    }
}
