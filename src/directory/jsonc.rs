//! Relaxed JSON: `//` and `/* */` comments plus trailing commas.
//!
//! Both passes track string literals so that `"http://x"` or `"a,]"` inside
//! a value survive untouched.

use serde_json::Value;

/// Remove line and block comments outside string literals.
pub fn strip_jsonc_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                // Keep the newline so line numbers in parse errors stay right.
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Remove commas that are followed only by whitespace and a closing bracket.
pub fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if !matches!(next, Some('}') | Some(']')) {
                out.push(c);
            }
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

/// Parse strictly first, falling back to the relaxed dialect.
pub fn parse_relaxed(input: &str) -> serde_json::Result<Value> {
    serde_json::from_str(input).or_else(|_| {
        let stripped = strip_jsonc_comments(input);
        serde_json::from_str(&strip_trailing_commas(&stripped))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_line_and_block_comments() {
        let input = "{\n  // model choice\n  \"a\": 1, /* inline */ \"b\": 2\n}";
        assert_eq!(parse_relaxed(input).unwrap(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn comment_markers_inside_strings_survive() {
        let input = r#"{"url": "http://example.com/*x*/", "q": "say \"//hi\""}"#;
        assert_eq!(strip_jsonc_comments(input), input);
    }

    #[test]
    fn removes_trailing_commas_only() {
        let input = "{\"a\": [1, 2,], \"b\": \"x,]\",\n}";
        assert_eq!(
            parse_relaxed(input).unwrap(),
            json!({"a": [1, 2], "b": "x,]"})
        );
    }

    #[test]
    fn invalid_input_still_fails() {
        assert!(parse_relaxed("{ not json ").is_err());
    }
}
