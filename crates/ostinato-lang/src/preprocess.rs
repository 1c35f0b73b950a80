//! `<? … ?>` span expansion.
//!
//! Spans are evaluated with the shared preprocessor VM; whatever the
//! script printed replaces the span. Newlines inside a span are re-emitted
//! so the expanded text keeps the newline count of the input.

use std::collections::HashMap;

use ostinato_vm::Vm;

use crate::error::ParseError;

const OPEN: &str = "<?";
const CLOSE: &str = "?>";

/// Expand every preprocessor span of `text`. `env` entries are written
/// into `vm` first; state mutated by spans persists in `vm` for later
/// calls (and later files).
pub fn preprocess(
    text: &str,
    env: &HashMap<String, f64>,
    vm: &mut Vm,
) -> Result<String, ParseError> {
    for (name, value) in env {
        let id = vm.intern_var(name);
        vm.write_var_id(id, *value);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut line: u32 = 1;

    while let Some(open_at) = rest.find(OPEN) {
        let head = &rest[..open_at];
        out.push_str(head);
        line += count_newlines(head);

        let body_start = open_at + OPEN.len();
        let Some(close_rel) = rest[body_start..].find(CLOSE) else {
            return Err(ParseError::new(line, "unterminated preprocessor block"));
        };
        let body = &rest[body_start..body_start + close_rel];

        vm.take_output();
        vm.eval(body, line).map_err(|e| {
            ParseError::new(e.line, format!("preprocessor: {}", e.message))
        })?;
        out.push_str(&vm.take_output());

        // keep line accounting stable for the text that follows
        let body_newlines = count_newlines(body);
        for _ in 0..body_newlines {
            out.push('\n');
        }
        line += body_newlines;

        rest = &rest[body_start + close_rel + CLOSE.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

fn count_newlines(s: &str) -> u32 {
    s.bytes().filter(|&b| b == b'\n').count() as u32
}
