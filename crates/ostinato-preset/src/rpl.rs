//! RPL preset-library reader/writer and bank primitives.
//!
//! The format is a whitespace/quote token stream: a case-insensitive
//! `<REAPER_PRESET_LIBRARY "name">` element containing `<PRESET name …>`
//! children whose bodies are base64 state payloads split across lines.
//!
//! Banks are immutable values: every primitive returns a new bank and the
//! caller swaps pointers.

use std::path::Path;

use crate::base64;
use crate::error::BankError;
use crate::state::{FxState, SliderValue};

const SLIDER_TOKENS_HEAD: usize = 64;
const SLIDER_TOKENS_TAIL: usize = 192;
const WRAP_COLUMNS: usize = 128;

/// One named preset.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: String,
    /// The name token as it appears inside the payload text, quoting
    /// included; kept verbatim so a rewrite does not disturb it.
    pub blob_name: String,
    pub state: FxState,
}

/// An ordered, named collection of presets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bank {
    pub name: String,
    pub presets: Vec<Preset>,
}

impl Bank {
    pub fn empty(name: &str) -> Bank {
        Bank {
            name: name.to_string(),
            presets: Vec::new(),
        }
    }

    /// 0 when absent, `index + 1` when present. The last name match wins.
    pub fn preset_exists(&self, name: &str) -> u32 {
        let mut found = 0;
        for (i, preset) in self.presets.iter().enumerate() {
            if preset.name == name {
                found = i as u32 + 1;
            }
        }
        found
    }

    /// Insert or replace by name; replacement keeps the preset's slot.
    pub fn add_preset(&self, name: &str, state: FxState) -> Bank {
        let mut bank = self.clone();
        let preset = Preset {
            name: name.to_string(),
            blob_name: escape_string(name),
            state,
        };
        match self.preset_exists(name) {
            0 => bank.presets.push(preset),
            found => bank.presets[found as usize - 1] = preset,
        }
        bank
    }

    /// Remove by name; a miss returns an unchanged copy.
    pub fn delete_preset(&self, name: &str) -> Bank {
        let mut bank = self.clone();
        if let found @ 1.. = self.preset_exists(name) {
            bank.presets.remove(found as usize - 1);
        }
        bank
    }

    /// Rename; a miss returns an unchanged copy.
    pub fn rename_preset(&self, from: &str, to: &str) -> Bank {
        let mut bank = self.clone();
        if let found @ 1.. = self.preset_exists(from) {
            let preset = &mut bank.presets[found as usize - 1];
            preset.name = to.to_string();
            preset.blob_name = escape_string(to);
        }
        bank
    }

    // ------------------------------------------------------------------
    // text codec

    pub fn from_rpl_text(text: &str) -> Result<Bank, BankError> {
        // line breaks count as plain separators
        let flat: String = text
            .chars()
            .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
            .collect();
        let tokens = tokenize(&flat);

        let mut it = tokens.iter();
        let head = it.next().ok_or(BankError::NotAPresetLibrary)?;
        if !head.eq_ignore_ascii_case("<REAPER_PRESET_LIBRARY") {
            return Err(BankError::NotAPresetLibrary);
        }
        let name = it.next().cloned().unwrap_or_default();

        let mut presets = Vec::new();
        while let Some(token) = it.next() {
            if token != "<PRESET" {
                continue;
            }
            let preset_name = it
                .next()
                .ok_or_else(|| BankError::Malformed("preset without a name".into()))?;
            let mut blob = Vec::new();
            for part in it.by_ref() {
                if part == ">" {
                    break;
                }
                blob.extend_from_slice(&base64::decode(part));
            }
            presets.push(parse_preset_blob(preset_name, &blob));
        }

        Ok(Bank { name, presets })
    }

    pub fn to_rpl_text(&self) -> String {
        let mut out = String::with_capacity(4096);
        out.push_str("<REAPER_PRESET_LIBRARY ");
        out.push_str(&escape_string(&self.name));
        out.push('\n');

        for preset in &self.presets {
            out.push_str("  <PRESET `");
            out.push_str(&preset.name);
            out.push_str("`\n");
            out.push_str(&preset_body(&preset.blob_name, &preset.state));
            out.push_str("  >\n");
        }

        out.push_str(">\n");
        out
    }
}

/// Read a preset bank from an RPL file.
pub fn load_bank(path: &Path) -> Result<Bank, BankError> {
    let text = std::fs::read_to_string(path).map_err(|e| BankError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Bank::from_rpl_text(&text)
}

/// Write a preset bank to an RPL file.
pub fn save_bank(path: &Path, bank: &Bank) -> Result<(), BankError> {
    std::fs::write(path, bank.to_rpl_text()).map_err(|e| BankError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

// ----------------------------------------------------------------------
// tokenizer

/// Split on whitespace, honoring `"`, `'` and backquote quoting. Quotes
/// are stripped; an unmatched quote consumes to the end of input.
fn tokenize(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        if matches!(bytes[i], b'"' | b'\'' | b'`') {
            let quote = bytes[i];
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i] != quote {
                i += 1;
            }
            tokens.push(text[start..i].to_string());
            i = (i + 1).min(bytes.len());
        } else {
            let start = i;
            while i < bytes.len() && bytes[i] != b' ' {
                i += 1;
            }
            tokens.push(text[start..i].to_string());
        }
    }
    tokens
}

// ----------------------------------------------------------------------
// payload codec

/// Decode one preset payload: NUL-separated token text and raw blob.
fn parse_preset_blob(name: &str, data: &[u8]) -> Preset {
    let nul = data.iter().position(|&b| b == 0);
    let (text_bytes, raw) = match nul {
        Some(pos) => (&data[..pos], &data[pos + 1..]),
        None => (data, &data[data.len()..]),
    };
    let mut text = String::from_utf8_lossy(text_bytes).into_owned();

    // names with embedded quotes break tokenization; neutralize the name
    // token before splitting and keep its original spelling
    let mut blob_name = None;
    if has_funky_characters(name) & 7 != 0 {
        if let Some(replaced) = neutralize_name_token(&mut text, name) {
            blob_name = Some(replaced);
        }
    }

    let tokens = tokenize(&text);
    let token = |i: usize| tokens.get(i).map(String::as_str).unwrap_or("");

    let mut sliders = Vec::new();
    for i in 0..SLIDER_TOKENS_HEAD {
        push_slider(&mut sliders, i as u32, token(i));
    }
    if blob_name.is_none() {
        blob_name = Some(escape_string(token(SLIDER_TOKENS_HEAD)));
    }
    if !token(SLIDER_TOKENS_HEAD + 1).is_empty() {
        for i in 0..SLIDER_TOKENS_TAIL {
            push_slider(
                &mut sliders,
                (SLIDER_TOKENS_HEAD + i) as u32,
                token(SLIDER_TOKENS_HEAD + 1 + i),
            );
        }
    }

    let mut blob_name = blob_name.unwrap_or_default();
    if blob_name.is_empty() {
        blob_name = escape_string(name);
    }

    Preset {
        name: name.to_string(),
        blob_name,
        state: FxState {
            sliders,
            data: raw.to_vec(),
        },
    }
}

fn push_slider(sliders: &mut Vec<SliderValue>, index: u32, token: &str) {
    if token.is_empty() || token == "-" {
        return;
    }
    sliders.push(SliderValue {
        index,
        value: parse_value(token),
    });
}

fn parse_value(token: &str) -> f64 {
    // leading-number semantics: trailing garbage is ignored
    let bytes = token.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    while end < bytes.len()
        && (bytes[end].is_ascii_digit()
            || bytes[end] == b'.'
            || bytes[end] == b'e'
            || bytes[end] == b'E'
            || ((bytes[end] == b'+' || bytes[end] == b'-')
                && (bytes[end - 1] | 0x20) == b'e'))
    {
        end += 1;
    }
    token[..end].parse().unwrap_or(0.0)
}

/// Find the (unique) occurrence of `name` inside `text`, blank the full
/// surrounding token with underscores, and return that token verbatim.
fn neutralize_name_token(text: &mut String, name: &str) -> Option<String> {
    let pos = text.find(name)?;
    if text[pos + name.len()..].contains(name) {
        // ambiguous; leave the payload alone
        return None;
    }

    let bytes = text.as_bytes();
    let mut start = pos;
    while start > 0 && bytes[start - 1] != b' ' {
        start -= 1;
    }
    let mut stop = pos + name.len();
    while stop < bytes.len() && bytes[stop] != b' ' {
        stop += 1;
    }

    let replaced = text[start..stop].to_string();
    let blank: String = "_".repeat(stop - start);
    text.replace_range(start..stop, &blank);
    Some(replaced)
}

fn preset_body(blob_name: &str, state: &FxState) -> String {
    let mut values = [0.0f64; 256];
    let mut used = [false; 256];
    let mut has_tail = false;
    for slider in &state.sliders {
        let index = slider.index as usize;
        if index < 256 {
            values[index] = slider.value;
            used[index] = true;
            if index >= SLIDER_TOKENS_HEAD {
                has_tail = true;
            }
        }
    }

    let mut blob = String::with_capacity(1024);
    for i in 0..SLIDER_TOKENS_HEAD {
        if used[i] {
            blob.push_str(&format_value(values[i]));
            blob.push(' ');
        } else {
            blob.push_str("- ");
        }
    }
    blob.push_str(blob_name);
    blob.push(' ');
    if has_tail {
        for i in 0..SLIDER_TOKENS_TAIL {
            if used[SLIDER_TOKENS_HEAD + i] {
                blob.push_str(&format_value(values[SLIDER_TOKENS_HEAD + i]));
                blob.push(' ');
            } else {
                blob.push_str("- ");
            }
        }
    }
    blob.pop();
    blob.push('\0');

    let mut bytes = blob.into_bytes();
    bytes.extend_from_slice(&state.data);

    let encoded = base64::encode(&bytes);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / WRAP_COLUMNS * 5 + 8);
    let mut rest = encoded.as_str();
    while !rest.is_empty() {
        let take = rest.len().min(WRAP_COLUMNS);
        out.push_str("    ");
        out.push_str(&rest[..take]);
        out.push('\n');
        rest = &rest[take..];
    }
    out
}

/// Print with at most six decimals, trailing zeros trimmed.
fn format_value(value: f64) -> String {
    let mut s = format!("{:.6}", value);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s
}

fn has_funky_characters(s: &str) -> u32 {
    let mut flags = 0;
    for c in s.chars() {
        match c {
            '"' => flags |= 1,
            '\'' => flags |= 2,
            '`' => flags |= 4,
            ' ' => flags |= 8,
            _ => {}
        }
        if flags == 15 {
            break;
        }
    }
    flags
}

/// Quote a name for embedding: pick an unused quote character; when all
/// three appear, use backquotes and demote inner backquotes.
pub(crate) fn escape_string(s: &str) -> String {
    let flags = has_funky_characters(s);
    if flags == 0 {
        return s.to_string();
    }
    if flags != 15 {
        let quote = if flags & 1 != 0 {
            if flags & 2 != 0 {
                '`'
            } else {
                '\''
            }
        } else {
            '"'
        };
        format!("{quote}{s}{quote}")
    } else {
        let inner: String = s.chars().map(|c| if c == '`' { '\'' } else { c }).collect();
        format!("`{inner}`")
    }
}
