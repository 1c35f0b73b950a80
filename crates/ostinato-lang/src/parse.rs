//! Section splitter and header parser.
//!
//! The slider/config grammars are deliberately permissive, the way the
//! dialect is parsed in the wild: garbage between fields is skipped,
//! unmatched quotes read to the end of the token.

use std::collections::HashSet;

use crate::error::{ParseError, ParseErrorKind};
use crate::source::{
    ConfigItem, Header, Section, SliderDecl, SliderShape, Toplevel, MAX_CHANNELS, MAX_SLIDERS,
};

/// Parse a leading decimal number (C-locale `strtod` flavor). Returns the
/// value and the number of bytes consumed; no number consumes nothing.
pub(crate) fn scan_number(s: &str) -> (f64, usize) {
    let bytes = s.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_len = i - digits_start;
    let mut frac_len = 0;
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        frac_len = i - start;
    }
    if int_len == 0 && frac_len == 0 {
        return (0.0, 0);
    }
    // optional exponent
    let mantissa_end = i;
    if i < bytes.len() && (bytes[i] | 0x20) == b'e' {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    let text = &s[..i];
    match text.parse::<f64>() {
        Ok(v) => (v, i),
        Err(_) => s[..mantissa_end].parse::<f64>().map(|v| (v, mantissa_end)).unwrap_or((0.0, 0)),
    }
}

fn is_space(c: u8) -> bool {
    c == b' ' || c == b'\t' || c == b'\r' || c == b'\n' || c == 0x0b || c == 0x0c
}

/// Split a source into header and sections (pass 1). `header_only` stops
/// at the first `@` line. Errors carry 1-based line numbers.
pub fn parse_toplevel(text: &str, header_only: bool) -> Result<Toplevel, ParseError> {
    let mut toplevel = Toplevel::default();
    let mut current: Option<CurrentSection> = None;

    enum CurrentSection {
        Init,
        Slider,
        Block,
        Sample,
        Serialize,
        Gfx,
    }

    for (lineno, line) in text.lines().enumerate() {
        let lineno = lineno as u32;
        if let Some(stripped) = line.strip_prefix('@') {
            if header_only {
                return Ok(toplevel);
            }
            let mut tokens = stripped.split_ascii_whitespace();
            let name = tokens.next().unwrap_or("");
            let target = match name {
                "init" => CurrentSection::Init,
                "slider" => CurrentSection::Slider,
                "block" => CurrentSection::Block,
                "sample" => CurrentSection::Sample,
                "serialize" => CurrentSection::Serialize,
                "gfx" => {
                    let w = tokens.next().map(|t| scan_number(t).0 as i64).unwrap_or(0);
                    let h = tokens.next().map(|t| scan_number(t).0 as i64).unwrap_or(0);
                    toplevel.gfx_w = if w > 0 { w as u32 } else { 0 };
                    toplevel.gfx_h = if h > 0 { h as u32 } else { 0 };
                    CurrentSection::Gfx
                }
                _ => {
                    return Err(ParseError::new(lineno + 1, format!("Invalid section: {line}"))
                        .with_kind(ParseErrorKind::UnknownSection));
                }
            };
            {
                let slot = match &target {
                    CurrentSection::Init => &mut toplevel.init,
                    CurrentSection::Slider => &mut toplevel.slider,
                    CurrentSection::Block => &mut toplevel.block,
                    CurrentSection::Sample => &mut toplevel.sample,
                    CurrentSection::Serialize => &mut toplevel.serialize,
                    CurrentSection::Gfx => &mut toplevel.gfx,
                };
                new_or_append(slot, lineno);
            }
            current = Some(target);
        } else {
            let section = match &current {
                None => &mut toplevel.header,
                Some(CurrentSection::Init) => toplevel.init.as_mut().unwrap(),
                Some(CurrentSection::Slider) => toplevel.slider.as_mut().unwrap(),
                Some(CurrentSection::Block) => toplevel.block.as_mut().unwrap(),
                Some(CurrentSection::Sample) => toplevel.sample.as_mut().unwrap(),
                Some(CurrentSection::Serialize) => toplevel.serialize.as_mut().unwrap(),
                Some(CurrentSection::Gfx) => toplevel.gfx.as_mut().unwrap(),
            };
            section.text.push_str(line);
            section.text.push('\n');
        }
    }

    Ok(toplevel)
}

/// Open a fresh section at `line_no` (0-based directive line), or pad an
/// existing one with blank lines so the appended body keeps its real line
/// numbers.
fn new_or_append(slot: &mut Option<Section>, line_no: u32) {
    match slot {
        None => {
            *slot = Some(Section {
                line_offset: line_no + 1,
                text: String::new(),
            });
        }
        Some(section) => {
            let num_lines = section.text.bytes().filter(|&b| b == b'\n').count() as u32;
            let pad = (line_no + 1).saturating_sub(section.line_offset + num_lines);
            for _ in 0..pad {
                section.text.push('\n');
            }
        }
    }
}

/// Parse header directives (pass 2).
pub fn parse_header(section: &Section) -> Result<Header, ParseError> {
    let mut header = Header::default();
    let mut config_identifiers: HashSet<String> = HashSet::new();

    let mut lineno = section.line_offset;
    for line in section.text.lines() {
        if let Some(rest) = line.strip_prefix("desc:") {
            if header.desc.is_empty() {
                header.desc = rest.trim().to_string();
            }
        } else if let Some(rest) = line.strip_prefix("author:") {
            if header.author.is_empty() {
                header.author = rest.trim().to_string();
            }
        } else if let Some(rest) = line.strip_prefix("tags:") {
            if header.tags.is_empty() {
                header.tags = rest.split_ascii_whitespace().map(String::from).collect();
            }
        } else if let Some(rest) = line.strip_prefix("in_pin:") {
            header.explicit_pins = true;
            header.in_pins.push(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("out_pin:") {
            header.explicit_pins = true;
            header.out_pins.push(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("config:") {
            let item = parse_config_line(rest);
            if config_item_is_valid(&item) {
                let key = item.identifier.to_ascii_lowercase();
                if !config_identifiers.insert(key) {
                    return Err(ParseError::new(
                        lineno + 1,
                        format!("Duplicate config variable: {}", item.identifier),
                    ));
                }
                header.config_items.push(item);
            }
        } else if let Some(rest) = line.strip_prefix("options:") {
            parse_options_line(rest, &mut header.options);
        } else if let Some(rest) = line.strip_prefix("import") {
            if rest.starts_with(|c: char| c.is_ascii_whitespace()) {
                header.imports.push(rest.trim().to_string());
            }
        } else if let Some(slider) = parse_slider(line) {
            if (slider.id as usize) < MAX_SLIDERS {
                header.sliders.retain(|s| s.id != slider.id);
                header.sliders.push(slider);
            }
        } else if let Some((index, filename)) = parse_filename(line) {
            if index as usize == header.filenames.len() {
                header.filenames.push(filename);
            }
        }
        lineno += 1;
    }

    // some effects carry metadata in comments; accept it when the regular
    // directives said nothing
    for line in section.text.lines() {
        if let Some(rest) = line.strip_prefix("//author:") {
            if header.author.is_empty() {
                header.author = rest.trim().to_string();
            }
        } else if let Some(rest) = line.strip_prefix("//tags:") {
            if header.tags.is_empty() {
                header.tags = rest.split_ascii_whitespace().map(String::from).collect();
            }
        }
    }

    if header.in_pins.len() == 1 && header.in_pins[0].eq_ignore_ascii_case("none") {
        header.in_pins.clear();
    }
    if header.out_pins.len() == 1 && header.out_pins[0].eq_ignore_ascii_case("none") {
        header.out_pins.clear();
    }
    header.in_pins.truncate(MAX_CHANNELS);
    header.out_pins.truncate(MAX_CHANNELS);
    header.sliders.sort_by_key(|s| s.id);

    Ok(header)
}

fn parse_options_line(rest: &str, options: &mut crate::source::HeaderOptions) {
    let joined = collapse_spaces_around_equals(rest);
    for opt in joined.split_ascii_whitespace() {
        let (name, value) = match opt.split_once('=') {
            Some((n, v)) => (n, v),
            None => (opt, ""),
        };
        match name {
            "gmem" => options.gmem = value.to_string(),
            "maxmem" => {
                let v = scan_number(value).0 as i64;
                options.maxmem = v.clamp(0, u32::MAX as i64) as u32;
            }
            "prealloc" => {
                options.prealloc = if value == "*" {
                    -1
                } else {
                    scan_number(value).0 as i64
                };
            }
            "want_all_kb" => options.want_all_kb = true,
            "no_meter" => options.no_meter = true,
            "gfx_hz" => {
                let v = scan_number(value).0 as i64;
                if v > 0 && v < 2000 {
                    options.gfx_hz = v as u32;
                }
            }
            _ => {}
        }
    }
}

/// Rewrite `a = b` into `a=b` so option tokens survive whitespace-splitting.
fn collapse_spaces_around_equals(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_whitespace() {
            // peek past the run of spaces
            let mut rest = chars.clone();
            while rest.peek().is_some_and(|c| c.is_ascii_whitespace()) {
                rest.next();
            }
            if rest.peek() == Some(&'=') || out.ends_with('=') {
                chars = rest;
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Parse one `config:` line body (after the prefix).
pub fn parse_config_line(rest: &str) -> ConfigItem {
    let mut item = ConfigItem::default();
    let b = rest.as_bytes();
    let mut cur = 0usize;

    while cur < b.len() && is_space(b[cur]) {
        cur += 1;
    }

    // identifier
    let start = cur;
    while cur < b.len() && !is_space(b[cur]) {
        cur += 1;
    }
    item.identifier = rest[start..cur].to_string();

    while cur < b.len() && is_space(b[cur]) {
        cur += 1;
    }
    if cur >= b.len() {
        return item;
    }

    // display name, optionally quoted
    let closing = if b[cur] == b'"' || b[cur] == b'\'' {
        b[cur]
    } else {
        b' '
    };
    let name_start = cur;
    cur += 1;
    if cur >= b.len() {
        return item;
    }
    while cur < b.len() && b[cur] != closing {
        cur += 1;
    }
    if closing == b'"' {
        item.name = rest[name_start + 1..cur].to_string();
    } else {
        item.name = rest[name_start..cur].to_string();
    }
    cur = (cur + 1).min(b.len());

    while cur < b.len() && is_space(b[cur]) {
        cur += 1;
    }

    // default value
    let (value, used) = scan_number(&rest[cur..]);
    if used == 0 {
        return item;
    }
    item.default_value = value;
    cur += used;
    cur = (cur + 1).min(b.len());

    // option list: value [= label]
    while cur < b.len() {
        while cur < b.len() && is_space(b[cur]) {
            cur += 1;
        }
        let (value, used) = scan_number(&rest[cur..]);
        if used == 0 {
            return item;
        }
        let mut label = rest[cur..cur + used].to_string();
        cur += used;

        while cur < b.len() && is_space(b[cur]) {
            cur += 1;
        }

        if cur < b.len() && b[cur] == b'=' {
            cur += 1;
            while cur < b.len() && is_space(b[cur]) {
                cur += 1;
            }
            if cur < b.len() {
                let closing = if b[cur] == b'"' || b[cur] == b'\'' {
                    b[cur]
                } else {
                    b' '
                };
                let mut pos = cur + 1;
                while pos < b.len() && b[pos] != closing {
                    pos += 1;
                }
                match closing {
                    b'"' => {
                        label = rest[cur + 1..pos].to_string();
                    }
                    b' ' => {
                        label = rest[cur..pos].to_string();
                    }
                    _ => {
                        let end = pos + usize::from(pos < b.len());
                        label = rest[cur..end].to_string();
                    }
                }
                cur = pos + usize::from(pos < b.len());
            }
        }

        item.var_names.push(label);
        item.var_values.push(value);
    }

    item
}

/// A config item needs a usable identifier, a name and at least two
/// options to be worth offering.
pub fn config_item_is_valid(item: &ConfigItem) -> bool {
    item.identifier.len() >= 2
        && item.name.len() >= 2
        && item.var_names.len() >= 2
        && item.var_values.len() == item.var_names.len()
        && item.var_names.iter().all(|n| !n.is_empty())
}

/// Parse one `sliderN:` declaration; `None` when the line is not one.
pub fn parse_slider(line: &str) -> Option<SliderDecl> {
    let mut slider = SliderDecl::default();
    let b = line.as_bytes();
    let mut cur = 0usize;

    if b.len() < 6 || !b[..6].eq_ignore_ascii_case(b"slider") {
        return None;
    }
    cur += 6;

    // 1-based id
    let id_start = cur;
    while cur < b.len() && b[cur].is_ascii_digit() {
        cur += 1;
    }
    let id: u64 = line[id_start..cur].parse().ok()?;
    if !(1..=MAX_SLIDERS as u64).contains(&id) {
        return None;
    }
    slider.id = (id - 1) as u32;

    if cur >= b.len() || b[cur] != b':' {
        return None;
    }
    cur += 1;

    while cur < b.len() && is_space(b[cur]) {
        cur += 1;
    }

    // an '=' before any '<' or ',' introduces a custom variable name
    {
        let mut pos = cur;
        let mut var_end = None;
        while pos < b.len() {
            match b[pos] {
                b'=' => {
                    var_end = Some(pos);
                    break;
                }
                b'<' | b',' => break,
                _ => pos += 1,
            }
        }
        match var_end {
            Some(end) => {
                slider.var = line[cur..end].trim_end().to_string();
                cur = end + 1;
            }
            None => slider.var = format!("slider{id}"),
        }
    }

    if cur < b.len() && b[cur] == b'/' {
        // a path slider: /dir:default:description
        let path_start = cur;
        while cur < b.len() && b[cur] != b':' {
            cur += 1;
        }
        if cur >= b.len() {
            return None;
        }
        slider.path = line[path_start..cur].to_string();
        cur += 1;
        let (def, used) = scan_number(&line[cur..]);
        slider.def = def;
        cur += used;
        slider.inc = 1.0;
        slider.is_enum = true;

        while cur < b.len() && b[cur] != b':' {
            cur += 1;
        }
        if cur >= b.len() {
            return None;
        }
        cur += 1;
    } else {
        let (def, used) = scan_number(&line[cur..]);
        slider.def = def;
        cur += used;

        while cur < b.len() && b[cur] != b',' && b[cur] != b'<' {
            cur += 1;
        }
        if cur >= b.len() {
            return None;
        }

        if b[cur] == b',' {
            cur += 1;
        } else {
            // range specification
            cur += 1;
            let (min, used) = scan_number(&line[cur..]);
            slider.min = min;
            cur += used;

            while cur < b.len() && b[cur] != b',' && b[cur] != b'>' {
                cur += 1;
            }
            if cur >= b.len() {
                return None;
            }

            if b[cur] == b',' {
                cur += 1;
                let (max, used) = scan_number(&line[cur..]);
                slider.max = max;
                cur += used;

                while cur < b.len() && b[cur] != b',' && b[cur] != b'>' {
                    cur += 1;
                }
                if cur >= b.len() {
                    return None;
                }
            }

            if b[cur] == b',' {
                cur += 1;
                let (inc, used) = scan_number(&line[cur..]);
                slider.inc = inc;
                cur += used;

                while cur < b.len() && b[cur] != b'{' && b[cur] != b'>' && b[cur] != b':' {
                    cur += 1;
                }
                if cur >= b.len() {
                    return None;
                }

                if b[cur] == b'{' {
                    cur += 1;
                    let names_start = cur;
                    while cur < b.len() && b[cur] != b'}' && b[cur] != b'>' {
                        cur += 1;
                    }
                    if cur >= b.len() {
                        return None;
                    }
                    slider.is_enum = true;
                    slider.enum_names = line[names_start..cur]
                        .split(',')
                        .map(|n| n.trim().to_string())
                        .filter(|n| !n.is_empty())
                        .collect();
                }

                if cur < b.len() && b[cur] == b':' {
                    cur += 1;
                    if b.len() - cur >= 3 {
                        if b[cur..cur + 3].eq_ignore_ascii_case(b"log") {
                            slider.shape = SliderShape::Log;
                            cur += 3;
                        } else if b[cur..cur + 3].eq_ignore_ascii_case(b"sqr") {
                            slider.shape = SliderShape::Sqr;
                            slider.shape_modifier = 2.0;
                            cur += 3;
                        }
                    }

                    if cur < b.len() && b[cur] == b'=' {
                        cur += 1;
                        let (modifier, used) = scan_number(&line[cur..]);
                        slider.shape_modifier = modifier;
                        cur += used;

                        if modifier.abs() < 0.0001 {
                            if slider.shape == SliderShape::Sqr {
                                // power zero is degenerate
                                slider.shape = SliderShape::Linear;
                            }
                        } else if (modifier - slider.min).abs() < 0.0000001 {
                            slider.shape = SliderShape::Linear;
                        }
                        if (slider.max - slider.min).abs() < 1e-12 {
                            slider.shape = SliderShape::Linear;
                        }

                        while cur < b.len() && b[cur] != b'>' {
                            cur += 1;
                        }
                        if cur >= b.len() {
                            return None;
                        }
                    }
                }
            }

            while cur < b.len() && b[cur] != b'>' {
                cur += 1;
            }
            if cur >= b.len() {
                return None;
            }
            cur += 1;
        }

        while cur < b.len() && (b[cur] == b',' || is_space(b[cur])) {
            cur += 1;
        }
        if cur >= b.len() {
            return None;
        }
    }

    // description; a leading '-' hides the slider initially
    while cur < b.len() && is_space(b[cur]) {
        cur += 1;
    }
    slider.initially_visible = true;
    if cur < b.len() && b[cur] == b'-' {
        cur += 1;
        slider.initially_visible = false;
    }
    slider.desc = line[cur..].trim().to_string();
    if slider.desc.is_empty() {
        return None;
    }

    slider.exists = true;
    Some(slider)
}

/// Parse one `filename:n,path` line.
pub fn parse_filename(line: &str) -> Option<(u32, String)> {
    let rest = line.strip_prefix("filename:")?;
    let (index, used) = scan_number(rest);
    if used == 0 || index < 0.0 || index > u32::MAX as f64 {
        return None;
    }
    let rest = &rest[used..];
    let comma = rest.find(',')?;
    Some((index as u32, rest[comma + 1..].to_string()))
}
