//! Rich presence scripts (spec §3 "Rich Presence", §4.E): a handful of
//! `Lookup:`/`Format:` tables plus an ordered `Display:` list of
//! guard-trigger + template pairs, the first matching guard winning.

use super::{parse_value, ParsedExpression};
use crate::error::{ParseError, ParseErrorKind};
use crate::memref::{EvalContext, MemRefArena, ModifiedMemRefArena, RawValue};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatType {
    Value,
    UnsignedValue,
    Score,
    Seconds,
    Centiseconds,
    Minutes,
    Frames,
    Float2,
    AsciiChar,
}

impl FormatType {
    fn from_name(name: &str) -> FormatType {
        match name.to_ascii_uppercase().as_str() {
            "SCORE" | "POINTS" | "VALUE" => FormatType::Score,
            "UNSIGNED" | "UNSIGNEDVALUE" => FormatType::UnsignedValue,
            "SECS" | "SECONDS" | "TIME" => FormatType::Seconds,
            "CENTISECS" | "CENTISECONDS" => FormatType::Centiseconds,
            "MINUTES" => FormatType::Minutes,
            "FRAMES" => FormatType::Frames,
            "FLOAT1" | "FLOAT2" => FormatType::Float2,
            "ASCIICHAR" => FormatType::AsciiChar,
            _ => FormatType::Value,
        }
    }

    fn apply(self, raw: RawValue) -> String {
        let v = raw.as_i64();
        match self {
            FormatType::Value | FormatType::Score => v.to_string(),
            FormatType::UnsignedValue => (v as u32).to_string(),
            FormatType::Seconds => format!("{}:{:02}", v / 60, v % 60),
            FormatType::Centiseconds => format!("{}:{:02}.{:02}", v / 6000, (v / 100) % 60, v % 100),
            FormatType::Minutes => format!("{}h{:02}", v / 60, v % 60),
            FormatType::Frames => format!("{:.2}", v as f64 / 60.0),
            FormatType::Float2 => format!("{:.2}", raw.as_f64()),
            FormatType::AsciiChar => char::from_u32(v as u32).map(|c| c.to_string()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: HashMap<i64, String>,
    default: Option<String>,
}

impl LookupTable {
    fn lookup(&self, key: i64) -> String {
        self.entries
            .get(&key)
            .cloned()
            .or_else(|| self.default.clone())
            .unwrap_or_default()
    }
}

struct DisplayEntry {
    guard: Option<ParsedExpression>,
    template: String,
}

/// A macro reference embedded in a display template: `@Name(expr)`.
struct MacroRef {
    name: String,
    expr: ParsedExpression,
    span: (usize, usize),
}

pub struct RichPresenceScript {
    lookups: HashMap<String, LookupTable>,
    formats: HashMap<String, FormatType>,
    displays: Vec<DisplayEntry>,
    macros: Vec<Vec<MacroRef>>,
}

impl RichPresenceScript {
    /// Evaluates guards top to bottom and returns the first match's
    /// macro-substituted text; falls back to the last (unconditioned)
    /// entry, or an empty string if the script has none.
    pub fn evaluate(&self, ctx: &mut EvalContext) -> String {
        for (i, display) in self.displays.iter().enumerate() {
            let matched = match &display.guard {
                None => true,
                Some(expr) => crate::eval::test_groups(expr, ctx),
            };
            if matched {
                return self.render(i, ctx);
            }
        }
        String::new()
    }

    fn render(&self, index: usize, ctx: &mut EvalContext) -> String {
        let template = &self.displays[index].template;
        let macros = &self.macros[index];
        if macros.is_empty() {
            return template.clone();
        }

        let mut out = String::with_capacity(template.len());
        let mut cursor = 0;
        for m in macros {
            out.push_str(&template[cursor..m.span.0]);
            let raw = crate::eval::evaluate_value(&m.expr, ctx);
            let rendered = match self.lookups.get(&m.name) {
                Some(table) => table.lookup(raw.as_i64()),
                None => {
                    let fmt = self.formats.get(&m.name).copied().unwrap_or(FormatType::Value);
                    fmt.apply(raw)
                }
            };
            out.push_str(&rendered);
            cursor = m.span.1;
        }
        out.push_str(&template[cursor..]);
        out
    }
}

pub fn parse(text: &str, arena: &mut MemRefArena, modified: &mut ModifiedMemRefArena) -> Result<RichPresenceScript, ParseError> {
    let mut lookups: HashMap<String, LookupTable> = HashMap::new();
    let mut formats: HashMap<String, FormatType> = HashMap::new();
    let mut raw_displays: Vec<String> = Vec::new();

    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        if let Some(name) = line.strip_prefix("Lookup:") {
            let mut table = LookupTable::default();
            while let Some(&next) = lines.peek() {
                if next.is_empty() || next.contains(':') && !next.contains('=') {
                    break;
                }
                let entry = lines.next().unwrap();
                if entry.is_empty() {
                    break;
                }
                if let Some((k, v)) = entry.split_once('=') {
                    if k == "*" {
                        table.default = Some(v.to_string());
                    } else if let Ok(key) = k.parse::<i64>() {
                        table.entries.insert(key, v.to_string());
                    }
                }
            }
            lookups.insert(name.trim().to_string(), table);
        } else if let Some(name) = line.strip_prefix("Format:") {
            let mut kind = FormatType::Value;
            while let Some(&next) = lines.peek() {
                if let Some(v) = next.strip_prefix("FormatType=") {
                    kind = FormatType::from_name(v.trim());
                    lines.next();
                    break;
                }
                if next.is_empty() {
                    break;
                }
                lines.next();
            }
            formats.insert(name.trim().to_string(), kind);
        } else if line.trim() == "Display:" {
            for entry in lines.by_ref() {
                if entry.trim().is_empty() {
                    continue;
                }
                raw_displays.push(entry.to_string());
            }
        }
    }

    if raw_displays.is_empty() {
        return Err(ParseError::new(text.len(), ParseErrorKind::UnexpectedEnd));
    }

    let mut displays = Vec::with_capacity(raw_displays.len());
    let mut macros = Vec::with_capacity(raw_displays.len());

    for line in &raw_displays {
        let (guard, template) = if let Some(rest) = line.strip_prefix('?') {
            let end = rest.find('?').ok_or_else(|| ParseError::new(0, ParseErrorKind::UnexpectedEnd))?;
            let guard_text = &rest[..end];
            let guard = parse_value(guard_text, arena, modified)?;
            (Some(guard), &rest[end + 1..])
        } else {
            (None, line.as_str())
        };

        let found_macros = extract_macros(template, arena, modified)?;
        displays.push(DisplayEntry { guard, template: template.to_string() });
        macros.push(found_macros);
    }

    Ok(RichPresenceScript { lookups, formats, displays, macros })
}

fn extract_macros(
    template: &str,
    arena: &mut MemRefArena,
    modified: &mut ModifiedMemRefArena,
) -> Result<Vec<MacroRef>, ParseError> {
    let mut result = Vec::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'@' {
            let name_start = i + 1;
            let mut j = name_start;
            while j < bytes.len() && bytes[j] != b'(' {
                j += 1;
            }
            if j >= bytes.len() {
                break;
            }
            let name = template[name_start..j].to_string();
            let expr_start = j + 1;
            let mut k = expr_start;
            while k < bytes.len() && bytes[k] != b')' {
                k += 1;
            }
            if k >= bytes.len() {
                return Err(ParseError::new(i, ParseErrorKind::UnexpectedEnd));
            }
            let expr_text = &template[expr_start..k];
            let expr = parse_value(expr_text, arena, modified)?;
            result.push(MacroRef { name, expr, span: (i, k + 1) });
            i = k + 1;
        } else {
            i += 1;
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memref::MemoryAccessor;

    struct Zero;
    impl MemoryAccessor for Zero {
        fn read_memory(&mut self, _address: u32, buffer: &mut [u8]) -> u32 {
            buffer.fill(0);
            buffer.len() as u32
        }
    }

    #[test]
    fn parses_lookup_and_display() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let script = "Lookup:Status\n0=Idle\n1=Running\n\nDisplay:\n@Status(0xH0010)\n";
        let rp = parse(script, &mut arena, &mut modified).unwrap();
        assert_eq!(rp.lookups.len(), 1);
        assert_eq!(rp.displays.len(), 1);
    }

    #[test]
    fn renders_lookup_macro() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let script = "Lookup:Status\n0=Idle\n1=Running\n\nDisplay:\n@Status(0xH0010)\n";
        let rp = parse(script, &mut arena, &mut modified).unwrap();
        let mut accessor = Zero;
        let mut ctx = EvalContext {
            arena: &mut arena,
            modified: &modified,
            accessor: &mut accessor,
            frame_id: 1,
        };
        assert_eq!(rp.evaluate(&mut ctx), "Idle");
    }
}
