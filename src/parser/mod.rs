//! Component B: the expression parser (spec §4.B).
//!
//! Bit-exact compatibility with the grammar in spec §4.B is the point —
//! this is a persistent on-wire format. Evaluation semantics (spec §4.D)
//! live in [`crate::eval`]; this module only builds the typed operand
//! graph and condition lists.

pub mod condition;
pub mod leaderboard;
pub mod rich_presence;
pub mod value;

pub use condition::{Condition, ConditionGroup, ConditionKind, Operator};

use crate::error::{ParseError, ParseErrorKind};
use crate::memref::{
    MemRefArena, MemSize, ModifiedMemRefArena, ModifiedMemRefKind, ModifierOp, Operand, OperandView,
};

/// A parsed trigger or value expression: the core group plus any
/// alternates (spec §3 "Trigger", grammar `trigger := condset { "S"
/// condset }`).
#[derive(Debug, Clone, Default)]
pub struct ParsedExpression {
    pub groups: Vec<ConditionGroup>,
    pub measured_target: Option<u32>,
    /// The exact text this was parsed from; canonical re-serialization
    /// (spec §8 property 5) is just handing this back rather than
    /// reconstructing it from the condition tree, since AddSource/
    /// AddAddress folding is lossy about the original flag layout.
    pub source: String,
}

pub fn parse_trigger(
    text: &str,
    arena: &mut MemRefArena,
    modified: &mut ModifiedMemRefArena,
) -> Result<ParsedExpression, ParseError> {
    Parser::new(text, arena, modified, false).parse_expression()
}

pub fn parse_value(
    text: &str,
    arena: &mut MemRefArena,
    modified: &mut ModifiedMemRefArena,
) -> Result<ParsedExpression, ParseError> {
    Parser::new(text, arena, modified, true).parse_expression()
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    arena: &'a mut MemRefArena,
    modified: &'a mut ModifiedMemRefArena,
    is_value: bool,
    measured_target: Option<u32>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, arena: &'a mut MemRefArena, modified: &'a mut ModifiedMemRefArena, is_value: bool) -> Self {
        Parser {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            arena,
            modified,
            is_value,
            measured_target: None,
        }
    }

    fn err(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.pos, kind)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str_ci(&mut self, s: &str) -> bool {
        let s = s.as_bytes();
        if self.pos + s.len() > self.bytes.len() {
            return false;
        }
        if self.bytes[self.pos..self.pos + s.len()].eq_ignore_ascii_case(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn parse_expression(mut self) -> Result<ParsedExpression, ParseError> {
        let mut groups = vec![self.parse_condset()?];
        while self.eat(b'S') {
            groups.push(self.parse_condset()?);
        }
        Ok(ParsedExpression {
            groups,
            measured_target: self.measured_target,
            source: self.text.to_string(),
        })
    }

    fn parse_condset(&mut self) -> Result<ConditionGroup, ParseError> {
        let mut group = ConditionGroup::default();

        if self.pos >= self.bytes.len() || self.peek() == Some(b'S') {
            // empty group - the editor allows it, spec requires support
            return Ok(group);
        }

        let mut accumulator: Option<Operand> = None;
        let mut address_base: Option<Operand> = None;

        loop {
            let cond = self.parse_condition(&mut accumulator, &mut address_base)?;
            group.has_pause |= cond.kind == ConditionKind::PauseIf;
            group.conditions.push(cond);

            if self.eat(b'_') {
                continue;
            }
            break;
        }

        if group.has_pause {
            propagate_pause(&mut group.conditions);
        }
        resolve_recalls(&mut group.conditions);

        Ok(group)
    }

    fn parse_flag(&mut self) -> ConditionKind {
        if let Some(c0) = self.peek() {
            if c0.is_ascii_uppercase() && self.peek_at(1) == Some(b':') {
                if let Some(kind) = ConditionKind::from_flag(c0 as char) {
                    self.pos += 2;
                    return kind;
                }
            }
        }
        ConditionKind::Standard
    }

    fn parse_condition(
        &mut self,
        accumulator: &mut Option<Operand>,
        address_base: &mut Option<Operand>,
    ) -> Result<Condition, ParseError> {
        let base_for_this = address_base.take();
        let kind = self.parse_flag();

        if self.is_value && matches!(kind, ConditionKind::Standard | ConditionKind::Trigger) {
            return Err(self.err(ParseErrorKind::InvalidValueFlag));
        }

        let mut operand1 = self.parse_operand(base_for_this)?;
        let (op, operand2) = self.parse_operator_and_operand2(base_for_this)?;

        if op == Operator::None {
            let allowed = matches!(
                kind,
                ConditionKind::AddAddress
                    | ConditionKind::AddSource
                    | ConditionKind::SubSource
                    | ConditionKind::Remember
                    | ConditionKind::Measured
            );
            if !allowed {
                return Err(self.err(ParseErrorKind::InvalidOperator));
            }
        }

        let required_hits = self.parse_hits()?;

        // Fold any preceding AddSource/SubSource accumulator into this
        // condition's operand1 (spec §4.D step 1; everyone except the
        // accumulator-building conditions themselves consumes it).
        if !kind.is_add_source_family() {
            if let Some(acc) = accumulator.take() {
                operand1 = push_combine(self.modified, ModifierOp::Add, acc, operand1);
            }
        }

        if kind == ConditionKind::Measured {
            self.update_measured_target(required_hits, op, operand2)?;
        }

        let cond = Condition::new(kind, operand1, op, operand2, required_hits);

        match kind {
            ConditionKind::AddSource => {
                let value = combine_operand(self.modified, operand1, op, operand2);
                *accumulator = Some(fold_running_total(self.modified, accumulator.take(), ModifierOp::Add, value));
            }
            ConditionKind::SubSource => {
                let value = combine_operand(self.modified, operand1, op, operand2);
                *accumulator = Some(fold_running_total(self.modified, accumulator.take(), ModifierOp::Sub, value));
            }
            ConditionKind::AddAddress => {
                let pointer = combine_operand(self.modified, operand1, op, operand2);
                *address_base = Some(pointer);
            }
            _ => {}
        }

        Ok(cond)
    }

    fn update_measured_target(&mut self, required_hits: u32, op: Operator, operand2: Operand) -> Result<(), ParseError> {
        if self.is_value {
            // A Measured flag in a value expression just marks which
            // condset contributes the displayed value; there is no
            // separate numeric target to track.
            return Ok(());
        }

        let target = if required_hits != 0 {
            required_hits
        } else if op != Operator::None {
            match operand2.kind {
                crate::memref::OperandKind::ConstInt(v) => v,
                crate::memref::OperandKind::ConstFloat(f) => f as u32,
                _ => return Err(self.err(ParseErrorKind::InvalidMeasuredTarget)),
            }
        } else {
            return Err(self.err(ParseErrorKind::InvalidMeasuredTarget));
        };

        if let Some(existing) = self.measured_target {
            if existing != target {
                return Err(self.err(ParseErrorKind::MultipleMeasured));
            }
        } else {
            self.measured_target = Some(target);
        }
        Ok(())
    }

    fn parse_operator_and_operand2(&mut self, base: Option<Operand>) -> Result<(Operator, Operand), ParseError> {
        let op = match (self.peek(), self.peek_at(1)) {
            (Some(b'='), _) => {
                self.pos += 1;
                Operator::Eq
            }
            (Some(b'!'), Some(b'=')) => {
                self.pos += 2;
                Operator::Ne
            }
            (Some(b'<'), Some(b'=')) => {
                self.pos += 2;
                Operator::Le
            }
            (Some(b'<'), _) => {
                self.pos += 1;
                Operator::Lt
            }
            (Some(b'>'), Some(b'=')) => {
                self.pos += 2;
                Operator::Ge
            }
            (Some(b'>'), _) => {
                self.pos += 1;
                Operator::Gt
            }
            (Some(b'&'), _) => {
                self.pos += 1;
                Operator::And
            }
            (Some(b'^'), _) => {
                self.pos += 1;
                Operator::Xor
            }
            (Some(b'*'), _) => {
                self.pos += 1;
                Operator::Mul
            }
            (Some(b'/'), _) => {
                self.pos += 1;
                Operator::Div
            }
            (Some(b'%'), _) => {
                self.pos += 1;
                Operator::Mod
            }
            (Some(b'+'), _) => {
                self.pos += 1;
                Operator::Add
            }
            (Some(b'-'), _) => {
                self.pos += 1;
                Operator::Sub
            }
            _ => return Ok((Operator::None, Operand::constant(1))),
        };

        let operand2 = self.parse_operand(base)?;
        Ok((op, operand2))
    }

    fn parse_hits(&mut self) -> Result<u32, ParseError> {
        if !self.eat(b'.') {
            return Ok(0);
        }
        let start = self.pos;
        while self.peek().map(|b| b.is_ascii_digit()).unwrap_or(false) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err(ParseErrorKind::MissingOperand));
        }
        let digits = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        let hits: u32 = digits.parse().map_err(|_| self.err(ParseErrorKind::MissingOperand))?;
        if !self.eat(b'.') {
            return Err(self.err(ParseErrorKind::MissingOperand));
        }
        Ok(hits)
    }

    fn parse_operand(&mut self, indirect_base: Option<Operand>) -> Result<Operand, ParseError> {
        if self.eat_str_ci("{recall}") {
            return Ok(Operand::unresolved_recall());
        }

        let mut view = OperandView::Current;
        let mut bcd = false;
        match self.peek() {
            Some(b'd') | Some(b'D') => {
                view = OperandView::Delta;
                self.pos += 1;
            }
            Some(b'p') | Some(b'P') => {
                view = OperandView::Prior;
                self.pos += 1;
            }
            Some(b'b') | Some(b'B') => {
                bcd = true;
                self.pos += 1;
            }
            Some(b'~') => {
                view = OperandView::Inverted;
                self.pos += 1;
            }
            _ => {}
        }

        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.pos += 2;
            return self.parse_address_spec(view, bcd, indirect_base);
        }

        if bcd || view != OperandView::Current {
            // a prefix was consumed but no address-spec followed
            return Err(self.err(ParseErrorKind::MissingOperand));
        }

        self.parse_constant()
    }

    fn parse_address_spec(
        &mut self,
        view: OperandView,
        bcd: bool,
        indirect_base: Option<Operand>,
    ) -> Result<Operand, ParseError> {
        let letter = match self.peek() {
            Some(c) if c.is_ascii_alphabetic() => {
                let c = c as char;
                self.pos += 1;
                Some(c.to_ascii_uppercase())
            }
            _ => None,
        };

        let mut size = MemSize::from_letter(letter).ok_or_else(|| self.err(ParseErrorKind::UnknownSize))?;
        if bcd {
            size = to_bcd(size);
        }

        let start = self.pos;
        while self.peek().map(|b| b.is_ascii_hexdigit()).unwrap_or(false) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err(ParseErrorKind::MissingOperand));
        }
        let hex = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        let address = u32::from_str_radix(hex, 16).map_err(|_| self.err(ParseErrorKind::AddressOutOfRange))?;

        let operand = match indirect_base {
            Some(base) => {
                let id = self.modified.push(ModifiedMemRefKind::Indirect {
                    base,
                    offset: Operand::constant(address),
                    size,
                });
                let mut o = Operand::modified(id, size);
                o.view = view;
                o
            }
            None => {
                let id = self.arena.get_or_create(address, size);
                Operand::memref(id, size, view)
            }
        };

        Ok(operand)
    }

    fn parse_constant(&mut self) -> Result<Operand, ParseError> {
        match self.peek() {
            Some(b'f') | Some(b'F') => {
                self.pos += 1;
                let start = self.pos;
                while self
                    .peek()
                    .map(|b| b.is_ascii_digit() || b == b'.')
                    .unwrap_or(false)
                {
                    self.pos += 1;
                }
                if self.pos == start {
                    return Err(self.err(ParseErrorKind::MissingOperand));
                }
                let s = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
                let f: f64 = s.parse().map_err(|_| self.err(ParseErrorKind::MissingOperand))?;
                Ok(Operand::constant_float(f))
            }
            Some(b'h') | Some(b'H') => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().map(|b| b.is_ascii_hexdigit()).unwrap_or(false) {
                    self.pos += 1;
                }
                if self.pos == start {
                    return Err(self.err(ParseErrorKind::MissingOperand));
                }
                let s = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
                let v = u32::from_str_radix(s, 16).map_err(|_| self.err(ParseErrorKind::MissingOperand))?;
                Ok(Operand::constant(v))
            }
            Some(b'0'..=b'9') => {
                let start = self.pos;
                while self.peek().map(|b| b.is_ascii_digit()).unwrap_or(false) {
                    self.pos += 1;
                }
                let s = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
                let v: u32 = s.parse().map_err(|_| self.err(ParseErrorKind::MissingOperand))?;
                Ok(Operand::constant(v))
            }
            _ => Err(self.err(ParseErrorKind::MissingOperand)),
        }
    }
}

fn to_bcd(size: MemSize) -> MemSize {
    use MemSize::*;
    match size {
        Byte => Bcd8,
        Word16LE => Bcd16LE,
        Word16BE => Bcd16BE,
        TriByteLE => Bcd24LE,
        TriByteBE => Bcd24BE,
        Word32LE => Bcd32LE,
        Word32BE => Bcd32BE,
        other => other,
    }
}

fn operator_to_modifier(op: Operator) -> Option<ModifierOp> {
    match op {
        Operator::And => Some(ModifierOp::And),
        Operator::Xor => Some(ModifierOp::Xor),
        Operator::Mul => Some(ModifierOp::Mul),
        Operator::Div => Some(ModifierOp::Div),
        Operator::Mod => Some(ModifierOp::Mod),
        Operator::Add => Some(ModifierOp::Add),
        Operator::Sub => Some(ModifierOp::Sub),
        _ => None,
    }
}

fn push_combine(modified: &mut ModifiedMemRefArena, op: ModifierOp, a: Operand, b: Operand) -> Operand {
    let size = if a.size.bit_width() >= b.size.bit_width() { a.size } else { b.size };
    let id = modified.push(ModifiedMemRefKind::Combine { op, parent: a, modifier: b });
    Operand::modified(id, size)
}

/// `operand1 op operand2`, used when `op` belongs to the arithmetic
/// family (AddSource/SubSource/AddAddress's own value, spec §4.D step 1).
fn combine_operand(modified: &mut ModifiedMemRefArena, operand1: Operand, op: Operator, operand2: Operand) -> Operand {
    match operator_to_modifier(op) {
        Some(mop) => push_combine(modified, mop, operand1, operand2),
        None => operand1,
    }
}

fn fold_running_total(modified: &mut ModifiedMemRefArena, acc: Option<Operand>, op: ModifierOp, value: Operand) -> Operand {
    match acc {
        None if op == ModifierOp::Sub => push_combine(modified, ModifierOp::Sub, Operand::constant(0), value),
        None => value,
        Some(old) => push_combine(modified, op, old, value),
    }
}

/// Back-propagates `pause` from each PauseIf through the combining
/// conditions that feed it (spec §4.B; grounded on `condset.c`'s
/// `rc_update_condition_pause`).
fn propagate_pause(conditions: &mut [Condition]) {
    let mut subclause_start = 0usize;
    let mut i = 0usize;
    while i < conditions.len() {
        if conditions[i].kind == ConditionKind::PauseIf {
            for c in &mut conditions[subclause_start..i] {
                c.pause = true;
            }
            conditions[i].pause = true;
        } else {
            conditions[i].pause = false;
        }

        if !conditions[i].kind.is_combining() {
            subclause_start = i + 1;
        }
        i += 1;
    }
}

/// Re-links `{recall}` placeholders to the nearest preceding Remember
/// in the same pause/non-pause scope (spec §4.B; a simpler
/// per-scope-slot take on `condset.c`'s `rc_update_condition_pause_remember`).
fn resolve_recalls(conditions: &mut [Condition]) {
    let mut last_remember: [Option<Operand>; 2] = [None, None];
    for c in conditions.iter_mut() {
        let scope = c.pause as usize;
        if matches!(c.operand1.kind, crate::memref::OperandKind::UnresolvedRecall) {
            c.operand1 = last_remember[scope].unwrap_or_else(|| Operand::constant(0));
        }
        if matches!(c.operand2.kind, crate::memref::OperandKind::UnresolvedRecall) {
            c.operand2 = last_remember[scope].unwrap_or_else(|| Operand::constant(0));
        }
        if c.kind == ConditionKind::Remember {
            last_remember[scope] = Some(c.operand1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memref::MemRefArena;

    fn parse(text: &str) -> ParsedExpression {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        parse_trigger(text, &mut arena, &mut modified).unwrap()
    }

    #[test]
    fn parses_simple_standard_condition() {
        let expr = parse("0xH0010=1");
        assert_eq!(expr.groups.len(), 1);
        assert_eq!(expr.groups[0].conditions.len(), 1);
        assert_eq!(expr.groups[0].conditions[0].kind, ConditionKind::Standard);
        assert_eq!(expr.groups[0].conditions[0].op, Operator::Eq);
    }

    #[test]
    fn parses_core_and_alternates() {
        let expr = parse("0xH0010=1S0xH0011=1S0xH0012=1");
        assert_eq!(expr.groups.len(), 3);
    }

    #[test]
    fn add_source_folds_into_next_operand() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let expr = parse_trigger("A:0xH0010_0xH0011=10", &mut arena, &mut modified).unwrap();
        let conditions = &expr.groups[0].conditions;
        assert_eq!(conditions.len(), 2);
        // second condition's operand1 should now be a Modified (combine) operand
        assert!(matches!(conditions[1].operand1.kind, crate::memref::OperandKind::Modified(_)));
    }

    #[test]
    fn source_round_trips_for_canonical_serialization() {
        for text in [
            "0xH0010=1",
            "0xH0010=1S0xH0011=1S0xH0012=1",
            "A:0xH0010_0xH0011=10",
            "R:0xH0010=1_0xH0011=1.10.",
        ] {
            let expr = parse(text);
            assert_eq!(expr.source, text);
        }
    }

    #[test]
    fn empty_group_is_allowed() {
        let expr = parse("0xH0010=1S");
        assert_eq!(expr.groups.len(), 2);
        assert!(expr.groups[1].conditions.is_empty());
    }

    #[test]
    fn rejects_missing_operator_on_standard() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let err = parse_trigger("0xH0010", &mut arena, &mut modified).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidOperator);
    }

    #[test]
    fn measured_requires_operator_in_trigger_context() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        // Measured without operator/hit-target in a trigger (not a value) needs a target
        let err = parse_trigger("M:0xH0010", &mut arena, &mut modified).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidMeasuredTarget);
    }

    #[test]
    fn recall_resolves_to_nearest_remember() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let expr = parse_trigger("K:0xH0010_0xH0011={recall}", &mut arena, &mut modified).unwrap();
        let conditions = &expr.groups[0].conditions;
        assert_eq!(conditions[0].kind, ConditionKind::Remember);
        // the recall on the second condition should equal the Remember's operand1
        assert_eq!(format!("{:?}", conditions[1].operand1.kind), format!("{:?}", conditions[0].operand1.kind));
    }

    #[test]
    fn orphan_recall_degrades_to_zero() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let expr = parse_trigger("0xH0011={recall}", &mut arena, &mut modified).unwrap();
        assert_eq!(expr.groups[0].conditions[0].operand2.kind, crate::memref::OperandKind::ConstInt(0));
    }
}
