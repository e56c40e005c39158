//! Leaderboard definitions (spec §3 "Leaderboard", §4.B): four triggers
//! packed into one definition string, one each for Start/Cancel/Submit
//! plus a Value expression for the tracked score.

use super::value::Value;
use super::{parse_trigger, ParsedExpression};
use crate::error::{ParseError, ParseErrorKind};
use crate::memref::{MemRefArena, ModifiedMemRefArena};

#[derive(Debug)]
pub struct LeaderboardDefinition {
    pub start: ParsedExpression,
    pub cancel: ParsedExpression,
    pub submit: ParsedExpression,
    pub value: Value,
}

/// Splits `STA:<trigger>::CAN:<trigger>::SUB:<trigger>::VAL:<value>::`
/// into its four segments and parses each independently; segment order
/// is fixed, but the `::` wrapper around the last segment is optional.
pub fn parse(
    text: &str,
    arena: &mut MemRefArena,
    modified: &mut ModifiedMemRefArena,
) -> Result<LeaderboardDefinition, ParseError> {
    let segments = ["STA", "CAN", "SUB", "VAL"];
    let mut found: [Option<&str>; 4] = [None; 4];

    let mut rest = text;
    for _ in 0..4 {
        let tag = segments
            .iter()
            .enumerate()
            .find(|(i, tag)| found[*i].is_none() && rest.starts_with(&format!("{}:", tag)))
            .map(|(i, tag)| (i, *tag));

        let (idx, tag) = match tag {
            Some(v) => v,
            None => return Err(ParseError::new(text.len() - rest.len(), ParseErrorKind::UnbalancedLeaderboard)),
        };

        rest = &rest[tag.len() + 1..];
        let end = rest.find("::").unwrap_or(rest.len());
        found[idx] = Some(&rest[..end]);
        rest = rest.get(end + 2..).unwrap_or("");
        if rest.is_empty() {
            break;
        }
    }

    let start_text = found[0].ok_or_else(|| ParseError::new(0, ParseErrorKind::UnbalancedLeaderboard))?;
    let cancel_text = found[1].ok_or_else(|| ParseError::new(0, ParseErrorKind::UnbalancedLeaderboard))?;
    let submit_text = found[2].ok_or_else(|| ParseError::new(0, ParseErrorKind::UnbalancedLeaderboard))?;
    let value_text = found[3].ok_or_else(|| ParseError::new(0, ParseErrorKind::UnbalancedLeaderboard))?;

    let start = parse_trigger(start_text, arena, modified)?;
    let cancel = parse_trigger(cancel_text, arena, modified)?;
    let submit = parse_trigger(submit_text, arena, modified)?;
    let value = super::value::parse(value_text, arena, modified)?;

    Ok(LeaderboardDefinition { start, cancel, submit, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_four_segments() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let def = parse(
            "STA:0xH0010=1::CAN:0xH0010=0::SUB:0xH0011=1::VAL:0xH0012::",
            &mut arena,
            &mut modified,
        )
        .unwrap();
        assert_eq!(def.start.groups[0].conditions.len(), 1);
        assert_eq!(def.value.groups[0].conditions.len(), 1);
    }

    #[test]
    fn missing_segment_is_unbalanced() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let err = parse("STA:0xH0010=1::CAN:0xH0010=0::SUB:0xH0011=1::", &mut arena, &mut modified).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnbalancedLeaderboard);
    }
}
