// ABOUTME: Parser for user-supplied event-hook descriptors bracketing a latency measurement or stack capture
// ABOUTME: Non-destructive: every field borrows a slice of the original input instead of tokenizing in place

use crate::error::ProtocolError;

/// One half of a hook descriptor: `[sys:]event,match`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookEvent<'a> {
    pub system: Option<&'a str>,
    pub event: &'a str,
    pub pattern: &'a str,
}

/// A fully parsed hook descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDescriptor<'a> {
    pub start: HookEvent<'a>,
    pub start_pid: Option<&'a str>,
    pub end: HookEvent<'a>,
    pub migrate: bool,
    pub global: bool,
    pub stack: bool,
}

fn split_event<'a>(token: &'a str) -> Option<(Option<&'a str>, &'a str)> {
    if token.is_empty() {
        return None;
    }
    match token.split_once(':') {
        Some((sys, ev)) if !ev.is_empty() => Some((Some(sys), ev)),
        Some(_) => None,
        None => Some((None, token)),
    }
}

/// Parse one half (`event,match[,extra]`) into its event/match tokens plus
/// an optional third token (`pid` on the start half, `flags` on the end
/// half).
fn parse_half(half: &str) -> Result<(HookEvent<'_>, Option<&str>), ProtocolError> {
    let mut parts = half.splitn(3, ',');
    let first = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProtocolError::ParseError("hook descriptor missing event".into()))?;
    let (system, event) = split_event(first)
        .ok_or_else(|| ProtocolError::ParseError("hook descriptor has empty event".into()))?;
    let pattern = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProtocolError::ParseError("hook descriptor missing match".into()))?;
    let extra = parts.next();

    Ok((
        HookEvent {
            system,
            event,
            pattern,
        },
        extra,
    ))
}

/// Parse a flag letter sequence per §4.7: `p` -> migrate=false (default
/// true), `g` -> global=true, `s` -> stack=true. Unknown letters warn and
/// are ignored.
fn parse_flags(flags: &str) -> (bool, bool, bool) {
    let mut migrate = true;
    let mut global = false;
    let mut stack = false;
    for c in flags.chars() {
        match c.to_ascii_lowercase() {
            'p' => migrate = false,
            'g' => global = true,
            's' => stack = true,
            other => tracing::warn!(flag = %other, "unknown hook flag, ignoring"),
        }
    }
    (migrate, global, stack)
}

/// Parse a hook descriptor string:
/// `[start_sys:]start_ev,start_match[,start_pid]/[end_sys:]end_ev,end_match[,flags]`.
///
/// Returns slices borrowed from `input`; the caller owns `input` for at
/// least as long as the returned [`HookDescriptor`] is used.
pub fn parse_hook_descriptor(input: &str) -> Result<HookDescriptor<'_>, ProtocolError> {
    let mut halves = input.splitn(2, '/');
    let start_half = halves
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProtocolError::ParseError("hook descriptor missing start half".into()))?;
    let end_half = halves
        .next()
        .ok_or_else(|| ProtocolError::ParseError("hook descriptor missing '/' separator".into()))?;
    if end_half.is_empty() {
        return Err(ProtocolError::ParseError(
            "hook descriptor missing end half".into(),
        ));
    }

    let (start, start_pid) = parse_half(start_half)?;
    let (end, flags) = parse_half(end_half)?;
    let (migrate, global, stack) = flags.map(parse_flags).unwrap_or((true, false, false));

    Ok(HookDescriptor {
        start,
        start_pid,
        end,
        migrate,
        global,
        stack,
    })
}
