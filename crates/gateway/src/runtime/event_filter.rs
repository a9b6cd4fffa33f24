//! The Event Filter — the single source of truth for what reaches the
//! caller during a turn.
//!
//! Every downstream event carries a source (the specialist or orchestrator
//! component that produced it) and a kind. The filter applies a policy
//! tuple per source: *(forward tokens, forward tool calls, forward
//! sub-specialist transitions, forward terminal)*. Nested teams get a
//! policy that suppresses their inner chatter and forwards exactly one
//! terminal event; the primary specialist gets the permissive policy.
//!
//! No other component writes to the caller-visible event stream — the
//! orchestrator routes every event through one `EventFilter` per turn.

use std::collections::HashSet;

use super::turn::TurnEvent;

/// What a given event source is allowed to put on the caller-visible
/// stream.
#[derive(Debug, Clone, Copy)]
pub struct EventPolicy {
    pub forward_tokens: bool,
    pub forward_tool_calls: bool,
    pub forward_sub_specialist: bool,
    pub forward_terminal: bool,
}

impl EventPolicy {
    /// The primary specialist's stream: everything passes through.
    pub const PRIMARY: EventPolicy = EventPolicy {
        forward_tokens: true,
        forward_tool_calls: true,
        forward_sub_specialist: true,
        forward_terminal: true,
    };

    /// A nested team's inner specialists: tokens and sub-specialist
    /// transitions are suppressed, tool-call boundaries still pass (the
    /// caller should see when work is happening), exactly one terminal
    /// event closes the dispatch.
    pub const NESTED: EventPolicy = EventPolicy {
        forward_tokens: false,
        forward_tool_calls: true,
        forward_sub_specialist: false,
        forward_terminal: true,
    };
}

/// Which bucket an event falls into, for policy matching and dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Token,
    ToolCall,
    SubSpecialist,
    Terminal,
}

fn kind_of(event: &TurnEvent) -> EventKind {
    match event {
        TurnEvent::Token { .. } => EventKind::Token,
        TurnEvent::ToolCallStart { .. } | TurnEvent::ToolCallEnd { .. } => EventKind::ToolCall,
        TurnEvent::SubSpecialistDispatch { .. } | TurnEvent::SubSpecialistResult { .. } => {
            EventKind::SubSpecialist
        }
        TurnEvent::Final { .. } | TurnEvent::Error { .. } | TurnEvent::Stopped { .. } => {
            EventKind::Terminal
        }
    }
}

/// One filter per turn. Tracks which sources have already emitted a
/// terminal event (so a source can't emit two) and collapses duplicate
/// token spans within a single forwarded stream.
pub struct EventFilter {
    terminated_sources: HashSet<String>,
    seen_token_spans: HashSet<(String, String)>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self {
            terminated_sources: HashSet::new(),
            seen_token_spans: HashSet::new(),
        }
    }

    /// Apply `policy` to an event from `source`. Returns `None` when the
    /// event is suppressed — either by policy, by a duplicate token span,
    /// or because `source` already emitted its one allowed terminal event.
    pub fn apply(&mut self, source: &str, policy: EventPolicy, event: TurnEvent) -> Option<TurnEvent> {
        match kind_of(&event) {
            EventKind::Token => {
                if !policy.forward_tokens {
                    return None;
                }
                if let TurnEvent::Token { text } = &event {
                    let key = (source.to_string(), text.clone());
                    if !self.seen_token_spans.insert(key) {
                        return None;
                    }
                }
                Some(event)
            }
            EventKind::ToolCall => policy.forward_tool_calls.then_some(event),
            EventKind::SubSpecialist => policy.forward_sub_specialist.then_some(event),
            EventKind::Terminal => {
                if !policy.forward_terminal {
                    return None;
                }
                if !self.terminated_sources.insert(source.to_string()) {
                    return None;
                }
                Some(event)
            }
        }
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_policy_suppresses_tokens() {
        let mut filter = EventFilter::new();
        let out = filter.apply(
            "sub-specialist",
            EventPolicy::NESTED,
            TurnEvent::Token { text: "hi".into() },
        );
        assert!(out.is_none());
    }

    #[test]
    fn primary_policy_forwards_tokens() {
        let mut filter = EventFilter::new();
        let out = filter.apply(
            "primary",
            EventPolicy::PRIMARY,
            TurnEvent::Token { text: "hi".into() },
        );
        assert!(out.is_some());
    }

    #[test]
    fn duplicate_token_span_collapsed() {
        let mut filter = EventFilter::new();
        let first = filter.apply(
            "primary",
            EventPolicy::PRIMARY,
            TurnEvent::Token { text: "hi".into() },
        );
        let second = filter.apply(
            "primary",
            EventPolicy::PRIMARY,
            TurnEvent::Token { text: "hi".into() },
        );
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn distinct_sources_do_not_share_dedup_state() {
        let mut filter = EventFilter::new();
        filter.apply("a", EventPolicy::PRIMARY, TurnEvent::Token { text: "hi".into() });
        let out = filter.apply("b", EventPolicy::PRIMARY, TurnEvent::Token { text: "hi".into() });
        assert!(out.is_some());
    }

    #[test]
    fn only_one_terminal_per_source() {
        let mut filter = EventFilter::new();
        let first = filter.apply(
            "primary",
            EventPolicy::PRIMARY,
            TurnEvent::Final { content: "done".into() },
        );
        let second = filter.apply(
            "primary",
            EventPolicy::PRIMARY,
            TurnEvent::Final { content: "done again".into() },
        );
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn nested_tool_calls_still_forwarded() {
        let mut filter = EventFilter::new();
        let out = filter.apply(
            "sub-specialist",
            EventPolicy::NESTED,
            TurnEvent::ToolCallStart {
                call_id: "c1".into(),
                tool_name: "exec".into(),
            },
        );
        assert!(out.is_some());
    }

    #[test]
    fn nested_sub_specialist_transitions_suppressed() {
        let mut filter = EventFilter::new();
        let out = filter.apply(
            "team",
            EventPolicy::NESTED,
            TurnEvent::SubSpecialistDispatch {
                name: "inner".into(),
            },
        );
        assert!(out.is_none());
    }
}
