//! Shared conversation reconstruction for backend adapters.
//!
//! Every adapter builds its wire payload from the same role-tagged sequence
//! so the turn engine stays backend-agnostic.

use crate::model::{ChatMessage, TurnContext};

/// Build the message sequence for one request: system instruction (unless
/// flattened), then alternating user/assistant turns, ending on a user turn.
///
/// With `flatten_system` the instruction is prepended to the FIRST user turn
/// only and no system role is emitted; reconstruction of later turns leaves
/// them untouched.
///
/// An earlier exhausted turn contributes an empty assistant message so later
/// turns carry degraded context forward instead of aborting the record.
pub fn build_messages(ctx: &TurnContext<'_>, flatten_system: bool) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(ctx.prompts.len() + ctx.responses.len() + 1);

    let flattened = flatten_system && ctx.system.is_some();
    if let Some(system) = ctx.system {
        if !flattened {
            messages.push(ChatMessage::system(system));
        }
    }

    for (turn, prompt) in ctx.prompts.iter().enumerate() {
        let content = if turn == 0 && flattened {
            // Flattening applies to turn 0 reconstruction only.
            format!("{}\n\n{}", ctx.system.unwrap_or_default(), prompt)
        } else {
            prompt.clone()
        };
        messages.push(ChatMessage::user(content));

        if let Some(response) = ctx.responses.get(turn) {
            messages.push(ChatMessage::assistant(response.as_deref().unwrap_or("")));
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn ctx<'a>(
        system: Option<&'a str>,
        prompts: &'a [String],
        responses: &'a [Option<String>],
    ) -> TurnContext<'a> {
        TurnContext {
            system,
            prompts,
            responses,
        }
    }

    #[test]
    fn three_turn_reconstruction_is_exact() {
        let prompts = vec!["p0".to_string(), "p1".to_string(), "p2".to_string()];
        let responses = vec![Some("r0".to_string()), Some("r1".to_string())];
        let messages = build_messages(&ctx(None, &prompts, &responses), false);

        let flat: Vec<(Role, &str)> = messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            flat,
            vec![
                (Role::User, "p0"),
                (Role::Assistant, "r0"),
                (Role::User, "p1"),
                (Role::Assistant, "r1"),
                (Role::User, "p2"),
            ]
        );
    }

    #[test]
    fn system_instruction_is_prepended_when_present() {
        let prompts = vec!["p0".to_string()];
        let messages = build_messages(&ctx(Some("be fair"), &prompts, &[]), false);
        assert_eq!(messages[0], ChatMessage::system("be fair"));
        assert_eq!(messages[1], ChatMessage::user("p0"));
    }

    #[test]
    fn flattened_system_goes_into_first_user_turn_only() {
        let prompts = vec!["p0".to_string(), "p1".to_string()];
        let responses = vec![Some("r0".to_string())];
        let messages = build_messages(&ctx(Some("be fair"), &prompts, &responses), true);

        assert!(messages.iter().all(|m| m.role != Role::System));
        assert_eq!(messages[0], ChatMessage::user("be fair\n\np0"));
        assert_eq!(messages[2], ChatMessage::user("p1"));
    }

    #[test]
    fn exhausted_turn_renders_empty_assistant_message() {
        let prompts = vec!["p0".to_string(), "p1".to_string()];
        let responses = vec![None];
        let messages = build_messages(&ctx(None, &prompts, &responses), false);
        assert_eq!(messages[1], ChatMessage::assistant(""));
        assert_eq!(messages[2], ChatMessage::user("p1"));
    }
}
