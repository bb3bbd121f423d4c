use uuid::Uuid;

use crate::agent::policy::Persona;

/// Caller-supplied identity for one request, forwarded into logs and
/// tool result metadata. The core never mints its own identity beyond
/// the request id helper below; everything else comes from the calling
/// collaborator.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: String,
    pub guild_id: String,
    pub effective_channel_id: String,
    pub thread_id: String,
    pub message_id: String,
    pub persona: String,
    pub enabled_tools: Vec<String>,
}

impl RequestContext {
    /// Context for a locally-originated request (the CLI harness).
    pub fn local(persona: Persona, enabled_tools: Vec<String>) -> Self {
        Self {
            request_id: new_request_id(),
            guild_id: String::new(),
            effective_channel_id: String::new(),
            thread_id: String::new(),
            message_id: String::new(),
            persona: persona.as_str().to_string(),
            enabled_tools,
        }
    }
}

pub fn new_request_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    uuid[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_short_and_unique() {
        let a = new_request_id();
        let b = new_request_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn local_context_carries_persona_and_tools() {
        let ctx = RequestContext::local(Persona::Ops, vec!["current_time".into()]);
        assert_eq!(ctx.persona, "ops");
        assert_eq!(ctx.enabled_tools, vec!["current_time".to_string()]);
        assert!(!ctx.request_id.is_empty());
    }
}
