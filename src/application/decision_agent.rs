use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ollama_rs::{
    generation::{
        chat::{request::ChatMessageRequest, ChatMessage},
        parameters::FormatType,
    },
    Ollama,
};
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use super::{Action, ConversationContext, Decision};

pub const TICKET_PROMPT_FILE: &str = "./ticket_role_definition.md";

const DECISION_TIMEOUT: Duration = Duration::from_secs(30);
const FALLBACK_REPLY: &str =
    "Sorry, something went wrong while handling your request. Please try again.";
const NO_TARGET_NOTICE: &str = "\n(No sanction was applied: the decision named no target.)";

/// One round-trip against the language model. Implemented by the Ollama
/// client below and by a scripted stub in tests.
#[async_trait]
pub trait DecisionBackend: Send + Sync {
    async fn complete(&self, system_prompt: &str, input_json: &str) -> anyhow::Result<String>;
}

#[derive(Clone, Default)]
pub struct OllamaBackend {
    model_name: String,
    ollama: Ollama,
}

impl OllamaBackend {
    pub fn from_env() -> Self {
        let ollama = Ollama::new(
            env::var("OLLAMA_HOST_ADDR").unwrap_or(String::from("http://localhost")),
            env::var("OLLAMA_PORT")
                .unwrap_or(String::from("11434"))
                .parse()
                .unwrap(),
        );
        let model_name = env::var("LLM_MODEL").unwrap_or(String::from("mistral-nemo:12b"));
        Self { model_name, ollama }
    }
}

#[async_trait]
impl DecisionBackend for OllamaBackend {
    async fn complete(&self, system_prompt: &str, input_json: &str) -> anyhow::Result<String> {
        let messages = vec![
            ChatMessage::system(system_prompt.to_string()),
            ChatMessage::user(input_json.to_string()),
        ];
        let response = self
            .ollama
            .send_chat_messages(
                ChatMessageRequest::new(self.model_name.to_owned(), messages)
                    .format(FormatType::Json),
            )
            .await?;
        Ok(response.message.content)
    }
}

/// Raw decision shape as the model is asked to emit it. Untrusted until it
/// went through `parse_decision`.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct DecisionWire {
    #[serde(default)]
    reply: String,
    #[serde(default)]
    action: String,
    #[serde(default, alias = "targetUser", deserialize_with = "lenient_id")]
    target_user_id: Option<u64>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    new_step: Option<String>,
}

/// Models emit ids as numbers, strings or mention markup; accept all three
/// and let anything else collapse to absent.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s
            .trim()
            .trim_start_matches(['<', '@', '!'])
            .trim_end_matches('>')
            .parse()
            .ok(),
        _ => None,
    }))
}

fn placeholder_context() -> ConversationContext {
    ConversationContext {
        step: String::from("<current conversation step>"),
        owner_id: String::from("<owner user id>"),
        staff: Vec::new(),
        channels: Vec::new(),
        transcript: Vec::new(),
        author_id: String::from("<user id of the latest message author>"),
        author_name: String::from("<name of the latest message author>"),
        message: String::from("<latest message text>"),
        attachment_count: 0,
    }
}

fn assemble_ticket_prompt(name: &str, owner_id: u64, prompt_template: &str) -> String {
    let input_example = serde_json::to_string(&placeholder_context()).unwrap();
    let output_schema = serde_json::to_string(&schema_for!(DecisionWire)).unwrap();

    let mut prompt: String = prompt_template
        .trim()
        .replace("{name}", name)
        .replace("{owner}", owner_id.to_string().as_str());
    prompt.push_str("\n\n## Format\n\n");
    prompt.push_str("Input format as valid JSON: \n\n");
    prompt.push_str(&input_example);
    prompt.push_str("\n\n");
    prompt.push_str("Respond with exactly one JSON object matching this schema: \n\n");
    prompt.push_str(&output_schema);
    prompt.push_str("\n\n");
    prompt.push_str(
        "The action field must be one of NONE, BAN, KICK, MUTE, DELETE_TICKET, PING_OWNER. \
         Use targetUserId for the sanctioned user id and newStep to advance the conversation.",
    );
    prompt
}

/// Decision Client: one model round-trip per conversational turn. Every
/// failure mode (transport error, timeout, malformed output) degrades to a
/// reply-only decision with `Action::None`; a turn never crashes on the
/// model.
pub struct DecisionAgent {
    backend: Arc<dyn DecisionBackend>,
    system_prompt: String,
    default_target_to_author: bool,
}

impl DecisionAgent {
    pub fn new(
        name: &str,
        prompt_template: &str,
        owner_id: u64,
        default_target_to_author: bool,
        backend: Arc<dyn DecisionBackend>,
    ) -> Self {
        Self {
            backend,
            system_prompt: assemble_ticket_prompt(name, owner_id, prompt_template),
            default_target_to_author,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub async fn decide(&self, context: &ConversationContext) -> Decision {
        let input_json = match serde_json::to_string(context) {
            Ok(json) => json,
            Err(e) => {
                warn!("Could not serialize turn context: {}", e);
                return fallback_decision();
            }
        };

        let call = self.backend.complete(&self.system_prompt, &input_json);
        let raw = match tokio::time::timeout(DECISION_TIMEOUT, call).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!("Decision backend failed: {}", e);
                return fallback_decision();
            }
            Err(_) => {
                warn!("Decision backend timed out after {:?}", DECISION_TIMEOUT);
                return fallback_decision();
            }
        };
        debug!("Raw decision: {}", raw);

        parse_decision(&raw, context, self.default_target_to_author)
    }
}

fn fallback_decision() -> Decision {
    Decision {
        reply: FALLBACK_REPLY.to_string(),
        action: Action::None,
        target_user_id: None,
        reason: None,
        new_step: None,
    }
}

/// Validating adapter between the untrusted model output and the executor.
/// Malformed JSON or a missing reply yield the fallback decision; unknown
/// actions collapse to `None`; a sanction without a target is rejected
/// unless author fallback is explicitly enabled.
pub(crate) fn parse_decision(
    raw: &str,
    context: &ConversationContext,
    default_target_to_author: bool,
) -> Decision {
    let wire: DecisionWire = match serde_json::from_str(raw.trim()) {
        Ok(wire) => wire,
        Err(e) => {
            warn!("Unparseable decision output: {}", e);
            return fallback_decision();
        }
    };

    if wire.reply.trim().is_empty() {
        warn!("Decision output without reply text");
        return fallback_decision();
    }

    let mut action = Action::from_wire(&wire.action);
    let mut reply = wire.reply;
    let mut target_user_id = wire.target_user_id;

    if matches!(action, Action::Ban | Action::Kick | Action::Mute) && target_user_id.is_none() {
        if default_target_to_author {
            target_user_id = context.author_id.parse().ok();
        }
        if target_user_id.is_none() {
            action = Action::None;
            reply.push_str(NO_TARGET_NOTICE);
        }
    }

    Decision {
        reply,
        action,
        target_user_id,
        reason: wire.reason.filter(|r| !r.trim().is_empty()),
        new_step: wire.new_step.filter(|s| !s.trim().is_empty()),
    }
}

#[cfg(test)]
mod decision_agent_test {
    use super::*;
    use crate::application::doubles::StubBackend;

    fn context() -> ConversationContext {
        ConversationContext {
            step: String::from("init"),
            owner_id: String::from("1000"),
            staff: Vec::new(),
            channels: Vec::new(),
            transcript: Vec::new(),
            author_id: String::from("555"),
            author_name: String::from("reporter"),
            message: String::from("I want to report someone"),
            attachment_count: 0,
        }
    }

    #[test]
    fn should_fall_back_on_malformed_json() {
        let decision = parse_decision("definitely not json", &context(), false);
        assert_eq!(decision.action, Action::None);
        assert!(!decision.reply.is_empty());
    }

    #[test]
    fn should_fall_back_on_missing_reply() {
        let decision = parse_decision(r#"{"action": "BAN", "targetUserId": "42"}"#, &context(), false);
        assert_eq!(decision.action, Action::None);
        assert_eq!(decision.reply, FALLBACK_REPLY);
        assert!(decision.target_user_id.is_none());
    }

    #[test]
    fn should_coerce_unknown_action_to_none() {
        let decision = parse_decision(
            r#"{"reply": "ok", "action": "DESTROY_SERVER"}"#,
            &context(),
            false,
        );
        assert_eq!(decision.action, Action::None);
        assert_eq!(decision.reply, "ok");
    }

    #[test]
    fn should_parse_a_full_sanction_decision() {
        let decision = parse_decision(
            r#"{"reply": "Banning now", "action": "BAN", "targetUserId": "42", "reason": "spam", "newStep": "done"}"#,
            &context(),
            false,
        );
        assert_eq!(decision.action, Action::Ban);
        assert_eq!(decision.target_user_id, Some(42));
        assert_eq!(decision.reason.as_deref(), Some("spam"));
        assert_eq!(decision.new_step.as_deref(), Some("done"));
    }

    #[test]
    fn should_accept_numeric_and_mention_target_ids() {
        let numeric = parse_decision(
            r#"{"reply": "ok", "action": "KICK", "targetUserId": 42}"#,
            &context(),
            false,
        );
        assert_eq!(numeric.target_user_id, Some(42));

        let mention = parse_decision(
            r#"{"reply": "ok", "action": "KICK", "targetUserId": "<@!42>"}"#,
            &context(),
            false,
        );
        assert_eq!(mention.target_user_id, Some(42));
    }

    #[test]
    fn should_reject_sanction_without_target() {
        let decision = parse_decision(r#"{"reply": "Banning", "action": "BAN"}"#, &context(), false);
        assert_eq!(decision.action, Action::None);
        assert!(decision.reply.contains("No sanction was applied"));
    }

    #[test]
    fn should_substitute_author_only_when_enabled() {
        let decision = parse_decision(r#"{"reply": "Muting", "action": "MUTE"}"#, &context(), true);
        assert_eq!(decision.action, Action::Mute);
        assert_eq!(decision.target_user_id, Some(555));
    }

    #[test]
    fn should_keep_step_absent_when_new_step_is_empty() {
        let decision = parse_decision(
            r#"{"reply": "ok", "action": "NONE", "newStep": "  "}"#,
            &context(),
            false,
        );
        assert!(decision.new_step.is_none());
    }

    #[test]
    fn should_embed_name_owner_and_format_in_prompt() {
        let prompt = assemble_ticket_prompt("Kate", 1000, "You are {name}. The owner is {owner}.");
        assert!(prompt.contains("You are Kate."));
        assert!(prompt.contains("The owner is 1000."));
        assert!(prompt.contains("DELETE_TICKET"));
        assert!(prompt.contains("## Format"));
    }

    #[tokio::test]
    async fn should_fall_back_when_backend_errors() {
        let backend = Arc::new(StubBackend::default());
        let agent = DecisionAgent::new("Kate", "You are {name}.", 1000, false, backend);

        let decision = agent.decide(&context()).await;
        assert_eq!(decision.action, Action::None);
        assert_eq!(decision.reply, FALLBACK_REPLY);
    }

    #[tokio::test(start_paused = true)]
    async fn should_fall_back_when_backend_hangs() {
        let backend = Arc::new(StubBackend::hanging());
        let agent = DecisionAgent::new("Kate", "You are {name}.", 1000, false, backend);

        let decision = agent.decide(&context()).await;
        assert_eq!(decision.action, Action::None);
        assert_eq!(decision.reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn should_deliver_parsed_decision_from_backend() {
        let backend = Arc::new(StubBackend::with_replies(vec![String::from(
            r#"{"reply": "Send proof", "action": "NONE", "newStep": "awaiting_proof"}"#,
        )]));
        let agent = DecisionAgent::new("Kate", "You are {name}.", 1000, false, backend.clone());

        let decision = agent.decide(&context()).await;
        assert_eq!(decision.reply, "Send proof");
        assert_eq!(decision.new_step.as_deref(), Some("awaiting_proof"));

        let seen = backend.inputs();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("I want to report someone"));
    }
}
