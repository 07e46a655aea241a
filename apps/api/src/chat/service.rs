//! Chat turn service: validate input → plan → prompt → provider → shape → finalize.
//!
//! Each turn is independent. The only await points are provider calls: the
//! primary completion (retried) and at most one continuation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chat::prompts::{system_prompt, NO_PRODUCT_FACTS_REPLY};
use crate::contracts::validator::{validate_reply, ValidationResult};
use crate::errors::AppError;
use crate::facts::{parse_mode, PlanRequest};
use crate::llm_client::retry::{with_retry, PRIMARY_COMPLETION};
use crate::llm_client::{ChatMessage, CompletionRequest, LlmError, Role};
use crate::models::coach::CoachPayload;
use crate::models::fact::Plan;
use crate::models::mode::Mode;
use crate::shaping::pipeline::{finalize_turn, shape_reply};
use crate::shaping::scoring::deterministic_coach;
use crate::state::AppState;

/// Prior messages forwarded to the provider.
pub const HISTORY_LIMIT: usize = 18;

const DEFAULT_SESSION: &str = "anon";

/// `/chat` body. Either `user` (+ `history`) or a widget-style `messages` list.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub disease: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default, alias = "planId")]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
}

/// A validated turn, ready to run.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub mode: Mode,
    pub user: String,
    pub history: Vec<ChatMessage>,
    pub disease: String,
    pub persona: String,
    pub goal: String,
    pub plan: Option<Plan>,
    pub plan_id: Option<String>,
    pub session: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanRef {
    pub id: String,
}

/// Contract check of the delivered reply, so callers can regenerate or
/// flag a reply that broke a rule the pipeline could not repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnValidation {
    pub passed: bool,
    pub error_kind: Option<String>,
    pub section_key: Option<&'static str>,
}

impl From<&ValidationResult> for TurnValidation {
    fn from(result: &ValidationResult) -> Self {
        Self {
            passed: result.passed,
            error_kind: result.error_kind(),
            section_key: result.section_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutput {
    pub reply: String,
    pub coach: CoachPayload,
    pub plan: PlanRef,
    pub validation: TurnValidation,
    /// The model's reply was replaced by the sales-coach template.
    pub degraded: bool,
}

impl ChatRequest {
    /// Validates the body. Rejects unknown modes and empty user messages
    /// before anything else happens.
    pub fn into_turn(self) -> Result<ChatTurn, AppError> {
        let mode = parse_mode(self.mode.as_deref())?;

        let (user, history) = match self.messages {
            Some(messages) => split_widget_messages(messages)?,
            None => (self.user.unwrap_or_default(), self.history),
        };

        if user.trim().is_empty() {
            return Err(AppError::InvalidInput("No user message provided.".to_string()));
        }

        Ok(ChatTurn {
            mode,
            user,
            history,
            disease: self.disease,
            persona: self.persona,
            goal: self.goal,
            plan: self.plan,
            plan_id: self.plan_id.filter(|id| !id.is_empty()),
            session: self
                .session
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SESSION.to_string()),
        })
    }
}

/// The last user message is the turn; non-system messages before it are history.
fn split_widget_messages(
    mut messages: Vec<ChatMessage>,
) -> Result<(String, Vec<ChatMessage>), AppError> {
    if messages.is_empty() {
        return Err(AppError::InvalidInput("Empty messages.".to_string()));
    }

    let Some(last_user) = messages.iter().rposition(|m| m.role == Role::User) else {
        return Err(AppError::InvalidInput("No user message provided.".to_string()));
    };

    messages.truncate(last_user + 1);
    let user = messages.pop().map(|m| m.content).unwrap_or_default();
    let history = messages
        .into_iter()
        .filter(|m| m.role != Role::System)
        .collect();
    Ok((user, history))
}

fn build_messages(mode: Mode, plan: &Plan, turn: &ChatTurn) -> Vec<ChatMessage> {
    let skip = turn.history.len().saturating_sub(HISTORY_LIMIT);

    let mut messages = Vec::with_capacity(HISTORY_LIMIT + 2);
    messages.push(ChatMessage::system(system_prompt(mode, plan)));
    messages.extend(
        turn.history
            .iter()
            .skip(skip)
            .filter(|m| m.role != Role::System)
            .cloned(),
    );
    messages.push(ChatMessage::user(turn.user.clone()));
    messages
}

/// Runs one chat turn end to end.
pub async fn run_turn(state: &AppState, turn: ChatTurn) -> Result<TurnOutput, AppError> {
    let mode = turn.mode;

    let plan = match &turn.plan {
        Some(plan) => plan.clone(),
        None => state.facts.build_plan(
            &PlanRequest {
                mode: Some(mode.as_str().to_string()),
                disease: turn.disease.clone(),
                persona: turn.persona.clone(),
                goal: turn.goal.clone(),
                topic: String::new(),
            },
            state.config.require_facts,
        )?,
    };
    let plan_ref = PlanRef {
        id: turn.plan_id.clone().unwrap_or_else(|| plan.plan_id.clone()),
    };
    let used_facts = plan.facts.len();

    info!(
        "Chat turn: session={}, mode={}, facts={}, history={}",
        turn.session,
        mode,
        used_facts,
        turn.history.len()
    );

    if mode == Mode::ProductKnowledge && plan.facts.is_empty() {
        info!("No product facts for session {}; returning fallback reply", turn.session);
        return Ok(TurnOutput {
            reply: NO_PRODUCT_FACTS_REPLY.to_string(),
            coach: deterministic_coach(NO_PRODUCT_FACTS_REPLY, &turn.user, 0),
            plan: plan_ref,
            validation: TurnValidation::from(&validate_reply(NO_PRODUCT_FACTS_REPLY, mode)),
            degraded: false,
        });
    }

    let request = CompletionRequest {
        messages: build_messages(mode, &plan, &turn),
        max_tokens: state.config.max_output_tokens,
        temperature: state.config.temperature,
    };

    let provider = state.provider.as_ref();
    let raw = with_retry(&PRIMARY_COMPLETION, LlmError::is_retryable, |attempt| {
        debug!("Primary completion attempt {} for session {}", attempt, turn.session);
        provider.complete(&request)
    })
    .await?;

    let shaped = shape_reply(
        &raw,
        mode,
        provider,
        &request.messages,
        state.config.temperature,
    )
    .await;
    let finished = finalize_turn(shaped, mode, &turn.user, used_facts);

    info!(
        "Chat turn complete: session={}, mode={}, chars={}, degraded={}, valid={}",
        turn.session,
        mode,
        finished.reply.len(),
        finished.degraded,
        finished.validation.passed
    );

    Ok(TurnOutput {
        validation: TurnValidation::from(&finished.validation),
        degraded: finished.degraded,
        reply: finished.reply,
        coach: finished.coach,
        plan: plan_ref,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::facts::FactStore;
    use crate::llm_client::fake::ScriptedProvider;
    use serde_json::json;
    use std::sync::Arc;

    fn test_config(require_facts: bool) -> Config {
        Config::from_lookup(|key| match key {
            "PROVIDER_URL" => Some("http://provider.test".to_string()),
            "PROVIDER_MODEL" => Some("test-model".to_string()),
            "PROVIDER_KEY" => Some("k".to_string()),
            "REQUIRE_FACTS" => Some(require_facts.to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn state_with(provider: Arc<ScriptedProvider>, require_facts: bool) -> AppState {
        AppState {
            provider,
            facts: Arc::new(FactStore::builtin().unwrap()),
            config: test_config(require_facts),
        }
    }

    fn turn(body: serde_json::Value) -> ChatTurn {
        serde_json::from_value::<ChatRequest>(body)
            .unwrap()
            .into_turn()
            .unwrap()
    }

    const SALES_REPLY: &str = "Challenge: The HCP worries about renal safety.\nRep Approach:\n• Share eGFR thresholds [HIV-PREP-SAFETY-003]\n• Ask how renal monitoring is done today\n• Offer a follow-up with the label\nImpact: Builds confidence in patient selection.\nSuggested Phrasing: \"Would reviewing eGFR thresholds together help?\"";

    #[test]
    fn test_user_shape_is_accepted() {
        let t = turn(json!({"mode": "role-play", "user": "Hi doctor", "history": [{"role": "assistant", "content": "Hello"}]}));
        assert_eq!(t.mode, Mode::RolePlay);
        assert_eq!(t.user, "Hi doctor");
        assert_eq!(t.history.len(), 1);
        assert_eq!(t.session, "anon");
    }

    #[test]
    fn test_widget_shape_uses_last_user_message() {
        let t = turn(json!({
            "messages": [
                {"role": "system", "content": "ignored"},
                {"role": "user", "content": "first"},
                {"role": "assistant", "content": "answer"},
                {"role": "user", "content": "second"}
            ],
            "planId": "abc",
            "session": "s-1"
        }));
        assert_eq!(t.mode, Mode::SalesCoach);
        assert_eq!(t.user, "second");
        assert_eq!(
            t.history.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["first", "answer"]
        );
        assert_eq!(t.plan_id.as_deref(), Some("abc"));
        assert_eq!(t.session, "s-1");
    }

    #[test]
    fn test_empty_inputs_are_rejected() {
        for body in [
            json!({"user": "   "}),
            json!({}),
            json!({"messages": []}),
            json!({"messages": [{"role": "assistant", "content": "hi"}]}),
        ] {
            let err = serde_json::from_value::<ChatRequest>(body.clone())
                .unwrap()
                .into_turn()
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)), "{body}");
        }
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let err = serde_json::from_value::<ChatRequest>(json!({"mode": "karaoke", "user": "hi"}))
            .unwrap()
            .into_turn()
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_sales_coach_turn_shapes_reply_and_scores() {
        let provider = Arc::new(ScriptedProvider::replies(&[SALES_REPLY]));
        let state = state_with(provider.clone(), false);

        let out = run_turn(&state, turn(json!({"user": "How do I handle renal concerns?", "disease": "HIV"})))
            .await
            .unwrap();

        assert!(validate_reply(&out.reply, Mode::SalesCoach).passed, "{}", out.reply);
        assert!(out.validation.passed);
        assert!(!out.degraded);
        assert_eq!(out.reply.split("\n\n").count(), 4);
        assert_eq!(out.coach.context.rep_question, "How do I handle renal concerns?");
        assert!(!out.plan.id.is_empty());

        let sent = provider.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].messages[0].role, Role::System);
        assert!(sent[0].messages[0].content.contains("[HIV-PREP-SAFETY-003]"));
        assert_eq!(sent[0].max_tokens, 900);
    }

    #[tokio::test]
    async fn test_unstructured_sales_coach_reply_is_degraded() {
        let provider = Arc::new(ScriptedProvider::replies(&["Just be friendly and mention safety."]));
        let state = state_with(provider, false);

        let out = run_turn(&state, turn(json!({"user": "How do I open with Dr. Patel?"})))
            .await
            .unwrap();

        assert!(out.degraded);
        assert_eq!(
            out.validation,
            TurnValidation {
                passed: true,
                error_kind: None,
                section_key: None
            }
        );
        assert!(out.reply.starts_with("Challenge: Addressing How do I open with"));
    }

    #[tokio::test]
    async fn test_unrepaired_violation_is_reported() {
        let provider = Arc::new(ScriptedProvider::replies(&["You handled the objection calmly."]));
        let state = state_with(provider, false);

        let out = run_turn(&state, turn(json!({"mode": "general-knowledge", "user": "hi"})))
            .await
            .unwrap();
        assert!(out.validation.passed);

        let provider = Arc::new(ScriptedProvider::replies(&["Uptake grew [see-table-a]."]));
        let state = state_with(provider, false);
        let out = run_turn(&state, turn(json!({"mode": "product-knowledge", "user": "Uptake?"})))
            .await
            .unwrap();

        assert!(!out.degraded);
        assert_eq!(out.reply, "Uptake grew [SEE-TABLE-A].");
        assert_eq!(
            out.validation,
            TurnValidation {
                passed: false,
                error_kind: Some("MALFORMED_CITATIONS".to_string()),
                section_key: None
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_provider_errors_are_retried() {
        let provider = Arc::new(ScriptedProvider::new([
            Err(LlmError::Api {
                status: 503,
                message: "busy".to_string(),
            }),
            Ok("General answer.".to_string()),
        ]));
        let state = state_with(provider.clone(), false);

        let out = run_turn(&state, turn(json!({"mode": "general-knowledge", "user": "What is PrEP?"})))
            .await
            .unwrap();

        assert_eq!(out.reply, "General answer.");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_upstream_error() {
        let provider = Arc::new(ScriptedProvider::new(
            (0..3).map(|_| Err(LlmError::Api {
                status: 500,
                message: "down".to_string(),
            })),
        ));
        let state = state_with(provider.clone(), false);

        let err = run_turn(&state, turn(json!({"user": "hi"}))).await.unwrap_err();
        match err {
            AppError::Upstream(e) => assert_eq!(e.kind(), "provider_http_500"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_product_knowledge_without_facts_skips_provider() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut state = state_with(provider.clone(), false);
        state.facts = Arc::new(FactStore::new(Vec::new()).unwrap());

        let out = run_turn(&state, turn(json!({"mode": "product-knowledge", "user": "Tell me about X"})))
            .await
            .unwrap();

        assert_eq!(out.reply, NO_PRODUCT_FACTS_REPLY);
        assert_eq!(provider.calls(), 0);
        assert!(out.coach.overall.is_some());
        assert!(out.validation.passed);
        assert!(!out.degraded);
    }

    #[tokio::test]
    async fn test_require_facts_rejects_unknown_disease() {
        let provider = Arc::new(ScriptedProvider::default());
        let state = state_with(provider.clone(), true);

        let err = run_turn(&state, turn(json!({"user": "hi", "disease": "Dermatology"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoFacts));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_cut_off_reply_gets_one_continuation() {
        let cut = "I usually start by reviewing the patient's history and adherence patterns, \
                   then I look at recent exposures and renal labs before deciding whether to \
                   recommend anything, and honestly the conversation often runs long because";
        let provider = Arc::new(ScriptedProvider::replies(&[cut, "it takes time to build trust."]));
        let state = state_with(provider.clone(), false);

        let out = run_turn(&state, turn(json!({"mode": "role-play", "user": "How do you decide?"})))
            .await
            .unwrap();

        assert_eq!(provider.calls(), 2);
        assert!(out.reply.ends_with("it takes time to build trust."));
        assert_eq!(provider.requests()[1].max_tokens, 160);
    }

    #[tokio::test]
    async fn test_history_is_limited() {
        let history: Vec<_> = (0..30)
            .map(|i| json!({"role": if i % 2 == 0 { "user" } else { "assistant" }, "content": format!("m{i}")}))
            .collect();
        let provider = Arc::new(ScriptedProvider::replies(&["Fine."]));
        let state = state_with(provider.clone(), false);

        run_turn(&state, turn(json!({"mode": "general-knowledge", "user": "now", "history": history})))
            .await
            .unwrap();

        let sent = &provider.requests()[0].messages;
        assert_eq!(sent.len(), HISTORY_LIMIT + 2);
        assert_eq!(sent[1].content, "m12");
        assert_eq!(sent.last().unwrap().content, "now");
    }

    #[tokio::test]
    async fn test_supplied_plan_is_used() {
        let provider = Arc::new(ScriptedProvider::replies(&["I see. My view is cautious."]));
        let state = state_with(provider.clone(), true);

        let plan = json!({
            "plan_id": "given-plan",
            "mode": "role-play",
            "facts": [{"id": "DERM-ATOP-001", "text": "Moisturize daily.", "cites": []}]
        });
        let out = run_turn(&state, turn(json!({"mode": "role-play", "user": "hi", "plan": plan})))
            .await
            .unwrap();

        assert_eq!(out.plan.id, "given-plan");
        assert!(provider.requests()[0].messages[0].content.contains("[DERM-ATOP-001]"));
    }
}
