//! Intent classification: should the bot visibly reply to a message?
//!
//! Scoring is delegated entirely to a completion model via a fixed rubric.
//! The classifier only parses a yes/no token and fails safe to "no".

mod audit;

use std::sync::Arc;

pub use audit::{AUDIT_FILE, AuditLog, format_entry};

use crate::assistant::{ChatMessage, CompletionBackend, CompletionRequest};

/// Affirmative answer token
const YES: &str = "ja";

/// Negative decision label
const NO: &str = "nee";

/// Decision label written when classification failed
const ERROR_DECISION: &str = "fout";

/// Result of classifying one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentDecision {
    /// Whether a visible reply is warranted
    pub should_respond: bool,
    /// Raw model output (or error text)
    pub raw: String,
}

/// Decides whether the bot should reply to a message
pub struct IntentClassifier {
    completion: Arc<dyn CompletionBackend>,
    model: String,
    persona: String,
    audit: AuditLog,
}

impl IntentClassifier {
    /// Create a classifier
    #[must_use]
    pub fn new(
        completion: Arc<dyn CompletionBackend>,
        model: impl Into<String>,
        persona: impl Into<String>,
        audit: AuditLog,
    ) -> Self {
        Self {
            completion,
            model: model.into(),
            persona: persona.into(),
            audit,
        }
    }

    /// Classify one message
    ///
    /// Never fails: backend errors are audited as `fout` and yield a
    /// negative decision. Exactly one audit line is written per call.
    pub async fn classify(&self, message: &str) -> IntentDecision {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(build_prompt(&self.persona, message))],
            temperature: Some(0.0),
        };

        match self.completion.complete(request).await {
            Ok(output) => {
                let raw = output.trim().to_lowercase();
                let should_respond = is_affirmative(&raw);
                let decision = if should_respond { YES } else { NO };

                tracing::debug!(raw = %raw, should_respond, "intent classified");
                self.audit.record(message, &raw, decision).await;

                IntentDecision { should_respond, raw }
            }
            Err(e) => {
                tracing::error!(error = %e, "intent classification failed");
                let raw = format!("Error: {e}");
                self.audit.record(message, &raw, ERROR_DECISION).await;

                IntentDecision {
                    should_respond: false,
                    raw,
                }
            }
        }
    }
}

impl std::fmt::Debug for IntentClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentClassifier")
            .field("model", &self.model)
            .field("persona", &self.persona)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

/// Exact, case-insensitive match against the affirmative token
#[must_use]
pub fn is_affirmative(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case(YES)
}

/// Build the scoring rubric prompt for one message
#[must_use]
pub fn build_prompt(persona: &str, message: &str) -> String {
    format!(
        r#"Je bent een AI die bepaalt of {persona} moet reageren in een WhatsApp-groep.
Je evalueert het bericht en de chatcontext op basis van het volgende puntensysteem:

1. **Directe betrokkenheid**:
- Wordt {persona} genoemd in het bericht? → **+40 punten**
- Eindigt het bericht met een vraagteken? → **+30 punten**
- Is er een vraag die langer dan een uur onbeantwoord blijft? → **+20 punten**
- Is het een herhaald bericht zonder eerdere reactie? → **+15 punten**

2. **Sociale Dynamiek**:
- Zijn er in de afgelopen 5 minuten veel berichten verstuurd? → **+20 punten**
- Zijn er minimaal 3 mensen actief in de groep? → **+15 punten**
- Is het een lopende discussie (bijv. plannen maken)? → **+20 punten**
- Is het bericht initiërend (voorstel activiteit)? → **+10 punten**

3. **Inhoudelijke Relevantie**:
- Gaat het over een onderwerp waar {persona} eerder over gesproken heeft? → **+15 punten**

4. **Tijd en context**:
- Is het bericht minder dan 10 minuten na het vorige bericht verstuurd? → **+10 punten**
- Avondbonus (18:00 - 00:00)? → **+10 punten**

**Beslissingsregel**:
Als het bericht 50 of meer punten heeft, antwoord dan 'ja'. Anders 'nee'.
Je mag GEEN uitleg geven, alleen 'ja' of 'nee'.

**Bericht:** "{message}""#
    )
}
