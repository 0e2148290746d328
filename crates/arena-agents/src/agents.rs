//! LLM-backed contestants and judge.

use arena::{AgentCapability, AgentProfile, CapabilityError, JudgingCapability};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::llm::ChatClient;
use crate::prompts;

/// A contestant whose personality is the system prompt of every call.
#[derive(Debug, Clone)]
pub struct LlmAgent {
    profile: AgentProfile,
    client: ChatClient,
}

impl LlmAgent {
    pub fn new(profile: AgentProfile, client: ChatClient) -> Self {
        Self { profile, client }
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    async fn ask_for_code(&self, prompt: &str) -> Result<String, CapabilityError> {
        let reply = self
            .client
            .complete(&self.profile.model, &self.profile.personality, prompt)
            .await?;
        let code = extract_code(&reply);
        if code.is_empty() {
            return Err(CapabilityError::EmptyResponse);
        }
        debug!(agent = %self.profile.name, bytes = code.len(), "code received");
        Ok(code)
    }
}

#[async_trait]
impl AgentCapability for LlmAgent {
    fn name(&self) -> &str {
        &self.profile.name
    }

    async fn generate(&self, problem: &str) -> Result<String, CapabilityError> {
        info!(agent = %self.profile.name, model = %self.profile.model, "generating");
        self.ask_for_code(&prompts::generation_prompt(problem)).await
    }

    async fn refine(
        &self,
        problem: &str,
        own_prior_code: &str,
        reference_code: &str,
        critique: &str,
    ) -> Result<String, CapabilityError> {
        info!(agent = %self.profile.name, model = %self.profile.model, "refining");
        let prompt = prompts::refinement_prompt(
            problem,
            &self.profile.role,
            own_prior_code,
            reference_code,
            critique,
        );
        self.ask_for_code(&prompt).await
    }
}

/// The judge. Returns the raw reply; the tournament does the parsing.
#[derive(Debug, Clone)]
pub struct LlmJudge {
    profile: AgentProfile,
    client: ChatClient,
}

impl LlmJudge {
    pub fn new(profile: AgentProfile, client: ChatClient) -> Self {
        Self { profile, client }
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }
}

#[async_trait]
impl JudgingCapability for LlmJudge {
    async fn ask(&self, evidence: &str) -> Result<String, CapabilityError> {
        info!(judge = %self.profile.name, model = %self.profile.model, tier = %self.profile.tier, "judging");
        self.client
            .complete(&self.profile.model, &self.profile.personality, evidence)
            .await
    }
}

/// Pull source out of a Markdown reply: the first ```python block, else the first
/// fenced block, else the whole reply.
pub fn extract_code(reply: &str) -> String {
    for opener in ["```python", "```py\n", "```"] {
        if let Some(start) = reply.find(opener) {
            let body = &reply[start + opener.len()..];
            // Skip an info string on the opening line (e.g. ```python3).
            let body = match body.find('\n') {
                Some(nl) if !opener.ends_with('\n') && !body[..nl].trim().contains(' ') => {
                    &body[nl + 1..]
                }
                _ => body,
            };
            let end = body.find("```").unwrap_or(body.len());
            return body[..end].trim().to_string();
        }
    }
    reply.trim().to_string()
}
