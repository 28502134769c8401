use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::profile::{join_labels, UserProfile};

pub const SYSTEM_PROMPT: &str =
    "You are a financial advisor who provides detailed and specific investment advice based on user profiles.";

const CLOSING_REQUEST: &str = "Please include specific stock recommendations, bond recommendations, \
mutual funds/ETFs, asset allocation strategy, risk management, tax efficiency, and income generation strategies.";

#[derive(Debug, Error)]
pub enum AdviceError {
    /// Non-2xx reply. Status and body are shown to the user unchanged.
    #[error("Error: {status} {body}")]
    Upstream { status: StatusCode, body: String },
    #[error("Failed to reach the chat-completion API: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Chat-completion reply had no message content: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    pub fn first_content(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|choice| choice.message.content)
    }
}

/// Renders the user message for a profile. Every submitted value appears
/// exactly as it was entered; amounts are plain dollar integers.
pub fn build_prompt(profile: &UserProfile) -> String {
    format!(
        "Provide detailed investment advice based on the following user profile:\n\n\
         Name: {name}\n\
         Age: {age}\n\
         Employment Status: {employment}\n\
         Annual Income: ${income}\n\
         Monthly Expenses: ${expenses}\n\
         Current Savings: ${savings}\n\
         Current Investments: ${investments}\n\
         Current Debts: ${debts}\n\
         Risk Tolerance: {risk}\n\
         Investment Goals: {goals}\n\
         Investment Horizon: {horizon}\n\
         Preferred Investments: {preferred}\n\
         Country: {country}\n\n\
         {closing}",
        name = profile.name,
        age = profile.age,
        employment = profile.employment_status,
        income = profile.annual_income,
        expenses = profile.monthly_expenses,
        savings = profile.savings,
        investments = profile.investments,
        debts = profile.current_debts,
        risk = profile.risk_tolerance,
        goals = join_labels(&profile.investment_goals),
        horizon = profile.investment_horizon,
        preferred = join_labels(&profile.preferred_investments),
        country = profile.country,
        closing = CLOSING_REQUEST,
    )
}

pub fn build_request(model: &str, profile: &UserProfile) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(profile)),
        ],
    }
}

/// Client for an OpenAI-compatible chat-completion endpoint.
#[derive(Clone)]
pub struct AdviceClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl AdviceClient {
    pub fn new(client: Client, endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one completion request. No retry: any failure is final for the
    /// submission.
    #[instrument(skip_all, fields(model = %self.model))]
    pub async fn request_advice(&self, profile: &UserProfile) -> Result<String, AdviceError> {
        let payload = build_request(&self.model, profile);
        debug!(prompt = %payload.messages[1].content, "Constructed advice prompt");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "Chat-completion request failed");
            return Err(AdviceError::Upstream { status, body });
        }

        let body = response.text().await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| AdviceError::MalformedResponse(e.to_string()))?;
        let advice = parsed
            .first_content()
            .ok_or_else(|| AdviceError::MalformedResponse("no choices[0].message.content".to_string()))?;

        info!(chars = advice.len(), "Received investment advice");
        Ok(advice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::*;

    fn profile() -> UserProfile {
        UserProfile {
            name: "Grace Hopper".to_string(),
            age: 45,
            employment_status: EmploymentStatus::Employed,
            annual_income: 98_000,
            monthly_expenses: 4_200,
            savings: 12_500,
            investments: 30_000,
            risk_tolerance: RiskTolerance::Aggressive,
            investment_goals: vec![InvestmentGoal::Education, InvestmentGoal::ShortTermNeeds],
            investment_horizon: InvestmentHorizon::MediumTerm,
            preferred_investments: vec![InvestmentType::Bonds, InvestmentType::Cryptocurrency],
            current_debts: 7_500,
            country: Country::Australia,
        }
    }

    #[test]
    fn test_prompt_contains_every_value() {
        let prompt = build_prompt(&profile());
        for expected in [
            "Name: Grace Hopper",
            "Age: 45",
            "Employment Status: Employed",
            "Annual Income: $98000",
            "Monthly Expenses: $4200",
            "Current Savings: $12500",
            "Current Investments: $30000",
            "Current Debts: $7500",
            "Risk Tolerance: Aggressive",
            "Investment Goals: Education, Short-term Needs",
            "Investment Horizon: Medium-term (3-5 years)",
            "Preferred Investments: Bonds, Cryptocurrency",
            "Country: Australia",
        ] {
            assert!(prompt.contains(expected), "prompt is missing {expected:?}:\n{prompt}");
        }
        assert!(prompt.starts_with("Provide detailed investment advice"));
        assert!(prompt.ends_with("income generation strategies."));
    }

    #[test]
    fn test_prompt_with_empty_selections() {
        let mut p = profile();
        p.investment_goals.clear();
        p.preferred_investments.clear();
        let prompt = build_prompt(&p);
        assert!(prompt.contains("Investment Goals: \n"));
        assert!(prompt.contains("Preferred Investments: \n"));
    }

    #[test]
    fn test_request_shape() {
        let request = build_request("gpt-4", &profile());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn test_first_content() {
        let reply: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Buy index funds."}},{"message":{"content":"ignored"}}]}"#,
        )
        .unwrap();
        assert_eq!(reply.first_content().as_deref(), Some("Buy index funds."));

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(empty.first_content().is_none());
    }
}
