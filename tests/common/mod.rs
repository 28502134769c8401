#![allow(dead_code)]

use finadvisor::profile::{
    Country, EmploymentStatus, InvestmentGoal, InvestmentHorizon, InvestmentType, RiskTolerance,
};
use finadvisor::UserProfile;

/// Form pairs as the browser posts them, minus the challenge field.
pub fn form_pairs() -> Vec<(String, String)> {
    [
        ("name", "Siti Rahma"),
        ("age", "41"),
        ("employment_status", "Employed"),
        ("annual_income", "87000"),
        ("monthly_expenses", "2900"),
        ("savings", "15500"),
        ("investments", "64000"),
        ("current_debts", "3000"),
        ("risk_tolerance", "Conservative"),
        ("investment_goals", "Education"),
        ("investment_goals", "Retirement"),
        ("investment_horizon", "Medium-term (3-5 years)"),
        ("preferred_investments", "Bonds"),
        ("preferred_investments", "Mutual Funds"),
        ("country", "Indonesia"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn with_field(mut pairs: Vec<(String, String)>, key: &str, value: &str) -> Vec<(String, String)> {
    pairs.push((key.to_string(), value.to_string()));
    pairs
}

/// The profile `form_pairs` parses to.
pub fn expected_profile() -> UserProfile {
    UserProfile {
        name: "Siti Rahma".to_string(),
        age: 41,
        employment_status: EmploymentStatus::Employed,
        annual_income: 87_000,
        monthly_expenses: 2_900,
        savings: 15_500,
        investments: 64_000,
        risk_tolerance: RiskTolerance::Conservative,
        investment_goals: vec![InvestmentGoal::Education, InvestmentGoal::Retirement],
        investment_horizon: InvestmentHorizon::MediumTerm,
        preferred_investments: vec![InvestmentType::Bonds, InvestmentType::MutualFunds],
        current_debts: 3_000,
        country: Country::Indonesia,
    }
}

pub fn completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
        ]
    })
}
