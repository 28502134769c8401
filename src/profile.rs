use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Missing field `{0}`")]
    Missing(&'static str),
    #[error("`{field}` must be a whole number, got {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("`{field}` must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("`{field}` must be a multiple of {step}, got {value}")]
    OffStep {
        field: &'static str,
        value: u64,
        step: u64,
    },
    #[error("`{field}` does not accept {value:?}")]
    UnknownOption { field: &'static str, value: String },
}

/// Label that matched none of an option list's entries.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown option {0:?}")]
pub struct UnknownLabel(pub String);

// Select-box options serialize as their on-screen label, which is also what
// the form posts back.
macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            /// Every option, in the order the form lists them.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            pub fn labels() -> Vec<&'static str> {
                Self::ALL.iter().map(|option| option.label()).collect()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|option| option.label() == s)
                    .ok_or_else(|| UnknownLabel(s.to_string()))
            }
        }
    };
}

labelled_enum!(EmploymentStatus {
    Employed => "Employed",
    SelfEmployed => "Self-Employed",
    Unemployed => "Unemployed",
    Retired => "Retired",
});

labelled_enum!(RiskTolerance {
    Conservative => "Conservative",
    Moderate => "Moderate",
    Aggressive => "Aggressive",
});

labelled_enum!(InvestmentGoal {
    Retirement => "Retirement",
    Education => "Education",
    WealthAccumulation => "Wealth Accumulation",
    ShortTermNeeds => "Short-term Needs",
});

labelled_enum!(InvestmentHorizon {
    ShortTerm => "Short-term (1-3 years)",
    MediumTerm => "Medium-term (3-5 years)",
    LongTerm => "Long-term (5+ years)",
});

labelled_enum!(InvestmentType {
    Stocks => "Stocks",
    Bonds => "Bonds",
    MutualFunds => "Mutual Funds",
    Cryptocurrency => "Cryptocurrency",
});

labelled_enum!(
    /// Preferred country to invest in.
    Country {
        UnitedStates => "United States",
        Singapore => "Singapore",
        Australia => "Australia",
        Indonesia => "Indonesia",
        Other => "Other",
    }
);

/// Bounds of a numeric form widget. `step` also constrains accepted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub min: u64,
    pub max: u64,
    pub step: u64,
}

impl Bounds {
    const fn new(min: u64, max: u64, step: u64) -> Self {
        Self { min, max, step }
    }

    fn check(&self, field: &'static str, value: u64) -> Result<u64, ProfileError> {
        if value < self.min || value > self.max {
            return Err(ProfileError::OutOfRange {
                field,
                value,
                min: self.min,
                max: self.max,
            });
        }
        if (value - self.min) % self.step != 0 {
            return Err(ProfileError::OffStep {
                field,
                value,
                step: self.step,
            });
        }
        Ok(value)
    }
}

pub const AGE: Bounds = Bounds::new(18, 100, 1);
pub const ANNUAL_INCOME: Bounds = Bounds::new(0, 1_000_000, 1000);
pub const MONTHLY_EXPENSES: Bounds = Bounds::new(0, 20_000, 100);
pub const SAVINGS: Bounds = Bounds::new(0, 1_000_000, 500);
pub const INVESTMENTS: Bounds = Bounds::new(0, 1_000_000, 500);
pub const CURRENT_DEBTS: Bounds = Bounds::new(0, 1_000_000, 500);

/// One submission of the profile form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub age: u64,
    pub employment_status: EmploymentStatus,
    pub annual_income: u64,
    pub monthly_expenses: u64,
    pub savings: u64,
    pub investments: u64,
    pub risk_tolerance: RiskTolerance,
    pub investment_goals: Vec<InvestmentGoal>,
    pub investment_horizon: InvestmentHorizon,
    pub preferred_investments: Vec<InvestmentType>,
    pub current_debts: u64,
    pub country: Country,
}

/// Borrowed view over url-encoded form pairs.
struct FormFields<'a> {
    pairs: &'a [(String, String)],
}

impl<'a> FormFields<'a> {
    fn single(&self, field: &'static str) -> Result<&'a str, ProfileError> {
        self.pairs
            .iter()
            .find(|(key, _)| key == field)
            .map(|(_, value)| value.as_str())
            .ok_or(ProfileError::Missing(field))
    }

    fn many(&self, field: &'static str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(key, _)| key == field)
            .map(|(_, value)| value.as_str())
    }

    fn number(&self, field: &'static str, bounds: Bounds) -> Result<u64, ProfileError> {
        let raw = self.single(field)?.trim();
        let value = raw.parse::<u64>().map_err(|_| ProfileError::InvalidNumber {
            field,
            value: raw.to_string(),
        })?;
        bounds.check(field, value)
    }

    fn option<T: FromStr>(&self, field: &'static str) -> Result<T, ProfileError> {
        let raw = self.single(field)?;
        parse_option(field, raw)
    }

    fn options<T: FromStr + PartialEq>(&self, field: &'static str) -> Result<Vec<T>, ProfileError> {
        let mut selected = Vec::new();
        for raw in self.many(field) {
            let option = parse_option(field, raw)?;
            if !selected.contains(&option) {
                selected.push(option);
            }
        }
        Ok(selected)
    }
}

fn parse_option<T: FromStr>(field: &'static str, raw: &str) -> Result<T, ProfileError> {
    raw.parse::<T>().map_err(|_| ProfileError::UnknownOption {
        field,
        value: raw.to_string(),
    })
}

impl UserProfile {
    /// Builds a profile from url-encoded pairs. Multi-selects arrive as
    /// repeated keys and may be absent entirely; duplicates are dropped.
    pub fn from_form(pairs: &[(String, String)]) -> Result<Self, ProfileError> {
        let form = FormFields { pairs };

        Ok(Self {
            // Kept exactly as typed.
            name: form.single("name")?.to_string(),
            age: form.number("age", AGE)?,
            employment_status: form.option("employment_status")?,
            annual_income: form.number("annual_income", ANNUAL_INCOME)?,
            monthly_expenses: form.number("monthly_expenses", MONTHLY_EXPENSES)?,
            savings: form.number("savings", SAVINGS)?,
            investments: form.number("investments", INVESTMENTS)?,
            risk_tolerance: form.option("risk_tolerance")?,
            investment_goals: form.options("investment_goals")?,
            investment_horizon: form.option("investment_horizon")?,
            preferred_investments: form.options("preferred_investments")?,
            current_debts: form.number("current_debts", CURRENT_DEBTS)?,
            country: form.option("country")?,
        })
    }
}

/// Joins option labels the way the prompt and the result panel show them.
pub fn join_labels<T: fmt::Display>(options: &[T]) -> String {
    options
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn valid_form() -> Vec<(String, String)> {
        pairs(&[
            ("name", "Ada Lovelace"),
            ("age", "36"),
            ("employment_status", "Self-Employed"),
            ("annual_income", "120000"),
            ("monthly_expenses", "3500"),
            ("savings", "40000"),
            ("investments", "25500"),
            ("current_debts", "1000"),
            ("risk_tolerance", "Moderate"),
            ("investment_goals", "Retirement"),
            ("investment_goals", "Wealth Accumulation"),
            ("investment_horizon", "Long-term (5+ years)"),
            ("preferred_investments", "Stocks"),
            ("preferred_investments", "Mutual Funds"),
            ("country", "Singapore"),
        ])
    }

    #[test]
    fn test_from_form_valid() {
        let profile = UserProfile::from_form(&valid_form()).unwrap();
        assert_eq!(profile.name, "Ada Lovelace");
        assert_eq!(profile.age, 36);
        assert_eq!(profile.employment_status, EmploymentStatus::SelfEmployed);
        assert_eq!(profile.annual_income, 120_000);
        assert_eq!(
            profile.investment_goals,
            vec![InvestmentGoal::Retirement, InvestmentGoal::WealthAccumulation]
        );
        assert_eq!(
            profile.preferred_investments,
            vec![InvestmentType::Stocks, InvestmentType::MutualFunds]
        );
        assert_eq!(profile.country, Country::Singapore);
    }

    #[test]
    fn test_multiselects_may_be_empty() {
        let form: Vec<_> = valid_form()
            .into_iter()
            .filter(|(k, _)| k != "investment_goals" && k != "preferred_investments")
            .collect();
        let profile = UserProfile::from_form(&form).unwrap();
        assert!(profile.investment_goals.is_empty());
        assert!(profile.preferred_investments.is_empty());
    }

    #[test]
    fn test_duplicate_selections_are_dropped() {
        let mut form = valid_form();
        form.push(("investment_goals".to_string(), "Retirement".to_string()));
        let profile = UserProfile::from_form(&form).unwrap();
        assert_eq!(profile.investment_goals.len(), 2);
    }

    #[test]
    fn test_missing_field() {
        let form: Vec<_> = valid_form().into_iter().filter(|(k, _)| k != "country").collect();
        assert_eq!(
            UserProfile::from_form(&form),
            Err(ProfileError::Missing("country"))
        );
    }

    #[test]
    fn test_age_out_of_range() {
        let mut form = valid_form();
        form[1].1 = "17".to_string();
        assert!(matches!(
            UserProfile::from_form(&form),
            Err(ProfileError::OutOfRange { field: "age", value: 17, .. })
        ));
    }

    #[test]
    fn test_slider_off_step() {
        let mut form = valid_form();
        form[3].1 = "120001".to_string();
        assert!(matches!(
            UserProfile::from_form(&form),
            Err(ProfileError::OffStep { field: "annual_income", step: 1000, .. })
        ));
    }

    #[test]
    fn test_not_a_number() {
        let mut form = valid_form();
        form[4].1 = "lots".to_string();
        assert!(matches!(
            UserProfile::from_form(&form),
            Err(ProfileError::InvalidNumber { field: "monthly_expenses", .. })
        ));
    }

    #[test]
    fn test_unknown_option() {
        let mut form = valid_form();
        form[8].1 = "Reckless".to_string();
        assert_eq!(
            UserProfile::from_form(&form),
            Err(ProfileError::UnknownOption {
                field: "risk_tolerance",
                value: "Reckless".to_string()
            })
        );
    }

    #[test]
    fn test_name_kept_verbatim() {
        let mut form = valid_form();
        let long = format!("  {}  ", "x".repeat(300));
        form[0].1 = long.clone();
        assert_eq!(UserProfile::from_form(&form).unwrap().name, long);
    }

    #[test]
    fn test_serializes_with_labels() {
        let profile = UserProfile::from_form(&valid_form()).unwrap();
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["employment_status"], "Self-Employed");
        assert_eq!(json["investment_horizon"], "Long-term (5+ years)");
        assert_eq!(json["preferred_investments"][1], "Mutual Funds");
        assert_eq!(json["current_debts"], 1000);
    }

    #[test]
    fn test_label_round_trip() {
        for option in InvestmentHorizon::ALL {
            assert_eq!(option.label().parse::<InvestmentHorizon>(), Ok(*option));
        }
        assert_eq!(
            "Mars".parse::<Country>(),
            Err(UnknownLabel("Mars".to_string()))
        );
    }

    #[test]
    fn test_join_labels() {
        assert_eq!(
            join_labels(&[InvestmentType::Stocks, InvestmentType::Bonds]),
            "Stocks, Bonds"
        );
        assert_eq!(join_labels::<InvestmentType>(&[]), "");
    }
}
