//! Client for the PCOS risk screening service.
//!
//! The service is an independent statistical model. It takes a fixed
//! questionnaire and answers with a yes/no prediction, a probability, a risk
//! band and free-text recommendations. Nothing here feeds the cycle
//! predictions; answers are passed through as received once they validate.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PcosConfig;
use crate::models::{UserProfile, DEFAULT_CYCLE_LENGTH, DEFAULT_PERIOD_LENGTH};

const DEFAULT_AGE: u32 = 25;

#[derive(Debug, thiserror::Error)]
pub enum PcosError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("prediction service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid prediction response: {0}")]
    InvalidResponse(String),
}

/// Questionnaire answers, serialized with the field names the service expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcosQuestionnaire {
    #[serde(rename = "Period_Length")]
    pub period_length: u32,
    #[serde(rename = "Cycle_Length")]
    pub cycle_length: u32,
    #[serde(rename = "Age")]
    pub age: u32,
    #[serde(rename = "Overweight", with = "flag")]
    pub overweight: bool,
    #[serde(rename = "loss_weight_gain_weight_loss", with = "flag")]
    pub weight_fluctuation: bool,
    #[serde(rename = "irregular_or_missed_periods", with = "flag")]
    pub irregular_or_missed_periods: bool,
    #[serde(rename = "Difficulty_in_conceiving", with = "flag")]
    pub difficulty_conceiving: bool,
    #[serde(rename = "Hair_growth_on_Chin", with = "flag")]
    pub hair_growth_chin: bool,
    #[serde(rename = "Hair_growth_on_Cheeks", with = "flag")]
    pub hair_growth_cheeks: bool,
    #[serde(rename = "Hair_growth_Between_breasts", with = "flag")]
    pub hair_growth_between_breasts: bool,
    #[serde(rename = "Hair_growth_on_Upper_lips", with = "flag")]
    pub hair_growth_upper_lips: bool,
    #[serde(rename = "Hair_growth_in_Arms", with = "flag")]
    pub hair_growth_arms: bool,
    #[serde(rename = "Hair_growth_on_Inner_thighs", with = "flag")]
    pub hair_growth_inner_thighs: bool,
    #[serde(rename = "Acne_or_skin_tags", with = "flag")]
    pub acne_or_skin_tags: bool,
    #[serde(rename = "Hair_thinning_or_hair_loss", with = "flag")]
    pub hair_thinning: bool,
    #[serde(rename = "Dark_patches", with = "flag")]
    pub dark_patches: bool,
    #[serde(rename = "always_tired", with = "flag")]
    pub always_tired: bool,
    #[serde(rename = "more_Mood_Swings", with = "flag")]
    pub mood_swings: bool,
    pub exercise_per_week: u32,
    pub eat_outside_per_week: u32,
    #[serde(with = "flag")]
    pub canned_food_often: bool,
    #[serde(with = "flag")]
    pub relocated_city: bool,
}

impl Default for PcosQuestionnaire {
    fn default() -> Self {
        Self {
            period_length: DEFAULT_PERIOD_LENGTH,
            cycle_length: DEFAULT_CYCLE_LENGTH,
            age: DEFAULT_AGE,
            overweight: false,
            weight_fluctuation: false,
            irregular_or_missed_periods: false,
            difficulty_conceiving: false,
            hair_growth_chin: false,
            hair_growth_cheeks: false,
            hair_growth_between_breasts: false,
            hair_growth_upper_lips: false,
            hair_growth_arms: false,
            hair_growth_inner_thighs: false,
            acne_or_skin_tags: false,
            hair_thinning: false,
            dark_patches: false,
            always_tired: false,
            mood_swings: false,
            exercise_per_week: 0,
            eat_outside_per_week: 0,
            canned_food_often: false,
            relocated_city: false,
        }
    }
}

impl PcosQuestionnaire {
    /// Fill cycle/period length and age from what the profile already knows.
    pub fn prefill_from_profile(mut self, profile: &UserProfile, today: NaiveDate) -> Self {
        self.cycle_length = profile.cycle_length();
        self.period_length = profile.period_length();
        if let Some(age) = profile.age_on(today) {
            self.age = age;
        }
        self
    }
}

/// Serialize booleans as the 0/1 integers the service works with.
mod flag {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(de::Error::custom(format!("expected 0 or 1, got {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "Low Risk")]
    Low,
    #[serde(rename = "Medium Risk")]
    Medium,
    #[serde(rename = "High Risk")]
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcosAssessment {
    pub prediction: u8,
    pub probability: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl PcosAssessment {
    pub fn is_positive(&self) -> bool {
        self.prediction == 1
    }

    /// Parse and range-check a response body.
    pub fn from_json(body: &str) -> Result<Self, PcosError> {
        let assessment: PcosAssessment = serde_json::from_str(body)
            .map_err(|e| PcosError::InvalidResponse(e.to_string()))?;
        assessment.validate()?;
        Ok(assessment)
    }

    fn validate(&self) -> Result<(), PcosError> {
        if self.prediction > 1 {
            return Err(PcosError::InvalidResponse(format!(
                "prediction must be 0 or 1, got {}",
                self.prediction
            )));
        }
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(PcosError::InvalidResponse(format!(
                "probability {} outside [0, 1]",
                self.probability
            )));
        }
        Ok(())
    }
}

pub struct PcosClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl PcosClient {
    pub fn new(config: &PcosConfig) -> Result<Self, PcosError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn predict_url(&self) -> String {
        format!("{}/predict", self.base_url)
    }

    /// Submit the questionnaire. One attempt, no retries.
    pub fn predict(&self, answers: &PcosQuestionnaire) -> Result<PcosAssessment, PcosError> {
        let url = self.predict_url();
        debug!(%url, "requesting PCOS assessment");

        let response = self.client.post(&url).json(answers).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "PCOS prediction request failed");
            return Err(PcosError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let assessment = PcosAssessment::from_json(&body)?;
        debug!(risk = ?assessment.risk_level, probability = assessment.probability, "PCOS assessment received");
        Ok(assessment)
    }
}
