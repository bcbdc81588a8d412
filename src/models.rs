use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_CYCLE_LENGTH: u32 = 28;
pub const DEFAULT_PERIOD_LENGTH: u32 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlowIntensity {
    Spotting,
    Light,
    Medium,
    Heavy,
}

impl std::str::FromStr for FlowIntensity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spotting" => Ok(Self::Spotting),
            "light" => Ok(Self::Light),
            "medium" => Ok(Self::Medium),
            "heavy" => Ok(Self::Heavy),
            other => Err(format!("unknown flow intensity `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Symptom {
    // Physical
    Cramps,
    Headache,
    Backache,
    Nausea,
    Bloating,
    BreastTenderness,
    Fatigue,
    Acne,
    Constipation,
    Diarrhea,
    // Emotional
    MoodSwings,
    Anxiety,
    Irritability,
    Depression,
    Calm,
    Sensitive,
    Happy,
    Sad,
}

impl Symptom {
    pub const ALL: [Symptom; 18] = [
        Symptom::Cramps,
        Symptom::Headache,
        Symptom::Backache,
        Symptom::Nausea,
        Symptom::Bloating,
        Symptom::BreastTenderness,
        Symptom::Fatigue,
        Symptom::Acne,
        Symptom::Constipation,
        Symptom::Diarrhea,
        Symptom::MoodSwings,
        Symptom::Anxiety,
        Symptom::Irritability,
        Symptom::Depression,
        Symptom::Calm,
        Symptom::Sensitive,
        Symptom::Happy,
        Symptom::Sad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Symptom::Cramps => "cramps",
            Symptom::Headache => "headache",
            Symptom::Backache => "backache",
            Symptom::Nausea => "nausea",
            Symptom::Bloating => "bloating",
            Symptom::BreastTenderness => "breast_tenderness",
            Symptom::Fatigue => "fatigue",
            Symptom::Acne => "acne",
            Symptom::Constipation => "constipation",
            Symptom::Diarrhea => "diarrhea",
            Symptom::MoodSwings => "mood_swings",
            Symptom::Anxiety => "anxiety",
            Symptom::Irritability => "irritability",
            Symptom::Depression => "depression",
            Symptom::Calm => "calm",
            Symptom::Sensitive => "sensitive",
            Symptom::Happy => "happy",
            Symptom::Sad => "sad",
        }
    }
}

impl std::str::FromStr for Symptom {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Symptom::ALL
            .iter()
            .copied()
            .find(|symptom| symptom.as_str() == wanted)
            .ok_or_else(|| format!("unknown symptom `{s}`"))
    }
}

/// Everything logged for a single calendar date. One per user and date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayRecord {
    pub id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub flow: Option<FlowIntensity>,
    #[serde(default)]
    pub symptoms: BTreeSet<Symptom>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl DayRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            flow: None,
            symptoms: BTreeSet::new(),
            notes: None,
        }
    }

    pub fn with_flow(date: NaiveDate, flow: FlowIntensity) -> Self {
        Self {
            flow: Some(flow),
            ..Self::new(date)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleRecord {
    pub id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// `(end_date - start_date) + 1`, set together with `end_date`.
    pub length: Option<u32>,
    /// Ordered by date.
    #[serde(default)]
    pub days: Vec<DayRecord>,
}

impl CycleRecord {
    pub fn new(start_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_date,
            end_date: None,
            length: None,
            days: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }

    /// Number of logged days carrying a flow value.
    pub fn period_length(&self) -> u32 {
        self.days.iter().filter(|d| d.flow.is_some()).count() as u32
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DayRecord> {
        self.days.iter().find(|d| d.date == date)
    }

    /// Insert or replace the record for `day.date`, keeping `days` sorted.
    pub fn put_day(&mut self, day: DayRecord) {
        match self.days.binary_search_by_key(&day.date, |d| d.date) {
            Ok(idx) => self.days[idx] = day,
            Err(idx) => self.days.insert(idx, day),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
    #[serde(default)]
    pub height_cm: Option<f32>,
    #[serde(default)]
    pub weight_kg: Option<f32>,
    #[serde(default = "default_cycle_length")]
    pub cycle_average_length: u32,
    #[serde(default = "default_period_length")]
    pub period_average_length: u32,
    pub last_updated: NaiveDate,
}

fn default_cycle_length() -> u32 {
    DEFAULT_CYCLE_LENGTH
}

fn default_period_length() -> u32 {
    DEFAULT_PERIOD_LENGTH
}

impl UserProfile {
    pub fn new(id: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            birthdate: None,
            height_cm: None,
            weight_kg: None,
            cycle_average_length: DEFAULT_CYCLE_LENGTH,
            period_average_length: DEFAULT_PERIOD_LENGTH,
            last_updated: today,
        }
    }

    /// Stored average, or the default when the stored value is unusable.
    pub fn cycle_length(&self) -> u32 {
        if self.cycle_average_length == 0 {
            DEFAULT_CYCLE_LENGTH
        } else {
            self.cycle_average_length
        }
    }

    pub fn period_length(&self) -> u32 {
        if self.period_average_length == 0 {
            DEFAULT_PERIOD_LENGTH
        } else {
            self.period_average_length
        }
    }

    /// Whole years between birthdate and `today`.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        self.birthdate.and_then(|b| today.years_since(b))
    }
}

/// Partial profile update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub height_cm: Option<f32>,
    pub weight_kg: Option<f32>,
    pub cycle_average_length: Option<u32>,
    pub period_average_length: Option<u32>,
}

impl ProfileUpdate {
    pub fn apply(self, profile: &mut UserProfile, today: NaiveDate) {
        if let Some(name) = self.name {
            profile.name = name;
        }
        if let Some(birthdate) = self.birthdate {
            profile.birthdate = Some(birthdate);
        }
        if let Some(height) = self.height_cm {
            profile.height_cm = Some(height);
        }
        if let Some(weight) = self.weight_kg {
            profile.weight_kg = Some(weight);
        }
        if let Some(len) = self.cycle_average_length {
            profile.cycle_average_length = len;
        }
        if let Some(len) = self.period_average_length {
            profile.period_average_length = len;
        }
        profile.last_updated = today;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Menstrual,
    Follicular,
    Ovulation,
    Luteal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PhaseInfo {
    pub title: &'static str,
    pub description: &'static str,
}

impl Phase {
    pub fn info(&self) -> PhaseInfo {
        match self {
            Phase::Menstrual => PhaseInfo {
                title: "Menstrual Phase",
                description: "Your body is shedding the uterine lining. You may experience cramping, fatigue, and mood changes.",
            },
            Phase::Follicular => PhaseInfo {
                title: "Follicular Phase",
                description: "Your body is preparing for ovulation. Estrogen rises, and you may feel more energetic and upbeat.",
            },
            Phase::Ovulation => PhaseInfo {
                title: "Ovulation Phase",
                description: "An egg is released from your ovary. You may notice increased energy, clearer skin, and heightened senses.",
            },
            Phase::Luteal => PhaseInfo {
                title: "Luteal Phase",
                description: "Your body is preparing for either pregnancy or menstruation. You may experience PMS symptoms like mood swings, bloating, and fatigue.",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Educational,
    Prediction,
    Pattern,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub timestamp: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleStats {
    pub total_cycles: usize,
    pub closed_cycles: usize,
    pub avg_cycle_length: u32,
    pub avg_period_length: u32,
    pub shortest_cycle: Option<u32>,
    pub longest_cycle: Option<u32>,
    pub last_period_start: Option<NaiveDate>,
    pub last_period_end: Option<NaiveDate>,
    /// Up to five most recent closed cycles, oldest first.
    pub recent: Vec<CycleSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleSummary {
    pub start_date: NaiveDate,
    pub cycle_length: u32,
    pub period_length: u32,
}

/// What the session reports for a reference date.
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub reference: NaiveDate,
    pub phase: Option<Phase>,
    pub phase_info: Option<PhaseInfo>,
    pub next_period: Option<NaiveDate>,
    pub insights: Vec<Insight>,
}
