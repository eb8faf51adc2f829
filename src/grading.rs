use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::model::ExamSpec;

/// Letter grades, declared lowest first so the derived ordering ranks A+ highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grade {
    F,
    D,
    C,
    CPlus,
    B,
    BPlus,
    A,
    APlus,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A+" => Some(Grade::APlus),
            "A" => Some(Grade::A),
            "B+" => Some(Grade::BPlus),
            "B" => Some(Grade::B),
            "C+" => Some(Grade::CPlus),
            "C" => Some(Grade::C),
            "D" => Some(Grade::D),
            "F" => Some(Grade::F),
            _ => None,
        }
    }
}

impl Serialize for Grade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Grade {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Grade::parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("unknown grade: {raw}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub min_percent: f64,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradeScaleError {
    #[error("unknown grade scale preset: {0}")]
    UnknownPreset(String),
    #[error("grade scale must contain at least one band")]
    Empty,
    #[error("band thresholds must lie within [0, 100] (got {0})")]
    ThresholdRange(f64),
    #[error("band thresholds must be strictly descending ({prev} then {next})")]
    NotDescending { prev: f64, next: f64 },
}

/// Ordered threshold table. Bands are checked top-down with `>=`; a percentage
/// matching no band is an F.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GradeScaleRepr", into = "Vec<GradeBand>")]
pub struct GradeScale {
    bands: Vec<GradeBand>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GradeScaleRepr {
    Preset(String),
    Bands(Vec<GradeBand>),
}

impl TryFrom<GradeScaleRepr> for GradeScale {
    type Error = GradeScaleError;

    fn try_from(repr: GradeScaleRepr) -> Result<Self, Self::Error> {
        match repr {
            GradeScaleRepr::Preset(name) => GradeScale::preset(&name),
            GradeScaleRepr::Bands(bands) => GradeScale::from_bands(bands),
        }
    }
}

impl From<GradeScale> for Vec<GradeBand> {
    fn from(scale: GradeScale) -> Self {
        scale.bands
    }
}

const STANDARD_BANDS: [(f64, Grade); 5] = [
    (90.0, Grade::APlus),
    (80.0, Grade::A),
    (70.0, Grade::B),
    (60.0, Grade::C),
    (50.0, Grade::D),
];

const PLUS_BANDS: [(f64, Grade); 7] = [
    (90.0, Grade::APlus),
    (80.0, Grade::A),
    (70.0, Grade::BPlus),
    (60.0, Grade::B),
    (50.0, Grade::CPlus),
    (40.0, Grade::C),
    (33.0, Grade::D),
];

impl Default for GradeScale {
    fn default() -> Self {
        GradeScale::standard()
    }
}

impl GradeScale {
    pub fn standard() -> Self {
        Self::from_table(&STANDARD_BANDS)
    }

    pub fn plus() -> Self {
        Self::from_table(&PLUS_BANDS)
    }

    fn from_table(table: &[(f64, Grade)]) -> Self {
        Self {
            bands: table
                .iter()
                .map(|&(min_percent, grade)| GradeBand { min_percent, grade })
                .collect(),
        }
    }

    pub fn preset(name: &str) -> Result<Self, GradeScaleError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "standard" | "default" => Ok(Self::standard()),
            "plus" => Ok(Self::plus()),
            other => Err(GradeScaleError::UnknownPreset(other.to_string())),
        }
    }

    pub fn from_bands(bands: Vec<GradeBand>) -> Result<Self, GradeScaleError> {
        if bands.is_empty() {
            return Err(GradeScaleError::Empty);
        }
        for b in &bands {
            if !(0.0..=100.0).contains(&b.min_percent) {
                return Err(GradeScaleError::ThresholdRange(b.min_percent));
            }
        }
        for w in bands.windows(2) {
            if w[1].min_percent >= w[0].min_percent {
                return Err(GradeScaleError::NotDescending {
                    prev: w[0].min_percent,
                    next: w[1].min_percent,
                });
            }
        }
        Ok(Self { bands })
    }

    pub fn grade_for(&self, percentage: f64) -> Grade {
        self.bands
            .iter()
            .find(|b| percentage >= b.min_percent)
            .map(|b| b.grade)
            .unwrap_or(Grade::F)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("cannot compute a percentage against totalMarks of 0")]
pub struct DivisionError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub grade: Grade,
    pub status: PassStatus,
    pub percentage: f64,
}

/// The one percentage formula; used for both marks and the passing threshold so
/// the two stay comparable.
pub fn percentage_of(marks: f64, total: f64) -> Result<f64, DivisionError> {
    if total == 0.0 {
        return Err(DivisionError);
    }
    Ok(marks * 100.0 / total)
}

pub fn compute(marks: f64, spec: &ExamSpec) -> Result<GradeOutcome, DivisionError> {
    let percentage = percentage_of(marks, spec.total_marks)?;
    let pass_line = percentage_of(spec.passing_marks, spec.total_marks)?;
    let status = if percentage >= pass_line {
        PassStatus::Pass
    } else {
        PassStatus::Fail
    };
    Ok(GradeOutcome {
        grade: spec.grade_scale.grade_for(percentage),
        status,
        percentage,
    })
}
