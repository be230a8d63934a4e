//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and mobile client independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, OpenQuestion, OpenScore};

pub const DEFAULT_OPEN_QUESTIONS: usize = 5;
pub const DEFAULT_NEXT_TOPICS: usize = 5;

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct CourseIn {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenQuestionsIn {
    #[serde(default)]
    pub topic: String,
    pub n: Option<usize>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OpenQuestionsOut {
    pub questions: Vec<OpenQuestion>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateIn {
    pub question: String,
    #[serde(default)]
    pub answer: String,
    pub notes: Option<String>,
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NextTopicsIn {
    #[serde(default)]
    pub material: String,
    pub n: Option<usize>,
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TopicsOut {
    pub topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CourseKeyQuery {
    pub topic: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Serialize)]
pub struct RemovedOut {
    pub removed: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResultIn {
    pub topic: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub score: u32,
    pub total: u32,
    /// Summed open-answer scores; counted only together with `openMax`.
    #[serde(rename = "openScore", default)]
    pub open_score: Option<u32>,
    #[serde(rename = "openMax", default)]
    pub open_max: Option<u32>,
}

impl ResultIn {
    pub fn open(&self) -> Option<OpenScore> {
        self.open_max.map(|max| OpenScore { score: self.open_score.unwrap_or(0), max })
    }
}

#[derive(Debug, Serialize)]
pub struct ResultOut {
    pub percent: u32,
    #[serde(rename = "mcPercent")]
    pub mc_percent: u32,
    #[serde(rename = "openPercent", skip_serializing_if = "Option::is_none")]
    pub open_percent: Option<u32>,
    #[serde(rename = "nextDifficulty")]
    pub next_difficulty: Difficulty,
    pub stored: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_in_defaults_and_camel_case_key() {
        let c: CourseIn = serde_json::from_str(r#"{"topic": "Mars", "apiKey": "sk"}"#).unwrap();
        assert_eq!(c.difficulty, Difficulty::Medium);
        assert_eq!(c.api_key.as_deref(), Some("sk"));

        let c: CourseIn = serde_json::from_str(r#"{"topic": "Mars", "difficulty": "эксперт"}"#).unwrap();
        assert_eq!(c.difficulty, Difficulty::Expert);
        assert!(c.api_key.is_none());
    }

    #[test]
    fn result_out_uses_client_names() {
        let v = serde_json::to_value(ResultOut {
            percent: 80,
            mc_percent: 80,
            open_percent: None,
            next_difficulty: Difficulty::Expert,
            stored: true,
        })
        .unwrap();
        assert_eq!(v["nextDifficulty"], "expert");
        assert_eq!(v["percent"], 80);
        assert!(v.get("openPercent").is_none());
    }

    #[test]
    fn result_in_open_part_needs_a_max() {
        let r: ResultIn = serde_json::from_str(r#"{"topic": "t", "score": 1, "total": 2}"#).unwrap();
        assert_eq!(r.open(), None);
        let r: ResultIn =
            serde_json::from_str(r#"{"topic": "t", "score": 1, "total": 2, "openScore": 7, "openMax": 20}"#).unwrap();
        assert_eq!(r.open(), Some(OpenScore { score: 7, max: 20 }));
    }
}
