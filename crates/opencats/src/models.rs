//! Local records and OpenCATS payload shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported work type categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    FullTime,
    PartTime,
    Contract,
    Temporary,
    Internship,
    Other,
}

impl WorkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::FullTime => "full_time",
            WorkType::PartTime => "part_time",
            WorkType::Contract => "contract",
            WorkType::Temporary => "temporary",
            WorkType::Internship => "internship",
            WorkType::Other => "other",
        }
    }
}

/// Pipeline stages tracked for applications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    New,
    Screen,
    Interview,
    Offer,
    Hired,
    Rejected,
}

/// A stored candidate resume; `data` travels as base64 in JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalResume {
    pub id: String,
    pub candidate_id: String,
    pub file_name: String,
    pub content_type: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl LocalResume {
    /// Resume bytes encoded for transport
    pub fn as_base64(&self) -> String {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

/// Subset of the candidate profile required by OpenCATS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalCandidate {
    pub id: String,
    pub employer_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Stored in cents
    #[serde(default)]
    pub desired_pay_min: Option<i64>,
    /// Stored in cents
    #[serde(default)]
    pub desired_pay_max: Option<i64>,
    #[serde(default)]
    pub work_type: Option<WorkType>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Job definition synchronized as an OpenCATS job order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalJob {
    pub id: String,
    pub employer_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// Stored in cents
    #[serde(default)]
    pub salary_min: Option<i64>,
    /// Stored in cents
    #[serde(default)]
    pub salary_max: Option<i64>,
    #[serde(default)]
    pub work_type: Option<WorkType>,
    #[serde(default)]
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalApplication {
    pub id: String,
    pub employer_id: String,
    pub candidate_id: String,
    pub job_id: String,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub resume_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Application together with the candidate, job and resume it refers to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalApplicationBundle {
    pub application: LocalApplication,
    pub candidate: LocalCandidate,
    pub job: LocalJob,
    #[serde(default)]
    pub resume: Option<LocalResume>,
}

impl LocalApplicationBundle {
    /// Check that identifiers line up across the nested records
    pub fn validate(&self) -> crate::Result<()> {
        if self.candidate.id != self.application.candidate_id {
            return Err(crate::Error::Validation(
                "candidate.id must match application.candidate_id".to_string(),
            ));
        }
        if self.job.id != self.application.job_id {
            return Err(crate::Error::Validation(
                "job.id must match application.job_id".to_string(),
            ));
        }
        if let Some(ref resume) = self.resume {
            if resume.candidate_id != self.candidate.id {
                return Err(crate::Error::Validation(
                    "resume.candidate_id must match candidate.id".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Payload of a candidate push: the profile plus an optional resume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePush {
    pub candidate: LocalCandidate,
    #[serde(default)]
    pub resume: Option<LocalResume>,
}

/// Normalized OpenCATS candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenCatsCandidate {
    pub candidate_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email1: String,
    pub phone1: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub summary: Option<String>,
    pub key_skills: Option<String>,
    pub desired_pay_min: Option<f64>,
    pub desired_pay_max: Option<f64>,
    pub work_type: Option<String>,
    pub availability: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Resume stored as an OpenCATS attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenCatsAttachment {
    pub attachment_id: String,
    pub candidate_id: String,
    pub file_name: String,
    pub content_type: String,
    pub content_base64: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenCatsJobOrder {
    pub job_id: String,
    pub employer_id: String,
    pub title: String,
    pub description: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub work_type: Option<String>,
    pub external_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Join record mapping a candidate to a job order with pipeline status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenCatsCandidateJobOrder {
    pub application_id: String,
    pub candidate_id: String,
    pub job_id: String,
    pub status: String,
    pub source: Option<String>,
    pub resume_attachment_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /candidate`
#[derive(Debug, Clone, Serialize)]
pub struct CandidateRequest {
    pub candidate: OpenCatsCandidate,
    pub attachments: Vec<OpenCatsAttachment>,
}

/// Body of `POST /joborder`
#[derive(Debug, Clone, Serialize)]
pub struct JobOrderRequest {
    pub joborder: OpenCatsJobOrder,
}

/// Body of `POST /candidate_joborder`
#[derive(Debug, Clone, Serialize)]
pub struct CandidateJobOrderRequest {
    pub candidate: OpenCatsCandidate,
    pub joborder: OpenCatsJobOrder,
    pub candidate_joborder: OpenCatsCandidateJobOrder,
    pub attachments: Vec<OpenCatsAttachment>,
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
