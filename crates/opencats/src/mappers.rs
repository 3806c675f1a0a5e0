//! Conversion from local records to OpenCATS payloads

use crate::models::{
    ApplicationStatus, CandidateJobOrderRequest, CandidatePush, CandidateRequest, JobOrderRequest,
    LocalApplicationBundle, LocalCandidate, LocalJob, LocalResume, OpenCatsAttachment,
    OpenCatsCandidate, OpenCatsCandidateJobOrder, OpenCatsJobOrder, WorkType,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// OpenCATS pipeline label for an application status
pub fn pipeline_status(status: ApplicationStatus) -> &'static str {
    match status {
        ApplicationStatus::New => "New Lead",
        ApplicationStatus::Screen => "Screen",
        ApplicationStatus::Interview => "Interview",
        ApplicationStatus::Offer => "Offer",
        ApplicationStatus::Hired => "Hired",
        ApplicationStatus::Rejected => "Rejected",
    }
}

/// Convert an amount in cents to currency units with two decimals
pub fn currency_from_cents(value: Option<i64>) -> Option<f64> {
    value.map(|cents| (cents as f64 / 100.0 * 100.0).round() / 100.0)
}

/// Trim, title-case, de-duplicate and sort skills into one comma-joined string
pub fn normalize_skills(skills: &[String]) -> Option<String> {
    let unique: BTreeSet<String> = skills
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(title_case)
        .collect();

    if unique.is_empty() {
        None
    } else {
        Some(unique.into_iter().collect::<Vec<_>>().join(", "))
    }
}

/// `full_time` -> `Full Time`
pub fn format_work_type(work_type: Option<WorkType>) -> Option<String> {
    work_type.map(|wt| title_case(&wt.as_str().replace('_', " ")))
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest
fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_alpha = false;
    for c in input.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

pub fn map_candidate(candidate: &LocalCandidate) -> OpenCatsCandidate {
    OpenCatsCandidate {
        candidate_id: candidate.id.clone(),
        first_name: candidate.first_name.clone(),
        last_name: candidate.last_name.clone(),
        email1: candidate.email.clone(),
        phone1: candidate.phone.clone(),
        city: candidate.city.clone(),
        country: candidate.country.clone(),
        summary: candidate.summary.clone(),
        key_skills: normalize_skills(&candidate.skills),
        desired_pay_min: currency_from_cents(candidate.desired_pay_min),
        desired_pay_max: currency_from_cents(candidate.desired_pay_max),
        work_type: format_work_type(candidate.work_type),
        availability: candidate.availability.clone(),
        updated_at: candidate.updated_at,
    }
}

pub fn map_resume(resume: &LocalResume, created_at: DateTime<Utc>) -> OpenCatsAttachment {
    OpenCatsAttachment {
        attachment_id: resume.id.clone(),
        candidate_id: resume.candidate_id.clone(),
        file_name: resume.file_name.clone(),
        content_type: resume.content_type.clone(),
        content_base64: resume.as_base64(),
        created_at,
    }
}

pub fn map_job(job: &LocalJob) -> OpenCatsJobOrder {
    OpenCatsJobOrder {
        job_id: job.id.clone(),
        employer_id: job.employer_id.clone(),
        title: job.title.clone(),
        description: job.description.clone(),
        city: job.city.clone(),
        country: job.country.clone(),
        salary_min: currency_from_cents(job.salary_min),
        salary_max: currency_from_cents(job.salary_max),
        work_type: format_work_type(job.work_type),
        external_id: job.external_id.clone(),
        updated_at: job.updated_at,
    }
}

pub fn map_application(bundle: &LocalApplicationBundle) -> OpenCatsCandidateJobOrder {
    let application = &bundle.application;
    OpenCatsCandidateJobOrder {
        application_id: application.id.clone(),
        candidate_id: application.candidate_id.clone(),
        job_id: application.job_id.clone(),
        status: pipeline_status(application.status).to_string(),
        source: application.source.clone(),
        resume_attachment_id: bundle.resume.as_ref().map(|r| r.id.clone()),
        submitted_at: application.submitted_at,
        updated_at: application.updated_at,
    }
}

/// Build the `POST /candidate` body
pub fn candidate_request(push: &CandidatePush) -> crate::Result<CandidateRequest> {
    if let Some(ref resume) = push.resume {
        if resume.candidate_id != push.candidate.id {
            return Err(crate::Error::Validation(
                "resume.candidate_id must match candidate.id".to_string(),
            ));
        }
    }
    if !push.candidate.email.contains('@') {
        return Err(crate::Error::Validation(format!(
            "invalid email address: {}",
            push.candidate.email
        )));
    }

    let now = Utc::now();
    Ok(CandidateRequest {
        candidate: map_candidate(&push.candidate),
        attachments: push.resume.iter().map(|r| map_resume(r, now)).collect(),
    })
}

/// Build the `POST /joborder` body
pub fn job_order_request(job: &LocalJob) -> JobOrderRequest {
    JobOrderRequest {
        joborder: map_job(job),
    }
}

/// Build the `POST /candidate_joborder` body
pub fn application_request(
    bundle: &LocalApplicationBundle,
) -> crate::Result<CandidateJobOrderRequest> {
    bundle.validate()?;

    let now = Utc::now();
    Ok(CandidateJobOrderRequest {
        candidate: map_candidate(&bundle.candidate),
        joborder: map_job(&bundle.job),
        candidate_joborder: map_application(bundle),
        attachments: bundle.resume.iter().map(|r| map_resume(r, now)).collect(),
    })
}
