mod assignment;
mod candidate;
mod export;
mod feedback;
mod health;
mod submission;
mod webhook;

pub(crate) use assignment::{
    AssignmentResponse, CreateAssignmentRequest, ListAssignmentsQuery, ListAssignmentsResponse,
};
pub(crate) use candidate::{CandidateResponse, CreateCandidateRequest};
pub(crate) use export::{CreateExportRequest, ExportResponse};
pub(crate) use feedback::{FeedbackItem, FeedbackListResponse, FeedbackQuery};
pub(crate) use health::{HealthResponse, ReadyResponse, RootResponse, WorkerMetrics};
pub(crate) use submission::{
    CreateSubmissionRequest, CreateSubmissionResponse, StageAttempts, SubmissionStatusResponse,
    UploadSubmissionFileResponse,
};
pub(crate) use webhook::{TelegramWebhookRequest, TelegramWebhookResponse};
