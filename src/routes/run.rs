use actix_web::{HttpResponse, post, web};
use serde::{Deserialize, Serialize};

use crate::sandbox::{ExecutionOutcome, PipelineError, Report, Sandbox, Submission};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunRequest {
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub test_input: String,
}

impl RunRequest {
    pub fn validate(self) -> Result<Submission, PipelineError> {
        let language = self
            .language
            .parse()
            .map_err(|_| PipelineError::UnsupportedLanguage(self.language.clone()))?;

        Ok(Submission {
            code: self.code,
            language,
            test_input: self.test_input,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    pub output: String,
    pub error: String,
    pub memory_usage: String,
    pub cpu_usage: String,
}

impl From<&Report> for ExecutionResult {
    fn from(report: &Report) -> Self {
        let (output, error) = match &report.outcome {
            ExecutionOutcome::Success { stdout } => (stdout.clone(), String::new()),
            ExecutionOutcome::CompileFailure { diagnostics } => {
                (String::new(), format!("Compilation failed: {diagnostics}"))
            }
            ExecutionOutcome::RuntimeFailure { message, stderr } => (
                String::new(),
                format!("Runtime error: {message}\nStderr: {stderr}"),
            ),
            ExecutionOutcome::TimedOut { limit, stderr } => (
                String::new(),
                format!(
                    "Runtime error: time limit of {} ms exceeded\nStderr: {stderr}",
                    limit.as_millis()
                ),
            ),
        };

        Self {
            output,
            error,
            memory_usage: report.resources.memory_usage(),
            cpu_usage: report.resources.cpu_usage(),
        }
    }
}

#[post("/run")]
pub async fn post_run_handler(
    sandbox: web::Data<Sandbox>,
    body: web::Json<RunRequest>,
) -> Result<HttpResponse, PipelineError> {
    let submission = body.into_inner().validate().inspect_err(|e| {
        log::info!("Rejected submission: {e}");
    })?;

    let report = sandbox.execute(&submission).await?;
    let result = ExecutionResult::from(&report);

    if report.is_success() {
        Ok(HttpResponse::Ok().json(result))
    } else {
        Ok(HttpResponse::InternalServerError().json(result))
    }
}
