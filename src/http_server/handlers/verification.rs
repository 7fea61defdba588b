use crate::{
    logger::RequestLogger,
    types::MatchResult,
    verifier::{Error, VerificationRequest, Verifier},
};
use actix_web::{http::StatusCode, web, web::Json, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationResponse {
    pub result: Vec<MatchResult>,
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::Compilation { .. } | Error::Match { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::Persistence { .. } | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

pub async fn verify(
    verifier: web::Data<Verifier>,
    request: Json<VerificationRequest>,
) -> Result<Json<VerificationResponse>, Error> {
    let logger = RequestLogger::new();
    let result = verifier.verify(request.into_inner(), &logger).await?;
    Ok(Json(VerificationResponse {
        result: vec![result],
    }))
}
