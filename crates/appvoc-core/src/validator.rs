//! Response classification.
//!
//! Validators are stateless and never mutate the response. Checks run in a
//! fixed order: presence, status code, JSON shape, then the resource-specific
//! content contract. The first failing check decides the outcome.

use std::fmt;

use serde_json::Value;

use crate::models::RawResponse;

/// Tri-state classification of a response (valid, or exactly one error kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Valid,
    DataError,
    ClientError,
    ServerError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Valid => "valid",
            Outcome::DataError => "data_error",
            Outcome::ClientError => "client_error",
            Outcome::ServerError => "server_error",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Outcome::Valid)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of validating one response.
#[derive(Debug, Clone)]
pub struct Validation {
    pub outcome: Outcome,
    /// Human-readable reason, for logging.
    pub message: String,
    /// Parsed body, present only when the response is valid.
    pub payload: Option<Value>,
}

impl Validation {
    fn valid(payload: Value) -> Self {
        Self {
            outcome: Outcome::Valid,
            message: "valid".to_string(),
            payload: Some(payload),
        }
    }

    fn invalid(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
            payload: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.outcome.is_valid()
    }
}

/// Classifies raw responses for one remote resource.
pub trait Validator: Send + Sync {
    /// Resource-specific content contract, run on a parsed JSON object.
    /// Returns an error message when the contract is violated.
    fn check_content(&self, payload: &serde_json::Map<String, Value>) -> Result<(), String>;

    fn validate(&self, response: Option<&RawResponse>) -> Validation {
        let Some(response) = response else {
            return Validation::invalid(Outcome::ServerError, "no response received");
        };

        match response.status {
            200 => {}
            400..=499 => {
                return Validation::invalid(
                    Outcome::ClientError,
                    format!("HTTP {} for {}", response.status, response.url),
                );
            }
            status => {
                return Validation::invalid(
                    Outcome::ServerError,
                    format!("HTTP {} for {}", status, response.url),
                );
            }
        }

        let payload: Value = match serde_json::from_str(&response.body) {
            Ok(v) => v,
            Err(e) => {
                return Validation::invalid(Outcome::DataError, format!("body is not JSON: {e}"));
            }
        };

        let Some(object) = payload.as_object() else {
            return Validation::invalid(Outcome::DataError, "body is not a JSON object");
        };

        match self.check_content(object) {
            Ok(()) => Validation::valid(payload),
            Err(message) => Validation::invalid(Outcome::DataError, message),
        }
    }
}

fn non_empty_array<'a>(
    payload: &'a serde_json::Map<String, Value>,
    key: &str,
) -> Result<&'a Vec<Value>, String> {
    match payload.get(key) {
        None => Err(format!("response has no '{key}' key")),
        Some(Value::Array(items)) if items.is_empty() => Err(format!("'{key}' is empty")),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(format!("'{key}' is not a list")),
    }
}

/// True when `response` is a well-formed 200 whose `key` list is empty, the
/// remote's way of saying a paginated sequence has no more data.
pub fn is_empty_page(response: Option<&RawResponse>, key: &str) -> bool {
    let Some(response) = response.filter(|r| r.status == 200) else {
        return false;
    };
    serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|v| v.get(key).and_then(Value::as_array).map(Vec::is_empty))
        .unwrap_or(false)
}

/// Search listing contract: a non-empty `results` array.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListingValidator;

impl Validator for ListingValidator {
    fn check_content(&self, payload: &serde_json::Map<String, Value>) -> Result<(), String> {
        non_empty_array(payload, "results").map(|_| ())
    }
}

/// Rating contract: summary keys plus a 5-bucket histogram.
#[derive(Debug, Clone, Copy, Default)]
pub struct RatingValidator;

const RATING_KEYS: [&str; 5] = [
    "adamId",
    "ratingAverage",
    "totalNumberOfReviews",
    "ratingCount",
    "ratingCountList",
];

impl Validator for RatingValidator {
    fn check_content(&self, payload: &serde_json::Map<String, Value>) -> Result<(), String> {
        if let Some(missing) = RATING_KEYS.iter().find(|k| !payload.contains_key(**k)) {
            return Err(format!("response has no '{missing}' key"));
        }
        match payload.get("ratingCountList") {
            Some(Value::Array(buckets)) if buckets.len() == 5 => Ok(()),
            Some(Value::Array(buckets)) => Err(format!(
                "'ratingCountList' has {} buckets, expected 5",
                buckets.len()
            )),
            _ => Err("'ratingCountList' is not a list".to_string()),
        }
    }
}

/// Review contract: a non-empty `userReviewList` array.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewValidator;

impl Validator for ReviewValidator {
    fn check_content(&self, payload: &serde_json::Map<String, Value>) -> Result<(), String> {
        non_empty_array(payload, "userReviewList").map(|_| ())
    }
}
