use crate::dataset::Dataset;
use crate::grid::Bbox;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced to query clients. Messages are deliberately generic.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("malformed bbox request")]
    Malformed,
    #[error("data is not loaded yet")]
    NotReady,
    #[error("internal error")]
    Internal,
    #[error("not found")]
    NotFound,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ResponseError for QueryError {
    fn status_code(&self) -> StatusCode {
        match self {
            QueryError::Malformed => StatusCode::BAD_REQUEST,
            QueryError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            QueryError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            status: "error".into(),
            message: self.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct BboxRequest {
    bboxes: Vec<Bbox>,
}

/// Parses `{"bboxes": [{"west":..,"south":..,"east":..,"north":..}, ..]}`.
///
/// Inverted boxes are dropped. A body that does not parse, or one left
/// without a valid box, rejects the whole request.
pub fn parse_request(body: &[u8]) -> Result<Vec<Bbox>, QueryError> {
    let request: BboxRequest = serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "could not parse bbox request");
        QueryError::Malformed
    })?;
    let total = request.bboxes.len();
    let bboxes: Vec<Bbox> = request
        .bboxes
        .into_iter()
        .filter(Bbox::is_valid)
        .collect();
    if bboxes.len() < total {
        debug!(dropped = total - bboxes.len(), "ignoring inverted bboxes");
    }
    if bboxes.is_empty() {
        return Err(QueryError::Malformed);
    }
    Ok(bboxes)
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
    pub full: Option<String>,
}

impl QueryParams {
    pub fn is_full(&self) -> bool {
        matches!(self.full.as_deref(), Some("true") | Some("1"))
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct WayResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// `[lat, lon]` pairs in degrees.
    pub nodes: Vec<[f64; 2]>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WaysResult {
    pub ways: BTreeMap<i64, WayResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WaysResponse {
    pub status: String,
    pub params: Vec<Bbox>,
    pub result: WaysResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_timestamp: Option<String>,
}

pub fn select_ways(dataset: &Dataset, bboxes: Vec<Bbox>, full: bool) -> WaysResponse {
    let ways = dataset
        .select_by_bboxes(&bboxes)
        .into_iter()
        .map(|way| {
            let nodes = dataset
                .way_nodes(way)
                .map(|node| [node.lat_degrees(), node.lon_degrees()])
                .collect();
            let tags = dataset
                .tag_pairs(&way.tags)
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect();
            let response = WayResponse {
                id: if full { Some(way.id) } else { None },
                nodes,
                tags,
            };
            (way.id, response)
        })
        .collect();

    WaysResponse {
        status: "success".into(),
        params: bboxes,
        result: WaysResult { ways },
        data_timestamp: dataset.timestamp().map(String::from),
    }
}
