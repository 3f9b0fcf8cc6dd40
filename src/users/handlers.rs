use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::auth::error_response;
use crate::server::AppState;
use crate::stats::IntervalSpec;

use super::{UserStatKind, UserStatsQuery, user_statistics};

/// Interval values this endpoint accepts; anything else is "wrong interval.".
const ACCEPTED_INTERVALS: [&str; 4] = ["1h", "1d", "1w", "1M"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatisticsQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub interval: Option<String>,
}

fn is_null_param(value: &Option<String>) -> bool {
    !matches!(value, Some(value) if !value.is_empty())
}

fn bad_request(code: &str, message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, code, message)
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// GET /services/{serviceId}/users/statistics: per-bucket member counts:
/// `[{date, cnt}]`, cumulative when `type=total`.
pub async fn user_statistics_handler(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
    Query(query): Query<UserStatisticsQuery>,
) -> Response {
    if is_null_param(&query.kind) {
        return bad_request("SERVICEUSER408", "type is missing.");
    }
    let Some(kind) = UserStatKind::parse(query.kind.as_deref().unwrap_or_default()) else {
        return bad_request("SERVICEUSER409", "wrong type.");
    };

    if is_null_param(&query.start_date) {
        return bad_request("SERVICEUSER415", "startDate is missing.");
    }
    let Some(start) = parse_date(query.start_date.as_deref().unwrap_or_default()) else {
        return bad_request(
            "SERVICEUSER416",
            "startDate must be in the format [YYYY-MM-DD].",
        );
    };

    if is_null_param(&query.end_date) {
        return bad_request("SERVICEUSER417", "endDate is missing.");
    }
    let Some(end) = parse_date(query.end_date.as_deref().unwrap_or_default()) else {
        return bad_request(
            "SERVICEUSER418",
            "endDate must be in the format [YYYY-MM-DD].",
        );
    };

    if is_null_param(&query.interval) {
        return bad_request("SERVICEUSER419", "interval is missing.");
    }
    let raw_interval = query.interval.as_deref().unwrap_or_default();
    if !ACCEPTED_INTERVALS.contains(&raw_interval) {
        return bad_request("SERVICEUSER420", "wrong interval.");
    }
    let interval = match IntervalSpec::parse(raw_interval) {
        Ok(interval) => interval,
        Err(e) => {
            // unreachable for the accepted values above
            tracing::error!("accepted interval failed to parse: {e}");
            return bad_request("SERVICEUSER420", "wrong interval.");
        }
    };

    let stats_query = UserStatsQuery {
        service_id,
        kind,
        start,
        end,
        interval,
    };

    match user_statistics(state.directory.as_ref(), &stats_query).await {
        Ok(Some(series)) => (StatusCode::OK, Json(series)).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            "The service does not exist.",
        ),
        Err(e) => {
            tracing::error!("user statistics query failed: {e:#}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Internal Server Error",
            )
        }
    }
}
