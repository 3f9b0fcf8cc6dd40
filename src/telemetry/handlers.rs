use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::auth::error_response;
use crate::server::AppState;
use crate::stats::{IntervalSpec, fill};

use super::{AggregateQuery, DataType, UnitsValue};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsQuery {
    pub service_id: Option<String>,
    pub device_id: Option<String>,
    /// Comma-separated unit numbers.
    pub unit_numbers: Option<String>,
    pub data_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub interval: Option<String>,
    /// Whole hours east of UTC.
    pub time_offset: Option<String>,
}

fn is_null_param(value: &Option<String>) -> bool {
    !matches!(value, Some(value) if !value.is_empty())
}

fn bad_request(code: &str, message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, code, message)
}

/// GET /data/statistics: aggregated telemetry as a gap-free series:
/// `[{date, units: {<unit>: value|null}}]` in bucket order.
pub async fn statistics_handler(
    State(state): State<AppState>,
    Query(query): Query<StatisticsQuery>,
) -> Response {
    if is_null_param(&query.service_id) {
        return bad_request("DATA401", "service id is missing.");
    }
    if is_null_param(&query.device_id) {
        return bad_request("DATA402", "device id is missing.");
    }
    if is_null_param(&query.unit_numbers) {
        return bad_request("DATA403", "unitNumbers are missing.");
    }
    if is_null_param(&query.data_type) {
        return bad_request("DATA404", "dataType is missing.");
    }
    if is_null_param(&query.start_date) {
        return bad_request("DATA405", "start date is missing.");
    }
    if is_null_param(&query.end_date) {
        return bad_request("DATA406", "end date is missing.");
    }
    if is_null_param(&query.interval) {
        return bad_request("DATA407", "interval is missing.");
    }
    if is_null_param(&query.time_offset) {
        return bad_request("DATA408", "timeOffset is missing.");
    }

    let service_id = query.service_id.as_deref().unwrap_or_default();
    let device_id = query.device_id.as_deref().unwrap_or_default();

    let Ok(start) =
        NaiveDate::parse_from_str(query.start_date.as_deref().unwrap_or_default(), "%Y-%m-%d")
    else {
        return bad_request("DATA405", "startDate must be in the format [YYYY-MM-DD].");
    };
    let Ok(end) =
        NaiveDate::parse_from_str(query.end_date.as_deref().unwrap_or_default(), "%Y-%m-%d")
    else {
        return bad_request("DATA406", "endDate must be in the format [YYYY-MM-DD].");
    };

    let Some(data_type) = DataType::parse(query.data_type.as_deref().unwrap_or_default()) else {
        return bad_request("DATA409", "wrong dataType.");
    };

    let Ok(interval) = IntervalSpec::parse(query.interval.as_deref().unwrap_or_default()) else {
        return bad_request("DATA410", "wrong interval.");
    };

    let Ok(time_offset_hours) = query
        .time_offset
        .as_deref()
        .unwrap_or_default()
        .parse::<i32>()
    else {
        return bad_request("DATA411", "wrong timeOffset.");
    };

    let unit_numbers: Vec<String> = query
        .unit_numbers
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::to_string)
        .collect();

    let aggregate_query = AggregateQuery {
        device_id: device_id.to_string(),
        unit_numbers: unit_numbers.clone(),
        data_type,
        start,
        end,
        interval,
        time_offset_hours,
    };

    let raw = match state.telemetry.aggregate(service_id, &aggregate_query).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!("telemetry aggregation failed: {e:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Internal Server Error",
            );
        }
    };

    let filled = fill(&raw, start, end, &interval, UnitsValue::null_for(&unit_numbers));

    (StatusCode::OK, Json(filled)).into_response()
}
