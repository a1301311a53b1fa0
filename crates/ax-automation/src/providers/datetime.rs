//! Date and time providers

use async_trait::async_trait;
use ax_service_registry::ServiceLocator;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::context::ProviderContext;
use crate::data::{Data, DataType};
use crate::decoder::{BuilderRegistry, ConfigDecoder};
use crate::error::{DecodeError, DecodeResult, ProviderError};
use crate::outcome::FailureInfo;
use crate::provider::{
    build_optional, resolve_optional, resolve_required, ArcBuilder, ArcProvider, Builder,
    Provider, ProviderResult,
};
use crate::providers::unary::register_unary;

const DATE_AND_TIME_TO_DATE_TIME: &str = "dateAndTimeToDateTime";
const CURRENT_DATE_TIME: &str = "currentDateTime";

/// Parse a fixed offset such as `+10:00`, `-0530`, `Z` or `UTC`
pub fn parse_offset(text: &str) -> Option<FixedOffset> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, digits) = match trimmed.as_bytes().first()? {
        b'+' => (1, &trimmed[1..]),
        b'-' => (-1, &trimmed[1..]),
        _ => return None,
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// `{"dateAndTimeToDateTime": {"date": ..., "time": ..., "timeZone": "+10:00"}}`
///
/// Without `timeZone` the date and time are taken as UTC.
#[derive(Debug)]
pub struct DateAndTimeBuilder {
    date: ArcBuilder<NaiveDate>,
    time: ArcBuilder<NaiveTime>,
    time_zone: Option<ArcBuilder<String>>,
}

impl DateAndTimeBuilder {
    fn decode(
        body: &Value,
        decoder: &ConfigDecoder<'_>,
        pointer: &str,
    ) -> DecodeResult<ArcBuilder<DateTime<Utc>>> {
        let map = decoder.expect_object(body, pointer, &["date", "time", "timeZone"])?;
        Ok(Arc::new(Self {
            date: decoder.required(map, "date", pointer)?,
            time: decoder.required(map, "time", pointer)?,
            time_zone: decoder.optional(map, "timeZone", pointer)?,
        }))
    }
}

impl Builder<DateTime<Utc>> for DateAndTimeBuilder {
    fn build(&self, services: &ServiceLocator) -> ArcProvider<DateTime<Utc>> {
        Arc::new(DateAndTimeProvider {
            date: self.date.build(services),
            time: self.time.build(services),
            time_zone: build_optional(self.time_zone.as_ref(), services),
        })
    }
}

#[derive(Debug)]
pub struct DateAndTimeProvider {
    date: ArcProvider<NaiveDate>,
    time: ArcProvider<NaiveTime>,
    time_zone: Option<ArcProvider<String>>,
}

#[async_trait]
impl Provider<DateTime<Utc>> for DateAndTimeProvider {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<DateTime<Utc>> {
        let date = resolve_required(&self.date, ctx, DATE_AND_TIME_TO_DATE_TIME, "date").await?;
        let time = resolve_required(&self.time, ctx, DATE_AND_TIME_TO_DATE_TIME, "time").await?;
        let local = date.and_time(time);

        let Some(zone) = resolve_optional(self.time_zone.as_ref(), ctx).await? else {
            return Ok(Some(Data::new(local.and_utc())));
        };
        let offset = parse_offset(&zone).ok_or_else(|| ProviderError::TypeMismatch {
            schema_key: DATE_AND_TIME_TO_DATE_TIME,
            observed_type: "text".to_string(),
            target_type: "timeZone",
            debug: ctx
                .debug_context(DATE_AND_TIME_TO_DATE_TIME)
                .with("value", zone.as_str()),
        })?;
        match offset.from_local_datetime(&local).single() {
            Some(instant) => Ok(Some(Data::new(instant.with_timezone(&Utc)))),
            None => {
                let failure = FailureInfo::type_mismatch(
                    &Value::String(local.to_string()),
                    DateTime::<Utc>::KIND,
                    ctx.debug_context(DATE_AND_TIME_TO_DATE_TIME),
                );
                Err(ProviderError::from_failure(failure, DATE_AND_TIME_TO_DATE_TIME))
            }
        }
    }

    fn schema_reference_key(&self) -> &'static str {
        DATE_AND_TIME_TO_DATE_TIME
    }
}

/// `{"currentDateTime": {}}`
#[derive(Debug)]
pub struct CurrentDateTimeBuilder;

impl CurrentDateTimeBuilder {
    fn decode(
        body: &Value,
        _decoder: &ConfigDecoder<'_>,
        pointer: &str,
    ) -> DecodeResult<ArcBuilder<DateTime<Utc>>> {
        let accepted = match body {
            Value::Null | Value::Bool(true) => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if !accepted {
            return Err(DecodeError::InvalidShape {
                pointer: pointer.to_string(),
                expected: "an empty object".to_string(),
            });
        }
        Ok(Arc::new(CurrentDateTimeBuilder))
    }
}

impl Builder<DateTime<Utc>> for CurrentDateTimeBuilder {
    fn build(&self, _services: &ServiceLocator) -> ArcProvider<DateTime<Utc>> {
        Arc::new(CurrentDateTimeProvider)
    }
}

/// Reads the run's clock, so a pinned time or a fixed clock is honoured
#[derive(Debug)]
pub struct CurrentDateTimeProvider;

#[async_trait]
impl Provider<DateTime<Utc>> for CurrentDateTimeProvider {
    async fn resolve(&self, ctx: &ProviderContext) -> ProviderResult<DateTime<Utc>> {
        Ok(Some(Data::new(ctx.now())))
    }

    fn schema_reference_key(&self) -> &'static str {
        CURRENT_DATE_TIME
    }
}

fn date_time_to_text(instant: &DateTime<Utc>) -> Option<String> {
    instant.to_json().as_str().map(str::to_string)
}

fn date_time_to_integer(instant: &DateTime<Utc>) -> Option<i64> {
    Some(instant.timestamp_millis())
}

fn integer_to_date_time(millis: &i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(*millis)
}

pub(crate) fn register(registry: &mut BuilderRegistry) {
    registry.register_typed(DATE_AND_TIME_TO_DATE_TIME, DateAndTimeBuilder::decode);
    registry.register_typed(CURRENT_DATE_TIME, CurrentDateTimeBuilder::decode);
    register_unary::<DateTime<Utc>, String>(
        registry,
        "dateTimeToText",
        "dateTime",
        date_time_to_text,
    );
    register_unary::<DateTime<Utc>, i64>(
        registry,
        "dateTimeToInteger",
        "dateTime",
        date_time_to_integer,
    );
    register_unary::<i64, DateTime<Utc>>(
        registry,
        "integerToDateTime",
        "integer",
        integer_to_date_time,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ax_core::{AutomationData, DeploymentEnvironment};
    use serde_json::json;

    async fn resolve<T: DataType>(node: Value, ctx: &ProviderContext) -> ProviderResult<T> {
        let registry = BuilderRegistry::with_defaults();
        let decoder = ConfigDecoder::new(&registry);
        let provider = decoder.decode::<T>(&node, "").unwrap().build(&ServiceLocator::new());
        provider.resolve(ctx).await
    }

    fn ctx() -> ProviderContext {
        ProviderContext::new(AutomationData::new("t-1", DeploymentEnvironment::Development))
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("+10:00"), FixedOffset::east_opt(36000));
        assert_eq!(parse_offset("-0530"), FixedOffset::east_opt(-19800));
        assert_eq!(parse_offset("Z"), FixedOffset::east_opt(0));
        assert_eq!(parse_offset("Australia/Sydney"), None);
        assert_eq!(parse_offset("+10:75"), None);
    }

    #[tokio::test]
    async fn test_date_and_time_with_zone() {
        let value = resolve::<DateTime<Utc>>(
            json!({"dateAndTimeToDateTime": {
                "date": "2024-01-15",
                "time": "09:00",
                "timeZone": "+10:00"
            }}),
            &ctx(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(
            *value.value(),
            Utc.with_ymd_and_hms(2024, 1, 14, 23, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_invalid_zone_is_type_mismatch() {
        let err = resolve::<DateTime<Utc>>(
            json!({"dateAndTimeToDateTime": {"date": "2024-01-15", "time": "09:00", "timeZone": "AEST"}}),
            &ctx(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[tokio::test]
    async fn test_current_date_time_uses_pinned_time() {
        let pinned = Utc.with_ymd_and_hms(2030, 2, 3, 4, 5, 6).unwrap();
        let ctx = ctx().with_now(pinned);
        let value = resolve::<DateTime<Utc>>(json!({"currentDateTime": {}}), &ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*value.value(), pinned);
    }

    #[tokio::test]
    async fn test_integer_round_trip() {
        let millis = resolve::<i64>(
            json!({"dateTimeToInteger": "2024-03-01T09:30:00.250Z"}),
            &ctx(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(*millis.value(), 1_709_285_400_250);

        let text = resolve::<String>(
            json!({"dateTimeToText": {"integerToDateTime": *millis.value()}}),
            &ctx(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(text.value(), "2024-03-01T09:30:00.250Z");
    }
}
