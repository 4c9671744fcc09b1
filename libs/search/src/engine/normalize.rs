//! Value normalization per datatype, including closure expansion.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::catalog::{table_for_foreign_key, DataType, SearchOption};
use crate::config::ConfigKey;
use crate::criteria::SearchKind;
use crate::hierarchy::{expand_over, expand_under};
use crate::resolver::ResolvedValue;
use crate::Result;

use super::SearchEngine;

impl SearchEngine {
    /// Parse raw criterion values into typed resolved values.
    ///
    /// Values that do not parse for the datatype are skipped; integer
    /// columns keep the raw text as a fallback so itemtype overrides can
    /// claim symbolic values the default generation cannot.
    pub(super) async fn normalize_values(
        &self,
        option: &SearchOption,
        kind: SearchKind,
        raw_values: &[String],
    ) -> Result<Vec<ResolvedValue>> {
        if kind == SearchKind::Empty {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for raw in raw_values {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match &option.datatype {
                DataType::String | DataType::ItemLink => {
                    out.push(ResolvedValue::Text(raw.to_string()));
                }
                DataType::Integer => match raw.parse::<i64>() {
                    Ok(n) => out.push(ResolvedValue::Int(n)),
                    Err(_) => out.push(ResolvedValue::Text(raw.to_string())),
                },
                DataType::Decimal => {
                    if raw.parse::<f64>().is_ok() {
                        out.push(ResolvedValue::Decimal(raw.to_string()));
                    } else {
                        tracing::warn!(option = option.id, value = raw, "not a number, skipping value");
                    }
                }
                DataType::Bool => match parse_bool(raw) {
                    Some(b) => out.push(ResolvedValue::Bool(b)),
                    None => {
                        tracing::warn!(option = option.id, value = raw, "not a boolean, skipping value");
                    }
                },
                DataType::Date | DataType::DateTime => match parse_date_window(raw) {
                    Some((lower, upper)) => out.push(ResolvedValue::Range { lower, upper }),
                    None => {
                        tracing::warn!(option = option.id, value = raw, "unparseable date, skipping value");
                    }
                },
                DataType::Dropdown => match kind {
                    SearchKind::Under | SearchKind::Over => {
                        let Ok(root) = raw.parse::<i64>() else {
                            tracing::warn!(option = option.id, value = raw, "not an id, skipping value");
                            continue;
                        };
                        match self.closure_for_option(option, kind, root).await? {
                            Some(ids) => out.push(ResolvedValue::IdSet(ids.as_ref().clone())),
                            None => continue,
                        }
                    }
                    _ => match raw.parse::<i64>() {
                        Ok(n) => out.push(ResolvedValue::Int(n)),
                        Err(_) => {
                            tracing::warn!(option = option.id, value = raw, "not an id, skipping value");
                        }
                    },
                },
            }
        }
        Ok(out)
    }

    /// Expanded closure for an under/over criterion, or None when the
    /// option's target table is not hierarchical.
    async fn closure_for_option(
        &self,
        option: &SearchOption,
        kind: SearchKind,
        root: i64,
    ) -> Result<Option<Arc<Vec<i64>>>> {
        let Some(target_table) = table_for_foreign_key(&option.field) else {
            tracing::warn!(
                option = option.id,
                field = %option.field,
                "under/over on a non-reference column, dropping criterion"
            );
            return Ok(None);
        };
        let Some(parent_field) = self.registry.parent_field_of_table(target_table) else {
            tracing::warn!(
                option = option.id,
                table = target_table,
                "under/over on a non-hierarchical table, dropping criterion"
            );
            return Ok(None);
        };

        let under = kind == SearchKind::Under;
        let key = (target_table.to_string(), parent_field.clone(), under, root);
        if let Some(cached) = self.closure_cache.lock().unwrap().get(&key) {
            return Ok(Some(cached.clone()));
        }

        let max_depth: usize = self.config.get(ConfigKey::HierarchyMaxDepth);
        let ids = if under {
            expand_under(
                self.hierarchy.as_ref(),
                target_table,
                &parent_field,
                root,
                max_depth,
            )
            .await?
        } else {
            expand_over(
                self.hierarchy.as_ref(),
                target_table,
                &parent_field,
                root,
                max_depth,
            )
            .await?
        };

        let ids = Arc::new(ids);
        self.closure_cache.lock().unwrap().put(key, ids.clone());
        Ok(Some(ids))
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Half-open instant window for a date value, sized by its precision:
/// `2025` covers the year, `2025-03` the month, `2025-03-04` the day, a
/// full timestamp one second.
fn parse_date_window(raw: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            let lower = Utc.from_utc_datetime(&dt);
            return Some((lower, lower + chrono::Duration::seconds(1)));
        }
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            let lower = Utc.from_utc_datetime(&dt);
            return Some((lower, lower + chrono::Duration::minutes(1)));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let lower = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
        return Some((lower, lower + chrono::Duration::days(1)));
    }
    if let Some((year, month)) = parse_year_month(raw) {
        let lower = NaiveDate::from_ymd_opt(year, month, 1)?;
        let upper = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        return Some((
            Utc.from_utc_datetime(&lower.and_hms_opt(0, 0, 0)?),
            Utc.from_utc_datetime(&upper.and_hms_opt(0, 0, 0)?),
        ));
    }
    if raw.len() == 4 {
        if let Ok(year) = raw.parse::<i32>() {
            let lower = NaiveDate::from_ymd_opt(year, 1, 1)?;
            let upper = NaiveDate::from_ymd_opt(year + 1, 1, 1)?;
            return Some((
                Utc.from_utc_datetime(&lower.and_hms_opt(0, 0, 0)?),
                Utc.from_utc_datetime(&upper.and_hms_opt(0, 0, 0)?),
            ));
        }
    }
    None
}

fn parse_year_month(raw: &str) -> Option<(i32, u32)> {
    let (year, month) = raw.split_once('-')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }
    let month_num: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month_num) {
        return None;
    }
    Some((year.parse().ok()?, month_num))
}
