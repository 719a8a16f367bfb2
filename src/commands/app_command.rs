use crate::catalog::model::{CollectionType, FieldAttrs, ValueType};
use crate::spike::model::SpikeOverrideAttrs;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub enum AppCommand {
    CollectionsList,
    CollectionAdd {
        name: String,
    },
    CollectionShow {
        id: i32,
    },
    CollectionRename {
        id: i32,
        name: String,
    },
    CollectionRemove {
        id: i32,
    },
    FieldsList {
        collection_id: i32,
        collection_type: Option<CollectionType>,
    },
    FieldAdd {
        collection_id: i32,
        collection_type: CollectionType,
        field_name: String,
        value_type: ValueType,
        attrs: FieldAttrs,
    },
    FieldEdit {
        field_id: i32,
        field_name: Option<String>,
        value_type: Option<ValueType>,
        attrs: FieldAttrs,
    },
    FieldRemove {
        field_id: i32,
    },
    SchedulesList {
        collection_id: Option<i32>,
    },
    ScheduleAdd {
        collection_id: i32,
        name: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    ScheduleShow {
        id: i32,
    },
    ScheduleEdit {
        id: i32,
        name: Option<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    ScheduleFields {
        collection_id: i32,
    },
    ScheduleSet {
        schedule_id: i32,
        field_id: i32,
        attrs: SpikeOverrideAttrs,
    },
    ScheduleUnset {
        schedule_id: i32,
        field_id: i32,
    },
    ScheduleRemove {
        id: i32,
    },
    Generate {
        collection: String,
        collection_type: CollectionType,
    },
    Help,
    Quit,
    Unknown(String),
}

const USAGE_COLLECTION: &str =
    "用法: collection add <name> | collection show <id> | collection rename <id> <name> | collection rm <id>";
const USAGE_FIELD: &str = "用法: field add <collection_id> <Performance|Configuration> <name> <VALUE_TYPE> [属性=值 ...] | field edit <field_id> [name=..] [type=..] [属性=值 ...] | field rm <field_id>";
const USAGE_SCHEDULE: &str = "用法: schedule add <collection_id> <name> <start> <end> | schedule show <id> | schedule edit <id> [name=..] [start=..] [end=..] | schedule fields <collection_id> | schedule set <schedule_id> <field_id> 属性=值 ... | schedule unset <schedule_id> <field_id> | schedule rm <id>";
const USAGE_GENERATE: &str = "用法: generate <collection> <Performance|Configuration>";

impl FromStr for AppCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(AppCommand::Unknown("".to_string()));
        }

        match parts[0] {
            "collections" => Ok(AppCommand::CollectionsList),
            "collection" => parse_collection(&parts),
            "fields" => {
                let Some(id) = parts.get(1).and_then(|s| s.parse::<i32>().ok()) else {
                    return Ok(AppCommand::Unknown(
                        "用法: fields <collection_id> [Performance|Configuration]".to_string(),
                    ));
                };
                let collection_type = match parts.get(2) {
                    Some(t) => match t.parse::<CollectionType>() {
                        Ok(ct) => Some(ct),
                        Err(e) => return Ok(AppCommand::Unknown(e.to_string())),
                    },
                    None => None,
                };
                Ok(AppCommand::FieldsList {
                    collection_id: id,
                    collection_type,
                })
            }
            "field" => parse_field(&parts),
            "schedules" => {
                let collection_id = parts.get(1).and_then(|s| s.parse::<i32>().ok());
                Ok(AppCommand::SchedulesList { collection_id })
            }
            "schedule" => parse_schedule(&parts),
            "generate" => {
                let (Some(collection), Some(ct)) = (parts.get(1), parts.get(2)) else {
                    return Ok(AppCommand::Unknown(USAGE_GENERATE.to_string()));
                };
                match ct.parse::<CollectionType>() {
                    Ok(collection_type) => Ok(AppCommand::Generate {
                        collection: collection.to_string(),
                        collection_type,
                    }),
                    Err(e) => Ok(AppCommand::Unknown(e.to_string())),
                }
            }
            "help" | "h" => Ok(AppCommand::Help),
            "quit" | "q" | "exit" => Ok(AppCommand::Quit),
            _ => Ok(AppCommand::Unknown(format!("未知命令: {}", parts[0]))),
        }
    }
}

fn parse_collection(parts: &[&str]) -> Result<AppCommand, ()> {
    match parts.get(1).copied() {
        Some("add") => {
            let name = parts[2..].join(" ");
            if name.is_empty() {
                Ok(AppCommand::Unknown(USAGE_COLLECTION.to_string()))
            } else {
                Ok(AppCommand::CollectionAdd { name })
            }
        }
        Some("show") => match parts.get(2).and_then(|s| s.parse().ok()) {
            Some(id) => Ok(AppCommand::CollectionShow { id }),
            None => Ok(AppCommand::Unknown(USAGE_COLLECTION.to_string())),
        },
        Some("rename") => {
            let id = parts.get(2).and_then(|s| s.parse().ok());
            let name = parts[3.min(parts.len())..].join(" ");
            match id {
                Some(id) if !name.is_empty() => Ok(AppCommand::CollectionRename { id, name }),
                _ => Ok(AppCommand::Unknown(USAGE_COLLECTION.to_string())),
            }
        }
        Some("rm") => match parts.get(2).and_then(|s| s.parse().ok()) {
            Some(id) => Ok(AppCommand::CollectionRemove { id }),
            None => Ok(AppCommand::Unknown(USAGE_COLLECTION.to_string())),
        },
        _ => Ok(AppCommand::Unknown(USAGE_COLLECTION.to_string())),
    }
}

fn parse_field(parts: &[&str]) -> Result<AppCommand, ()> {
    match parts.get(1).copied() {
        Some("add") => {
            let (Some(cid), Some(ct), Some(name), Some(vt)) =
                (parts.get(2), parts.get(3), parts.get(4), parts.get(5))
            else {
                return Ok(AppCommand::Unknown(USAGE_FIELD.to_string()));
            };
            let Ok(collection_id) = cid.parse::<i32>() else {
                return Ok(AppCommand::Unknown(USAGE_FIELD.to_string()));
            };
            let collection_type = match ct.parse::<CollectionType>() {
                Ok(ct) => ct,
                Err(e) => return Ok(AppCommand::Unknown(e.to_string())),
            };
            let value_type = match vt.parse::<ValueType>() {
                Ok(vt) => vt,
                Err(e) => return Ok(AppCommand::Unknown(e.to_string())),
            };
            let mut attrs = FieldAttrs::default();
            for token in &parts[6..] {
                if let Err(msg) = apply_field_token(&mut attrs, token) {
                    return Ok(AppCommand::Unknown(msg));
                }
            }
            Ok(AppCommand::FieldAdd {
                collection_id,
                collection_type,
                field_name: name.to_string(),
                value_type,
                attrs,
            })
        }
        Some("edit") => {
            let Some(field_id) = parts.get(2).and_then(|s| s.parse::<i32>().ok()) else {
                return Ok(AppCommand::Unknown(USAGE_FIELD.to_string()));
            };
            let mut field_name = None;
            let mut value_type = None;
            let mut attrs = FieldAttrs::default();
            for token in &parts[3..] {
                let Some((key, value)) = split_kv(token) else {
                    return Ok(AppCommand::Unknown(format!("非法参数: {}", token)));
                };
                match key.as_str() {
                    "name" => field_name = Some(value),
                    "type" => match value.parse::<ValueType>() {
                        Ok(vt) => value_type = Some(vt),
                        Err(e) => return Ok(AppCommand::Unknown(e.to_string())),
                    },
                    _ => {
                        if let Err(msg) = apply_field_attr(&mut attrs, &key, &value) {
                            return Ok(AppCommand::Unknown(msg));
                        }
                    }
                }
            }
            Ok(AppCommand::FieldEdit {
                field_id,
                field_name,
                value_type,
                attrs,
            })
        }
        Some("rm") => match parts.get(2).and_then(|s| s.parse().ok()) {
            Some(field_id) => Ok(AppCommand::FieldRemove { field_id }),
            None => Ok(AppCommand::Unknown(USAGE_FIELD.to_string())),
        },
        _ => Ok(AppCommand::Unknown(USAGE_FIELD.to_string())),
    }
}

fn parse_schedule(parts: &[&str]) -> Result<AppCommand, ()> {
    match parts.get(1).copied() {
        Some("add") => {
            let (Some(cid), Some(name), Some(start), Some(end)) =
                (parts.get(2), parts.get(3), parts.get(4), parts.get(5))
            else {
                return Ok(AppCommand::Unknown(USAGE_SCHEDULE.to_string()));
            };
            let Ok(collection_id) = cid.parse::<i32>() else {
                return Ok(AppCommand::Unknown(USAGE_SCHEDULE.to_string()));
            };
            let start = match parse_datetime(start) {
                Ok(dt) => dt,
                Err(msg) => return Ok(AppCommand::Unknown(msg)),
            };
            let end = match parse_datetime(end) {
                Ok(dt) => dt,
                Err(msg) => return Ok(AppCommand::Unknown(msg)),
            };
            Ok(AppCommand::ScheduleAdd {
                collection_id,
                name: name.to_string(),
                start,
                end,
            })
        }
        Some("show") => match parts.get(2).and_then(|s| s.parse().ok()) {
            Some(id) => Ok(AppCommand::ScheduleShow { id }),
            None => Ok(AppCommand::Unknown(USAGE_SCHEDULE.to_string())),
        },
        Some("edit") => {
            let Some(id) = parts.get(2).and_then(|s| s.parse::<i32>().ok()) else {
                return Ok(AppCommand::Unknown(USAGE_SCHEDULE.to_string()));
            };
            let mut name = None;
            let mut start = None;
            let mut end = None;
            for token in &parts[3..] {
                let Some((key, value)) = split_kv(token) else {
                    return Ok(AppCommand::Unknown(format!("非法参数: {}", token)));
                };
                match key.as_str() {
                    "name" => name = Some(value),
                    "start" => match parse_datetime(&value) {
                        Ok(dt) => start = Some(dt),
                        Err(msg) => return Ok(AppCommand::Unknown(msg)),
                    },
                    "end" => match parse_datetime(&value) {
                        Ok(dt) => end = Some(dt),
                        Err(msg) => return Ok(AppCommand::Unknown(msg)),
                    },
                    _ => return Ok(AppCommand::Unknown(format!("未知参数: {}", key))),
                }
            }
            Ok(AppCommand::ScheduleEdit {
                id,
                name,
                start,
                end,
            })
        }
        Some("fields") => match parts.get(2).and_then(|s| s.parse().ok()) {
            Some(collection_id) => Ok(AppCommand::ScheduleFields { collection_id }),
            None => Ok(AppCommand::Unknown(USAGE_SCHEDULE.to_string())),
        },
        Some("set") => {
            let (Some(sid), Some(fid)) = (
                parts.get(2).and_then(|s| s.parse::<i32>().ok()),
                parts.get(3).and_then(|s| s.parse::<i32>().ok()),
            ) else {
                return Ok(AppCommand::Unknown(USAGE_SCHEDULE.to_string()));
            };
            let mut attrs = SpikeOverrideAttrs::default();
            for token in &parts[4..] {
                if let Err(msg) = apply_override_token(&mut attrs, token) {
                    return Ok(AppCommand::Unknown(msg));
                }
            }
            if attrs.is_empty() {
                return Ok(AppCommand::Unknown(
                    "schedule set 至少需要一个 属性=值".to_string(),
                ));
            }
            Ok(AppCommand::ScheduleSet {
                schedule_id: sid,
                field_id: fid,
                attrs,
            })
        }
        Some("unset") => {
            let (Some(sid), Some(fid)) = (
                parts.get(2).and_then(|s| s.parse::<i32>().ok()),
                parts.get(3).and_then(|s| s.parse::<i32>().ok()),
            ) else {
                return Ok(AppCommand::Unknown(USAGE_SCHEDULE.to_string()));
            };
            Ok(AppCommand::ScheduleUnset {
                schedule_id: sid,
                field_id: fid,
            })
        }
        Some("rm") => match parts.get(2).and_then(|s| s.parse().ok()) {
            Some(id) => Ok(AppCommand::ScheduleRemove { id }),
            None => Ok(AppCommand::Unknown(USAGE_SCHEDULE.to_string())),
        },
        _ => Ok(AppCommand::Unknown(USAGE_SCHEDULE.to_string())),
    }
}

/// RFC 3339 / ISO-8601，带时区偏移的输入归一为 UTC
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("非法时间（期望 RFC 3339，如 2025-06-01T10:00:00Z）: {}", s))
}

fn split_kv(token: &str) -> Option<(String, String)> {
    let re = Regex::new(r"^([a-z_]+)=(.+)$").unwrap();
    let caps = re.captures(token)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

fn apply_field_token(attrs: &mut FieldAttrs, token: &str) -> Result<(), String> {
    let Some((key, value)) = split_kv(token) else {
        return Err(format!("非法参数: {}", token));
    };
    apply_field_attr(attrs, &key, &value)
}

fn apply_field_attr(attrs: &mut FieldAttrs, key: &str, value: &str) -> Result<(), String> {
    let bad = |k: &str, v: &str| format!("属性 {} 的取值非法: {}", k, v);
    match key {
        "fixed_value_text" => attrs.fixed_value_text = Some(value.to_string()),
        "fixed_value_number" => {
            attrs.fixed_value_number = Some(value.parse().map_err(|_| bad(key, value))?)
        }
        "fixed_value_float" => {
            attrs.fixed_value_float = Some(value.parse().map_err(|_| bad(key, value))?)
        }
        "range_start_number" => {
            attrs.range_start_number = Some(value.parse().map_err(|_| bad(key, value))?)
        }
        "range_end_number" => {
            attrs.range_end_number = Some(value.parse().map_err(|_| bad(key, value))?)
        }
        "range_start_float" => {
            attrs.range_start_float = Some(value.parse().map_err(|_| bad(key, value))?)
        }
        "range_end_float" => {
            attrs.range_end_float = Some(value.parse().map_err(|_| bad(key, value))?)
        }
        "float_precision" => {
            attrs.float_precision = Some(value.parse().map_err(|_| bad(key, value))?)
        }
        "start_number" => attrs.start_number = Some(value.parse().map_err(|_| bad(key, value))?),
        "step_number" => attrs.step_number = Some(value.parse().map_err(|_| bad(key, value))?),
        "reset_number" => attrs.reset_number = Some(value.parse().map_err(|_| bad(key, value))?),
        "randomization_percentage" => {
            attrs.randomization_percentage = Some(value.parse().map_err(|_| bad(key, value))?)
        }
        _ => return Err(format!("未知属性: {}", key)),
    }
    Ok(())
}

fn apply_override_token(attrs: &mut SpikeOverrideAttrs, token: &str) -> Result<(), String> {
    let Some((key, value)) = split_kv(token) else {
        return Err(format!("非法参数: {}", token));
    };
    let bad = |k: &str, v: &str| format!("属性 {} 的取值非法: {}", k, v);
    match key.as_str() {
        "fixed_value_number" => {
            attrs.fixed_value_number = Some(value.parse().map_err(|_| bad(&key, &value))?)
        }
        "fixed_value_float" => {
            attrs.fixed_value_float = Some(value.parse().map_err(|_| bad(&key, &value))?)
        }
        "range_start_number" => {
            attrs.range_start_number = Some(value.parse().map_err(|_| bad(&key, &value))?)
        }
        "range_end_number" => {
            attrs.range_end_number = Some(value.parse().map_err(|_| bad(&key, &value))?)
        }
        "range_start_float" => {
            attrs.range_start_float = Some(value.parse().map_err(|_| bad(&key, &value))?)
        }
        "range_end_float" => {
            attrs.range_end_float = Some(value.parse().map_err(|_| bad(&key, &value))?)
        }
        "float_precision" => {
            attrs.float_precision = Some(value.parse().map_err(|_| bad(&key, &value))?)
        }
        "start_number" => {
            attrs.start_number = Some(value.parse().map_err(|_| bad(&key, &value))?)
        }
        "step_number" => attrs.step_number = Some(value.parse().map_err(|_| bad(&key, &value))?),
        "reset_number" => {
            attrs.reset_number = Some(value.parse().map_err(|_| bad(&key, &value))?)
        }
        "randomization_percentage" => {
            attrs.randomization_percentage = Some(value.parse().map_err(|_| bad(&key, &value))?)
        }
        // fixed_value_text 等文本属性不属于覆盖集，直接拒绝
        _ => return Err(format!("该属性不可用于 spike 覆盖: {}", key)),
    }
    Ok(())
}
