use crate::catalog::model::{CollectionType, ConfigError, FieldAttrs, ValueType};
use crate::storage::entity::{field, spike_schedule_field};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ScheduleError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("end_datetime must be after start_datetime")]
    WindowOrder,
    #[error("duplicate override for field {0}")]
    DuplicateOverride(i32),
    #[error("field {0} does not belong to the collection")]
    UnknownField(i32),
    #[error("field {0} is not an editable performance field")]
    NotEditable(i32),
    #[error("attribute {attribute} does not apply to field {field_id} ({value_type})")]
    OutOfDomainAttribute {
        field_id: i32,
        value_type: ValueType,
        attribute: &'static str,
    },
    #[error("override for field {field_id} is invalid: {source}")]
    InvalidOverride {
        field_id: i32,
        source: ConfigError,
    },
}

/// 时间窗推导出的只读状态，永不落库
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Scheduled,
    Active,
    Expired,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Scheduled => "scheduled",
            ScheduleStatus::Active => "active",
            ScheduleStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// scheduled -> active -> expired，单调随时钟推进
pub fn compute_status(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ScheduleStatus {
    if now < start {
        ScheduleStatus::Scheduled
    } else if now > end {
        ScheduleStatus::Expired
    } else {
        ScheduleStatus::Active
    }
}

/// 可被 spike 覆盖的前提：Performance 分区且数值类型
pub fn is_editable(collection_type: CollectionType, value_type: ValueType) -> bool {
    collection_type == CollectionType::Performance && value_type.is_numeric()
}

/// 覆盖记录携带的属性集：数值/区间/计数器属性，
/// 不含 fixed_value_text 与 current_number。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpikeOverrideAttrs {
    pub fixed_value_number: Option<i64>,
    pub fixed_value_float: Option<f64>,
    pub range_start_number: Option<i64>,
    pub range_end_number: Option<i64>,
    pub range_start_float: Option<f64>,
    pub range_end_float: Option<f64>,
    pub float_precision: Option<i32>,
    pub start_number: Option<f64>,
    pub step_number: Option<f64>,
    pub reset_number: Option<f64>,
    pub randomization_percentage: Option<f64>,
}

impl SpikeOverrideAttrs {
    /// 目标类型允许覆盖的属性名
    pub fn allowed_attributes(value_type: ValueType) -> &'static [&'static str] {
        match value_type {
            ValueType::NumberFixed => &["fixed_value_number"],
            ValueType::FloatFixed => &["fixed_value_float"],
            ValueType::NumberRange => &["range_start_number", "range_end_number"],
            ValueType::FloatRange => &["range_start_float", "range_end_float", "float_precision"],
            ValueType::Increment | ValueType::Decrement => &[
                "start_number",
                "step_number",
                "reset_number",
                "randomization_percentage",
            ],
            ValueType::TextFixed | ValueType::EpochNow => &[],
        }
    }

    /// 已填属性名列表
    pub fn populated(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.fixed_value_number.is_some() {
            out.push("fixed_value_number");
        }
        if self.fixed_value_float.is_some() {
            out.push("fixed_value_float");
        }
        if self.range_start_number.is_some() {
            out.push("range_start_number");
        }
        if self.range_end_number.is_some() {
            out.push("range_end_number");
        }
        if self.range_start_float.is_some() {
            out.push("range_start_float");
        }
        if self.range_end_float.is_some() {
            out.push("range_end_float");
        }
        if self.float_precision.is_some() {
            out.push("float_precision");
        }
        if self.start_number.is_some() {
            out.push("start_number");
        }
        if self.step_number.is_some() {
            out.push("step_number");
        }
        if self.reset_number.is_some() {
            out.push("reset_number");
        }
        if self.randomization_percentage.is_some() {
            out.push("randomization_percentage");
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.populated().is_empty()
    }

    /// 已填属性是否全部落在目标类型的允许子集内
    pub fn matches(&self, value_type: ValueType) -> bool {
        let allowed = Self::allowed_attributes(value_type);
        self.populated().iter().all(|a| allowed.contains(a))
    }

    /// 非空属性覆盖到字段属性之上；空属性回落到字段现值。
    /// 只替换生成参数，current_number 保持字段自身的活动计数器。
    pub fn apply_to(&self, base: &FieldAttrs) -> FieldAttrs {
        let mut out = base.clone();
        if let Some(v) = self.fixed_value_number {
            out.fixed_value_number = Some(v);
        }
        if let Some(v) = self.fixed_value_float {
            out.fixed_value_float = Some(v);
        }
        if let Some(v) = self.range_start_number {
            out.range_start_number = Some(v);
        }
        if let Some(v) = self.range_end_number {
            out.range_end_number = Some(v);
        }
        if let Some(v) = self.range_start_float {
            out.range_start_float = Some(v);
        }
        if let Some(v) = self.range_end_float {
            out.range_end_float = Some(v);
        }
        if let Some(v) = self.float_precision {
            out.float_precision = Some(v);
        }
        if let Some(v) = self.start_number {
            out.start_number = Some(v);
        }
        if let Some(v) = self.step_number {
            out.step_number = Some(v);
        }
        if let Some(v) = self.reset_number {
            out.reset_number = Some(v);
        }
        if let Some(v) = self.randomization_percentage {
            out.randomization_percentage = Some(v);
        }
        out
    }

    /// 在既有覆盖之上叠加补丁（非空项生效）
    pub fn overlay(&self, patch: &SpikeOverrideAttrs) -> SpikeOverrideAttrs {
        let mut out = self.clone();
        if let Some(v) = patch.fixed_value_number {
            out.fixed_value_number = Some(v);
        }
        if let Some(v) = patch.fixed_value_float {
            out.fixed_value_float = Some(v);
        }
        if let Some(v) = patch.range_start_number {
            out.range_start_number = Some(v);
        }
        if let Some(v) = patch.range_end_number {
            out.range_end_number = Some(v);
        }
        if let Some(v) = patch.range_start_float {
            out.range_start_float = Some(v);
        }
        if let Some(v) = patch.range_end_float {
            out.range_end_float = Some(v);
        }
        if let Some(v) = patch.float_precision {
            out.float_precision = Some(v);
        }
        if let Some(v) = patch.start_number {
            out.start_number = Some(v);
        }
        if let Some(v) = patch.step_number {
            out.step_number = Some(v);
        }
        if let Some(v) = patch.reset_number {
            out.reset_number = Some(v);
        }
        if let Some(v) = patch.randomization_percentage {
            out.randomization_percentage = Some(v);
        }
        out
    }

    /// 从字段现值播种允许子集，作为操作者编辑的基线
    pub fn seeded_from(value_type: ValueType, attrs: &FieldAttrs) -> Self {
        let mut out = Self::default();
        for name in Self::allowed_attributes(value_type) {
            match *name {
                "fixed_value_number" => out.fixed_value_number = attrs.fixed_value_number,
                "fixed_value_float" => out.fixed_value_float = attrs.fixed_value_float,
                "range_start_number" => out.range_start_number = attrs.range_start_number,
                "range_end_number" => out.range_end_number = attrs.range_end_number,
                "range_start_float" => out.range_start_float = attrs.range_start_float,
                "range_end_float" => out.range_end_float = attrs.range_end_float,
                "float_precision" => out.float_precision = attrs.float_precision,
                "start_number" => out.start_number = attrs.start_number,
                "step_number" => out.step_number = attrs.step_number,
                "reset_number" => out.reset_number = attrs.reset_number,
                "randomization_percentage" => {
                    out.randomization_percentage = attrs.randomization_percentage
                }
                _ => {}
            }
        }
        out
    }
}

impl From<&spike_schedule_field::Model> for SpikeOverrideAttrs {
    fn from(m: &spike_schedule_field::Model) -> Self {
        Self {
            fixed_value_number: m.fixed_value_number,
            fixed_value_float: m.fixed_value_float,
            range_start_number: m.range_start_number,
            range_end_number: m.range_end_number,
            range_start_float: m.range_start_float,
            range_end_float: m.range_end_float,
            float_precision: m.float_precision,
            start_number: m.start_number,
            step_number: m.step_number,
            reset_number: m.reset_number,
            randomization_percentage: m.randomization_percentage,
        }
    }
}

/// 可编辑字段的覆盖草稿（派生自集合字段，供操作者编辑）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EditableFieldSeed {
    pub original_field_id: i32,
    pub field_name: String,
    pub value_type: ValueType,
    pub attrs: SpikeOverrideAttrs,
}

/// 过滤出可编辑字段并以现值播种。
/// 未通过过滤的字段不会出现在结果中。
pub fn derive_editable_fields(fields: &[field::Model]) -> Vec<EditableFieldSeed> {
    let mut out = Vec::new();
    for f in fields {
        let Some((ct, vt)) = parse_field_types(f) else {
            continue;
        };
        if !is_editable(ct, vt) {
            continue;
        }
        let attrs = FieldAttrs::from(f);
        out.push(EditableFieldSeed {
            original_field_id: f.id,
            field_name: f.field_name.clone(),
            value_type: vt,
            attrs: SpikeOverrideAttrs::seeded_from(vt, &attrs),
        });
    }
    out
}

/// 实体里的字符串列解析为类型标签；解析失败视为不可编辑
pub fn parse_field_types(f: &field::Model) -> Option<(CollectionType, ValueType)> {
    let ct = f.collection_type.parse::<CollectionType>().ok()?;
    let vt = f.value_type.parse::<ValueType>().ok()?;
    Some((ct, vt))
}

/// 提交的覆盖条目：目标字段 + 覆盖属性
#[derive(Clone, Debug, PartialEq)]
pub struct OverrideSpec {
    pub original_field_id: i32,
    pub attrs: SpikeOverrideAttrs,
}

/// 校验整个调度提交。
///
/// - name 非空、start < end（相等也拒绝）
/// - 覆盖目标在集合内、可编辑、每个字段至多一条
/// - 已填属性落在目标类型允许子集内，且合并后的有效配置本身合法
pub fn validate_schedule(
    name: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    overrides: &[OverrideSpec],
    collection_fields: &[field::Model],
) -> Result<(), ScheduleError> {
    if name.trim().is_empty() {
        return Err(ScheduleError::EmptyName);
    }
    if start >= end {
        return Err(ScheduleError::WindowOrder);
    }

    let by_id: HashMap<i32, &field::Model> =
        collection_fields.iter().map(|f| (f.id, f)).collect();

    let mut seen = HashSet::new();
    for spec in overrides {
        if !seen.insert(spec.original_field_id) {
            return Err(ScheduleError::DuplicateOverride(spec.original_field_id));
        }
        let field = by_id
            .get(&spec.original_field_id)
            .ok_or(ScheduleError::UnknownField(spec.original_field_id))?;
        let (ct, vt) = parse_field_types(field)
            .ok_or(ScheduleError::UnknownField(spec.original_field_id))?;
        if !is_editable(ct, vt) {
            return Err(ScheduleError::NotEditable(spec.original_field_id));
        }
        let allowed = SpikeOverrideAttrs::allowed_attributes(vt);
        for attr in spec.attrs.populated() {
            if !allowed.contains(&attr) {
                return Err(ScheduleError::OutOfDomainAttribute {
                    field_id: spec.original_field_id,
                    value_type: vt,
                    attribute: attr,
                });
            }
        }
        // 合并后的有效配置也要能收敛（例如覆盖后的区间端点次序）
        let merged = spec.attrs.apply_to(&FieldAttrs::from(*field));
        crate::catalog::model::validate_attrs(vt, &merged).map_err(|source| {
            ScheduleError::InvalidOverride {
                field_id: spec.original_field_id,
                source,
            }
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn field_model(
        id: i32,
        collection_type: &str,
        value_type: &str,
        attrs: FieldAttrs,
    ) -> field::Model {
        field::Model {
            id,
            collection_id: 1,
            collection_type: collection_type.to_string(),
            field_name: format!("field_{id}"),
            value_type: value_type.to_string(),
            fixed_value_text: attrs.fixed_value_text,
            fixed_value_number: attrs.fixed_value_number,
            fixed_value_float: attrs.fixed_value_float,
            range_start_number: attrs.range_start_number,
            range_end_number: attrs.range_end_number,
            range_start_float: attrs.range_start_float,
            range_end_float: attrs.range_end_float,
            float_precision: attrs.float_precision,
            start_number: attrs.start_number,
            step_number: attrs.step_number,
            reset_number: attrs.reset_number,
            randomization_percentage: attrs.randomization_percentage,
            current_number: attrs.current_number,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn status_is_exhaustive_over_now() {
        let start = ts(100);
        let end = ts(200);
        assert_eq!(compute_status(start, end, ts(99)), ScheduleStatus::Scheduled);
        assert_eq!(compute_status(start, end, ts(100)), ScheduleStatus::Active);
        assert_eq!(compute_status(start, end, ts(150)), ScheduleStatus::Active);
        assert_eq!(compute_status(start, end, ts(200)), ScheduleStatus::Active);
        assert_eq!(compute_status(start, end, ts(201)), ScheduleStatus::Expired);
    }

    #[test]
    fn editable_requires_performance_and_numeric() {
        assert!(is_editable(CollectionType::Performance, ValueType::NumberRange));
        assert!(is_editable(CollectionType::Performance, ValueType::Increment));
        assert!(!is_editable(CollectionType::Performance, ValueType::TextFixed));
        assert!(!is_editable(CollectionType::Performance, ValueType::EpochNow));
        assert!(!is_editable(CollectionType::Configuration, ValueType::NumberFixed));
    }

    #[test]
    fn derive_editable_filters_and_seeds() {
        let fields = vec![
            field_model(
                1,
                "Configuration",
                "NUMBER_FIXED",
                FieldAttrs {
                    fixed_value_number: Some(7),
                    ..Default::default()
                },
            ),
            field_model(
                2,
                "Performance",
                "TEXT_FIXED",
                FieldAttrs {
                    fixed_value_text: Some("x".to_string()),
                    ..Default::default()
                },
            ),
            field_model(
                3,
                "Performance",
                "NUMBER_RANGE",
                FieldAttrs {
                    range_start_number: Some(10),
                    range_end_number: Some(20),
                    ..Default::default()
                },
            ),
        ];

        let editable = derive_editable_fields(&fields);
        assert_eq!(editable.len(), 1);
        assert_eq!(editable[0].original_field_id, 3);
        assert_eq!(editable[0].value_type, ValueType::NumberRange);
        assert_eq!(editable[0].attrs.range_start_number, Some(10));
        assert_eq!(editable[0].attrs.range_end_number, Some(20));
        // 播种只带允许子集
        assert_eq!(editable[0].attrs.fixed_value_number, None);
    }

    #[test]
    fn validate_rejects_bad_windows() {
        let fields = Vec::new();
        assert_eq!(
            validate_schedule("spike", ts(100), ts(100), &[], &fields),
            Err(ScheduleError::WindowOrder)
        );
        assert_eq!(
            validate_schedule("spike", ts(200), ts(100), &[], &fields),
            Err(ScheduleError::WindowOrder)
        );
        assert_eq!(
            validate_schedule("  ", ts(100), ts(200), &[], &fields),
            Err(ScheduleError::EmptyName)
        );
        assert!(validate_schedule("spike", ts(100), ts(200), &[], &fields).is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_targets() {
        let fields = vec![field_model(
            5,
            "Performance",
            "NUMBER_FIXED",
            FieldAttrs {
                fixed_value_number: Some(1),
                ..Default::default()
            },
        )];
        let ov = OverrideSpec {
            original_field_id: 5,
            attrs: SpikeOverrideAttrs {
                fixed_value_number: Some(99),
                ..Default::default()
            },
        };
        assert_eq!(
            validate_schedule("spike", ts(1), ts(2), &[ov.clone(), ov], &fields),
            Err(ScheduleError::DuplicateOverride(5))
        );
    }

    #[test]
    fn validate_rejects_out_of_domain_attribute() {
        let fields = vec![field_model(
            8,
            "Performance",
            "NUMBER_RANGE",
            FieldAttrs {
                range_start_number: Some(0),
                range_end_number: Some(10),
                ..Default::default()
            },
        )];
        // NUMBER_RANGE 目标只接受区间端点，固定值属性越界
        let ov = OverrideSpec {
            original_field_id: 8,
            attrs: SpikeOverrideAttrs {
                fixed_value_number: Some(5),
                ..Default::default()
            },
        };
        assert_eq!(
            validate_schedule("spike", ts(1), ts(2), &[ov], &fields),
            Err(ScheduleError::OutOfDomainAttribute {
                field_id: 8,
                value_type: ValueType::NumberRange,
                attribute: "fixed_value_number",
            })
        );
    }

    #[test]
    fn validate_rejects_non_editable_and_unknown_targets() {
        let fields = vec![field_model(
            2,
            "Performance",
            "TEXT_FIXED",
            FieldAttrs::default(),
        )];
        let ov = OverrideSpec {
            original_field_id: 2,
            attrs: SpikeOverrideAttrs::default(),
        };
        assert_eq!(
            validate_schedule("spike", ts(1), ts(2), &[ov], &fields),
            Err(ScheduleError::NotEditable(2))
        );
        let ov = OverrideSpec {
            original_field_id: 99,
            attrs: SpikeOverrideAttrs::default(),
        };
        assert_eq!(
            validate_schedule("spike", ts(1), ts(2), &[ov], &fields),
            Err(ScheduleError::UnknownField(99))
        );
    }

    #[test]
    fn validate_checks_merged_effective_config() {
        let fields = vec![field_model(
            3,
            "Performance",
            "NUMBER_RANGE",
            FieldAttrs {
                range_start_number: Some(0),
                range_end_number: Some(10),
                ..Default::default()
            },
        )];
        // 覆盖后的起点越过现有终点
        let ov = OverrideSpec {
            original_field_id: 3,
            attrs: SpikeOverrideAttrs {
                range_start_number: Some(50),
                ..Default::default()
            },
        };
        assert_eq!(
            validate_schedule("spike", ts(1), ts(2), &[ov], &fields),
            Err(ScheduleError::InvalidOverride {
                field_id: 3,
                source: ConfigError::NumberRangeOrder,
            })
        );
    }

    #[test]
    fn apply_substitutes_only_populated_attributes() {
        let base = FieldAttrs {
            range_start_number: Some(0),
            range_end_number: Some(10),
            current_number: Some(4.0),
            ..Default::default()
        };
        let ov = SpikeOverrideAttrs {
            range_end_number: Some(500),
            ..Default::default()
        };
        let merged = ov.apply_to(&base);
        assert_eq!(merged.range_start_number, Some(0)); // 回落到字段现值
        assert_eq!(merged.range_end_number, Some(500));
        assert_eq!(merged.current_number, Some(4.0)); // 活动计数器不受覆盖影响
    }
}
