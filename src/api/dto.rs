use crate::catalog::model::{summarize, CollectionType, FieldAttrs, ValueType};
use crate::spike::model::{OverrideSpec, ScheduleStatus, SpikeOverrideAttrs};
use crate::storage::entity::{collection, field, spike_schedule_field};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionResponse {
    pub id: i32,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<collection::Model> for CollectionResponse {
    fn from(m: collection::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCreate {
    pub collection_type: CollectionType,
    pub field_name: String,
    pub value_type: ValueType,
    #[serde(flatten)]
    pub attrs: FieldAttrs,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub field_name: Option<String>,
    pub value_type: Option<ValueType>,
    #[serde(flatten)]
    pub attrs: FieldAttrs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldResponse {
    pub id: i32,
    pub collection_id: i32,
    pub collection_type: String,
    pub field_name: String,
    pub value_type: String,
    #[serde(flatten)]
    pub attrs: FieldAttrs,
    /// 配置摘要，供列表展示
    pub summary: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&field::Model> for FieldResponse {
    fn from(m: &field::Model) -> Self {
        let attrs = FieldAttrs::from(m);
        let summary = match m.value_type.parse::<ValueType>() {
            Ok(vt) => summarize(vt, &attrs),
            Err(_) => "No configuration".to_string(),
        };
        Self {
            id: m.id,
            collection_id: m.collection_id,
            collection_type: m.collection_type.clone(),
            field_name: m.field_name.clone(),
            value_type: m.value_type.clone(),
            attrs,
            summary,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionWithFields {
    #[serde(flatten)]
    pub collection: CollectionResponse,
    pub fields: Vec<FieldResponse>,
}

/// 调度提交里的单条覆盖。
///
/// 只接受数值覆盖属性；未知键（例如 fixed_value_text）在边界上直接拒绝，
/// 避免静默失效的配置。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpikeFieldOverride {
    pub original_field_id: i32,
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

impl SpikeFieldOverride {
    pub fn attrs(&self) -> SpikeOverrideAttrs {
        SpikeOverrideAttrs {
            fixed_value_number: self.fixed_value_number,
            fixed_value_float: self.fixed_value_float,
            range_start_number: self.range_start_number,
            range_end_number: self.range_end_number,
            range_start_float: self.range_start_float,
            range_end_float: self.range_end_float,
            float_precision: self.float_precision,
            start_number: self.start_number,
            step_number: self.step_number,
            reset_number: self.reset_number,
            randomization_percentage: self.randomization_percentage,
        }
    }
}

impl From<&SpikeFieldOverride> for OverrideSpec {
    fn from(o: &SpikeFieldOverride) -> Self {
        OverrideSpec {
            original_field_id: o.original_field_id,
            attrs: o.attrs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeScheduleCreate {
    pub collection_id: i32,
    pub name: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub spike_fields: Vec<SpikeFieldOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpikeScheduleUpdate {
    pub name: Option<String>,
    pub start_datetime: Option<DateTime<Utc>>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub spike_fields: Option<Vec<SpikeFieldOverride>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeFieldResponse {
    pub id: i32,
    pub original_field_id: i32,
    /// 目标字段已被删除时为空（覆盖保留但失效）
    pub field_name: Option<String>,
    pub value_type: Option<ValueType>,
    pub is_editable: bool,
    #[serde(flatten)]
    pub attrs: SpikeOverrideAttrs,
}

impl SpikeFieldResponse {
    /// 结合目标字段现状组装响应；is_editable 实时重算
    pub fn assemble(
        m: &spike_schedule_field::Model,
        target: Option<&field::Model>,
    ) -> Self {
        let attrs = SpikeOverrideAttrs::from(m);
        let resolved =
            target.and_then(|f| crate::spike::model::parse_field_types(f).map(|t| (f, t)));
        match resolved {
            Some((f, (ct, vt))) => Self {
                id: m.id,
                original_field_id: m.original_field_id,
                field_name: Some(f.field_name.clone()),
                value_type: Some(vt),
                is_editable: crate::spike::model::is_editable(ct, vt) && attrs.matches(vt),
                attrs,
            },
            None => Self {
                id: m.id,
                original_field_id: m.original_field_id,
                field_name: None,
                value_type: None,
                is_editable: false,
                attrs,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeScheduleResponse {
    pub id: i32,
    pub collection_id: i32,
    pub collection_name: String,
    pub name: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    /// 由时间窗实时推导，只读
    pub status: ScheduleStatus,
    pub spike_fields: Vec<SpikeFieldResponse>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedPayload {
    pub collection: String,
    #[serde(rename = "type")]
    pub collection_type: String,
    pub generated_at_epoch: i64,
    pub data: Map<String, Value>,
}
