use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 只存数值覆盖属性：不含 fixed_value_text，也不含 current_number。
/// original_field_id 是弱引用，目标字段被删除后该行保留但失效。
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "spike_schedule_fields")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub spike_schedule_id: i32,
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

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
