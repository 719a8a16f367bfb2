use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fields")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub collection_id: i32,
    pub collection_type: String, // Performance / Configuration
    pub field_name: String,
    pub value_type: String, // TEXT_FIXED / NUMBER_FIXED / FLOAT_FIXED / EPOCH_NOW / NUMBER_RANGE / FLOAT_RANGE / INCREMENT / DECREMENT

    // 固定值配置
    pub fixed_value_text: Option<String>,
    pub fixed_value_number: Option<i64>,
    pub fixed_value_float: Option<f64>,

    // 区间配置
    pub range_start_number: Option<i64>,
    pub range_end_number: Option<i64>,
    pub range_start_float: Option<f64>,
    pub range_end_float: Option<f64>,
    pub float_precision: Option<i32>,

    // 计数器配置
    pub start_number: Option<f64>,
    pub step_number: Option<f64>,
    pub reset_number: Option<f64>,
    pub randomization_percentage: Option<f64>,
    pub current_number: Option<f64>, // 生成引擎维护的活动计数器状态

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
