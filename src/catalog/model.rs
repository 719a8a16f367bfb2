use crate::storage::entity::field;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("unknown collection type: {0}")]
    UnknownCollectionType(String),
    #[error("unknown value type: {0}")]
    UnknownValueType(String),
    #[error("field_name must not be empty")]
    EmptyFieldName,
    #[error("{attribute} is required for {value_type}")]
    MissingAttribute {
        value_type: ValueType,
        attribute: &'static str,
    },
    #[error("range_start_number must be <= range_end_number")]
    NumberRangeOrder,
    #[error("range_start_float must be <= range_end_float")]
    FloatRangeOrder,
    #[error("float_precision must be between 0 and 10, got {0}")]
    PrecisionOutOfRange(i32),
    #[error("step_number must be > 0")]
    NonPositiveStep,
    #[error("randomization_percentage must be between 0 and 100, got {0}")]
    RandomizationOutOfRange(f64),
}

/// 集合内字段的二级分区
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionType {
    Performance,
    Configuration,
}

impl CollectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionType::Performance => "Performance",
            CollectionType::Configuration => "Configuration",
        }
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "performance" => Ok(CollectionType::Performance),
            "configuration" => Ok(CollectionType::Configuration),
            _ => Err(ConfigError::UnknownCollectionType(s.to_string())),
        }
    }
}

/// 生成策略标签：决定哪一组配置属性生效
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    TextFixed,
    NumberFixed,
    FloatFixed,
    EpochNow,
    NumberRange,
    FloatRange,
    Increment,
    Decrement,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::TextFixed => "TEXT_FIXED",
            ValueType::NumberFixed => "NUMBER_FIXED",
            ValueType::FloatFixed => "FLOAT_FIXED",
            ValueType::EpochNow => "EPOCH_NOW",
            ValueType::NumberRange => "NUMBER_RANGE",
            ValueType::FloatRange => "FLOAT_RANGE",
            ValueType::Increment => "INCREMENT",
            ValueType::Decrement => "DECREMENT",
        }
    }

    /// 该类型必须提供的配置属性
    pub fn required_attributes(&self) -> &'static [&'static str] {
        match self {
            ValueType::TextFixed => &["fixed_value_text"],
            ValueType::NumberFixed => &["fixed_value_number"],
            ValueType::FloatFixed => &["fixed_value_float"],
            ValueType::EpochNow => &[],
            ValueType::NumberRange => &["range_start_number", "range_end_number"],
            ValueType::FloatRange => &["range_start_float", "range_end_float"],
            ValueType::Increment | ValueType::Decrement => &["start_number", "step_number"],
        }
    }

    /// 该类型可选提供的配置属性
    pub fn optional_attributes(&self) -> &'static [&'static str] {
        match self {
            ValueType::FloatRange => &["float_precision"],
            ValueType::Increment | ValueType::Decrement => &[
                "reset_number",
                "current_number",
                "randomization_percentage",
            ],
            _ => &[],
        }
    }

    /// 是否属于数值类型（spike 可覆盖的前提之一）
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueType::NumberFixed
                | ValueType::FloatFixed
                | ValueType::NumberRange
                | ValueType::FloatRange
                | ValueType::Increment
                | ValueType::Decrement
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT_FIXED" => Ok(ValueType::TextFixed),
            "NUMBER_FIXED" => Ok(ValueType::NumberFixed),
            "FLOAT_FIXED" => Ok(ValueType::FloatFixed),
            "EPOCH_NOW" => Ok(ValueType::EpochNow),
            "NUMBER_RANGE" => Ok(ValueType::NumberRange),
            "FLOAT_RANGE" => Ok(ValueType::FloatRange),
            "INCREMENT" => Ok(ValueType::Increment),
            "DECREMENT" => Ok(ValueType::Decrement),
            _ => Err(ConfigError::UnknownValueType(s.to_string())),
        }
    }
}

/// 字段配置属性的扁平视图。
///
/// 存储层保留全部可空列：切换 value_type 不会清理旧类型遗留的属性，
/// 消费方只允许读取当前类型声明的子集（通过 [`FieldConfig::resolve`]）。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldAttrs {
    pub fixed_value_text: Option<String>,
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
    pub current_number: Option<f64>,
}

impl From<&field::Model> for FieldAttrs {
    fn from(m: &field::Model) -> Self {
        Self {
            fixed_value_text: m.fixed_value_text.clone(),
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
            current_number: m.current_number,
        }
    }
}

pub const DEFAULT_FLOAT_PRECISION: i32 = 2;

/// 计数器（INCREMENT/DECREMENT）配置
#[derive(Clone, Debug, PartialEq)]
pub struct CounterConfig {
    pub start: f64,
    pub step: f64,
    pub reset: Option<f64>,
    pub randomization: Option<f64>,
}

/// 按 value_type 收敛后的字段配置：每个变体只携带自己的属性集
#[derive(Clone, Debug, PartialEq)]
pub enum FieldConfig {
    TextFixed { value: String },
    NumberFixed { value: i64 },
    FloatFixed { value: f64 },
    EpochNow,
    NumberRange { start: i64, end: i64 },
    FloatRange { start: f64, end: f64, precision: i32 },
    Increment(CounterConfig),
    Decrement(CounterConfig),
}

impl FieldConfig {
    /// 从扁平属性收敛出当前类型的配置。
    ///
    /// 只读取 value_type 声明的属性子集；缺必填属性、越界取值会被拒绝，
    /// 其它类型遗留的属性一律忽略。
    pub fn resolve(value_type: ValueType, attrs: &FieldAttrs) -> Result<FieldConfig, ConfigError> {
        let missing = |attribute| ConfigError::MissingAttribute {
            value_type,
            attribute,
        };

        match value_type {
            ValueType::TextFixed => {
                let value = attrs
                    .fixed_value_text
                    .clone()
                    .ok_or_else(|| missing("fixed_value_text"))?;
                Ok(FieldConfig::TextFixed { value })
            }
            ValueType::NumberFixed => {
                let value = attrs
                    .fixed_value_number
                    .ok_or_else(|| missing("fixed_value_number"))?;
                Ok(FieldConfig::NumberFixed { value })
            }
            ValueType::FloatFixed => {
                let value = attrs
                    .fixed_value_float
                    .ok_or_else(|| missing("fixed_value_float"))?;
                Ok(FieldConfig::FloatFixed { value })
            }
            ValueType::EpochNow => Ok(FieldConfig::EpochNow),
            ValueType::NumberRange => {
                let start = attrs
                    .range_start_number
                    .ok_or_else(|| missing("range_start_number"))?;
                let end = attrs
                    .range_end_number
                    .ok_or_else(|| missing("range_end_number"))?;
                if start > end {
                    return Err(ConfigError::NumberRangeOrder);
                }
                Ok(FieldConfig::NumberRange { start, end })
            }
            ValueType::FloatRange => {
                let start = attrs
                    .range_start_float
                    .ok_or_else(|| missing("range_start_float"))?;
                let end = attrs
                    .range_end_float
                    .ok_or_else(|| missing("range_end_float"))?;
                if start > end {
                    return Err(ConfigError::FloatRangeOrder);
                }
                let precision = attrs.float_precision.unwrap_or(DEFAULT_FLOAT_PRECISION);
                if !(0..=10).contains(&precision) {
                    return Err(ConfigError::PrecisionOutOfRange(precision));
                }
                Ok(FieldConfig::FloatRange {
                    start,
                    end,
                    precision,
                })
            }
            ValueType::Increment | ValueType::Decrement => {
                let start = attrs.start_number.ok_or_else(|| missing("start_number"))?;
                let step = attrs.step_number.ok_or_else(|| missing("step_number"))?;
                if step <= 0.0 {
                    return Err(ConfigError::NonPositiveStep);
                }
                if let Some(p) = attrs.randomization_percentage {
                    if !(0.0..=100.0).contains(&p) {
                        return Err(ConfigError::RandomizationOutOfRange(p));
                    }
                }
                let counter = CounterConfig {
                    start,
                    step,
                    reset: attrs.reset_number,
                    randomization: attrs.randomization_percentage,
                };
                Ok(match value_type {
                    ValueType::Increment => FieldConfig::Increment(counter),
                    _ => FieldConfig::Decrement(counter),
                })
            }
        }
    }
}

/// 校验字段配置：必填属性齐全且取值合法
pub fn validate_attrs(value_type: ValueType, attrs: &FieldAttrs) -> Result<(), ConfigError> {
    FieldConfig::resolve(value_type, attrs).map(|_| ())
}

/// 渲染字段配置摘要。
///
/// 对任意属性组合都不会失败：只读当前类型的属性，缺失时退到 "No configuration"。
pub fn summarize(value_type: ValueType, attrs: &FieldAttrs) -> String {
    match value_type {
        ValueType::TextFixed => match &attrs.fixed_value_text {
            Some(v) => format!("Fixed: {}", v),
            None => "No configuration".to_string(),
        },
        ValueType::NumberFixed => match attrs.fixed_value_number {
            Some(v) => format!("Fixed: {}", v),
            None => "No configuration".to_string(),
        },
        ValueType::FloatFixed => match attrs.fixed_value_float {
            Some(v) => format!("Fixed: {}", v),
            None => "No configuration".to_string(),
        },
        ValueType::EpochNow => "Current timestamp".to_string(),
        ValueType::NumberRange => match (attrs.range_start_number, attrs.range_end_number) {
            (Some(s), Some(e)) => format!("Range: {} - {}", s, e),
            _ => "No configuration".to_string(),
        },
        ValueType::FloatRange => match (attrs.range_start_float, attrs.range_end_float) {
            (Some(s), Some(e)) => format!(
                "Range: {} - {}, Precision: {}",
                s,
                e,
                attrs.float_precision.unwrap_or(DEFAULT_FLOAT_PRECISION)
            ),
            _ => "No configuration".to_string(),
        },
        ValueType::Increment | ValueType::Decrement => {
            let mut parts = Vec::new();
            if let Some(v) = attrs.start_number {
                parts.push(format!("Start: {}", v));
            }
            if let Some(v) = attrs.step_number {
                parts.push(format!("Step: {}", v));
            }
            if let Some(v) = attrs.reset_number {
                parts.push(format!("Reset: {}", v));
            }
            if let Some(v) = attrs.current_number {
                parts.push(format!("Current: {}", v));
            }
            if parts.is_empty() {
                "No configuration".to_string()
            } else {
                parts.join(", ")
            }
        }
    }
}
