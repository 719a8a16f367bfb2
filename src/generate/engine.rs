use crate::catalog::model::{ConfigError, CounterConfig, FieldConfig};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    #[error("collection not found: {0}")]
    UnknownCollection(String),
    #[error("no fields found for collection '{collection}' type '{collection_type}'")]
    NoFields {
        collection: String,
        collection_type: String,
    },
    #[error("invalid configuration for field '{field}': {source}")]
    InvalidConfig {
        field: String,
        source: ConfigError,
    },
}

/// 引擎产出的单个值
#[derive(Clone, Debug, PartialEq)]
pub enum GeneratedValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<GeneratedValue> for Value {
    fn from(v: GeneratedValue) -> Self {
        match v {
            GeneratedValue::Int(i) => Value::from(i),
            GeneratedValue::Float(f) => Value::from(f),
            GeneratedValue::Text(s) => Value::from(s),
        }
    }
}

/// 一次生成的结果：值本身 + 需要回写的计数器状态（仅计数器类型）
#[derive(Clone, Debug, PartialEq)]
pub struct Generated {
    pub value: GeneratedValue,
    pub next_counter: Option<f64>,
}

impl Generated {
    fn value(value: GeneratedValue) -> Self {
        Self {
            value,
            next_counter: None,
        }
    }
}

pub struct ValueEngine;

impl ValueEngine {
    /// 按配置合成一个值。
    ///
    /// 计数器类型传入字段当前的活动计数器（current_number），
    /// 返回值里带上推进后的状态，由调用方负责落库。
    pub fn generate(
        config: &FieldConfig,
        current: Option<f64>,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Generated {
        match config {
            FieldConfig::TextFixed { value } => {
                Generated::value(GeneratedValue::Text(value.clone()))
            }
            FieldConfig::NumberFixed { value } => Generated::value(GeneratedValue::Int(*value)),
            FieldConfig::FloatFixed { value } => Generated::value(GeneratedValue::Float(*value)),
            FieldConfig::EpochNow => Generated::value(GeneratedValue::Int(now.timestamp())),
            FieldConfig::NumberRange { start, end } => {
                let v = if start == end {
                    *start
                } else {
                    rng.gen_range(*start..=*end)
                };
                Generated::value(GeneratedValue::Int(v))
            }
            FieldConfig::FloatRange {
                start,
                end,
                precision,
            } => {
                let v = if start == end {
                    *start
                } else {
                    rng.gen_range(*start..=*end)
                };
                Generated::value(GeneratedValue::Float(round_to(v, *precision)))
            }
            FieldConfig::Increment(counter) => {
                let (emitted, next) = advance(counter, current, 1.0, rng);
                Generated {
                    value: GeneratedValue::Float(emitted),
                    next_counter: Some(next),
                }
            }
            FieldConfig::Decrement(counter) => {
                let (emitted, next) = advance(counter, current, -1.0, rng);
                Generated {
                    value: GeneratedValue::Float(emitted),
                    next_counter: Some(next),
                }
            }
        }
    }
}

/// 计数器推进：返回 (本次发出的值, 推进后的计数器)。
///
/// current 为空时从 start 起步（首次播种不做阈值检查）；
/// 设置了 reset 且推进越过阈值（递增向上、递减向下）时回到 start，
/// 下一次发出 start。
fn advance(
    counter: &CounterConfig,
    current: Option<f64>,
    direction: f64,
    rng: &mut impl Rng,
) -> (f64, f64) {
    let step = randomized_step(counter.step, counter.randomization, rng) * direction;

    let Some(emitted) = current else {
        return (counter.start, counter.start + step);
    };
    let candidate = emitted + step;

    let next = match counter.reset {
        Some(reset) if direction > 0.0 && candidate > reset => counter.start,
        Some(reset) if direction < 0.0 && candidate < reset => counter.start,
        _ => candidate,
    };

    (emitted, next)
}

/// 步长扰动：percentage 取 0~100，扰动因子均匀落在 ±percentage/100
fn randomized_step(step: f64, percentage: Option<f64>, rng: &mut impl Rng) -> f64 {
    let p = percentage.unwrap_or(0.0);
    if step == 0.0 || p <= 0.0 {
        return step;
    }
    let factor: f64 = rng.gen_range(-p / 100.0..=p / 100.0);
    step * (1.0 + factor)
}

fn round_to(v: f64, precision: i32) -> f64 {
    let p = precision.clamp(0, 10);
    let factor = 10f64.powi(p);
    (v * factor).round() / factor
}
