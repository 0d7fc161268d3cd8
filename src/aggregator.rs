//! 计数聚合
//!
//! 把一条语句的提取结果映射为一次计数自增。规则：
//!
//! - INSERT 需要 group_code、bill_code、channel，字段固定记为 `<channel>:99`
//! - UPDATE 还需要 result_code；结果码为 `99` 时不计数
//!
//! 字段缺失时不调用存储。

use crate::event::{
    CounterField, CounterKey, ExtractedFields, PENDING_RESULT_CODE, StatementKind,
};
use crate::store::CounterStore;
use std::sync::Arc;
use tracing::{error, trace};

/// 聚合决策，不涉及存储
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// 对 key/field 加一
    Increment { key: CounterKey, field: CounterField },
    /// UPDATE 的结果码为待定值
    Suppress,
    /// 缺少必要字段
    Incomplete,
    /// 非 INSERT/UPDATE 语句
    Ignore,
}

/// 一次聚合的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 自增成功，`value` 为自增后的值
    Incremented {
        key: CounterKey,
        field: CounterField,
        value: i64,
    },
    Suppressed,
    Incomplete,
    /// 存储调用失败，错误已记录
    StoreFailed { key: CounterKey, field: CounterField },
    Ignored,
}

/// 根据语句类型和字段计算聚合决策
pub fn plan(kind: StatementKind, fields: &ExtractedFields) -> Decision {
    let (Some(group), Some(bill), Some(channel)) = (
        fields.group_code.as_deref(),
        fields.bill_code.as_deref(),
        fields.channel.as_deref(),
    ) else {
        return match kind {
            StatementKind::Other => Decision::Ignore,
            _ => Decision::Incomplete,
        };
    };

    match kind {
        StatementKind::Insert => Decision::Increment {
            key: CounterKey::new(group, bill),
            field: CounterField::pending(channel),
        },
        StatementKind::Update => match fields.result_code.as_deref() {
            None => Decision::Incomplete,
            Some(PENDING_RESULT_CODE) => Decision::Suppress,
            Some(result) => Decision::Increment {
                key: CounterKey::new(group, bill),
                field: CounterField::new(channel, result),
            },
        },
        StatementKind::Other => Decision::Ignore,
    }
}

/// 把聚合决策落到计数存储上
pub struct CounterAggregator {
    store: Arc<dyn CounterStore>,
}

impl CounterAggregator {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// 计算决策并执行自增
    ///
    /// 存储失败只记录日志并返回 [`Outcome::StoreFailed`]，不中断调用方。
    pub fn aggregate(&self, kind: StatementKind, fields: &ExtractedFields) -> Outcome {
        match plan(kind, fields) {
            Decision::Increment { key, field } => {
                match self.store.increment(key.as_str(), field.as_str(), 1) {
                    Ok(value) => {
                        trace!(key = %key, field = %field, value, "counter incremented");
                        Outcome::Incremented { key, field, value }
                    }
                    Err(e) => {
                        error!(key = %key, field = %field, error = %e, "counter increment failed");
                        Outcome::StoreFailed { key, field }
                    }
                }
            }
            Decision::Suppress => {
                trace!(%kind, "pending result code, increment suppressed");
                Outcome::Suppressed
            }
            Decision::Incomplete => {
                trace!(%kind, ?fields, "required fields missing");
                Outcome::Incomplete
            }
            Decision::Ignore => Outcome::Ignored,
        }
    }
}
