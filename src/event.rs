use serde::{Deserialize, Serialize};
use std::fmt;

/// 待定结果码：INSERT 一律记在该结果码下，UPDATE 解析到该结果码时不计数
pub const PENDING_RESULT_CODE: &str = "99";

/// binlog 事件类型
///
/// 只区分流水线关心的几种，其余保留原始类型码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// QUERY_EVENT (2)，携带原始 SQL 文本
    Query,
    /// ROTATE_EVENT (4)
    Rotate,
    /// FORMAT_DESCRIPTION_EVENT (15)
    FormatDescription,
    /// XID_EVENT (16)
    Xid,
    /// 其他事件
    Other(u8),
}

impl EventType {
    pub fn from_u8(code: u8) -> Self {
        match code {
            2 => EventType::Query,
            4 => EventType::Rotate,
            15 => EventType::FormatDescription,
            16 => EventType::Xid,
            other => EventType::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            EventType::Query => 2,
            EventType::Rotate => 4,
            EventType::FormatDescription => 15,
            EventType::Xid => 16,
            EventType::Other(code) => code,
        }
    }
}

/// 从 segment 文件解码出来的一个变更事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// 事件类型
    pub event_type: EventType,

    /// QUERY 事件的 SQL 文本，其他事件为空
    pub statement: String,

    /// 事件结束位置（下一个事件的起始偏移量）
    pub position: u64,
}

impl ChangeEvent {
    pub fn is_query(&self) -> bool {
        self.event_type == EventType::Query
    }
}

/// 语句分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    Insert,
    Update,
    Other,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Other => "OTHER",
        };
        f.write_str(name)
    }
}

/// 从单条语句中提取出的四个业务字段
///
/// 空字符串在写入时即视为缺失，因此 `Some` 一定非空。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractedFields {
    /// 业务组编码
    pub group_code: Option<String>,

    /// 结果码
    pub result_code: Option<String>,

    /// 单据编码
    pub bill_code: Option<String>,

    /// 渠道
    pub channel: Option<String>,
}

impl ExtractedFields {
    pub fn set_group_code(&mut self, value: &str) {
        self.group_code = non_empty(value);
    }

    pub fn set_result_code(&mut self, value: &str) {
        self.result_code = non_empty(value);
    }

    pub fn set_bill_code(&mut self, value: &str) {
        self.bill_code = non_empty(value);
    }

    pub fn set_channel(&mut self, value: &str) {
        self.channel = non_empty(value);
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// 计数桶的键：`count:<group_code>:<bill_code>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey(String);

impl CounterKey {
    pub fn new(group_code: &str, bill_code: &str) -> Self {
        Self(format!("count:{}:{}", group_code, bill_code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 计数桶内的字段：`<channel>:<result_code>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterField(String);

impl CounterField {
    pub fn new(channel: &str, result_code: &str) -> Self {
        Self(format!("{}:{}", channel, result_code))
    }

    /// INSERT 使用的待定字段 `<channel>:99`
    pub fn pending(channel: &str) -> Self {
        Self::new(channel, PENDING_RESULT_CODE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_codes() {
        for code in [2u8, 4, 15, 16, 30, 160] {
            assert_eq!(EventType::from_u8(code).code(), code);
        }
        assert_eq!(EventType::from_u8(2), EventType::Query);
        assert_eq!(EventType::from_u8(19), EventType::Other(19));
    }

    #[test]
    fn test_empty_values_are_absent() {
        let mut fields = ExtractedFields::default();
        fields.set_channel("");
        fields.set_group_code("G1");
        assert_eq!(fields.channel, None);
        assert_eq!(fields.group_code.as_deref(), Some("G1"));
    }

    #[test]
    fn test_counter_key_and_field_format() {
        assert_eq!(CounterKey::new("G1", "B1").as_str(), "count:G1:B1");
        assert_eq!(CounterField::new("CH1", "5").as_str(), "CH1:5");
        assert_eq!(CounterField::pending("CH1").to_string(), "CH1:99");
    }
}
