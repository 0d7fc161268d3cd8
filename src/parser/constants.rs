//! 解析器使用的常量定义
//!
//! 语句前缀、子句关键字和识别的列名。

use once_cell::sync::Lazy;

/// INSERT 语句前缀（区分大小写）
pub const INSERT_PREFIX: &str = "INSERT INTO";

/// UPDATE 语句前缀（区分大小写）
pub const UPDATE_PREFIX: &str = "UPDATE";

// 子句关键字，匹配时不区分大小写

pub const VALUES_KEYWORD: &str = "VALUES";

pub const SET_KEYWORD: &str = "SET";

pub const WHERE_KEYWORD: &str = "WHERE";

/// WHERE 子句在这些关键字处结束
pub static WHERE_TERMINATORS: Lazy<[&'static str; 2]> = Lazy::new(|| ["ORDER", "LIMIT"]);

// 识别的列名（小写）

/// 业务组编码列
pub const GROUP_CODE_COLUMN: &str = "group_code";

/// 结果码列
pub const RESULT_CODE_COLUMN: &str = "result_code";

/// 单据编码列
pub const BILL_CODE_COLUMN: &str = "bill_code";

/// 渠道列
pub const CHANNEL_COLUMN: &str = "channel";

/// 永远不从 WHERE 子句提取的列
pub static WHERE_EXCLUDED_COLUMNS: Lazy<[&'static str; 2]> = Lazy::new(|| ["ums_msg_id", "type"]);
