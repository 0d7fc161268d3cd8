//! Parser 模块 - 分类并解析变更事件中的 SQL 文本
//!
//! 此模块提供:
//! - 语句分类（INSERT / UPDATE / OTHER）
//! - 容错的引号/括号感知扫描
//! - 四个业务字段的提取

mod classifier;
mod constants;
mod extract;
pub(crate) mod tokenizer;

pub use classifier::classify;
pub use constants::{INSERT_PREFIX, UPDATE_PREFIX};
pub use extract::{extract, extract_insert, extract_update};
