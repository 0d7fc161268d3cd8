use crate::event::StatementKind;
use crate::parser::constants::{INSERT_PREFIX, UPDATE_PREFIX};

/// 按语句前缀分类
///
/// 只做区分大小写的前缀匹配：`INSERT INTO` 开头为 INSERT，`UPDATE` 开头为 UPDATE，其余一律为 OTHER。
/// 前导空白、小写关键字或多语句拼接都不会被识别。
pub fn classify(statement: &str) -> StatementKind {
    if statement.starts_with(INSERT_PREFIX) {
        StatementKind::Insert
    } else if statement.starts_with(UPDATE_PREFIX) {
        StatementKind::Update
    } else {
        StatementKind::Other
    }
}
