//! 字段提取
//!
//! INSERT 从 `(<columns>) VALUES (<values>)` 中按位置配对列和值；
//! UPDATE 从 `SET <assignments> WHERE <conditions>` 中读取赋值和条件。
//! 只识别 group_code、result_code、bill_code、channel 四列，其他列忽略。

use crate::error::ExtractError;
use crate::event::{ExtractedFields, StatementKind};
use crate::parser::constants::*;
use crate::parser::tokenizer::{
    find_keyword, group_ending_before, matching_paren, split_assignment, split_on_and,
    split_top_level, strip_enclosing_parens,
};
use crate::tools::{normalize_identifier, strip_quotes};
use tracing::trace;

/// 按分类结果提取字段；OTHER 返回空字段
pub fn extract(kind: StatementKind, statement: &str) -> Result<ExtractedFields, ExtractError> {
    match kind {
        StatementKind::Insert => extract_insert(statement),
        StatementKind::Update => extract_update(statement),
        StatementKind::Other => Ok(ExtractedFields::default()),
    }
}

/// 从 INSERT 语句提取字段
///
/// 多行 VALUES 只取第一组。列数与值数不一致时返回 [`ExtractError::ColumnCountMismatch`]，不做部分提取。
///
/// # 示例
///
/// ```
/// use relay_counter::parser::extract_insert;
///
/// let fields = extract_insert(
///     "INSERT INTO t (group_code, bill_code, channel) VALUES ('G1','B1','CH1')",
/// ).unwrap();
///
/// assert_eq!(fields.group_code.as_deref(), Some("G1"));
/// assert_eq!(fields.bill_code.as_deref(), Some("B1"));
/// assert_eq!(fields.channel.as_deref(), Some("CH1"));
/// ```
pub fn extract_insert(statement: &str) -> Result<ExtractedFields, ExtractError> {
    let values_at =
        find_keyword(statement, VALUES_KEYWORD, 0).ok_or(ExtractError::MissingValuesClause)?;

    let (columns_open, columns_close) =
        group_ending_before(statement, values_at).ok_or(ExtractError::MissingValuesClause)?;

    let after_keyword = values_at + VALUES_KEYWORD.len();
    let rest = &statement[after_keyword..];
    let values_open = after_keyword + (rest.len() - rest.trim_start().len());
    if !statement[values_open..].starts_with('(') {
        return Err(ExtractError::MissingValuesClause);
    }
    let values_close =
        matching_paren(statement, values_open).ok_or(ExtractError::UnbalancedParen(values_open))?;

    let columns = split_top_level(&statement[columns_open + 1..columns_close], b',');
    let values = split_top_level(&statement[values_open + 1..values_close], b',');

    if columns.len() != values.len() {
        return Err(ExtractError::ColumnCountMismatch {
            columns: columns.len(),
            values: values.len(),
        });
    }

    let mut fields = ExtractedFields::default();
    for (column, value) in columns.iter().zip(values.iter()) {
        assign_recognized(&mut fields, &normalize_identifier(column), &strip_quotes(value));
    }

    trace!(?fields, "extracted INSERT fields");
    Ok(fields)
}

/// 从 UPDATE 语句提取字段
///
/// SET 子句可以填充四个字段；WHERE 子句只补充 SET 未提供的 group_code 和 bill_code，
/// 并始终跳过 `ums_msg_id` 与 `type` 两列。
///
/// 赋值片段在第一个 `=` 处切分，值中剩余的 `=` 保留；没有 `=` 的片段被跳过。
///
/// # 示例
///
/// ```
/// use relay_counter::parser::extract_update;
///
/// let fields = extract_update(
///     "UPDATE t SET result_code='5', group_code='G1', channel='CH1' WHERE bill_code='B1'",
/// ).unwrap();
///
/// assert_eq!(fields.result_code.as_deref(), Some("5"));
/// assert_eq!(fields.bill_code.as_deref(), Some("B1"));
/// ```
pub fn extract_update(statement: &str) -> Result<ExtractedFields, ExtractError> {
    let set_at = find_keyword(statement, SET_KEYWORD, 0).ok_or(ExtractError::MissingSetClause)?;
    let set_end = set_at + SET_KEYWORD.len();
    let where_at = find_keyword(statement, WHERE_KEYWORD, set_end)
        .ok_or(ExtractError::MissingWhereClause)?;

    let set_clause = &statement[set_end..where_at];
    let where_clause = where_conditions(statement, where_at + WHERE_KEYWORD.len());

    let mut fields = ExtractedFields::default();

    for assignment in split_top_level(set_clause, b',') {
        let Some((column, value)) = split_assignment(assignment) else {
            trace!(fragment = assignment, "skipping SET fragment without '='");
            continue;
        };
        assign_recognized(&mut fields, &normalize_identifier(column), &strip_quotes(value));
    }

    for condition in split_on_and(where_clause) {
        let condition = strip_enclosing_parens(condition);
        let Some((column, value)) = split_assignment(condition) else {
            trace!(fragment = condition, "skipping WHERE fragment without '='");
            continue;
        };

        let column = normalize_identifier(column);
        if WHERE_EXCLUDED_COLUMNS.contains(&column.as_str()) {
            continue;
        }

        match column.as_str() {
            GROUP_CODE_COLUMN if fields.group_code.is_none() => {
                fields.set_group_code(&strip_quotes(value))
            }
            BILL_CODE_COLUMN if fields.bill_code.is_none() => {
                fields.set_bill_code(&strip_quotes(value))
            }
            _ => {}
        }
    }

    trace!(?fields, "extracted UPDATE fields");
    Ok(fields)
}

/// WHERE 关键字之后到 ORDER/LIMIT 或语句结尾（去掉末尾分号）
fn where_conditions(statement: &str, start: usize) -> &str {
    let end = WHERE_TERMINATORS
        .iter()
        .filter_map(|kw| find_keyword(statement, kw, start))
        .min()
        .unwrap_or(statement.len());

    statement[start..end].trim().trim_end_matches(';').trim_end()
}

fn assign_recognized(fields: &mut ExtractedFields, column: &str, value: &str) {
    match column {
        GROUP_CODE_COLUMN => fields.set_group_code(value),
        RESULT_CODE_COLUMN => fields.set_result_code(value),
        BILL_CODE_COLUMN => fields.set_bill_code(value),
        CHANNEL_COLUMN => fields.set_channel(value),
        _ => {}
    }
}
