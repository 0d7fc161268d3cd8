//! 容错的 SQL 文本扫描器
//!
//! 不做语法分析，只跟踪引号和括号深度，让逗号、`=`、`and` 等分隔符在引号内或嵌套括号内时不被当作分隔符。
//! 所有分隔符都是 ASCII，返回的字节下标一定落在字符边界上。

use memchr::memchr2;

/// 引号内的字节不会产出；括号按所在的外层深度产出
pub(crate) struct Structural<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Structural<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            depth: 0,
        }
    }
}

impl Iterator for Structural<'_> {
    /// (字节下标, 字节, 括号深度)
    type Item = (usize, u8, usize);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.bytes.len() {
            let i = self.pos;
            let b = self.bytes[i];
            match b {
                b'\'' | b'"' | b'`' => {
                    self.pos = skip_quoted(self.bytes, i);
                }
                b'(' => {
                    let depth = self.depth;
                    self.depth += 1;
                    self.pos += 1;
                    return Some((i, b, depth));
                }
                b')' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.pos += 1;
                    return Some((i, b, self.depth));
                }
                _ => {
                    self.pos += 1;
                    return Some((i, b, self.depth));
                }
            }
        }
        None
    }
}

/// 返回引号段结束后的下标；未闭合的引号吞掉剩余全部文本
fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;

    while i < bytes.len() {
        // 反引号内没有反斜杠转义
        let escape = if quote == b'`' { quote } else { b'\\' };
        let Some(offset) = memchr2(quote, escape, &bytes[i..]) else {
            return bytes.len();
        };
        i += offset;

        if bytes[i] == quote {
            // 连续两个引号是转义
            if i + 1 < bytes.len() && bytes[i + 1] == quote {
                i += 2;
                continue;
            }
            return i + 1;
        }

        i += 2;
    }

    bytes.len()
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// 按顶层（括号深度 0、引号外）分隔符切分
pub(crate) fn split_top_level(text: &str, delimiter: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;

    for (i, b, depth) in Structural::new(text) {
        if b == delimiter && depth == 0 {
            parts.push(&text[start..i]);
            start = i + 1;
        }
    }
    parts.push(&text[start..]);
    parts
}

/// 查找 `from` 之后第一个位于顶层、前后都是单词边界的关键字（不区分大小写）
pub(crate) fn find_keyword(text: &str, keyword: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let kw = keyword.as_bytes();

    Structural::new(text)
        .filter(|&(i, _, depth)| i >= from && depth == 0)
        .map(|(i, _, _)| i)
        .find(|&i| {
            let end = i + kw.len();
            end <= bytes.len()
                && bytes[i..end].eq_ignore_ascii_case(kw)
                && (i == 0 || !is_ident_byte(bytes[i - 1]))
                && (end == bytes.len() || !is_ident_byte(bytes[end]))
        })
}

/// 返回与 `open` 处左括号配对的右括号下标
pub(crate) fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut scan = Structural::new(text).skip_while(|&(i, _, _)| i < open);

    let (_, first, outer) = scan.next()?;
    if first != b'(' {
        return None;
    }

    scan.find(|&(_, b, depth)| b == b')' && depth == outer)
        .map(|(i, _, _)| i)
}

/// 以 `end` 之前最后一个非空白的右括号为结尾，返回该括号组的 (左括号, 右括号) 下标
pub(crate) fn group_ending_before(text: &str, end: usize) -> Option<(usize, usize)> {
    let head = text[..end].trim_end();
    if !head.ends_with(')') {
        return None;
    }
    let close = head.len() - 1;

    let mut stack = Vec::new();
    for (i, b, _) in Structural::new(head) {
        match b {
            b'(' => stack.push(i),
            b')' => {
                let open = stack.pop();
                if i == close {
                    return open.map(|open| (open, close));
                }
            }
            _ => {}
        }
    }
    None
}

/// 按 `and` 切分条件：不区分大小写、两侧必须是空白、位于顶层且在引号外
pub(crate) fn split_on_and(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut skip_until = 0;

    for (i, _, depth) in Structural::new(text) {
        if i < skip_until || depth != 0 || i == 0 || i + 3 >= bytes.len() {
            continue;
        }
        if bytes[i - 1].is_ascii_whitespace()
            && bytes[i..i + 3].eq_ignore_ascii_case(b"and")
            && bytes[i + 3].is_ascii_whitespace()
        {
            parts.push(&text[start..i]);
            start = i + 3;
            skip_until = start;
        }
    }
    parts.push(&text[start..]);
    parts
}

/// 在第一个引号外的 `=` 处切成 (列, 值)，两侧 trim；没有 `=` 返回 None
pub(crate) fn split_assignment(fragment: &str) -> Option<(&str, &str)> {
    let (eq, _, _) = Structural::new(fragment).find(|&(_, b, _)| b == b'=')?;
    Some((fragment[..eq].trim(), fragment[eq + 1..].trim()))
}

/// 若整段被一对括号包围，去掉这一层括号
pub(crate) fn strip_enclosing_parens(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with('(') && matching_paren(trimmed, 0) == Some(trimmed.len() - 1) {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}
