use std::path::Path;

/// 判断文件名是否为需要处理的 segment 文件。
///
/// 只看文件名前缀，不检查文件内容。没有文件名（如 `..`）或文件名不是合法 UTF-8 时返回 false。
pub fn is_segment_file(path: &Path, prefix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(prefix))
}

/// 去掉值两端的引号并还原转义。
///
/// 先 trim，再剥掉一对包围的单引号（也接受双引号）；引号内的 `''` 与 `\'` 还原为 `'`。
/// 不是完整包围的值原样返回（仅 trim）。
pub fn strip_quotes(value: &str) -> String {
    let trimmed = value.trim();
    let bytes = trimmed.as_bytes();

    if bytes.len() < 2 {
        return trimmed.to_string();
    }

    let quote = bytes[0];
    if (quote != b'\'' && quote != b'"') || bytes[bytes.len() - 1] != quote {
        return trimmed.to_string();
    }

    let inner = &trimmed[1..trimmed.len() - 1];
    let q = quote as char;
    if !inner.contains(q) && !inner.contains('\\') {
        return inner.to_string();
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => out.push('\\'),
            },
            c if c == q && chars.peek() == Some(&q) => {
                chars.next();
                out.push(q);
            }
            c => out.push(c),
        }
    }
    out
}

/// 规范化列名：去掉反引号/双引号、表名限定和空白，并转为小写。
pub fn normalize_identifier(column: &str) -> String {
    let unquoted: String = column
        .trim()
        .chars()
        .filter(|c| *c != '`' && *c != '"' && *c != '\'')
        .collect();

    let name = match unquoted.rfind('.') {
        Some(dot) => &unquoted[dot + 1..],
        None => unquoted.as_str(),
    };

    name.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    mod segment_file_tests {
        use super::*;

        #[test]
        fn matches_prefix() {
            assert!(is_segment_file(Path::new("/data/relay/relay-0001"), "relay-"));
            assert!(is_segment_file(Path::new("relay-bin.000002"), "relay-bin"));
        }

        #[test]
        fn rejects_other_names() {
            assert!(!is_segment_file(Path::new("/data/relay/relay-log.index"), "relay-bin"));
            assert!(!is_segment_file(Path::new("/data/relay/xrelay-0001"), "relay-"));
            assert!(!is_segment_file(Path::new("/"), "relay-"));
        }

        #[test]
        fn prefix_applies_to_file_name_only() {
            assert!(!is_segment_file(Path::new("/relay-dir/other"), "relay-"));
        }
    }

    mod quote_tests {
        use super::*;

        #[test]
        fn strips_surrounding_single_quotes() {
            assert_eq!(strip_quotes("'G1'"), "G1");
            assert_eq!(strip_quotes("  'G1'  "), "G1");
            assert_eq!(strip_quotes("\"CH1\""), "CH1");
        }

        #[test]
        fn leaves_unquoted_values() {
            assert_eq!(strip_quotes(" 5 "), "5");
            assert_eq!(strip_quotes("'"), "'");
            assert_eq!(strip_quotes("'abc"), "'abc");
            assert_eq!(strip_quotes(""), "");
        }

        #[test]
        fn unescapes_embedded_quotes() {
            assert_eq!(strip_quotes("'O''Brien'"), "O'Brien");
            assert_eq!(strip_quotes(r"'O\'Brien'"), "O'Brien");
            assert_eq!(strip_quotes("''"), "");
        }

        #[test]
        fn keeps_inner_separators() {
            assert_eq!(strip_quotes("'a, b = c'"), "a, b = c");
        }
    }

    mod identifier_tests {
        use super::*;

        #[test]
        fn normalizes_case_and_quotes() {
            assert_eq!(normalize_identifier(" GROUP_CODE "), "group_code");
            assert_eq!(normalize_identifier("`bill_code`"), "bill_code");
            assert_eq!(normalize_identifier("\"Channel\""), "channel");
        }

        #[test]
        fn drops_table_qualifier() {
            assert_eq!(normalize_identifier("t.result_code"), "result_code");
            assert_eq!(normalize_identifier("`db`.`t`.`type`"), "type");
        }
    }
}
