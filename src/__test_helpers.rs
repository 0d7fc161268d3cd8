//! 测试与基准使用的 segment 构造工具
//!
//! 生成最小但格式正确的 binlog v4 文件：魔数、FORMAT_DESCRIPTION_EVENT、QUERY_EVENT 与 XID_EVENT。

use crate::segment::{BINLOG_MAGIC, EVENT_HEADER_LEN};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

const SERVER_VERSION: &str = "10.6.12-MariaDB-log";

/// 各事件类型的 post-header 长度，下标 1 为 QUERY_EVENT
const POST_HEADER_LENGTHS: [u8; 8] = [56, 13, 0, 8, 0, 18, 0, 0];

/// 按顺序拼接事件字节
pub struct SegmentBuilder {
    bytes: Vec<u8>,
    checksum: bool,
}

impl SegmentBuilder {
    /// 新文件：魔数 + FORMAT_DESCRIPTION_EVENT
    pub fn new(checksum: bool) -> Self {
        let mut builder = Self {
            bytes: BINLOG_MAGIC.to_vec(),
            checksum,
        };

        let mut payload = Vec::with_capacity(70);
        payload.extend_from_slice(&4u16.to_le_bytes());
        let mut version = [0u8; 50];
        version[..SERVER_VERSION.len()].copy_from_slice(SERVER_VERSION.as_bytes());
        payload.extend_from_slice(&version);
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.push(EVENT_HEADER_LEN as u8);
        payload.extend_from_slice(&POST_HEADER_LENGTHS);
        payload.push(u8::from(checksum));

        builder.push_event(15, &payload);
        builder
    }

    /// 追加到已有文件末尾的事件，不带魔数和 FORMAT_DESCRIPTION_EVENT
    pub fn continuation(checksum: bool) -> Self {
        Self {
            bytes: Vec::new(),
            checksum,
        }
    }

    pub fn query(&mut self, sql: &str) -> &mut Self {
        let schema = b"test";
        let mut payload = Vec::with_capacity(20 + sql.len());
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.push(schema.len() as u8);
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(schema);
        payload.push(0);
        payload.extend_from_slice(sql.as_bytes());

        self.push_event(2, &payload);
        self
    }

    pub fn xid(&mut self, xid: u64) -> &mut Self {
        self.push_event(16, &xid.to_le_bytes());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn push_event(&mut self, event_type: u8, payload: &[u8]) {
        let trailer = if self.checksum { 4 } else { 0 };
        let length = (EVENT_HEADER_LEN + payload.len() + trailer) as u32;
        let next_position = self.bytes.len() as u32 + length;

        self.bytes.extend_from_slice(&0u32.to_le_bytes());
        self.bytes.push(event_type);
        self.bytes.extend_from_slice(&1u32.to_le_bytes());
        self.bytes.extend_from_slice(&length.to_le_bytes());
        self.bytes.extend_from_slice(&next_position.to_le_bytes());
        self.bytes.extend_from_slice(&0u16.to_le_bytes());
        self.bytes.extend_from_slice(payload);
        if self.checksum {
            // 解码时不校验 CRC，只需占位
            self.bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        }
    }
}

/// 魔数 + FORMAT_DESCRIPTION_EVENT + 每条语句一个 QUERY_EVENT
pub fn encode_segment(statements: &[&str], checksum: bool) -> Vec<u8> {
    let mut builder = SegmentBuilder::new(checksum);
    for sql in statements {
        builder.query(sql);
    }
    builder.into_bytes()
}

/// 写出一个新的 segment 文件
pub fn write_segment<P: AsRef<Path>>(path: P, statements: &[&str], checksum: bool) -> io::Result<()> {
    std::fs::write(path, encode_segment(statements, checksum))
}

/// 向已有 segment 文件末尾追加 QUERY_EVENT
pub fn append_queries<P: AsRef<Path>>(path: P, statements: &[&str], checksum: bool) -> io::Result<()> {
    let mut builder = SegmentBuilder::continuation(checksum);
    for sql in statements {
        builder.query(sql);
    }
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(builder.bytes())?;
    file.flush()
}
