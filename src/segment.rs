//! relay log / binlog segment 解码
//!
//! 按 binlog v4 格式顺序读取一个 segment 文件：
//! - 4 字节魔数 `\xfebin`
//! - 每个事件 19 字节事件头 + 事件体
//! - FORMAT_DESCRIPTION_EVENT 决定后续事件是否带 4 字节 CRC32 尾
//! - QUERY_EVENT 解出原始 SQL 文本
//!
//! 读取可以从 [`SegmentCursor`] 记录的位置继续，文件末尾未写完的事件不算错误，
//! 读取停在它之前，下次从同一位置重试。

use crate::error::SegmentError;
use crate::event::{ChangeEvent, EventType};
use memchr::memchr;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, trace};

/// binlog 文件魔数
pub const BINLOG_MAGIC: [u8; 4] = [0xfe, b'b', b'i', b'n'];

/// v4 事件头长度
pub const EVENT_HEADER_LEN: usize = 19;

/// QUERY_EVENT 固定头长度：thread_id(4) exec_time(4) db_len(1) error_code(2) status_vars_len(2)
const QUERY_POST_HEADER_LEN: usize = 13;

/// CRC32 校验尾长度
const CHECKSUM_LEN: usize = 4;

/// FORMAT_DESCRIPTION_EVENT 固定部分：binlog_version(2) server_version(50) create_timestamp(4) header_length(1)
const FDE_FIXED_LEN: usize = 57;

/// 单个事件允许的最大长度，超过视为文件损坏
const MAX_EVENT_LEN: u32 = 1 << 30;

/// segment 文件中的读取位置
///
/// `offset` 为下一个未读事件的起始字节偏移量；`checksum` 记录该文件的事件是否带 CRC32 尾，
/// 从文件中间继续读取时不会再经过 FORMAT_DESCRIPTION_EVENT。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentCursor {
    pub offset: u64,
    pub checksum: bool,
}

impl SegmentCursor {
    /// 是否仍在魔数之前（即从头读取）
    pub fn is_start(&self) -> bool {
        self.offset < BINLOG_MAGIC.len() as u64
    }
}

/// binlog 事件头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub timestamp: u32,
    pub event_type: EventType,
    pub server_id: u32,
    pub event_length: u32,
    pub next_position: u32,
    pub flags: u16,
}

impl EventHeader {
    pub fn parse(bytes: &[u8; EVENT_HEADER_LEN]) -> Self {
        Self {
            timestamp: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            event_type: EventType::from_u8(bytes[4]),
            server_id: u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]),
            event_length: u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]),
            next_position: u32::from_le_bytes([bytes[13], bytes[14], bytes[15], bytes[16]]),
            flags: u16::from_le_bytes([bytes[17], bytes[18]]),
        }
    }
}

/// 从 Reader 中顺序解码 binlog 事件的迭代器
///
/// 遇到错误时产出一次 `Err` 后结束；遇到文件末尾（包括未写完的尾部事件）时直接结束。
pub struct SegmentReader<R: Read> {
    reader: BufReader<R>,
    position: u64,
    checksum: bool,
    finished: bool,
    /// 打开时的文件长度，事件体只在这个范围内读取
    end: u64,
    /// 停在未写完的尾部事件时，该事件声明的结束位置
    pending_end: Option<u64>,
}

impl SegmentReader<File> {
    /// 打开 segment 文件并定位到 `cursor`
    pub fn open<P: AsRef<Path>>(path: P, cursor: SegmentCursor) -> Result<Self, SegmentError> {
        let file = File::open(path.as_ref())?;
        Self::with_cursor(file, cursor)
    }
}

impl<R: Read + Seek> SegmentReader<R> {
    /// 从 `cursor` 处开始读取；`cursor` 在魔数之前时从头校验魔数
    pub fn with_cursor(mut inner: R, cursor: SegmentCursor) -> Result<Self, SegmentError> {
        let end = inner.seek(SeekFrom::End(0))?;

        if cursor.is_start() {
            inner.seek(SeekFrom::Start(0))?;
            let mut reader = BufReader::new(inner);
            let mut magic = [0u8; 4];
            if !read_full(&mut reader, &mut magic)? {
                // 文件刚创建还没写完魔数
                return Ok(Self {
                    reader,
                    position: 0,
                    checksum: false,
                    finished: true,
                    end,
                    pending_end: None,
                });
            }
            if magic != BINLOG_MAGIC {
                return Err(SegmentError::BadMagic(magic));
            }
            return Ok(Self {
                reader,
                position: BINLOG_MAGIC.len() as u64,
                checksum: false,
                finished: false,
                end,
                pending_end: None,
            });
        }

        inner.seek(SeekFrom::Start(cursor.offset))?;
        Ok(Self {
            reader: BufReader::new(inner),
            position: cursor.offset,
            checksum: cursor.checksum,
            finished: false,
            end,
            pending_end: None,
        })
    }
}

impl<R: Read> SegmentReader<R> {
    /// 当前读取位置：最后一个完整消费的事件之后
    pub fn cursor(&self) -> SegmentCursor {
        SegmentCursor {
            offset: self.position,
            checksum: self.checksum,
        }
    }

    /// 读取停在未写完的尾部事件时，返回该事件声明的结束位置
    pub fn pending_end(&self) -> Option<u64> {
        self.pending_end
    }

    fn read_event(&mut self) -> Result<Option<ChangeEvent>, SegmentError> {
        let start = self.position;

        let mut header_bytes = [0u8; EVENT_HEADER_LEN];
        if !read_full(&mut self.reader, &mut header_bytes)? {
            return Ok(None);
        }
        let header = EventHeader::parse(&header_bytes);

        if (header.event_length as usize) < EVENT_HEADER_LEN {
            return Err(SegmentError::CorruptEvent {
                position: start,
                length: header.event_length,
            });
        }
        if header.event_length > MAX_EVENT_LEN {
            return Err(SegmentError::OversizedEvent {
                position: start,
                length: header.event_length,
            });
        }

        // 先按文件长度判断事件是否完整，不按未校验的长度分配内存
        let declared_end = start + u64::from(header.event_length);
        if declared_end > self.end {
            trace!(offset = start, declared_end, end = self.end, "incomplete trailing event, waiting for more data");
            self.pending_end = Some(declared_end);
            return Ok(None);
        }

        let body_len = header.event_length as usize - EVENT_HEADER_LEN;
        let mut body = Vec::with_capacity(body_len);
        (&mut self.reader).take(body_len as u64).read_to_end(&mut body)?;
        if body.len() < body_len {
            // 打开后文件被截断
            self.pending_end = Some(declared_end);
            return Ok(None);
        }

        self.position = declared_end;

        let statement = match header.event_type {
            EventType::FormatDescription => {
                self.checksum = detect_checksum(&body);
                debug!(offset = start, checksum = self.checksum, "format description event");
                String::new()
            }
            EventType::Query => {
                let payload = if self.checksum && body.len() >= CHECKSUM_LEN {
                    &body[..body.len() - CHECKSUM_LEN]
                } else {
                    &body[..]
                };
                decode_query(payload).ok_or(SegmentError::TruncatedQuery { position: start })?
            }
            _ => String::new(),
        };

        trace!(
            offset = start,
            event_type = header.event_type.code(),
            length = header.event_length,
            "decoded event"
        );

        Ok(Some(ChangeEvent {
            event_type: header.event_type,
            statement,
            position: self.position,
        }))
    }
}

impl<R: Read> Iterator for SegmentReader<R> {
    type Item = Result<ChangeEvent, SegmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// 读满缓冲区；干净的 EOF 或只读到一部分都返回 `Ok(false)`
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// 根据 FORMAT_DESCRIPTION_EVENT 判断事件是否带 CRC32 尾
///
/// 事件体末尾依次是 checksum_alg(1) 和可选的 CRC32(4)。只有服务端版本支持校验和时才去读
/// checksum_alg，值为 1 表示 CRC32。
fn detect_checksum(body: &[u8]) -> bool {
    if body.len() <= FDE_FIXED_LEN + CHECKSUM_LEN {
        return false;
    }

    let version_bytes = &body[2..52];
    let version_end = memchr(0, version_bytes).unwrap_or(version_bytes.len());
    let version = String::from_utf8_lossy(&version_bytes[..version_end]);

    version_has_checksum(&version) && body[body.len() - CHECKSUM_LEN - 1] == 1
}

/// MySQL 5.6.1+ 与 MariaDB 5.3+ 支持 binlog 校验和
fn version_has_checksum(version: &str) -> bool {
    let mut parts = version.split('.');
    let major: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor: u32 = parts
        .next()
        .map(|p| p.chars().take_while(|c| c.is_ascii_digit()).collect::<String>())
        .and_then(|p| p.parse().ok())
        .unwrap_or(0);

    if version.contains("MariaDB") {
        return major > 5 || (major == 5 && minor >= 3);
    }
    major > 5 || (major == 5 && minor >= 6)
}

/// 解出 QUERY_EVENT 的 SQL 文本；长度字段越界时返回 None
fn decode_query(payload: &[u8]) -> Option<String> {
    if payload.len() < QUERY_POST_HEADER_LEN {
        return None;
    }

    let db_len = payload[8] as usize;
    let status_vars_len = u16::from_le_bytes([payload[11], payload[12]]) as usize;

    // 库名之后有一个 NUL 结束符
    let sql_start = QUERY_POST_HEADER_LEN + status_vars_len + db_len + 1;
    if sql_start > payload.len() {
        return None;
    }

    Some(String::from_utf8_lossy(&payload[sql_start..]).into_owned())
}
