//! Protocol sniffing and query classification — component H.

/// Which database wire protocol the initial bytes of a connection belong
/// to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbProtocol {
    Postgres,
    MySql,
    Redis,
}

/// Classification of one query's effect, used to steer read/write routing
/// and transaction/session stickiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Read,
    Write,
    TransactionBegin,
    TransactionEnd,
    SessionVar,
    Other,
}

impl QueryKind {
    /// `TransactionBegin` and `SessionVar` force subsequent traffic on the
    /// session to the same backend.
    pub fn requires_sticky(self) -> bool {
        matches!(self, QueryKind::TransactionBegin | QueryKind::SessionVar)
    }
}

/// Sniffs the protocol from the first bytes of a new connection.
/// PostgreSQL: first 3 bytes are zero (high bytes of the big-endian
/// startup-packet length prefix). MySQL: a 4-byte packet header followed
/// by a protocol-version byte of 9 or 10. Redis: first byte is one of
/// `*+-:$`.
pub fn sniff(data: &[u8]) -> Option<DbProtocol> {
    if data.len() >= 5 && data[0] == 0 && data[1] == 0 && data[2] == 0 {
        return Some(DbProtocol::Postgres);
    }
    if data.len() >= 5 && matches!(data[4], 9 | 10) {
        return Some(DbProtocol::MySql);
    }
    if let Some(&first) = data.first() {
        if matches!(first, b'*' | b'+' | b'-' | b':' | b'$') {
            return Some(DbProtocol::Redis);
        }
    }
    None
}

/// Extracts the query text from a protocol-tagged message, per §4.H:
/// Postgres message type `'Q'`, MySQL command byte `0x03`, Redis by
/// walking the RESP array to the first bulk string.
pub fn extract_query_text(protocol: DbProtocol, data: &[u8]) -> Option<String> {
    match protocol {
        DbProtocol::Postgres => extract_postgres(data),
        DbProtocol::MySql => extract_mysql(data),
        DbProtocol::Redis => extract_redis(data),
    }
}

fn extract_postgres(data: &[u8]) -> Option<String> {
    if data.first()? != &b'Q' || data.len() < 5 {
        return None;
    }
    let body = &data[5..];
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    String::from_utf8(body[..end].to_vec()).ok()
}

fn extract_mysql(data: &[u8]) -> Option<String> {
    if data.len() < 5 || data[4] != 0x03 {
        return None;
    }
    let length = u32::from_le_bytes([data[0], data[1], data[2], 0]) as usize;
    // length includes the command byte; the query text follows it.
    let text_end = (4 + length).min(data.len());
    if text_end <= 5 {
        return Some(String::new());
    }
    String::from_utf8(data[5..text_end].to_vec()).ok()
}

fn extract_redis(data: &[u8]) -> Option<String> {
    if data.first()? != &b'*' {
        // Inline commands / simple strings aren't array-framed; fall back
        // to treating the whole line as the command text.
        let line_end = data.iter().position(|&b| b == b'\r').unwrap_or(data.len());
        return String::from_utf8(data[..line_end].to_vec()).ok();
    }
    let mut pos = data.iter().position(|&b| b == b'\n')? + 1;
    while pos < data.len() {
        if data[pos] != b'$' {
            return None;
        }
        let len_end = data[pos..].iter().position(|&b| b == b'\r')? + pos;
        let len: usize = std::str::from_utf8(&data[pos + 1..len_end]).ok()?.parse().ok()?;
        let start = len_end + 2; // skip \r\n
        if start + len > data.len() {
            return None;
        }
        return String::from_utf8(data[start..start + len].to_vec()).ok();
    }
    None
}

/// Classifies query text by its case-insensitive leading keyword.
pub fn classify_query(text: &str) -> QueryKind {
    let trimmed = text.trim_start();
    let keyword: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();

    match keyword.as_str() {
        "SELECT" | "SHOW" => QueryKind::Read,
        "INSERT" | "UPDATE" | "DELETE" => QueryKind::Write,
        "BEGIN" | "START" => QueryKind::TransactionBegin,
        "COMMIT" | "ROLLBACK" => QueryKind::TransactionEnd,
        "SET" => QueryKind::SessionVar,
        _ => QueryKind::Other,
    }
}
