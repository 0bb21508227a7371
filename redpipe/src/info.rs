//! Server INFO reply parsing.

/// Well-known fields of the server's `info` reply.
///
/// Fields the server did not report are `None`; unrecognized keys are
/// dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    /// `redis_version`
    pub version: Option<String>,
    /// `uptime_in_seconds`
    pub uptime: Option<i64>,
    /// `connected_clients`
    pub clients: Option<i64>,
    /// `connected_slaves`
    pub slaves: Option<i64>,
    /// `used_memory`
    pub memory: Option<i64>,
    /// `changes_since_last_save`
    pub changes: Option<i64>,
    /// `last_save_time`
    pub last_save: Option<i64>,
    /// `total_connections_received`
    pub connections: Option<i64>,
    /// `total_commands_processed`
    pub commands: Option<i64>,
}

/// Parse the `key:value` lines of an INFO bulk body.
pub(crate) fn parse_info(body: &[u8]) -> ServerInfo {
    let mut info = ServerInfo::default();
    for line in body.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(sep) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        let (key, value) = (&line[..sep], &line[sep + 1..]);
        let Ok(value) = std::str::from_utf8(value) else {
            continue;
        };
        match key {
            b"redis_version" => info.version = Some(value.to_string()),
            b"uptime_in_seconds" => info.uptime = value.parse().ok(),
            b"connected_clients" => info.clients = value.parse().ok(),
            b"connected_slaves" => info.slaves = value.parse().ok(),
            b"used_memory" => info.memory = value.parse().ok(),
            b"changes_since_last_save" => info.changes = value.parse().ok(),
            b"last_save_time" => info.last_save = value.parse().ok(),
            b"total_connections_received" => info.connections = value.parse().ok(),
            b"total_commands_processed" => info.commands = value.parse().ok(),
            _ => {}
        }
    }
    info
}
