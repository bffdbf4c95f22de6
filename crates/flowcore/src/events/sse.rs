use super::EventRecord;

/// Frame a record for a server-sent-events channel.
///
/// Multi-line payloads are split across `data:` lines as the SSE format
/// requires; compact JSON never contains newlines, so in practice this is a
/// single `event:` and a single `data:` line.
pub fn sse_frame(record: &EventRecord) -> serde_json::Result<String> {
    let payload = record.to_json()?;
    let mut frame = format!("event: {}\n", record.event_name());
    for line in payload.lines() {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    Ok(frame)
}
