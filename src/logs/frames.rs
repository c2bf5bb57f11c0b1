use crate::models::log_record::{Frame, FramePayload};

/// Whether a frame carries something worth showing by default
pub fn is_informative(frame: &Frame) -> bool {
    let has_payload = match &frame.payload {
        FramePayload::Json(value) => match value {
            serde_json::Value::Null => false,
            serde_json::Value::Object(map) => !map.is_empty(),
            serde_json::Value::Array(items) => !items.is_empty(),
            serde_json::Value::String(text) => !text.is_empty(),
            _ => true,
        },
        FramePayload::Preview(preview) => !preview.is_empty(),
        FramePayload::Absent => false,
    };

    has_payload || frame.length > 0
}

/// Position of the last substantive frame in `frames`.
///
/// Streams tend to end in control or ack frames without payload, so this
/// walks backwards to the last frame that has decoded JSON, a preview or a
/// non-zero length. Falls back to the last position, or 0 when there are no
/// frames at all.
pub fn pick_informative_frame(frames: &[Frame]) -> usize {
    frames
        .iter()
        .rposition(is_informative)
        .unwrap_or_else(|| frames.len().saturating_sub(1))
}
