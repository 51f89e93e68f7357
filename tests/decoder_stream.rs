//! Stream-level decoder behaviour

use rangelink_core::{DistanceEvent, DistanceFrame, FrameDecoder, InvalidReason};

fn frame(d: u16) -> Vec<u8> {
    DistanceFrame::encode(d).into()
}

fn mixed_stream() -> Vec<u8> {
    let mut data = vec![0x13, 0x37];
    data.extend(frame(120));
    data.extend([0xFF, 0x00, 0x45]);
    data.extend(frame(121));

    let mut corrupt = frame(122);
    corrupt[5] ^= 0x40;
    data.extend(corrupt);

    data.extend(frame(20));
    data.extend(frame(123));
    data
}

#[test]
fn chunking_does_not_change_events() {
    let data = mixed_stream();
    let whole = FrameDecoder::new().push(&data);

    for size in [1, 2, 3, 7, 8, 13, 64] {
        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for chunk in data.chunks(size) {
            events.extend(decoder.push(chunk));
        }
        assert_eq!(events, whole, "chunk size {}", size);
    }
}

#[test]
fn mixed_stream_events_in_order() {
    let events = FrameDecoder::new().push(&mixed_stream());

    let readings: Vec<u16> = events.iter().filter_map(DistanceEvent::distance).collect();
    assert_eq!(readings, vec![120, 121, 123]);

    let reasons: Vec<InvalidReason> = events
        .iter()
        .filter_map(|e| match e {
            DistanceEvent::InvalidFrame { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect();
    assert_eq!(reasons, vec![InvalidReason::Checksum, InvalidReason::OutOfRange]);
}

#[test]
fn garbage_never_grows_buffer() {
    let mut decoder = FrameDecoder::new();
    let noise: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 0x59) as u8).collect();

    assert!(decoder.push(&noise).is_empty());
    assert!(decoder.buffered() < 7);

    assert_eq!(decoder.push(&frame(300)), vec![DistanceEvent::Reading { distance_cm: 300 }]);
    let stats = decoder.stats();
    assert_eq!(stats.bytes_received, 10_007);
    assert_eq!(stats.readings, 1);
    assert_eq!(stats.overflow_resets, 0);
}

#[test]
fn stray_header_byte_consumes_next_frame() {
    // A lone 0x5A right before a frame forms a header with the frame's first
    // byte, so the candidate is misaligned and rejected as a whole.
    let mut data = vec![0x5A];
    data.extend(frame(150));
    data.extend(frame(151));

    let events = FrameDecoder::new().push(&data);
    assert!(matches!(
        events[0],
        DistanceEvent::InvalidFrame { reason: InvalidReason::NotDistance, .. }
    ));
    assert_eq!(events.last().and_then(DistanceEvent::distance), Some(151));
}

#[test]
fn invalid_frame_reports_raw_hex() {
    let mut bad = frame(77);
    bad[3] = 0x03;

    let events = FrameDecoder::new().push(&bad);
    assert_eq!(
        events,
        vec![DistanceEvent::InvalidFrame {
            frame_hex: "5A 5A 45 03 00 4D 48".to_string(),
            reason: InvalidReason::BadLength,
        }]
    );
}
