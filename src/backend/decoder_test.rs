use super::*;

const WIRE: &str = concat!(
    "data: {\"type\": \"model_selected\", \"model\": \"coder\", \"role\": \"Code\", \"task_type\": \"code\"}\n\n",
    "data: {\"type\": \"content\", \"content\": \"Hé\", \"done\": false}\n\n",
    ": keep-alive\n",
    "data: {\"type\": \"content\", \"content\": \"llo 🌍\", \"done\": false}\r\n\r\n",
    "data: {\"type\": \"complete\", \"full_response\": \"Héllo 🌍\", \"model\": \"coder\"}\n\n",
);

fn collect_lines(decoder: &mut StreamDecoder, chunks: &[&[u8]]) -> Vec<String> {
    let mut lines = vec![];
    for chunk in chunks {
        lines.extend(decoder.feed(chunk));
    }
    decoder.finish();
    lines
}

#[test]
fn test_feed_yields_complete_lines() {
    let mut decoder = StreamDecoder::new();
    assert_eq!(decoder.feed(b"data: a"), Vec::<String>::new());
    assert_eq!(decoder.pending(), 7);
    assert_eq!(decoder.feed(b"bc\nda"), vec!["data: abc".to_string()]);
    assert_eq!(
        decoder.feed(b"ta: x\r\n\n"),
        vec!["data: x".to_string(), String::new()]
    );
    assert_eq!(decoder.pending(), 0);
}

#[test]
fn test_chunk_boundaries_do_not_change_lines() {
    let bytes = WIRE.as_bytes();
    let expected = collect_lines(&mut StreamDecoder::new(), &[bytes]);
    assert_eq!(expected.len(), 9);

    // Every single split point, including ones inside multi-byte characters.
    for split in 0..=bytes.len() {
        let (head, tail) = bytes.split_at(split);
        let lines = collect_lines(&mut StreamDecoder::new(), &[head, tail]);
        assert_eq!(lines, expected, "split at byte {split}");
    }

    // Byte-at-a-time delivery.
    let singles = bytes.chunks(1).collect::<Vec<_>>();
    assert_eq!(collect_lines(&mut StreamDecoder::new(), &singles), expected);

    // Uneven chunk sizes.
    for size in [2, 3, 7, 13] {
        let chunks = bytes.chunks(size).collect::<Vec<_>>();
        assert_eq!(
            collect_lines(&mut StreamDecoder::new(), &chunks),
            expected,
            "chunk size {size}"
        );
    }
}

#[test]
fn test_decode_events_from_wire() {
    let mut decoder = StreamDecoder::new();
    let events = decoder.decode(WIRE.as_bytes());
    assert_eq!(
        events,
        vec![
            StreamEvent::model_selected("coder"),
            StreamEvent::content("Hé"),
            StreamEvent::content("llo 🌍"),
            StreamEvent::Unknown,
        ]
    );
}

#[test]
fn test_residual_fragment_is_discarded() {
    let mut decoder = StreamDecoder::new();
    let events = decoder.decode(b"data: {\"type\":\"content\",\"content\":\"A\"}\ndata: {\"type\":\"content\",\"content\":\"B\"}");
    assert_eq!(events, vec![StreamEvent::content("A")]);
    assert!(decoder.pending() > 0);

    decoder.finish();
    assert_eq!(decoder.pending(), 0);
    assert_eq!(decoder.decode(b"\n"), vec![]);
}

#[test]
fn test_decode_line_requires_data_prefix() {
    assert_eq!(decode_line(r#"{"type":"content","content":"A"}"#), None);
    assert_eq!(decode_line(r#"event: {"type":"content","content":"A"}"#), None);
    assert_eq!(decode_line(r#"data:{"type":"content","content":"A"}"#), None);
    assert_eq!(decode_line(r#" data: {"type":"content","content":"A"}"#), None);
    assert_eq!(decode_line(""), None);
}

#[test]
fn test_decode_line_drops_malformed_json() {
    assert_eq!(decode_line("data: "), None);
    assert_eq!(decode_line("data: [DONE]"), None);
    assert_eq!(decode_line(r#"data: {"type":"content","content":"A""#), None);
    assert_eq!(decode_line("data: \"content\""), None);
    assert_eq!(decode_line("data: [1, 2]"), None);
}

#[test]
fn test_decode_line_tags() {
    assert_eq!(
        decode_line(r#"data: {"type":"content","content":"A"}"#),
        Some(StreamEvent::content("A"))
    );
    assert_eq!(
        decode_line(r#"data: {"type":"model_selected","model":"coder"}"#),
        Some(StreamEvent::model_selected("coder"))
    );
    assert_eq!(
        decode_line(r#"data: {"type":"error","error":"boom","model":"coder"}"#),
        Some(StreamEvent::Unknown)
    );
    assert_eq!(decode_line(r#"data: {"content":"A"}"#), Some(StreamEvent::Unknown));
    assert_eq!(
        decode_line(r#"data: {"type":"content","content":42}"#),
        Some(StreamEvent::Unknown)
    );
}
