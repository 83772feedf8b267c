use hook_dispatcher::{compute_signature, verify_request};

fn main() {
    let payload = br#"{"id":"123","status":"done"}"#;
    let timestamp = "1700000000";
    let signature = compute_signature(b"supersecret", payload, Some(timestamp));

    let headers = [("X-Hook-Signature", signature.as_str()), ("X-Hook-Timestamp", timestamp)];
    let now_secs = 1_700_000_200;

    match verify_request(
        headers,
        payload,
        b"supersecret",
        "X-Hook-Signature",
        Some("X-Hook-Timestamp"),
        300,
        now_secs,
    ) {
        Ok(()) => println!("signature ok"),
        Err(err) => println!("rejected: {err:?}"),
    }
}
