//! Command frames: sealing requests, opening replies and decoding results.

use serde_json::{json, Value};
use tracing::warn;

use crate::crypto::{
    authentication_tag, derive_key_material, verify_authentication_tag, SessionKeys, Token,
};
use crate::error::{MiioError, Result};
use crate::messages::{Command, Frame, Param};

/// Seals and opens frame payloads with the token and its derived keys.
#[derive(Debug, Clone)]
pub struct ControlCrypto {
    token: Token,
    keys: SessionKeys,
}

impl ControlCrypto {
    pub fn new(token: Token) -> Self {
        let keys = derive_key_material(&token);
        Self { token, keys }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// Encrypts `plaintext` into a frame and returns its final wire bytes.
    ///
    /// The frame is serialized once with the token in the checksum field; the
    /// MD5 of those bytes becomes the checksum of the transmitted frame.
    pub fn seal(&self, device_id: u32, stamp: u32, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut frame = Frame {
            reserved: 0,
            device_id,
            stamp,
            checksum: *self.token.as_bytes(),
            payload: self.keys.encrypt(plaintext),
        };
        frame.checksum = authentication_tag(&frame.encode()?);
        frame.encode()
    }

    /// Decrypts a frame payload.
    ///
    /// A device that cannot decrypt our request answers with zeros, either as
    /// raw payload bytes or as an encrypted all-zero body.
    pub fn open(&self, frame: &Frame) -> Result<Vec<u8>> {
        if is_all_zero(&frame.payload) {
            warn!(device_id = frame.device_id, "reply payload is all zeros");
            return Err(MiioError::InvalidToken);
        }
        let plaintext = self.keys.decrypt(&frame.payload)?;
        if is_all_zero(&plaintext) {
            warn!(device_id = frame.device_id, "decrypted reply is all zeros");
            return Err(MiioError::InvalidToken);
        }
        Ok(plaintext)
    }
}

fn is_all_zero(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(|b| *b == 0)
}

/// Builds the JSON body of a command frame.
pub fn command_body(id: u32, method: &str, params: &[Param]) -> Result<Vec<u8>> {
    let command = Command { id, method, params };
    Ok(command.to_json()?.into_bytes())
}

/// Parses a decrypted reply into positional result strings.
///
/// Only a `result` array is a success. A non-null `error` becomes
/// `RemoteCommand`; anything else is a `Protocol` error.
///
/// With `expected_id` set, a reply echoing a different `id` is rejected;
/// replies without an `id` are accepted either way.
pub fn decode_reply(plaintext: &[u8], expected_id: Option<u32>) -> Result<Vec<String>> {
    let end = plaintext
        .iter()
        .rposition(|b| *b != 0)
        .map_or(0, |pos| pos + 1);
    let text = std::str::from_utf8(&plaintext[..end])
        .map_err(|e| MiioError::Protocol(format!("reply is not UTF-8: {}", e)))?;
    let reply: Value = serde_json::from_str(text)?;
    let body = reply
        .as_object()
        .ok_or_else(|| MiioError::Protocol("reply is not a JSON object".into()))?;

    if let (Some(expected), Some(echoed)) = (expected_id, body.get("id")) {
        if echoed.as_u64() != Some(u64::from(expected)) {
            warn!(expected, %echoed, "reply id does not match request");
            return Err(MiioError::Protocol(format!(
                "reply id {} does not match request id {}",
                echoed, expected
            )));
        }
    }

    if let Some(Value::Array(items)) = body.get("result") {
        return Ok(items.iter().map(value_to_text).collect());
    }

    match body.get("error") {
        Some(Value::Null) | None => {}
        Some(error) => return Err(remote_error(error)),
    }

    Err(MiioError::Protocol(
        "reply has neither a `result` array nor an `error`".into(),
    ))
}

/// Text form of one result element: strings verbatim, null as empty.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn remote_error(error: &Value) -> MiioError {
    let (code, message) = match error {
        Value::Object(map) => (
            map.get("code").and_then(Value::as_i64),
            map.get("message").map(value_to_text).unwrap_or_default(),
        ),
        Value::Array(items) => (None, items.first().map(value_to_text).unwrap_or_default()),
        other => (None, value_to_text(other)),
    };
    MiioError::RemoteCommand {
        code,
        message,
        payload: error.clone(),
    }
}

/// Device side of the exchange: verifies command frames and seals replies.
#[derive(Debug, Clone)]
pub struct ControlResponder {
    pub crypto: ControlCrypto,
}

/// A command as received by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedCommand {
    pub frame: Frame,
    pub id: Option<u64>,
    pub method: String,
    pub params: Vec<Value>,
}

impl ControlResponder {
    pub fn new(token: Token) -> Self {
        Self {
            crypto: ControlCrypto::new(token),
        }
    }

    /// Checks the frame tag, then decrypts and parses the command body.
    pub fn open_command(&self, datagram: &[u8]) -> Result<ReceivedCommand> {
        let frame = Frame::decode(datagram)?;
        if !verify_authentication_tag(&frame, self.crypto.token())? {
            return Err(MiioError::Protocol("command checksum mismatch".into()));
        }
        let plaintext = self.crypto.keys().decrypt(&frame.payload)?;
        let body: Value = serde_json::from_slice(&plaintext)?;
        let method = body
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| MiioError::Protocol("command without method".into()))?
            .to_string();
        let params = match body.get("params") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        Ok(ReceivedCommand {
            id: body.get("id").and_then(Value::as_u64),
            method,
            params,
            frame,
        })
    }

    /// Seals a JSON reply.
    pub fn reply(&self, device_id: u32, stamp: u32, body: &Value) -> Result<Vec<u8>> {
        let text = serde_json::to_vec(body)?;
        self.crypto.seal(device_id, stamp, &text)
    }

    /// Seals a `{"id":..,"result":[..]}` reply.
    pub fn result(&self, device_id: u32, stamp: u32, id: u64, result: Value) -> Result<Vec<u8>> {
        self.reply(device_id, stamp, &json!({ "id": id, "result": result }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequential_token() -> Token {
        let mut bytes = [0u8; 16];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        Token::new(bytes)
    }

    #[test]
    fn sealed_command_matches_reference_bytes() {
        let crypto = ControlCrypto::new(sequential_token());
        let params = [Param::from("power"), Param::from("bright")];
        let body = command_body(1, "get_prop", &params).unwrap();
        assert_eq!(body.len(), 56);

        let bytes = crypto.seal(0x0102_0304, 11, &body).unwrap();
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(bytes.len(), 32 + 64);
        assert_eq!(frame.reserved, 0);
        assert_eq!(frame.stamp, 11);
        assert_eq!(
            hex::encode(&frame.payload),
            "2c9dfc761522a115e1c2ce9e6e74852274df7a6b344a386f88bb545cdccad007\
             e14d45bc13103b547404e319f850205628cd72eef38874dcfb36b20fcb1199b6"
        );
        assert_eq!(
            hex::encode(frame.checksum),
            "e7f9c6ecd5829f80729241be3568b908"
        );
        assert!(verify_authentication_tag(&frame, crypto.token()).unwrap());
    }

    #[test]
    fn open_rejects_zero_payloads() {
        let crypto = ControlCrypto::new(sequential_token());
        let raw_zero = Frame {
            reserved: 0,
            device_id: 1,
            stamp: 2,
            checksum: [0; 16],
            payload: vec![0; 32],
        };
        assert!(matches!(crypto.open(&raw_zero), Err(MiioError::InvalidToken)));

        let bytes = crypto.seal(1, 2, &[0u8; 128]).unwrap();
        let frame = Frame::decode(&bytes).unwrap();
        assert!(matches!(crypto.open(&frame), Err(MiioError::InvalidToken)));
    }

    #[test]
    fn decode_reply_keeps_result_order() {
        let result = decode_reply(br#"{"id":1,"result":["on","80",""]}"#, None).unwrap();
        assert_eq!(result, vec!["on", "80", ""]);
    }

    #[test]
    fn decode_reply_trims_trailing_nuls() {
        let mut text = br#"{"id":1,"result":["ok"]}"#.to_vec();
        text.extend_from_slice(&[0, 0, 0]);
        assert_eq!(decode_reply(&text, None).unwrap(), vec!["ok"]);
    }

    #[test]
    fn decode_reply_converts_scalars_to_text() {
        let result =
            decode_reply(br#"{"id":3,"result":[80,true,null,"x",[1,2]]}"#, None).unwrap();
        assert_eq!(result, vec!["80", "true", "", "x", "[1,2]"]);
    }

    #[test]
    fn decode_reply_surfaces_remote_error_object() {
        let err = decode_reply(
            br#"{"id":1,"error":{"code":-1,"message":"unsupported method"}}"#,
            None,
        )
        .unwrap_err();
        match err {
            MiioError::RemoteCommand {
                code,
                message,
                payload,
            } => {
                assert_eq!(code, Some(-1));
                assert_eq!(message, "unsupported method");
                assert_eq!(payload["message"], "unsupported method");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_reply_surfaces_remote_error_array() {
        let err = decode_reply(br#"{"id":1,"error":["busy","retry"]}"#, None).unwrap_err();
        assert!(matches!(
            err,
            MiioError::RemoteCommand { code: None, ref message, .. } if message == "busy"
        ));
    }

    #[test]
    fn decode_reply_requires_result_or_error() {
        assert!(matches!(
            decode_reply(br#"{"id":1}"#, None),
            Err(MiioError::Protocol(_))
        ));
        assert!(matches!(
            decode_reply(b"not json", None),
            Err(MiioError::Protocol(_))
        ));
    }

    #[test]
    fn null_result_does_not_mask_remote_error() {
        let err = decode_reply(
            br#"{"id":1,"result":null,"error":{"code":-1,"message":"unsupported method"}}"#,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MiioError::RemoteCommand { code: Some(-1), ref message, .. }
                if message == "unsupported method"
        ));
    }

    #[test]
    fn non_array_result_is_protocol_error() {
        for text in [
            r#"{"id":1,"result":null}"#,
            r#"{"id":1,"result":"ok"}"#,
            r#"{"id":1,"result":null,"error":null}"#,
        ] {
            assert!(matches!(
                decode_reply(text.as_bytes(), None),
                Err(MiioError::Protocol(_))
            ));
        }
    }

    #[test]
    fn decode_reply_checks_echoed_id_on_request() {
        let text = br#"{"id":4,"result":["ok"]}"#;
        assert!(decode_reply(text, None).is_ok());
        assert!(decode_reply(text, Some(4)).is_ok());
        assert!(matches!(
            decode_reply(text, Some(5)),
            Err(MiioError::Protocol(_))
        ));
        assert!(decode_reply(br#"{"result":["ok"]}"#, Some(5)).is_ok());
    }

    #[test]
    fn responder_opens_what_the_client_sealed() {
        let token = sequential_token();
        let client = ControlCrypto::new(token.clone());
        let responder = ControlResponder::new(token);
        let params = [Param::from("on"), Param::from("smooth"), Param::from(500)];
        let bytes = client
            .seal(9, 10, &command_body(3, "set_power", &params).unwrap())
            .unwrap();
        let cmd = responder.open_command(&bytes).unwrap();
        assert_eq!(cmd.method, "set_power");
        assert_eq!(cmd.id, Some(3));
        assert_eq!(cmd.params, vec![json!("on"), json!("smooth"), json!(500)]);

        let reply = responder.result(9, 10, 3, json!(["ok"])).unwrap();
        let plaintext = client.open(&Frame::decode(&reply).unwrap()).unwrap();
        assert_eq!(decode_reply(&plaintext, Some(3)).unwrap(), vec!["ok"]);
    }

    #[test]
    fn responder_rejects_tampered_frames() {
        let token = sequential_token();
        let client = ControlCrypto::new(token.clone());
        let responder = ControlResponder::new(token);
        let mut bytes = client
            .seal(9, 10, &command_body(1, "toggle", &[]).unwrap())
            .unwrap();
        bytes[15] ^= 0x01;
        assert!(matches!(
            responder.open_command(&bytes),
            Err(MiioError::Protocol(_))
        ));
    }
}
