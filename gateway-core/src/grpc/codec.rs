//! # Message Codec
//!
//! JSON ⇄ self-describing binary message conversion.
//!
//! The gateway never sees generated Rust structs; every message is a
//! [`DynamicMessage`] whose schema comes from the catalog's type graph. The
//! graph's descriptor pool is the type registry: nested and foreign message
//! references inside a JSON payload (including `google.protobuf.Any`) resolve
//! against it during parsing.
//!
//! [`parse_messages`] validates a whole request batch upfront, before any
//! connection is opened; [`DynamicCodec`] then moves the already-validated
//! messages across the wire, and [`render_message`] turns each response back
//! into JSON text, omitting scalar fields the server left unset.
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor, MethodDescriptor, ReflectMessage};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// A request payload that does not parse against the method's input type.
///
/// `index` is the zero-based position of the offending text in the batch; the
/// whole batch is discarded on the first failure.
#[derive(Debug, thiserror::Error)]
#[error("Unable to parse request message at position {index}: {reason}")]
pub struct PayloadParseError {
    pub index: usize,
    pub reason: String,
}

/// Parses each JSON text independently against `input`, in order.
///
/// Aborts on the first malformed text; a partially parsed batch is never
/// returned, so a caller can rely on "all messages valid" before it opens a
/// connection.
pub fn parse_messages(
    input: &MessageDescriptor,
    json_texts: &[String],
) -> Result<Vec<DynamicMessage>, PayloadParseError> {
    let mut messages = Vec::with_capacity(json_texts.len());
    for (index, text) in json_texts.iter().enumerate() {
        let mut deserializer = serde_json::Deserializer::from_str(text);
        let message = DynamicMessage::deserialize(input.clone(), &mut deserializer)
            .map_err(|e| PayloadParseError {
                index,
                reason: e.to_string(),
            })?;
        deserializer.end().map_err(|e| PayloadParseError {
            index,
            reason: e.to_string(),
        })?;
        messages.push(message);
    }
    Ok(messages)
}

/// Renders a decoded message as JSON text.
///
/// Uses the proto3 JSON mapping: optional scalar fields the server never set
/// are omitted rather than emitted with default values.
pub fn render_message(message: &DynamicMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// A `tonic` codec that transports [`DynamicMessage`] values directly.
///
/// It holds the descriptors for both directions of the call, so the same type
/// works on the client side (`encode = input`, `decode = output`) and on a
/// server side (`encode = output`, `decode = input`).
#[derive(Debug, Clone)]
pub struct DynamicCodec {
    encode_desc: MessageDescriptor,
    decode_desc: MessageDescriptor,
}

impl DynamicCodec {
    pub fn new(encode_desc: MessageDescriptor, decode_desc: MessageDescriptor) -> Self {
        Self {
            encode_desc,
            decode_desc,
        }
    }

    /// The client-side codec for `method`: requests out, responses in.
    pub fn for_client(method: &MethodDescriptor) -> Self {
        Self::new(method.input(), method.output())
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;

    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder(self.encode_desc.clone())
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder(self.decode_desc.clone())
    }
}

/// Serializes dynamic messages onto the wire.
pub struct DynamicEncoder(MessageDescriptor);

impl DynamicEncoder {
    // A message of the wrong type would silently corrupt the stream.
    fn check_type(&self, item: &DynamicMessage) -> Result<(), Status> {
        if item.descriptor() != self.0 {
            return Err(Status::internal(format!(
                "Attempted to send a '{}' where '{}' was expected",
                item.descriptor().full_name(),
                self.0.full_name()
            )));
        }
        Ok(())
    }
}

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        self.check_type(&item)?;
        item.encode_raw(dst);
        Ok(())
    }
}

/// Deserializes wire bytes into dynamic messages of the expected type.
pub struct DynamicDecoder(MessageDescriptor);

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut message = DynamicMessage::new(self.0.clone());
        message
            .merge(src)
            .map_err(|e| Status::internal(format!("Failed to decode Protobuf bytes: {}", e)))?;
        Ok(Some(message))
    }
}
